//! Language-aware text measurement shared by every length threshold.
//!
//! Ideographic languages are measured in characters, everything else in
//! whitespace-separated tokens.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LangClass {
    /// Chinese, Japanese, Korean: length is a character count
    Cjk,
    /// Whitespace-delimited languages: length is a token count
    Spaced,
}

impl LangClass {
    /// Class for an explicit language code such as `zh-CN`, `ja` or `en`.
    pub fn from_code(code: &str) -> Self {
        let primary = code
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_lowercase();
        match primary.as_str() {
            "zh" | "ja" | "ko" | "yue" | "cmn" => Self::Cjk,
            _ => Self::Spaced,
        }
    }

    /// Guess the class from sample text: CJK when at least a third of the
    /// non-whitespace characters are ideographs or kana/hangul.
    pub fn detect<'a, I>(texts: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut cjk = 0usize;
        let mut total = 0usize;
        for text in texts {
            for ch in text.chars().filter(|c| !c.is_whitespace()) {
                total += 1;
                if is_cjk_char(ch) {
                    cjk += 1;
                }
            }
        }
        if total > 0 && cjk * 3 >= total {
            Self::Cjk
        } else {
            Self::Spaced
        }
    }

    /// Use the configured language when present, otherwise detect from the text.
    pub fn resolve<'a, I>(configured: Option<&str>, texts: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        match configured {
            Some(code) if !code.trim().is_empty() => Self::from_code(code),
            _ => Self::detect(texts),
        }
    }

    pub fn is_cjk(self) -> bool {
        matches!(self, Self::Cjk)
    }

    /// Pick the threshold matching this class.
    pub fn pick<T>(self, cjk: T, spaced: T) -> T {
        match self {
            Self::Cjk => cjk,
            Self::Spaced => spaced,
        }
    }
}

pub fn is_cjk_char(ch: char) -> bool {
    let u = ch as u32;
    (0x3040..=0x30FF).contains(&u)
        || (0x3400..=0x4DBF).contains(&u)
        || (0x4E00..=0x9FFF).contains(&u)
        || (0xAC00..=0xD7AF).contains(&u)
        || (0xF900..=0xFAFF).contains(&u)
}

/// The unit metric: characters for CJK, tokens otherwise.
pub fn measure(text: &str, lang: LangClass) -> usize {
    match lang {
        LangClass::Cjk => text.chars().filter(|c| !c.is_whitespace()).count(),
        LangClass::Spaced => text.split_whitespace().count(),
    }
}

const CLOSERS: &[char] = &['"', '\'', '”', '’', ')', '）', '」', '』', '】', ']'];

/// True when the text ends in terminal punctuation for its language class.
/// Trailing quotes and closing brackets are looked through.
pub fn has_strong_boundary(text: &str, lang: LangClass) -> bool {
    let trimmed = text.trim_end().trim_end_matches(CLOSERS);
    let Some(last) = trimmed.chars().last() else {
        return false;
    };
    match lang {
        LangClass::Cjk => matches!(last, '。' | '！' | '？' | '…' | '.' | '!' | '?' | '；'),
        LangClass::Spaced => matches!(last, '.' | '!' | '?' | '…'),
    }
}

/// Strip newlines and collapse runs of whitespace to single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Concatenate two pieces of subtitle text. CJK pieces are glued directly
/// unless a latin word would be fused to another.
pub fn join_text(left: &str, right: &str, lang: LangClass) -> String {
    let left = collapse_whitespace(left);
    let right = collapse_whitespace(right);
    if left.is_empty() {
        return right;
    }
    if right.is_empty() {
        return left;
    }
    let needs_space = match lang {
        LangClass::Spaced => true,
        LangClass::Cjk => {
            let l = left.chars().last().unwrap_or(' ');
            let r = right.chars().next().unwrap_or(' ');
            l.is_ascii_alphanumeric() && r.is_ascii_alphanumeric()
        }
    };
    if needs_space {
        format!("{} {}", left, right)
    } else {
        format!("{}{}", left, right)
    }
}

/// Join many pieces with [`join_text`].
pub fn join_all<'a, I>(pieces: I, lang: LangClass) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    pieces
        .into_iter()
        .fold(String::new(), |acc, piece| join_text(&acc, piece, lang))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_by_class() {
        assert_eq!(measure("你好 世界", LangClass::Cjk), 4);
        assert_eq!(measure("hello  wide\nworld", LangClass::Spaced), 3);
        assert_eq!(measure("", LangClass::Spaced), 0);
    }

    #[test]
    fn test_from_code() {
        assert_eq!(LangClass::from_code("zh-CN"), LangClass::Cjk);
        assert_eq!(LangClass::from_code("ja"), LangClass::Cjk);
        assert_eq!(LangClass::from_code("en_US"), LangClass::Spaced);
    }

    #[test]
    fn test_detect() {
        assert_eq!(LangClass::detect(["你好", "世界"]), LangClass::Cjk);
        assert_eq!(LangClass::detect(["hello there", "ok"]), LangClass::Spaced);
        assert_eq!(LangClass::detect(std::iter::empty::<&str>()), LangClass::Spaced);
    }

    #[test]
    fn test_strong_boundary() {
        assert!(has_strong_boundary("Hola mundo.", LangClass::Spaced));
        assert!(has_strong_boundary("He said \"stop!\"", LangClass::Spaced));
        assert!(!has_strong_boundary("and then", LangClass::Spaced));
        assert!(has_strong_boundary("你好。", LangClass::Cjk));
        assert!(!has_strong_boundary("你好", LangClass::Cjk));
        assert!(!has_strong_boundary("   ", LangClass::Cjk));
    }

    #[test]
    fn test_join_text() {
        assert_eq!(join_text("你好", "世界", LangClass::Cjk), "你好世界");
        assert_eq!(join_text("use", "GPU", LangClass::Cjk), "use GPU");
        assert_eq!(join_text(" hello\n", "  world ", LangClass::Spaced), "hello world");
        assert_eq!(join_text("", "x", LangClass::Spaced), "x");
        assert_eq!(join_all(["a", "b", "c"], LangClass::Spaced), "a b c");
    }
}
