use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::cue::Cue;
use crate::error::{CueSyncError, Result};
use crate::ollama::{extract_json_object, language_code_to_name, strip_code_fence, OllamaClient};
use super::{BatchTranslator, VideoContext};

/// Longest slice of the aggregate subtitle text included as prompt context.
const MAX_CONTEXT_CHARS: usize = 1_500;

#[derive(Debug, Clone, Serialize)]
struct LineIn<'a> {
    i: usize,
    t: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct LineOut {
    i: usize,
    t: String,
}

#[derive(Debug, Clone, Deserialize)]
struct BatchResponse {
    translations: Vec<LineOut>,
}

/// Batch translator backed by a local Ollama model.
pub struct OllamaTranslator {
    client: OllamaClient,
    target_language: String,
}

impl OllamaTranslator {
    pub fn new(client: OllamaClient, target_language: impl Into<String>) -> Self {
        Self {
            client,
            target_language: target_language.into(),
        }
    }

    fn build_prompt(&self, cues: &[Cue], context: &VideoContext) -> Result<String> {
        let language_name = language_code_to_name(&self.target_language);
        let lines: Vec<LineIn> = cues
            .iter()
            .enumerate()
            .map(|(i, cue)| LineIn { i, t: &cue.text })
            .collect();
        let lines = serde_json::to_string(&lines)?;

        let mut prompt = format!(
            "You are a professional subtitle translator.\n\
             \n\
             CRITICAL: You must translate every line to {} ONLY. Do not translate to any other language.\n\
             The target language is: {} (language code: {})\n\
             \n\
             Return ONLY JSON in the form {{\"translations\":[{{\"i\":0,\"t\":\"translated line\"}}]}} with exactly one entry per input line, same \"i\" values.\n\
             Do not merge or split lines. Do not include explanations.\n\
             \n\
             [Lines to translate]\n\
             {}\n\
             \n",
            language_name, language_name, self.target_language, lines
        );

        if !context.title.trim().is_empty() {
            prompt.push_str(&format!("[Video title - DO NOT translate]\n{}\n\n", context.title));
        }
        if !context.subtitles_text.trim().is_empty() {
            let excerpt: String = context.subtitles_text.chars().take(MAX_CONTEXT_CHARS).collect();
            prompt.push_str(&format!(
                "[Context for reference - DO NOT translate this part]\n\
                 {}\n\n\
                 Remember: Only translate the lines in the [Lines to translate] section above to {}.\n",
                excerpt, language_name
            ));
        }
        Ok(prompt)
    }
}

/// Parse the model's answer, tolerating code fences and surrounding prose,
/// and require a non-empty translation for every requested index.
fn parse_batch_response(response: &str, expected: usize) -> Result<HashMap<usize, String>> {
    let candidates = [
        Some(response.trim()),
        Some(strip_code_fence(response)),
        extract_json_object(response),
    ];

    let parsed = candidates
        .into_iter()
        .flatten()
        .find_map(|text| serde_json::from_str::<BatchResponse>(text).ok())
        .ok_or_else(|| {
            CueSyncError::Translate(format!("Unparseable translation response: {}", response))
        })?;

    let translations: HashMap<usize, String> = parsed
        .translations
        .into_iter()
        .filter(|line| !line.t.trim().is_empty())
        .map(|line| (line.i, line.t.trim().to_string()))
        .collect();

    if let Some(missing) = (0..expected).find(|i| !translations.contains_key(i)) {
        return Err(CueSyncError::Translate(format!(
            "Missing translation for line {} of {}",
            missing, expected
        )));
    }
    Ok(translations)
}

#[async_trait]
impl BatchTranslator for OllamaTranslator {
    async fn translate_batch(&self, cues: &[Cue], context: &VideoContext) -> Result<Vec<Cue>> {
        if cues.is_empty() {
            return Ok(Vec::new());
        }
        info!("Translating batch of {} cues to {}", cues.len(), self.target_language);

        let prompt = self.build_prompt(cues, context)?;
        let response = self
            .client
            .generate(&prompt, true)
            .await
            .map_err(|e| CueSyncError::Translate(e.to_string()))?;

        let mut translations = parse_batch_response(&response, cues.len()).inspect_err(|e| {
            warn!("Rejected translation response: {}", e);
        })?;

        let translated = cues
            .iter()
            .enumerate()
            .map(|(i, cue)| Cue {
                translation: translations.remove(&i),
                ..cue.clone()
            })
            .collect::<Vec<_>>();
        debug!("Batch translated: {:?}", translated.iter().map(|c| &c.translation).collect::<Vec<_>>());
        Ok(translated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let parsed = parse_batch_response(
            r#"{"translations":[{"i":0,"t":"こんにちは"},{"i":1,"t":"世界"}]}"#,
            2,
        )
        .unwrap();
        assert_eq!(parsed[&0], "こんにちは");
        assert_eq!(parsed[&1], "世界");
    }

    #[test]
    fn test_parse_fenced_and_wrapped_json() {
        let fenced = "```json\n{\"translations\":[{\"i\":0,\"t\":\"Bonjour\"}]}\n```";
        assert_eq!(parse_batch_response(fenced, 1).unwrap()[&0], "Bonjour");

        let wrapped = "Sure! {\"translations\":[{\"i\":0,\"t\":\"Hallo\"}]} Enjoy.";
        assert_eq!(parse_batch_response(wrapped, 1).unwrap()[&0], "Hallo");
    }

    #[test]
    fn test_missing_line_is_an_error() {
        let err = parse_batch_response(r#"{"translations":[{"i":0,"t":"uno"},{"i":2,"t":"tres"}]}"#, 3)
            .unwrap_err();
        assert!(matches!(err, CueSyncError::Translate(_)));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(parse_batch_response("I'm sorry, I can't do that.", 1).is_err());
    }
}
