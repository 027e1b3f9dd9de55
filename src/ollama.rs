use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::LlmConfig;
use crate::error::{CueSyncError, Result};

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Thin non-streaming client for Ollama's `/api/generate`, shared by the
/// segmenter and the batch translator.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    config: LlmConfig,
}

impl OllamaClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send one prompt and return the raw response text. `json` asks Ollama to
    /// constrain output to JSON.
    pub async fn generate(&self, prompt: &str, json: bool) -> Result<String> {
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            format: json.then_some("json"),
        };

        let url = format!("{}/api/generate", self.config.endpoint);
        debug!("Sending generate request to: {}", url);

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(CueSyncError::Llm(format!(
                "Ollama API error {}: {}",
                status, error_text
            )));
        }

        let generated: GenerateResponse = response.json().await?;
        let raw = generated.response.trim().to_string();
        debug!("Raw Ollama response: {}", raw);

        if raw.is_empty() {
            return Err(CueSyncError::Llm("Empty response received".to_string()));
        }
        Ok(raw)
    }

    /// Check that Ollama is reachable and the model is pulled.
    pub async fn check_availability(&self) -> Result<()> {
        let url = format!("{}/api/show", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "name": self.config.model }))
            .send()
            .await
            .map_err(|e| CueSyncError::Llm(format!("Failed to connect to Ollama: {}", e)))?;

        if response.status().is_success() {
            info!("Ollama model '{}' is available", self.config.model);
            Ok(())
        } else {
            Err(CueSyncError::Llm(format!(
                "Ollama model '{}' not found. Please pull the model first: ollama pull {}",
                self.config.model, self.config.model
            )))
        }
    }
}

/// Remove a surrounding markdown code fence (```json ... ``` or ``` ... ```).
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // Drop the info string on the opening fence line
    match inner.split_once('\n') {
        Some((first, rest)) if !first.trim().contains(' ') => rest.trim(),
        _ => inner.trim(),
    }
}

/// Slice from the first `{` to the last `}` when the model wrapped JSON in prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Full language name for prompts; unknown codes are passed through.
pub fn language_code_to_name(code: &str) -> String {
    let name = match code.to_lowercase().split(['-', '_']).next().unwrap_or_default() {
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" => "Chinese",
        "en" => "English",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "ru" => "Russian",
        "it" => "Italian",
        "pt" => "Portuguese",
        "pl" => "Polish",
        "nl" => "Dutch",
        "tr" => "Turkish",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "th" => "Thai",
        "vi" => "Vietnamese",
        "sv" => "Swedish",
        "da" => "Danish",
        "no" => "Norwegian",
        "fi" => "Finnish",
        "he" => "Hebrew",
        "hu" => "Hungarian",
        "cs" => "Czech",
        "uk" => "Ukrainian",
        "id" => "Indonesian",
        _ => return code.to_string(),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n0-1 | hi\n```"), "0-1 | hi");
        assert_eq!(strip_code_fence("  plain  "), "plain");
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(
            extract_json_object("Here you go: {\"x\": [1]} hope it helps"),
            Some("{\"x\": [1]}")
        );
        assert_eq!(extract_json_object("no json"), None);
    }

    #[test]
    fn test_language_code_to_name() {
        assert_eq!(language_code_to_name("ja"), "Japanese");
        assert_eq!(language_code_to_name("zh-TW"), "Chinese");
        assert_eq!(language_code_to_name("xx"), "xx");
    }
}
