use async_trait::async_trait;
use tracing::debug;

use crate::error::{CueSyncError, Result};
use crate::ollama::{strip_code_fence, OllamaClient};
use super::Segmenter;

/// Segmenter backed by a local Ollama model.
pub struct OllamaSegmenter {
    client: OllamaClient,
}

impl OllamaSegmenter {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }

    fn build_prompt(&self, records: &str, provider: &str) -> String {
        format!(
            r#"You are a professional subtitle editor. The records below are automatic captions cut at arbitrary points.
Each record is {{"i": index, "s": start ms, "e": end ms, "t": text}}.

TASK: Group consecutive records into natural, readable subtitle lines. The lines will be translated by {provider}, so each line should be a complete phrase or sentence.

RULES:
1. Every index must be used exactly once, in order, starting at 0 and ending at the last index.
2. A line covers a contiguous range of indices.
3. Keep the original words. You may fix spacing and add punctuation only.
4. Prefer breaking at sentence ends and long pauses; avoid lines longer than about 20 words (or 32 characters for Chinese, Japanese and Korean).

OUTPUT: one line per subtitle, formatted exactly as
<from>-<to> | <text>
and nothing else.

RECORDS:
{records}"#,
            provider = provider,
            records = records
        )
    }
}

#[async_trait]
impl Segmenter for OllamaSegmenter {
    async fn segment(&self, records: &str, provider: &str) -> Result<String> {
        let prompt = self.build_prompt(records, provider);
        debug!("Requesting segmentation from {}", self.client.model());

        let response = self
            .client
            .generate(&prompt, false)
            .await
            .map_err(|e| CueSyncError::Segment(e.to_string()))?;
        Ok(strip_code_fence(&response).to_string())
    }
}
