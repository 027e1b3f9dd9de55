// Segmentation of raw caption cues into readable subtitle units
//
// - protocol: line protocol spoken with the external segmenter
// - refine: merge/split heuristics applied to segmenter output
// - guards: timeline normalization and anti-flicker merging
// - fallback: deterministic segmentation when the segmenter fails
// - pipeline: windowed, cancelable driver tying the above to the playhead
// - llm: Ollama-backed segmenter

pub mod protocol;
pub mod refine;
pub mod guards;
pub mod fallback;
pub mod pipeline;
pub mod llm;

use async_trait::async_trait;

pub use pipeline::SegmentationPipeline;
use crate::error::Result;

/// External segmentation capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// `records` is the JSON array produced by [`protocol::encode_cues`];
    /// the answer is raw line-protocol text.
    async fn segment(&self, records: &str, provider: &str) -> Result<String>;
}
