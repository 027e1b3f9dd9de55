use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SegmentationConfig;
use crate::cue::{Cue, CueId};
use crate::error::Result;
use crate::measure::LangClass;
use crate::playback::PlaybackClock;
use super::Segmenter;
use super::fallback::fallback_segment;
use super::guards::{apply_guards, normalize};
use super::protocol::{decode_units, encode_cues, validate_units};
use super::refine::{build_fragments_from_units, refine_segmentation_units};

/// Turns raw cues into the processed timeline, a chunk at a time, starting
/// around the playhead.
///
/// Cheap to clone; all clones drive the same state. At most one loop runs at a
/// time, and a stop request takes effect between chunks, never during a
/// segmenter call.
#[derive(Clone)]
pub struct SegmentationPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    segmenter: Arc<dyn Segmenter>,
    clock: Arc<dyn PlaybackClock>,
    config: SegmentationConfig,
    running: AtomicBool,
    state: Mutex<PipelineState>,
}

struct PipelineState {
    raw: Vec<Cue>,
    processed: Vec<Cue>,
    segmented: HashSet<CueId>,
    failed_ai: HashSet<CueId>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    /// Bumped by `reset`; output computed for an older generation is discarded
    generation: u64,
    next_id: u64,
}

struct Chunk {
    cues: Vec<Cue>,
    start: u64,
    end: u64,
    generation: u64,
}

impl PipelineState {
    fn new(raw: Vec<Cue>, generation: u64) -> Self {
        let raw = ingest(raw);
        let next_id = raw.len() as u64;
        Self {
            raw,
            processed: Vec::new(),
            segmented: HashSet::new(),
            failed_ai: HashSet::new(),
            cancel: CancellationToken::new(),
            task: None,
            generation,
            next_id,
        }
    }

    fn window_floor(now_ms: u64, config: &SegmentationConfig) -> u64 {
        now_ms.saturating_sub(config.look_behind_ms)
    }

    fn has_unprocessed(&self, now_ms: u64, config: &SegmentationConfig) -> bool {
        let floor = Self::window_floor(now_ms, config);
        self.raw
            .iter()
            .any(|cue| cue.start >= floor && !self.segmented.contains(&cue.id))
    }

    /// Earliest unsegmented cue at or after the window floor, plus its
    /// unsegmented successors inside the chunk window.
    fn next_chunk(&self, now_ms: u64, config: &SegmentationConfig) -> Option<Chunk> {
        let floor = Self::window_floor(now_ms, config);
        let first = self
            .raw
            .iter()
            .position(|cue| cue.start >= floor && !self.segmented.contains(&cue.id))?;
        let anchor = self.raw[first].start;
        let limit = anchor.saturating_add(config.chunk_window_ms);

        let cues: Vec<Cue> = self.raw[first..]
            .iter()
            .take_while(|cue| !self.segmented.contains(&cue.id) && cue.start < limit)
            .take(config.max_chunk_cues.max(1))
            .cloned()
            .collect();

        let end = cues.iter().map(|cue| cue.end).max().unwrap_or(anchor);
        Some(Chunk {
            cues,
            start: anchor,
            end,
            generation: self.generation,
        })
    }

    fn publish(&mut self, mut output: Vec<Cue>, start: u64, end: u64) {
        self.processed
            .retain(|cue| !(cue.start >= start && cue.end <= end));
        for cue in &mut output {
            cue.id = CueId(self.next_id);
            self.next_id += 1;
        }
        self.processed.extend(output);
        normalize(&mut self.processed);
    }
}

/// Sort raw cues by start and give them dense ingestion ids.
fn ingest(mut raw: Vec<Cue>) -> Vec<Cue> {
    raw.sort_by_key(|cue| cue.start);
    for (i, cue) in raw.iter_mut().enumerate() {
        cue.id = CueId(i as u64);
        cue.end = cue.end.max(cue.start);
    }
    raw
}

impl SegmentationPipeline {
    pub fn new(
        raw: Vec<Cue>,
        segmenter: Arc<dyn Segmenter>,
        clock: Arc<dyn PlaybackClock>,
        config: SegmentationConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                segmenter,
                clock,
                config,
                running: AtomicBool::new(false),
                state: Mutex::new(PipelineState::new(raw, 0)),
            }),
        }
    }

    /// Clear any stop request and run the loop in the background. No-op when a
    /// loop is already running; that loop picks up the cleared stop flag.
    pub async fn start(&self) {
        let mut state = self.inner.state.lock().await;
        if state.cancel.is_cancelled() {
            state.cancel = CancellationToken::new();
        }
        // A task spawned but not yet scheduled has not set `running` yet
        let spawned = state.task.as_ref().is_some_and(|task| !task.is_finished());
        if self.is_running() || spawned {
            return;
        }
        let pipeline = self.clone();
        state.task = Some(tokio::spawn(async move { pipeline.run().await }));
    }

    /// Re-enter the loop, keeping everything already segmented.
    pub async fn restart(&self) {
        self.start().await;
    }

    /// Ask the loop to stop at the next chunk boundary.
    pub async fn stop(&self) {
        self.inner.state.lock().await.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Wait for the background loop spawned by [`start`](Self::start), if any.
    pub async fn wait_idle(&self) {
        let task = self.inner.state.lock().await.task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Segmentation task ended abnormally: {}", e);
            }
        }
    }

    /// Run the loop in the current task until no chunk is left near the
    /// playhead or a stop is requested. Returns immediately if a loop is
    /// already running.
    pub async fn run(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("Segmentation already running, ignoring trigger");
            return;
        }
        let chunks = self.inner.run_loop().await;
        self.inner.running.store(false, Ordering::SeqCst);
        if chunks > 0 {
            info!("Segmentation loop finished after {} chunk(s)", chunks);
        }
    }

    pub async fn has_unprocessed_chunks(&self) -> bool {
        let now = self.inner.clock.current_time_ms();
        self.inner
            .state
            .lock()
            .await
            .has_unprocessed(now, &self.inner.config)
    }

    /// Make cues whose AI segmentation failed eligible for another attempt.
    pub async fn clear_failed_starts(&self) {
        let mut state = self.inner.state.lock().await;
        let failed: Vec<CueId> = state.failed_ai.drain().collect();
        for id in &failed {
            state.segmented.remove(id);
        }
        if !failed.is_empty() {
            info!("Cleared {} AI-failed cues for retry", failed.len());
        }
    }

    pub async fn failed_ai_count(&self) -> usize {
        self.inner.state.lock().await.failed_ai.len()
    }

    /// Snapshot of the published, normalized timeline.
    pub async fn timeline(&self) -> Vec<Cue> {
        self.inner.state.lock().await.processed.clone()
    }

    pub async fn raw_cues(&self) -> Vec<Cue> {
        self.inner.state.lock().await.raw.clone()
    }

    /// Copy translations onto the published cues with matching ids. Returns the
    /// number of cues updated; cues replaced in the meantime are skipped.
    pub async fn apply_translations(&self, translated: &[Cue]) -> usize {
        let mut state = self.inner.state.lock().await;
        let mut updated = 0;
        for source in translated {
            if let Some(cue) = state.processed.iter_mut().find(|c| c.id == source.id) {
                cue.translation = source.translation.clone();
                updated += 1;
            }
        }
        updated
    }

    /// Swap in the raw cues of a new video, dropping all progress. A loop
    /// still in flight finishes its current chunk and discards the result.
    pub async fn reset(&self, raw: Vec<Cue>) {
        let mut state = self.inner.state.lock().await;
        let generation = state.generation + 1;
        let task = state.task.take();
        *state = PipelineState::new(raw, generation);
        state.task = task;
        info!("Segmentation pipeline reset with {} raw cues", state.raw.len());
    }
}

impl PipelineInner {
    async fn run_loop(&self) -> usize {
        let mut chunks = 0;
        loop {
            let chunk = {
                let mut state = self.state.lock().await;
                if state.cancel.is_cancelled() {
                    debug!("Segmentation stop requested");
                    break;
                }
                let now = self.clock.current_time_ms();
                let Some(chunk) = state.next_chunk(now, &self.config) else {
                    break;
                };
                // Marked before the call so a failing chunk is never retried in a loop
                for cue in &chunk.cues {
                    state.segmented.insert(cue.id);
                }
                chunk
            };

            let lang = LangClass::resolve(
                self.config.source_language.as_deref(),
                chunk.cues.iter().map(|c| c.text.as_str()),
            );
            info!(
                "Segmenting {} cues [{}ms, {}ms) as {:?}",
                chunk.cues.len(),
                chunk.start,
                chunk.end,
                lang
            );

            let output = match self.segment_with_ai(&chunk.cues, lang).await {
                Ok(cues) => cues,
                Err(e) => {
                    warn!("AI segmentation failed, using fallback: {}", e);
                    let mut state = self.state.lock().await;
                    if state.generation == chunk.generation {
                        state.failed_ai.extend(chunk.cues.iter().map(|c| c.id));
                    }
                    drop(state);
                    fallback_segment(&chunk.cues, lang)
                }
            };

            let mut state = self.state.lock().await;
            if state.generation != chunk.generation {
                debug!("Discarding chunk computed before reset");
                continue;
            }
            debug!("Publishing {} segmented cues", output.len());
            state.publish(output, chunk.start, chunk.end);
            chunks += 1;
        }
        chunks
    }

    async fn segment_with_ai(&self, chunk: &[Cue], lang: LangClass) -> Result<Vec<Cue>> {
        let encoded = encode_cues(chunk)?;
        if encoded.cues.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .segmenter
            .segment(&encoded.payload, &self.config.provider)
            .await?;
        let units = decode_units(&response)?;
        validate_units(&units, encoded.cues.len())?;

        let refined = refine_segmentation_units(units, &encoded.cues, lang);
        validate_units(&refined, encoded.cues.len())?;

        Ok(apply_guards(
            build_fragments_from_units(&refined, &encoded.cues),
            lang,
        ))
    }
}
