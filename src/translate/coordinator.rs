use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{DisplayMode, TranslateConfig};
use crate::cue::{Cue, CueId};
use crate::display::{active_cue, Status, SubtitleEvent};
use crate::playback::PlaybackClock;
use crate::segment::SegmentationPipeline;
use super::{BatchTranslator, VideoContext};

/// Translates processed cues around the playhead in small batches.
///
/// Driven by playback ticks. At most one batch is in flight; a tick that
/// arrives meanwhile only refreshes the status. Status changes and newly
/// translated cues are published as [`SubtitleEvent`]s.
#[derive(Clone)]
pub struct TranslationCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    pipeline: SegmentationPipeline,
    translator: Arc<dyn BatchTranslator>,
    clock: Arc<dyn PlaybackClock>,
    config: TranslateConfig,
    events: mpsc::UnboundedSender<SubtitleEvent>,
    translating: AtomicBool,
    state: Mutex<CoordinatorState>,
}

#[derive(Default)]
struct CoordinatorState {
    in_flight: HashSet<CueId>,
    translated: HashSet<CueId>,
    failed: HashSet<CueId>,
    last_status: Option<Status>,
    video_context: VideoContext,
    generation: u64,
}

impl CoordinatorState {
    fn is_eligible(&self, cue: &Cue) -> bool {
        !self.translated.contains(&cue.id)
            && !self.in_flight.contains(&cue.id)
            && !self.failed.contains(&cue.id)
    }
}

/// Loading while the cue under the playhead still lacks a translation.
fn status_at(timeline: &[Cue], now_ms: u64) -> Status {
    match active_cue(timeline, now_ms) {
        Some(cue) if !cue.is_translated() => Status::Loading,
        _ => Status::Idle,
    }
}

impl TranslationCoordinator {
    pub fn new(
        pipeline: SegmentationPipeline,
        translator: Arc<dyn BatchTranslator>,
        clock: Arc<dyn PlaybackClock>,
        config: TranslateConfig,
        events: mpsc::UnboundedSender<SubtitleEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                pipeline,
                translator,
                clock,
                config,
                events,
                translating: AtomicBool::new(false),
                state: Mutex::new(CoordinatorState {
                    last_status: Some(Status::Idle),
                    ..CoordinatorState::default()
                }),
            }),
        }
    }

    pub fn pipeline(&self) -> &SegmentationPipeline {
        &self.inner.pipeline
    }

    pub fn is_translating(&self) -> bool {
        self.inner.translating.load(Ordering::SeqCst)
    }

    /// One playback tick. Returns the handle of the translation batch started
    /// by this tick, if any.
    pub async fn tick(&self, now_ms: u64) -> Option<JoinHandle<()>> {
        let timeline = self.inner.pipeline.timeline().await;
        let status = status_at(&timeline, now_ms);
        self.inner.emit_status(status).await;

        if status == Status::Idle
            && !self.inner.pipeline.is_running()
            && self.inner.pipeline.has_unprocessed_chunks().await
        {
            debug!("Unprocessed cues near {}ms, restarting segmentation", now_ms);
            self.inner.pipeline.start().await;
        }

        if self.inner.translating.swap(true, Ordering::SeqCst) {
            return None;
        }

        let (batch, context, generation) = {
            let mut state = self.inner.state.lock().await;
            let from = now_ms.saturating_sub(self.inner.config.look_behind_ms);
            let to = now_ms.saturating_add(self.inner.config.look_ahead_ms);
            let batch: Vec<Cue> = timeline
                .iter()
                .filter(|cue| cue.start >= from && cue.start <= to)
                .filter(|cue| state.is_eligible(cue))
                .take(self.inner.config.batch_size.max(1))
                .cloned()
                .collect();
            if batch.is_empty() {
                // Released under the lock so a concurrent reset keeps its flag
                self.inner.translating.store(false, Ordering::SeqCst);
                return None;
            }
            state.in_flight.extend(batch.iter().map(|c| c.id));
            (batch, state.video_context.clone(), state.generation)
        };

        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move {
            inner.translate(batch, context, generation).await;
        }))
    }

    /// The playhead jumped: the segmentation window moved with it.
    pub async fn on_seek(&self, now_ms: u64) -> Option<JoinHandle<()>> {
        info!("Seeked to {}ms", now_ms);
        self.inner.pipeline.restart().await;
        self.tick(now_ms).await
    }

    /// Forget all bookkeeping and go back to idle, e.g. when switching videos.
    /// A batch still in flight completes but its results are dropped, and it
    /// no longer blocks batches for the new video.
    pub async fn reset(&self) {
        let mut state = self.inner.state.lock().await;
        let generation = state.generation + 1;
        *state = CoordinatorState {
            generation,
            ..CoordinatorState::default()
        };
        self.inner.translating.store(false, Ordering::SeqCst);
        drop(state);
        self.inner.emit_status(Status::Idle).await;
    }

    pub async fn set_video_context(&self, context: VideoContext) {
        self.inner.state.lock().await.video_context = context;
    }

    /// Make permanently failed cues eligible for translation again.
    pub async fn clear_failed(&self) -> usize {
        let mut state = self.inner.state.lock().await;
        let cleared = state.failed.len();
        state.failed.clear();
        cleared
    }

    pub async fn failed_count(&self) -> usize {
        self.inner.state.lock().await.failed.len()
    }
}

impl CoordinatorInner {
    /// Emit `status` if it differs from the last one emitted.
    async fn emit_status(&self, status: Status) {
        let mut state = self.state.lock().await;
        if state.last_status == Some(status) {
            return;
        }
        state.last_status = Some(status);
        drop(state);
        debug!("Status -> {:?}", status);
        let _ = self.events.send(SubtitleEvent::Status {
            status,
            message: None,
        });
    }

    async fn translate(&self, batch: Vec<Cue>, context: VideoContext, generation: u64) {
        let ids: Vec<CueId> = batch.iter().map(|c| c.id).collect();
        let result = self.translator.translate_batch(&batch, &context).await;

        let mut state = self.state.lock().await;
        // The single-flight flag now belongs to the newer generation
        if state.generation != generation {
            debug!("Dropping translation batch from before reset");
            return;
        }
        for id in &ids {
            state.in_flight.remove(id);
        }

        match result {
            Ok(translated) => {
                state.translated.extend(ids.iter().copied());
                drop(state);
                let updated = self.pipeline.apply_translations(&translated).await;
                info!("Translated {} cues ({} still on the timeline)", translated.len(), updated);
                let _ = self.events.send(SubtitleEvent::CuesTranslated(translated));

                let now = self.clock.current_time_ms();
                let timeline = self.pipeline.timeline().await;
                self.emit_status(status_at(&timeline, now)).await;
            }
            Err(e) => {
                warn!("Translation batch of {} cues failed: {}", ids.len(), e);
                state.failed.extend(ids.iter().copied());
                drop(state);

                let placeholders: Vec<Cue> = batch
                    .into_iter()
                    .map(|cue| {
                        let placeholder = match self.config.display_mode {
                            DisplayMode::TranslationOnly => cue.text.clone(),
                            DisplayMode::Bilingual => String::new(),
                        };
                        Cue {
                            translation: Some(placeholder),
                            ..cue
                        }
                    })
                    .collect();
                self.pipeline.apply_translations(&placeholders).await;
                let _ = self.events.send(SubtitleEvent::CuesTranslated(placeholders));

                // The error is shown until it clears itself; the next tick only
                // emits again once the state under the playhead changes.
                let now = self.clock.current_time_ms();
                let timeline = self.pipeline.timeline().await;
                self.state.lock().await.last_status = Some(status_at(&timeline, now));
                let _ = self.events.send(SubtitleEvent::Status {
                    status: Status::Error,
                    message: Some(e.to_string()),
                });
            }
        }

        let state = self.state.lock().await;
        if state.generation == generation {
            self.translating.store(false, Ordering::SeqCst);
        }
    }
}
