use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::config::{Config, DisplayMode};
use crate::cue::Cue;
use crate::display::{active_cue, DisplayScheduler, Status, SubtitleEvent};
use crate::playback::{PlaybackClock, PlaybackEvent};
use crate::segment::{SegmentationPipeline, Segmenter};
use crate::translate::{BatchTranslator, TranslationCoordinator, VideoContext};

/// Everything the UI needs to draw the subtitle area at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFrame {
    pub cue: Option<Cue>,
    pub status: Status,
    pub message: Option<String>,
}

impl DisplayFrame {
    /// Subtitle lines to show for this frame.
    pub fn lines(&self, mode: DisplayMode) -> Vec<String> {
        let Some(cue) = &self.cue else {
            return Vec::new();
        };
        let translation = cue
            .translation
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        match (mode, translation) {
            (DisplayMode::Bilingual, Some(t)) => vec![cue.text.clone(), t.to_string()],
            (DisplayMode::Bilingual, None) => vec![cue.text.clone()],
            (DisplayMode::TranslationOnly, Some(t)) => vec![t.to_string()],
            (DisplayMode::TranslationOnly, None) => Vec::new(),
        }
    }
}

pub struct SubtitleSession {
    id: Uuid,
    pipeline: SegmentationPipeline,
    coordinator: TranslationCoordinator,
    scheduler: DisplayScheduler,
    events: mpsc::UnboundedReceiver<SubtitleEvent>,
    display_mode: DisplayMode,
    batches: Vec<JoinHandle<()>>,
}

impl SubtitleSession {
    pub async fn new(
        raw: Vec<Cue>,
        title: &str,
        segmenter: Arc<dyn Segmenter>,
        translator: Arc<dyn BatchTranslator>,
        clock: Arc<dyn PlaybackClock>,
        config: &Config,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pipeline = SegmentationPipeline::new(
            raw,
            segmenter,
            Arc::clone(&clock),
            config.segmentation.clone(),
        );
        let coordinator = TranslationCoordinator::new(
            pipeline.clone(),
            translator,
            clock,
            config.translate.clone(),
            tx,
        );

        let session = Self {
            id: Uuid::new_v4(),
            pipeline,
            coordinator,
            scheduler: DisplayScheduler::new(Duration::from_millis(config.display.status_clear_ms)),
            events: rx,
            display_mode: config.translate.display_mode,
            batches: Vec::new(),
        };
        session.load_context(title).await;
        info!("Session {} created for \"{}\"", session.id, title);
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn pipeline(&self) -> &SegmentationPipeline {
        &self.pipeline
    }

    pub fn coordinator(&self) -> &TranslationCoordinator {
        &self.coordinator
    }

    /// Begin segmenting around the current playhead.
    pub async fn start(&self) {
        self.pipeline.start().await;
    }

    async fn load_context(&self, title: &str) {
        let raw = self.pipeline.raw_cues().await;
        self.coordinator
            .set_video_context(VideoContext::new(title, &raw))
            .await;
    }

    pub async fn handle_event(&mut self, event: PlaybackEvent) {
        let batch = match event {
            PlaybackEvent::TimeUpdate(now) => self.coordinator.tick(now).await,
            PlaybackEvent::Seeked(now) => self.coordinator.on_seek(now).await,
        };
        self.batches.retain(|handle| !handle.is_finished());
        self.batches.extend(batch);
        self.pump_events().await;
    }

    async fn apply_event(&mut self, event: SubtitleEvent) {
        match event {
            SubtitleEvent::Status { status, message } => {
                self.scheduler.set_status(status, message).await;
            }
            SubtitleEvent::CuesTranslated(cues) => {
                debug!("{} cues gained translations", cues.len());
            }
        }
    }

    /// Forward pending coordinator notifications to the status line.
    pub async fn pump_events(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.events.try_recv() {
            self.apply_event(event).await;
            count += 1;
        }
        count
    }

    /// Wait for outstanding segmentation and translation work, then apply the
    /// resulting notifications.
    pub async fn settle(&mut self) {
        self.pipeline.wait_idle().await;
        for handle in self.batches.drain(..) {
            if let Err(e) = handle.await {
                warn!("Translation task ended abnormally: {}", e);
            }
        }
        self.pump_events().await;
    }

    pub async fn current_display(&self, now_ms: u64) -> DisplayFrame {
        let timeline = self.pipeline.timeline().await;
        let state = self.scheduler.snapshot().await;
        DisplayFrame {
            cue: active_cue(&timeline, now_ms).cloned(),
            status: state.status,
            message: state.message,
        }
    }

    pub async fn timeline(&self) -> Vec<Cue> {
        self.pipeline.timeline().await
    }

    /// Switch to another video. Work still in flight for the previous one
    /// finishes in the background and is discarded.
    pub async fn reset(&mut self, raw: Vec<Cue>, title: &str) {
        self.pipeline.stop().await;
        self.pipeline.reset(raw).await;
        self.coordinator.reset().await;
        self.load_context(title).await;
        self.batches.clear();
        self.pump_events().await;
        self.scheduler.reset().await;
        info!("Session {} switched to \"{}\"", self.id, title);
    }

    /// Follow playback notifications until the feed closes or `cancel` fires.
    pub async fn run(&mut self, mut feed: broadcast::Receiver<PlaybackEvent>, cancel: CancellationToken) {
        let span = tracing::info_span!("session", session_id = %self.id);
        async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Session cancelled");
                        break;
                    }
                    received = feed.recv() => match received {
                        Ok(event) => self.handle_event(event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Skipped {} playback events", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    Some(event) = self.events.recv() => self.apply_event(event).await,
                }
            }
            self.pipeline.stop().await;
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranslateConfig;
    use crate::error::Result;
    use crate::playback::{ManualClock, PlaybackFeed};
    use crate::segment::pipeline::tests::{sentence_cues, EchoSegmenter};
    use async_trait::async_trait;

    struct UpperTranslator;

    #[async_trait]
    impl BatchTranslator for UpperTranslator {
        async fn translate_batch(&self, cues: &[Cue], _context: &VideoContext) -> Result<Vec<Cue>> {
            Ok(cues
                .iter()
                .map(|cue| Cue {
                    translation: Some(cue.text.to_uppercase()),
                    ..cue.clone()
                })
                .collect())
        }
    }

    fn config(mode: DisplayMode) -> Config {
        let mut config = Config::default();
        config.segmentation.source_language = Some("en".to_string());
        config.translate = TranslateConfig {
            display_mode: mode,
            ..TranslateConfig::default()
        };
        config
    }

    async fn session(clock: Arc<ManualClock>, mode: DisplayMode) -> SubtitleSession {
        SubtitleSession::new(
            sentence_cues(3, 2_000),
            "Demo",
            Arc::new(EchoSegmenter),
            Arc::new(UpperTranslator),
            clock,
            &config(mode),
        )
        .await
    }

    #[tokio::test]
    async fn test_events_drive_translation_and_display() {
        let clock = ManualClock::new(0);
        let mut session = session(clock.clone(), DisplayMode::Bilingual).await;
        session.start().await;
        session.pipeline().wait_idle().await;

        session.handle_event(PlaybackEvent::TimeUpdate(0)).await;
        assert_eq!(session.current_display(0).await.status, Status::Loading);

        session.settle().await;
        clock.set(2_100);
        session.handle_event(PlaybackEvent::TimeUpdate(2_100)).await;

        let frame = session.current_display(2_100).await;
        assert_eq!(frame.status, Status::Idle);
        assert_eq!(
            frame.lines(DisplayMode::Bilingual),
            vec![
                "This is sentence number 1.".to_string(),
                "THIS IS SENTENCE NUMBER 1.".to_string()
            ]
        );
        assert_eq!(
            frame.lines(DisplayMode::TranslationOnly),
            vec!["THIS IS SENTENCE NUMBER 1.".to_string()]
        );

        // Between cues nothing is shown
        assert!(session.current_display(1_500).await.cue.is_none());
    }

    #[tokio::test]
    async fn test_run_follows_feed_until_closed() {
        let clock = ManualClock::new(0);
        let feed = PlaybackFeed::new(clock.clone());
        let mut session = session(clock, DisplayMode::TranslationOnly).await;
        session.start().await;
        session.pipeline().wait_idle().await;

        let rx = feed.subscribe();
        feed.advance_to(0);
        feed.seek(4_200);
        drop(feed);

        session.run(rx, CancellationToken::new()).await;
        session.settle().await;

        let timeline = session.timeline().await;
        assert_eq!(timeline.len(), 3);
        assert!(timeline.iter().all(|c| c.is_translated()));
        assert_eq!(
            session.current_display(4_200).await.lines(DisplayMode::TranslationOnly),
            vec!["THIS IS SENTENCE NUMBER 2.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let clock = ManualClock::new(0);
        let feed = PlaybackFeed::new(clock.clone());
        let mut session = session(clock, DisplayMode::Bilingual).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        session.run(feed.subscribe(), cancel).await;
        assert!(session.timeline().await.is_empty());
    }

    #[tokio::test]
    async fn test_reset_switches_video() {
        let clock = ManualClock::new(0);
        let mut session = session(clock, DisplayMode::Bilingual).await;
        session.start().await;
        session.pipeline().wait_idle().await;
        session.handle_event(PlaybackEvent::TimeUpdate(0)).await;
        session.settle().await;
        assert_eq!(session.timeline().await.len(), 3);

        session
            .reset(vec![Cue::new(crate::cue::CueId(0), "Another video.", 0, 1_500)], "Other")
            .await;
        assert!(session.timeline().await.is_empty());
        assert_eq!(session.current_display(0).await.status, Status::Idle);

        session.start().await;
        session.pipeline().wait_idle().await;
        session.handle_event(PlaybackEvent::TimeUpdate(0)).await;
        session.settle().await;
        let timeline = session.timeline().await;
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].translation.as_deref(), Some("ANOTHER VIDEO."));
    }
}
