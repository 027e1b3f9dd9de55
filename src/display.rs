use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cue::Cue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Idle,
    Loading,
    Error,
}

impl Status {
    /// Loading and error are shown temporarily and clear themselves.
    pub fn is_transient(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Notifications published by the translation coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtitleEvent {
    /// Emitted only on status transitions
    Status {
        status: Status,
        message: Option<String>,
    },
    /// A batch of cues gained translations (or failure placeholders)
    CuesTranslated(Vec<Cue>),
}

/// The cue whose `[start, end)` contains `now_ms`. When several do, which
/// happens briefly around a chunk replacement, the later start wins.
pub fn active_cue(timeline: &[Cue], now_ms: u64) -> Option<&Cue> {
    timeline
        .iter()
        .filter(|cue| cue.contains(now_ms))
        .max_by_key(|cue| cue.start)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    pub status: Status,
    pub message: Option<String>,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            status: Status::Idle,
            message: None,
        }
    }
}

/// Owns the status line shown to the user. A transient status reverts to idle
/// after `clear_after` unless a newer status arrives first.
pub struct DisplayScheduler {
    state: Arc<Mutex<DisplayState>>,
    clear_after: Duration,
    pending_clear: Option<JoinHandle<()>>,
}

impl DisplayScheduler {
    pub fn new(clear_after: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(DisplayState::default())),
            clear_after,
            pending_clear: None,
        }
    }

    pub async fn set_status(&mut self, status: Status, message: Option<String>) {
        if let Some(pending) = self.pending_clear.take() {
            pending.abort();
        }

        {
            let mut state = self.state.lock().await;
            state.status = status;
            state.message = message;
        }

        if status.is_transient() {
            let state = Arc::clone(&self.state);
            let delay = self.clear_after;
            self.pending_clear = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let mut state = state.lock().await;
                if state.status == status {
                    debug!("Auto-clearing {:?} status", status);
                    *state = DisplayState::default();
                }
            }));
        }
    }

    pub async fn snapshot(&self) -> DisplayState {
        self.state.lock().await.clone()
    }

    /// Back to idle immediately, cancelling any pending auto-clear.
    pub async fn reset(&mut self) {
        self.set_status(Status::Idle, None).await;
    }
}

impl Drop for DisplayScheduler {
    fn drop(&mut self) {
        if let Some(pending) = self.pending_clear.take() {
            pending.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cue::CueId;

    #[test]
    fn test_active_cue_prefers_later_start() {
        let timeline = vec![
            Cue::new(CueId(1), "old", 0, 2_000),
            Cue::new(CueId(2), "new", 1_500, 3_000),
        ];
        assert_eq!(active_cue(&timeline, 1_000).map(|c| c.id), Some(CueId(1)));
        assert_eq!(active_cue(&timeline, 1_700).map(|c| c.id), Some(CueId(2)));
        assert_eq!(active_cue(&timeline, 3_000), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_status_auto_clears() {
        let mut scheduler = DisplayScheduler::new(Duration::from_secs(5));
        scheduler.set_status(Status::Loading, None).await;
        assert_eq!(scheduler.snapshot().await.status, Status::Loading);

        tokio::time::advance(Duration::from_millis(4_900)).await;
        tokio::task::yield_now().await;
        assert_eq!(scheduler.snapshot().await.status, Status::Loading);

        tokio::time::advance(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert_eq!(scheduler.snapshot().await, DisplayState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_status_cancels_pending_clear() {
        let mut scheduler = DisplayScheduler::new(Duration::from_secs(5));
        scheduler.set_status(Status::Loading, None).await;

        tokio::time::advance(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;
        scheduler
            .set_status(Status::Error, Some("quota exceeded".to_string()))
            .await;

        // The loading timer would have fired here
        tokio::time::advance(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;
        let state = scheduler.snapshot().await;
        assert_eq!(state.status, Status::Error);
        assert_eq!(state.message.as_deref(), Some("quota exceeded"));

        tokio::time::advance(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;
        assert_eq!(scheduler.snapshot().await.status, Status::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_is_not_scheduled() {
        let mut scheduler = DisplayScheduler::new(Duration::from_secs(5));
        scheduler.set_status(Status::Loading, None).await;
        scheduler.reset().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert_eq!(scheduler.snapshot().await.status, Status::Idle);
    }
}
