//! Playback-side interface: where the current time comes from and how time
//! advances/seeks are announced. Nothing here ever moves the playhead on the
//! player's behalf.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Read-only view of the player's clock.
pub trait PlaybackClock: Send + Sync {
    fn current_time_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Regular progress notification
    TimeUpdate(u64),
    /// The user jumped to a new position
    Seeked(u64),
}

impl PlaybackEvent {
    pub fn time_ms(&self) -> u64 {
        match *self {
            Self::TimeUpdate(t) | Self::Seeked(t) => t,
        }
    }
}

/// Clock whose time is set explicitly. Used for simulated playback and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            now_ms: AtomicU64::new(now_ms),
        })
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl PlaybackClock for ManualClock {
    fn current_time_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Fan-out of playback notifications. Subscribing hands out a receiver;
/// dropping the receiver unsubscribes.
pub struct PlaybackFeed {
    clock: Arc<ManualClock>,
    tx: broadcast::Sender<PlaybackEvent>,
}

impl PlaybackFeed {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { clock, tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.tx.subscribe()
    }

    pub fn clock(&self) -> Arc<ManualClock> {
        Arc::clone(&self.clock)
    }

    /// Move the clock forward and announce it.
    pub fn advance_to(&self, now_ms: u64) {
        self.clock.set(now_ms);
        // No subscribers is fine: nobody is watching yet
        let _ = self.tx.send(PlaybackEvent::TimeUpdate(now_ms));
    }

    pub fn seek(&self, now_ms: u64) {
        self.clock.set(now_ms);
        let _ = self.tx.send(PlaybackEvent::Seeked(now_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_feed_sets_clock_and_notifies() {
        let feed = PlaybackFeed::new(ManualClock::new(0));
        let mut rx = feed.subscribe();

        feed.advance_to(1_500);
        feed.seek(300);

        assert_eq!(rx.recv().await.unwrap(), PlaybackEvent::TimeUpdate(1_500));
        assert_eq!(rx.recv().await.unwrap(), PlaybackEvent::Seeked(300));
        assert_eq!(feed.clock().current_time_ms(), 300);
    }
}
