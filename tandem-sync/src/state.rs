//! Shared engine status
//!
//! Snapshot of the engine's state that the control surface can read without a
//! round trip through the engine's mailbox.
//!
//! **Responsibilities:**
//! - Hold the latest `EngineStatus` behind a tokio `RwLock`
//! - Own the `EventBus` through which the engine publishes `SyncEvent`s

use serde::Serialize;
use tandem_common::events::{AudioMode, AudioUnavailableReason, EventBus, SessionId, SyncEvent, SyncStateKind};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Point-in-time view of the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    /// Live session (`SessionId::NONE` before the first play)
    pub session_id: SessionId,
    /// Item of the live session
    pub item_id: Option<Uuid>,
    pub state: SyncStateKind,
    pub audio_mode: AudioMode,
    /// Set when the live session fell back to video-only
    pub audio_unavailable_reason: Option<AudioUnavailableReason>,
    /// Whether playback intent is "playing"
    pub playing: bool,
    pub effects_enabled: bool,
    /// Visual position at the last publish (seconds)
    pub position_secs: f64,
    /// Asset duration once the audio asset has loaded
    pub duration_secs: Option<f64>,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            session_id: SessionId::NONE,
            item_id: None,
            state: SyncStateKind::Idle,
            audio_mode: AudioMode::Pending,
            audio_unavailable_reason: None,
            playing: false,
            effects_enabled: false,
            position_secs: 0.0,
            duration_secs: None,
        }
    }
}

/// Shared state accessible by the engine and every handle
pub struct SharedState {
    /// Latest status published by the engine
    status: RwLock<EngineStatus>,

    /// Event broadcaster
    event_bus: EventBus,
}

impl SharedState {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            status: RwLock::new(EngineStatus::default()),
            event_bus: EventBus::new(event_capacity),
        }
    }

    /// Broadcast an event to all subscribers
    pub fn broadcast_event(&self, event: SyncEvent) {
        // No subscribers is fine
        self.event_bus.emit_lossy(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_bus.subscribe()
    }

    pub async fn get_status(&self) -> EngineStatus {
        self.status.read().await.clone()
    }

    pub async fn set_status(&self, status: EngineStatus) {
        *self.status.write().await = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_status_is_idle() {
        let state = SharedState::new(16);
        let status = state.get_status().await;
        assert_eq!(status.session_id, SessionId::NONE);
        assert_eq!(status.state, SyncStateKind::Idle);
        assert!(!status.playing);
        assert_eq!(status.audio_unavailable_reason, None);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscriber() {
        let state = SharedState::new(16);
        let mut rx = state.subscribe_events();

        state.broadcast_event(SyncEvent::EffectsChanged {
            enabled: true,
            timestamp: chrono::Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "EffectsChanged");
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_silent() {
        let state = SharedState::new(16);
        state.broadcast_event(SyncEvent::EffectsChanged {
            enabled: false,
            timestamp: chrono::Utc::now(),
        });
    }
}
