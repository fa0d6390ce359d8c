//! Event types for the Tandem event system
//!
//! Provides the `SyncEvent` enum and the broadcast `EventBus` through which the
//! engine publishes its state and position signals.

mod sync_types;

pub use sync_types::{AudioMode, AudioUnavailableReason, ResyncTrigger, SessionId, SyncStateKind};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Tandem event types
///
/// Events are broadcast via `EventBus` and serialize to tagged JSON.
/// The control surface returns immediately; these events are how the
/// surrounding application observes what actually happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A new session became current
    SessionStarted {
        /// New live session
        session_id: SessionId,
        /// Media item the session plays
        item_id: Uuid,
        /// When the session began
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A session was replaced by a newer one
    ///
    /// Completions still in flight for `session_id` become no-ops.
    SessionSuperseded {
        session_id: SessionId,
        superseded_by: SessionId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Engine state changed
    StateChanged {
        session_id: SessionId,
        /// State before change
        old_state: SyncStateKind,
        /// State after change
        new_state: SyncStateKind,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Both pipelines were commanded to begin at a shared instant
    ///
    /// `audio_start_offset_ms` is `None` for a video-only start.
    SynchronizedStart {
        session_id: SessionId,
        /// Position both pipelines begin from (seconds)
        position_secs: f64,
        /// First audio frame scheduled, if audio participates
        target_sample: Option<u64>,
        /// Lead time before the visual start instant
        warm_up_ms: u64,
        /// Extra delay applied to the audio start instant
        audio_start_offset_ms: Option<u64>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Soft warning: audio is unavailable for this item
    ///
    /// Playback continues video-only; never fatal.
    AudioUnavailable {
        session_id: SessionId,
        item_id: Uuid,
        reason: AudioUnavailableReason,
        /// Underlying error text
        detail: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Audio was stopped and rescheduled to follow the visual pipeline
    ResyncPerformed {
        session_id: SessionId,
        trigger: ResyncTrigger,
        /// First frame of the new schedule
        target_sample: u64,
        /// Measured drift (None when forced or audio was not playing)
        drift_ms: Option<f64>,
        /// Whether audible output was restarted
        restarted: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Resync trigger absorbed because drift was under the threshold
    ResyncSkipped {
        session_id: SessionId,
        trigger: ResyncTrigger,
        drift_ms: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic position signal while playing
    PositionUpdate {
        session_id: SessionId,
        item_id: Uuid,
        /// Visual pipeline position (seconds)
        position_secs: f64,
        /// Asset duration if the audio asset is loaded
        duration_secs: Option<f64>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Effects chain switched on or off
    EffectsChanged {
        enabled: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SyncEvent {
    /// Session the event belongs to, if any
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            SyncEvent::SessionStarted { session_id, .. }
            | SyncEvent::SessionSuperseded { session_id, .. }
            | SyncEvent::StateChanged { session_id, .. }
            | SyncEvent::SynchronizedStart { session_id, .. }
            | SyncEvent::AudioUnavailable { session_id, .. }
            | SyncEvent::ResyncPerformed { session_id, .. }
            | SyncEvent::ResyncSkipped { session_id, .. }
            | SyncEvent::PositionUpdate { session_id, .. } => Some(*session_id),
            SyncEvent::EffectsChanged { .. } => None,
        }
    }

    /// Event type name as used in the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::SessionStarted { .. } => "SessionStarted",
            SyncEvent::SessionSuperseded { .. } => "SessionSuperseded",
            SyncEvent::StateChanged { .. } => "StateChanged",
            SyncEvent::SynchronizedStart { .. } => "SynchronizedStart",
            SyncEvent::AudioUnavailable { .. } => "AudioUnavailable",
            SyncEvent::ResyncPerformed { .. } => "ResyncPerformed",
            SyncEvent::ResyncSkipped { .. } => "ResyncSkipped",
            SyncEvent::PositionUpdate { .. } => "PositionUpdate",
            SyncEvent::EffectsChanged { .. } => "EffectsChanged",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Event distribution bus for engine signals
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block the engine)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use tandem_common::events::{EventBus, SyncEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SyncEvent::EffectsChanged {
///     enabled: true,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(SyncEvent::EffectsChanged { enabled: true, .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SyncEvent,
    ) -> Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
