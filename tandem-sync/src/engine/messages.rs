//! Engine mailbox messages
//!
//! Everything that mutates engine state arrives as one of these. Completions
//! of asynchronous work carry the session (and, where relevant, the operation
//! epoch or schedule generation) they were issued for.

use super::queue::Direction;
use super::resync::DriftSample;
use crate::error::Result;
use crate::pipeline::{AudioFormat, MediaItem};
use serde::{Deserialize, Serialize};
use tandem_common::events::SessionId;
use tokio::sync::oneshot;
use uuid::Uuid;

/// OS media-control command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportCommand {
    Play,
    Pause,
    Toggle,
}

/// Notification from the platform or the visual pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlatformEvent {
    /// Visual pipeline can seek and play `item_id`
    VisualReady { item_id: Uuid },
    /// Visual position moved without an engine-issued seek
    PositionJump,
    /// Lock-screen / headset / remote control
    RemoteTransport { command: TransportCommand },
    /// Visual pipeline rate changed on its own
    VisualRateChanged { playing: bool },
    InterruptionBegan,
    InterruptionEnded { should_resume: bool },
    /// Audio output route disappeared (e.g. headphones unplugged)
    RouteLost,
    /// OS tore down and rebuilt the audio graph
    AudioEngineReset,
    /// Visual pipeline reached the end of `item_id`
    VisualPlaybackEnded { item_id: Uuid },
}

/// Control-surface request
#[derive(Debug)]
pub(crate) enum ControlCommand {
    Play(MediaItem),
    SetQueue { items: Vec<MediaItem>, start_index: usize },
    Seek(f64),
    TogglePause,
    Advance(Direction),
    SetEffectsEnabled(bool),
}

pub(crate) enum EngineMessage {
    Control(ControlCommand),
    Platform(PlatformEvent),
    AssetLoaded {
        session: SessionId,
        attempt: u8,
        result: Result<AudioFormat>,
    },
    RetryAssetLoad {
        session: SessionId,
    },
    SeekCompleted {
        session: SessionId,
        epoch: u64,
        finished: bool,
    },
    SeekTimedOut {
        session: SessionId,
        epoch: u64,
    },
    SettleElapsed {
        session: SessionId,
        epoch: u64,
    },
    RangeConsumed {
        session: SessionId,
        generation: u64,
    },
    MeasureDrift(oneshot::Sender<Option<DriftSample>>),
    Shutdown,
}
