//! Synchronization-related type definitions
//!
//! Supporting types for session identity, engine state and degraded-mode
//! reporting.

use serde::{Deserialize, Serialize};

/// Playback session identifier
///
/// Strictly increasing over the engine's lifetime, never reused. Every
/// asynchronous completion carries the id that was live when it was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl SessionId {
    /// The id that precedes every real session
    pub const NONE: SessionId = SessionId(0);

    /// The id following this one
    pub fn next(self) -> SessionId {
        SessionId(self.0 + 1)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Externally visible engine state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStateKind {
    /// No session
    Idle,
    /// Waiting for the audio asset and visual readiness
    Loading,
    /// Synchronized start in progress (includes its settle delay)
    Starting,
    /// Both pipelines running
    Playing,
    /// Audio being realigned to the visual position
    Correcting,
    /// User seek in progress (includes its settle delay)
    Seeking,
    /// Both pipelines paused
    Paused,
    /// Session replaced by a newer one
    Superseded,
}

impl SyncStateKind {
    /// Whether the session intends audible playback in this state
    pub fn is_playing(self) -> bool {
        matches!(self, SyncStateKind::Playing | SyncStateKind::Correcting)
    }
}

impl std::fmt::Display for SyncStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncStateKind::Idle => "idle",
            SyncStateKind::Loading => "loading",
            SyncStateKind::Starting => "starting",
            SyncStateKind::Playing => "playing",
            SyncStateKind::Correcting => "correcting",
            SyncStateKind::Seeking => "seeking",
            SyncStateKind::Paused => "paused",
            SyncStateKind::Superseded => "superseded",
        };
        f.write_str(name)
    }
}

/// Whether audio participates in the current session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    /// Audio asset not resolved yet
    Pending,
    /// Audio pipeline scheduled against the visual pipeline
    Synced,
    /// Degraded mode: visual pipeline only
    VideoOnly,
}

impl std::fmt::Display for AudioMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioMode::Pending => write!(f, "pending"),
            AudioMode::Synced => write!(f, "synced"),
            AudioMode::VideoOnly => write!(f, "video_only"),
        }
    }
}

/// Why a session fell back to video-only
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AudioUnavailableReason {
    /// Asset could not be opened after the retry
    LoadFailed,
    /// Audio engine refused to start after the restart attempt
    EngineStartFailed,
    /// Audio routing could not be configured for the asset format
    RoutingFailed,
    /// Nothing left to play from the target sample
    ScheduleUnderrun,
    /// Visual seek never completed
    SeekTimeout,
    /// Any other audio pipeline failure
    PipelineFailed,
}

impl std::fmt::Display for AudioUnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioUnavailableReason::LoadFailed => write!(f, "load failed"),
            AudioUnavailableReason::EngineStartFailed => write!(f, "audio engine start failed"),
            AudioUnavailableReason::RoutingFailed => write!(f, "audio routing failed"),
            AudioUnavailableReason::ScheduleUnderrun => write!(f, "schedule underrun"),
            AudioUnavailableReason::SeekTimeout => write!(f, "seek timeout"),
            AudioUnavailableReason::PipelineFailed => write!(f, "audio pipeline failed"),
        }
    }
}

/// Discrete event that may move the engine into `Correcting`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResyncTrigger {
    /// User released a seek
    UserSeek,
    /// OS-level play/pause control
    ExternalTransport,
    /// Visual pipeline reported a position jump it was not asked for
    PositionJump,
    /// Audio interruption ended with a resume request
    InterruptionRecovery,
    /// Effects chain switched on or off
    EffectsToggled,
    /// Visual pipeline started playing on its own
    ExternalRateChange,
    /// OS tore down and rebuilt the audio graph
    AudioEngineReset,
    /// User resumed a paused session
    UserResume,
}

impl std::fmt::Display for ResyncTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResyncTrigger::UserSeek => write!(f, "user seek"),
            ResyncTrigger::ExternalTransport => write!(f, "external transport"),
            ResyncTrigger::PositionJump => write!(f, "position jump"),
            ResyncTrigger::InterruptionRecovery => write!(f, "interruption recovery"),
            ResyncTrigger::EffectsToggled => write!(f, "effects toggled"),
            ResyncTrigger::ExternalRateChange => write!(f, "external rate change"),
            ResyncTrigger::AudioEngineReset => write!(f, "audio engine reset"),
            ResyncTrigger::UserResume => write!(f, "user resume"),
        }
    }
}
