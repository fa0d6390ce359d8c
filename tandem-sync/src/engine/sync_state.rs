//! Internal synchronization state machine
//!
//! The starting and seeking suppressions are phases of this machine rather
//! than flags; `SyncStateKind` is the coarse view published in events.
//!
//! ```text
//! Idle -> Loading -> Starting(AwaitingSeek) -> Starting(Settling) -> Playing
//! Playing -> Correcting -> Playing
//! Playing | Paused -> Seeking(AwaitingSeek) -> Seeking(Settling) -> Playing | Paused
//! any playing state -> Paused
//! ```

use tandem_common::events::SyncStateKind;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum StartPhase {
    /// Waiting for the visual seek to `position`
    AwaitingSeek { position: f64 },
    /// Start instants commanded; external "now playing" transitions are ignored
    Settling,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SeekPhase {
    /// Waiting for the visual seek to `target`; `resume` is the playing intent
    AwaitingSeek { target: f64, resume: bool },
    /// Seek completed; position jumps are still attributed to it
    Settling { resume: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SyncState {
    Idle,
    /// Session created; waiting for the asset load and visual readiness
    Loading,
    Starting(StartPhase),
    Playing,
    /// Transient while a resync stops and restarts audio
    Correcting,
    Seeking(SeekPhase),
    Paused,
}

impl SyncState {
    pub(crate) fn kind(&self) -> SyncStateKind {
        match self {
            SyncState::Idle => SyncStateKind::Idle,
            SyncState::Loading => SyncStateKind::Loading,
            SyncState::Starting(StartPhase::AwaitingSeek { .. }) => SyncStateKind::Starting,
            // Both pipelines are committed to start; only the suppression remains
            SyncState::Starting(StartPhase::Settling) => SyncStateKind::Playing,
            SyncState::Playing => SyncStateKind::Playing,
            SyncState::Correcting => SyncStateKind::Correcting,
            SyncState::Seeking(SeekPhase::AwaitingSeek { .. }) => SyncStateKind::Seeking,
            SyncState::Seeking(SeekPhase::Settling { resume: true }) => SyncStateKind::Playing,
            SyncState::Seeking(SeekPhase::Settling { resume: false }) => SyncStateKind::Paused,
            SyncState::Paused => SyncStateKind::Paused,
        }
    }

    pub(crate) fn is_starting(&self) -> bool {
        matches!(self, SyncState::Starting(_))
    }

    pub(crate) fn is_seeking(&self) -> bool {
        matches!(self, SyncState::Seeking(_))
    }

    /// Whether the user-facing intent is "playing"
    pub(crate) fn intends_playing(&self) -> bool {
        match self {
            SyncState::Loading | SyncState::Starting(_) | SyncState::Playing | SyncState::Correcting => true,
            SyncState::Seeking(SeekPhase::AwaitingSeek { resume, .. })
            | SyncState::Seeking(SeekPhase::Settling { resume }) => *resume,
            SyncState::Idle | SyncState::Paused => false,
        }
    }
}
