//! Playback sessions
//!
//! A session is created for each play/advance request and superseded the
//! instant the next one begins. Within a session, `epoch` identifies the
//! current seek/start operation and `schedule_generation` the live audio
//! range, so late completions of earlier operations can be recognized.

use crate::pipeline::{MediaAsset, MediaItem, SampleRange};
use std::sync::Arc;
use tandem_common::events::{AudioMode, AudioUnavailableReason, SessionId};

/// Hands out strictly increasing session ids
#[derive(Debug)]
pub(crate) struct SessionTracker {
    current: SessionId,
}

impl SessionTracker {
    pub(crate) fn new() -> Self {
        Self {
            current: SessionId::NONE,
        }
    }

    /// Supersede the live session and return the new live id
    pub(crate) fn begin_session(&mut self) -> SessionId {
        self.current = self.current.next();
        self.current
    }

    pub(crate) fn current(&self) -> SessionId {
        self.current
    }

    pub(crate) fn is_current(&self, id: SessionId) -> bool {
        id != SessionId::NONE && id == self.current
    }
}

/// Audio side of a session
#[derive(Debug, Clone)]
pub(crate) enum AudioSlot {
    /// Asset load in flight
    Pending,
    Ready(Arc<MediaAsset>),
    Unavailable(AudioUnavailableReason),
}

/// The one live (scheduled, not yet consumed) audio range
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScheduledRange {
    pub(crate) range: SampleRange,
    pub(crate) generation: u64,
}

#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) id: SessionId,
    pub(crate) item: MediaItem,
    pub(crate) audio: AudioSlot,
    pub(crate) visual_ready: bool,
    /// Where the start protocol begins
    pub(crate) start_position: f64,
    /// Whether the start protocol has run
    pub(crate) started: bool,
    /// Audio was paused by an interruption rather than by the user
    pub(crate) interrupted: bool,
    pub(crate) epoch: u64,
    pub(crate) schedule: Option<ScheduledRange>,
    schedule_generation: u64,
}

impl Session {
    pub(crate) fn new(id: SessionId, item: MediaItem, visual_ready: bool) -> Self {
        Self {
            id,
            item,
            audio: AudioSlot::Pending,
            visual_ready,
            start_position: 0.0,
            started: false,
            interrupted: false,
            epoch: 0,
            schedule: None,
            schedule_generation: 0,
        }
    }

    pub(crate) fn asset(&self) -> Option<Arc<MediaAsset>> {
        match &self.audio {
            AudioSlot::Ready(asset) => Some(Arc::clone(asset)),
            _ => None,
        }
    }

    pub(crate) fn audio_mode(&self) -> AudioMode {
        match self.audio {
            AudioSlot::Pending => AudioMode::Pending,
            AudioSlot::Ready(_) => AudioMode::Synced,
            AudioSlot::Unavailable(_) => AudioMode::VideoOnly,
        }
    }

    /// Why the session went video-only, if it did
    pub(crate) fn unavailable_reason(&self) -> Option<AudioUnavailableReason> {
        match self.audio {
            AudioSlot::Unavailable(reason) => Some(reason),
            _ => None,
        }
    }

    /// Start a new seek/start/pause operation; earlier timers become stale
    pub(crate) fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    pub(crate) fn next_generation(&mut self) -> u64 {
        self.schedule_generation += 1;
        self.schedule_generation
    }
}
