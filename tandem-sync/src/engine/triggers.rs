//! Control surface and platform event handling
//!
//! **Responsibilities:**
//! - seek / toggle-pause / advance / effects toggle
//! - Mapping platform notifications onto resyncs, pauses and resumes
//! - Suppressing notifications caused by the engine's own starts and seeks

use super::core::{unavailable_reason, SyncEngine};
use super::messages::{PlatformEvent, TransportCommand};
use super::queue::Direction;
use super::sync_state::{SeekPhase, StartPhase, SyncState};
use tandem_common::events::{AudioMode, ResyncTrigger, SyncEvent};
use tracing::{debug, info};
use uuid::Uuid;

impl SyncEngine {
    // ============================================================================================
    // Control surface
    // ============================================================================================

    pub(super) fn seek(&mut self, to_secs: f64) {
        let to_secs = to_secs.max(0.0);
        let Some(session) = self.session.as_mut() else {
            debug!("Seek ignored: no session");
            return;
        };
        if !session.started {
            debug!("Session {}: start position set to {:.3}s", session.id, to_secs);
            session.start_position = to_secs;
            return;
        }

        let resume = self.sync_state.intends_playing();
        info!("Session {}: seek to {:.3}s", session.id, to_secs);
        self.audio.pause();
        self.transition(SyncState::Seeking(SeekPhase::AwaitingSeek {
            target: to_secs,
            resume,
        }));
        self.issue_seek(to_secs);
    }

    /// The engine-issued seek finished: restart both pipelines from `target`
    /// or just reschedule
    pub(super) fn finish_user_seek(&mut self, target: f64, resume: bool) {
        self.transition(SyncState::Seeking(SeekPhase::Settling { resume }));
        self.arm_settle(self.config.seek_settle());

        if !resume {
            if self.visual.is_playing() {
                self.visual.pause();
            }
            self.resync(target, true, ResyncTrigger::UserSeek);
        } else if self.visual.is_playing() {
            let position = self.visual.current_position();
            self.resync(position, true, ResyncTrigger::UserSeek);
        } else {
            self.prepare_audio(target);
            self.start_at_reference(target);
        }
    }

    pub(super) fn toggle_pause(&mut self) {
        if self.session.is_none() {
            debug!("Toggle pause ignored: no session");
            return;
        }
        if self.sync_state.intends_playing() {
            self.pause_session();
        } else {
            self.resume_session(ResyncTrigger::UserResume);
        }
    }

    /// Pause both pipelines
    pub(super) fn pause_session(&mut self) {
        match self.sync_state {
            SyncState::Idle | SyncState::Paused => {}
            SyncState::Seeking(SeekPhase::AwaitingSeek { target, .. }) => {
                // Applied when the seek completes
                self.sync_state = SyncState::Seeking(SeekPhase::AwaitingSeek { target, resume: false });
                self.audio.pause();
            }
            _ => {
                info!("Session {}: paused", self.sessions.current());
                self.visual.pause();
                self.audio.pause();
                self.bump_epoch();
                self.transition(SyncState::Paused);
            }
        }
    }

    /// Resume a paused session with a fresh synchronized start from the
    /// visual position
    pub(super) fn resume_session(&mut self, trigger: ResyncTrigger) {
        let Some(session) = &self.session else {
            debug!("Resume ignored: no session");
            return;
        };
        match self.sync_state {
            SyncState::Seeking(SeekPhase::AwaitingSeek { target, .. }) => {
                self.sync_state = SyncState::Seeking(SeekPhase::AwaitingSeek { target, resume: true });
                return;
            }
            SyncState::Paused | SyncState::Seeking(SeekPhase::Settling { resume: false }) => {}
            _ => {
                debug!("Resume ignored: already playing");
                return;
            }
        }

        if !session.started {
            self.transition(SyncState::Loading);
            self.maybe_start();
            return;
        }

        info!("Session {}: resuming ({})", session.id, trigger);
        let position = self.visual.current_position();
        if self.visual.is_playing() {
            self.visual.pause();
        }
        self.begin_synchronized(position, Some(trigger));
    }

    pub(super) fn advance(&mut self, direction: Direction) {
        match self.queue.advance(direction) {
            Some(item) => {
                info!("Advancing {:?} to '{}'", direction, item.title);
                self.start_session(item);
            }
            None => info!("Advance {:?} ignored: queue is empty", direction),
        }
    }

    pub(super) fn set_effects_enabled(&mut self, enabled: bool) {
        if self.effects_enabled == enabled {
            debug!("Effects already {}", if enabled { "enabled" } else { "disabled" });
            return;
        }
        self.effects_enabled = enabled;
        self.audio.set_effects_enabled(enabled);
        info!("Effects chain {}", if enabled { "enabled" } else { "disabled" });
        self.emit(SyncEvent::EffectsChanged {
            enabled,
            timestamp: chrono::Utc::now(),
        });

        let synced = self
            .session
            .as_ref()
            .is_some_and(|session| session.audio_mode() == AudioMode::Synced);
        if synced && matches!(self.sync_state, SyncState::Playing | SyncState::Paused) {
            let position = self.visual.current_position();
            self.resync(position, false, ResyncTrigger::EffectsToggled);
        }
    }

    // ============================================================================================
    // Platform events
    // ============================================================================================

    pub(super) fn handle_platform_event(&mut self, event: PlatformEvent) {
        debug!("Platform event: {:?}", event);
        match event {
            PlatformEvent::VisualReady { item_id } => self.on_visual_ready(item_id),
            PlatformEvent::PositionJump => {
                if self.suppressed("position jump") {
                    return;
                }
                if matches!(self.sync_state, SyncState::Playing | SyncState::Paused) {
                    let position = self.visual.current_position();
                    self.resync(position, false, ResyncTrigger::PositionJump);
                }
            }
            PlatformEvent::RemoteTransport { command } => self.on_remote_transport(command),
            PlatformEvent::VisualRateChanged { playing } => self.on_visual_rate_changed(playing),
            PlatformEvent::InterruptionBegan => self.on_interruption_began(),
            PlatformEvent::InterruptionEnded { should_resume } => self.on_interruption_ended(should_resume),
            PlatformEvent::RouteLost => {
                if self.sync_state.intends_playing() {
                    info!("Audio route lost, pausing");
                    self.pause_session();
                }
            }
            PlatformEvent::AudioEngineReset => self.on_audio_engine_reset(),
            PlatformEvent::VisualPlaybackEnded { item_id } => self.on_visual_playback_ended(item_id),
        }
    }

    /// Whether notifications are currently attributed to the engine's own
    /// start or seek
    fn suppressed(&self, what: &str) -> bool {
        if self.sync_state.is_starting() {
            debug!("Ignoring {} during synchronized start", what);
            true
        } else if self.sync_state.is_seeking() {
            debug!("Ignoring {} during seek", what);
            true
        } else {
            false
        }
    }

    fn on_visual_ready(&mut self, item_id: Uuid) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.item.id != item_id {
            debug!("Readiness of {} ignored (live item {})", item_id, session.item.id);
            return;
        }
        if !session.visual_ready {
            debug!("Session {}: visual pipeline ready", session.id);
            session.visual_ready = true;
            self.maybe_start();
        }
    }

    fn on_remote_transport(&mut self, command: TransportCommand) {
        let playing = self.sync_state.intends_playing();
        match (command, playing) {
            (TransportCommand::Play, true) => {
                if !self.suppressed("remote play") && self.sync_state == SyncState::Playing {
                    let position = self.visual.current_position();
                    self.resync(position, false, ResyncTrigger::ExternalTransport);
                }
            }
            (TransportCommand::Play, false) | (TransportCommand::Toggle, false) => {
                self.resume_session(ResyncTrigger::ExternalTransport);
            }
            (TransportCommand::Pause, true) | (TransportCommand::Toggle, true) => self.pause_session(),
            (TransportCommand::Pause, false) => debug!("Remote pause ignored: already paused"),
        }
    }

    fn on_visual_rate_changed(&mut self, playing: bool) {
        if self.suppressed("visual rate change") {
            return;
        }
        if playing {
            match self.sync_state {
                SyncState::Playing => {
                    let position = self.visual.current_position();
                    self.resync(position, false, ResyncTrigger::ExternalRateChange);
                }
                SyncState::Paused => self.resume_session(ResyncTrigger::ExternalRateChange),
                _ => {}
            }
        } else if matches!(self.sync_state, SyncState::Playing | SyncState::Correcting) {
            info!("Visual pipeline stopped externally, pausing audio");
            self.audio.pause();
            self.bump_epoch();
            self.transition(SyncState::Paused);
        }
    }

    fn on_interruption_began(&mut self) {
        if !self.sync_state.intends_playing() {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        info!("Session {}: audio interrupted", session.id);
        session.interrupted = true;
        self.audio.pause();
        self.bump_epoch();
        self.transition(SyncState::Paused);
    }

    fn on_interruption_ended(&mut self, should_resume: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.interrupted || self.sync_state != SyncState::Paused {
            debug!("Interruption end ignored: session was not paused by it");
            return;
        }
        session.interrupted = false;

        if should_resume {
            self.resume_session(ResyncTrigger::InterruptionRecovery);
        } else {
            info!("Interruption ended without resume, staying paused");
            self.visual.pause();
        }
    }

    fn on_audio_engine_reset(&mut self) {
        let Some(asset) = self.session_asset() else {
            return;
        };
        if matches!(self.sync_state, SyncState::Idle | SyncState::Loading) {
            return;
        }
        info!("Audio engine was reset by the system");

        let restored = self
            .ensure_audio_engine(&asset)
            .and_then(|()| self.audio.configure_for(&asset.format));
        if let Err(e) = restored {
            self.mark_audio_unavailable(unavailable_reason(&e), e.to_string());
            return;
        }

        match self.sync_state {
            SyncState::Starting(StartPhase::AwaitingSeek { position }) => {
                self.prepare_audio(position);
            }
            // The seek completion reschedules
            SyncState::Seeking(SeekPhase::AwaitingSeek { .. }) => {}
            _ => {
                let position = self.visual.current_position();
                self.resync(position, true, ResyncTrigger::AudioEngineReset);
            }
        }
    }

    fn on_visual_playback_ended(&mut self, item_id: Uuid) {
        let Some(session) = &self.session else {
            return;
        };
        if session.item.id != item_id {
            debug!("End of {} ignored (live item {})", item_id, session.item.id);
            return;
        }

        if self.queue.has_next() {
            self.advance(Direction::Next);
        } else {
            info!("Session {}: end of queue", session.id);
            self.audio.stop();
            if let Some(session) = self.session.as_mut() {
                session.schedule = None;
            }
            self.visual.pause();
            self.bump_epoch();
            self.transition(SyncState::Paused);
        }
    }
}
