//! Core synchronization engine - lifecycle and dispatch
//!
//! **Responsibilities:**
//! - SyncEngine struct definition and construction
//! - The serialized run loop (mailbox plus position ticker)
//! - Message dispatch and stale-completion filtering
//! - State transitions, timers, status publishing
//!
//! All state mutation happens on the single task running `run`; pipelines,
//! loaders and timers report back through the mailbox.

use super::handle::EngineHandle;
use super::messages::{ControlCommand, EngineMessage};
use super::queue::PlayQueue;
use super::session::{AudioSlot, Session, SessionTracker};
use super::sync_state::SyncState;
use crate::clock::HostClock;
use crate::error::{Error, Result};
use crate::pipeline::{AudioPipeline, MediaAsset, MediaSourceLoader, VisualPipeline};
use crate::state::{EngineStatus, SharedState};
use std::sync::Arc;
use std::time::Duration;
use tandem_common::events::{AudioUnavailableReason, SessionId, SyncEvent};
use tandem_common::SyncConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// External collaborators the engine drives
///
/// Both pipelines must share `clock`.
#[derive(Clone)]
pub struct Collaborators {
    pub clock: Arc<dyn HostClock>,
    pub visual: Arc<dyn VisualPipeline>,
    pub audio: Arc<dyn AudioPipeline>,
    pub loader: Arc<dyn MediaSourceLoader>,
}

/// Synchronization engine - keeps the audio pipeline locked to the visual one
///
/// Constructed by the composition root and reached through `EngineHandle`.
pub struct SyncEngine {
    pub(super) config: SyncConfig,

    pub(super) clock: Arc<dyn HostClock>,
    pub(super) visual: Arc<dyn VisualPipeline>,
    pub(super) audio: Arc<dyn AudioPipeline>,
    pub(super) loader: Arc<dyn MediaSourceLoader>,

    /// Status snapshot and event bus shared with handles
    pub(super) state: Arc<SharedState>,

    pub(super) sessions: SessionTracker,

    /// Live session (None before the first play)
    pub(super) session: Option<Session>,

    pub(super) sync_state: SyncState,

    pub(super) queue: PlayQueue,

    pub(super) effects_enabled: bool,

    /// Sender side of the engine's own mailbox, cloned into every completion
    pub(super) tx: mpsc::UnboundedSender<EngineMessage>,

    /// Taken by `run`
    rx: Option<mpsc::UnboundedReceiver<EngineMessage>>,
}

impl SyncEngine {
    /// Validate `config` and build an idle engine
    pub fn new(config: SyncConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(SharedState::new(config.event_capacity));

        info!(
            "Sync engine configured: warm_up={}ms audio_start_offset={}ms lookahead={}ms drift_threshold={}ms",
            config.warm_up_delay_ms,
            config.effective_audio_start_offset_ms(),
            config.resync_lookahead_ms,
            config.drift_threshold_ms
        );

        Ok(Self {
            config,
            clock: collaborators.clock,
            visual: collaborators.visual,
            audio: collaborators.audio,
            loader: collaborators.loader,
            state,
            sessions: SessionTracker::new(),
            session: None,
            sync_state: SyncState::Idle,
            queue: PlayQueue::new(),
            effects_enabled: false,
            tx,
            rx: Some(rx),
        })
    }

    /// Handle for a not-yet-spawned engine (subscribe before anything runs)
    pub fn handle(&self) -> EngineHandle {
        EngineHandle::new(self.tx.clone(), Arc::clone(&self.state))
    }

    /// Move the engine onto its own task
    pub fn spawn(self) -> (EngineHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    async fn run(mut self) {
        let Some(mut rx) = self.rx.take() else {
            warn!("Sync engine mailbox already taken");
            return;
        };
        info!("Sync engine started");

        let mut ticker = self.config.position_event_interval().map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(EngineMessage::Shutdown) | None => break,
                        Some(msg) => self.dispatch(msg),
                    }
                }
                _ = next_tick(&mut ticker) => self.emit_position(),
            }
            self.publish_status().await;
        }

        self.audio.stop();
        self.session = None;
        self.transition(SyncState::Idle);
        self.publish_status().await;
        info!("Sync engine stopped");
    }

    fn dispatch(&mut self, msg: EngineMessage) {
        match msg {
            EngineMessage::Control(command) => self.handle_control(command),
            EngineMessage::Platform(event) => self.handle_platform_event(event),
            EngineMessage::AssetLoaded {
                session,
                attempt,
                result,
            } => {
                if self.accept(session, "asset load") {
                    self.on_asset_loaded(attempt, result);
                }
            }
            EngineMessage::RetryAssetLoad { session } => {
                if self.accept(session, "asset load retry") {
                    self.load_asset(session, 2);
                }
            }
            EngineMessage::SeekCompleted {
                session,
                epoch,
                finished,
            } => {
                if self.accept_epoch(session, epoch, "seek completion") {
                    self.on_seek_completed(finished);
                }
            }
            EngineMessage::SeekTimedOut { session, epoch } => {
                if self.accept_epoch(session, epoch, "seek watchdog") {
                    self.on_seek_timed_out();
                }
            }
            EngineMessage::SettleElapsed { session, epoch } => {
                if self.accept_epoch(session, epoch, "settle timer") {
                    self.on_settle_elapsed();
                }
            }
            EngineMessage::RangeConsumed { session, generation } => {
                if self.accept(session, "range completion") {
                    self.on_range_consumed(generation);
                }
            }
            EngineMessage::MeasureDrift(reply) => {
                let position = self.visual.current_position();
                let _ = reply.send(self.measure_drift_at(position));
            }
            // Handled by the run loop
            EngineMessage::Shutdown => {}
        }
    }

    fn handle_control(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Play(item) => {
                let item = self.queue.play(item);
                self.start_session(item);
            }
            ControlCommand::SetQueue { items, start_index } => match self.queue.set(items, start_index) {
                Some(item) => self.start_session(item),
                None => info!("Queue cleared"),
            },
            ControlCommand::Seek(to_secs) => self.seek(to_secs),
            ControlCommand::TogglePause => self.toggle_pause(),
            ControlCommand::Advance(direction) => self.advance(direction),
            ControlCommand::SetEffectsEnabled(enabled) => self.set_effects_enabled(enabled),
        }
    }

    /// Whether a completion for `session` may still mutate state
    fn accept(&self, session: SessionId, what: &str) -> bool {
        if self.sessions.is_current(session) && self.session.is_some() {
            true
        } else {
            debug!(
                "Dropping stale {} for session {} (live: {})",
                what,
                session,
                self.sessions.current()
            );
            false
        }
    }

    fn accept_epoch(&self, session: SessionId, epoch: u64, what: &str) -> bool {
        if !self.accept(session, what) {
            return false;
        }
        match &self.session {
            Some(live) if live.epoch == epoch => true,
            Some(live) => {
                debug!(
                    "Dropping stale {} for session {} (epoch {} != {})",
                    what, session, epoch, live.epoch
                );
                false
            }
            None => false,
        }
    }

    // ============================================================================================
    // Helpers shared by the start, resync and trigger modules
    // ============================================================================================

    pub(super) fn transition(&mut self, new_state: SyncState) {
        let old_kind = self.sync_state.kind();
        let new_kind = new_state.kind();
        self.sync_state = new_state;

        if old_kind != new_kind {
            let session_id = self.sessions.current();
            debug!("Session {}: {} -> {}", session_id, old_kind, new_kind);
            self.emit(SyncEvent::StateChanged {
                session_id,
                old_state: old_kind,
                new_state: new_kind,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    pub(super) fn emit(&self, event: SyncEvent) {
        self.state.broadcast_event(event);
    }

    /// Deliver `msg` to the mailbox after `delay`
    pub(super) fn schedule_after(&self, delay: Duration, msg: EngineMessage) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(msg);
        });
    }

    pub(super) fn session_asset(&self) -> Option<Arc<MediaAsset>> {
        self.session.as_ref().and_then(Session::asset)
    }

    /// Audio start offset in effect (calibrated per device class)
    pub(super) fn audio_start_offset(&self) -> Duration {
        self.config.audio_start_offset()
    }

    /// Switch the live session to video-only and surface a soft warning
    pub(super) fn mark_audio_unavailable(&mut self, reason: AudioUnavailableReason, detail: String) {
        self.audio.stop();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.schedule = None;
        if let AudioSlot::Unavailable(_) = session.audio {
            debug!("Session {} already video-only ({}): {}", session.id, reason, detail);
            return;
        }
        session.audio = AudioSlot::Unavailable(reason);

        warn!(
            "Audio unavailable for '{}' (session {}): {}: {}",
            session.item.title, session.id, reason, detail
        );
        let event = SyncEvent::AudioUnavailable {
            session_id: session.id,
            item_id: session.item.id,
            reason,
            detail,
            timestamp: chrono::Utc::now(),
        };
        self.emit(event);
    }

    pub(super) fn emit_position(&self) {
        if !self.sync_state.kind().is_playing() {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };
        self.emit(SyncEvent::PositionUpdate {
            session_id: session.id,
            item_id: session.item.id,
            position_secs: self.visual.current_position(),
            duration_secs: session.asset().map(|asset| asset.duration_secs()),
            timestamp: chrono::Utc::now(),
        });
    }

    async fn publish_status(&self) {
        let status = match &self.session {
            Some(session) => EngineStatus {
                session_id: session.id,
                item_id: Some(session.item.id),
                state: self.sync_state.kind(),
                audio_mode: session.audio_mode(),
                audio_unavailable_reason: session.unavailable_reason(),
                playing: self.sync_state.intends_playing(),
                effects_enabled: self.effects_enabled,
                position_secs: self.visual.current_position(),
                duration_secs: session.asset().map(|asset| asset.duration_secs()),
            },
            None => EngineStatus {
                effects_enabled: self.effects_enabled,
                ..EngineStatus::default()
            },
        };
        self.state.set_status(status).await;
    }
}

/// Next position tick, or never when position signals are disabled
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Fallback reason reported for a pipeline or loader error
pub(super) fn unavailable_reason(err: &Error) -> AudioUnavailableReason {
    match err {
        Error::Load { .. } | Error::Io(_) => AudioUnavailableReason::LoadFailed,
        Error::EngineStart(_) => AudioUnavailableReason::EngineStartFailed,
        Error::Routing(_) => AudioUnavailableReason::RoutingFailed,
        Error::ScheduleUnderrun { .. } => AudioUnavailableReason::ScheduleUnderrun,
        Error::AudioPipeline(_) | Error::EngineClosed | Error::Common(_) => AudioUnavailableReason::PipelineFailed,
    }
}
