//! Session start and the synchronized start protocol
//!
//! **Responsibilities:**
//! - Session creation (supersedes the previous one)
//! - Asset loading with a single delayed retry
//! - The readiness gate (asset resolved and visual pipeline ready)
//! - Scheduling audio, seeking the visual pipeline, and commanding both to
//!   begin at a shared future instant
//! - Seek completion, the seek watchdog, and settle timers

use super::core::{unavailable_reason, SyncEngine};
use super::messages::EngineMessage;
use super::session::{AudioSlot, Session};
use super::sync_state::{SeekPhase, StartPhase, SyncState};
use crate::error::Result;
use crate::pipeline::{AudioFormat, MediaAsset, MediaItem, SampleRange};
use std::sync::Arc;
use std::time::Duration;
use tandem_common::events::{AudioUnavailableReason, ResyncTrigger, SessionId, SyncEvent};
use tandem_common::timing;
use tracing::{debug, info, warn};

impl SyncEngine {
    /// Begin a new session for `item`, superseding the live one
    pub(super) fn start_session(&mut self, item: MediaItem) {
        let previous = self.sessions.current();
        let had_session = self.session.is_some();
        let session_id = self.sessions.begin_session();

        if had_session {
            info!("Session {} superseded by {}", previous, session_id);
            // Completions of the old range arrive tagged with the old session
            self.audio.stop();
            self.emit(SyncEvent::SessionSuperseded {
                session_id: previous,
                superseded_by: session_id,
                timestamp: chrono::Utc::now(),
            });
        }

        self.visual.load_item(&item);
        let visual_ready = self.visual.is_ready();

        info!(
            "Session {} started: '{}' (visual ready: {})",
            session_id, item.title, visual_ready
        );
        self.emit(SyncEvent::SessionStarted {
            session_id,
            item_id: item.id,
            timestamp: chrono::Utc::now(),
        });

        self.session = Some(Session::new(session_id, item, visual_ready));
        self.transition(SyncState::Loading);
        self.load_asset(session_id, 1);
    }

    /// Open the live session's audio asset off the engine task
    pub(super) fn load_asset(&self, session_id: SessionId, attempt: u8) {
        let Some(session) = &self.session else {
            return;
        };
        let url = session.item.audio_url.clone();
        debug!("Session {}: opening audio asset {} (attempt {})", session_id, url, attempt);

        let loader = Arc::clone(&self.loader);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = loader.open(&url).await;
            let _ = tx.send(EngineMessage::AssetLoaded {
                session: session_id,
                attempt,
                result,
            });
        });
    }

    pub(super) fn on_asset_loaded(&mut self, attempt: u8, result: Result<AudioFormat>) {
        match result {
            Ok(format) => {
                if let Err(e) = self.audio.configure_for(&format) {
                    self.mark_audio_unavailable(AudioUnavailableReason::RoutingFailed, e.to_string());
                } else if let Some(session) = self.session.as_mut() {
                    info!(
                        "Session {}: audio asset ready ({} Hz, {} ch, {} frames)",
                        session.id, format.sample_rate, format.channels, format.total_samples
                    );
                    session.audio = AudioSlot::Ready(Arc::new(MediaAsset::new(session.item.clone(), format)));
                }
            }
            Err(e) if attempt < 2 => {
                let session_id = self.sessions.current();
                warn!(
                    "Session {}: audio asset load failed ({}), retrying in {}ms",
                    session_id, e, self.config.asset_retry_delay_ms
                );
                self.schedule_after(
                    self.config.asset_retry_delay(),
                    EngineMessage::RetryAssetLoad { session: session_id },
                );
                return;
            }
            Err(e) => {
                self.mark_audio_unavailable(AudioUnavailableReason::LoadFailed, e.to_string());
            }
        }
        self.maybe_start();
    }

    /// Run the start protocol once the asset load resolved and the visual
    /// pipeline is ready
    pub(super) fn maybe_start(&mut self) {
        if self.sync_state != SyncState::Loading {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };
        if matches!(session.audio, AudioSlot::Pending) {
            debug!("Session {}: waiting for audio asset", session.id);
            return;
        }
        if !session.visual_ready {
            debug!("Session {}: waiting for visual pipeline readiness", session.id);
            return;
        }
        let position = session.start_position;
        self.begin_synchronized(position, None);
    }

    /// Schedule audio from `position` and seek the visual pipeline there
    ///
    /// The start instants are computed when the seek completes. `trigger` is
    /// set when this restarts an already started session.
    pub(super) fn begin_synchronized(&mut self, position: f64, trigger: Option<ResyncTrigger>) {
        let position = position.max(0.0);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.started = true;
        session.interrupted = false;
        let session_id = session.id;

        let scheduled = self.prepare_audio(position);
        if let (Some(trigger), Some(range)) = (trigger, scheduled) {
            info!(
                "Session {}: resync ({}) from sample {}, restarting with visual",
                session_id, trigger, range.start_sample
            );
            self.emit(SyncEvent::ResyncPerformed {
                session_id,
                trigger,
                target_sample: range.start_sample,
                drift_ms: None,
                restarted: true,
                timestamp: chrono::Utc::now(),
            });
        }

        self.transition(SyncState::Starting(StartPhase::AwaitingSeek { position }));
        self.issue_seek(position);
    }

    /// Ensure the audio engine runs and schedule `[target, total)`
    ///
    /// Any failure switches the session to video-only.
    pub(super) fn prepare_audio(&mut self, position: f64) -> Option<SampleRange> {
        let asset = self.session_asset()?;
        if let Err(e) = self.ensure_audio_engine(&asset) {
            self.mark_audio_unavailable(unavailable_reason(&e), e.to_string());
            return None;
        }

        let target = timing::target_sample(position, asset.sample_rate(), asset.total_samples());
        match self.schedule_from(&asset, target) {
            Ok(range) => {
                debug!(
                    "Scheduled samples [{}, {}) for {:.3}s",
                    range.start_sample,
                    range.end_sample(),
                    position
                );
                Some(range)
            }
            Err(e) => {
                self.mark_audio_unavailable(unavailable_reason(&e), e.to_string());
                None
            }
        }
    }

    /// Start the audio engine if needed: one attempt, one reset, one retry
    pub(super) fn ensure_audio_engine(&self, asset: &MediaAsset) -> Result<()> {
        if self.audio.is_engine_running() {
            return Ok(());
        }
        if let Err(first) = self.audio.start_engine() {
            warn!("Audio engine failed to start ({}), resetting and retrying once", first);
            self.audio.reset();
            self.audio.start_engine()?;
            self.audio.configure_for(&asset.format)?;
        }
        debug!("Audio engine running");
        Ok(())
    }

    /// Seek the visual pipeline exactly; completion and watchdog are tagged
    /// with a fresh epoch
    pub(super) fn issue_seek(&mut self, to_secs: f64) {
        let Some(epoch) = self.bump_epoch() else {
            return;
        };
        let session_id = self.sessions.current();

        let visual = Arc::clone(&self.visual);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let finished = visual.seek(to_secs, true).await;
            let _ = tx.send(EngineMessage::SeekCompleted {
                session: session_id,
                epoch,
                finished,
            });
        });

        if let Some(timeout) = self.config.seek_timeout() {
            self.schedule_after(
                timeout,
                EngineMessage::SeekTimedOut {
                    session: session_id,
                    epoch,
                },
            );
        }
    }

    /// Invalidate pending seek and settle completions of the live session
    pub(super) fn bump_epoch(&mut self) -> Option<u64> {
        self.session.as_mut().map(Session::next_epoch)
    }

    pub(super) fn arm_settle(&self, delay: Duration) {
        let Some(session) = &self.session else {
            return;
        };
        self.schedule_after(
            delay,
            EngineMessage::SettleElapsed {
                session: session.id,
                epoch: session.epoch,
            },
        );
    }

    pub(super) fn on_seek_completed(&mut self, finished: bool) {
        if !finished {
            warn!("Visual seek was interrupted, continuing from the requested position");
        }
        match self.sync_state {
            SyncState::Starting(StartPhase::AwaitingSeek { position }) => {
                self.start_at_reference(position);
                self.transition(SyncState::Starting(StartPhase::Settling));
                self.arm_settle(self.config.start_settle());
            }
            SyncState::Seeking(SeekPhase::AwaitingSeek { target, resume }) => {
                self.finish_user_seek(target, resume);
            }
            other => debug!("Seek completion ignored in state {}", other.kind()),
        }
    }

    /// Command both pipelines to begin at `now + warm_up`, audio delayed by the
    /// start offset; visual alone when the session is video-only
    pub(super) fn start_at_reference(&mut self, position: f64) {
        let Some(session) = &self.session else {
            return;
        };
        let session_id = session.id;
        let scheduled = session.schedule.map(|s| s.range.start_sample);
        let now = self.clock.now();

        let event = match scheduled {
            Some(target_sample) => {
                let warm_up = self.config.warm_up_delay();
                let offset = self.audio_start_offset();
                let reference = now + warm_up;
                let audio_at = reference + offset;

                self.visual.play_at(1.0, position, reference);
                self.audio.play_at(audio_at);

                info!(
                    "Session {}: synchronized start at {:.3}s (visual at {}, audio at {}, sample {})",
                    session_id, position, reference, audio_at, target_sample
                );
                SyncEvent::SynchronizedStart {
                    session_id,
                    position_secs: position,
                    target_sample: Some(target_sample),
                    warm_up_ms: warm_up.as_millis() as u64,
                    audio_start_offset_ms: Some(offset.as_millis() as u64),
                    timestamp: chrono::Utc::now(),
                }
            }
            None => {
                self.visual.play();
                info!("Session {}: video-only start at {:.3}s", session_id, position);
                SyncEvent::SynchronizedStart {
                    session_id,
                    position_secs: position,
                    target_sample: None,
                    warm_up_ms: 0,
                    audio_start_offset_ms: None,
                    timestamp: chrono::Utc::now(),
                }
            }
        };
        self.emit(event);
    }

    /// The visual seek did not complete in time: continue video-only
    pub(super) fn on_seek_timed_out(&mut self) {
        let detail = format!(
            "visual seek did not complete within {}ms",
            self.config.seek_timeout_ms
        );
        match self.sync_state {
            SyncState::Starting(StartPhase::AwaitingSeek { position }) => {
                warn!("Start seek to {:.3}s timed out, starting video-only", position);
                self.mark_audio_unavailable(AudioUnavailableReason::SeekTimeout, detail);
                self.bump_epoch();
                self.start_at_reference(position);
                self.transition(SyncState::Starting(StartPhase::Settling));
                self.arm_settle(self.config.start_settle());
            }
            SyncState::Seeking(SeekPhase::AwaitingSeek { target, resume }) => {
                warn!("Seek to {:.3}s timed out, continuing video-only", target);
                self.mark_audio_unavailable(AudioUnavailableReason::SeekTimeout, detail);
                self.bump_epoch();
                if resume {
                    self.visual.play();
                }
                self.transition(SyncState::Seeking(SeekPhase::Settling { resume }));
                self.arm_settle(self.config.seek_settle());
            }
            _ => {}
        }
    }

    pub(super) fn on_settle_elapsed(&mut self) {
        match self.sync_state {
            SyncState::Starting(StartPhase::Settling) => {
                debug!("Start settled");
                self.transition(SyncState::Playing);
            }
            SyncState::Seeking(SeekPhase::Settling { resume }) => {
                debug!("Seek settled");
                self.transition(if resume { SyncState::Playing } else { SyncState::Paused });
            }
            _ => {}
        }
    }
}
