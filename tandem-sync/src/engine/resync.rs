//! Drift measurement and correction
//!
//! The visual pipeline's position is ground truth. Audio is expected to lag
//! it by exactly the audio start offset, so a fresh synchronized start
//! measures zero drift. Corrections stop audio, reschedule a single range and
//! restart it a short lookahead in the future.

use super::core::{unavailable_reason, SyncEngine};
use super::messages::EngineMessage;
use super::session::ScheduledRange;
use super::sync_state::SyncState;
use crate::error::{Error, Result};
use crate::pipeline::{MediaAsset, SampleRange};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tandem_common::events::{ResyncTrigger, SyncEvent};
use tandem_common::timing;
use tracing::{debug, info};

/// One drift reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DriftSample {
    /// Asset frame audio should be rendering now
    pub target_sample: u64,
    /// Asset frame audio is rendering now
    pub current_sample: i64,
    /// `|target - current| / sample_rate`
    pub drift_seconds: f64,
}

impl DriftSample {
    pub fn new(target_sample: u64, current_sample: i64, sample_rate: u32) -> Self {
        Self {
            target_sample,
            current_sample,
            drift_seconds: timing::drift_seconds(target_sample, current_sample, sample_rate),
        }
    }

    pub fn drift_ms(&self) -> f64 {
        self.drift_seconds * 1000.0
    }
}

/// Convert a render-clock frame count into asset frames
fn rescale(frames: i64, from_rate: u32, to_rate: u32) -> i64 {
    if from_rate == to_rate || from_rate == 0 {
        frames
    } else {
        (frames as f64 * to_rate as f64 / from_rate as f64).round() as i64
    }
}

impl SyncEngine {
    /// Drift against visual position `position`; `None` unless audio is playing
    ///
    /// Audio starts `audio_start_offset` after the visual pipeline, so the
    /// expected frame is the one for `position - audio_start_offset`.
    pub(super) fn measure_drift_at(&self, position: f64) -> Option<DriftSample> {
        let session = self.session.as_ref()?;
        let asset = session.asset()?;
        let schedule = session.schedule?;
        if !self.audio.is_playing() {
            return None;
        }
        let render = self.audio.render_position()?;

        let rendered = rescale(render.sample_time, render.sample_rate, asset.sample_rate());
        let current = schedule.range.start_sample as i64 + rendered;

        let expected_secs = (position - self.audio_start_offset().as_secs_f64()).max(0.0);
        let target = timing::target_sample(expected_secs, asset.sample_rate(), asset.total_samples());

        Some(DriftSample::new(target, current, asset.sample_rate()))
    }

    /// Bring audio back in line with visual position `position`
    ///
    /// Unless `force`, a playing audio pipeline within the drift threshold is
    /// left alone. A paused session is only rescheduled, from `position`.
    ///
    /// A restart schedules from `position + resync_lookahead`: the visual
    /// pipeline reaches that position when the restart instant arrives.
    pub(super) fn resync(&mut self, position: f64, force: bool, trigger: ResyncTrigger) {
        let Some(asset) = self.session_asset() else {
            debug!("Resync ({}) ignored: session has no audio", trigger);
            return;
        };
        let session_id = self.sessions.current();

        let mut drift_ms = None;
        if !force && self.audio.is_playing() {
            if let Some(sample) = self.measure_drift_at(position) {
                if sample.drift_seconds < self.config.drift_threshold_secs() {
                    debug!(
                        "Session {}: {} with drift {:.1}ms, no resync needed",
                        session_id,
                        trigger,
                        sample.drift_ms()
                    );
                    self.emit(SyncEvent::ResyncSkipped {
                        session_id,
                        trigger,
                        drift_ms: sample.drift_ms(),
                        timestamp: chrono::Utc::now(),
                    });
                    return;
                }
                drift_ms = Some(sample.drift_ms());
            }
        }

        let restart = self.sync_state.intends_playing();
        let previous = self.sync_state;
        let correcting = previous == SyncState::Playing;
        if correcting {
            self.transition(SyncState::Correcting);
        }

        let lookahead = if restart {
            self.config.resync_lookahead()
        } else {
            Duration::ZERO
        };
        let target = timing::target_sample(
            position + lookahead.as_secs_f64(),
            asset.sample_rate(),
            asset.total_samples(),
        );

        let outcome = self
            .ensure_audio_engine(&asset)
            .and_then(|()| self.schedule_from(&asset, target));
        match outcome {
            Ok(range) => {
                if restart {
                    let at = self.clock.now() + lookahead + self.audio_start_offset();
                    self.audio.play_at(at);
                }
                info!(
                    "Session {}: resync ({}) from sample {}, drift {}, restarted: {}",
                    session_id,
                    trigger,
                    range.start_sample,
                    drift_ms.map_or_else(|| "n/a".to_string(), |ms| format!("{:.1}ms", ms)),
                    restart
                );
                self.emit(SyncEvent::ResyncPerformed {
                    session_id,
                    trigger,
                    target_sample: range.start_sample,
                    drift_ms,
                    restarted: restart,
                    timestamp: chrono::Utc::now(),
                });
            }
            Err(e) => self.mark_audio_unavailable(unavailable_reason(&e), e.to_string()),
        }

        if correcting {
            self.transition(previous);
        }
    }

    /// Stop audio and make `[start_sample, total)` the one live range
    pub(super) fn schedule_from(&mut self, asset: &Arc<MediaAsset>, start_sample: u64) -> Result<SampleRange> {
        self.audio.stop();

        let Some(session) = self.session.as_mut() else {
            return Err(Error::AudioPipeline("no live session".to_string()));
        };
        session.schedule = None;

        let sample_count = timing::schedulable_frames(start_sample, asset.total_samples());
        if sample_count == 0 {
            return Err(Error::ScheduleUnderrun {
                start_sample,
                total_samples: asset.total_samples(),
            });
        }

        let generation = session.next_generation();
        let session_id = session.id;
        let range = SampleRange {
            start_sample,
            sample_count,
        };
        let tx = self.tx.clone();
        self.audio.schedule_range(
            asset,
            range,
            Box::new(move || {
                let _ = tx.send(EngineMessage::RangeConsumed {
                    session: session_id,
                    generation,
                });
            }),
        )?;

        session.schedule = Some(ScheduledRange { range, generation });
        Ok(range)
    }

    pub(super) fn on_range_consumed(&mut self, generation: u64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.schedule {
            Some(live) if live.generation == generation => {
                debug!(
                    "Session {}: audio range [{}, {}) consumed",
                    session.id,
                    live.range.start_sample,
                    live.range.end_sample()
                );
                session.schedule = None;
            }
            _ => debug!(
                "Session {}: ignoring completion of superseded range generation {}",
                session.id, generation
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drift_sample_is_symmetric() {
        let ahead = DriftSample::new(48_000, 50_880, 48_000);
        let behind = DriftSample::new(48_000, 45_120, 48_000);
        assert!((ahead.drift_ms() - 60.0).abs() < 1e-9);
        assert!((behind.drift_ms() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_rescale() {
        assert_eq!(rescale(480, 48_000, 48_000), 480);
        assert_eq!(rescale(480, 48_000, 44_100), 441);
        assert_eq!(rescale(480, 0, 44_100), 480);
    }
}
