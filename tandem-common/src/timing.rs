//! Sample/time conversions for synchronized playback
//!
//! The engine speaks three units:
//!
//! 1. **Seconds (f64)**: visual pipeline positions and seek targets
//! 2. **Sample indices (u64)**: frame offsets into the decoded audio asset
//! 3. **Durations**: host-clock lead times (warm-up delay, lookahead, offsets)
//!
//! Every sample index handed to the audio pipeline passes through
//! [`target_sample`], which rounds to the nearest frame and clamps into
//! `[0, total_samples - 1]`.
//!
//! # Examples
//!
//! ```rust
//! use tandem_common::timing::*;
//!
//! // 2.5 seconds into a 10 s asset at 48 kHz
//! assert_eq!(target_sample(2.5, 48_000, 480_000), 120_000);
//!
//! // Seeking past the end clamps to the last frame
//! assert_eq!(target_sample(12.0, 48_000, 480_000), 479_999);
//!
//! // 576 frames at 48 kHz is 12 ms of drift
//! let drift = drift_seconds(120_000, 119_424, 48_000);
//! assert!((drift - 0.012).abs() < 1e-9);
//! ```

use std::time::Duration;

/// Round a position in seconds to the nearest frame index (unclamped)
///
/// Negative positions yield negative indices; callers clamp.
pub fn seconds_to_samples(seconds: f64, sample_rate: u32) -> i64 {
    (seconds * sample_rate as f64).round() as i64
}

/// Convert a frame count to seconds
pub fn samples_to_seconds(samples: i64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    samples as f64 / sample_rate as f64
}

/// Clamp a raw frame index into `[0, total_samples - 1]`
///
/// An empty asset (`total_samples == 0`) clamps to 0; callers detect the
/// empty range separately via [`schedulable_frames`].
pub fn clamp_sample_index(raw: i64, total_samples: u64) -> u64 {
    if total_samples == 0 || raw <= 0 {
        return 0;
    }
    (raw as u64).min(total_samples - 1)
}

/// `clamp(round(seconds * sample_rate), 0, total_samples - 1)`
pub fn target_sample(seconds: f64, sample_rate: u32, total_samples: u64) -> u64 {
    clamp_sample_index(seconds_to_samples(seconds, sample_rate), total_samples)
}

/// Number of frames in `[start_sample, total_samples)`
pub fn schedulable_frames(start_sample: u64, total_samples: u64) -> u64 {
    total_samples.saturating_sub(start_sample)
}

/// `|target - current| / sample_rate`
pub fn drift_seconds(target_sample: u64, current_sample: i64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    (target_sample as i64 - current_sample).unsigned_abs() as f64 / sample_rate as f64
}

/// Convert milliseconds to a Duration
pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Total asset length in seconds
pub fn asset_duration_seconds(total_samples: u64, sample_rate: u32) -> f64 {
    samples_to_seconds(total_samples as i64, sample_rate)
}
