//! Error types for tandem-sync
//!
//! Pipeline and loader failures are recoverable: the engine turns
//! each of them into a video-only fallback plus an `AudioUnavailable` event.
//! Only `EngineClosed` ever reaches a caller of the control surface.

use thiserror::Error;

/// Main error type for tandem-sync
#[derive(Error, Debug)]
pub enum Error {
    /// Audio asset could not be opened or probed
    #[error("Failed to load audio asset {url}: {reason}")]
    Load { url: String, reason: String },

    /// Underlying audio engine refused to start
    #[error("Audio engine start failed: {0}")]
    EngineStart(String),

    /// Audio routing could not match the asset's native format
    #[error("Audio routing error: {0}")]
    Routing(String),

    /// Target sample at or past the end of the asset
    #[error("Nothing to schedule from sample {start_sample} of {total_samples}")]
    ScheduleUnderrun { start_sample: u64, total_samples: u64 },

    /// Other audio pipeline failures
    #[error("Audio pipeline error: {0}")]
    AudioPipeline(String),

    /// The engine task has stopped
    #[error("Synchronization engine is not running")]
    EngineClosed,

    /// Errors from the common crate (configuration)
    #[error(transparent)]
    Common(#[from] tandem_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using tandem-sync Error
pub type Result<T> = std::result::Result<T, Error>;
