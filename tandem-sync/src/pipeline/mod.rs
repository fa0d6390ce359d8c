//! Capabilities consumed by the synchronization engine
//!
//! The visual pipeline, the audio pipeline and the media source loader are
//! external collaborators. The engine only ever talks to them through these
//! traits; `sim` provides clock-driven stand-ins and `loader` a real
//! symphonia-backed loader.

pub mod loader;
pub mod sim;

pub use loader::SymphoniaLoader;
pub use sim::{AudioCommand, SimAudioPipeline, SimLoader, SimVisualPipeline, VisualCommand};

use crate::clock::HostTime;
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// One playable item as the surrounding application describes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub id: Uuid,
    pub title: String,
    /// Source handed to the visual pipeline
    pub visual_url: String,
    /// Source handed to the media source loader
    pub audio_url: String,
}

impl MediaItem {
    pub fn new(title: impl Into<String>, visual_url: impl Into<String>, audio_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            visual_url: visual_url.into(),
            audio_url: audio_url.into(),
        }
    }
}

/// What the loader reports about a decodable audio source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames in the asset
    pub total_samples: u64,
}

/// A media item whose audio side has been opened
///
/// Immutable once loaded; replaced wholesale when the session changes.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub item: MediaItem,
    pub format: AudioFormat,
}

impl MediaAsset {
    pub fn new(item: MediaItem, format: AudioFormat) -> Self {
        Self { item, format }
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub fn total_samples(&self) -> u64 {
        self.format.total_samples
    }

    pub fn duration_secs(&self) -> f64 {
        tandem_common::timing::asset_duration_seconds(self.format.total_samples, self.format.sample_rate)
    }
}

/// Frame range `[start_sample, start_sample + sample_count)` of an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRange {
    pub start_sample: u64,
    pub sample_count: u64,
}

impl SampleRange {
    pub fn end_sample(&self) -> u64 {
        self.start_sample + self.sample_count
    }
}

/// Audio render clock reading
///
/// `sample_time` counts frames rendered since the currently scheduled range
/// began, at `sample_rate`; the engine adds the range's start to get an index
/// into the asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPosition {
    pub sample_time: i64,
    pub sample_rate: u32,
}

/// Invoked once when a scheduled range is consumed or cancelled
pub type RangeCompletion = Box<dyn FnOnce() + Send + 'static>;

/// Decodes and renders video; muted with respect to audio output
#[async_trait]
pub trait VisualPipeline: Send + Sync {
    /// Replace the current item; readiness is reported asynchronously
    fn load_item(&self, item: &MediaItem);

    /// Whether the current item can seek and play right now
    fn is_ready(&self) -> bool;

    /// Seek; resolves when the pipeline finishes (`false` if interrupted)
    ///
    /// `exact` requests zero tolerance (frame-accurate).
    async fn seek(&self, to_secs: f64, exact: bool) -> bool;

    /// Begin playback of `item_time_secs` at `rate`, effective at host instant `at`
    fn play_at(&self, rate: f32, item_time_secs: f64, at: HostTime);

    /// Begin playback immediately at rate 1.0
    fn play(&self);

    fn pause(&self);

    /// Current item position in seconds
    fn current_position(&self) -> f64;

    /// Whether the pipeline's rate is non-zero
    fn is_playing(&self) -> bool;
}

/// Decodes, processes and outputs audio on a path separate from the visual one
pub trait AudioPipeline: Send + Sync {
    /// Whether the backing audio engine is running
    fn is_engine_running(&self) -> bool;

    fn start_engine(&self) -> Result<()>;

    fn stop_engine(&self);

    /// Reconfigure internal routing for the asset's native format
    fn configure_for(&self, format: &AudioFormat) -> Result<()>;

    /// Switch the effects chain in or out of the signal path
    fn set_effects_enabled(&self, enabled: bool);

    /// Prepare `range` for playback without starting output
    fn schedule_range(&self, asset: &MediaAsset, range: SampleRange, on_consumed: RangeCompletion) -> Result<()>;

    /// Start the scheduled range at host instant `at`
    fn play_at(&self, at: HostTime);

    /// Pause output, keeping the schedule and render position
    fn pause(&self);

    /// Stop output and drop the schedule
    fn stop(&self);

    /// Stop and return to a freshly constructed state
    fn reset(&self);

    /// Whether output is running (or committed to start)
    fn is_playing(&self) -> bool;

    /// Render clock reading, `None` without a schedule
    fn render_position(&self) -> Option<RenderPosition>;
}

/// Opens audio assets and reports their format
#[async_trait]
pub trait MediaSourceLoader: Send + Sync {
    async fn open(&self, audio_url: &str) -> Result<AudioFormat>;
}
