//! Simulated pipelines driven by the host clock
//!
//! Positions are computed from the shared `HostClock`, so a paused tokio
//! runtime makes every start instant and drift reading deterministic. Each
//! pipeline records the commands it receives; failure injection covers load
//! failures, engine start failures, slow or hanging seeks and audio startup
//! latency.

use super::{
    AudioFormat, AudioPipeline, MediaAsset, MediaItem, MediaSourceLoader, RangeCompletion,
    RenderPosition, SampleRange, VisualPipeline,
};
use crate::clock::{HostClock, HostTime};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::trace;
use uuid::Uuid;

// ================================================================================================
// Visual pipeline
// ================================================================================================

/// Command received by the simulated visual pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum VisualCommand {
    Load { item_id: Uuid },
    Seek { to_secs: f64, exact: bool },
    PlayAt { rate: f32, item_time_secs: f64, at: HostTime },
    Play { at: HostTime },
    Pause { at: HostTime },
}

struct VisualInner {
    item_id: Option<Uuid>,
    ready: bool,
    ready_on_load: bool,
    anchor_position: f64,
    anchor_time: HostTime,
    rate: f32,
    seek_latency: Duration,
    seeks_hang: bool,
    commands: Vec<VisualCommand>,
}

impl VisualInner {
    fn position_at(&self, now: HostTime) -> f64 {
        if self.rate > 0.0 && now >= self.anchor_time {
            self.anchor_position + (now - self.anchor_time).as_secs_f64() * self.rate as f64
        } else {
            self.anchor_position
        }
    }
}

/// Visual pipeline whose position advances with the host clock
pub struct SimVisualPipeline {
    clock: Arc<dyn HostClock>,
    inner: Mutex<VisualInner>,
}

impl SimVisualPipeline {
    /// Items report ready as soon as they are loaded
    pub fn new(clock: Arc<dyn HostClock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(VisualInner {
                item_id: None,
                ready: false,
                ready_on_load: true,
                anchor_position: 0.0,
                anchor_time: HostTime::ZERO,
                rate: 0.0,
                seek_latency: Duration::ZERO,
                seeks_hang: false,
                commands: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VisualInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// When false, loaded items stay unready until `mark_ready`
    pub fn set_ready_on_load(&self, ready_on_load: bool) {
        self.lock().ready_on_load = ready_on_load;
    }

    pub fn mark_ready(&self) {
        self.lock().ready = true;
    }

    pub fn set_seek_latency(&self, latency: Duration) {
        self.lock().seek_latency = latency;
    }

    /// Seeks issued while set never complete
    pub fn set_seeks_hang(&self, hang: bool) {
        self.lock().seeks_hang = hang;
    }

    /// Move the playhead as an external skip control would
    pub fn jump_to(&self, position_secs: f64) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.anchor_position = position_secs.max(0.0);
        inner.anchor_time = now;
    }

    /// Change rate as an OS-level control would, without engine involvement
    pub fn set_rate_externally(&self, playing: bool) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.anchor_position = inner.position_at(now);
        inner.anchor_time = now;
        inner.rate = if playing { 1.0 } else { 0.0 };
    }

    pub fn loaded_item(&self) -> Option<Uuid> {
        self.lock().item_id
    }

    pub fn commands(&self) -> Vec<VisualCommand> {
        self.lock().commands.clone()
    }

    pub fn seek_count(&self) -> usize {
        self.lock()
            .commands
            .iter()
            .filter(|c| matches!(c, VisualCommand::Seek { .. }))
            .count()
    }

    /// `(item_time_secs, at)` of every `play_at` command
    pub fn play_at_commands(&self) -> Vec<(f64, HostTime)> {
        self.lock()
            .commands
            .iter()
            .filter_map(|c| match c {
                VisualCommand::PlayAt { item_time_secs, at, .. } => Some((*item_time_secs, *at)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl VisualPipeline for SimVisualPipeline {
    fn load_item(&self, item: &MediaItem) {
        let mut inner = self.lock();
        inner.commands.push(VisualCommand::Load { item_id: item.id });
        inner.item_id = Some(item.id);
        inner.ready = inner.ready_on_load;
        inner.anchor_position = 0.0;
        inner.rate = 0.0;
    }

    fn is_ready(&self) -> bool {
        self.lock().ready
    }

    async fn seek(&self, to_secs: f64, exact: bool) -> bool {
        let (latency, hang) = {
            let mut inner = self.lock();
            inner.commands.push(VisualCommand::Seek { to_secs, exact });
            (inner.seek_latency, inner.seeks_hang)
        };

        if hang {
            std::future::pending::<()>().await;
        }
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let now = self.clock.now();
        let mut inner = self.lock();
        inner.anchor_position = to_secs.max(0.0);
        inner.anchor_time = now;
        trace!("Simulated visual seek to {:.3}s complete", to_secs);
        true
    }

    fn play_at(&self, rate: f32, item_time_secs: f64, at: HostTime) {
        let mut inner = self.lock();
        inner.commands.push(VisualCommand::PlayAt { rate, item_time_secs, at });
        inner.anchor_position = item_time_secs;
        inner.anchor_time = at;
        inner.rate = rate;
    }

    fn play(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.commands.push(VisualCommand::Play { at: now });
        inner.anchor_position = inner.position_at(now);
        inner.anchor_time = now;
        inner.rate = 1.0;
    }

    fn pause(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.commands.push(VisualCommand::Pause { at: now });
        inner.anchor_position = inner.position_at(now);
        inner.anchor_time = now;
        inner.rate = 0.0;
    }

    fn current_position(&self) -> f64 {
        let now = self.clock.now();
        self.lock().position_at(now)
    }

    fn is_playing(&self) -> bool {
        self.lock().rate > 0.0
    }
}

// ================================================================================================
// Audio pipeline
// ================================================================================================

/// Command received by the simulated audio pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum AudioCommand {
    StartEngine { succeeded: bool },
    StopEngine,
    Configure(AudioFormat),
    Effects(bool),
    Schedule(SampleRange),
    PlayAt(HostTime),
    Pause,
    Stop,
    Reset,
}

struct LiveSchedule {
    range: SampleRange,
    sample_rate: u32,
    on_consumed: Option<RangeCompletion>,
}

struct AudioInner {
    engine_running: bool,
    start_failures: u32,
    format: Option<AudioFormat>,
    effects_enabled: bool,
    schedule: Option<LiveSchedule>,
    started_at: Option<HostTime>,
    rendered_before_pause: i64,
    startup_latency: Duration,
    commands: Vec<AudioCommand>,
}

impl AudioInner {
    /// Frames of the live schedule rendered by `now`
    fn rendered_at(&self, now: HostTime) -> i64 {
        let Some(schedule) = &self.schedule else {
            return 0;
        };
        let running = match self.started_at {
            Some(at) => {
                let effective = at + self.startup_latency;
                if now >= effective {
                    ((now - effective).as_secs_f64() * schedule.sample_rate as f64).round() as i64
                } else {
                    0
                }
            }
            None => 0,
        };
        (self.rendered_before_pause + running).min(schedule.range.sample_count as i64)
    }

    fn take_schedule(&mut self) -> Option<RangeCompletion> {
        self.started_at = None;
        self.rendered_before_pause = 0;
        self.schedule.take().and_then(|s| s.on_consumed)
    }
}

/// Audio pipeline whose render clock advances with the host clock
pub struct SimAudioPipeline {
    clock: Arc<dyn HostClock>,
    inner: Mutex<AudioInner>,
}

impl SimAudioPipeline {
    /// Engine initially stopped; starts succeed
    pub fn new(clock: Arc<dyn HostClock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(AudioInner {
                engine_running: false,
                start_failures: 0,
                format: None,
                effects_enabled: false,
                schedule: None,
                started_at: None,
                rendered_before_pause: 0,
                startup_latency: Duration::ZERO,
                commands: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AudioInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The next `count` engine starts fail
    pub fn fail_engine_starts(&self, count: u32) {
        self.lock().start_failures = count;
    }

    /// Delay between the commanded start instant and the first rendered frame
    pub fn set_startup_latency(&self, latency: Duration) {
        self.lock().startup_latency = latency;
    }

    /// Simulate the OS tearing the engine down (or bringing it up)
    pub fn set_engine_running(&self, running: bool) {
        let completion = {
            let mut inner = self.lock();
            inner.engine_running = running;
            if running {
                None
            } else {
                inner.take_schedule()
            }
        };
        if let Some(on_consumed) = completion {
            on_consumed();
        }
    }

    /// Shift the render clock by `frames` to provoke drift
    pub fn inject_drift_frames(&self, frames: i64) {
        self.lock().rendered_before_pause += frames;
    }

    pub fn commands(&self) -> Vec<AudioCommand> {
        self.lock().commands.clone()
    }

    pub fn scheduled_ranges(&self) -> Vec<SampleRange> {
        self.lock()
            .commands
            .iter()
            .filter_map(|c| match c {
                AudioCommand::Schedule(range) => Some(*range),
                _ => None,
            })
            .collect()
    }

    pub fn schedule_count(&self) -> usize {
        self.scheduled_ranges().len()
    }

    pub fn play_at_instants(&self) -> Vec<HostTime> {
        self.lock()
            .commands
            .iter()
            .filter_map(|c| match c {
                AudioCommand::PlayAt(at) => Some(*at),
                _ => None,
            })
            .collect()
    }

    pub fn engine_start_attempts(&self) -> usize {
        self.lock()
            .commands
            .iter()
            .filter(|c| matches!(c, AudioCommand::StartEngine { .. }))
            .count()
    }

    pub fn configured_format(&self) -> Option<AudioFormat> {
        self.lock().format
    }

    pub fn effects_enabled(&self) -> bool {
        self.lock().effects_enabled
    }

    /// Asset frame index under the render head, if a range is scheduled
    pub fn current_sample(&self) -> Option<i64> {
        let now = self.clock.now();
        let inner = self.lock();
        let start = inner.schedule.as_ref()?.range.start_sample as i64;
        Some(start + inner.rendered_at(now))
    }
}

impl AudioPipeline for SimAudioPipeline {
    fn is_engine_running(&self) -> bool {
        self.lock().engine_running
    }

    fn start_engine(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.start_failures > 0 {
            inner.start_failures -= 1;
            inner.commands.push(AudioCommand::StartEngine { succeeded: false });
            return Err(Error::EngineStart("simulated engine start failure".to_string()));
        }
        inner.commands.push(AudioCommand::StartEngine { succeeded: true });
        inner.engine_running = true;
        Ok(())
    }

    fn stop_engine(&self) {
        let completion = {
            let mut inner = self.lock();
            inner.commands.push(AudioCommand::StopEngine);
            inner.engine_running = false;
            inner.take_schedule()
        };
        if let Some(on_consumed) = completion {
            on_consumed();
        }
    }

    fn configure_for(&self, format: &AudioFormat) -> Result<()> {
        let mut inner = self.lock();
        inner.commands.push(AudioCommand::Configure(*format));
        if format.sample_rate == 0 {
            return Err(Error::Routing("sample rate must be non-zero".to_string()));
        }
        inner.format = Some(*format);
        Ok(())
    }

    fn set_effects_enabled(&self, enabled: bool) {
        let mut inner = self.lock();
        inner.commands.push(AudioCommand::Effects(enabled));
        inner.effects_enabled = enabled;
    }

    fn schedule_range(&self, asset: &MediaAsset, range: SampleRange, on_consumed: RangeCompletion) -> Result<()> {
        let previous = {
            let mut inner = self.lock();
            if !inner.engine_running {
                return Err(Error::AudioPipeline("audio engine is not running".to_string()));
            }
            inner.commands.push(AudioCommand::Schedule(range));
            let previous = inner.take_schedule();
            inner.schedule = Some(LiveSchedule {
                range,
                sample_rate: asset.sample_rate(),
                on_consumed: Some(on_consumed),
            });
            previous
        };
        if let Some(on_consumed) = previous {
            on_consumed();
        }
        Ok(())
    }

    fn play_at(&self, at: HostTime) {
        let mut inner = self.lock();
        inner.commands.push(AudioCommand::PlayAt(at));
        inner.started_at = Some(at);
    }

    fn pause(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.commands.push(AudioCommand::Pause);
        inner.rendered_before_pause = inner.rendered_at(now);
        inner.started_at = None;
    }

    fn stop(&self) {
        let completion = {
            let mut inner = self.lock();
            inner.commands.push(AudioCommand::Stop);
            inner.take_schedule()
        };
        if let Some(on_consumed) = completion {
            on_consumed();
        }
    }

    fn reset(&self) {
        let completion = {
            let mut inner = self.lock();
            inner.commands.push(AudioCommand::Reset);
            inner.format = None;
            inner.take_schedule()
        };
        if let Some(on_consumed) = completion {
            on_consumed();
        }
    }

    fn is_playing(&self) -> bool {
        let now = self.clock.now();
        let inner = self.lock();
        match (&inner.schedule, inner.started_at) {
            (Some(schedule), Some(_)) => inner.rendered_at(now) < schedule.range.sample_count as i64,
            _ => false,
        }
    }

    fn render_position(&self) -> Option<RenderPosition> {
        let now = self.clock.now();
        let inner = self.lock();
        let schedule = inner.schedule.as_ref()?;
        Some(RenderPosition {
            sample_time: inner.rendered_at(now),
            sample_rate: schedule.sample_rate,
        })
    }
}

// ================================================================================================
// Loader
// ================================================================================================

struct LoaderInner {
    formats: HashMap<String, AudioFormat>,
    failures_remaining: u32,
    latency: Duration,
    open_calls: Vec<String>,
}

/// Loader that answers from a table, with injectable failures
pub struct SimLoader {
    default_format: AudioFormat,
    inner: Mutex<LoaderInner>,
}

impl SimLoader {
    /// Every URL without an explicit entry opens as `default_format`
    pub fn new(default_format: AudioFormat) -> Self {
        Self {
            default_format,
            inner: Mutex::new(LoaderInner {
                formats: HashMap::new(),
                failures_remaining: 0,
                latency: Duration::ZERO,
                open_calls: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoaderInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_format(self, audio_url: impl Into<String>, format: AudioFormat) -> Self {
        self.set_format(audio_url, format);
        self
    }

    /// `audio_url` opens as `format` from now on
    pub fn set_format(&self, audio_url: impl Into<String>, format: AudioFormat) {
        self.lock().formats.insert(audio_url.into(), format);
    }

    /// The next `count` opens fail
    pub fn fail_next(&self, count: u32) {
        self.lock().failures_remaining = count;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub fn open_calls(&self) -> Vec<String> {
        self.lock().open_calls.clone()
    }
}

#[async_trait]
impl MediaSourceLoader for SimLoader {
    async fn open(&self, audio_url: &str) -> Result<AudioFormat> {
        let latency = {
            let mut inner = self.lock();
            inner.open_calls.push(audio_url.to_string());
            inner.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.lock();
        if inner.failures_remaining > 0 {
            inner.failures_remaining -= 1;
            return Err(Error::Load {
                url: audio_url.to_string(),
                reason: "simulated load failure".to_string(),
            });
        }
        Ok(inner.formats.get(audio_url).copied().unwrap_or(self.default_format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;

    fn format_48k_10s() -> AudioFormat {
        AudioFormat {
            sample_rate: 48_000,
            channels: 2,
            total_samples: 480_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_visual_position_follows_clock_after_start_instant() {
        let clock: Arc<dyn HostClock> = Arc::new(MonotonicClock::new());
        let visual = SimVisualPipeline::new(Arc::clone(&clock));
        visual.load_item(&MediaItem::new("clip", "v", "a"));

        let start = clock.now() + Duration::from_millis(50);
        visual.play_at(1.0, 2.0, start);
        assert_eq!(visual.current_position(), 2.0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!((visual.current_position() - 2.1).abs() < 1e-9);

        visual.pause();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!((visual.current_position() - 2.1).abs() < 1e-9);
        assert!(!visual.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_render_clock_counts_from_start_instant() {
        let clock: Arc<dyn HostClock> = Arc::new(MonotonicClock::new());
        let audio = SimAudioPipeline::new(Arc::clone(&clock));
        let asset = MediaAsset::new(MediaItem::new("clip", "v", "a"), format_48k_10s());

        audio.start_engine().unwrap();
        let range = SampleRange {
            start_sample: 96_000,
            sample_count: 384_000,
        };
        audio.schedule_range(&asset, range, Box::new(|| {})).unwrap();
        audio.play_at(clock.now() + Duration::from_millis(90));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(audio.render_position().unwrap().sample_time, 480);
        assert_eq!(audio.current_sample(), Some(96_480));
        assert!(audio.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_fires_range_completion() {
        let clock: Arc<dyn HostClock> = Arc::new(MonotonicClock::new());
        let audio = SimAudioPipeline::new(Arc::clone(&clock));
        let asset = MediaAsset::new(MediaItem::new("clip", "v", "a"), format_48k_10s());
        let fired = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&fired);

        audio.start_engine().unwrap();
        audio
            .schedule_range(
                &asset,
                SampleRange {
                    start_sample: 0,
                    sample_count: 480_000,
                },
                Box::new(move || *flag.lock().unwrap() = true),
            )
            .unwrap();
        audio.stop();

        assert!(*fired.lock().unwrap());
        assert!(audio.render_position().is_none());
    }

    #[tokio::test]
    async fn test_schedule_requires_running_engine() {
        let clock: Arc<dyn HostClock> = Arc::new(MonotonicClock::new());
        let audio = SimAudioPipeline::new(clock);
        let asset = MediaAsset::new(MediaItem::new("clip", "v", "a"), format_48k_10s());
        let range = SampleRange {
            start_sample: 0,
            sample_count: 10,
        };
        assert!(audio.schedule_range(&asset, range, Box::new(|| {})).is_err());
    }

    #[tokio::test]
    async fn test_loader_failures_then_success() {
        let loader = SimLoader::new(format_48k_10s());
        loader.fail_next(1);

        assert!(loader.open("a.m4a").await.is_err());
        assert_eq!(loader.open("a.m4a").await.unwrap(), format_48k_10s());
        assert_eq!(loader.open_calls().len(), 2);
    }
}
