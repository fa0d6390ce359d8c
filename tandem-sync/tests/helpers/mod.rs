//! Test helpers for tandem-sync integration tests
//!
//! Provides a `TestRig`: an engine wired to simulated pipelines on the tokio
//! clock, plus event collection. Tests run with `start_paused = true` so every
//! instant is deterministic.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tandem_common::events::{SessionId, SyncEvent, SyncStateKind};
use tandem_common::SyncConfig;
use tandem_sync::clock::{HostClock, HostTime, MonotonicClock};
use tandem_sync::pipeline::{AudioFormat, MediaItem, SimAudioPipeline, SimLoader, SimVisualPipeline};
use tandem_sync::{Collaborators, EngineHandle, SyncEngine};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Config used by the rig: defaults, without periodic position signals
pub fn test_config() -> SyncConfig {
    SyncConfig {
        position_event_interval_ms: 0,
        ..SyncConfig::default()
    }
}

/// 10 s of 48 kHz stereo
pub fn ten_seconds_48k() -> AudioFormat {
    AudioFormat {
        sample_rate: 48_000,
        channels: 2,
        total_samples: 480_000,
    }
}

pub fn clip(title: &str) -> MediaItem {
    MediaItem::new(title, format!("{}.mp4", title), format!("{}.m4a", title))
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Engine plus the simulated collaborators it drives
pub struct TestRig {
    pub clock: Arc<dyn HostClock>,
    pub visual: Arc<SimVisualPipeline>,
    pub audio: Arc<SimAudioPipeline>,
    pub loader: Arc<SimLoader>,
    pub handle: EngineHandle,
    pub task: JoinHandle<()>,
    events: broadcast::Receiver<SyncEvent>,
    history: Vec<SyncEvent>,
}

impl TestRig {
    pub fn start() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self::build(config, |_, _, _| {})
    }

    /// Build with a hook to prime the collaborators before the engine runs
    pub fn build<F>(config: SyncConfig, prime: F) -> Self
    where
        F: FnOnce(&SimVisualPipeline, &SimAudioPipeline, &SimLoader),
    {
        let clock: Arc<dyn HostClock> = Arc::new(MonotonicClock::new());
        let visual = Arc::new(SimVisualPipeline::new(Arc::clone(&clock)));
        let audio = Arc::new(SimAudioPipeline::new(Arc::clone(&clock)));
        let loader = Arc::new(SimLoader::new(ten_seconds_48k()));
        prime(&visual, &audio, &loader);

        let engine = SyncEngine::new(
            config,
            Collaborators {
                clock: Arc::clone(&clock),
                visual: visual.clone(),
                audio: audio.clone(),
                loader: loader.clone(),
            },
        )
        .expect("valid test config");

        let events = engine.handle().subscribe();
        let (handle, task) = engine.spawn();

        Self {
            clock,
            visual,
            audio,
            loader,
            handle,
            task,
            events,
            history: Vec::new(),
        }
    }

    pub fn now(&self) -> HostTime {
        self.clock.now()
    }

    /// Let the engine run for `millis` of (paused) tokio time
    pub async fn advance_ms(&self, millis: u64) {
        tokio::time::sleep(ms(millis)).await;
    }

    /// Every event received so far
    pub fn events(&mut self) -> &[SyncEvent] {
        while let Ok(event) = self.events.try_recv() {
            self.history.push(event);
        }
        &self.history
    }

    pub fn count_events<P>(&mut self, predicate: P) -> usize
    where
        P: Fn(&SyncEvent) -> bool,
    {
        self.events().iter().filter(|event| predicate(event)).count()
    }

    /// Sessions that were reported entering `state`
    pub fn sessions_entering(&mut self, state: SyncStateKind) -> Vec<SessionId> {
        self.events()
            .iter()
            .filter_map(|event| match event {
                SyncEvent::StateChanged {
                    session_id, new_state, ..
                } if *new_state == state => Some(*session_id),
                _ => None,
            })
            .collect()
    }

    /// Current drift in milliseconds (panics if audio is not playing)
    pub async fn drift_ms(&self) -> f64 {
        self.handle
            .measure_drift()
            .await
            .expect("engine running")
            .expect("audio playing")
            .drift_ms()
    }
}
