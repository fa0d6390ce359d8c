//! Integration tests - synchronized start protocol
//!
//! Start instants, scheduled ranges, the readiness gate and calibration.

mod helpers;

use helpers::{clip, ms, test_config, TestRig};
use tandem_common::config::CalibrationProfile;
use tandem_common::events::{AudioMode, SyncEvent, SyncStateKind};
use tandem_sync::pipeline::{AudioCommand, SampleRange, VisualPipeline};
use tandem_sync::PlatformEvent;

#[tokio::test(start_paused = true)]
async fn test_start_from_zero_schedules_whole_asset_with_offset_instants() {
    let mut rig = TestRig::start();
    let t0 = rig.now();

    rig.handle.play(clip("ten-seconds")).unwrap();
    rig.advance_ms(10).await;

    assert_eq!(
        rig.audio.scheduled_ranges(),
        vec![SampleRange {
            start_sample: 0,
            sample_count: 480_000,
        }]
    );
    assert_eq!(rig.visual.play_at_commands(), vec![(0.0, t0 + ms(50))]);
    assert_eq!(rig.audio.play_at_instants(), vec![t0 + ms(90)]);

    let starts = rig.count_events(|e| {
        matches!(
            e,
            SyncEvent::SynchronizedStart {
                target_sample: Some(0),
                warm_up_ms: 50,
                audio_start_offset_ms: Some(40),
                ..
            }
        )
    });
    assert_eq!(starts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_audio_start_instant_trails_visual_by_offset() {
    let mut rig = TestRig::start();
    let item = clip("offset");

    rig.handle.play(item).unwrap();
    rig.advance_ms(10).await;

    let visual = rig.visual.play_at_commands();
    let audio = rig.audio.play_at_instants();
    assert_eq!(visual.len(), 1);
    assert_eq!(audio.len(), 1);
    assert_eq!(audio[0], visual[0].1 + ms(40));
    assert!(rig.events().iter().any(|e| matches!(e, SyncEvent::SessionStarted { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_seek_before_start_sets_start_position() {
    let rig = TestRig::build(test_config(), |visual, _, _| visual.set_ready_on_load(false));
    let item = clip("late-ready");

    rig.handle.play(item.clone()).unwrap();
    rig.advance_ms(10).await;
    rig.handle.seek(4.0).unwrap();
    rig.handle
        .platform_event(PlatformEvent::VisualReady { item_id: item.id })
        .unwrap();
    rig.advance_ms(10).await;

    assert_eq!(rig.visual.play_at_commands()[0].0, 4.0);
    assert_eq!(rig.audio.scheduled_ranges()[0].start_sample, 192_000);
}

#[tokio::test(start_paused = true)]
async fn test_reaches_playing_and_stays_within_drift_bound() {
    let mut rig = TestRig::start();
    rig.handle.play(clip("bound")).unwrap();

    rig.advance_ms(10).await;
    let status = rig.handle.status().await;
    assert_eq!(status.state, SyncStateKind::Playing);
    assert_eq!(status.audio_mode, AudioMode::Synced);

    rig.advance_ms(490).await;
    assert!(rig.drift_ms().await < 25.0);

    rig.advance_ms(3_000).await;
    assert!(rig.drift_ms().await < 25.0);
    assert_eq!(rig.sessions_entering(SyncStateKind::Playing).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_waits_for_visual_readiness() {
    let rig = TestRig::build(test_config(), |visual, _, _| visual.set_ready_on_load(false));
    let item = clip("gated");

    rig.handle.play(item.clone()).unwrap();
    rig.advance_ms(500).await;
    assert!(rig.visual.play_at_commands().is_empty());
    assert!(rig.audio.scheduled_ranges().is_empty());
    assert_eq!(rig.handle.status().await.state, SyncStateKind::Loading);

    // Readiness of some other item does not open the gate
    rig.handle
        .platform_event(PlatformEvent::VisualReady {
            item_id: clip("other").id,
        })
        .unwrap();
    rig.advance_ms(10).await;
    assert!(rig.visual.play_at_commands().is_empty());

    rig.handle
        .platform_event(PlatformEvent::VisualReady { item_id: item.id })
        .unwrap();
    rig.advance_ms(10).await;
    assert_eq!(rig.visual.play_at_commands().len(), 1);
    assert_eq!(rig.audio.play_at_instants().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_calibration_profile_overrides_offset() {
    let mut config = test_config();
    config.device_class = Some("handset".to_string());
    config.calibration.insert(
        "handset".to_string(),
        CalibrationProfile {
            audio_start_offset_ms: Some(55),
        },
    );
    let rig = TestRig::with_config(config);
    let t0 = rig.now();

    rig.handle.play(clip("calibrated")).unwrap();
    rig.advance_ms(10).await;

    assert_eq!(rig.audio.play_at_instants(), vec![t0 + ms(105)]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_seek_delays_start_instant() {
    let rig = TestRig::build(test_config(), |visual, _, _| visual.set_seek_latency(ms(120)));
    let t0 = rig.now();

    rig.handle.play(clip("slow-seek")).unwrap();
    rig.advance_ms(200).await;

    assert_eq!(rig.visual.play_at_commands(), vec![(0.0, t0 + ms(170))]);
    assert_eq!(rig.audio.play_at_instants(), vec![t0 + ms(210)]);
    assert!(rig
        .audio
        .commands()
        .iter()
        .any(|c| matches!(c, AudioCommand::Schedule(_))));
    assert!(rig.visual.is_playing());
}
