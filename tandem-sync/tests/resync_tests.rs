//! Integration tests - drift correction
//!
//! Drift is provoked by shifting the simulated audio render clock and then
//! delivering a discrete trigger.

mod helpers;

use helpers::{clip, ms, TestRig};
use tandem_common::events::{ResyncTrigger, SyncEvent, SyncStateKind};
use tandem_sync::pipeline::{AudioCommand, AudioPipeline};
use tandem_sync::PlatformEvent;

/// Rig playing a 10 s clip, past the start settle delay
async fn playing_rig() -> TestRig {
    let rig = TestRig::start();
    rig.handle.play(clip("drift")).unwrap();
    rig.advance_ms(500).await;
    assert_eq!(rig.handle.status().await.state, SyncStateKind::Playing);
    rig
}

#[tokio::test(start_paused = true)]
async fn test_small_drift_does_not_reschedule() {
    let mut rig = playing_rig().await;
    let schedules_before = rig.audio.schedule_count();

    // 12 ms at 48 kHz
    rig.audio.inject_drift_frames(576);
    rig.handle.platform_event(PlatformEvent::PositionJump).unwrap();
    rig.advance_ms(10).await;

    assert_eq!(rig.audio.schedule_count(), schedules_before);
    let skipped: Vec<f64> = rig
        .events()
        .iter()
        .filter_map(|e| match e {
            SyncEvent::ResyncSkipped {
                trigger: ResyncTrigger::PositionJump,
                drift_ms,
                ..
            } => Some(*drift_ms),
            _ => None,
        })
        .collect();
    assert_eq!(skipped.len(), 1);
    assert!((skipped[0] - 12.0).abs() < 0.1);
}

#[tokio::test(start_paused = true)]
async fn test_large_drift_restarts_after_lookahead_and_offset() {
    let mut rig = playing_rig().await;

    // 60 ms at 48 kHz
    rig.audio.inject_drift_frames(2_880);
    let now = rig.now();
    rig.handle.platform_event(PlatformEvent::PositionJump).unwrap();
    rig.advance_ms(1).await;

    let ranges = rig.audio.scheduled_ranges();
    assert_eq!(ranges.len(), 2);
    // Visual is at 0.45 s; audio resumes 30 ms ahead of it
    assert_eq!(ranges[1].start_sample, 23_040);
    assert_eq!(ranges[1].sample_count, 480_000 - 23_040);

    let instants = rig.audio.play_at_instants();
    assert_eq!(instants.len(), 2);
    assert_eq!(instants[1], now + ms(70));

    // Stop precedes the reschedule
    let commands = rig.audio.commands();
    let last_schedule = commands
        .iter()
        .rposition(|c| matches!(c, AudioCommand::Schedule(_)))
        .unwrap();
    assert_eq!(commands[last_schedule - 1], AudioCommand::Stop);

    let performed: Vec<_> = rig
        .events()
        .iter()
        .filter_map(|e| match e {
            SyncEvent::ResyncPerformed {
                drift_ms, restarted, ..
            } => Some((*drift_ms, *restarted)),
            _ => None,
        })
        .collect();
    assert_eq!(performed.len(), 1);
    let (drift_ms, restarted) = performed[0];
    assert!((drift_ms.unwrap() - 60.0).abs() < 0.1);
    assert!(restarted);

    rig.advance_ms(100).await;
    assert!(rig.drift_ms().await < 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_correcting_is_transient() {
    let mut rig = playing_rig().await;

    rig.audio.inject_drift_frames(4_800);
    rig.handle.platform_event(PlatformEvent::PositionJump).unwrap();
    rig.advance_ms(10).await;

    assert_eq!(rig.sessions_entering(SyncStateKind::Correcting).len(), 1);
    assert_eq!(rig.handle.status().await.state, SyncStateKind::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_position_jump_ignored_during_start() {
    let rig = TestRig::build(helpers::test_config(), |visual, _, _| visual.set_seek_latency(ms(100)));
    let mut rig = rig;

    rig.handle.play(clip("starting")).unwrap();
    rig.advance_ms(10).await;
    assert_eq!(rig.handle.status().await.state, SyncStateKind::Starting);

    rig.handle.platform_event(PlatformEvent::PositionJump).unwrap();
    rig.handle
        .platform_event(PlatformEvent::VisualRateChanged { playing: true })
        .unwrap();
    rig.advance_ms(150).await;

    // Still inside the settle delay
    rig.handle.platform_event(PlatformEvent::PositionJump).unwrap();
    rig.advance_ms(10).await;

    assert_eq!(rig.audio.schedule_count(), 1);
    assert_eq!(
        rig.count_events(|e| matches!(e, SyncEvent::ResyncSkipped { .. } | SyncEvent::ResyncPerformed { .. })),
        0
    );
}

#[tokio::test(start_paused = true)]
async fn test_position_jump_ignored_during_user_seek() {
    let rig = TestRig::build(helpers::test_config(), |visual, _, _| visual.set_seek_latency(ms(50)));
    let mut rig = rig;
    rig.handle.play(clip("seeking")).unwrap();
    rig.advance_ms(500).await;

    rig.handle.seek(4.0).unwrap();
    rig.advance_ms(10).await;
    rig.handle.platform_event(PlatformEvent::PositionJump).unwrap();
    rig.advance_ms(100).await;
    rig.handle.platform_event(PlatformEvent::PositionJump).unwrap();
    rig.advance_ms(10).await;

    let resyncs: Vec<ResyncTrigger> = rig
        .events()
        .iter()
        .filter_map(|e| match e {
            SyncEvent::ResyncPerformed { trigger, .. } | SyncEvent::ResyncSkipped { trigger, .. } => Some(*trigger),
            _ => None,
        })
        .collect();
    assert_eq!(resyncs, vec![ResyncTrigger::UserSeek]);
}

#[tokio::test(start_paused = true)]
async fn test_user_seek_while_playing_resyncs_to_target() {
    let mut rig = playing_rig().await;

    rig.handle.seek(5.0).unwrap();
    rig.advance_ms(1).await;

    let ranges = rig.audio.scheduled_ranges();
    assert_eq!(ranges.last().unwrap().start_sample, 241_440);
    assert!(rig.count_events(|e| matches!(
        e,
        SyncEvent::ResyncPerformed {
            trigger: ResyncTrigger::UserSeek,
            restarted: true,
            ..
        }
    )) == 1);

    rig.advance_ms(400).await;
    assert_eq!(rig.handle.status().await.state, SyncStateKind::Playing);
    assert!(rig.drift_ms().await < 25.0);
    assert!(rig.audio.is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_drift_query_reports_none_when_paused() {
    let rig = playing_rig().await;
    rig.handle.toggle_pause().unwrap();
    rig.advance_ms(10).await;

    assert_eq!(rig.handle.measure_drift().await.unwrap(), None);
}
