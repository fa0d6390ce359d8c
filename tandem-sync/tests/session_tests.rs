//! Integration tests - sessions, queue and control surface

mod helpers;

use helpers::{clip, ms, test_config, TestRig};
use tandem_common::events::{AudioMode, SyncEvent, SyncStateKind};
use tandem_sync::pipeline::{AudioPipeline, VisualPipeline};
use tandem_sync::{Direction, Error, PlatformEvent, TransportCommand};

#[tokio::test(start_paused = true)]
async fn test_double_advance_only_second_session_plays() {
    let mut rig = TestRig::build(test_config(), |_, _, loader| loader.set_latency(ms(20)));
    let items = vec![clip("a"), clip("b"), clip("c")];

    rig.handle.set_queue(items.clone(), 0).unwrap();
    rig.advance_ms(5).await;
    rig.handle.advance(Direction::Next).unwrap();
    rig.handle.advance(Direction::Next).unwrap();
    rig.advance_ms(500).await;

    let status = rig.handle.status().await;
    assert_eq!(status.item_id, Some(items[2].id));
    assert_eq!(status.state, SyncStateKind::Playing);

    let playing = rig.sessions_entering(SyncStateKind::Playing);
    assert_eq!(playing, vec![status.session_id]);

    assert_eq!(rig.loader.open_calls().len(), 3);
    assert_eq!(rig.visual.play_at_commands().len(), 1);
    assert_eq!(rig.audio.play_at_instants().len(), 1);
    assert_eq!(
        rig.count_events(|e| matches!(e, SyncEvent::SessionSuperseded { .. })),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn test_session_ids_strictly_increase() {
    let mut rig = TestRig::start();
    for title in ["one", "two", "three"] {
        rig.handle.play(clip(title)).unwrap();
        rig.advance_ms(50).await;
    }

    let ids: Vec<_> = rig
        .events()
        .iter()
        .filter_map(|e| match e {
            SyncEvent::SessionStarted { session_id, .. } => Some(*session_id),
            _ => None,
        })
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test(start_paused = true)]
async fn test_stale_seek_completion_is_ignored() {
    let rig = TestRig::build(test_config(), |visual, _, _| visual.set_seek_latency(ms(100)));
    let first = clip("first");
    let second = clip("second");

    rig.handle.play(first).unwrap();
    rig.advance_ms(50).await;
    // First session's seek is still in flight
    rig.handle.play(second.clone()).unwrap();
    rig.advance_ms(400).await;

    // Exactly one start: the second session's
    assert_eq!(rig.visual.play_at_commands().len(), 1);
    assert_eq!(rig.audio.play_at_instants().len(), 1);
    assert_eq!(rig.handle.status().await.item_id, Some(second.id));
}

#[tokio::test(start_paused = true)]
async fn test_stale_load_retry_is_ignored() {
    let mut rig = TestRig::build(test_config(), |_, _, loader| loader.fail_next(1));
    let a = clip("a");
    let b = clip("b");

    rig.handle.play(a).unwrap();
    rig.advance_ms(20).await;
    // The first session's retry timer is still pending
    rig.handle.play(b.clone()).unwrap();
    rig.advance_ms(400).await;

    assert_eq!(rig.loader.open_calls(), vec!["a.m4a".to_string(), "b.m4a".to_string()]);
    assert_eq!(rig.audio.play_at_instants().len(), 1);
    assert_eq!(
        rig.count_events(|e| matches!(e, SyncEvent::AudioUnavailable { .. })),
        0
    );

    let status = rig.handle.status().await;
    assert_eq!(status.item_id, Some(b.id));
    assert_eq!(status.state, SyncStateKind::Playing);
    assert_eq!(status.audio_mode, AudioMode::Synced);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_pause_and_resume() {
    let rig = TestRig::start();
    rig.handle.play(clip("pausable")).unwrap();
    rig.advance_ms(500).await;

    rig.handle.toggle_pause().unwrap();
    rig.advance_ms(10).await;
    let status = rig.handle.status().await;
    assert_eq!(status.state, SyncStateKind::Paused);
    assert!(!status.playing);
    assert!(!rig.visual.is_playing());
    assert!(!rig.audio.is_playing());
    let paused_at = rig.visual.current_position();

    rig.advance_ms(1_000).await;
    assert_eq!(rig.visual.current_position(), paused_at);

    let now = rig.now();
    rig.handle.toggle_pause().unwrap();
    rig.advance_ms(1).await;
    let (position, at) = *rig.visual.play_at_commands().last().unwrap();
    assert_eq!(position, paused_at);
    assert_eq!(at, now + ms(50));
    assert_eq!(*rig.audio.play_at_instants().last().unwrap(), now + ms(90));

    rig.advance_ms(300).await;
    assert_eq!(rig.handle.status().await.state, SyncStateKind::Playing);
    assert!(rig.drift_ms().await < 25.0);
}

#[tokio::test(start_paused = true)]
async fn test_seek_while_paused_reschedules_only() {
    let rig = TestRig::start();
    rig.handle.play(clip("paused-seek")).unwrap();
    rig.advance_ms(500).await;
    rig.handle.toggle_pause().unwrap();
    rig.advance_ms(10).await;
    let starts_before = rig.audio.play_at_instants().len();

    rig.handle.seek(3.0).unwrap();
    rig.advance_ms(400).await;

    assert_eq!(rig.audio.scheduled_ranges().last().unwrap().start_sample, 144_000);
    assert_eq!(rig.audio.play_at_instants().len(), starts_before);
    assert!(!rig.visual.is_playing());
    assert_eq!(rig.visual.current_position(), 3.0);
    assert_eq!(rig.handle.status().await.state, SyncStateKind::Paused);
}

#[tokio::test(start_paused = true)]
async fn test_advance_wraps_and_empty_queue_is_noop() {
    let rig = TestRig::start();

    rig.handle.advance(Direction::Next).unwrap();
    rig.advance_ms(10).await;
    assert_eq!(rig.handle.status().await.state, SyncStateKind::Idle);

    let items = vec![clip("x"), clip("y")];
    rig.handle.set_queue(items.clone(), 0).unwrap();
    rig.advance_ms(10).await;
    rig.handle.advance(Direction::Previous).unwrap();
    rig.advance_ms(10).await;
    assert_eq!(rig.handle.status().await.item_id, Some(items[1].id));
}

#[tokio::test(start_paused = true)]
async fn test_end_of_item_auto_advances_then_pauses_at_end() {
    let rig = TestRig::start();
    let items = vec![clip("first"), clip("last")];
    rig.handle.set_queue(items.clone(), 0).unwrap();
    rig.advance_ms(500).await;

    rig.handle
        .platform_event(PlatformEvent::VisualPlaybackEnded { item_id: items[0].id })
        .unwrap();
    rig.advance_ms(500).await;
    let status = rig.handle.status().await;
    assert_eq!(status.item_id, Some(items[1].id));
    assert_eq!(status.state, SyncStateKind::Playing);

    // A late end-of-item for the previous item changes nothing
    rig.handle
        .platform_event(PlatformEvent::VisualPlaybackEnded { item_id: items[0].id })
        .unwrap();
    rig.advance_ms(10).await;
    assert_eq!(rig.handle.status().await.item_id, Some(items[1].id));

    rig.handle
        .platform_event(PlatformEvent::VisualPlaybackEnded { item_id: items[1].id })
        .unwrap();
    rig.advance_ms(10).await;
    let status = rig.handle.status().await;
    assert_eq!(status.item_id, Some(items[1].id));
    assert_eq!(status.state, SyncStateKind::Paused);
    assert!(!rig.audio.is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_remote_transport_pause_and_play() {
    let mut rig = TestRig::start();
    rig.handle.play(clip("remote")).unwrap();
    rig.advance_ms(500).await;

    rig.handle
        .platform_event(PlatformEvent::RemoteTransport {
            command: TransportCommand::Pause,
        })
        .unwrap();
    rig.advance_ms(10).await;
    assert_eq!(rig.handle.status().await.state, SyncStateKind::Paused);

    rig.handle
        .platform_event(PlatformEvent::RemoteTransport {
            command: TransportCommand::Play,
        })
        .unwrap();
    rig.advance_ms(300).await;
    assert_eq!(rig.handle.status().await.state, SyncStateKind::Playing);
    assert_eq!(
        rig.count_events(|e| matches!(
            e,
            SyncEvent::ResyncPerformed {
                trigger: tandem_common::events::ResyncTrigger::ExternalTransport,
                ..
            }
        )),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_external_rate_stop_pauses_audio() {
    let rig = TestRig::start();
    rig.handle.play(clip("rate")).unwrap();
    rig.advance_ms(500).await;

    rig.visual.set_rate_externally(false);
    rig.handle
        .platform_event(PlatformEvent::VisualRateChanged { playing: false })
        .unwrap();
    rig.advance_ms(10).await;

    assert_eq!(rig.handle.status().await.state, SyncStateKind::Paused);
    assert!(!rig.audio.is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_effects_toggle_emits_and_checks_drift() {
    let mut rig = TestRig::start();
    rig.handle.play(clip("effects")).unwrap();
    rig.advance_ms(500).await;
    let schedules_before = rig.audio.schedule_count();

    rig.handle.set_effects_enabled(true).unwrap();
    rig.advance_ms(10).await;

    assert!(rig.audio.effects_enabled());
    assert!(rig.handle.status().await.effects_enabled);
    assert_eq!(rig.audio.schedule_count(), schedules_before);
    assert_eq!(
        rig.count_events(|e| matches!(e, SyncEvent::EffectsChanged { enabled: true, .. })),
        1
    );
    assert_eq!(
        rig.count_events(|e| matches!(
            e,
            SyncEvent::ResyncSkipped {
                trigger: tandem_common::events::ResyncTrigger::EffectsToggled,
                ..
            }
        )),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_position_updates_while_playing() {
    let mut config = test_config();
    config.position_event_interval_ms = 1_000;
    let mut rig = TestRig::with_config(config);

    rig.handle.play(clip("ticking")).unwrap();
    rig.advance_ms(3_500).await;

    let updates = rig.count_events(|e| matches!(e, SyncEvent::PositionUpdate { .. }));
    assert!(updates >= 3, "expected at least 3 position updates, got {}", updates);
}

#[tokio::test(start_paused = true)]
async fn test_handle_fails_after_shutdown() {
    let rig = TestRig::start();
    rig.handle.shutdown().unwrap();
    let TestRig { handle, task, .. } = rig;
    task.await.unwrap();

    assert!(matches!(handle.play(clip("late")), Err(Error::EngineClosed)));
    assert!(matches!(handle.measure_drift().await, Err(Error::EngineClosed)));
}
