use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;

use sheetmon::core::pipeline::{Pipeline, PipelineEvent, RunState};
use sheetmon::core::sample::DirectoryStats;
use sheetmon::core::sink::SheetSink;
use sheetmon::MonitorError;

use super::support::{Behavior, FakeSource, Fixture, RecordingSink};

fn drain_events(events: &mut broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn start(
    sink: &Arc<RecordingSink>,
    config: sheetmon::Config,
) -> sheetmon::PipelineHandle {
    let sink: Arc<dyn SheetSink> = sink.clone();
    Pipeline::new(FakeSource::steady(), sink).start(config).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_healthy_sink_receives_every_sample() {
    let fixture = Fixture::new();
    let sink = RecordingSink::new(Behavior::Accept);
    let handle = start(&sink, fixture.config());

    sleep(Duration::from_millis(4_500)).await;

    let status = handle.status();
    assert_eq!(status.state, RunState::Running);
    assert_eq!(status.delivered_samples, 5);
    assert_eq!(status.last_sequence_id, 5);
    assert_eq!(status.dropped_samples, 0);
    assert!(status.last_delivery.is_some());
    assert_eq!(sink.delivered_ids(), vec![1, 2, 3, 4, 5]);

    let final_status = handle.shutdown(Duration::from_secs(1)).await;
    assert_eq!(final_status.state, RunState::Stopped);
    assert_eq!(final_status.lost_on_shutdown, 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_until_delivered() {
    let fixture = Fixture::new();
    let sink = RecordingSink::new(Behavior::FailFirst(2));
    let handle = start(&sink, fixture.config());
    let mut events = handle.subscribe();

    sleep(Duration::from_millis(3_500)).await;

    assert_eq!(sink.delivered_ids(), vec![1, 2, 3, 4]);
    for id in 1..=4 {
        assert_eq!(sink.attempts_for(id), 3, "batch starting at {}", id);
    }

    let delivered: Vec<u32> = drain_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            PipelineEvent::BatchDelivered { attempts, .. } => Some(attempts),
            _ => None,
        })
        .collect();
    assert_eq!(delivered, vec![3, 3, 3, 3]);

    let status = handle.shutdown(Duration::from_secs(1)).await;
    assert_eq!(status.dropped_samples, 0);
    assert_eq!(status.possible_duplicate_rows, 0);
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_drops_batch_without_retry() {
    let fixture = Fixture::new();
    let sink = RecordingSink::new(Behavior::Forbidden);
    let handle = start(&sink, fixture.config());
    let mut events = handle.subscribe();

    sleep(Duration::from_millis(500)).await;

    assert_eq!(sink.attempts_for(1), 1);
    let status = handle.status();
    assert_eq!(status.dropped_samples, 1);
    assert!(status.last_fatal_error.unwrap().contains("403 forbidden"));

    let events = drain_events(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::DeliveryFatal { dropped: 1, .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::RetryExhausted { .. })));

    // Monitoring continues after a fatal delivery error
    sleep(Duration::from_secs(1)).await;
    assert_eq!(sink.attempts_for(2), 1);
    assert_eq!(handle.status().state, RunState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_sink_keeps_queue_bounded() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.delivery.queue_capacity = 5;
    config.delivery.max_attempts = 1_000;

    let sink = RecordingSink::new(Behavior::Unreachable);
    let handle = start(&sink, config);

    sleep(Duration::from_millis(9_500)).await;

    let status = handle.status();
    assert_eq!(status.last_sequence_id, 10);
    assert_eq!(status.queued_samples, 5);
    assert_eq!(status.dropped_samples, 5);
    assert_eq!(status.delivered_samples, 0);

    // Once the sink is back, what survived is delivered in order
    sink.recover();
    sleep(Duration::from_millis(1_000)).await;

    let ids = sink.delivered_ids();
    assert!(ids.windows(2).all(|w| w[0] < w[1]), "{:?}", ids);
    assert!(ids.contains(&11));

    let status = handle.shutdown(Duration::from_secs(1)).await;
    assert_eq!(status.dropped_samples, 5);
    assert_eq!(status.lost_on_shutdown, 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_drops_batch() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.delivery.max_attempts = 3;

    let sink = RecordingSink::new(Behavior::Unreachable);
    let handle = start(&sink, config);
    let mut events = handle.subscribe();

    // 100ms + 200ms of backoff between the three attempts
    sleep(Duration::from_millis(500)).await;

    assert_eq!(sink.attempts_for(1), 3);
    let status = handle.status();
    assert_eq!(status.dropped_samples, 1);
    assert!(status.last_fatal_error.unwrap().contains("3 attempts"));
    assert!(drain_events(&mut events)
        .iter()
        .any(|e| matches!(e, PipelineEvent::RetryExhausted { attempts: 3, dropped: 1, .. })));

    handle.shutdown(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_pause_skips_ticks_without_replaying_them() {
    let fixture = Fixture::new();
    let sink = RecordingSink::new(Behavior::Accept);
    let handle = start(&sink, fixture.config());

    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(handle.pause().await.unwrap(), RunState::Paused);
    assert_eq!(handle.pause().await.unwrap(), RunState::Paused);

    sleep(Duration::from_secs(3)).await;
    assert_eq!(handle.status().last_sequence_id, 2);

    assert_eq!(handle.resume().await.unwrap(), RunState::Running);
    assert_eq!(handle.resume().await.unwrap(), RunState::Running);
    sleep(Duration::from_secs(1)).await;

    let status = handle.shutdown(Duration::from_secs(1)).await;
    assert_eq!(sink.delivered_ids(), vec![1, 2, 3]);
    assert_eq!(status.skipped_ticks, 0);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_metrics_skip_the_tick() {
    let fixture = Fixture::new();
    let sink = RecordingSink::new(Behavior::Accept);
    let source = FakeSource::with_script(vec![None, None]);
    let sink_dyn: Arc<dyn SheetSink> = sink.clone();
    let handle = Pipeline::new(source, sink_dyn)
        .start(fixture.config())
        .unwrap();
    let mut events = handle.subscribe();

    sleep(Duration::from_millis(3_500)).await;

    let status = handle.status();
    assert_eq!(status.skipped_ticks, 2);
    assert_eq!(status.state, RunState::Running);
    // Skipped ticks do not consume sequence ids
    assert_eq!(sink.delivered_ids(), vec![1, 2]);

    let skipped = drain_events(&mut events)
        .into_iter()
        .filter(|e| matches!(e, PipelineEvent::TickSkipped { .. }))
        .count();
    assert_eq!(skipped, 2);
}

#[tokio::test(start_paused = true)]
async fn test_one_bad_directory_does_not_blank_the_sample() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.directories.insert(1, fixture.root.path().join("missing"));

    let sink = RecordingSink::new(Behavior::Accept);
    let handle = start(&sink, config);
    sleep(Duration::from_millis(500)).await;

    let rows = sink.delivered_rows();
    assert_eq!(rows.len(), 1);

    let json = rows[0].values[6].as_str().unwrap();
    let stats: Vec<DirectoryStats> = serde_json::from_str(json).unwrap();
    assert_eq!(stats.len(), 4);
    assert!(stats[1].error.is_some());
    assert_eq!(stats.iter().filter(|s| s.is_ok()).count(), 3);
    assert!(stats.iter().filter(|s| s.is_ok()).all(|s| s.file_count == 1));

    handle.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_reload_changes_interval_and_sink_target() {
    let fixture = Fixture::new();
    let sink = RecordingSink::new(Behavior::Accept);
    let handle = start(&sink, fixture.config());
    let mut events = handle.subscribe();

    sleep(Duration::from_millis(500)).await;

    let mut next = fixture.config();
    next.interval_seconds = 2;
    next.sink.worksheet_name = "Other".to_string();
    handle.reload(next).await.unwrap();

    assert_eq!(handle.config().interval_seconds, 2);
    assert_eq!(sink.reconfigured().len(), 1);
    assert_eq!(sink.reconfigured()[0].worksheet_name, "Other");
    assert!(drain_events(&mut events)
        .iter()
        .any(|e| *e == PipelineEvent::ConfigReloaded));

    // New schedule: ticks at 2.5s and 4.5s
    sleep(Duration::from_millis(4_500)).await;
    assert_eq!(handle.status().last_sequence_id, 3);

    handle.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_invalid_reload_keeps_current_config() {
    let fixture = Fixture::new();
    let sink = RecordingSink::new(Behavior::Accept);
    let handle = start(&sink, fixture.config());

    let mut bad = fixture.config();
    bad.interval_seconds = 0;

    let result = handle.reload(bad).await;
    assert!(matches!(result, Err(MonitorError::ConfigInvalid(_))));
    assert_eq!(handle.config().interval_seconds, 1);
    assert!(sink.reconfigured().is_empty());

    handle.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_start_rejects_invalid_config() {
    let sink = RecordingSink::new(Behavior::Accept);

    let mut config = Fixture::new().config();
    config.directories.clear();
    let sink_dyn: Arc<dyn SheetSink> = sink.clone();
    let result = Pipeline::new(FakeSource::steady(), sink_dyn).start(config);
    assert!(matches!(result, Err(MonitorError::ConfigInvalid(_))));

    let mut config = Fixture::new().config();
    config.interval_seconds = 0;
    let sink_dyn: Arc<dyn SheetSink> = sink.clone();
    let result = Pipeline::new(FakeSource::steady(), sink_dyn).start(config);
    assert!(matches!(result, Err(MonitorError::ConfigInvalid(_))));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_counts_undelivered_samples_as_lost() {
    let fixture = Fixture::new();
    let sink = RecordingSink::new(Behavior::Hang);
    let handle = start(&sink, fixture.config());
    let mut events = handle.subscribe();

    sleep(Duration::from_millis(2_500)).await;
    assert_eq!(handle.status().queued_samples, 3);

    let status = handle.shutdown(Duration::from_secs(1)).await;
    assert_eq!(status.state, RunState::Stopped);
    assert_eq!(status.lost_on_shutdown, 3);
    assert_eq!(status.dropped_samples, 3);
    assert_eq!(status.queued_samples, 0);
    assert!(drain_events(&mut events)
        .iter()
        .any(|e| *e == PipelineEvent::SamplesLost { count: 3 }));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_all_handles_shuts_down() {
    let fixture = Fixture::new();
    let sink = RecordingSink::new(Behavior::Accept);
    let handle = start(&sink, fixture.config());
    let mut events = handle.subscribe();

    let second = handle.clone();
    drop(handle);
    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(second.status().state, RunState::Running);
    drop(second);

    loop {
        match events.recv().await {
            Ok(PipelineEvent::StateChanged {
                state: RunState::Stopped,
            }) => break,
            Ok(_) => continue,
            Err(e) => panic!("pipeline did not stop: {}", e),
        }
    }
    assert_eq!(sink.delivered_ids(), vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_tick_is_followed_immediately_without_burst() {
    let fixture = Fixture::new();
    let sink = RecordingSink::new(Behavior::Accept);
    // The second read overruns three 1s periods
    let source = FakeSource::stalling(2, Duration::from_millis(3_500));
    let reads = source.read_times();
    let sink_dyn: Arc<dyn SheetSink> = sink.clone();
    let handle = Pipeline::new(source, sink_dyn)
        .start(fixture.config())
        .unwrap();

    // Reads at 0s, 1s (until 4.5s), 4.5s, then 5.5s
    sleep(Duration::from_millis(5_100)).await;
    assert_eq!(handle.status().last_sequence_id, 3, "missed ticks fired in a burst");

    sleep(Duration::from_millis(1_000)).await;
    let reads = reads.lock().clone();
    assert!(reads.len() >= 4, "{} reads", reads.len());

    let after_stall = reads[2] - reads[1];
    assert!(after_stall >= Duration::from_millis(3_500));
    assert!(
        after_stall < Duration::from_millis(3_900),
        "next tick waited {:?} after the slow one",
        after_stall
    );

    let steady = reads[3] - reads[2];
    assert!(
        steady >= Duration::from_millis(950) && steady < Duration::from_millis(1_400),
        "ticks resumed {:?} apart",
        steady
    );

    handle.shutdown(Duration::from_secs(1)).await;
    assert_eq!(sink.delivered_ids()[..4], [1, 2, 3, 4]);
}
