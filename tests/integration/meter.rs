use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use smartmeter::prelude::*;
use tokio::sync::mpsc;

use crate::common::{device_now, init_tracing, FakeMeter, FakeReply, TestProfileBuilder};

/// Answers `(ts, n)` with `n` readings starting `ts` seconds before `device_now()`
fn window_reply(ts: u64, n: u32) -> FakeReply {
    let start = device_now() - TimeDelta::seconds(ts as i64);
    let watts: Vec<i64> = (0..i64::from(n)).map(|i| 1000 + i).collect();
    FakeReply::Xml(TestProfileBuilder::new().start(start).wattages(&watts).build())
}

fn config(host: &str) -> MeterConfig {
    MeterConfig::new(host).with_max_samples_per_request(100).with_request_timeout(Duration::from_secs(2))
}

async fn events_until_finished(events: &mut mpsc::UnboundedReceiver<RangeEvent>) -> Vec<RangeEvent> {
    let mut seen = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
        let done = matches!(event, RangeEvent::Finished(_));
        seen.push(event);
        if done {
            break;
        }
    }
    seen
}

#[tokio::test]
async fn test_polling_delivers_live_wattage() {
    init_tracing();
    let device = FakeMeter::start(|_, _| FakeReply::Xml(TestProfileBuilder::new().start(device_now()).wattages(&[777]).build())).await;
    let meter = PowerMeter::new(config(device.host())).unwrap();

    let (tx, mut readings) = mpsc::unbounded_channel();
    meter.register_observer(Arc::new(move |watts: i64| {
        let _ = tx.send(watts);
    }));
    meter.start_polling(Duration::from_millis(50)).unwrap();

    for _ in 0..3 {
        let reading = tokio::time::timeout(Duration::from_secs(2), readings.recv()).await.unwrap();
        assert_eq!(reading, Some(777));
    }
    meter.stop_polling();

    assert!(device.windows().iter().all(|&window| window == (0, 1)));
    assert_eq!(meter.history().latest_wattage(), Some(777));
}

#[tokio::test]
async fn test_history_fetch_in_chunks() {
    init_tracing();
    let device = FakeMeter::start(window_reply).await;
    let meter = PowerMeter::new(config(device.host())).unwrap();

    let (tx, mut events) = mpsc::unbounded_channel();
    let handle = meter
        .fetch_history(Duration::from_secs(300), move |event| {
            let _ = tx.send(event);
        })
        .unwrap();

    let seen = events_until_finished(&mut events).await;
    let remaining: Vec<u64> = seen
        .iter()
        .filter_map(|event| match event {
            RangeEvent::Progress(progress) => Some(progress.remaining_seconds),
            RangeEvent::Finished(_) => None,
        })
        .collect();

    assert_eq!(device.windows(), vec![(300, 100), (200, 100), (100, 100)]);
    assert_eq!(remaining, vec![200, 100, 0]);
    assert_eq!(seen.last(), Some(&RangeEvent::Finished(RangeOutcome::Completed { samples_added: 300 })));
    assert!(handle.wait().await.is_completed());

    let history = meter.history();
    assert_eq!(history.count(), 300);
    assert_eq!(history.earliest(), Some(device_now() - TimeDelta::seconds(300)));
    assert_eq!(history.latest(), Some(device_now() - TimeDelta::seconds(1)));
}

#[tokio::test]
async fn test_malformed_chunk_stops_history_fetch() {
    init_tracing();
    let device = FakeMeter::start(|ts, n| {
        if ts == 200 {
            FakeReply::Xml("<reply><v>1</v><header>".to_string())
        } else {
            window_reply(ts, n)
        }
    })
    .await;
    let meter = PowerMeter::new(config(device.host())).unwrap();

    let outcome = meter.fetch_history(Duration::from_secs(300), |_| {}).unwrap().wait().await;

    match outcome {
        RangeOutcome::Failed { error, remaining_seconds } => {
            assert!(error.is_parse(), "{error}");
            assert_eq!(remaining_seconds, 200);
        },
        other => panic!("expected a failed fetch, got {other:?}"),
    }
    assert_eq!(device.windows(), vec![(300, 100), (200, 100)]);
    assert_eq!(meter.history().count(), 100);
}

#[tokio::test]
async fn test_device_error_stops_history_fetch() {
    let device = FakeMeter::start(|ts, n| if ts == 100 { FakeReply::Status(503) } else { window_reply(ts, n) }).await;
    let meter = PowerMeter::new(config(device.host())).unwrap();

    let outcome = meter.fetch_history(Duration::from_secs(300), |_| {}).unwrap().wait().await;

    assert!(matches!(outcome, RangeOutcome::Failed { ref error, remaining_seconds: 100 } if error.is_network()));
    assert_eq!(meter.history().count(), 200);
}

#[tokio::test]
async fn test_polling_and_history_merge_into_one_series() {
    let device = FakeMeter::start(window_reply).await;
    let meter = PowerMeter::new(config(device.host())).unwrap();

    meter.fetch_history(Duration::from_secs(5), |_| {}).unwrap().wait().await;
    // Same window again: overlapping readings overwrite instead of duplicating
    meter.fetch_history(Duration::from_secs(5), |_| {}).unwrap().wait().await;
    assert_eq!(meter.history().count(), 5);

    let (tx, mut readings) = mpsc::unbounded_channel();
    meter.register_observer(Arc::new(move |watts: i64| {
        let _ = tx.send(watts);
    }));
    meter.start_polling(Duration::from_secs(3600)).unwrap();
    tokio::time::timeout(Duration::from_secs(2), readings.recv()).await.unwrap();
    meter.stop_polling();

    // The live reading sits at device_now(), right after the fetched window
    assert_eq!(meter.history().count(), 6);
    assert_eq!(meter.history().latest(), Some(device_now()));
}
