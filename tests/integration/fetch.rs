use std::time::Duration;

use chrono::TimeDelta;
use smartmeter::client::{FetchClient, ProfileSource};
use smartmeter::config::MeterConfig;
use smartmeter::Error;
use tokio_util::sync::CancellationToken;

use crate::common::{closed_host, device_now, init_tracing, FakeMeter, FakeReply, TestProfileBuilder};

fn client_for(host: &str) -> FetchClient {
    FetchClient::new(&MeterConfig::new(host).with_request_timeout(Duration::from_millis(500))).unwrap()
}

#[tokio::test]
async fn test_fetch_sends_window_query() {
    init_tracing();
    let meter = FakeMeter::fixed(FakeReply::Xml(TestProfileBuilder::new().wattages(&[1]).build())).await;
    let client = client_for(meter.host());

    client.fetch(300, 100).await.unwrap();
    client.fetch(0, 1).await.unwrap();

    assert_eq!(
        meter.requests(),
        vec![
            "/InstantView/request/getPowerProfile.html?ts=300&n=100".to_string(),
            "/InstantView/request/getPowerProfile.html?ts=0&n=1".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_fetch_parses_profile() {
    init_tracing();
    let body = TestProfileBuilder::new().start(device_now()).wattages(&[100, 150]).build();
    let meter = FakeMeter::fixed(FakeReply::Xml(body)).await;

    let profile = client_for(meter.host()).fetch(2, 2).await.unwrap();
    assert_eq!(profile.wattages(), &[100, 150]);
    assert_eq!(profile.start(), Some(device_now()));

    let samples: Vec<_> = profile.samples(TimeDelta::seconds(1), device_now()).collect();
    assert_eq!(samples[0].timestamp, device_now());
    assert_eq!(samples[1].timestamp, device_now() + TimeDelta::seconds(1));
    assert_eq!(samples[1].watts, 150);
}

#[tokio::test]
async fn test_non_numeric_readings_are_skipped() {
    let body = TestProfileBuilder::new().wattages(&[10]).raw_value("---").wattages(&[20]).without_declaration().build();
    let meter = FakeMeter::fixed(FakeReply::Xml(body)).await;

    let profile = client_for(meter.host()).fetch(0, 3).await.unwrap();
    assert_eq!(profile.wattages(), &[10, 20]);
}

#[tokio::test]
async fn test_empty_profile_is_not_an_error() {
    let meter = FakeMeter::fixed(FakeReply::Xml(TestProfileBuilder::new().build())).await;

    let profile = client_for(meter.host()).fetch(0, 1).await.unwrap();
    assert!(profile.is_empty());
    assert_eq!(profile.last_wattage(), None);
}

#[tokio::test]
async fn test_http_error_status_is_network_error() {
    let meter = FakeMeter::fixed(FakeReply::Status(500)).await;

    let err = client_for(meter.host()).fetch(0, 1).await.unwrap_err();
    assert!(err.is_network(), "{err}");
    assert!(matches!(err, Error::HttpStatus { status: 500, .. }));
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let host = closed_host().await;

    let err = client_for(&host).fetch(0, 1).await.unwrap_err();
    assert!(err.is_network(), "{err}");
}

#[tokio::test]
async fn test_timeout_is_network_error() {
    let meter = FakeMeter::fixed(FakeReply::Hang).await;
    let client = FetchClient::new(&MeterConfig::new(meter.host()).with_request_timeout(Duration::from_millis(200))).unwrap();

    let err = client.fetch(0, 1).await.unwrap_err();
    assert!(err.is_network(), "{err}");
}

#[tokio::test]
async fn test_malformed_document_is_parse_error() {
    let meter = FakeMeter::fixed(FakeReply::Xml("<reply><v>1</v>".to_string())).await;

    let err = client_for(meter.host()).fetch(0, 1).await.unwrap_err();
    assert!(err.is_parse(), "{err}");
}

#[tokio::test]
async fn test_body_cut_short_is_network_error() {
    let meter = FakeMeter::fixed(FakeReply::Truncated("<reply><v>1</v>".to_string())).await;

    let err = client_for(meter.host()).fetch(0, 1).await.unwrap_err();
    assert!(err.is_network(), "{err}");
}

#[tokio::test]
async fn test_fetch_cancellable_abandons_pending_request() {
    let meter = FakeMeter::fixed(FakeReply::Hang).await;
    let client = FetchClient::new(&MeterConfig::new(meter.host()).with_request_timeout(Duration::from_secs(10))).unwrap();
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(2), client.fetch_cancellable(0, 1, &token)).await;
    assert_eq!(result.expect("cancellation did not interrupt the fetch"), Err(Error::Cancelled));
}
