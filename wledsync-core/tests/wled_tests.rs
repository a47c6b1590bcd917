//! Tests for the WLED JSON API client

mod mocks;

use mocks::FakeWled;
use serde_json::json;
use wledsync_core::output::wled::WledClient;

#[tokio::test]
async fn test_info_from_matrix_device() {
    let wled = FakeWled::matrix(16, 8).await;
    let client = WledClient::with_port("127.0.0.1", wled.port()).unwrap();

    let info = client.info().await.unwrap();
    assert_eq!(info.name, "Matrix");
    assert_eq!(info.leds.count, 128);
    assert_eq!(info.udp_port, 21324);
    assert_eq!(client.matrix_dimensions().await.unwrap(), Some((16, 8)));
    assert!(client.is_alive().await);
}

#[tokio::test]
async fn test_strip_reports_no_matrix() {
    let wled = FakeWled::strip(60).await;
    let client = WledClient::with_port("127.0.0.1", wled.port()).unwrap();

    assert_eq!(client.matrix_dimensions().await.unwrap(), None);
}

#[tokio::test]
async fn test_live_mode_posts_state() {
    let wled = FakeWled::strip(60).await;
    let client = WledClient::with_port("127.0.0.1", wled.port()).unwrap();

    client.set_live_mode(true, true).await.unwrap();
    client.set_live_mode(true, false).await.unwrap();

    assert_eq!(
        wled.states(),
        vec![
            json!({ "on": true, "live": true }),
            json!({ "on": true, "live": false }),
        ]
    );
}

#[tokio::test]
async fn test_invalid_info_is_an_error() {
    let wled = FakeWled::start(json!({ "leds": "not an object" })).await;
    let client = WledClient::with_port("127.0.0.1", wled.port()).unwrap();

    let err = client.info().await.unwrap_err();
    assert!(err.to_string().contains("/json/info"), "{}", err);
}
