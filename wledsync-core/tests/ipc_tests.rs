//! Integration tests for the control socket

use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;
use wledsync_core::capture::FrameQueues;
use wledsync_core::config::Protocol;
use wledsync_core::ipc::{CastStatus, IpcClient, IpcMessage, IpcResponse, IpcServer};
use wledsync_core::{CastConfig, CastSource, Frame, Pipeline, PipelineState, WledSyncError};

fn round_trip(msg: &IpcMessage) -> IpcMessage {
    let bytes = msg.to_bytes();
    assert_eq!(bytes.last(), Some(&b'\n'));
    IpcMessage::from_bytes(&bytes[..bytes.len() - 1]).expect("Should parse")
}

#[test]
fn test_message_serialization() {
    assert!(matches!(round_trip(&IpcMessage::Ping), IpcMessage::Ping));
    assert!(matches!(round_trip(&IpcMessage::ForceStop), IpcMessage::ForceStop));

    let action = IpcMessage::Action {
        action: "multicast".to_string(),
        params: "circular,500".to_string(),
    };
    match round_trip(&action) {
        IpcMessage::Action { action, params } => {
            assert_eq!(action, "multicast");
            assert_eq!(params, "circular,500");
        }
        other => panic!("unexpected {:?}", other),
    }

    let save = IpcMessage::SaveSnapshot {
        index: 2,
        path: PathBuf::from("/tmp/shot.png"),
    };
    assert!(matches!(
        round_trip(&save),
        IpcMessage::SaveSnapshot { index: 2, .. }
    ));
}

#[test]
fn test_request_carries_raw_json() {
    let raw = br#"{"type":"Request","request":{"action":{"type":"reset","param":{}}}}"#;
    match IpcMessage::from_bytes(raw).unwrap() {
        IpcMessage::Request { request } => assert_eq!(request["action"]["type"], "reset"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_status_response_serialization() {
    let resp = IpcResponse::Status(CastStatus {
        running: true,
        state: "Running".to_string(),
        name: Some("desk".to_string()),
        source: Some("desktop".to_string()),
        protocol: Some("ddp".to_string()),
        resolution: Some((16, 16)),
        fps: Some(25),
        pid: 1234,
        uptime_seconds: 12.5,
    });
    let bytes = resp.to_bytes();
    match IpcResponse::from_bytes(&bytes[..bytes.len() - 1]).unwrap() {
        IpcResponse::Status(status) => {
            assert!(status.running);
            assert_eq!(status.resolution, Some((16, 16)));
            assert_eq!(status.pid, 1234);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_invalid_message() {
    assert!(IpcMessage::from_bytes(b"not json").is_err());
    assert!(IpcMessage::from_bytes(br#"{"type":"Launch"}"#).is_err());
}

#[tokio::test]
async fn test_connect_without_socket() {
    let dir = tempdir().unwrap();
    let result = IpcClient::connect_to(&dir.path().join("none.sock"), Duration::from_secs(1)).await;
    assert!(matches!(result, Err(WledSyncError::NoActiveCast)));
}

fn queue_cast() -> CastConfig {
    CastConfig::new(CastSource::queue("ipc"))
        .with_name("ipc-test")
        .with_protocol(Protocol::Other)
        .with_scale(4, 4)
        .with_rate(50)
}

#[tokio::test]
async fn test_control_running_cast() {
    let dir = tempdir().unwrap();
    let socket = dir.path().join("cast.sock");
    let shot_path = dir.path().join("shot.png");

    let queues = FrameQueues::new();
    let mut pipeline = Pipeline::new(queue_cast(), &queues).await.unwrap();

    let mut server = IpcServer::with_path(pipeline.actions(), &socket);
    server.start().await.unwrap();
    let server_task = tokio::spawn(async move { server.run().await });

    let client_ops = async {
        let mut client = IpcClient::connect_to(&socket, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(client.ping().await.unwrap());

        queues.push("ipc", Frame::solid(8, 8, [200, 10, 10]));

        let status = client.status().await.unwrap();
        assert!(status.running);
        assert_eq!(status.name.as_deref(), Some("ipc-test"));
        assert_eq!(status.protocol.as_deref(), Some("other"));

        // Wait for the queued frame to go through
        let mut stats = client.stats().await.unwrap();
        while stats.frames_processed == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stats = client.stats().await.unwrap();
        }
        assert_eq!(stats.resolution, (4, 4));

        let info = client.action("info", "image").await.unwrap().unwrap();
        assert_eq!(info.name, "ipc-test");
        assert!(info.image.is_some());

        let info = client
            .request(json!({"action": {"type": "info", "param": {}}}))
            .await
            .unwrap()
            .unwrap();
        assert!(info.image.is_none());

        // Not a single device cast
        assert!(client.action("host", "192.168.1.99").await.is_err());
        assert!(client.action("warp", "").await.is_err());

        assert_eq!(client.snapshots().await.unwrap(), 0);
        assert!(client.save_snapshot(0, shot_path.clone()).await.is_err());

        assert!(client.action("shot", "").await.unwrap().is_none());
        queues.push("ipc", Frame::solid(8, 8, [10, 200, 10]));
        while client.snapshots().await.unwrap() == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        client.save_snapshot(0, shot_path.clone()).await.unwrap();

        client.stop().await.unwrap();
    };

    let (result, ()) = tokio::join!(pipeline.run_until_stopped(), client_ops);
    let stats = result.unwrap();
    assert_eq!(stats.state, PipelineState::Stopped);
    assert!(stats.frames_processed >= 2);
    assert!(shot_path.exists());

    // The server outlives the cast until it is force stopped
    let mut client = IpcClient::connect_to(&socket, Duration::from_secs(1))
        .await
        .unwrap();
    let status = client.status().await.unwrap();
    assert!(!status.running);
    assert!(client.stats().await.is_err());

    client.force_stop().await.unwrap();
    server_task.await.unwrap().unwrap();
}
