//! Signaling channel tests against a local WebSocket server
//!
//! Covers delayed delivery, reconnection and inbound dispatch.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use common::{find_available_port, wait_until, ServerMode, TestServer};
use ghostream_viewer::signaling::{
    ChannelConfig, SdpType, SessionDescription, SignalingChannel, SignalingEndpoint,
    SignalingMessage, StreamRequest,
};

fn fast_config() -> ChannelConfig {
    ChannelConfig {
        reconnect_delay: Duration::from_millis(50),
        send_retry_interval: Duration::from_millis(10),
    }
}

fn local_channel(port: u16) -> SignalingChannel {
    let endpoint = SignalingEndpoint::new(format!("127.0.0.1:{}", port), false);
    SignalingChannel::new(endpoint, fast_config())
}

/// Given no server is listening yet
/// When a description is sent
/// Then it is delivered exactly once after the server comes up
#[tokio::test]
async fn test_send_before_ready_is_delivered_once() {
    let port = find_available_port();
    let channel = local_channel(port);
    channel.open();

    let sender = channel.clone();
    let send = tokio::spawn(async move {
        sender
            .send_description(
                SessionDescription::offer("v=0 offer"),
                &StreamRequest::new("demo", "source"),
            )
            .await
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!channel.is_ready());
    assert!(!send.is_finished(), "send should wait for the channel");

    let mut server = TestServer::start(port, ServerMode::Answer).await;

    let result = tokio::time::timeout(Duration::from_secs(5), send)
        .await
        .expect("send should complete once the server is up")
        .expect("send task panicked");
    assert!(result.is_ok());

    let text = server
        .next_message(Duration::from_secs(2))
        .await
        .expect("server should receive the offer");
    let msg: SignalingMessage = serde_json::from_str(&text).unwrap();
    assert_eq!(msg.web_rtc_sdp, SessionDescription::offer("v=0 offer"));
    assert_eq!(msg.stream, "demo");
    assert_eq!(msg.quality, "source");

    // No duplicate delivery
    assert!(server
        .next_message(Duration::from_millis(300))
        .await
        .is_none());

    channel.close();
}

/// The reconnect loop keeps going while the server keeps closing
#[tokio::test]
async fn test_reconnects_after_every_close() {
    let port = find_available_port();
    let server = TestServer::start(port, ServerMode::CloseImmediately).await;

    let channel = local_channel(port);
    channel.open();

    assert!(
        wait_until(Duration::from_secs(5), || server.connections() >= 3).await,
        "channel should reconnect after each close, saw {} connections",
        server.connections()
    );

    channel.close();
}

/// A server outage is recovered once the server is reachable again
#[tokio::test]
async fn test_reopens_after_server_outage() {
    let port = find_available_port();
    let server = TestServer::start(port, ServerMode::CloseImmediately).await;

    let channel = local_channel(port);
    channel.open();
    assert!(wait_until(Duration::from_secs(5), || server.connections() >= 1).await);

    // Replace the closing server with a well-behaved one
    drop(server);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let server = TestServer::start(port, ServerMode::Answer).await;

    assert!(wait_until(Duration::from_secs(5), || channel.is_ready()).await);
    assert!(server.connections() >= 1);

    channel.close();
    assert!(!channel.is_ready());
}

/// Inbound answers reach the handler; malformed frames are skipped
#[tokio::test]
async fn test_inbound_answers_dispatched() {
    let port = find_available_port();
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        for frame in [
            "not json",
            r#"{"type":"answer"}"#,
            r#"{"type":"answer","sdp":"v=0..."}"#,
        ] {
            ws.send(Message::Text(frame.to_string())).await.unwrap();
        }
        // Keep the connection open until the client goes away
        while ws.next().await.is_some() {}
    });

    let received = Arc::new(Mutex::new(Vec::new()));
    let handler_received = received.clone();

    let channel = local_channel(port);
    channel.on_description(move |description| handler_received.lock().push(description));
    channel.open();

    assert!(wait_until(Duration::from_secs(5), || !received.lock().is_empty()).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    {
        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].sdp_type(), SdpType::Answer);
        assert_eq!(received[0].sdp(), "v=0...");
    }

    channel.close();
    server.abort();
}
