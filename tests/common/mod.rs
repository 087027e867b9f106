//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use burrow::{BrokerConfig, BrokerServer, EngineTuning, Shutdown, ShutdownReason};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TestBroker {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl TestBroker {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Wind the broker down as an operator would.
    pub fn stop(&self) {
        self.shutdown.trigger(ShutdownReason::Signal);
    }
}

/// Start a broker on an ephemeral port with default engine deadlines.
#[allow(dead_code)]
pub async fn start_broker(config: BrokerConfig) -> TestBroker {
    start_broker_with_tuning(config, EngineTuning::default()).await
}

/// Start a broker with explicit deadlines (for timeout scenarios).
pub async fn start_broker_with_tuning(config: BrokerConfig, tuning: EngineTuning) -> TestBroker {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = BrokerServer::with_tuning(config, tuning);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    // Give the serve loop a moment to start accepting.
    tokio::time::sleep(Duration::from_millis(100)).await;

    TestBroker { addr, shutdown }
}

/// Open a control channel to the broker.
pub async fn connect_handler(addr: SocketAddr) -> WsClient {
    let (socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    socket
}

pub async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Next JSON text frame, skipping pings.
pub async fn recv_json(ws: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket ended unexpectedly")
            .expect("socket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

/// Wait for the close frame, returning (code, reason).
#[allow(dead_code)]
pub async fn recv_close(ws: &mut WsClient) -> (u16, String) {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for close");
        match msg {
            Some(Ok(Message::Close(Some(frame)))) => {
                return (frame.code.into(), frame.reason.to_string())
            }
            Some(Ok(Message::Close(None))) | None => return (1000, String::new()),
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("socket error while waiting for close: {e}"),
        }
    }
}

/// Register a slug and consume the acknowledgement.
pub async fn register(ws: &mut WsClient, slug: &str) {
    send_json(ws, serde_json::json!({ "slug": slug })).await;
    let ack = recv_json(ws).await;
    assert_eq!(ack["type"], "registered", "unexpected ack: {ack}");
    assert_eq!(ack["slug"], slug);
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
