//! In-process WebSocket server for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use realtime_socket::{Connection, ConnectionConfig, ConnectionStatus, Envelope, MessageType};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing_subscriber::EnvFilter;

/// Server side of one accepted socket.
pub type ServerSocket = WebSocketStream<TcpStream>;

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(5);

/// Initializes logging once; honours `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Accepts exactly one socket, then stops listening.
///
/// Later connection attempts to the returned URL are refused.
pub async fn serve_once<F, Fut>(handler: F) -> String
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    init_logging();

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}", listener.local_addr().expect("local addr"));

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        drop(listener);
        let socket = accept_async(stream).await.expect("handshake");
        handler(socket).await;
    });

    url
}

/// Config with short timers for tests.
pub fn test_config(url: &str) -> ConnectionConfig {
    ConnectionConfig::new(url)
        .with_connect_timeout(Duration::from_secs(2))
        .with_reconnect_base_delay(Duration::from_millis(10))
        .with_request_timeout(Duration::from_secs(2))
}

/// Reads the next envelope, skipping control frames.
///
/// Returns `None` once the peer closes.
pub async fn next_envelope(socket: &mut ServerSocket) -> Option<Envelope> {
    while let Some(message) = socket.next().await {
        match message.ok()? {
            Message::Text(text) => {
                return Some(Envelope::from_text(text.as_str()).expect("valid envelope"));
            }
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

/// Writes an envelope as a text frame.
pub async fn send_envelope(socket: &mut ServerSocket, envelope: &Envelope) {
    let text = envelope.to_text().expect("encode");
    socket.send(Message::Text(text.into())).await.expect("send");
}

/// Answers every `request` with a `response` carrying the same payload.
pub async fn echo_requests(mut socket: ServerSocket) {
    while let Some(envelope) = next_envelope(&mut socket).await {
        if envelope.message_type == MessageType::Request {
            let reply = Envelope::response(envelope.id, envelope.payload);
            send_envelope(&mut socket, &reply).await;
        }
    }
}

/// Waits until the connection reaches `status`.
pub async fn wait_for_status(connection: &Connection, status: ConnectionStatus) {
    let mut rx = connection.subscribe_status();
    tokio::time::timeout(WAIT, rx.wait_for(|current| *current == status))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {status}"))
        .expect("status channel open");
}
