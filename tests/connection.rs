//! End-to-end connection behaviour against an in-process server.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use futures_util::future::join_all;
use parking_lot::Mutex;
use realtime_socket::{Connection, ConnectionStatus, Envelope, Error, MessageType};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use common::{
    WAIT, echo_requests, next_envelope, send_envelope, serve_once, test_config, wait_for_status,
};

#[tokio::test]
async fn test_request_resolves_with_reply_payload() -> anyhow::Result<()> {
    let url = serve_once(echo_requests).await;
    let connection = Connection::new(test_config(&url))?;

    connection.connect().await?;
    assert_eq!(connection.status(), ConnectionStatus::Connected);

    let reply = connection
        .request(Envelope::request(json!({ "value": 42 })))
        .await?;

    assert_eq!(reply, json!({ "value": 42 }));
    assert_eq!(connection.pending_count(), 0);

    connection.disconnect();
    Ok(())
}

#[tokio::test]
async fn test_concurrent_requests_settle_independently() -> anyhow::Result<()> {
    let url = serve_once(echo_requests).await;
    let connection = Connection::new(test_config(&url))?;
    connection.connect().await?;

    let replies = join_all(
        (0..5).map(|n| connection.request(Envelope::request(json!({ "n": n })))),
    )
    .await;

    for (n, reply) in replies.into_iter().enumerate() {
        assert_eq!(reply?, json!({ "n": n }));
    }
    assert_eq!(connection.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_error_reply_rejects_request() -> anyhow::Result<()> {
    let url = serve_once(|mut socket| async move {
        while let Some(envelope) = next_envelope(&mut socket).await {
            let reply = Envelope::error(envelope.id, json!({ "reason": "denied" }));
            send_envelope(&mut socket, &reply).await;
        }
    })
    .await;
    let connection = Connection::new(test_config(&url))?;
    connection.connect().await?;

    let request = Envelope::request(json!({}));
    let request_id = request.id.clone();
    let err = connection.request(request).await.unwrap_err();

    match err {
        Error::Remote {
            request_id: id,
            payload,
        } => {
            assert_eq!(id, request_id);
            assert_eq!(payload, json!({ "reason": "denied" }));
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_normal_close_ends_disconnected() -> anyhow::Result<()> {
    let url = serve_once(|mut socket| async move {
        // Swallow one request, then close normally.
        let _ = next_envelope(&mut socket).await;
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        };
        let _ = socket.close(Some(frame)).await;
    })
    .await;
    let connection = Connection::new(test_config(&url))?;
    connection.connect().await?;

    let err = connection
        .request(Envelope::request(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));

    wait_for_status(&connection, ConnectionStatus::Disconnected).await;
    assert_eq!(connection.pending_count(), 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connection.status(), ConnectionStatus::Disconnected);
    assert_eq!(connection.reconnect_attempts(), 0);
    Ok(())
}

#[tokio::test]
async fn test_abnormal_close_reconnects_until_failed() -> anyhow::Result<()> {
    let url = serve_once(|mut socket| async move {
        let frame = CloseFrame {
            code: CloseCode::Error,
            reason: "boom".into(),
        };
        let _ = socket.close(Some(frame)).await;
        while socket.next().await.is_some() {}
    })
    .await;
    let connection = Connection::new(test_config(&url).with_max_reconnect_attempts(3))?;

    let history = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&history);
    let _subscription = connection.on_status_change(move |status| sink.lock().push(status));

    connection.connect().await?;
    let started = Instant::now();

    wait_for_status(&connection, ConnectionStatus::Failed).await;

    // Delays of 10, 20 and 40 ms precede the three attempts.
    assert!(started.elapsed() >= Duration::from_millis(70));
    assert_eq!(connection.reconnect_attempts(), 3);

    let reconnecting = history
        .lock()
        .iter()
        .filter(|status| **status == ConnectionStatus::Reconnecting)
        .count();
    assert_eq!(reconnecting, 3);
    assert_eq!(history.lock().last(), Some(&ConnectionStatus::Failed));

    // No further automatic attempts.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connection.status(), ConnectionStatus::Failed);

    // An explicit connect leaves Failed; the server is gone so it fails fast.
    assert!(connection.connect().await.is_err());
    assert_eq!(connection.status(), ConnectionStatus::Disconnected);
    Ok(())
}

#[tokio::test]
async fn test_queue_flushes_after_auth_in_order() -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let url = serve_once(move |mut socket| async move {
        while let Some(envelope) = next_envelope(&mut socket).await {
            let _ = tx.send(envelope);
        }
    })
    .await;
    let connection = Connection::new(test_config(&url).with_auth_token("secret"))?;

    for n in 0..3 {
        connection.send(Envelope::message(json!(n)));
    }
    assert_eq!(connection.queued_count(), 3);

    connection.connect().await?;
    assert_eq!(connection.queued_count(), 0);

    let mut received = Vec::new();
    for _ in 0..4 {
        received.push(timeout(WAIT, rx.recv()).await?.expect("frame"));
    }

    assert_eq!(received[0].message_type, MessageType::Auth);
    assert_eq!(received[0].payload, json!({ "token": "secret" }));
    let payloads: Vec<_> = received[1..].iter().map(|e| e.payload.clone()).collect();
    assert_eq!(payloads, vec![json!(0), json!(1), json!(2)]);
    Ok(())
}

#[tokio::test]
async fn test_send_while_connected_goes_out_immediately() -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let url = serve_once(move |mut socket| async move {
        while let Some(envelope) = next_envelope(&mut socket).await {
            let _ = tx.send(envelope);
        }
    })
    .await;
    let connection = Connection::new(test_config(&url))?;
    connection.connect().await?;

    let envelope = Envelope::new("chat.typing", json!({ "user": "ada" }));
    connection.send(envelope.clone());

    assert_eq!(connection.queued_count(), 0);
    let received = timeout(WAIT, rx.recv()).await?.expect("frame");
    assert_eq!(received, envelope);
    assert_eq!(
        received.message_type,
        MessageType::Custom("chat.typing".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_server_ping_answered_and_not_forwarded() -> anyhow::Result<()> {
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel();
    let url = serve_once(move |mut socket| async move {
        send_envelope(&mut socket, &Envelope::ping()).await;
        if let Some(reply) = next_envelope(&mut socket).await {
            let _ = pong_tx.send(reply);
        }
        send_envelope(&mut socket, &Envelope::message(json!("after"))).await;
        while next_envelope(&mut socket).await.is_some() {}
    })
    .await;
    let connection = Connection::new(test_config(&url))?;

    let (message_tx, mut message_rx) = mpsc::unbounded_channel();
    let _subscription = connection.on_message(move |envelope| {
        let _ = message_tx.send(envelope.clone());
    });

    connection.connect().await?;

    let pong = timeout(WAIT, pong_rx.recv()).await?.expect("pong");
    assert_eq!(pong.message_type, MessageType::Pong);

    let forwarded = timeout(WAIT, message_rx.recv()).await?.expect("message");
    assert_eq!(forwarded.message_type, MessageType::Message);
    assert_eq!(forwarded.payload, json!("after"));
    assert!(message_rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() -> anyhow::Result<()> {
    let url = serve_once(|mut socket| async move {
        let _ = socket.send(Message::Text("not json".into())).await;
        let _ = socket.send(Message::Binary(vec![0xff, 0x00].into())).await;
        send_envelope(&mut socket, &Envelope::message(json!("valid"))).await;
        while next_envelope(&mut socket).await.is_some() {}
    })
    .await;
    let connection = Connection::new(test_config(&url))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = connection.on_message(move |envelope| {
        let _ = tx.send(envelope.payload.clone());
    });

    connection.connect().await?;

    let payload = timeout(WAIT, rx.recv()).await?.expect("message");
    assert_eq!(payload, json!("valid"));
    assert!(rx.try_recv().is_err());
    assert_eq!(connection.status(), ConnectionStatus::Connected);
    Ok(())
}

#[tokio::test]
async fn test_heartbeat_pings_while_connected() -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let url = serve_once(move |mut socket| async move {
        while let Some(envelope) = next_envelope(&mut socket).await {
            let _ = tx.send(envelope);
        }
    })
    .await;
    let connection =
        Connection::new(test_config(&url).with_heartbeat_interval(Duration::from_millis(30)))?;
    connection.connect().await?;

    for _ in 0..2 {
        let ping = timeout(WAIT, rx.recv()).await?.expect("ping");
        assert_eq!(ping.message_type, MessageType::Ping);
    }
    Ok(())
}

#[tokio::test]
async fn test_disconnect_sends_normal_close() -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let url = serve_once(move |mut socket| async move {
        while let Some(Ok(message)) = socket.next().await {
            if let Message::Close(frame) = message {
                let _ = tx.send(frame.map(|frame| frame.code));
                break;
            }
        }
    })
    .await;
    let connection = Connection::new(test_config(&url))?;
    connection.connect().await?;

    connection.disconnect();
    assert_eq!(connection.status(), ConnectionStatus::Disconnected);

    let code = timeout(WAIT, rx.recv()).await?.expect("close frame");
    assert_eq!(code, Some(CloseCode::Normal));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connection.status(), ConnectionStatus::Disconnected);
    Ok(())
}

#[tokio::test]
async fn test_connect_is_idempotent_while_connected() -> anyhow::Result<()> {
    let url = serve_once(echo_requests).await;
    let connection = Connection::new(test_config(&url))?;

    let history = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&history);
    let _subscription = connection.on_status_change(move |status| sink.lock().push(status));

    connection.connect().await?;
    connection.connect().await?;

    assert_eq!(
        *history.lock(),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_handler_runs_after_disconnect_returns() -> anyhow::Result<()> {
    for _ in 0..5 {
        let url = serve_once(|mut socket| async move {
            for n in 0..5000 {
                let text = Envelope::message(json!(n)).to_text().expect("encode");
                if socket.send(Message::Text(text.into())).await.is_err() {
                    return;
                }
            }
            while socket.next().await.is_some() {}
        })
        .await;
        let connection = Connection::new(test_config(&url))?;

        let disconnected = Arc::new(AtomicBool::new(false));
        let late = Arc::new(AtomicUsize::new(0));
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let _subscription = {
            let disconnected = Arc::clone(&disconnected);
            let late = Arc::clone(&late);
            connection.on_message(move |_| {
                if disconnected.load(Ordering::SeqCst) {
                    late.fetch_add(1, Ordering::SeqCst);
                }
                let _ = first_tx.send(());
            })
        };

        connection.connect().await?;
        timeout(WAIT, first_rx.recv()).await?.expect("first message");

        connection.disconnect();
        disconnected.store(true, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(late.load(Ordering::SeqCst), 0, "handler ran after disconnect()");
    }
    Ok(())
}
