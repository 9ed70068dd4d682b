//! Connects to a WebSocket echo-style server and exercises the client.
//!
//! Demonstrates:
//! - Building a configuration and validating it
//! - Watching status transitions
//! - Queueing while offline and flushing on connect
//! - Request/reply correlation
//!
//! Usage:
//!   cargo run --example echo_client -- ws://127.0.0.1:9000
//!   cargo run --example echo_client -- ws://127.0.0.1:9000 --debug

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use realtime_socket::{Connection, ConnectionConfig, ConnectionRegistry, Envelope, Result};
use serde_json::json;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_URL: &str = "ws://127.0.0.1:9000";

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let debug = args.iter().any(|a| a == "--debug");
    let url = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| DEFAULT_URL.to_string());

    init_logging(debug);

    if let Err(e) = run(&url).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug {
        "realtime_socket=trace"
    } else {
        "realtime_socket=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

async fn run(url: &str) -> Result<()> {
    println!("=== Echo Client ===\n");

    // ========================================================================
    // Register Connection
    // ========================================================================

    println!("[1] Registering connection to {url}...");

    let registry = ConnectionRegistry::new();
    let config = ConnectionConfig::new(url)
        .with_heartbeat_interval(Duration::from_secs(5))
        .with_request_timeout(Duration::from_secs(3));
    let connection: Connection = registry.create_connection("echo", config)?;

    let _status = connection.on_status_change(|status| println!("    [status] {status}"));
    let _messages = connection.on_message(|envelope| {
        println!("    [message] {} {}", envelope.message_type, envelope.payload);
    });

    println!("    ✓ Registered\n");

    // ========================================================================
    // Queue While Offline
    // ========================================================================

    println!("[2] Queueing while offline...");

    connection.send(Envelope::message(json!({ "hello": "world" })));
    println!("    ✓ {} envelope(s) queued\n", connection.queued_count());

    // ========================================================================
    // Connect
    // ========================================================================

    println!("[3] Connecting...");

    connection.connect().await?;
    println!("    ✓ Connected, queue flushed ({} left)\n", connection.queued_count());

    // ========================================================================
    // Request
    // ========================================================================

    println!("[4] Sending request...");

    match connection
        .request(Envelope::request(json!({ "value": 42 })))
        .await
    {
        Ok(reply) => println!("    ✓ Reply: {reply}\n"),
        Err(e) if e.is_timeout() => println!("    ✗ No reply (server does not answer requests)\n"),
        Err(e) => return Err(e),
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    println!("[5] Status snapshot:");
    for (name, status) in registry.status_snapshot() {
        println!("    {name}: {status}");
    }

    registry.disconnect_all();
    println!("\n=== Done ===");

    Ok(())
}
