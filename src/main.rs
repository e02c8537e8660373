#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # opchat
//!
//! Headless operator chat client. Connects to the chat server over one
//! persistent WebSocket, keeps the session alive across drops with
//! exponential backoff, and logs every event it receives. The interesting
//! parts live in the library; this binary only wires the production
//! collaborators and waits for a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use opchat::hooks::{LogEventHandler, LogNotifier, LogRenderer};
use opchat::{
    build_ws_url, AgentIdentity, Config, ConnectionManager, ConnectionState, MediaUploader,
    WsTransportFactory,
};

/// Operator live-chat client.
#[derive(Parser)]
#[command(name = "opchat", version)]
struct Cli {
    /// Path to TOML config file.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());

    // Initialize tracing
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("opchat v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Agent: {} ({})", config.agent.id, config.agent.display_name);
    info!("Server: {}", config.server.url);

    let identity = AgentIdentity {
        agent_id: config.agent.id.clone(),
        display_name: config.agent.display_name.clone(),
    };
    let url = build_ws_url(&config.server.url, &identity)
        .unwrap_or_else(|e| panic!("Invalid server URL: {e}"));
    let uploader = MediaUploader::new(config.server.url.clone());

    let (manager, client, _lifecycle) = ConnectionManager::new(
        WsTransportFactory,
        url,
        config.policy(),
        Arc::new(LogEventHandler),
        Arc::new(LogRenderer),
        Arc::new(LogNotifier),
        uploader,
    );
    let connection = tokio::spawn(manager.run());

    // Graceful shutdown
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received SIGINT");
    }

    info!("Shutting down...");
    client.disconnect();
    let mut state = client.state_changes();
    let closed = state.wait_for(|s| *s == ConnectionState::Disconnected);
    tokio::time::timeout(Duration::from_secs(5), closed).await.ok();
    connection.abort();
    info!("Goodbye");
}
