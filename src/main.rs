//! Gateway Config Broker - Main Application Entry Point
//!
//! This is the REST API of a network gateway device. It owns the gateway's
//! runtime configuration, decides who may change it (API key whitelist, link
//! button, admin password) and drives firmware and software updates.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **State**: one `Gateway` behind a mutex, shared by handlers and the timer loop
//! - **Storage**: JSON files under `DATA_DIR`, written debounced
//! - **Format**: JSON requests, JSON array responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Open the state store and attach the radio, supervisor and clock
//! 3. Restore the gateway and arm its periodic work
//! 4. Spawn the timer loop
//! 5. Start server on configured port

mod config;
mod db;
mod error;
mod handlers;
mod host;
mod middleware;
mod models;
mod services;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

use host::{
    inventory::EmptyInventory,
    radio::{RadioStatus, SimulatedRadio},
    supervisor::ProcessSupervisor,
};
use services::{
    gateway::{Gateway, GatewayOptions, Host, SharedGateway},
    scheduler::MonotonicClock,
};

/// Resolution of the gateway timers.
const TICK_INTERVAL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!(platform = ?config.platform(), "Configuration loaded");

    let store = db::JsonFileStore::open(&config.data_dir)?;
    tracing::info!(data_dir = %config.data_dir.display(), "State store opened");

    let radio = SimulatedRadio::new(RadioStatus {
        firmware_version: config.radio_firmware_word(),
        in_network: config.radio_in_network,
        ..RadioStatus::default()
    });
    tracing::info!(status = ?radio.status(), "Simulated radio attached");

    let host = Host {
        radio: Box::new(radio),
        supervisor: Box::new(ProcessSupervisor),
        store: Box::new(store),
        inventory: Box::new(EmptyInventory),
        clock: Arc::new(MonotonicClock::start()),
    };

    let mut gateway = Gateway::load(GatewayOptions::from(&config), host)?;
    gateway.start();
    let gateway: SharedGateway = Arc::new(Mutex::new(gateway));

    let timers = tokio::spawn(run_timers(gateway.clone()));

    let app = handlers::router(gateway.clone());

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Pending debounced saves would be lost otherwise
    timers.abort();
    gateway.lock().save_now();
    tracing::info!("Server stopped");

    Ok(())
}

/// Drives the gateway timers until the task is aborted.
async fn run_timers(gateway: SharedGateway) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        gateway.lock().tick();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
