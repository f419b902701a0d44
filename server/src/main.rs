//! Solarwatch Server - threshold alerting over inverter and weather telemetry

mod alert_log;
mod broadcast;
mod config;
mod engine;
mod error;
mod handlers;
mod ingest;
mod persist;
mod rules;
mod service;
mod session;

use alert_log::AlertLog;
use anyhow::{Context, Result};
use broadcast::Broadcaster;
use clap::Parser;
use engine::StreamJoiner;
use handlers::AdminContext;
use protocol::{AdminRequest, AdminResponse, Channel, MAX_DATAGRAM_SIZE, Source};
use rules::RuleStore;
use service::AlertService;
use session::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version)]
#[command(about = "Solarwatch server - threshold alerts for solar telemetry", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "server.conf")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = config::Config::load(&args.config).context("Failed to load configuration")?;

    init_logging(&config.logging);

    info!("Starting Solarwatch server v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", args.config);

    // Without rules there is nothing to evaluate
    let rules = RuleStore::open(&config.rules.path).context("Failed to load rule store")?;
    let log = AlertLog::open(&config.alerts).context("Failed to open alert log")?;
    let broadcaster = Arc::new(Broadcaster::new(config.broadcast.capacity));

    let service = Arc::new(AlertService::new(
        rules,
        StreamJoiner::new(config.streams.reject_stale),
        log,
        broadcaster.clone(),
    ));

    let cancel = CancellationToken::new();

    // Stream consumers
    let mut consumers = Vec::new();
    for (source, port) in [
        (Source::Inverter, config.general.inverter_port),
        (Source::Weather, config.general.weather_port),
    ] {
        let bind_addr = format!("{}:{}", config.general.bind_address, port);
        let socket = UdpSocket::bind(&bind_addr)
            .await
            .with_context(|| format!("Failed to bind {} stream to {}", source, bind_addr))?;
        consumers.push(tokio::spawn(ingest::run_stream(
            source,
            socket,
            service.clone(),
            cancel.clone(),
        )));
    }

    // Admin endpoint
    let admin_addr = format!("{}:{}", config.general.admin_bind_address, config.general.admin_port);
    let admin_socket = Arc::new(
        UdpSocket::bind(&admin_addr)
            .await
            .with_context(|| format!("Failed to bind admin endpoint to {}", admin_addr))?,
    );
    info!("Admin endpoint listening on {}", admin_addr);
    info!("Subscriber timeout: {} seconds", config.broadcast.subscriber_timeout_sec);

    let sessions = Arc::new(SessionManager::new(
        broadcaster.clone(),
        admin_socket.clone(),
        config.broadcast.subscriber_timeout_sec,
    ));

    // Spawn cleanup task
    let cleanup_sessions = sessions.clone();
    let cleanup_cancel = cancel.clone();
    let cleanup_broadcaster = broadcaster.clone();
    let cleanup_every = (config.broadcast.subscriber_timeout_sec / 2).max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(cleanup_every));
        loop {
            tokio::select! {
                _ = cleanup_cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            let expired = cleanup_sessions.cleanup_expired().await;
            let active = cleanup_sessions.active_sessions().await;
            if expired > 0 || active > 0 {
                debug!("Subscriber sessions: {} active, {} expired", active, expired);
                for channel in Channel::ALL {
                    debug!(channel = %channel, subscribers = cleanup_broadcaster.subscriber_count(channel), "Channel subscribers");
                }
            }
        }
    });

    let ctx = AdminContext {
        service: service.clone(),
        sessions: sessions.clone(),
    };

    tokio::select! {
        _ = admin_loop(admin_socket, ctx) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
        }
    }

    cancel.cancel();
    for consumer in consumers {
        if let Err(e) = consumer.await {
            warn!("Stream consumer ended abnormally: {}", e);
        }
    }
    sessions.shutdown().await;
    service.shutdown().await;

    info!("Solarwatch server stopped");
    Ok(())
}

fn init_logging(logging: &config::LoggingConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Main admin loop; one task per datagram
async fn admin_loop(socket: Arc<UdpSocket>, ctx: AdminContext) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, peer)) => {
                let data = buf[..len].to_vec();
                let socket = socket.clone();
                let ctx = ctx.clone();

                tokio::spawn(async move {
                    if let Some(response) = handle_datagram(&data, peer, &ctx).await {
                        if let Err(e) = socket.send_to(&response, peer).await {
                            error!("Failed to send response to {}: {}", peer, e);
                        }
                    }
                });
            }
            Err(e) => {
                error!("Error receiving admin request: {}", e);
            }
        }
    }
}

/// Decode, dispatch and encode one admin datagram
async fn handle_datagram(data: &[u8], peer: SocketAddr, ctx: &AdminContext) -> Option<Vec<u8>> {
    let request = match AdminRequest::from_bytes(data) {
        Ok(request) => request,
        Err(e) => {
            debug!("Invalid admin request from {}: {}", peer, e);
            return None; // Silent drop
        }
    };

    let response = handlers::dispatch(request, peer, ctx).await;
    match response.to_bytes() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("Response to {} not sendable: {}", peer, e);
            AdminResponse::error(e.to_string()).to_bytes().ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn context(dir: &TempDir) -> AdminContext {
        let service = Arc::new(service::tests::service(dir, 50));
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let sessions = Arc::new(SessionManager::new(service.broadcaster(), socket, 60));
        AdminContext { service, sessions }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_undecodable_request_is_dropped() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;

        assert!(handle_datagram(b"{\"op\":\"reboot\"}", peer(), &ctx).await.is_none());
        assert!(handle_datagram(b"\xff\xfe", peer(), &ctx).await.is_none());
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;

        let request = AdminRequest::GetRules.to_bytes().unwrap();
        let response = handle_datagram(&request, peer(), &ctx).await.unwrap();

        match AdminResponse::from_bytes(&response).unwrap() {
            AdminResponse::Rules { rules } => {
                assert_eq!(rules.len(), 2);
                assert_eq!(rules[0].title, "Temp");
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscribe_reports_timeout() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;

        let request = AdminRequest::Subscribe { channel: Channel::Alerts }.to_bytes().unwrap();
        let response = handle_datagram(&request, peer(), &ctx).await.unwrap();

        assert_eq!(
            AdminResponse::from_bytes(&response).unwrap(),
            AdminResponse::Subscribed {
                channel: Channel::Alerts,
                timeout_secs: 60
            }
        );
        assert_eq!(ctx.sessions.active_sessions().await, 1);
        ctx.sessions.shutdown().await;
    }
}
