mod broker;
mod config;
mod errors;
mod jobs;
mod routes;
mod shutdown;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::broker::{BrokerHub, RedisTransport};
use crate::config::Config;
use crate::routes::build_router;
use crate::shutdown::install_shutdown_handler;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting HireWire API v{}", env!("CARGO_PKG_VERSION"));

    // One transport, one client per job family, for the life of the process
    let transport = RedisTransport::new(&config.redis_url, config.redis_token.as_deref())?;
    let broker = Arc::new(BrokerHub::start(
        Arc::new(transport),
        config.broker_settings(),
    ));

    // Workers may come up later; the supervisors keep retrying with backoff
    if broker.wait_until_connected(Duration::from_secs(5)).await {
        info!("Broker subscriptions established for all job families");
    } else {
        warn!("Broker not fully connected yet; AI endpoints fail fast until it is");
    }

    let state = AppState {
        broker: broker.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client's domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let shutdown = install_shutdown_handler();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    // Close subscriptions and fail anything still waiting on a worker
    broker.shutdown().await;

    Ok(())
}
