//! tcore-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, builds the shared
//! state, wires middleware, and starts the HTTP server. All route handlers
//! live in `routes.rs`; all shared state types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tcore_audit::AuditWriter;
use tcore_broker_binance::{BinanceCredentials, BinanceExchange};
use tcore_broker_paper::PaperBroker;
use tcore_clock::SystemClock;
use tcore_daemon::{
    routes,
    state::{AppState, TradingConfig},
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience: silent if the file does not exist — production
    // injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config = TradingConfig::from_env();
    let pool = tcore_db::connect_from_env()
        .await
        .context("connect to Postgres")?;
    tcore_db::migrate(&pool).await.context("run migrations")?;

    let clock = Arc::new(SystemClock);
    let exchange: Arc<dyn tcore_exchange::ExchangePort> = if config.use_testnet {
        Arc::new(PaperBroker::new(clock.clone()))
    } else {
        let credentials = BinanceCredentials {
            api_key: std::env::var("BINANCE_API_KEY").unwrap_or_default(),
            api_secret: std::env::var("BINANCE_API_SECRET").unwrap_or_default(),
        };
        Arc::new(BinanceExchange::new(credentials, config.use_testnet))
    };

    let audit_path = std::env::var("TCORE_AUDIT_LOG_PATH").unwrap_or_else(|_| "./audit.jsonl".to_string());
    let audit = AuditWriter::new(&audit_path, true).context("open audit log")?;

    let shared = Arc::new(AppState::new(pool, clock, exchange, audit, config));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!("tcore-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("TCORE_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
