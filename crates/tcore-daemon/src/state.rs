//! Shared runtime state for tcore-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Everything here is
//! either immutable after boot or its own interior-mutable primitive
//! (pool, mutex) so the state itself needs no locking.

use std::sync::Arc;

use sqlx::PgPool;
use tcore_audit::{AuditWriter, EventBus};
use tcore_clock::Clock;
use tcore_exchange::ExchangePort;
use tokio::sync::Mutex;

/// Boot-time feature gate read from the environment (spec §6). Defaults are
/// fail-closed: trading is off and, if it's ever turned on, it talks to
/// Binance's testnet rather than production.
#[derive(Clone, Debug)]
pub struct TradingConfig {
    pub trading_enabled: bool,
    pub use_testnet: bool,
}

impl TradingConfig {
    pub fn from_env() -> Self {
        TradingConfig {
            trading_enabled: env_flag("TRADING_ENABLED", false),
            use_testnet: env_flag("BINANCE_USE_TESTNET", true),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

/// Cloneable (Arc) handle shared across all Axum handlers.
pub struct AppState {
    pub pool: PgPool,
    pub clock: Arc<dyn Clock>,
    pub exchange: Arc<dyn ExchangePort>,
    pub bus: EventBus,
    pub audit: Mutex<AuditWriter>,
    pub config: TradingConfig,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        clock: Arc<dyn Clock>,
        exchange: Arc<dyn ExchangePort>,
        audit: AuditWriter,
        config: TradingConfig,
    ) -> Self {
        AppState {
            pool,
            clock,
            exchange,
            bus: EventBus::new(),
            audit: Mutex::new(audit),
            config,
        }
    }
}
