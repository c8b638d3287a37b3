pub mod decimal;
pub mod domain;

pub use decimal::{Decimal8, Micros};
pub use domain::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping every event published on the bus (C15) and mirrored
/// into the audit sink, keyed by tenant rather than by engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub tenant_id: TenantId,
    pub ts_utc: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub causation_id: Option<Uuid>,
    pub topic: String,
    pub event_type: String,
    pub payload: T,
}

/// One OHLCV candle, oldest-first when collected into a window. Prices use
/// `Micros`; volume is reported in base-asset `Decimal8` units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub ts_close_utc: DateTime<Utc>,
    pub open: Micros,
    pub high: Micros,
    pub low: Micros,
    pub close: Micros,
    pub volume: Decimal8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerOrder {
    pub broker_order_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub r#type: String,
    pub status: String,
    pub qty: Decimal8,
    pub limit_price: Option<Micros>,
    pub stop_price: Option<Micros>,
    pub created_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerFill {
    pub broker_fill_id: String,
    pub broker_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal8,
    pub price: Micros,
    pub fee: Micros,
    pub ts_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub qty: Decimal8,
    pub avg_price: Micros,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerAccount {
    pub equity: Micros,
    pub cash: Micros,
    pub currency: String,
}
