use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tcore_schemas::{AccountType, Decimal8, Micros, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferDirection {
    SpotToMargin,
    MarginToSpot,
}

/// A placed order handle returned by the exchange port. Only the fields
/// downstream components (audit, execution) actually consume are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderHandle {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal8,
    pub price: Option<Micros>,
    pub stop_price: Option<Micros>,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginAccountInfo {
    pub symbol: String,
    pub borrowed: Micros,
    pub collateral: Micros,
    pub margin_level: f64,
}

pub use tcore_schemas::{AccountType, Candle};
