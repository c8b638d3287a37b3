use async_trait::async_trait;
use tcore_schemas::{AccountType, Candle, Decimal8, Micros, Side, TenantId};

use crate::error::ExchangeError;
use crate::types::{MarginAccountInfo, OrderHandle, TransferDirection};

/// Capability interface over the spot/isolated-margin exchange (C2). Two
/// concrete implementations exist — `tcore-broker-paper` (testnet-backed,
/// deterministic) and `tcore-broker-alpaca` (production, signed REST) —
/// selected per tenant configuration at the composition root. Every method
/// enforces its own timeout budget (default 5s) and fails with one of the
/// `ExchangeError` variants; it never panics on a remote failure.
#[async_trait]
pub trait ExchangePort: Send + Sync {
    async fn best_bid(&self, symbol: &str) -> Result<Micros, ExchangeError>;
    async fn best_ask(&self, symbol: &str) -> Result<Micros, ExchangeError>;

    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    async fn get_available_quote_balance(
        &self,
        tenant_id: TenantId,
        quote_asset: &str,
        account_type: AccountType,
        symbol: Option<&str>,
    ) -> Result<Micros, ExchangeError>;

    async fn place_market(
        &self,
        symbol: &str,
        side: Side,
        qty: Decimal8,
    ) -> Result<OrderHandle, ExchangeError>;

    async fn place_limit(
        &self,
        symbol: &str,
        side: Side,
        qty: Decimal8,
        price: Micros,
    ) -> Result<OrderHandle, ExchangeError>;

    async fn place_stop_loss(
        &self,
        symbol: &str,
        side: Side,
        qty: Decimal8,
        stop_price: Micros,
    ) -> Result<OrderHandle, ExchangeError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError>;

    async fn transfer(
        &self,
        direction: TransferDirection,
        asset: &str,
        amount: Micros,
        symbol: Option<&str>,
    ) -> Result<(), ExchangeError>;

    async fn margin_account(&self, symbol: &str) -> Result<MarginAccountInfo, ExchangeError>;

    async fn get_margin_level(&self, symbol: &str) -> Result<f64, ExchangeError>;
}
