//! Margin Sub-Core (C14).
//!
//! Isolated-margin is spot sizing/execution with three differences (spec
//! §4.14): leverage multiplies the raw risk-based quantity before the
//! 50%-of-own-capital cap is applied; opening/closing a position bookends
//! the order with a quote transfer; and margin level is watched by an
//! independent periodic task rather than computed from local state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tcore_clock::Clock;
use tcore_exchange::{ExchangeError, ExchangePort, MarginAccountInfo, TransferDirection};
use tcore_schemas::{AccountType, Decimal8, Micros, Side, TenantId};

/// Margin level below which an alert fires but the position is left open.
/// Binance isolated-margin convention: level = total_asset / total_debt.
pub const DEFAULT_WARNING_MARGIN_LEVEL: f64 = 1.5;
/// Margin level below which the position is defensively closed rather than
/// left to ride toward exchange-side liquidation.
pub const DEFAULT_LIQUIDATION_MARGIN_LEVEL: f64 = 1.1;

const MAX_CAPITAL_FRACTION: f64 = 0.50;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginSizingResult {
    pub quantity: Decimal8,
    pub position_value: Micros,
    pub risk_amount: Micros,
    pub risk_percent: f64,
    pub stop_distance_pct: f64,
    pub is_capped: bool,
}

impl MarginSizingResult {
    pub fn is_fail(&self) -> bool {
        self.quantity.is_zero()
    }
}

/// Spec §4.14: "identical formula at 1x leverage, then `quantity *=
/// leverage` before the 50%-of-capital cap (the cap applies to the
/// trader's own capital, not the borrowed notional)".
pub fn size_margin(
    capital: Micros,
    entry: Micros,
    stop: Micros,
    max_risk_pct: f64,
    leverage: f64,
) -> MarginSizingResult {
    let stop_distance_raw = (entry.to_f64() - stop.to_f64()).abs();
    if stop_distance_raw == 0.0 || leverage < 1.0 {
        return MarginSizingResult {
            quantity: Decimal8::ZERO,
            position_value: Micros::ZERO,
            risk_amount: Micros::ZERO,
            risk_percent: 0.0,
            stop_distance_pct: 0.0,
            is_capped: false,
        };
    }

    let base_qty = tcore_sizing::raw_quantity(capital, entry, stop, max_risk_pct).to_f64();
    let leveraged_qty = base_qty * leverage;

    let cap_notional = capital.to_f64() * MAX_CAPITAL_FRACTION;
    let notional = leveraged_qty * entry.to_f64();
    let (quantity, is_capped) = if notional > cap_notional && entry.to_f64() > 0.0 {
        (Decimal8::from_f64(cap_notional / entry.to_f64()), true)
    } else {
        (Decimal8::from_f64(leveraged_qty), false)
    };

    let position_value = Micros::from_f64(quantity.to_f64() * entry.to_f64());
    let actual_risk_amount = Micros::from_f64(quantity.to_f64() * stop_distance_raw / leverage.max(1.0));
    let risk_percent = if capital.to_f64() != 0.0 {
        actual_risk_amount.to_f64() / capital.to_f64() * 100.0
    } else {
        0.0
    };
    let stop_distance_pct = if entry.to_f64() != 0.0 {
        stop_distance_raw / entry.to_f64() * 100.0
    } else {
        0.0
    };

    MarginSizingResult {
        quantity,
        position_value,
        risk_amount: actual_risk_amount,
        risk_percent,
        stop_distance_pct,
        is_capped,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginOpenStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginOpenResult {
    pub status: MarginOpenStatus,
    pub entry_order_id: Option<String>,
    pub stop_order_id: Option<String>,
    pub stop_loss_failed: bool,
    pub error: Option<String>,
    pub metadata: serde_json::Value,
    pub executed_at: DateTime<Utc>,
}

/// Opens an isolated-margin position: transfer quote -> margin account,
/// place the market order with the borrowed quote, place the protective
/// stop. Each step's failure is handled per spec §4.11/§4.14: a transfer
/// or entry-order failure aborts with FAILED; a stop-loss failure after a
/// successful entry is recorded as a hard alert, not a rollback — the
/// position exists and needs a human to set the stop manually.
pub async fn open_margin_position(
    exchange: &dyn ExchangePort,
    clock: &dyn Clock,
    tenant_id: TenantId,
    symbol: &str,
    side: Side,
    quote_asset: &str,
    transfer_amount: Micros,
    qty: Decimal8,
    stop_price: Micros,
) -> MarginOpenResult {
    if let Err(e) = exchange
        .transfer(TransferDirection::SpotToMargin, quote_asset, transfer_amount, Some(symbol))
        .await
    {
        return MarginOpenResult {
            status: MarginOpenStatus::Failed,
            entry_order_id: None,
            stop_order_id: None,
            stop_loss_failed: false,
            error: Some(e.to_string()),
            metadata: json!({ "step": "transfer", "tenant_id": tenant_id }),
            executed_at: clock.now_millis(),
        };
    }

    let entry_order = match exchange.place_market(symbol, side, qty).await {
        Ok(order) => order,
        Err(e) => {
            return MarginOpenResult {
                status: MarginOpenStatus::Failed,
                entry_order_id: None,
                stop_order_id: None,
                stop_loss_failed: false,
                error: Some(e.to_string()),
                metadata: json!({ "step": "entry_order", "tenant_id": tenant_id }),
                executed_at: clock.now_millis(),
            };
        }
    };

    match exchange.place_stop_loss(symbol, side.opposite(), qty, stop_price).await {
        Ok(stop_order) => MarginOpenResult {
            status: MarginOpenStatus::Success,
            entry_order_id: Some(entry_order.order_id),
            stop_order_id: Some(stop_order.order_id),
            stop_loss_failed: false,
            error: None,
            metadata: json!({}),
            executed_at: clock.now_millis(),
        },
        Err(e) => MarginOpenResult {
            status: MarginOpenStatus::Success,
            entry_order_id: Some(entry_order.order_id),
            stop_order_id: None,
            stop_loss_failed: true,
            error: None,
            metadata: json!({
                "warning": "Stop-loss order failed - set manually!",
                "stop_loss_error": e.to_string(),
            }),
            executed_at: clock.now_millis(),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginCloseStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginCloseResult {
    pub status: MarginCloseStatus,
    pub close_order_id: Option<String>,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

/// Closes an isolated-margin position: place the closing order, then
/// transfer any residual collateral back to spot. Spec §4.14: "Closing
/// reverses it: place closing order; repay loan; transfer residual back
/// to spot." Loan repayment is implicit in the exchange's margin-account
/// settlement on the closing trade; this function drives the two steps
/// this system controls directly.
pub async fn close_margin_position(
    exchange: &dyn ExchangePort,
    clock: &dyn Clock,
    symbol: &str,
    close_side: Side,
    qty: Decimal8,
    quote_asset: &str,
) -> MarginCloseResult {
    let close_order = match exchange.place_market(symbol, close_side, qty).await {
        Ok(order) => order,
        Err(e) => {
            return MarginCloseResult {
                status: MarginCloseStatus::Failed,
                close_order_id: None,
                error: Some(e.to_string()),
                executed_at: clock.now_millis(),
            };
        }
    };

    let residual = match exchange.margin_account(symbol).await {
        Ok(info) => info.collateral,
        Err(_) => Micros::ZERO,
    };

    if residual.to_f64() > 0.0 {
        if let Err(e) = exchange
            .transfer(TransferDirection::MarginToSpot, quote_asset, residual, Some(symbol))
            .await
        {
            tracing::warn!(symbol, error = %e, "residual transfer back to spot failed after close");
        }
    }

    MarginCloseResult {
        status: MarginCloseStatus::Success,
        close_order_id: Some(close_order.order_id),
        error: None,
        executed_at: clock.now_millis(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginAlertLevel {
    Ok,
    Warning,
    Liquidation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginLevelCheck {
    pub symbol: String,
    pub margin_level: f64,
    pub alert: MarginAlertLevel,
}

/// One tick of the independent margin-level monitor (spec §4.14): below
/// `warning_level` the caller should emit an alert; below
/// `liquidation_level` the caller should trigger a defensive close. This
/// function only classifies — it never calls the exchange to close a
/// position, keeping the monitor's read path free of side effects.
pub fn classify_margin_level(
    symbol: &str,
    margin_level: f64,
    warning_level: f64,
    liquidation_level: f64,
) -> MarginLevelCheck {
    let alert = if margin_level <= liquidation_level {
        MarginAlertLevel::Liquidation
    } else if margin_level <= warning_level {
        MarginAlertLevel::Warning
    } else {
        MarginAlertLevel::Ok
    };

    MarginLevelCheck { symbol: symbol.to_string(), margin_level, alert }
}

/// Queries `get_margin_level` for a single symbol and classifies it. A
/// failed query is reported as-is; the periodic monitor decides whether a
/// transient failure should be retried or escalated.
pub async fn check_margin_level(
    exchange: &dyn ExchangePort,
    symbol: &str,
    warning_level: f64,
    liquidation_level: f64,
) -> Result<MarginLevelCheck, ExchangeError> {
    let level = exchange.get_margin_level(symbol).await?;
    Ok(classify_margin_level(symbol, level, warning_level, liquidation_level))
}

pub fn margin_account_type() -> AccountType {
    AccountType::IsolatedMargin
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tcore_clock::StepClock;
    use tcore_schemas::Candle;

    #[test]
    fn leverage_multiplies_before_cap() {
        // capital=1000, entry=50000, stop=49500 (1% stop distance), leverage=3
        // base risk qty = (1000*0.01)/500 = 0.02 -> *3 = 0.06 -> notional 3000 > 500 cap
        let r = size_margin(Micros::from_f64(1000.0), Micros::from_f64(50_000.0), Micros::from_f64(49_500.0), 1.0, 3.0);
        assert!(r.is_capped);
        let notional = r.quantity.to_f64() * 50_000.0;
        assert!(notional <= 500.0 + 1e-6);
    }

    #[test]
    fn leverage_one_matches_spot_formula_when_uncapped() {
        let spot = tcore_sizing::size(Micros::from_f64(10_000.0), Micros::from_f64(50_000.0), Micros::from_f64(49_000.0), 1.0);
        let margin = size_margin(Micros::from_f64(10_000.0), Micros::from_f64(50_000.0), Micros::from_f64(49_000.0), 1.0, 1.0);
        assert!((spot.quantity.to_f64() - margin.quantity.to_f64()).abs() < 1e-8);
    }

    #[test]
    fn zero_stop_distance_fails() {
        let r = size_margin(Micros::from_f64(1000.0), Micros::from_f64(50_000.0), Micros::from_f64(50_000.0), 1.0, 2.0);
        assert!(r.is_fail());
    }

    #[test]
    fn classify_margin_level_tiers() {
        assert_eq!(classify_margin_level("BTCUSDC", 2.0, 1.5, 1.1).alert, MarginAlertLevel::Ok);
        assert_eq!(classify_margin_level("BTCUSDC", 1.3, 1.5, 1.1).alert, MarginAlertLevel::Warning);
        assert_eq!(classify_margin_level("BTCUSDC", 1.05, 1.5, 1.1).alert, MarginAlertLevel::Liquidation);
    }

    struct StubExchange {
        transfer_fails: bool,
        stop_loss_fails: bool,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ExchangePort for StubExchange {
        async fn best_bid(&self, _symbol: &str) -> Result<Micros, ExchangeError> {
            Ok(Micros::from_f64(50_000.0))
        }
        async fn best_ask(&self, _symbol: &str) -> Result<Micros, ExchangeError> {
            Ok(Micros::from_f64(50_010.0))
        }
        async fn klines(&self, _symbol: &str, _interval: &str, _limit: usize) -> Result<Vec<Candle>, ExchangeError> {
            Ok(vec![])
        }
        async fn get_available_quote_balance(
            &self,
            _tenant_id: TenantId,
            _quote_asset: &str,
            _account_type: AccountType,
            _symbol: Option<&str>,
        ) -> Result<Micros, ExchangeError> {
            Ok(Micros::from_f64(1000.0))
        }
        async fn place_market(&self, symbol: &str, _side: Side, _qty: Decimal8) -> Result<tcore_exchange::OrderHandle, ExchangeError> {
            self.calls.lock().unwrap().push("place_market".to_string());
            Ok(tcore_exchange::OrderHandle {
                order_id: "entry-1".to_string(),
                symbol: symbol.to_string(),
                side: Side::Buy,
                qty: Decimal8::from_f64(0.01),
                price: None,
                stop_price: None,
                placed_at: Utc::now(),
            })
        }
        async fn place_limit(
            &self,
            _symbol: &str,
            _side: Side,
            _qty: Decimal8,
            _price: Micros,
        ) -> Result<tcore_exchange::OrderHandle, ExchangeError> {
            unimplemented!()
        }
        async fn place_stop_loss(
            &self,
            symbol: &str,
            _side: Side,
            _qty: Decimal8,
            stop_price: Micros,
        ) -> Result<tcore_exchange::OrderHandle, ExchangeError> {
            if self.stop_loss_fails {
                return Err(ExchangeError::Connection { operation: "place_stop_loss".to_string(), detail: "down".to_string() });
            }
            self.calls.lock().unwrap().push("place_stop_loss".to_string());
            Ok(tcore_exchange::OrderHandle {
                order_id: "stop-1".to_string(),
                symbol: symbol.to_string(),
                side: Side::Sell,
                qty: Decimal8::from_f64(0.01),
                price: None,
                stop_price: Some(stop_price),
                placed_at: Utc::now(),
            })
        }
        async fn cancel_order(&self, _order_id: &str) -> Result<(), ExchangeError> {
            Ok(())
        }
        async fn transfer(
            &self,
            _direction: TransferDirection,
            _asset: &str,
            _amount: Micros,
            _symbol: Option<&str>,
        ) -> Result<(), ExchangeError> {
            if self.transfer_fails {
                return Err(ExchangeError::Connection { operation: "transfer".to_string(), detail: "down".to_string() });
            }
            self.calls.lock().unwrap().push("transfer".to_string());
            Ok(())
        }
        async fn margin_account(&self, symbol: &str) -> Result<MarginAccountInfo, ExchangeError> {
            Ok(MarginAccountInfo {
                symbol: symbol.to_string(),
                borrowed: Micros::ZERO,
                collateral: Micros::from_f64(50.0),
                margin_level: 2.0,
            })
        }
        async fn get_margin_level(&self, _symbol: &str) -> Result<f64, ExchangeError> {
            Ok(1.3)
        }
    }

    fn clock() -> StepClock {
        StepClock::new(Utc::now(), chrono::Duration::seconds(1))
    }

    #[tokio::test]
    async fn open_position_happy_path() {
        let exchange = StubExchange { transfer_fails: false, stop_loss_fails: false, calls: Mutex::new(vec![]) };
        let result = open_margin_position(
            &exchange, &clock(), 7, "BTCUSDC", Side::Buy, "USDC",
            Micros::from_f64(500.0), Decimal8::from_f64(0.03), Micros::from_f64(49_000.0),
        ).await;
        assert_eq!(result.status, MarginOpenStatus::Success);
        assert!(!result.stop_loss_failed);
        assert_eq!(result.entry_order_id.as_deref(), Some("entry-1"));
        assert_eq!(exchange.calls.lock().unwrap().as_slice(), ["transfer", "place_market", "place_stop_loss"]);
    }

    #[tokio::test]
    async fn stop_loss_failure_after_entry_is_hard_alert_not_rollback() {
        let exchange = StubExchange { transfer_fails: false, stop_loss_fails: true, calls: Mutex::new(vec![]) };
        let result = open_margin_position(
            &exchange, &clock(), 7, "BTCUSDC", Side::Buy, "USDC",
            Micros::from_f64(500.0), Decimal8::from_f64(0.03), Micros::from_f64(49_000.0),
        ).await;
        assert_eq!(result.status, MarginOpenStatus::Success);
        assert!(result.stop_loss_failed);
        assert_eq!(result.metadata["warning"], "Stop-loss order failed - set manually!");
    }

    #[tokio::test]
    async fn transfer_failure_aborts_before_any_order() {
        let exchange = StubExchange { transfer_fails: true, stop_loss_fails: false, calls: Mutex::new(vec![]) };
        let result = open_margin_position(
            &exchange, &clock(), 7, "BTCUSDC", Side::Buy, "USDC",
            Micros::from_f64(500.0), Decimal8::from_f64(0.03), Micros::from_f64(49_000.0),
        ).await;
        assert_eq!(result.status, MarginOpenStatus::Failed);
        assert!(exchange.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_position_transfers_residual_back_to_spot() {
        let exchange = StubExchange { transfer_fails: false, stop_loss_fails: false, calls: Mutex::new(vec![]) };
        let result = close_margin_position(&exchange, &clock(), "BTCUSDC", Side::Sell, Decimal8::from_f64(0.03), "USDC").await;
        assert_eq!(result.status, MarginCloseStatus::Success);
        assert_eq!(exchange.calls.lock().unwrap().as_slice(), ["place_market", "transfer"]);
    }
}
