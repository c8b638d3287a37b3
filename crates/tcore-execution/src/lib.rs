//! Execution Framework (C11).
//!
//! Runs the applicable guards first; any failure blocks before the
//! exchange is ever touched. In DRY_RUN the same decision tree runs but
//! every exchange call is replaced with a simulated action, so a preview
//! and a live run produce structurally identical results. `ExecutionMode`
//! defaults to DRY_RUN everywhere (spec §4.11) — callers opt into LIVE
//! explicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tcore_clock::Clock;
use tcore_exchange::ExchangePort;
use tcore_risk::GuardOutcome;
use tcore_schemas::{Decimal8, ExecutionMode, ExecutionStatus, Micros, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    MarketBuy,
    MarketSell,
    StopLoss,
    StopLossFailed,
    CancelOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionAction {
    pub action_type: ActionType,
    pub order_id: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub mode: ExecutionMode,
    pub guards: Vec<GuardOutcomeDto>,
    pub actions: Vec<ExecutionAction>,
    pub metadata: Value,
    pub executed_at: DateTime<Utc>,
    pub error: Option<String>,
}

/// Serializable projection of `GuardOutcome` — the guard crate's type
/// carries a `serde_json::Value` already but no `Serialize` derive of its
/// own (it's meant to be inspected in-process, not persisted directly).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardOutcomeDto {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Value,
}

impl From<&GuardOutcome> for GuardOutcomeDto {
    fn from(g: &GuardOutcome) -> Self {
        GuardOutcomeDto { name: g.name.to_string(), passed: g.passed, message: g.message.clone(), details: g.details.clone() }
    }
}

/// Request shared by opening and closing flows. `stop_price` is required
/// when `is_opening` is true (spec §4.11: "shorts (opening) require a
/// stop; closing a long does not"); `existing_stop_order_id` lets a
/// closing trade cancel the stop it is superseding before the closing
/// order goes out.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal8,
    pub is_opening: bool,
    pub stop_price: Option<Micros>,
    pub existing_stop_order_id: Option<String>,
}

fn blocked(mode: ExecutionMode, guards: &[GuardOutcome], clock: &dyn Clock) -> ExecutionResult {
    ExecutionResult {
        status: ExecutionStatus::Blocked,
        mode,
        guards: guards.iter().map(GuardOutcomeDto::from).collect(),
        actions: vec![],
        metadata: json!({}),
        executed_at: clock.now_millis(),
        error: Some("one or more guards failed".to_string()),
    }
}

fn market_action_type(side: Side) -> ActionType {
    match side {
        Side::Buy => ActionType::MarketBuy,
        Side::Sell => ActionType::MarketSell,
    }
}

/// Runs `guards` and, if all pass, executes `request` against `exchange`
/// per `mode`. The only branch point between DRY_RUN and LIVE is whether
/// the exchange is actually called; the guard evaluation, action
/// sequencing, and STOP_LOSS_FAILED handling are identical so a dry run is
/// a faithful preview of the live path.
pub async fn execute(
    exchange: &dyn ExchangePort,
    clock: &dyn Clock,
    mode: ExecutionMode,
    guards: Vec<GuardOutcome>,
    request: ExecutionRequest,
) -> ExecutionResult {
    if guards.iter().any(|g| !g.passed) {
        return blocked(mode, &guards, clock);
    }

    if request.is_opening && request.stop_price.is_none() {
        return ExecutionResult {
            status: ExecutionStatus::Failed,
            mode,
            guards: guards.iter().map(GuardOutcomeDto::from).collect(),
            actions: vec![],
            metadata: json!({}),
            executed_at: clock.now_millis(),
            error: Some("opening trade requires a stop_price".to_string()),
        };
    }

    let guard_dtos: Vec<GuardOutcomeDto> = guards.iter().map(GuardOutcomeDto::from).collect();

    match mode {
        ExecutionMode::DryRun => execute_dry_run(clock, guard_dtos, request),
        ExecutionMode::Live => execute_live(exchange, clock, guard_dtos, request).await,
    }
}

fn execute_dry_run(clock: &dyn Clock, guards: Vec<GuardOutcomeDto>, request: ExecutionRequest) -> ExecutionResult {
    let mut actions = vec![ExecutionAction {
        action_type: market_action_type(request.side),
        order_id: None,
        metadata: json!({ "symbol": request.symbol, "qty": request.quantity, "simulated": true }),
    }];

    if request.is_opening {
        if let Some(stop_price) = request.stop_price {
            actions.push(ExecutionAction {
                action_type: ActionType::StopLoss,
                order_id: None,
                metadata: json!({ "stop_price": stop_price, "simulated": true }),
            });
        }
    }

    ExecutionResult {
        status: ExecutionStatus::Success,
        mode: ExecutionMode::DryRun,
        guards,
        actions,
        metadata: json!({}),
        executed_at: clock.now_millis(),
        error: None,
    }
}

async fn execute_live(
    exchange: &dyn ExchangePort,
    clock: &dyn Clock,
    guards: Vec<GuardOutcomeDto>,
    request: ExecutionRequest,
) -> ExecutionResult {
    let mut actions = Vec::new();

    if !request.is_opening {
        if let Some(order_id) = &request.existing_stop_order_id {
            match exchange.cancel_order(order_id).await {
                Ok(()) => actions.push(ExecutionAction {
                    action_type: ActionType::CancelOrder,
                    order_id: Some(order_id.clone()),
                    metadata: json!({}),
                }),
                Err(e) => {
                    tracing::warn!(order_id, error = %e, "failed to cancel superseded stop before close; continuing");
                }
            }
        }
    }

    let market_result = exchange.place_market(&request.symbol, request.side, request.quantity).await;
    let order = match market_result {
        Ok(order) => order,
        Err(e) => {
            return ExecutionResult {
                status: ExecutionStatus::Failed,
                mode: ExecutionMode::Live,
                guards,
                actions,
                metadata: json!({}),
                executed_at: clock.now_millis(),
                error: Some(e.to_string()),
            };
        }
    };

    actions.push(ExecutionAction {
        action_type: market_action_type(request.side),
        order_id: Some(order.order_id.clone()),
        metadata: json!({ "symbol": request.symbol, "qty": request.quantity }),
    });

    let mut metadata = json!({});

    if request.is_opening {
        // stop_price presence already validated by `execute`.
        let stop_price = request.stop_price.expect("opening trade stop_price validated upstream");
        match exchange.place_stop_loss(&request.symbol, request.side.opposite(), request.quantity, stop_price).await {
            Ok(stop_order) => actions.push(ExecutionAction {
                action_type: ActionType::StopLoss,
                order_id: Some(stop_order.order_id),
                metadata: json!({ "stop_price": stop_price }),
            }),
            Err(e) => {
                actions.push(ExecutionAction {
                    action_type: ActionType::StopLossFailed,
                    order_id: None,
                    metadata: json!({ "error": e.to_string() }),
                });
                metadata = json!({ "warning": "Stop-loss order failed - set manually!" });
            }
        }
    }

    ExecutionResult {
        status: ExecutionStatus::Success,
        mode: ExecutionMode::Live,
        guards,
        actions,
        metadata,
        executed_at: clock.now_millis(),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tcore_clock::StepClock;
    use tcore_exchange::{ExchangeError, MarginAccountInfo, OrderHandle, TransferDirection};
    use tcore_schemas::{AccountType, Candle, TenantId};

    fn clock() -> StepClock {
        StepClock::new(Utc::now(), chrono::Duration::seconds(1))
    }

    fn passing_guard() -> GuardOutcome {
        GuardOutcome { name: "RISK_MANAGEMENT", passed: true, message: "ok".to_string(), details: json!({}) }
    }

    fn failing_guard() -> GuardOutcome {
        GuardOutcome { name: "RISK_MANAGEMENT", passed: false, message: "bad".to_string(), details: json!({}) }
    }

    fn open_request() -> ExecutionRequest {
        ExecutionRequest {
            symbol: "BTCUSDC".to_string(),
            side: Side::Buy,
            quantity: Decimal8::from_f64(0.01),
            is_opening: true,
            stop_price: Some(Micros::from_f64(49_000.0)),
            existing_stop_order_id: None,
        }
    }

    struct StubExchange {
        stop_loss_fails: bool,
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
        async fn place_market(&self, symbol: &str, side: Side, qty: Decimal8) -> Result<OrderHandle, ExchangeError> {
            Ok(OrderHandle { order_id: "mkt-1".to_string(), symbol: symbol.to_string(), side, qty, price: None, stop_price: None, placed_at: Utc::now() })
        }
        async fn place_limit(&self, _symbol: &str, _side: Side, _qty: Decimal8, _price: Micros) -> Result<OrderHandle, ExchangeError> {
            unimplemented!()
        }
        async fn place_stop_loss(&self, symbol: &str, side: Side, qty: Decimal8, stop_price: Micros) -> Result<OrderHandle, ExchangeError> {
            if self.stop_loss_fails {
                return Err(ExchangeError::Connection { operation: "place_stop_loss".to_string(), detail: "down".to_string() });
            }
            Ok(OrderHandle { order_id: "stop-1".to_string(), symbol: symbol.to_string(), side, qty, price: None, stop_price: Some(stop_price), placed_at: Utc::now() })
        }
        async fn cancel_order(&self, _order_id: &str) -> Result<(), ExchangeError> {
            Ok(())
        }
        async fn transfer(&self, _direction: TransferDirection, _asset: &str, _amount: Micros, _symbol: Option<&str>) -> Result<(), ExchangeError> {
            Ok(())
        }
        async fn margin_account(&self, symbol: &str) -> Result<MarginAccountInfo, ExchangeError> {
            Ok(MarginAccountInfo { symbol: symbol.to_string(), borrowed: Micros::ZERO, collateral: Micros::ZERO, margin_level: 2.0 })
        }
        async fn get_margin_level(&self, _symbol: &str) -> Result<f64, ExchangeError> {
            Ok(2.0)
        }
    }

    #[tokio::test]
    async fn failing_guard_blocks_before_any_exchange_call() {
        let exchange = StubExchange { stop_loss_fails: false };
        let result = execute(&exchange, &clock(), ExecutionMode::Live, vec![failing_guard()], open_request()).await;
        assert_eq!(result.status, ExecutionStatus::Blocked);
        assert!(result.actions.is_empty());
    }

    #[tokio::test]
    async fn dry_run_buy_simulates_market_and_stop_actions() {
        let exchange = StubExchange { stop_loss_fails: false };
        let result = execute(&exchange, &clock(), ExecutionMode::DryRun, vec![passing_guard()], open_request()).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.actions.len(), 2);
        assert!(result.actions.iter().all(|a| a.order_id.is_none()));
    }

    #[tokio::test]
    async fn live_buy_succeeds_with_both_orders() {
        let exchange = StubExchange { stop_loss_fails: false };
        let result = execute(&exchange, &clock(), ExecutionMode::Live, vec![passing_guard()], open_request()).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        let kinds: Vec<ActionType> = result.actions.iter().map(|a| a.action_type).collect();
        assert_eq!(kinds, vec![ActionType::MarketBuy, ActionType::StopLoss]);
    }

    #[tokio::test]
    async fn stop_loss_failure_after_market_still_succeeds_with_warning() {
        let exchange = StubExchange { stop_loss_fails: true };
        let result = execute(&exchange, &clock(), ExecutionMode::Live, vec![passing_guard()], open_request()).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        let kinds: Vec<ActionType> = result.actions.iter().map(|a| a.action_type).collect();
        assert_eq!(kinds, vec![ActionType::MarketBuy, ActionType::StopLossFailed]);
        assert_eq!(result.metadata["warning"], "Stop-loss order failed - set manually!");
    }

    #[tokio::test]
    async fn closing_a_long_does_not_require_stop_and_cancels_existing_one() {
        let exchange = StubExchange { stop_loss_fails: false };
        let request = ExecutionRequest {
            symbol: "BTCUSDC".to_string(),
            side: Side::Sell,
            quantity: Decimal8::from_f64(0.01),
            is_opening: false,
            stop_price: None,
            existing_stop_order_id: Some("stop-0".to_string()),
        };
        let result = execute(&exchange, &clock(), ExecutionMode::Live, vec![passing_guard()], request).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        let kinds: Vec<ActionType> = result.actions.iter().map(|a| a.action_type).collect();
        assert_eq!(kinds, vec![ActionType::CancelOrder, ActionType::MarketSell]);
    }

    #[tokio::test]
    async fn opening_without_stop_price_fails_before_any_exchange_call() {
        let exchange = StubExchange { stop_loss_fails: false };
        let mut request = open_request();
        request.stop_price = None;
        let result = execute(&exchange, &clock(), ExecutionMode::Live, vec![passing_guard()], request).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.actions.is_empty());
    }
}
