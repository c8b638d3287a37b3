//! Trading Intent Service (C10).
//!
//! Owns the `TradingIntent` state machine (`PENDING -> VALIDATED ->
//! EXECUTED`, with `FAILED`/`CANCELLED` reachable from any non-terminal
//! state) and `CreateTradingIntentUseCase`, which resolves the auto-mode
//! contract and drives C6/C5 to populate a fully-sized intent before it is
//! ever persisted.

use tcore_clock::Clock;
use tcore_exchange::ExchangePort;
use tcore_schemas::{Decimal8, IntentStatus, Micros, Side, Strategy, Symbol, TenantId, TradingIntent};

#[derive(Debug, Clone, PartialEq)]
pub enum IntentError {
    /// `mode=auto` was requested but one or more manual fields were also
    /// supplied. Carries the offending field names (`fields_not_allowed`).
    ManualFieldsInAutoMode(Vec<String>),
    /// Some, but not all, of {side, entry_price, stop_price, capital} were
    /// supplied. Carries the absent field names (`missing_fields`).
    PartialManualPayload(Vec<String>),
    InvalidSymbol(String),
    InvalidStrategy(String),
    ZeroQuantity,
    StopEqualsEntry,
    StopOnWrongSide,
    RiskExceedsMax(f64),
    AutoParams(String),
    Transition(TransitionError),
}

impl std::fmt::Display for IntentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntentError::ManualFieldsInAutoMode(fields) => {
                write!(f, "mode=auto rejects manually-supplied fields: {}", fields.join(", "))
            }
            IntentError::PartialManualPayload(fields) => {
                write!(f, "partial manual payload: missing fields {}", fields.join(", "))
            }
            IntentError::InvalidSymbol(s) => write!(f, "invalid symbol: {s}"),
            IntentError::InvalidStrategy(s) => write!(f, "invalid strategy: {s}"),
            IntentError::ZeroQuantity => write!(f, "computed quantity is zero"),
            IntentError::StopEqualsEntry => write!(f, "stop_price must not equal entry_price"),
            IntentError::StopOnWrongSide => write!(f, "stop_price is on the wrong side of entry_price for this side"),
            IntentError::RiskExceedsMax(pct) => write!(f, "risk_percent {pct:.4} exceeds the 1.0% ceiling at creation"),
            IntentError::AutoParams(e) => write!(f, "auto-parameter pipeline failed: {e}"),
            IntentError::Transition(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for IntentError {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransitionError {
    NotPending,
    NotValidated,
    AlreadyTerminal,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionError::NotPending => write!(f, "intent is not PENDING"),
            TransitionError::NotValidated => write!(f, "intent is not VALIDATED"),
            TransitionError::AlreadyTerminal => write!(f, "intent is already in a terminal state"),
        }
    }
}

/// PENDING -> VALIDATED | FAILED.
pub fn validate_intent(intent: &mut TradingIntent, result: serde_json::Value, passed: bool, clock: &dyn Clock) -> Result<(), TransitionError> {
    if intent.status != IntentStatus::Pending {
        return Err(TransitionError::NotPending);
    }
    intent.validation_result = Some(result);
    intent.validated_at = Some(clock.now_millis());
    intent.status = if passed { IntentStatus::Validated } else { IntentStatus::Failed };
    Ok(())
}

/// VALIDATED -> EXECUTED | FAILED. Executing a non-VALIDATED intent always fails.
pub fn execute_intent(intent: &mut TradingIntent, result: serde_json::Value, succeeded: bool, clock: &dyn Clock) -> Result<(), TransitionError> {
    if intent.status != IntentStatus::Validated {
        return Err(TransitionError::NotValidated);
    }
    intent.execution_result = Some(result);
    intent.executed_at = Some(clock.now_millis());
    intent.status = if succeeded { IntentStatus::Executed } else { IntentStatus::Failed };
    Ok(())
}

/// Any non-terminal state -> CANCELLED.
pub fn cancel_intent(intent: &mut TradingIntent, reason: Option<String>) -> Result<(), TransitionError> {
    if intent.status.is_terminal() {
        return Err(TransitionError::AlreadyTerminal);
    }
    intent.status = IntentStatus::Cancelled;
    if let Some(reason) = reason {
        intent.error_message = Some(reason);
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct ManualParams {
    pub side: Option<Side>,
    pub entry_price: Option<Micros>,
    pub stop_price: Option<Micros>,
    pub capital: Option<Micros>,
}

impl ManualParams {
    fn present_count(&self) -> usize {
        [self.side.is_some(), self.entry_price.is_some(), self.stop_price.is_some(), self.capital.is_some()]
            .iter()
            .filter(|p| **p)
            .count()
    }

    fn is_empty(&self) -> bool {
        self.present_count() == 0
    }

    fn is_complete(&self) -> bool {
        self.present_count() == 4
    }

    /// Names of the manual fields that were supplied, in wire order.
    /// Used to populate `fields_not_allowed` when `mode=auto` also carries them.
    fn present_field_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.side.is_some() {
            names.push("side".to_string());
        }
        if self.entry_price.is_some() {
            names.push("entry_price".to_string());
        }
        if self.stop_price.is_some() {
            names.push("stop_price".to_string());
        }
        if self.capital.is_some() {
            names.push("capital".to_string());
        }
        names
    }

    /// Names of the manual fields that were NOT supplied, in wire order.
    /// Used to populate `missing_fields` on a partial manual payload.
    fn missing_field_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.side.is_none() {
            names.push("side".to_string());
        }
        if self.entry_price.is_none() {
            names.push("entry_price".to_string());
        }
        if self.stop_price.is_none() {
            names.push("stop_price".to_string());
        }
        if self.capital.is_none() {
            names.push("capital".to_string());
        }
        names
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestedMode {
    Explicit { auto: bool },
    Inferred,
}

enum ResolvedMode {
    Auto,
    Manual { side: Side, entry_price: Micros, stop_price: Micros, capital: Micros },
}

fn resolve_mode(requested: RequestedMode, manual: &ManualParams) -> Result<ResolvedMode, IntentError> {
    match requested {
        RequestedMode::Explicit { auto: true } => {
            if !manual.is_empty() {
                return Err(IntentError::ManualFieldsInAutoMode(manual.present_field_names()));
            }
            Ok(ResolvedMode::Auto)
        }
        _ => {
            if manual.is_complete() {
                Ok(ResolvedMode::Manual {
                    side: manual.side.unwrap(),
                    entry_price: manual.entry_price.unwrap(),
                    stop_price: manual.stop_price.unwrap(),
                    capital: manual.capital.unwrap(),
                })
            } else if manual.is_empty() {
                Ok(ResolvedMode::Auto)
            } else {
                Err(IntentError::PartialManualPayload(manual.missing_field_names()))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateIntentRequest {
    pub tenant_id: TenantId,
    pub mode: RequestedMode,
    pub manual: ManualParams,
    pub regime: String,
    pub reason: String,
    pub pattern_code: Option<String>,
    pub pattern_event_id: Option<String>,
    pub pattern_source: Option<String>,
}

pub struct CreateTradingIntentUseCase;

impl CreateTradingIntentUseCase {
    /// Resolves mode, drives C6 (auto) or C5 directly (manual), validates
    /// every invariant from spec §3, and returns a PENDING intent ready to
    /// persist. Never persists itself.
    pub async fn execute(
        req: CreateIntentRequest,
        exchange: &dyn ExchangePort,
        symbol: &Symbol,
        strategy: &Strategy,
        clock: &dyn Clock,
    ) -> Result<TradingIntent, IntentError> {
        if symbol.name.trim().is_empty() {
            return Err(IntentError::InvalidSymbol("empty name".to_string()));
        }
        if strategy.name.trim().is_empty() {
            return Err(IntentError::InvalidStrategy("empty name".to_string()));
        }

        let resolved = resolve_mode(req.mode, &req.manual)?;

        let (side, entry_price, stop_price, capital, quantity, risk_amount, risk_percent, confidence_float) = match resolved {
            ResolvedMode::Auto => {
                let proposal = tcore_autoparams::calculate(exchange, req.tenant_id, symbol, strategy, 2)
                    .await
                    .map_err(|e| IntentError::AutoParams(e.to_string()))?;
                let risk_percent = if proposal.capital.to_f64() != 0.0 {
                    proposal.risk_amount.to_f64() / proposal.capital.to_f64() * 100.0
                } else {
                    0.0
                };
                (
                    proposal.side,
                    proposal.entry_price,
                    proposal.stop_price,
                    proposal.capital,
                    proposal.quantity,
                    proposal.risk_amount,
                    risk_percent,
                    proposal.confidence_float,
                )
            }
            ResolvedMode::Manual { side, entry_price, stop_price, capital } => {
                if stop_price == entry_price {
                    return Err(IntentError::StopEqualsEntry);
                }
                let wrong_side = match side {
                    Side::Buy => stop_price.to_f64() >= entry_price.to_f64(),
                    Side::Sell => stop_price.to_f64() <= entry_price.to_f64(),
                };
                if wrong_side {
                    return Err(IntentError::StopOnWrongSide);
                }
                let sizing = tcore_sizing::size(capital, entry_price, stop_price, tcore_sizing::DEFAULT_MAX_RISK_PERCENT);
                (side, entry_price, stop_price, capital, sizing.quantity, sizing.risk_amount, sizing.risk_percent, 0.6)
            }
        };

        if quantity.is_zero() {
            return Err(IntentError::ZeroQuantity);
        }
        if stop_price == entry_price {
            return Err(IntentError::StopEqualsEntry);
        }
        let wrong_side = match side {
            Side::Buy => stop_price.to_f64() >= entry_price.to_f64(),
            Side::Sell => stop_price.to_f64() <= entry_price.to_f64(),
        };
        if wrong_side {
            return Err(IntentError::StopOnWrongSide);
        }
        // Tolerate float noise at the 1.0% ceiling rather than rejecting a
        // trade that is correct to within rounding error.
        if risk_percent > tcore_sizing::DEFAULT_MAX_RISK_PERCENT + 1e-6 {
            return Err(IntentError::RiskExceedsMax(risk_percent));
        }

        Ok(TradingIntent {
            intent_id: clock.new_uuid(),
            tenant_id: req.tenant_id,
            symbol: symbol.name.clone(),
            strategy_id: strategy.id,
            side,
            entry_price,
            stop_price,
            target_price: None,
            quantity: Decimal8::from_f64(quantity.to_f64()),
            capital,
            risk_amount,
            risk_percent,
            regime: req.regime,
            confidence: confidence_float,
            reason: req.reason,
            pattern_code: req.pattern_code,
            pattern_event_id: req.pattern_event_id,
            pattern_source: req.pattern_source,
            status: IntentStatus::Pending,
            validated_at: None,
            executed_at: None,
            validation_result: None,
            execution_result: None,
            error_message: None,
            created_at: clock.now_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use tcore_clock::StepClock;
    use tcore_exchange::error::ExchangeError;
    use tcore_exchange::types::{MarginAccountInfo, OrderHandle, TransferDirection};
    use tcore_schemas::{AccountType, Candle, MarketBias};

    struct StubExchange;

    #[async_trait]
    impl ExchangePort for StubExchange {
        async fn best_bid(&self, _s: &str) -> Result<Micros, ExchangeError> {
            Ok(Micros::from_f64(49_950.0))
        }
        async fn best_ask(&self, _s: &str) -> Result<Micros, ExchangeError> {
            Ok(Micros::from_f64(50_000.0))
        }
        async fn klines(&self, _s: &str, _i: &str, _l: usize) -> Result<Vec<Candle>, ExchangeError> {
            Ok(Vec::new())
        }
        async fn get_available_quote_balance(&self, _t: TenantId, _q: &str, _a: AccountType, _s: Option<&str>) -> Result<Micros, ExchangeError> {
            Ok(Micros::ZERO)
        }
        async fn place_market(&self, _s: &str, _side: Side, _q: Decimal8) -> Result<OrderHandle, ExchangeError> {
            unimplemented!()
        }
        async fn place_limit(&self, _s: &str, _side: Side, _q: Decimal8, _p: Micros) -> Result<OrderHandle, ExchangeError> {
            unimplemented!()
        }
        async fn place_stop_loss(&self, _s: &str, _side: Side, _q: Decimal8, _p: Micros) -> Result<OrderHandle, ExchangeError> {
            unimplemented!()
        }
        async fn cancel_order(&self, _o: &str) -> Result<(), ExchangeError> {
            unimplemented!()
        }
        async fn transfer(&self, _d: TransferDirection, _a: &str, _amt: Micros, _s: Option<&str>) -> Result<(), ExchangeError> {
            unimplemented!()
        }
        async fn margin_account(&self, _s: &str) -> Result<MarginAccountInfo, ExchangeError> {
            unimplemented!()
        }
        async fn get_margin_level(&self, _s: &str) -> Result<f64, ExchangeError> {
            unimplemented!()
        }
    }

    fn symbol() -> Symbol {
        Symbol { name: "BTCUSDC".to_string(), base_asset: "BTC".to_string(), quote_asset: "USDC".to_string(), min_qty: None, max_qty: None }
    }

    fn strategy() -> Strategy {
        Strategy { id: 1, tenant_id: 1, name: "s".to_string(), market_bias: MarketBias::Bullish, config: serde_json::json!({"capital_fixed": "1000"}) }
    }

    fn clock() -> StepClock {
        StepClock::new(Utc::now(), chrono::Duration::seconds(1))
    }

    #[tokio::test]
    async fn auto_mode_with_manual_fields_is_rejected() {
        let req = CreateIntentRequest {
            tenant_id: 1,
            mode: RequestedMode::Explicit { auto: true },
            manual: ManualParams { side: Some(Side::Buy), ..Default::default() },
            regime: "trend".to_string(),
            reason: "r".to_string(),
            pattern_code: None,
            pattern_event_id: None,
            pattern_source: None,
        };
        let err = CreateTradingIntentUseCase::execute(req, &StubExchange, &symbol(), &strategy(), &clock())
            .await
            .unwrap_err();
        assert_eq!(err, IntentError::ManualFieldsInAutoMode(vec!["side".to_string()]));
    }

    #[tokio::test]
    async fn partial_manual_payload_is_rejected() {
        let req = CreateIntentRequest {
            tenant_id: 1,
            mode: RequestedMode::Inferred,
            manual: ManualParams { side: Some(Side::Buy), entry_price: Some(Micros::from_f64(100.0)), ..Default::default() },
            regime: "trend".to_string(),
            reason: "r".to_string(),
            pattern_code: None,
            pattern_event_id: None,
            pattern_source: None,
        };
        let err = CreateTradingIntentUseCase::execute(req, &StubExchange, &symbol(), &strategy(), &clock())
            .await
            .unwrap_err();
        assert_eq!(err, IntentError::PartialManualPayload(vec!["stop_price".to_string(), "capital".to_string()]));
    }

    #[tokio::test]
    async fn fully_auto_request_produces_pending_intent() {
        let req = CreateIntentRequest {
            tenant_id: 1,
            mode: RequestedMode::Inferred,
            manual: ManualParams::default(),
            regime: "trend".to_string(),
            reason: "auto-generated".to_string(),
            pattern_code: None,
            pattern_event_id: None,
            pattern_source: None,
        };
        let intent = CreateTradingIntentUseCase::execute(req, &StubExchange, &symbol(), &strategy(), &clock())
            .await
            .unwrap();
        assert_eq!(intent.status, IntentStatus::Pending);
        assert!(intent.quantity.to_f64() > 0.0);
    }

    #[test]
    fn state_machine_rejects_execute_before_validate() {
        let mut intent = make_pending_intent();
        let err = execute_intent(&mut intent, serde_json::json!({}), true, &clock()).unwrap_err();
        assert_eq!(err, TransitionError::NotValidated);
    }

    #[test]
    fn cancel_is_unavailable_once_terminal() {
        let mut intent = make_pending_intent();
        validate_intent(&mut intent, serde_json::json!({}), true, &clock()).unwrap();
        execute_intent(&mut intent, serde_json::json!({}), true, &clock()).unwrap();
        assert_eq!(intent.status, IntentStatus::Executed);
        assert_eq!(cancel_intent(&mut intent, None).unwrap_err(), TransitionError::AlreadyTerminal);
    }

    fn make_pending_intent() -> TradingIntent {
        TradingIntent {
            intent_id: uuid::Uuid::from_u128(1),
            tenant_id: 1,
            symbol: "BTCUSDC".to_string(),
            strategy_id: 1,
            side: Side::Buy,
            entry_price: Micros::from_f64(100.0),
            stop_price: Micros::from_f64(95.0),
            target_price: None,
            quantity: Decimal8::from_f64(1.0),
            capital: Micros::from_f64(1000.0),
            risk_amount: Micros::from_f64(10.0),
            risk_percent: 1.0,
            regime: "trend".to_string(),
            confidence: 0.6,
            reason: "r".to_string(),
            pattern_code: None,
            pattern_event_id: None,
            pattern_source: None,
            status: IntentStatus::Pending,
            validated_at: None,
            executed_at: None,
            validation_result: None,
            execution_result: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }
}
