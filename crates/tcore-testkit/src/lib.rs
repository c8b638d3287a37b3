//! Shared test fixtures and entity builders for Trading Core crates.
//!
//! Every builder here returns a fully-populated, schema-valid entity with
//! sane defaults (regime="test", confidence=0.8, etc.) so a test only has
//! to override the one or two fields its scenario actually cares about.
//! Nothing here talks to a database or network — persistence-backed tests
//! build on top of these values with `tcore_db::insert_*`.

use chrono::{DateTime, Utc};
use tcore_schemas::{
    IntentStatus, MarginPosition, MarginPositionStatus, Micros, Operation, OperationStatus,
    PatternTrigger, PolicyState, Side, Strategy, Symbol, TenantId, TradingIntent,
};
use uuid::Uuid;

pub use tcore_clock::{Clock, StepClock};

/// A fixed instant used as the default `StepClock` origin so timestamp-derived
/// fixture values (adjustment tokens, created_at) are reproducible across runs.
pub fn fixed_epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).expect("valid fixed epoch")
}

/// A `StepClock` seeded at [`fixed_epoch`], ticking one second per call.
pub fn step_clock() -> StepClock {
    StepClock::new(fixed_epoch(), chrono::Duration::seconds(1))
}

pub fn symbol(name: &str) -> Symbol {
    Symbol {
        name: name.to_string(),
        base_asset: name.trim_end_matches("USDC").trim_end_matches("USDT").to_string(),
        quote_asset: "USDC".to_string(),
        min_qty: None,
        max_qty: None,
    }
}

pub fn strategy(tenant_id: TenantId, name: &str) -> Strategy {
    Strategy {
        id: 0,
        tenant_id,
        name: name.to_string(),
        market_bias: tcore_schemas::MarketBias::Bullish,
        config: serde_json::json!({"capital_mode": "fixed", "capital_fixed": 1000.0}),
    }
}

/// A PENDING manual-BUY trading intent: entry=50000, stop=49000, capital=1000,
/// risk 1% -> quantity 0.01 (the spec §8 scenario-1 numbers).
pub fn trading_intent(tenant_id: TenantId, symbol: &str, strategy_id: i64) -> TradingIntent {
    TradingIntent {
        intent_id: Uuid::new_v4(),
        tenant_id,
        symbol: symbol.to_string(),
        strategy_id,
        side: Side::Buy,
        entry_price: Micros::from_f64(50_000.0),
        stop_price: Micros::from_f64(49_000.0),
        target_price: None,
        quantity: tcore_schemas::Decimal8::from_f64(0.01),
        capital: Micros::from_f64(1_000.0),
        risk_amount: Micros::from_f64(10.0),
        risk_percent: 1.0,
        regime: "test".to_string(),
        confidence: 0.8,
        reason: "fixture".to_string(),
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

pub fn pattern_trigger(tenant_id: TenantId, pattern_event_id: &str, intent_id: Uuid) -> PatternTrigger {
    PatternTrigger {
        tenant_id,
        pattern_event_id: pattern_event_id.to_string(),
        intent_id,
        created_at: Utc::now(),
    }
}

pub fn operation(tenant_id: TenantId, symbol: &str, strategy_id: i64) -> Operation {
    Operation {
        id: 0,
        tenant_id,
        symbol: symbol.to_string(),
        strategy_id,
        side: Side::Buy,
        status: OperationStatus::Planned,
        stop_price: Micros::from_f64(49_000.0),
        target_price: None,
        entry_order_id: None,
        exit_order_id: None,
        weighted_entry_price: Micros::from_f64(50_000.0),
        filled_quantity: tcore_schemas::Decimal8::from_f64(0.01),
        created_at: Utc::now(),
    }
}

pub fn margin_position(tenant_id: TenantId, symbol: &str) -> MarginPosition {
    MarginPosition {
        id: 0,
        tenant_id,
        symbol: symbol.to_string(),
        side: Side::Buy,
        leverage: 2.0,
        entry_price: Micros::from_f64(50_000.0),
        quantity: tcore_schemas::Decimal8::from_f64(0.01),
        current_price: Micros::from_f64(50_000.0),
        margin_level: Some(2.0),
        risk_amount: Micros::from_f64(10.0),
        risk_percent: 1.0,
        stop_price: Micros::from_f64(49_000.0),
        status: MarginPositionStatus::Open,
    }
}

/// A fresh ACTIVE monthly policy state, $10,000 starting capital, 4% monthly
/// drawdown cap, 50 trades/day — spec §4.9 defaults.
pub fn policy_state(tenant_id: TenantId, month: &str) -> PolicyState {
    PolicyState::new_active(tenant_id, month.to_string(), Micros::from_f64(10_000.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trading_intent_fixture_has_one_percent_risk_quantity() {
        let i = trading_intent(1, "BTCUSDC", 1);
        assert_eq!(i.quantity.to_string(), "0.01000000");
        assert_eq!(i.status, IntentStatus::Pending);
    }

    #[test]
    fn policy_state_fixture_starts_active_with_zero_drawdown() {
        let p = policy_state(1, "2026-01");
        assert_eq!(p.status, tcore_schemas::PolicyStatus::Active);
        assert_eq!(p.drawdown_percent(), 0.0);
    }

    #[test]
    fn step_clock_is_deterministic_from_fixed_epoch() {
        let clock = step_clock();
        let token = tcore_clock::default_adjustment_token(1, &clock);
        assert!(token.starts_with("1:adjust:1700000000"));
    }
}
