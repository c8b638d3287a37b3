//! Risk Guards (C7). Each guard is a pure check over an explicit input
//! struct — no shared mutable state, no I/O. Composable: callers run
//! whichever subset applies and inspect each `GuardOutcome` independently.

use serde_json::json;
use tcore_schemas::{Decimal8, ExecutionMode, Micros, Side};

#[derive(Debug, Clone, PartialEq)]
pub struct GuardOutcome {
    pub name: &'static str,
    pub passed: bool,
    pub message: String,
    pub details: serde_json::Value,
}

impl GuardOutcome {
    fn pass(name: &'static str, message: impl Into<String>, details: serde_json::Value) -> Self {
        GuardOutcome { name, passed: true, message: message.into(), details }
    }

    fn fail(name: &'static str, message: impl Into<String>, details: serde_json::Value) -> Self {
        GuardOutcome { name, passed: false, message: message.into(), details }
    }
}

pub const DEFAULT_MAX_RISK_PERCENT: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct RiskManagementInput {
    pub entry_price: Micros,
    pub stop_price: Option<Micros>,
    pub side: Side,
    pub capital: Micros,
    pub quantity: Decimal8,
    pub max_risk_percent: f64,
}

/// Fails if `stop_price` is absent, on the wrong side of entry, or implies
/// risk above `max_risk_percent`. When it can, computes the quantity that
/// would bring the trade back within budget and returns it as a
/// recommendation rather than silently resizing the caller's order.
pub fn check_risk_management(input: &RiskManagementInput) -> GuardOutcome {
    let name = "RISK_MANAGEMENT";

    let Some(stop_price) = input.stop_price else {
        return GuardOutcome::fail(name, "Trade rejected: no stop-loss price set", json!({}));
    };

    let wrong_side = match input.side {
        Side::Buy => stop_price.to_f64() >= input.entry_price.to_f64(),
        Side::Sell => stop_price.to_f64() <= input.entry_price.to_f64(),
    };
    if wrong_side {
        return GuardOutcome::fail(
            name,
            "Trade rejected: stop-loss is on the wrong side of entry price",
            json!({ "entry_price": input.entry_price.to_f64(), "stop_price": stop_price.to_f64(), "side": input.side }),
        );
    }

    let stop_distance = (input.entry_price.to_f64() - stop_price.to_f64()).abs();
    let risk_amount = input.quantity.to_f64() * stop_distance;
    let risk_percent = if input.capital.to_f64() != 0.0 {
        risk_amount / input.capital.to_f64() * 100.0
    } else {
        0.0
    };

    if risk_percent > input.max_risk_percent {
        let safe_quantity = if stop_distance > 0.0 {
            Some(Decimal8::from_f64(input.capital.to_f64() * input.max_risk_percent / 100.0 / stop_distance))
        } else {
            None
        };
        return GuardOutcome::fail(
            name,
            format!(
                "Trade rejected: risk {risk_percent:.2}% exceeds maximum {:.2}%",
                input.max_risk_percent
            ),
            json!({
                "risk_percent": risk_percent,
                "max_risk_percent": input.max_risk_percent,
                "recommendation": safe_quantity.map(|q| q.to_f64()),
            }),
        );
    }

    GuardOutcome::pass(name, "Risk within bounds", json!({ "risk_percent": risk_percent }))
}

pub const DEFAULT_MAX_DRAWDOWN_PERCENT: f64 = 4.0;

#[derive(Debug, Clone, Copy)]
pub struct MonthlyDrawdownInput {
    pub monthly_pnl: Micros,
    pub capital: Micros,
    pub max_drawdown_percent: f64,
    pub force_override: bool,
}

/// Fails if `|monthly_pnl| / capital * 100 >= max_drawdown_percent`. A
/// positive month always passes regardless of magnitude. `force_override`
/// is an emergency escape hatch — it still passes but with a loud warning
/// in `details` so the override is never silent in the audit trail.
pub fn check_monthly_drawdown(input: &MonthlyDrawdownInput) -> GuardOutcome {
    let name = "MONTHLY_DRAWDOWN";

    if input.monthly_pnl.to_f64() >= 0.0 {
        return GuardOutcome::pass(name, "Month is profitable", json!({}));
    }

    let loss_percent = if input.capital.to_f64() != 0.0 {
        input.monthly_pnl.to_f64().abs() / input.capital.to_f64() * 100.0
    } else {
        0.0
    };

    if loss_percent >= input.max_drawdown_percent {
        if input.force_override {
            return GuardOutcome::pass(
                name,
                format!(
                    "DRAWDOWN OVERRIDE IN EFFECT: loss {loss_percent:.2}% >= limit {:.2}% but force_override=true",
                    input.max_drawdown_percent
                ),
                json!({ "loss_percent": loss_percent, "force_override": true }),
            );
        }
        return GuardOutcome::fail(
            name,
            format!(
                "Trading paused: monthly drawdown {loss_percent:.2}% reached limit {:.2}%",
                input.max_drawdown_percent
            ),
            json!({ "loss_percent": loss_percent }),
        );
    }

    GuardOutcome::pass(name, "Drawdown within bounds", json!({ "loss_percent": loss_percent }))
}

#[derive(Debug, Clone)]
pub struct TradeIntentInput {
    pub mode: ExecutionMode,
    pub strategy_name: Option<String>,
    pub confirmed: bool,
    pub emotional_check_passed: Option<bool>,
}

/// In LIVE mode requires a non-empty `strategy_name` and an explicit
/// `confirmed=true`; DRY_RUN relaxes both. Never relaxes the emotional
/// check when one has already run and failed.
pub fn check_trade_intent(input: &TradeIntentInput) -> GuardOutcome {
    let name = "TRADE_INTENT";

    if input.emotional_check_passed == Some(false) {
        return GuardOutcome::fail(name, "Trade rejected: emotional check failed", json!({}));
    }

    if input.mode == ExecutionMode::DryRun {
        return GuardOutcome::pass(name, "DRY_RUN: confirmation not required", json!({}));
    }

    let has_strategy = input.strategy_name.as_deref().is_some_and(|s| !s.trim().is_empty());
    if !has_strategy {
        return GuardOutcome::fail(name, "LIVE trade rejected: strategy_name is required", json!({}));
    }
    if !input.confirmed {
        return GuardOutcome::fail(name, "LIVE trade rejected: explicit confirmation is required", json!({}));
    }

    GuardOutcome::pass(name, "LIVE trade confirmed", json!({}))
}

pub const DEFAULT_COOLDOWN_SECONDS: i64 = 900;
pub const DEFAULT_FUNDING_RATE_THRESHOLD: f64 = 0.01;
pub const DEFAULT_STALE_DATA_SECONDS: i64 = 300;

#[derive(Debug, Clone, Copy)]
pub struct EntryGateInput {
    pub cooldown_enabled: bool,
    pub seconds_since_last_stop_out: Option<i64>,
    pub cooldown_seconds: i64,

    pub funding_check_enabled: bool,
    pub funding_rate: Option<f64>,
    pub funding_rate_threshold: f64,

    pub staleness_check_enabled: bool,
    pub data_age_seconds: i64,
    pub stale_threshold_seconds: i64,
}

impl Default for EntryGateInput {
    fn default() -> Self {
        EntryGateInput {
            cooldown_enabled: true,
            seconds_since_last_stop_out: None,
            cooldown_seconds: DEFAULT_COOLDOWN_SECONDS,
            funding_check_enabled: true,
            funding_rate: None,
            funding_rate_threshold: DEFAULT_FUNDING_RATE_THRESHOLD,
            staleness_check_enabled: true,
            data_age_seconds: 0,
            stale_threshold_seconds: DEFAULT_STALE_DATA_SECONDS,
        }
    }
}

/// Runs the three toggleable entry sub-checks and returns one outcome per
/// sub-check, in order: cooldown, funding-rate sanity, stale-data.
pub fn check_entry_gate(input: &EntryGateInput) -> Vec<GuardOutcome> {
    let mut outcomes = Vec::with_capacity(3);

    if input.cooldown_enabled {
        outcomes.push(match input.seconds_since_last_stop_out {
            Some(elapsed) if elapsed < input.cooldown_seconds => GuardOutcome::fail(
                "ENTRY_COOLDOWN",
                format!("Cooldown active: {elapsed}s elapsed, {}s required", input.cooldown_seconds),
                json!({ "elapsed_seconds": elapsed, "cooldown_seconds": input.cooldown_seconds }),
            ),
            _ => GuardOutcome::pass("ENTRY_COOLDOWN", "No active cooldown", json!({})),
        });
    }

    if input.funding_check_enabled {
        outcomes.push(match input.funding_rate {
            Some(rate) if rate.abs() > input.funding_rate_threshold => GuardOutcome::fail(
                "FUNDING_RATE_SANITY",
                format!("Funding rate {rate:.4} exceeds threshold {:.4}", input.funding_rate_threshold),
                json!({ "funding_rate": rate }),
            ),
            _ => GuardOutcome::pass("FUNDING_RATE_SANITY", "Funding rate within bounds", json!({})),
        });
    }

    if input.staleness_check_enabled {
        outcomes.push(if input.data_age_seconds > input.stale_threshold_seconds {
            GuardOutcome::fail(
                "STALE_DATA",
                format!(
                    "Market data is {}s old, exceeds staleness threshold of {}s",
                    input.data_age_seconds, input.stale_threshold_seconds
                ),
                json!({ "data_age_seconds": input.data_age_seconds }),
            )
        } else {
            GuardOutcome::pass("STALE_DATA", "Market data is fresh", json!({}))
        });
    }

    outcomes
}
