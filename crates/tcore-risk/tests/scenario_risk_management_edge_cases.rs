//! Integration coverage for risk-percent edge cases (spec §4.1/§4.8): zero
//! capital and degenerate stop distances must never divide by zero, panic,
//! or silently let an unbounded trade through.

use tcore_risk::guards::{check_risk_management, RiskManagementInput, DEFAULT_MAX_RISK_PERCENT};
use tcore_schemas::{Decimal8, Micros, Side};

#[test]
fn zero_capital_does_not_panic_and_reports_zero_risk_percent() {
    let outcome = check_risk_management(&RiskManagementInput {
        entry_price: Micros::from_f64(100.0),
        stop_price: Some(Micros::from_f64(95.0)),
        side: Side::Buy,
        capital: Micros::ZERO,
        quantity: Decimal8::from_f64(1.0),
        max_risk_percent: DEFAULT_MAX_RISK_PERCENT,
    });
    assert!(outcome.passed, "zero capital must not be treated as infinite risk");
    assert_eq!(
        outcome.details.get("risk_percent").and_then(|v| v.as_f64()),
        Some(0.0)
    );
}

#[test]
fn wrong_side_stop_is_rejected_before_risk_math_runs() {
    let outcome = check_risk_management(&RiskManagementInput {
        entry_price: Micros::from_f64(100.0),
        stop_price: Some(Micros::from_f64(100.0)),
        side: Side::Buy,
        capital: Micros::from_f64(1_000.0),
        quantity: Decimal8::from_f64(1.0),
        max_risk_percent: DEFAULT_MAX_RISK_PERCENT,
    });
    assert!(!outcome.passed, "a stop equal to entry is not on the correct side");
}

#[test]
fn huge_quantity_against_small_capital_is_rejected_with_a_sized_recommendation() {
    let outcome = check_risk_management(&RiskManagementInput {
        entry_price: Micros::from_f64(100.0),
        stop_price: Some(Micros::from_f64(99.0)),
        side: Side::Buy,
        capital: Micros::from_f64(100.0),
        quantity: Decimal8::from_f64(1_000_000.0),
        max_risk_percent: DEFAULT_MAX_RISK_PERCENT,
    });
    assert!(!outcome.passed);
    let recommendation = outcome
        .details
        .get("recommendation")
        .and_then(|v| v.as_f64())
        .expect("a non-zero stop distance must produce a sized recommendation");
    assert!(recommendation > 0.0 && recommendation.is_finite());
}

#[test]
fn sell_side_stop_above_entry_is_valid() {
    let outcome = check_risk_management(&RiskManagementInput {
        entry_price: Micros::from_f64(100.0),
        stop_price: Some(Micros::from_f64(105.0)),
        side: Side::Sell,
        capital: Micros::from_f64(10_000.0),
        quantity: Decimal8::from_f64(1.0),
        max_risk_percent: DEFAULT_MAX_RISK_PERCENT,
    });
    assert!(outcome.passed);
}

#[test]
fn sell_side_stop_below_entry_is_rejected() {
    let outcome = check_risk_management(&RiskManagementInput {
        entry_price: Micros::from_f64(100.0),
        stop_price: Some(Micros::from_f64(95.0)),
        side: Side::Sell,
        capital: Micros::from_f64(10_000.0),
        quantity: Decimal8::from_f64(1.0),
        max_risk_percent: DEFAULT_MAX_RISK_PERCENT,
    });
    assert!(!outcome.passed);
}
