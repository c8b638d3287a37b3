//! Integration coverage for trade-intent confirmation (spec §4.1): LIVE mode
//! demands a named strategy and explicit confirmation; DRY_RUN relaxes both
//! but an emotional-check failure is never relaxed in either mode.

use tcore_risk::guards::{check_trade_intent, TradeIntentInput};
use tcore_schemas::ExecutionMode;

#[test]
fn dry_run_trade_needs_no_confirmation() {
    let outcome = check_trade_intent(&TradeIntentInput {
        mode: ExecutionMode::DryRun,
        strategy_name: None,
        confirmed: false,
        emotional_check_passed: None,
    });
    assert!(outcome.passed);
}

#[test]
fn live_trade_without_strategy_name_is_rejected() {
    let outcome = check_trade_intent(&TradeIntentInput {
        mode: ExecutionMode::Live,
        strategy_name: None,
        confirmed: true,
        emotional_check_passed: None,
    });
    assert!(!outcome.passed);
}

#[test]
fn live_trade_without_explicit_confirmation_is_rejected() {
    let outcome = check_trade_intent(&TradeIntentInput {
        mode: ExecutionMode::Live,
        strategy_name: Some("hand-span-breakout".to_string()),
        confirmed: false,
        emotional_check_passed: None,
    });
    assert!(!outcome.passed);
}

#[test]
fn live_trade_with_strategy_and_confirmation_passes() {
    let outcome = check_trade_intent(&TradeIntentInput {
        mode: ExecutionMode::Live,
        strategy_name: Some("hand-span-breakout".to_string()),
        confirmed: true,
        emotional_check_passed: None,
    });
    assert!(outcome.passed);
}

#[test]
fn failed_emotional_check_blocks_trade_even_in_dry_run() {
    let outcome = check_trade_intent(&TradeIntentInput {
        mode: ExecutionMode::DryRun,
        strategy_name: None,
        confirmed: false,
        emotional_check_passed: Some(false),
    });
    assert!(!outcome.passed, "a failed emotional check must never be relaxed by mode");
}

#[test]
fn passed_emotional_check_does_not_itself_satisfy_live_requirements() {
    let outcome = check_trade_intent(&TradeIntentInput {
        mode: ExecutionMode::Live,
        strategy_name: None,
        confirmed: false,
        emotional_check_passed: Some(true),
    });
    assert!(!outcome.passed, "LIVE still needs strategy_name and confirmed independently");
}
