//! Integration coverage for the entry gate (spec §4.10): a recent stop-out,
//! an extreme funding rate, or stale market data each independently block a
//! new entry while their toggle is enabled.

use tcore_risk::guards::{check_entry_gate, EntryGateInput};

#[test]
fn fresh_entry_with_no_history_passes_all_three_checks() {
    let outcomes = check_entry_gate(&EntryGateInput::default());
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.passed));
}

#[test]
fn recent_stop_out_blocks_new_order() {
    let input = EntryGateInput {
        seconds_since_last_stop_out: Some(60),
        cooldown_seconds: 900,
        ..Default::default()
    };
    let outcomes = check_entry_gate(&input);
    let cooldown = outcomes.iter().find(|o| o.name == "ENTRY_COOLDOWN").unwrap();
    assert!(!cooldown.passed, "order within the cooldown window must be rejected");
}

#[test]
fn stop_out_older_than_cooldown_window_is_allowed() {
    let input = EntryGateInput {
        seconds_since_last_stop_out: Some(1_000),
        cooldown_seconds: 900,
        ..Default::default()
    };
    let outcomes = check_entry_gate(&input);
    let cooldown = outcomes.iter().find(|o| o.name == "ENTRY_COOLDOWN").unwrap();
    assert!(cooldown.passed);
}

#[test]
fn disabled_cooldown_check_is_skipped_entirely() {
    let input = EntryGateInput {
        cooldown_enabled: false,
        seconds_since_last_stop_out: Some(1),
        ..Default::default()
    };
    let outcomes = check_entry_gate(&input);
    assert!(outcomes.iter().all(|o| o.name != "ENTRY_COOLDOWN"));
}

#[test]
fn extreme_funding_rate_blocks_entry() {
    let input = EntryGateInput {
        funding_rate: Some(0.05),
        funding_rate_threshold: 0.01,
        ..Default::default()
    };
    let outcomes = check_entry_gate(&input);
    let funding = outcomes.iter().find(|o| o.name == "FUNDING_RATE_SANITY").unwrap();
    assert!(!funding.passed);
}

#[test]
fn stale_market_data_blocks_entry() {
    let input = EntryGateInput {
        data_age_seconds: 600,
        stale_threshold_seconds: 300,
        ..Default::default()
    };
    let outcomes = check_entry_gate(&input);
    let staleness = outcomes.iter().find(|o| o.name == "STALE_DATA").unwrap();
    assert!(!staleness.passed);
}
