//! Declares which config pointers each execution mode actually reads, so
//! `scenario_unused_keys_warn_or_fail` can flag dead config. Mirrors C11's
//! `ExecutionMode` (spec §4.11) rather than introducing a third mode.

pub enum RunMode {
    DryRun,
    Live,
}

/// Alias kept for call sites that think in terms of "which config mode is
/// this key consumed in" rather than "which mode is the engine running in" —
/// the two are the same enum.
pub type ConfigMode = RunMode;

pub fn consumed_pointers(mode: RunMode) -> &'static [&'static str] {
    match mode {
        RunMode::DryRun => DRY_RUN,
        RunMode::Live => LIVE,
    }
}

static DRY_RUN: &[&str] = &[
    "/exchange/use_testnet",
    "/exchange/request_timeout_ms",
    "/risk/max_risk_percent",
    "/risk/max_drawdown_percent",
    "/risk/entry_gate",
];

static LIVE: &[&str] = &[
    "/exchange/use_testnet",
    "/exchange/request_timeout_ms",
    "/exchange/keys_env",
    "/risk/max_risk_percent",
    "/risk/max_drawdown_percent",
    "/risk/entry_gate",
    "/trading_enabled",
];
