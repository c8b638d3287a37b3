//! Risk Guards (C7) and Validation Framework (C8).
//!
//! Every guard and validator here is pure: given the same input struct it
//! always returns the same verdict, with no clock reads and no I/O. Callers
//! (tcore-intent, tcore-execution) own wiring live data into these inputs.

pub mod guards;
pub mod validation;

pub use guards::{
    check_entry_gate, check_monthly_drawdown, check_risk_management, check_trade_intent,
    EntryGateInput, GuardOutcome, MonthlyDrawdownInput, RiskManagementInput, TradeIntentInput,
    DEFAULT_COOLDOWN_SECONDS, DEFAULT_FUNDING_RATE_THRESHOLD, DEFAULT_MAX_DRAWDOWN_PERCENT,
    DEFAULT_MAX_RISK_PERCENT, DEFAULT_STALE_DATA_SECONDS,
};
pub use validation::{PlanContext, ValidatePlanUseCase, ValidationIssue, ValidationReport};
