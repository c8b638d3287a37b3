//! Policy State (C9).
//!
//! `PolicyState` (spec §3) is plain data owned by `tcore-schemas`; this
//! crate owns the transitions over it. `ACTIVE -> PAUSED` happens
//! automatically on a drawdown breach or manually; `ACTIVE -> SUSPENDED` is
//! admin-only; both `PAUSED` and `SUSPENDED` return to `ACTIVE` only
//! through an explicit resume call. Every mutation here is a single
//! function over `&mut PolicyState` — callers own persistence and the
//! transaction boundary around it.

use tcore_clock::Clock;
use tcore_schemas::{Micros, PolicyState, PolicyStatus};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransitionError {
    NotActive,
    NotPausedOrSuspended,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionError::NotActive => write!(f, "policy is not ACTIVE"),
            TransitionError::NotPausedOrSuspended => write!(f, "policy is neither PAUSED nor SUSPENDED"),
        }
    }
}

impl std::error::Error for TransitionError {}

/// Updates `current_capital`/`realized_pnl`/trade counters after a trade
/// closes, and auto-pauses on a drawdown breach within the same
/// transaction so no intermediate state is ever observable as ACTIVE while
/// in breach.
pub fn record_trade(state: &mut PolicyState, pnl: Micros, is_winner: bool, clock: &dyn Clock) {
    state.trade_count += 1;
    if is_winner {
        state.winning_trades += 1;
    }
    state.realized_pnl = state.realized_pnl.saturating_add(pnl);
    state.current_capital = state.current_capital.saturating_add(pnl);
    apply_breach_check(state, clock);
}

/// Applies the same breach check record_trade does, but against
/// mark-to-market unrealized P&L rather than a realized close. Called
/// periodically from the live position tracker.
pub fn update_unrealized_pnl(state: &mut PolicyState, unrealized_pnl: Micros, clock: &dyn Clock) {
    state.unrealized_pnl = unrealized_pnl;
    apply_breach_check(state, clock);
}

fn apply_breach_check(state: &mut PolicyState, clock: &dyn Clock) {
    if state.status != PolicyStatus::Active {
        return;
    }
    let effective_capital = state.current_capital.saturating_add(state.unrealized_pnl);
    let start = state.starting_capital.to_f64();
    if start == 0.0 {
        return;
    }
    let drawdown_percent = (start - effective_capital.to_f64()) / start * 100.0;
    if drawdown_percent >= state.max_drawdown_percent {
        state.status = PolicyStatus::Paused;
        state.paused_at = Some(clock.now_millis());
        state.pause_reason = Some(format!(
            "Monthly drawdown {drawdown_percent:.2}% reached limit {:.2}%",
            state.max_drawdown_percent
        ));
    }
}

pub fn pause_manual(state: &mut PolicyState, reason: String, clock: &dyn Clock) -> Result<(), TransitionError> {
    if state.status != PolicyStatus::Active {
        return Err(TransitionError::NotActive);
    }
    state.status = PolicyStatus::Paused;
    state.paused_at = Some(clock.now_millis());
    state.pause_reason = Some(reason);
    Ok(())
}

pub fn suspend_admin(state: &mut PolicyState, reason: String, clock: &dyn Clock) -> Result<(), TransitionError> {
    if state.status != PolicyStatus::Active {
        return Err(TransitionError::NotActive);
    }
    state.status = PolicyStatus::Suspended;
    state.paused_at = Some(clock.now_millis());
    state.pause_reason = Some(reason);
    Ok(())
}

/// Resumes from either PAUSED (manual) or SUSPENDED (admin) back to
/// ACTIVE, clearing the pause marker.
pub fn resume(state: &mut PolicyState) -> Result<(), TransitionError> {
    if !matches!(state.status, PolicyStatus::Paused | PolicyStatus::Suspended) {
        return Err(TransitionError::NotPausedOrSuspended);
    }
    state.status = PolicyStatus::Active;
    state.paused_at = None;
    state.pause_reason = None;
    Ok(())
}
