//! Hand-Span Trailing Stop (C13).
//!
//! Pure, deterministic, monotonic stop adjuster. `span` is the absolute
//! price distance from entry to the initial stop — the unit every
//! adjustment is expressed in. Given the same `TrailingStopState` and the
//! same `current_price`, `compute_adjustment` always returns the same
//! `StopAdjustment` — no clock reads feed the arithmetic, only the
//! timestamp stamped onto the result.
//!
//! This crate never touches a store. Idempotency (§4.13: "before
//! persisting, the store is queried; if the token already exists, the
//! operation is a no-op") is the caller's I/O boundary — `compute_adjustment`
//! takes `token_already_used` as a plain bool so the pure calculator never
//! suspends (spec §5).

use serde_json::json;
use tcore_clock::Clock;
use tcore_schemas::{AdjustmentReason, Micros, StopAdjustment, TrailingSide, TrailingStopState};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakEvenParams {
    pub trading_fee_pct: f64,
    pub slippage_buffer_pct: f64,
}

impl Default for BreakEvenParams {
    fn default() -> Self {
        BreakEvenParams { trading_fee_pct: 0.1, slippage_buffer_pct: 0.05 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// `span = |entry_price - initial_stop|` must be strictly positive.
    NonPositiveSpan,
    /// `initial_stop` is not on the correct side of `entry_price` for `side`.
    InitialStopWrongSide,
    /// `current_stop` has already moved past what the monotonic rule
    /// allows — this indicates a store bug upstream; callers MUST stop
    /// processing and surface the error rather than overwrite.
    MonotonicityAlreadyViolated,
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::NonPositiveSpan => write!(f, "span must be strictly positive"),
            StateError::InitialStopWrongSide => write!(f, "initial_stop is on the wrong side of entry_price"),
            StateError::MonotonicityAlreadyViolated => {
                write!(f, "current_stop already violates the monotonic trailing-stop invariant")
            }
        }
    }
}

impl std::error::Error for StateError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustmentOutcome {
    /// A new `StopAdjustment` was computed and should be persisted.
    Applied(Box<StopAdjustment>),
    /// `adjustment_token` was already persisted; no computation performed,
    /// nothing should be written.
    Duplicate { adjustment_token: String },
}

/// `span = |entry_price - initial_stop|`. Callers build this once from the
/// persisted state; `validate_state` must pass before trusting it.
pub fn span(state: &TrailingStopState) -> Micros {
    Micros::from_f64((state.entry_price.to_f64() - state.initial_stop.to_f64()).abs())
}

/// `profit_distance` clamped at 0, then `spans_in_profit = floor(profit_distance / span)`.
pub fn spans_in_profit(state: &TrailingStopState) -> i64 {
    let s = span(state).to_f64();
    if s <= 0.0 {
        return 0;
    }
    let profit_distance = match state.side {
        TrailingSide::Long => state.current_price.to_f64() - state.entry_price.to_f64(),
        TrailingSide::Short => state.entry_price.to_f64() - state.current_price.to_f64(),
    }
    .max(0.0);
    (profit_distance / s).floor() as i64
}

/// Validates the invariants in spec §3/§4.13 hold for `state` before any
/// adjustment is attempted. MUST be called (and MUST pass) before
/// `compute_adjustment` is trusted; a failure here means upstream state is
/// already corrupt and processing must stop.
pub fn validate_state(state: &TrailingStopState) -> Result<(), StateError> {
    let entry = state.entry_price.to_f64();
    let initial = state.initial_stop.to_f64();
    let current = state.current_stop.to_f64();

    if (entry - initial).abs() <= 0.0 {
        return Err(StateError::NonPositiveSpan);
    }

    match state.side {
        TrailingSide::Long => {
            if initial >= entry {
                return Err(StateError::InitialStopWrongSide);
            }
            if current < initial {
                return Err(StateError::MonotonicityAlreadyViolated);
            }
        }
        TrailingSide::Short => {
            if initial <= entry {
                return Err(StateError::InitialStopWrongSide);
            }
            if current > initial {
                return Err(StateError::MonotonicityAlreadyViolated);
            }
        }
    }

    Ok(())
}

/// Compute (but do not persist) the adjustment for `state` at its current
/// `current_price`. `token_already_used` is the result of the caller's
/// idempotency lookup; when true this is a no-op regardless of what the
/// arithmetic would otherwise produce. `adjustment_token` defaults to
/// `tcore_clock::default_adjustment_token` but callers running a replay
/// should pass a deterministic value instead (spec §9 Open Questions).
pub fn compute_adjustment(
    state: &TrailingStopState,
    token_already_used: bool,
    adjustment_token: String,
    clock: &dyn Clock,
    params: BreakEvenParams,
) -> Result<AdjustmentOutcome, StateError> {
    validate_state(state)?;

    if token_already_used {
        return Ok(AdjustmentOutcome::Duplicate { adjustment_token });
    }

    let spans = spans_in_profit(state);
    let entry = state.entry_price.to_f64();
    let span_v = span(state).to_f64();
    let current_stop = state.current_stop.to_f64();

    let (reason, candidate, step_index) = if spans <= 0 {
        (AdjustmentReason::NoAdjustment, current_stop, 0)
    } else if spans == 1 {
        let fee_total_pct = params.trading_fee_pct + params.slippage_buffer_pct;
        let candidate = match state.side {
            TrailingSide::Long => entry * (1.0 + fee_total_pct / 100.0),
            TrailingSide::Short => entry * (1.0 - fee_total_pct / 100.0),
        };
        (AdjustmentReason::BreakEven, candidate, 1)
    } else {
        let candidate = match state.side {
            TrailingSide::Long => entry + (spans - 1) as f64 * span_v,
            TrailingSide::Short => entry - (spans - 1) as f64 * span_v,
        };
        (AdjustmentReason::Trailing, candidate, spans)
    };

    // Monotonic invariant: the stop never loosens.
    let new_stop_raw = match state.side {
        TrailingSide::Long => current_stop.max(candidate),
        TrailingSide::Short => current_stop.min(candidate),
    };
    let new_stop = Micros::from_f64(new_stop_raw);

    let adjustment = StopAdjustment {
        position_id: state.position_id,
        old_stop: state.current_stop,
        new_stop,
        reason,
        adjustment_token,
        timestamp: clock.now_millis(),
        current_price: state.current_price,
        spans_crossed: spans,
        step_index,
        metadata: json!({
            "span": span_v,
            "entry_price": entry,
            "candidate_before_monotonic_clamp": candidate,
        }),
    };

    Ok(AdjustmentOutcome::Applied(Box::new(adjustment)))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchAdjustmentSummary {
    pub adjusted: u32,
    pub no_change: u32,
    pub duplicate: u32,
    pub errors: u32,
}

/// One item submitted to `adjust_all`: state, whether its token was already
/// seen, and the token to stamp on the result.
pub struct AdjustmentRequest {
    pub state: TrailingStopState,
    pub token_already_used: bool,
    pub adjustment_token: String,
}

/// Adjust every eligible position independently; a failure on one position
/// never aborts the batch (spec §4.13: "Per-position invocations are
/// independent"). Recovered from `AdjustAllTrailingStopsUseCase`'s batch
/// summary counts.
pub fn adjust_all(
    requests: Vec<AdjustmentRequest>,
    clock: &dyn Clock,
    params: BreakEvenParams,
) -> (Vec<Result<AdjustmentOutcome, StateError>>, BatchAdjustmentSummary) {
    let mut summary = BatchAdjustmentSummary::default();
    let mut results = Vec::with_capacity(requests.len());

    for req in requests {
        let outcome = compute_adjustment(&req.state, req.token_already_used, req.adjustment_token, clock, params);
        match &outcome {
            Ok(AdjustmentOutcome::Applied(adj)) if adj.reason == AdjustmentReason::NoAdjustment => {
                summary.no_change += 1;
            }
            Ok(AdjustmentOutcome::Applied(_)) => summary.adjusted += 1,
            Ok(AdjustmentOutcome::Duplicate { .. }) => summary.duplicate += 1,
            Err(e) => {
                tracing::warn!(position_id = req.state.position_id, error = %e, "trailing-stop adjustment failed; continuing batch");
                summary.errors += 1;
            }
        }
        results.push(outcome);
    }

    (results, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tcore_clock::StepClock;
    use tcore_schemas::Decimal8;

    fn clock() -> StepClock {
        StepClock::new(Utc::now(), chrono::Duration::seconds(1))
    }

    fn long_state(current_price: f64, current_stop: f64) -> TrailingStopState {
        TrailingStopState {
            position_id: 1,
            side: TrailingSide::Long,
            entry_price: Micros::from_f64(50_000.0),
            initial_stop: Micros::from_f64(49_000.0),
            current_stop: Micros::from_f64(current_stop),
            current_price: Micros::from_f64(current_price),
            quantity: Decimal8::from_f64(0.01),
        }
    }

    #[test]
    fn no_profit_yields_no_adjustment() {
        let state = long_state(50_000.0, 49_000.0);
        let outcome = compute_adjustment(&state, false, "t0".to_string(), &clock(), BreakEvenParams::default()).unwrap();
        match outcome {
            AdjustmentOutcome::Applied(adj) => {
                assert_eq!(adj.reason, AdjustmentReason::NoAdjustment);
                assert_eq!(adj.new_stop, state.current_stop);
            }
            _ => panic!("expected Applied"),
        }
    }

    #[test]
    fn scenario_5_long_at_3_spans() {
        let params = BreakEvenParams::default();

        // Tick 1: price=51000 -> spans=1 -> break-even 50075.
        let s1 = long_state(51_000.0, 49_000.0);
        let a1 = compute_adjustment(&s1, false, "tok1".to_string(), &clock(), params).unwrap();
        let new_stop_1 = match a1 {
            AdjustmentOutcome::Applied(adj) => {
                assert_eq!(adj.reason, AdjustmentReason::BreakEven);
                assert!((adj.new_stop.to_f64() - 50_075.0).abs() < 1e-6);
                adj.new_stop
            }
            _ => panic!(),
        };

        // Tick 2: price=52000 -> spans=2 -> candidate 51000, monotonic -> 51000.
        let s2 = long_state(52_000.0, new_stop_1.to_f64());
        let a2 = compute_adjustment(&s2, false, "tok2".to_string(), &clock(), params).unwrap();
        let new_stop_2 = match a2 {
            AdjustmentOutcome::Applied(adj) => {
                assert_eq!(adj.reason, AdjustmentReason::Trailing);
                assert!((adj.new_stop.to_f64() - 51_000.0).abs() < 1e-6);
                adj.new_stop
            }
            _ => panic!(),
        };

        // Tick 3: price=53500 -> spans=3 -> candidate 52000, monotonic -> 52000.
        let s3 = long_state(53_500.0, new_stop_2.to_f64());
        let a3 = compute_adjustment(&s3, false, "tok3".to_string(), &clock(), params).unwrap();
        match a3 {
            AdjustmentOutcome::Applied(adj) => {
                assert_eq!(adj.reason, AdjustmentReason::Trailing);
                assert!((adj.new_stop.to_f64() - 52_000.0).abs() < 1e-6);
            }
            _ => panic!(),
        }

        // Replaying tick 2's token is a no-op.
        let replay = compute_adjustment(&s2, true, "tok2".to_string(), &clock(), params).unwrap();
        assert_eq!(replay, AdjustmentOutcome::Duplicate { adjustment_token: "tok2".to_string() });
    }

    #[test]
    fn short_side_mirrors_long() {
        let state = TrailingStopState {
            position_id: 2,
            side: TrailingSide::Short,
            entry_price: Micros::from_f64(50_000.0),
            initial_stop: Micros::from_f64(51_000.0),
            current_stop: Micros::from_f64(51_000.0),
            current_price: Micros::from_f64(48_000.0),
            quantity: Decimal8::from_f64(0.01),
        };
        // profit_distance = 2000, span=1000 -> spans=2 -> candidate = 50000-1*1000=49000
        let outcome = compute_adjustment(&state, false, "s1".to_string(), &clock(), BreakEvenParams::default()).unwrap();
        match outcome {
            AdjustmentOutcome::Applied(adj) => {
                assert_eq!(adj.reason, AdjustmentReason::Trailing);
                assert!((adj.new_stop.to_f64() - 49_000.0).abs() < 1e-6);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn monotonicity_already_violated_is_rejected() {
        // current_stop below initial_stop for LONG is impossible under correct
        // operation; validate_state must catch it rather than silently overwrite.
        let state = long_state(50_000.0, 48_000.0);
        assert_eq!(validate_state(&state), Err(StateError::MonotonicityAlreadyViolated));
    }

    #[test]
    fn zero_span_is_rejected() {
        let mut state = long_state(50_000.0, 49_000.0);
        state.initial_stop = state.entry_price;
        assert_eq!(validate_state(&state), Err(StateError::NonPositiveSpan));
    }

    #[test]
    fn batch_adjustment_is_independent_per_position() {
        let good = long_state(51_000.0, 49_000.0);
        let mut bad = long_state(50_000.0, 49_000.0);
        bad.initial_stop = bad.entry_price; // corrupt: zero span

        let requests = vec![
            AdjustmentRequest { state: good, token_already_used: false, adjustment_token: "a".to_string() },
            AdjustmentRequest { state: bad, token_already_used: false, adjustment_token: "b".to_string() },
        ];
        let (results, summary) = adjust_all(requests, &clock(), BreakEvenParams::default());
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(summary.adjusted, 1);
        assert_eq!(summary.errors, 1);
    }
}
