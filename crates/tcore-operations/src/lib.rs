//! Operation Lifecycle (C12).
//!
//! `Operation` (spec §3) is plain data owned by `tcore-schemas`; this crate
//! owns the one state transition that matters operationally — cancellation
//! (Gate 6/7) — plus the read-side projection that joins spot operations
//! and isolated-margin positions into a single "active positions" view.
//!
//! Cancellation is idempotent by construction: cancelling an
//! already-CANCELLED operation is success-no-op, never an error. Tenant
//! mismatch is the caller's concern (it resolves to the same 404 a missing
//! row would, per spec §4.12, so existence is never leaked across tenants)
//! — this crate only sees operations the caller has already tenant-filtered.

use serde::{Deserialize, Serialize};
use tcore_schemas::{Decimal8, MarginPosition, Micros, Operation, OperationStatus, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The operation transitioned PLANNED|ACTIVE -> CANCELLED.
    Cancelled,
    /// The operation was already CANCELLED; nothing changed.
    AlreadyCancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelConflict {
    pub current_status: OperationStatus,
}

impl std::fmt::Display for CancelConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot cancel operation in status {:?}", self.current_status)
    }
}

impl std::error::Error for CancelConflict {}

/// Cancel `op` in place. Idempotent: a CANCELLED operation returns
/// `Ok(AlreadyCancelled)` with the entity left untouched. Any status other
/// than PLANNED/ACTIVE/CANCELLED is a conflict the caller should surface as
/// 409 with the current status (spec §4.12, §7).
pub fn cancel_operation(op: &mut Operation) -> Result<CancelOutcome, CancelConflict> {
    match op.status {
        OperationStatus::Cancelled => Ok(CancelOutcome::AlreadyCancelled),
        OperationStatus::Planned | OperationStatus::Active => {
            op.status = OperationStatus::Cancelled;
            Ok(CancelOutcome::Cancelled)
        }
        other => Err(CancelConflict { current_status: other }),
    }
}

/// Unified projection row for the `/portfolio/positions` surface. A spot
/// `Operation` and an aggregated `MarginPosition` group both render through
/// this shape; `margin_level` is `None` for spot rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionCard {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal8,
    pub entry_price: Micros,
    pub current_price: Micros,
    pub stop_price: Micros,
    pub target_price: Option<Micros>,
    pub unrealized_pnl: Micros,
    pub distance_to_stop_pct: f64,
    pub distance_to_target_pct: Option<f64>,
    pub margin_level: Option<f64>,
    pub is_margin: bool,
}

fn unrealized_pnl(side: Side, qty: f64, entry: f64, current: f64) -> f64 {
    match side {
        Side::Buy => (current - entry) * qty,
        Side::Sell => (entry - current) * qty,
    }
}

/// Signed percentage distance from `current` to `target`, positive meaning
/// `current` still has that much room left to travel in the favorable
/// direction for `side`.
fn distance_pct(side: Side, current: f64, target: f64) -> f64 {
    if current == 0.0 {
        return 0.0;
    }
    match side {
        Side::Buy => (target - current) / current * 100.0,
        Side::Sell => (current - target) / current * 100.0,
    }
}

/// Build the card for one spot `Operation` at `current_price`. Only
/// ACTIVE/PLANNED operations are meaningful here; callers filter terminal
/// statuses out before projecting.
pub fn spot_position_card(op: &Operation, current_price: Micros) -> PositionCard {
    let qty = op.filled_quantity.to_f64();
    let entry = op.weighted_entry_price.to_f64();
    let cur = current_price.to_f64();

    PositionCard {
        symbol: op.symbol.clone(),
        side: op.side,
        quantity: op.filled_quantity,
        entry_price: op.weighted_entry_price,
        current_price,
        stop_price: op.stop_price,
        target_price: op.target_price,
        unrealized_pnl: Micros::from_f64(unrealized_pnl(op.side, qty, entry, cur)),
        distance_to_stop_pct: distance_pct(op.side, cur, op.stop_price.to_f64()).abs(),
        distance_to_target_pct: op.target_price.map(|t| distance_pct(op.side, cur, t.to_f64())),
        margin_level: None,
        is_margin: false,
    }
}

/// Aggregate multiple open `MarginPosition`s for the same symbol into one
/// card: net quantity, weighted entry, the most conservative (tightest)
/// stop, and current margin level. Spec §3: "Multiple open margin
/// positions for the same symbol are aggregated for display."
pub fn aggregate_margin_positions(positions: &[MarginPosition], current_price: Micros) -> Option<PositionCard> {
    let open: Vec<&MarginPosition> = positions.iter().filter(|p| p.is_open()).collect();
    if open.is_empty() {
        return None;
    }

    let symbol = open[0].symbol.clone();
    let side = open[0].side;
    let total_qty: f64 = open.iter().map(|p| p.quantity.to_f64()).sum();
    let weighted_entry = if total_qty > 0.0 {
        open.iter().map(|p| p.quantity.to_f64() * p.entry_price.to_f64()).sum::<f64>() / total_qty
    } else {
        0.0
    };

    // "Most conservative" stop: for LONG the highest (tightest) stop; for
    // SHORT the lowest.
    let conservative_stop = match side {
        Side::Buy => open
            .iter()
            .map(|p| p.stop_price.to_f64())
            .fold(f64::MIN, f64::max),
        Side::Sell => open
            .iter()
            .map(|p| p.stop_price.to_f64())
            .fold(f64::MAX, f64::min),
    };

    let margin_level = open
        .iter()
        .filter_map(|p| p.margin_level)
        .fold(f64::MAX, f64::min);
    let margin_level = if margin_level == f64::MAX { None } else { Some(margin_level) };

    let cur = current_price.to_f64();
    Some(PositionCard {
        symbol,
        side,
        quantity: Decimal8::from_f64(total_qty),
        entry_price: Micros::from_f64(weighted_entry),
        current_price,
        stop_price: Micros::from_f64(conservative_stop),
        target_price: None,
        unrealized_pnl: Micros::from_f64(unrealized_pnl(side, total_qty, weighted_entry, cur)),
        distance_to_stop_pct: distance_pct(side, cur, conservative_stop).abs(),
        distance_to_target_pct: None,
        margin_level,
        is_margin: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn base_op(status: OperationStatus) -> Operation {
        Operation {
            id: 1,
            tenant_id: 7,
            symbol: "BTCUSDC".to_string(),
            strategy_id: 1,
            side: Side::Buy,
            status,
            stop_price: Micros::from_f64(49_000.0),
            target_price: Some(Micros::from_f64(52_000.0)),
            entry_order_id: Some("o1".to_string()),
            exit_order_id: None,
            weighted_entry_price: Micros::from_f64(50_000.0),
            filled_quantity: Decimal8::from_f64(0.01),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn cancel_active_transitions_to_cancelled() {
        let mut op = base_op(OperationStatus::Active);
        let outcome = cancel_operation(&mut op).unwrap();
        assert_eq!(outcome, CancelOutcome::Cancelled);
        assert_eq!(op.status, OperationStatus::Cancelled);
    }

    #[test]
    fn cancel_already_cancelled_is_noop_success() {
        let mut op = base_op(OperationStatus::Cancelled);
        let outcome = cancel_operation(&mut op).unwrap();
        assert_eq!(outcome, CancelOutcome::AlreadyCancelled);
        assert_eq!(op.status, OperationStatus::Cancelled);
    }

    #[test]
    fn cancel_closed_is_conflict() {
        let mut op = base_op(OperationStatus::Closed);
        let err = cancel_operation(&mut op).unwrap_err();
        assert_eq!(err.current_status, OperationStatus::Closed);
    }

    #[test]
    fn spot_card_computes_unrealized_pnl_for_long() {
        let op = base_op(OperationStatus::Active);
        let card = spot_position_card(&op, Micros::from_f64(51_000.0));
        assert!((card.unrealized_pnl.to_f64() - 10.0).abs() < 1e-6);
        assert!(card.distance_to_stop_pct > 0.0);
    }

    #[test]
    fn aggregate_margin_picks_tightest_stop_for_long() {
        let positions = vec![
            MarginPosition {
                id: 1, tenant_id: 7, symbol: "BTCUSDC".to_string(), side: Side::Buy, leverage: 3.0,
                entry_price: Micros::from_f64(50_000.0), quantity: Decimal8::from_f64(0.01),
                current_price: Micros::from_f64(50_500.0), margin_level: Some(2.5),
                risk_amount: Micros::from_f64(10.0), risk_percent: 1.0,
                stop_price: Micros::from_f64(49_000.0), status: tcore_schemas::MarginPositionStatus::Open,
            },
            MarginPosition {
                id: 2, tenant_id: 7, symbol: "BTCUSDC".to_string(), side: Side::Buy, leverage: 3.0,
                entry_price: Micros::from_f64(50_200.0), quantity: Decimal8::from_f64(0.02),
                current_price: Micros::from_f64(50_500.0), margin_level: Some(2.2),
                risk_amount: Micros::from_f64(10.0), risk_percent: 1.0,
                stop_price: Micros::from_f64(49_500.0), status: tcore_schemas::MarginPositionStatus::Open,
            },
        ];
        let card = aggregate_margin_positions(&positions, Micros::from_f64(50_500.0)).unwrap();
        assert!((card.stop_price.to_f64() - 49_500.0).abs() < 1e-6);
        assert!((card.quantity.to_f64() - 0.03).abs() < 1e-8);
        assert_eq!(card.margin_level, Some(2.2));
    }

    #[test]
    fn aggregate_margin_empty_when_all_closed() {
        let positions = vec![MarginPosition {
            id: 1, tenant_id: 7, symbol: "BTCUSDC".to_string(), side: Side::Buy, leverage: 1.0,
            entry_price: Micros::from_f64(50_000.0), quantity: Decimal8::from_f64(0.01),
            current_price: Micros::from_f64(50_000.0), margin_level: None,
            risk_amount: Micros::from_f64(10.0), risk_percent: 1.0,
            stop_price: Micros::from_f64(49_000.0), status: tcore_schemas::MarginPositionStatus::Closed,
        }];
        assert!(aggregate_margin_positions(&positions, Micros::from_f64(50_000.0)).is_none());
    }
}
