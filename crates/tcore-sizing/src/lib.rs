//! Position Sizing (C5).
//!
//! Pure function: capital, entry, stop -> quantity enforcing the 1% risk
//! rule and a hard 50%-of-capital notional cap. No I/O, no clock.

use serde::{Deserialize, Serialize};
use tcore_schemas::{Decimal8, Micros};

pub const DEFAULT_MAX_RISK_PERCENT: f64 = 1.0;
/// No position may exceed this fraction of capital regardless of stop
/// distance (spec §4.5).
const MAX_CAPITAL_FRACTION: f64 = 0.50;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizingResult {
    pub quantity: Decimal8,
    pub position_value: Micros,
    pub risk_amount: Micros,
    pub risk_percent: f64,
    pub stop_distance: Micros,
    pub stop_distance_pct: f64,
    pub is_capped: bool,
}

impl SizingResult {
    pub fn is_fail(&self) -> bool {
        self.quantity.is_zero()
    }
}

/// The uncapped risk-based quantity: `risk_amount / stop_distance`, at 1x
/// leverage. Exposed so the margin variant (C14) can apply its own
/// leverage multiplier before the 50%-of-capital cap is applied once, at
/// the end, rather than inheriting a cap already baked in at 1x.
pub fn raw_quantity(capital: Micros, entry: Micros, stop: Micros, max_risk_pct: f64) -> Decimal8 {
    let risk_amount = capital.to_f64() * max_risk_pct / 100.0;
    let stop_distance_raw = (entry.to_f64() - stop.to_f64()).abs();
    if stop_distance_raw == 0.0 {
        return Decimal8::ZERO;
    }
    Decimal8::from_f64(risk_amount / stop_distance_raw)
}

/// Spot sizing per spec §4.5. `max_risk_pct` defaults to 1.0; passing a
/// value above the tenant's configured ceiling is the caller's
/// responsibility to reject upstream (this function only computes).
pub fn size(capital: Micros, entry: Micros, stop: Micros, max_risk_pct: f64) -> SizingResult {
    let risk_amount = Micros::from_f64(capital.to_f64() * max_risk_pct / 100.0);
    let stop_distance_raw = (entry.to_f64() - stop.to_f64()).abs();
    let stop_distance = Micros::from_f64(stop_distance_raw);

    if stop_distance_raw == 0.0 {
        return SizingResult {
            quantity: Decimal8::ZERO,
            position_value: Micros::ZERO,
            risk_amount,
            risk_percent: 0.0,
            stop_distance,
            stop_distance_pct: 0.0,
            is_capped: false,
        };
    }

    let raw_quantity = raw_quantity(capital, entry, stop, max_risk_pct).to_f64();
    let mut quantity = Decimal8::from_f64(raw_quantity);
    let mut is_capped = false;

    let notional = quantity.to_f64() * entry.to_f64();
    let cap_notional = capital.to_f64() * MAX_CAPITAL_FRACTION;
    if notional > cap_notional && entry.to_f64() > 0.0 {
        quantity = Decimal8::from_f64(cap_notional / entry.to_f64());
        is_capped = true;
    }

    let position_value = Micros::from_f64(quantity.to_f64() * entry.to_f64());
    let actual_risk_amount = Micros::from_f64(quantity.to_f64() * stop_distance_raw);
    let risk_percent = if capital.to_f64() != 0.0 {
        actual_risk_amount.to_f64() / capital.to_f64() * 100.0
    } else {
        0.0
    };
    let stop_distance_pct = if entry.to_f64() != 0.0 {
        stop_distance_raw / entry.to_f64() * 100.0
    } else {
        0.0
    };

    SizingResult {
        quantity,
        position_value,
        risk_amount: actual_risk_amount,
        risk_percent,
        stop_distance,
        stop_distance_pct,
        is_capped,
    }
}
