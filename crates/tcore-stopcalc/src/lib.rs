//! Technical Stop Calculator (C4).
//!
//! Pure function: an OHLCV window plus an entry price and side produces a
//! stop price ranked off fractal support/resistance pivots, falling back to
//! a fixed percentage when the window is empty or too thin. No I/O; given
//! the same candles this always returns the same result (spec §4.4
//! determinism requirement), so it never reads the clock or touches `rand`.

use serde::{Deserialize, Serialize};
use tcore_schemas::{Candle, Confidence, MethodUsed, Micros, Side};

/// Fractal pivot window radius: bar `i` is a pivot if it strictly exceeds
/// (or undercuts) every bar within `i-k..=i+k`.
const PIVOT_K: usize = 3;
/// Pivots within this fraction of each other's price cluster together.
const CLUSTER_PROXIMITY_PCT: f64 = 0.25;
/// Fallback stop distance when no qualifying level is found.
const FALLBACK_PCT: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PivotKind {
    High,
    Low,
}

#[derive(Debug, Clone)]
struct Pivot {
    kind: PivotKind,
    price: Micros,
    /// Index into the candle window; higher index = more recent.
    index: usize,
}

/// A ranked support or resistance cluster (spec §4.4 step 2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Level {
    pub price: Micros,
    pub touches: u32,
    pub strength: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalStopResult {
    pub stop_price: Micros,
    pub entry_price: Micros,
    pub side: Side,
    pub timeframe: String,
    pub method_used: MethodUsed,
    pub confidence: Confidence,
    pub levels_found: Vec<Level>,
    pub warnings: Vec<String>,
    pub stop_distance: Micros,
    pub stop_distance_pct: f64,
}

/// Pure query (not excluded by any Non-goal) returning ranked
/// supports/resistances independent of stop calculation — recovered from
/// `technical_stop_adapter.py`'s `get_support_resistance_levels` debug view.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SupportResistanceView {
    pub supports: Vec<Level>,
    pub resistances: Vec<Level>,
}

pub fn support_resistance_levels(candles: &[Candle], current_price: Micros) -> SupportResistanceView {
    if candles.is_empty() {
        return SupportResistanceView::default();
    }
    let pivots = find_pivots(candles);
    let supports = rank_levels(&pivots, candles.len(), PivotKind::Low, |p| p.to_f64() < current_price.to_f64());
    let resistances = rank_levels(&pivots, candles.len(), PivotKind::High, |p| p.to_f64() > current_price.to_f64());
    SupportResistanceView { supports, resistances }
}

/// Calculate the technical stop for a trade entering at `entry_price` on
/// `side`, given an oldest-first OHLCV window. `level_n` selects the n-th
/// ranked qualifying level (1-indexed; spec default is 2).
pub fn calculate(
    candles: &[Candle],
    entry_price: Micros,
    side: Side,
    timeframe: &str,
    level_n: usize,
) -> TechnicalStopResult {
    if candles.is_empty() {
        return fallback(entry_price, side, timeframe, vec!["No OHLCV data available".to_string()]);
    }

    let pivots = find_pivots(candles);
    let levels = match side {
        Side::Buy => rank_levels(&pivots, candles.len(), PivotKind::Low, |p| {
            p.to_f64() < entry_price.to_f64()
        }),
        Side::Sell => rank_levels(&pivots, candles.len(), PivotKind::High, |p| {
            p.to_f64() > entry_price.to_f64()
        }),
    };

    if levels.len() < level_n.max(1) {
        let mut warnings = vec![format!(
            "Found only {} qualifying level(s), need {}; falling back to fixed-percent stop",
            levels.len(),
            level_n
        )];
        let mut result = fallback(entry_price, side, timeframe, std::mem::take(&mut warnings));
        result.levels_found = levels;
        return result;
    }

    let chosen = levels[level_n - 1];
    // Stop sits just beyond the level: 0.1% further away than the level
    // itself, so a brief wick through the level doesn't stop us out.
    let buffer = chosen.price.to_f64() * 0.001;
    let stop_raw = match side {
        Side::Buy => chosen.price.to_f64() - buffer,
        Side::Sell => chosen.price.to_f64() + buffer,
    };
    let stop_price = Micros::from_f64(stop_raw);

    let stop_distance = Micros::from_f64((entry_price.to_f64() - stop_price.to_f64()).abs());
    let stop_distance_pct = if entry_price.to_f64() != 0.0 {
        stop_distance.to_f64() / entry_price.to_f64() * 100.0
    } else {
        0.0
    };

    TechnicalStopResult {
        stop_price,
        entry_price,
        side,
        timeframe: timeframe.to_string(),
        method_used: MethodUsed::SupportResistance,
        confidence: Confidence::High,
        levels_found: levels,
        warnings: Vec::new(),
        stop_distance,
        stop_distance_pct,
    }
}

fn fallback(entry_price: Micros, side: Side, timeframe: &str, mut warnings: Vec<String>) -> TechnicalStopResult {
    warnings.push(format!("Using FALLBACK_FIXED_PCT stop ({FALLBACK_PCT}%)"));
    let distance = entry_price.to_f64() * FALLBACK_PCT / 100.0;
    let stop_raw = match side {
        Side::Buy => entry_price.to_f64() - distance,
        Side::Sell => entry_price.to_f64() + distance,
    };
    let stop_price = Micros::from_f64(stop_raw);
    let stop_distance = Micros::from_f64(distance);
    let stop_distance_pct = FALLBACK_PCT;

    TechnicalStopResult {
        stop_price,
        entry_price,
        side,
        timeframe: timeframe.to_string(),
        method_used: MethodUsed::FallbackFixedPct,
        confidence: Confidence::Low,
        levels_found: Vec::new(),
        warnings,
        stop_distance,
        stop_distance_pct,
    }
}

fn find_pivots(candles: &[Candle]) -> Vec<Pivot> {
    let mut pivots = Vec::new();
    let n = candles.len();
    if n <= 2 * PIVOT_K {
        return pivots;
    }

    for i in PIVOT_K..(n - PIVOT_K) {
        let window = &candles[i - PIVOT_K..=i + PIVOT_K];
        let this_high = candles[i].high.to_f64();
        let this_low = candles[i].low.to_f64();

        let is_high_pivot = window
            .iter()
            .enumerate()
            .all(|(j, c)| j == PIVOT_K || c.high.to_f64() < this_high);
        if is_high_pivot {
            pivots.push(Pivot { kind: PivotKind::High, price: candles[i].high, index: i });
        }

        let is_low_pivot = window
            .iter()
            .enumerate()
            .all(|(j, c)| j == PIVOT_K || c.low.to_f64() > this_low);
        if is_low_pivot {
            pivots.push(Pivot { kind: PivotKind::Low, price: candles[i].low, index: i });
        }
    }

    pivots
}

/// Cluster same-kind pivots within `CLUSTER_PROXIMITY_PCT` of each other,
/// filter by `qualifies`, and rank descending by strength. Ties break by
/// lower index-of-first-pivot so the ranking is stable and reproducible.
fn rank_levels(
    pivots: &[Pivot],
    window_len: usize,
    kind: PivotKind,
    qualifies: impl Fn(Micros) -> bool,
) -> Vec<Level> {
    let mut same_kind: Vec<&Pivot> = pivots.iter().filter(|p| p.kind == kind).collect();
    same_kind.sort_by(|a, b| a.price.to_f64().partial_cmp(&b.price.to_f64()).unwrap());

    let mut clusters: Vec<Vec<&Pivot>> = Vec::new();
    for p in same_kind {
        if let Some(last) = clusters.last_mut() {
            let anchor = last[0].price.to_f64();
            if anchor != 0.0 && (p.price.to_f64() - anchor).abs() / anchor * 100.0 <= CLUSTER_PROXIMITY_PCT {
                last.push(p);
                continue;
            }
        }
        clusters.push(vec![p]);
    }

    let mut levels: Vec<Level> = clusters
        .into_iter()
        .map(|cluster| {
            let touches = cluster.len() as u32;
            let avg_price = cluster.iter().map(|p| p.price.to_f64()).sum::<f64>() / touches as f64;
            let most_recent_index = cluster.iter().map(|p| p.index).max().unwrap_or(0);
            let recency_weight = if window_len > 1 {
                (most_recent_index as f64 + 1.0) / window_len as f64
            } else {
                1.0
            };
            Level {
                price: Micros::from_f64(avg_price),
                touches,
                strength: touches as f64 * recency_weight,
            }
        })
        .filter(|level| qualifies(level.price))
        .collect();

    levels.sort_by(|a, b| {
        b.strength
            .partial_cmp(&a.strength)
            .unwrap()
            .then_with(|| a.price.to_f64().partial_cmp(&b.price.to_f64()).unwrap())
    });
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use tcore_schemas::Decimal8;

    fn candle(o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle {
            ts_close_utc: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            open: Micros::from_f64(o),
            high: Micros::from_f64(h),
            low: Micros::from_f64(l),
            close: Micros::from_f64(c),
            volume: Decimal8::from_f64(1.0),
        }
    }

    #[test]
    fn empty_window_falls_back_with_low_confidence() {
        let result = calculate(&[], Micros::from_f64(50_000.0), Side::Buy, "15m", 2);
        assert_eq!(result.method_used, MethodUsed::FallbackFixedPct);
        assert_eq!(result.confidence, Confidence::Low);
        assert!((result.stop_distance_pct - 2.0).abs() < 1e-9);
    }

    #[test]
    fn insufficient_levels_fall_back() {
        // Flat candles produce no pivots at all.
        let candles: Vec<Candle> = (0..20).map(|_| candle(100.0, 100.0, 100.0, 100.0)).collect();
        let result = calculate(&candles, Micros::from_f64(100.0), Side::Buy, "15m", 2);
        assert_eq!(result.method_used, MethodUsed::FallbackFixedPct);
    }

    #[test]
    fn deterministic_given_identical_input() {
        let mut candles = Vec::new();
        for i in 0..30 {
            let base = 100.0 + (i as f64 * 0.3).sin() * 10.0;
            candles.push(candle(base, base + 2.0, base - 2.0, base));
        }
        let a = calculate(&candles, Micros::from_f64(120.0), Side::Buy, "15m", 2);
        let b = calculate(&candles, Micros::from_f64(120.0), Side::Buy, "15m", 2);
        assert_eq!(a.stop_price, b.stop_price);
        assert_eq!(a.method_used, b.method_used);
    }

    #[test]
    fn buy_stop_is_below_entry_when_support_resistance_used() {
        let mut candles = Vec::new();
        for i in 0..40 {
            let base = 100.0 + ((i as f64) * 0.25).sin() * 15.0;
            candles.push(candle(base, base + 1.5, base - 1.5, base));
        }
        let result = calculate(&candles, Micros::from_f64(130.0), Side::Buy, "15m", 1);
        if result.method_used == MethodUsed::SupportResistance {
            assert!(result.stop_price.to_f64() < 130.0);
        }
    }
}
