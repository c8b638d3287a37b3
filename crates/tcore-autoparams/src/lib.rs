//! Auto-Parameter Pipeline (C6).
//!
//! Orchestrates the exchange port (C2), market data cache (C3), technical
//! stop calculator (C4), and position sizing (C5) to produce a complete
//! trade proposal from only `(symbol, strategy, tenant_id)`. Per spec §4.6
//! this pipeline never raises on a balance-fetch failure — it always
//! degrades to a usable proposal (`capital_source = FALLBACK`) — but does
//! raise on malformed input or impossible arithmetic (`entry == stop`).

use std::fmt;

use tcore_exchange::ExchangePort;
use tcore_schemas::{
    AccountType, CapitalMode, CapitalSource, Confidence, MarketBias, MethodUsed, Micros, Side,
    SideSource, Strategy, Symbol, TenantId,
};

/// Hard ceiling applied after balance-mode capital is computed (spec §4.6 step 2).
const MAX_CAPITAL: f64 = 100_000.0;
/// Below this, execution will likely fail on MIN_NOTIONAL; surfaced as a warning, not raised.
const MIN_CAPITAL_WARN: f64 = 10.0;
const DEFAULT_CAPITAL_FIXED: f64 = 1000.0;

#[derive(Debug, Clone)]
pub enum AutoParamsError {
    MalformedStrategy(String),
    MalformedSymbol(String),
    ImpossibleArithmetic(String),
}

impl fmt::Display for AutoParamsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoParamsError::MalformedStrategy(s) => write!(f, "malformed strategy: {s}"),
            AutoParamsError::MalformedSymbol(s) => write!(f, "malformed symbol: {s}"),
            AutoParamsError::ImpossibleArithmetic(s) => write!(f, "impossible arithmetic: {s}"),
        }
    }
}

impl std::error::Error for AutoParamsError {}

#[derive(Debug, Clone)]
pub struct AutoParamsResult {
    pub side: Side,
    pub side_source: SideSource,
    pub entry_price: Micros,
    pub stop_price: Micros,
    pub capital: Micros,
    pub capital_used: Micros,
    pub capital_source: CapitalSource,
    pub quantity: tcore_schemas::Decimal8,
    pub risk_amount: Micros,
    pub position_value: Micros,
    pub timeframe: String,
    pub method_used: MethodUsed,
    pub confidence: Confidence,
    pub confidence_float: f64,
    pub warnings: Vec<String>,
    pub stop_result: tcore_stopcalc::TechnicalStopResult,
}

/// Alias table recovered from `auto_calculate_trading_parameters.py`'s
/// `CONFIDENCE_MAP`: wire-layer confidence strings may use `MED` for
/// `MEDIUM`. Used when parsing confidence out of untrusted/legacy payloads.
pub fn parse_confidence_alias(s: &str) -> Option<Confidence> {
    match s.to_ascii_uppercase().as_str() {
        "HIGH" => Some(Confidence::High),
        "MEDIUM" | "MED" => Some(Confidence::Medium),
        "LOW" => Some(Confidence::Low),
        _ => None,
    }
}

/// Determine side per spec §4.6 step 1.
fn choose_side(strategy: &Strategy) -> (Side, SideSource) {
    match strategy.market_bias {
        MarketBias::Bullish => (Side::Buy, SideSource::MarketBias),
        MarketBias::Bearish => (Side::Sell, SideSource::MarketBias),
        MarketBias::Neutral => match strategy.config_str("default_side") {
            Some("SELL") => (Side::Sell, SideSource::ConfigDefault),
            Some("BUY") => (Side::Buy, SideSource::ConfigDefault),
            _ => (Side::Buy, SideSource::HardDefault),
        },
    }
}

/// Parse and validate `capital_balance_percent` per spec §8 boundary
/// behaviors: clamp to [0,100] with a warning; non-numeric input clamps to
/// 100% with a warning rather than erroring.
fn parse_balance_percent(strategy: &Strategy, warnings: &mut Vec<String>) -> f64 {
    let raw = strategy.config.get("capital_balance_percent");
    let parsed: Option<f64> = match raw {
        Some(v) if v.is_number() => v.as_f64(),
        Some(v) if v.is_string() => v.as_str().and_then(|s| s.parse::<f64>().ok()),
        _ => Some(100.0),
    };

    match parsed {
        None => {
            warnings.push(format!(
                "Invalid capital_balance_percent value '{:?}'. Using 100% of available balance.",
                raw
            ));
            100.0
        }
        Some(p) if p < 0.0 => {
            warnings.push(format!(
                "capital_balance_percent cannot be negative (got {p}%). Using 0% (no capital allocated)."
            ));
            0.0
        }
        Some(p) if p > 100.0 => {
            warnings.push(format!(
                "capital_balance_percent cannot exceed 100% (got {p}%). Using 100%."
            ));
            100.0
        }
        Some(p) => p,
    }
}

fn capital_fixed(strategy: &Strategy) -> f64 {
    strategy.config_f64("capital_fixed").unwrap_or(DEFAULT_CAPITAL_FIXED)
}

async fn resolve_capital(
    exchange: &dyn ExchangePort,
    tenant_id: TenantId,
    symbol: &Symbol,
    strategy: &Strategy,
    warnings: &mut Vec<String>,
) -> (Micros, CapitalSource) {
    let mode = match strategy.config_str("capital_mode") {
        Some("balance") => CapitalMode::Balance,
        _ => CapitalMode::Fixed,
    };

    match mode {
        CapitalMode::Fixed => (Micros::from_f64(capital_fixed(strategy)), CapitalSource::Fixed),
        CapitalMode::Balance => {
            let account_type = match strategy.config_str("account_type") {
                Some("isolated_margin") => AccountType::IsolatedMargin,
                _ => AccountType::Spot,
            };
            let symbol_hint = matches!(account_type, AccountType::IsolatedMargin).then_some(symbol.name.as_str());

            match exchange
                .get_available_quote_balance(tenant_id, &symbol.quote_asset, account_type, symbol_hint)
                .await
            {
                Ok(available) if available.to_f64() > 0.0 => {
                    let percent = parse_balance_percent(strategy, warnings);
                    let mut capital = available.to_f64() * percent / 100.0;

                    if capital > MAX_CAPITAL {
                        warnings.push(format!(
                            "Available balance ({} {}) results in capital (${capital:.2}) above maximum (${MAX_CAPITAL:.2}). Using maximum instead.",
                            available.to_f64(),
                            symbol.quote_asset
                        ));
                        capital = MAX_CAPITAL;
                    }
                    if capital < MIN_CAPITAL_WARN {
                        warnings.push(format!(
                            "Computed capital (${capital:.2}) is below typical exchange minimum (minNotional ~$5-10). Execution may fail with FILTER_FAILURE."
                        ));
                    }
                    (Micros::from_f64(capital), CapitalSource::Balance)
                }
                Ok(_zero_or_negative) => {
                    warnings.push("Available balance is <= 0. Using fixed capital fallback.".to_string());
                    (Micros::from_f64(capital_fixed(strategy)), CapitalSource::Fallback)
                }
                Err(e) => {
                    warnings.push(format!(
                        "Exchange error while fetching {} balance ({e}). Using fixed capital fallback.",
                        symbol.quote_asset
                    ));
                    (Micros::from_f64(capital_fixed(strategy)), CapitalSource::Fallback)
                }
            }
        }
    }
}

/// Run the full pipeline for `(symbol, strategy, tenant_id)`. `level_n`
/// default is 2 per spec §4.4.
pub async fn calculate(
    exchange: &dyn ExchangePort,
    tenant_id: TenantId,
    symbol: &Symbol,
    strategy: &Strategy,
    level_n: usize,
) -> Result<AutoParamsResult, AutoParamsError> {
    if symbol.name.trim().is_empty() {
        return Err(AutoParamsError::MalformedSymbol("empty symbol name".to_string()));
    }
    if strategy.name.trim().is_empty() {
        return Err(AutoParamsError::MalformedStrategy("empty strategy name".to_string()));
    }

    let (side, side_source) = choose_side(strategy);

    let mut warnings = Vec::new();
    let (capital, capital_source) = resolve_capital(exchange, tenant_id, symbol, strategy, &mut warnings).await;

    let timeframe = strategy
        .config_str("timeframe")
        .unwrap_or("15m")
        .to_string();

    let entry_price = match side {
        Side::Buy => exchange.best_ask(&symbol.name).await,
        Side::Sell => exchange.best_bid(&symbol.name).await,
    }
    .map_err(|e| AutoParamsError::MalformedSymbol(format!("could not fetch price for {}: {e}", symbol.name)))?;

    let candles = exchange
        .klines(&symbol.name, &timeframe, 100)
        .await
        .unwrap_or_default();

    let stop_result = tcore_stopcalc::calculate(&candles, entry_price, side, &timeframe, level_n);

    if stop_result.stop_price == entry_price {
        return Err(AutoParamsError::ImpossibleArithmetic(
            "stop_price equals entry_price".to_string(),
        ));
    }

    warnings.extend(stop_result.warnings.clone());

    let sizing = tcore_sizing::size(capital, entry_price, stop_result.stop_price, tcore_sizing::DEFAULT_MAX_RISK_PERCENT);

    let confidence_float = stop_result.confidence.as_f64();

    Ok(AutoParamsResult {
        side,
        side_source,
        entry_price,
        stop_price: stop_result.stop_price,
        capital,
        capital_used: capital,
        capital_source,
        quantity: sizing.quantity,
        risk_amount: sizing.risk_amount,
        position_value: sizing.position_value,
        timeframe,
        method_used: stop_result.method_used,
        confidence: stop_result.confidence,
        confidence_float,
        warnings,
        stop_result,
    })
}
