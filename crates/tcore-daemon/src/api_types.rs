//! Request and response types for every tcore-daemon HTTP endpoint.
//!
//! These are thin wire DTOs; the business logic they wrap lives in
//! `tcore-intent`, `tcore-execution`, `tcore-risk`, `tcore-autoparams`, and
//! friends. No decision is made in this module.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tcore_schemas::{Micros, Side, TenantId};
use uuid::Uuid;

/// Wire error payload (spec §7). Plain errors carry only `error`; a
/// malformed-request error additionally carries `missing_fields` (partial
/// manual payload) or `fields_not_allowed` (manual fields under `mode=auto`)
/// per spec §8 scenarios 2 & 3 — omitted from the JSON body when unused.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields_not_allowed: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        ErrorResponse { error: msg.into(), missing_fields: None, fields_not_allowed: None }
    }

    pub fn missing_fields(msg: impl Into<String>, fields: Vec<String>) -> Self {
        ErrorResponse { error: msg.into(), missing_fields: Some(fields), fields_not_allowed: None }
    }

    pub fn fields_not_allowed(msg: impl Into<String>, fields: Vec<String>) -> Self {
        ErrorResponse { error: msg.into(), missing_fields: None, fields_not_allowed: Some(fields) }
    }
}

// ---------------------------------------------------------------------------
// POST /trading-intents/create
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CreateIntentBody {
    pub tenant_id: TenantId,
    pub symbol: String,
    pub strategy_id: i64,
    /// `true` requests the auto-parameter pipeline (C6); omitting every
    /// manual field has the same effect.
    #[serde(default)]
    pub auto: Option<bool>,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub entry_price: Option<f64>,
    #[serde(default)]
    pub stop_price: Option<f64>,
    #[serde(default)]
    pub capital: Option<f64>,
    pub regime: String,
    pub reason: String,
    #[serde(default)]
    pub pattern_code: Option<String>,
    #[serde(default)]
    pub pattern_event_id: Option<String>,
    #[serde(default)]
    pub pattern_source: Option<String>,
}

// ---------------------------------------------------------------------------
// GET /trading-intents (filters)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ListIntentsQuery {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub strategy: Option<i64>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantQuery {
    pub tenant_id: TenantId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteIntentQuery {
    pub tenant_id: TenantId,
    /// "dry-run" (default) or "live".
    #[serde(default)]
    pub mode: Option<String>,
    /// Explicit LIVE-trade confirmation (spec §4.7 TradeIntent guard).
    /// Ignored in DRY_RUN, where confirmation is never required.
    #[serde(default)]
    pub confirmed: Option<bool>,
}

// ---------------------------------------------------------------------------
// POST /trading-intents/auto-calculate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AutoCalculateBody {
    pub tenant_id: TenantId,
    pub symbol: String,
    pub strategy_id: i64,
    #[serde(default)]
    pub level_n: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoCalculateResponse {
    pub side: Side,
    pub side_source: tcore_schemas::SideSource,
    pub entry_price: Micros,
    pub stop_price: Micros,
    pub capital: Micros,
    pub capital_source: tcore_schemas::CapitalSource,
    pub quantity: tcore_schemas::Decimal8,
    pub risk_amount: Micros,
    pub position_value: Micros,
    pub timeframe: String,
    pub method_used: tcore_schemas::MethodUsed,
    pub confidence: tcore_schemas::Confidence,
    pub confidence_float: f64,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// POST /pattern-triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PatternTriggerBody {
    pub tenant_id: TenantId,
    pub pattern_event_id: String,
    #[serde(default)]
    pub pattern_code: Option<String>,
    #[serde(default)]
    pub pattern_source: Option<String>,
    pub symbol: String,
    pub strategy_id: i64,
    pub regime: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternTriggerResponse {
    pub intent_id: Uuid,
    pub already_existed: bool,
}

// ---------------------------------------------------------------------------
// GET /operations, POST /operations/{id}/cancel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ListOperationsQuery {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub status: Option<String>,
}

// ---------------------------------------------------------------------------
// POST /trade/risk-managed/{buy,sell}
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RiskManagedTradeBody {
    pub tenant_id: TenantId,
    pub symbol: String,
    pub strategy_id: i64,
    pub entry_price: f64,
    pub stop_price: f64,
    pub capital: f64,
    pub regime: String,
    pub reason: String,
    /// "dry-run" (default) or "live".
    #[serde(default)]
    pub mode: Option<String>,
    /// Explicit LIVE-trade confirmation (spec §4.7 TradeIntent guard).
    /// Ignored in DRY_RUN, where confirmation is never required.
    #[serde(default)]
    pub confirmed: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskManagedTradeResponse {
    pub intent: tcore_schemas::TradingIntent,
    pub validation: Value,
    pub execution: Value,
}

// ---------------------------------------------------------------------------
// POST /trade/risk-managed/validate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RiskManagedValidateBody {
    pub tenant_id: TenantId,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub stop_price: f64,
    pub capital: f64,
    #[serde(default)]
    pub max_risk_percent: Option<f64>,
    #[serde(default)]
    pub max_drawdown_percent: Option<f64>,
}

// ---------------------------------------------------------------------------
// GET /trade/risk-status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RiskStatusQuery {
    pub tenant_id: TenantId,
    /// Calendar month, "YYYY-MM". Defaults to the daemon clock's current month.
    #[serde(default)]
    pub month: Option<String>,
}

// ---------------------------------------------------------------------------
// GET /portfolio/positions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioPositionsQuery {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub symbol: Option<String>,
}
