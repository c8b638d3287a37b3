//! Shared domain vocabulary: enums and entities from spec §3, used across
//! every Trading Core crate so the wire shape of an `Intent`, `Operation`,
//! etc. is defined exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Decimal8, Micros};

pub type TenantId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketBias {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Spot,
    IsolatedMargin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapitalMode {
    Fixed,
    Balance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CapitalSource {
    Fixed,
    Balance,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SideSource {
    MarketBias,
    ConfigDefault,
    HardDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn downgrade(self) -> Confidence {
        match self {
            Confidence::High => Confidence::Medium,
            Confidence::Medium => Confidence::Low,
            Confidence::Low => Confidence::Low,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Confidence::High => 0.8,
            Confidence::Medium => 0.6,
            Confidence::Low => 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MethodUsed {
    SupportResistance,
    FallbackFixedPct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntentStatus {
    Pending,
    Validated,
    Executed,
    Failed,
    Cancelled,
}

impl IntentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, IntentStatus::Executed | IntentStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationStatus {
    Planned,
    Active,
    Closed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarginPositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyStatus {
    Active,
    Paused,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    DryRun,
    Live,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::DryRun
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdjustmentReason {
    NoAdjustment,
    BreakEven,
    Trailing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrailingSide {
    Long,
    Short,
}

impl From<Side> for TrailingSide {
    fn from(s: Side) -> Self {
        match s {
            Side::Buy => TrailingSide::Long,
            Side::Sell => TrailingSide::Short,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Pass,
    Warning,
    Fail,
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub min_qty: Option<Decimal8>,
    pub max_qty: Option<Decimal8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: i64,
    pub tenant_id: TenantId,
    pub name: String,
    pub market_bias: MarketBias,
    pub config: serde_json::Value,
}

impl Strategy {
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    pub fn config_f64(&self, key: &str) -> Option<f64> {
        self.config.get(key).and_then(|v| v.as_f64())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingIntent {
    pub intent_id: Uuid,
    pub tenant_id: TenantId,
    pub symbol: String,
    pub strategy_id: i64,
    pub side: Side,
    pub entry_price: Micros,
    pub stop_price: Micros,
    pub target_price: Option<Micros>,
    pub quantity: Decimal8,
    pub capital: Micros,
    pub risk_amount: Micros,
    pub risk_percent: f64,
    pub regime: String,
    pub confidence: f64,
    pub reason: String,
    pub pattern_code: Option<String>,
    pub pattern_event_id: Option<String>,
    pub pattern_source: Option<String>,
    pub status: IntentStatus,
    pub validated_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub validation_result: Option<serde_json::Value>,
    pub execution_result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternTrigger {
    pub tenant_id: TenantId,
    pub pattern_event_id: String,
    pub intent_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: i64,
    pub tenant_id: TenantId,
    pub symbol: String,
    pub strategy_id: i64,
    pub side: Side,
    pub status: OperationStatus,
    pub stop_price: Micros,
    pub target_price: Option<Micros>,
    pub entry_order_id: Option<String>,
    pub exit_order_id: Option<String>,
    pub weighted_entry_price: Micros,
    pub filled_quantity: Decimal8,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginPosition {
    pub id: i64,
    pub tenant_id: TenantId,
    pub symbol: String,
    pub side: Side,
    pub leverage: f64,
    pub entry_price: Micros,
    pub quantity: Decimal8,
    pub current_price: Micros,
    pub margin_level: Option<f64>,
    pub risk_amount: Micros,
    pub risk_percent: f64,
    pub stop_price: Micros,
    pub status: MarginPositionStatus,
}

impl MarginPosition {
    pub fn is_open(&self) -> bool {
        matches!(self.status, MarginPositionStatus::Open)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyState {
    pub tenant_id: TenantId,
    pub month: String, // "YYYY-MM"
    pub status: PolicyStatus,
    pub starting_capital: Micros,
    pub current_capital: Micros,
    pub realized_pnl: Micros,
    pub unrealized_pnl: Micros,
    pub trade_count: u32,
    pub winning_trades: u32,
    pub max_drawdown_percent: f64,
    pub max_trades_per_day: u32,
    pub paused_at: Option<DateTime<Utc>>,
    pub pause_reason: Option<String>,
}

impl PolicyState {
    pub fn drawdown_percent(&self) -> f64 {
        let start = self.starting_capital.to_f64();
        if start == 0.0 {
            return 0.0;
        }
        (start - self.current_capital.to_f64()) / start * 100.0
    }

    pub fn new_active(tenant_id: TenantId, month: String, starting_capital: Micros) -> Self {
        PolicyState {
            tenant_id,
            month,
            status: PolicyStatus::Active,
            starting_capital,
            current_capital: starting_capital,
            realized_pnl: Micros::ZERO,
            unrealized_pnl: Micros::ZERO,
            trade_count: 0,
            winning_trades: 0,
            max_drawdown_percent: 4.0,
            max_trades_per_day: 50,
            paused_at: None,
            pause_reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrailingStopState {
    pub position_id: i64,
    pub side: TrailingSide,
    pub entry_price: Micros,
    pub initial_stop: Micros,
    pub current_stop: Micros,
    pub current_price: Micros,
    pub quantity: Decimal8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopAdjustment {
    pub position_id: i64,
    pub old_stop: Micros,
    pub new_stop: Micros,
    pub reason: AdjustmentReason,
    pub adjustment_token: String,
    pub timestamp: DateTime<Utc>,
    pub current_price: Micros,
    pub spans_crossed: i64,
    pub step_index: i64,
    pub metadata: serde_json::Value,
}

impl StopAdjustment {
    pub fn is_adjusted(&self) -> bool {
        !matches!(self.reason, AdjustmentReason::NoAdjustment)
    }

    pub fn adjustment_amount(&self) -> Micros {
        self.new_stop - self.old_stop
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditTransaction {
    pub tenant_id: TenantId,
    pub transaction_type: String,
    pub symbol: Option<String>,
    pub side: Option<Side>,
    pub quantity: Option<Decimal8>,
    pub price: Option<Micros>,
    pub fee: Option<Micros>,
    pub ts_utc: DateTime<Utc>,
    pub raw_response: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryGateDecision {
    pub tenant_id: TenantId,
    pub allowed: bool,
    pub reasons: Vec<String>,
    pub details: serde_json::Value,
    pub context: serde_json::Value,
    pub ts_utc: DateTime<Utc>,
}
