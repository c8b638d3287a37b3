use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use tcore_schemas::{
    AdjustmentReason, AuditTransaction, Decimal8, EntryGateDecision, MarginPosition,
    MarginPositionStatus, Micros, Operation, OperationStatus, PatternTrigger, PolicyState,
    PolicyStatus, Side, StopAdjustment, Strategy, Symbol, TenantId, TradingIntent,
};

pub const ENV_DB_URL: &str = "TCORE_DATABASE_URL";

/// Connect to Postgres using TCORE_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Test helper used by integration tests: connect, then ensure migrations
/// are applied.
pub async fn testkit_db_pool() -> Result<PgPool> {
    let pool = connect_from_env().await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='trading_intents'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_core_tables: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_core_tables: bool,
}

/// Detect a Postgres unique constraint violation by name.
fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

fn side_to_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn side_from_str(s: &str) -> Result<Side> {
    match s {
        "BUY" => Ok(Side::Buy),
        "SELL" => Ok(Side::Sell),
        other => Err(anyhow!("unknown side: {other}")),
    }
}

// ---------------------------------------------------------------------------
// Symbols
// ---------------------------------------------------------------------------

pub async fn upsert_symbol(pool: &PgPool, symbol: &Symbol) -> Result<()> {
    sqlx::query(
        r#"
        insert into symbols (name, base_asset, quote_asset, min_qty, max_qty)
        values ($1, $2, $3, $4, $5)
        on conflict (name) do update set
          base_asset = excluded.base_asset,
          quote_asset = excluded.quote_asset,
          min_qty = excluded.min_qty,
          max_qty = excluded.max_qty
        "#,
    )
    .bind(&symbol.name)
    .bind(&symbol.base_asset)
    .bind(&symbol.quote_asset)
    .bind(symbol.min_qty.map(|q| q.raw().to_string()))
    .bind(symbol.max_qty.map(|q| q.raw().to_string()))
    .execute(pool)
    .await
    .context("upsert_symbol failed")?;

    Ok(())
}

pub async fn fetch_symbol(pool: &PgPool, name: &str) -> Result<Option<Symbol>> {
    let row = sqlx::query(
        r#"
        select name, base_asset, quote_asset, min_qty, max_qty
        from symbols
        where name = $1
        "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await
    .context("fetch_symbol failed")?;

    let Some(row) = row else { return Ok(None) };

    Ok(Some(Symbol {
        name: row.try_get("name")?,
        base_asset: row.try_get("base_asset")?,
        quote_asset: row.try_get("quote_asset")?,
        min_qty: decode_opt_decimal8(&row, "min_qty")?,
        max_qty: decode_opt_decimal8(&row, "max_qty")?,
    }))
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

pub async fn insert_strategy(pool: &PgPool, strategy: &Strategy) -> Result<i64> {
    let row = sqlx::query(
        r#"
        insert into strategies (tenant_id, name, market_bias, config)
        values ($1, $2, $3, $4)
        returning id
        "#,
    )
    .bind(strategy.tenant_id)
    .bind(&strategy.name)
    .bind(serde_json::to_string(&strategy.market_bias)?.trim_matches('"').to_uppercase())
    .bind(&strategy.config)
    .fetch_one(pool)
    .await
    .context("insert_strategy failed")?;

    Ok(row.try_get("id")?)
}

pub async fn fetch_strategy(pool: &PgPool, tenant_id: TenantId, id: i64) -> Result<Strategy> {
    let row = sqlx::query(
        r#"
        select id, tenant_id, name, market_bias, config
        from strategies
        where tenant_id = $1 and id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(id)
    .fetch_one(pool)
    .await
    .context("fetch_strategy failed")?;

    Ok(Strategy {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        market_bias: serde_json::from_value(serde_json::Value::String(
            row.try_get::<String, _>("market_bias")?,
        ))
        .context("decode market_bias failed")?,
        config: row.try_get("config")?,
    })
}

// ---------------------------------------------------------------------------
// Trading intents (C1/C2)
// ---------------------------------------------------------------------------

/// Persist a freshly-created intent. Violates the `(tenant_id, intent_id)`
/// unique constraint if the caller races a duplicate `intent_id`.
pub async fn insert_trading_intent(pool: &PgPool, intent: &TradingIntent) -> Result<()> {
    let res = sqlx::query(
        r#"
        insert into trading_intents (
          intent_id, tenant_id, symbol, strategy_id, side,
          entry_price, stop_price, target_price, quantity, capital,
          risk_amount, risk_percent, regime, confidence, reason,
          pattern_code, pattern_event_id, pattern_source,
          status, validated_at, executed_at, validation_result,
          execution_result, error_message, created_at
        ) values (
          $1, $2, $3, $4, $5,
          $6, $7, $8, $9, $10,
          $11, $12, $13, $14, $15,
          $16, $17, $18,
          $19, $20, $21, $22,
          $23, $24, $25
        )
        "#,
    )
    .bind(intent.intent_id)
    .bind(intent.tenant_id)
    .bind(&intent.symbol)
    .bind(intent.strategy_id)
    .bind(side_to_str(intent.side))
    .bind(intent.entry_price.raw())
    .bind(intent.stop_price.raw())
    .bind(intent.target_price.map(Micros::raw))
    .bind(intent.quantity.raw().to_string())
    .bind(intent.capital.raw())
    .bind(intent.risk_amount.raw())
    .bind(intent.risk_percent)
    .bind(&intent.regime)
    .bind(intent.confidence)
    .bind(&intent.reason)
    .bind(&intent.pattern_code)
    .bind(&intent.pattern_event_id)
    .bind(&intent.pattern_source)
    .bind(status_str(intent.status))
    .bind(intent.validated_at)
    .bind(intent.executed_at)
    .bind(&intent.validation_result)
    .bind(&intent.execution_result)
    .bind(&intent.error_message)
    .bind(intent.created_at)
    .execute(pool)
    .await;

    match res {
        Ok(_) => Ok(()),
        Err(e) => {
            if is_unique_constraint_violation(&e, "trading_intents_tenant_id_intent_id_key") {
                return Err(anyhow!("duplicate intent_id for tenant"));
            }
            Err(anyhow::Error::new(e).context("insert_trading_intent failed"))
        }
    }
}

pub async fn fetch_trading_intent(
    pool: &PgPool,
    tenant_id: TenantId,
    intent_id: Uuid,
) -> Result<TradingIntent> {
    let row = sqlx::query(
        r#"
        select
          intent_id, tenant_id, symbol, strategy_id, side,
          entry_price, stop_price, target_price, quantity, capital,
          risk_amount, risk_percent, regime, confidence, reason,
          pattern_code, pattern_event_id, pattern_source,
          status, validated_at, executed_at, validation_result,
          execution_result, error_message, created_at
        from trading_intents
        where tenant_id = $1 and intent_id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(intent_id)
    .fetch_one(pool)
    .await
    .context("fetch_trading_intent failed")?;

    row_to_trading_intent(&row)
}

pub async fn list_trading_intents(
    pool: &PgPool,
    tenant_id: TenantId,
    status: Option<&str>,
) -> Result<Vec<TradingIntent>> {
    let rows = match status {
        Some(s) => {
            sqlx::query(
                r#"
                select
                  intent_id, tenant_id, symbol, strategy_id, side,
                  entry_price, stop_price, target_price, quantity, capital,
                  risk_amount, risk_percent, regime, confidence, reason,
                  pattern_code, pattern_event_id, pattern_source,
                  status, validated_at, executed_at, validation_result,
                  execution_result, error_message, created_at
                from trading_intents
                where tenant_id = $1 and status = $2
                order by created_at desc
                "#,
            )
            .bind(tenant_id)
            .bind(s)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query(
                r#"
                select
                  intent_id, tenant_id, symbol, strategy_id, side,
                  entry_price, stop_price, target_price, quantity, capital,
                  risk_amount, risk_percent, regime, confidence, reason,
                  pattern_code, pattern_event_id, pattern_source,
                  status, validated_at, executed_at, validation_result,
                  execution_result, error_message, created_at
                from trading_intents
                where tenant_id = $1
                order by created_at desc
                "#,
            )
            .bind(tenant_id)
            .fetch_all(pool)
            .await
        }
    }
    .context("list_trading_intents failed")?;

    rows.iter().map(row_to_trading_intent).collect()
}

/// Move an intent through VALIDATE, recording the validation report.
pub async fn mark_intent_validated(
    pool: &PgPool,
    tenant_id: TenantId,
    intent_id: Uuid,
    validation_result: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        r#"
        update trading_intents
        set status = 'VALIDATED', validated_at = now(), validation_result = $3
        where tenant_id = $1 and intent_id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(intent_id)
    .bind(validation_result)
    .execute(pool)
    .await
    .context("mark_intent_validated failed")?;

    Ok(())
}

/// Move an intent through EXECUTE, recording the execution report.
pub async fn mark_intent_executed(
    pool: &PgPool,
    tenant_id: TenantId,
    intent_id: Uuid,
    execution_result: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        r#"
        update trading_intents
        set status = 'EXECUTED', executed_at = now(), execution_result = $3
        where tenant_id = $1 and intent_id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(intent_id)
    .bind(execution_result)
    .execute(pool)
    .await
    .context("mark_intent_executed failed")?;

    Ok(())
}

pub async fn mark_intent_failed(
    pool: &PgPool,
    tenant_id: TenantId,
    intent_id: Uuid,
    error_message: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        update trading_intents
        set status = 'FAILED', error_message = $3
        where tenant_id = $1 and intent_id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(intent_id)
    .bind(error_message)
    .execute(pool)
    .await
    .context("mark_intent_failed failed")?;

    Ok(())
}

fn status_str(status: tcore_schemas::IntentStatus) -> &'static str {
    use tcore_schemas::IntentStatus::*;
    match status {
        Pending => "PENDING",
        Validated => "VALIDATED",
        Executed => "EXECUTED",
        Failed => "FAILED",
        Cancelled => "CANCELLED",
    }
}

fn row_to_trading_intent(row: &sqlx::postgres::PgRow) -> Result<TradingIntent> {
    Ok(TradingIntent {
        intent_id: row.try_get("intent_id")?,
        tenant_id: row.try_get("tenant_id")?,
        symbol: row.try_get("symbol")?,
        strategy_id: row.try_get("strategy_id")?,
        side: side_from_str(&row.try_get::<String, _>("side")?)?,
        entry_price: Micros::new(row.try_get("entry_price")?),
        stop_price: Micros::new(row.try_get("stop_price")?),
        target_price: row.try_get::<Option<i64>, _>("target_price")?.map(Micros::new),
        quantity: decode_decimal8(row, "quantity")?,
        capital: Micros::new(row.try_get("capital")?),
        risk_amount: Micros::new(row.try_get("risk_amount")?),
        risk_percent: row.try_get("risk_percent")?,
        regime: row.try_get("regime")?,
        confidence: row.try_get("confidence")?,
        reason: row.try_get("reason")?,
        pattern_code: row.try_get("pattern_code")?,
        pattern_event_id: row.try_get("pattern_event_id")?,
        pattern_source: row.try_get("pattern_source")?,
        status: serde_json::from_value(serde_json::Value::String(
            row.try_get::<String, _>("status")?,
        ))
        .context("decode intent status failed")?,
        validated_at: row.try_get("validated_at")?,
        executed_at: row.try_get("executed_at")?,
        validation_result: row.try_get("validation_result")?,
        execution_result: row.try_get("execution_result")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
    })
}

fn decode_decimal8(row: &sqlx::postgres::PgRow, col: &str) -> Result<Decimal8> {
    let raw: String = row.try_get(col)?;
    Ok(Decimal8::new_raw(
        raw.parse::<i128>().with_context(|| format!("decode {col} as Decimal8 failed"))?,
    ))
}

fn decode_opt_decimal8(row: &sqlx::postgres::PgRow, col: &str) -> Result<Option<Decimal8>> {
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|s| {
        s.parse::<i128>()
            .map(Decimal8::new_raw)
            .with_context(|| format!("decode {col} as Decimal8 failed"))
    })
    .transpose()
}

// ---------------------------------------------------------------------------
// Pattern triggers (C4) — idempotency boundary: one intent per pattern event.
// ---------------------------------------------------------------------------

/// Record that `pattern_event_id` minted `intent_id`. Returns `Ok(false)`
/// without inserting if this tenant already consumed the event, so callers
/// can treat a replayed pattern event as a no-op rather than an error.
pub async fn record_pattern_trigger(
    pool: &PgPool,
    trigger: &PatternTrigger,
) -> Result<bool> {
    let res = sqlx::query(
        r#"
        insert into pattern_triggers (tenant_id, pattern_event_id, intent_id, created_at)
        values ($1, $2, $3, $4)
        "#,
    )
    .bind(trigger.tenant_id)
    .bind(&trigger.pattern_event_id)
    .bind(trigger.intent_id)
    .bind(trigger.created_at)
    .execute(pool)
    .await;

    match res {
        Ok(_) => Ok(true),
        Err(e) if is_unique_constraint_violation(&e, "pattern_triggers_pkey") => Ok(false),
        Err(e) => Err(anyhow::Error::new(e).context("record_pattern_trigger failed")),
    }
}

pub async fn fetch_pattern_trigger(
    pool: &PgPool,
    tenant_id: TenantId,
    pattern_event_id: &str,
) -> Result<Option<PatternTrigger>> {
    let row = sqlx::query(
        r#"
        select tenant_id, pattern_event_id, intent_id, created_at
        from pattern_triggers
        where tenant_id = $1 and pattern_event_id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(pattern_event_id)
    .fetch_optional(pool)
    .await
    .context("fetch_pattern_trigger failed")?;

    let Some(row) = row else { return Ok(None) };

    Ok(Some(PatternTrigger {
        tenant_id: row.try_get("tenant_id")?,
        pattern_event_id: row.try_get("pattern_event_id")?,
        intent_id: row.try_get("intent_id")?,
        created_at: row.try_get("created_at")?,
    }))
}

// ---------------------------------------------------------------------------
// Operations (C5)
// ---------------------------------------------------------------------------

pub async fn insert_operation(pool: &PgPool, op: &Operation) -> Result<i64> {
    let row = sqlx::query(
        r#"
        insert into operations (
          tenant_id, symbol, strategy_id, side, status,
          stop_price, target_price, entry_order_id, exit_order_id,
          weighted_entry_price, filled_quantity, created_at
        ) values (
          $1, $2, $3, $4, $5,
          $6, $7, $8, $9,
          $10, $11, $12
        )
        returning id
        "#,
    )
    .bind(op.tenant_id)
    .bind(&op.symbol)
    .bind(op.strategy_id)
    .bind(side_to_str(op.side))
    .bind(operation_status_str(op.status))
    .bind(op.stop_price.raw())
    .bind(op.target_price.map(Micros::raw))
    .bind(&op.entry_order_id)
    .bind(&op.exit_order_id)
    .bind(op.weighted_entry_price.raw())
    .bind(op.filled_quantity.raw().to_string())
    .bind(op.created_at)
    .fetch_one(pool)
    .await
    .context("insert_operation failed")?;

    Ok(row.try_get("id")?)
}

pub async fn list_operations(
    pool: &PgPool,
    tenant_id: TenantId,
    status: Option<&str>,
) -> Result<Vec<Operation>> {
    let rows = match status {
        Some(s) => {
            sqlx::query(
                r#"
                select id, tenant_id, symbol, strategy_id, side, status,
                  stop_price, target_price, entry_order_id, exit_order_id,
                  weighted_entry_price, filled_quantity, created_at
                from operations
                where tenant_id = $1 and status = $2
                order by created_at desc
                "#,
            )
            .bind(tenant_id)
            .bind(s)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query(
                r#"
                select id, tenant_id, symbol, strategy_id, side, status,
                  stop_price, target_price, entry_order_id, exit_order_id,
                  weighted_entry_price, filled_quantity, created_at
                from operations
                where tenant_id = $1
                order by created_at desc
                "#,
            )
            .bind(tenant_id)
            .fetch_all(pool)
            .await
        }
    }
    .context("list_operations failed")?;

    rows.iter()
        .map(|row| {
            Ok(Operation {
                id: row.try_get("id")?,
                tenant_id: row.try_get("tenant_id")?,
                symbol: row.try_get("symbol")?,
                strategy_id: row.try_get("strategy_id")?,
                side: side_from_str(&row.try_get::<String, _>("side")?)?,
                status: serde_json::from_value(serde_json::Value::String(
                    row.try_get::<String, _>("status")?,
                ))
                .context("decode operation status failed")?,
                stop_price: Micros::new(row.try_get("stop_price")?),
                target_price: row.try_get::<Option<i64>, _>("target_price")?.map(Micros::new),
                entry_order_id: row.try_get("entry_order_id")?,
                exit_order_id: row.try_get("exit_order_id")?,
                weighted_entry_price: Micros::new(row.try_get("weighted_entry_price")?),
                filled_quantity: decode_decimal8(row, "filled_quantity")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

pub async fn update_operation_status(
    pool: &PgPool,
    tenant_id: TenantId,
    id: i64,
    status: OperationStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        update operations
        set status = $3
        where tenant_id = $1 and id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(id)
    .bind(operation_status_str(status))
    .execute(pool)
    .await
    .context("update_operation_status failed")?;

    Ok(())
}

fn operation_status_str(status: OperationStatus) -> &'static str {
    use OperationStatus::*;
    match status {
        Planned => "PLANNED",
        Active => "ACTIVE",
        Closed => "CLOSED",
        Cancelled => "CANCELLED",
    }
}

// ---------------------------------------------------------------------------
// Margin positions (C9)
// ---------------------------------------------------------------------------

pub async fn insert_margin_position(pool: &PgPool, pos: &MarginPosition) -> Result<i64> {
    let row = sqlx::query(
        r#"
        insert into margin_positions (
          tenant_id, symbol, side, leverage, entry_price,
          quantity, current_price, margin_level, risk_amount,
          risk_percent, stop_price, status
        ) values (
          $1, $2, $3, $4, $5,
          $6, $7, $8, $9,
          $10, $11, $12
        )
        returning id
        "#,
    )
    .bind(pos.tenant_id)
    .bind(&pos.symbol)
    .bind(side_to_str(pos.side))
    .bind(pos.leverage)
    .bind(pos.entry_price.raw())
    .bind(pos.quantity.raw().to_string())
    .bind(pos.current_price.raw())
    .bind(pos.margin_level)
    .bind(pos.risk_amount.raw())
    .bind(pos.risk_percent)
    .bind(pos.stop_price.raw())
    .bind(margin_status_str(pos.status))
    .fetch_one(pool)
    .await
    .context("insert_margin_position failed")?;

    Ok(row.try_get("id")?)
}

pub async fn list_open_margin_positions(
    pool: &PgPool,
    tenant_id: TenantId,
) -> Result<Vec<MarginPosition>> {
    let rows = sqlx::query(
        r#"
        select id, tenant_id, symbol, side, leverage, entry_price,
          quantity, current_price, margin_level, risk_amount,
          risk_percent, stop_price, status
        from margin_positions
        where tenant_id = $1 and status = 'OPEN'
        order by id
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
    .context("list_open_margin_positions failed")?;

    rows.iter()
        .map(|row| {
            Ok(MarginPosition {
                id: row.try_get("id")?,
                tenant_id: row.try_get("tenant_id")?,
                symbol: row.try_get("symbol")?,
                side: side_from_str(&row.try_get::<String, _>("side")?)?,
                leverage: row.try_get("leverage")?,
                entry_price: Micros::new(row.try_get("entry_price")?),
                quantity: decode_decimal8(row, "quantity")?,
                current_price: Micros::new(row.try_get("current_price")?),
                margin_level: row.try_get("margin_level")?,
                risk_amount: Micros::new(row.try_get("risk_amount")?),
                risk_percent: row.try_get("risk_percent")?,
                stop_price: Micros::new(row.try_get("stop_price")?),
                status: serde_json::from_value(serde_json::Value::String(
                    row.try_get::<String, _>("status")?,
                ))
                .context("decode margin position status failed")?,
            })
        })
        .collect()
}

pub async fn update_margin_position_price(
    pool: &PgPool,
    tenant_id: TenantId,
    id: i64,
    current_price: Micros,
    margin_level: Option<f64>,
) -> Result<()> {
    sqlx::query(
        r#"
        update margin_positions
        set current_price = $3, margin_level = $4
        where tenant_id = $1 and id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(id)
    .bind(current_price.raw())
    .bind(margin_level)
    .execute(pool)
    .await
    .context("update_margin_position_price failed")?;

    Ok(())
}

pub async fn close_margin_position(pool: &PgPool, tenant_id: TenantId, id: i64) -> Result<()> {
    sqlx::query(
        r#"
        update margin_positions
        set status = 'CLOSED'
        where tenant_id = $1 and id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(id)
    .execute(pool)
    .await
    .context("close_margin_position failed")?;

    Ok(())
}

fn margin_status_str(status: MarginPositionStatus) -> &'static str {
    match status {
        MarginPositionStatus::Open => "OPEN",
        MarginPositionStatus::Closed => "CLOSED",
    }
}

// ---------------------------------------------------------------------------
// Policy state (C7 monthly drawdown guard)
// ---------------------------------------------------------------------------

pub async fn upsert_policy_state(pool: &PgPool, policy: &PolicyState) -> Result<()> {
    sqlx::query(
        r#"
        insert into policy_states (
          tenant_id, month, status, starting_capital, current_capital,
          realized_pnl, unrealized_pnl, trade_count, winning_trades,
          max_drawdown_percent, max_trades_per_day, paused_at, pause_reason
        ) values (
          $1, $2, $3, $4, $5,
          $6, $7, $8, $9,
          $10, $11, $12, $13
        )
        on conflict (tenant_id, month) do update set
          status = excluded.status,
          current_capital = excluded.current_capital,
          realized_pnl = excluded.realized_pnl,
          unrealized_pnl = excluded.unrealized_pnl,
          trade_count = excluded.trade_count,
          winning_trades = excluded.winning_trades,
          paused_at = excluded.paused_at,
          pause_reason = excluded.pause_reason
        "#,
    )
    .bind(policy.tenant_id)
    .bind(&policy.month)
    .bind(policy_status_str(policy.status))
    .bind(policy.starting_capital.raw())
    .bind(policy.current_capital.raw())
    .bind(policy.realized_pnl.raw())
    .bind(policy.unrealized_pnl.raw())
    .bind(policy.trade_count as i32)
    .bind(policy.winning_trades as i32)
    .bind(policy.max_drawdown_percent)
    .bind(policy.max_trades_per_day as i32)
    .bind(policy.paused_at)
    .bind(&policy.pause_reason)
    .execute(pool)
    .await
    .context("upsert_policy_state failed")?;

    Ok(())
}

pub async fn fetch_policy_state(
    pool: &PgPool,
    tenant_id: TenantId,
    month: &str,
) -> Result<Option<PolicyState>> {
    let row = sqlx::query(
        r#"
        select tenant_id, month, status, starting_capital, current_capital,
          realized_pnl, unrealized_pnl, trade_count, winning_trades,
          max_drawdown_percent, max_trades_per_day, paused_at, pause_reason
        from policy_states
        where tenant_id = $1 and month = $2
        "#,
    )
    .bind(tenant_id)
    .bind(month)
    .fetch_optional(pool)
    .await
    .context("fetch_policy_state failed")?;

    let Some(row) = row else { return Ok(None) };

    Ok(Some(PolicyState {
        tenant_id: row.try_get("tenant_id")?,
        month: row.try_get("month")?,
        status: serde_json::from_value(serde_json::Value::String(
            row.try_get::<String, _>("status")?,
        ))
        .context("decode policy status failed")?,
        starting_capital: Micros::new(row.try_get("starting_capital")?),
        current_capital: Micros::new(row.try_get("current_capital")?),
        realized_pnl: Micros::new(row.try_get("realized_pnl")?),
        unrealized_pnl: Micros::new(row.try_get("unrealized_pnl")?),
        trade_count: row.try_get::<i32, _>("trade_count")? as u32,
        winning_trades: row.try_get::<i32, _>("winning_trades")? as u32,
        max_drawdown_percent: row.try_get("max_drawdown_percent")?,
        max_trades_per_day: row.try_get::<i32, _>("max_trades_per_day")? as u32,
        paused_at: row.try_get("paused_at")?,
        pause_reason: row.try_get("pause_reason")?,
    }))
}

fn policy_status_str(status: PolicyStatus) -> &'static str {
    match status {
        PolicyStatus::Active => "ACTIVE",
        PolicyStatus::Paused => "PAUSED",
        PolicyStatus::Suspended => "SUSPENDED",
    }
}

// ---------------------------------------------------------------------------
// Stop adjustments (C6 trailing stop) — adjustment_token is the idempotency
// key; replaying the same token must not double-apply a stop move.
// ---------------------------------------------------------------------------

/// Returns `Ok(false)` without inserting if `adjustment_token` was already
/// recorded.
pub async fn record_stop_adjustment(pool: &PgPool, adj: &StopAdjustment) -> Result<bool> {
    let res = sqlx::query(
        r#"
        insert into stop_adjustments (
          position_id, old_stop, new_stop, reason, adjustment_token,
          ts_utc, current_price, spans_crossed, step_index, metadata
        ) values (
          $1, $2, $3, $4, $5,
          $6, $7, $8, $9, $10
        )
        "#,
    )
    .bind(adj.position_id)
    .bind(adj.old_stop.raw())
    .bind(adj.new_stop.raw())
    .bind(adjustment_reason_str(adj.reason))
    .bind(&adj.adjustment_token)
    .bind(adj.timestamp)
    .bind(adj.current_price.raw())
    .bind(adj.spans_crossed)
    .bind(adj.step_index)
    .bind(&adj.metadata)
    .execute(pool)
    .await;

    match res {
        Ok(_) => Ok(true),
        Err(e) if is_unique_constraint_violation(&e, "stop_adjustments_adjustment_token_key") => {
            Ok(false)
        }
        Err(e) => Err(anyhow::Error::new(e).context("record_stop_adjustment failed")),
    }
}

pub async fn list_stop_adjustments(
    pool: &PgPool,
    position_id: i64,
) -> Result<Vec<StopAdjustment>> {
    let rows = sqlx::query(
        r#"
        select position_id, old_stop, new_stop, reason, adjustment_token,
          ts_utc, current_price, spans_crossed, step_index, metadata
        from stop_adjustments
        where position_id = $1
        order by ts_utc
        "#,
    )
    .bind(position_id)
    .fetch_all(pool)
    .await
    .context("list_stop_adjustments failed")?;

    rows.iter()
        .map(|row| {
            Ok(StopAdjustment {
                position_id: row.try_get("position_id")?,
                old_stop: Micros::new(row.try_get("old_stop")?),
                new_stop: Micros::new(row.try_get("new_stop")?),
                reason: serde_json::from_value(serde_json::Value::String(
                    row.try_get::<String, _>("reason")?,
                ))
                .context("decode adjustment reason failed")?,
                adjustment_token: row.try_get("adjustment_token")?,
                timestamp: row.try_get("ts_utc")?,
                current_price: Micros::new(row.try_get("current_price")?),
                spans_crossed: row.try_get("spans_crossed")?,
                step_index: row.try_get("step_index")?,
                metadata: row.try_get("metadata")?,
            })
        })
        .collect()
}

fn adjustment_reason_str(reason: AdjustmentReason) -> &'static str {
    match reason {
        AdjustmentReason::NoAdjustment => "NO_ADJUSTMENT",
        AdjustmentReason::BreakEven => "BREAK_EVEN",
        AdjustmentReason::Trailing => "TRAILING",
    }
}

// ---------------------------------------------------------------------------
// Audit transactions / entry gate decisions (C11 ledgers)
// ---------------------------------------------------------------------------

pub async fn insert_audit_transaction(pool: &PgPool, tx: &AuditTransaction) -> Result<()> {
    sqlx::query(
        r#"
        insert into audit_transactions (
          tenant_id, transaction_type, symbol, side, quantity,
          price, fee, ts_utc, raw_response
        ) values (
          $1, $2, $3, $4, $5,
          $6, $7, $8, $9
        )
        "#,
    )
    .bind(tx.tenant_id)
    .bind(&tx.transaction_type)
    .bind(&tx.symbol)
    .bind(tx.side.map(side_to_str))
    .bind(tx.quantity.map(|q| q.raw().to_string()))
    .bind(tx.price.map(Micros::raw))
    .bind(tx.fee.map(Micros::raw))
    .bind(tx.ts_utc)
    .bind(&tx.raw_response)
    .execute(pool)
    .await
    .context("insert_audit_transaction failed")?;

    Ok(())
}

pub async fn insert_entry_gate_decision(pool: &PgPool, decision: &EntryGateDecision) -> Result<()> {
    sqlx::query(
        r#"
        insert into entry_gate_decisions (
          tenant_id, allowed, reasons, details, context, ts_utc
        ) values (
          $1, $2, $3, $4, $5, $6
        )
        "#,
    )
    .bind(decision.tenant_id)
    .bind(decision.allowed)
    .bind(serde_json::to_value(&decision.reasons)?)
    .bind(&decision.details)
    .bind(&decision.context)
    .bind(decision.ts_utc)
    .execute(pool)
    .await
    .context("insert_entry_gate_decision failed")?;

    Ok(())
}
