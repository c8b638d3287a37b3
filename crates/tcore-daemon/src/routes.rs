//! Axum router and all HTTP handlers for tcore-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Every handler is `pub(crate)` so the scenario tests
//! under `tests/` can compose the router directly.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tcore_schemas::{
    ExecutionMode, IntentStatus, Micros, Operation, OperationStatus, PatternTrigger, Side, Symbol,
    TradingIntent,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    api_types::{
        AutoCalculateBody, AutoCalculateResponse, CreateIntentBody, ErrorResponse,
        ExecuteIntentQuery, ListIntentsQuery, ListOperationsQuery, PatternTriggerBody,
        PatternTriggerResponse, PortfolioPositionsQuery, RiskManagedTradeBody,
        RiskManagedTradeResponse, RiskManagedValidateBody, RiskStatusQuery, TenantQuery,
    },
    state::AppState,
};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/trading-intents/create", post(create_trading_intent))
        .route("/trading-intents/auto-calculate", post(auto_calculate))
        .route("/trading-intents/:id", get(get_trading_intent))
        .route("/trading-intents", get(list_trading_intents))
        .route("/trading-intents/:id/validate", post(validate_trading_intent))
        .route("/trading-intents/:id/execute", post(execute_trading_intent))
        .route("/pattern-triggers", post(pattern_triggers))
        .route("/operations", get(list_operations))
        .route("/operations/:id", get(get_operation))
        .route("/operations/:id/cancel", post(cancel_operation_handler))
        .route("/trade/risk-managed/buy", post(risk_managed_buy))
        .route("/trade/risk-managed/sell", post(risk_managed_sell))
        .route("/trade/risk-managed/validate", post(risk_managed_validate))
        .route("/trade/risk-status", get(risk_status))
        .route("/portfolio/positions", get(portfolio_positions))
        .with_state(state)
}

fn err(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(msg))).into_response()
}

/// Maps `IntentError` to its wire status/body per spec §7/§8: a partial
/// manual payload or a `mode=auto` request carrying manual fields is a
/// structured 400, not a flat 422.
fn intent_error_response(e: tcore_intent::IntentError) -> Response {
    match e {
        tcore_intent::IntentError::PartialManualPayload(fields) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::missing_fields("partial manual payload", fields)),
        )
            .into_response(),
        tcore_intent::IntentError::ManualFieldsInAutoMode(fields) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::fields_not_allowed("mode=auto rejects manually-supplied fields", fields)),
        )
            .into_response(),
        other => (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorResponse::new(other.to_string()))).into_response(),
    }
}

/// Loads the tenant's current-month PolicyState for the MonthlyDrawdown
/// guard (spec §4.11 step 1). Missing state (a tenant with no trades yet
/// this month) or a DB error is treated as "nothing to check" rather than
/// blocking execution — the guard only applies once a policy row exists.
async fn load_current_policy_state(st: &AppState, tenant_id: tcore_schemas::TenantId) -> Option<tcore_schemas::PolicyState> {
    let month = st.clock.now_millis().format("%Y-%m").to_string();
    tcore_db::fetch_policy_state(&st.pool, tenant_id, &month).await.ok().flatten()
}

async fn load_symbol(st: &AppState, name: &str) -> Result<Symbol, Response> {
    match tcore_db::fetch_symbol(&st.pool, name).await {
        Ok(Some(s)) => Ok(s),
        Ok(None) => Err(err(StatusCode::NOT_FOUND, format!("unknown symbol {name}"))),
        Err(e) => Err(err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

async fn load_strategy(
    st: &AppState,
    tenant_id: tcore_schemas::TenantId,
    id: i64,
) -> Result<tcore_schemas::Strategy, Response> {
    tcore_db::fetch_strategy(&st.pool, tenant_id, id)
        .await
        .map_err(|_| err(StatusCode::NOT_FOUND, format!("unknown strategy {id}")))
}

async fn load_intent(
    st: &AppState,
    tenant_id: tcore_schemas::TenantId,
    intent_id: Uuid,
) -> Result<TradingIntent, Response> {
    tcore_db::fetch_trading_intent(&st.pool, tenant_id, intent_id)
        .await
        .map_err(|_| err(StatusCode::NOT_FOUND, format!("unknown trading intent {intent_id}")))
}

// ---------------------------------------------------------------------------
// POST /trading-intents/create
// ---------------------------------------------------------------------------

pub(crate) async fn create_trading_intent(
    State(st): State<Arc<AppState>>,
    Json(body): Json<CreateIntentBody>,
) -> Response {
    match do_create_intent(&st, body).await {
        Ok(intent) => (StatusCode::CREATED, Json(intent)).into_response(),
        Err(resp) => resp,
    }
}

async fn do_create_intent(st: &AppState, body: CreateIntentBody) -> Result<TradingIntent, Response> {
    let symbol = load_symbol(st, &body.symbol).await?;
    let strategy = load_strategy(st, body.tenant_id, body.strategy_id).await?;

    let manual = tcore_intent::ManualParams {
        side: body.side,
        entry_price: body.entry_price.map(Micros::from_f64),
        stop_price: body.stop_price.map(Micros::from_f64),
        capital: body.capital.map(Micros::from_f64),
    };
    let mode = if body.auto == Some(true) {
        tcore_intent::RequestedMode::Explicit { auto: true }
    } else {
        tcore_intent::RequestedMode::Inferred
    };

    let req = tcore_intent::CreateIntentRequest {
        tenant_id: body.tenant_id,
        mode,
        manual,
        regime: body.regime,
        reason: body.reason,
        pattern_code: body.pattern_code,
        pattern_event_id: body.pattern_event_id,
        pattern_source: body.pattern_source,
    };

    let intent = tcore_intent::CreateTradingIntentUseCase::execute(
        req,
        st.exchange.as_ref(),
        &symbol,
        &strategy,
        st.clock.as_ref(),
    )
    .await
    .map_err(intent_error_response)?;

    tcore_db::insert_trading_intent(&st.pool, &intent)
        .await
        .map_err(|e| err(StatusCode::CONFLICT, e.to_string()))?;

    st.bus.publish("intent.created", &json!({"intent_id": intent.intent_id, "tenant_id": intent.tenant_id}));
    info!(intent_id = %intent.intent_id, tenant_id = intent.tenant_id, "trading intent created");

    Ok(intent)
}

// ---------------------------------------------------------------------------
// GET /trading-intents/{id}
// ---------------------------------------------------------------------------

pub(crate) async fn get_trading_intent(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
) -> Response {
    match load_intent(&st, q.tenant_id, id).await {
        Ok(intent) => (StatusCode::OK, Json(intent)).into_response(),
        Err(resp) => resp,
    }
}

// ---------------------------------------------------------------------------
// GET /trading-intents (filters)
// ---------------------------------------------------------------------------

pub(crate) async fn list_trading_intents(
    State(st): State<Arc<AppState>>,
    Query(q): Query<ListIntentsQuery>,
) -> Response {
    let rows = match tcore_db::list_trading_intents(&st.pool, q.tenant_id, q.status.as_deref()).await {
        Ok(rows) => rows,
        Err(e) => return err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let mut filtered: Vec<TradingIntent> = rows
        .into_iter()
        .filter(|i| q.strategy.map(|s| s == i.strategy_id).unwrap_or(true))
        .filter(|i| q.symbol.as_deref().map(|s| s == i.symbol).unwrap_or(true))
        .collect();

    let offset = q.offset.unwrap_or(0).max(0) as usize;
    let limit = q.limit.unwrap_or(1000).clamp(1, 1000) as usize;
    if offset < filtered.len() {
        filtered.drain(0..offset);
    } else {
        filtered.clear();
    }
    filtered.truncate(limit);

    (StatusCode::OK, Json(filtered)).into_response()
}

// ---------------------------------------------------------------------------
// POST /trading-intents/{id}/validate
// ---------------------------------------------------------------------------

pub(crate) async fn validate_trading_intent(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(q): Query<TenantQuery>,
) -> Response {
    let mut intent = match load_intent(&st, q.tenant_id, id).await {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    let risk_config = json!({
        "max_drawdown_percent": tcore_risk::DEFAULT_MAX_DRAWDOWN_PERCENT,
        "stop_loss_percent": intent.risk_percent,
    });
    let ctx = tcore_risk::PlanContext {
        tenant_id: q.tenant_id,
        risk_config,
        operation_type: "TRADING_INTENT".to_string(),
        symbol: intent.symbol.clone(),
        quantity: intent.quantity,
    };
    let report = tcore_risk::ValidatePlanUseCase::execute(&ctx);
    let passed = report.is_pass();

    if let Err(e) = tcore_intent::validate_intent(&mut intent, report.to_dict(), passed, st.clock.as_ref()) {
        return err(StatusCode::CONFLICT, e.to_string());
    }

    if let Err(e) = tcore_db::mark_intent_validated(&st.pool, q.tenant_id, id, &report.to_dict()).await {
        return err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    st.bus.publish("intent.validated", &json!({"intent_id": id, "passed": passed}));
    (StatusCode::OK, Json(json!({"intent": intent, "validation": report.to_dict()}))).into_response()
}

// ---------------------------------------------------------------------------
// POST /trading-intents/{id}/execute?mode=dry-run|live
// ---------------------------------------------------------------------------

pub(crate) async fn execute_trading_intent(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(q): Query<ExecuteIntentQuery>,
) -> Response {
    let mode = match parse_mode(q.mode.as_deref()) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    if mode == ExecutionMode::Live && !st.config.trading_enabled {
        return err(
            StatusCode::FORBIDDEN,
            "TRADING_ENABLED is false; live execution is disabled",
        );
    }

    let mut intent = match load_intent(&st, q.tenant_id, id).await {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    if intent.status != IntentStatus::Validated {
        return err(StatusCode::CONFLICT, "intent is not VALIDATED");
    }

    let policy = load_current_policy_state(&st, q.tenant_id).await;
    let guards = build_execution_guards(&intent, mode, q.confirmed.unwrap_or(false), policy.as_ref());
    let request = tcore_execution::ExecutionRequest {
        symbol: intent.symbol.clone(),
        side: intent.side,
        quantity: intent.quantity,
        is_opening: true,
        stop_price: Some(intent.stop_price),
        existing_stop_order_id: None,
    };

    let result = tcore_execution::execute(st.exchange.as_ref(), st.clock.as_ref(), mode, guards, request).await;
    let succeeded = result.status == tcore_schemas::ExecutionStatus::Success;
    let result_json = serde_json::to_value(&result).unwrap_or(Value::Null);

    if let Err(e) = tcore_intent::execute_intent(&mut intent, result_json.clone(), succeeded, st.clock.as_ref()) {
        return err(StatusCode::CONFLICT, e.to_string());
    }

    let db_result = if succeeded {
        tcore_db::mark_intent_executed(&st.pool, q.tenant_id, id, &result_json).await
    } else {
        let msg = result.error.clone().unwrap_or_else(|| "execution failed".to_string());
        tcore_db::mark_intent_failed(&st.pool, q.tenant_id, id, &msg).await
    };
    if let Err(e) = db_result {
        return err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    if succeeded {
        let entry_order_id = result
            .actions
            .iter()
            .find(|a| matches!(a.action_type, tcore_execution::ActionType::MarketBuy | tcore_execution::ActionType::MarketSell))
            .and_then(|a| a.order_id.clone());

        let operation = Operation {
            id: 0,
            tenant_id: q.tenant_id,
            symbol: intent.symbol.clone(),
            strategy_id: intent.strategy_id,
            side: intent.side,
            status: OperationStatus::Active,
            stop_price: intent.stop_price,
            target_price: intent.target_price,
            entry_order_id,
            exit_order_id: None,
            weighted_entry_price: intent.entry_price,
            filled_quantity: intent.quantity,
            created_at: st.clock.now_millis(),
        };
        if let Err(e) = tcore_db::insert_operation(&st.pool, &operation).await {
            warn!(error = %e, "failed to persist operation after successful execution");
        }

        let audit = tcore_schemas::AuditTransaction {
            tenant_id: q.tenant_id,
            transaction_type: format!("{:?}", intent.side).to_uppercase(),
            symbol: Some(intent.symbol.clone()),
            side: Some(intent.side),
            quantity: Some(intent.quantity),
            price: Some(intent.entry_price),
            fee: None,
            ts_utc: st.clock.now_millis(),
            raw_response: result_json.clone(),
        };
        if let Err(e) = tcore_db::insert_audit_transaction(&st.pool, &audit).await {
            warn!(error = %e, "failed to persist audit transaction");
        }
    }

    st.bus.publish("intent.executed", &json!({"intent_id": id, "succeeded": succeeded}));
    (StatusCode::OK, Json(json!({"intent": intent, "execution": result}))).into_response()
}

fn parse_mode(raw: Option<&str>) -> Result<ExecutionMode, Response> {
    match raw.unwrap_or("dry-run") {
        "dry-run" => Ok(ExecutionMode::DryRun),
        "live" => Ok(ExecutionMode::Live),
        other => Err(err(StatusCode::BAD_REQUEST, format!("invalid mode '{other}', expected dry-run|live"))),
    }
}

/// Builds the full execution guard set (spec §4.11 step 1: "run all
/// applicable guards against the Intent + PolicyState context"). `confirmed`
/// is the caller's explicit LIVE-confirmation flag, not inferred from
/// `mode` — `check_trade_intent` already relaxes the confirmation
/// requirement for DRY_RUN on its own. `policy` adds MonthlyDrawdown when
/// the tenant has a policy row for the current month; DRY_RUN never skips
/// it (spec §4.7: "NEVER relaxes RiskManagement or MonthlyDrawdown").
fn build_execution_guards(
    intent: &TradingIntent,
    mode: ExecutionMode,
    confirmed: bool,
    policy: Option<&tcore_schemas::PolicyState>,
) -> Vec<tcore_risk::GuardOutcome> {
    let risk_input = tcore_risk::RiskManagementInput {
        entry_price: intent.entry_price,
        stop_price: Some(intent.stop_price),
        side: intent.side,
        capital: intent.capital,
        quantity: intent.quantity,
        max_risk_percent: tcore_sizing::DEFAULT_MAX_RISK_PERCENT,
    };
    let trade_intent_input = tcore_risk::TradeIntentInput {
        mode,
        strategy_name: Some(intent.regime.clone()),
        confirmed,
        emotional_check_passed: None,
    };
    let mut guards = vec![
        tcore_risk::check_risk_management(&risk_input),
        tcore_risk::check_trade_intent(&trade_intent_input),
    ];

    if let Some(state) = policy {
        let effective_capital = state.current_capital.saturating_add(state.unrealized_pnl);
        let monthly_pnl = effective_capital.saturating_sub(state.starting_capital);
        guards.push(tcore_risk::check_monthly_drawdown(&tcore_risk::MonthlyDrawdownInput {
            monthly_pnl,
            capital: state.starting_capital,
            max_drawdown_percent: state.max_drawdown_percent,
            force_override: false,
        }));
    }

    guards
}

// ---------------------------------------------------------------------------
// POST /trading-intents/auto-calculate
// ---------------------------------------------------------------------------

pub(crate) async fn auto_calculate(
    State(st): State<Arc<AppState>>,
    Json(body): Json<AutoCalculateBody>,
) -> Response {
    let symbol = match load_symbol(&st, &body.symbol).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let strategy = match load_strategy(&st, body.tenant_id, body.strategy_id).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let level_n = body.level_n.unwrap_or(2);
    match tcore_autoparams::calculate(st.exchange.as_ref(), body.tenant_id, &symbol, &strategy, level_n).await {
        Ok(proposal) => (
            StatusCode::OK,
            Json(AutoCalculateResponse {
                side: proposal.side,
                side_source: proposal.side_source,
                entry_price: proposal.entry_price,
                stop_price: proposal.stop_price,
                capital: proposal.capital,
                capital_source: proposal.capital_source,
                quantity: proposal.quantity,
                risk_amount: proposal.risk_amount,
                position_value: proposal.position_value,
                timeframe: proposal.timeframe,
                method_used: proposal.method_used,
                confidence: proposal.confidence,
                confidence_float: proposal.confidence_float,
                warnings: proposal.warnings,
            }),
        )
            .into_response(),
        Err(e) => err(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// POST /pattern-triggers
// ---------------------------------------------------------------------------

pub(crate) async fn pattern_triggers(
    State(st): State<Arc<AppState>>,
    Json(body): Json<PatternTriggerBody>,
) -> Response {
    if let Ok(Some(existing)) = tcore_db::fetch_pattern_trigger(&st.pool, body.tenant_id, &body.pattern_event_id).await {
        return (
            StatusCode::OK,
            Json(PatternTriggerResponse { intent_id: existing.intent_id, already_existed: true }),
        )
            .into_response();
    }

    let gate = tcore_risk::check_entry_gate(&tcore_risk::EntryGateInput::default());
    let allowed = gate.iter().all(|g| g.passed);
    let decision = tcore_schemas::EntryGateDecision {
        tenant_id: body.tenant_id,
        allowed,
        reasons: gate.iter().map(|g| g.name.to_string()).collect(),
        details: json!(gate.iter().map(tcore_execution::GuardOutcomeDto::from).collect::<Vec<_>>()),
        context: json!({"pattern_event_id": body.pattern_event_id, "symbol": body.symbol}),
        ts_utc: st.clock.now_millis(),
    };
    if let Err(e) = tcore_db::insert_entry_gate_decision(&st.pool, &decision).await {
        warn!(error = %e, "failed to persist entry gate decision");
    }
    if !allowed {
        return err(StatusCode::FORBIDDEN, "entry gate refused this pattern trigger");
    }

    let create_body = CreateIntentBody {
        tenant_id: body.tenant_id,
        symbol: body.symbol,
        strategy_id: body.strategy_id,
        auto: Some(true),
        side: None,
        entry_price: None,
        stop_price: None,
        capital: None,
        regime: body.regime,
        reason: body.reason,
        pattern_code: body.pattern_code,
        pattern_event_id: Some(body.pattern_event_id.clone()),
        pattern_source: body.pattern_source,
    };
    let intent = match do_create_intent(&st, create_body).await {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    let trigger = PatternTrigger {
        tenant_id: body.tenant_id,
        pattern_event_id: body.pattern_event_id,
        intent_id: intent.intent_id,
        created_at: st.clock.now_millis(),
    };
    match tcore_db::record_pattern_trigger(&st.pool, &trigger).await {
        Ok(true) => (
            StatusCode::CREATED,
            Json(PatternTriggerResponse { intent_id: intent.intent_id, already_existed: false }),
        )
            .into_response(),
        Ok(false) => (
            StatusCode::OK,
            Json(PatternTriggerResponse { intent_id: intent.intent_id, already_existed: true }),
        )
            .into_response(),
        Err(e) => err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// GET /operations, GET /operations/{id}, POST /operations/{id}/cancel
// ---------------------------------------------------------------------------

pub(crate) async fn list_operations(
    State(st): State<Arc<AppState>>,
    Query(q): Query<ListOperationsQuery>,
) -> Response {
    match tcore_db::list_operations(&st.pool, q.tenant_id, q.status.as_deref()).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn find_operation(st: &AppState, tenant_id: tcore_schemas::TenantId, id: i64) -> Result<Operation, Response> {
    let rows = tcore_db::list_operations(&st.pool, tenant_id, None)
        .await
        .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    rows.into_iter()
        .find(|o| o.id == id)
        .ok_or_else(|| err(StatusCode::NOT_FOUND, format!("unknown operation {id}")))
}

pub(crate) async fn get_operation(
    State(st): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(q): Query<TenantQuery>,
) -> Response {
    match find_operation(&st, q.tenant_id, id).await {
        Ok(op) => (StatusCode::OK, Json(op)).into_response(),
        Err(resp) => resp,
    }
}

pub(crate) async fn cancel_operation_handler(
    State(st): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(q): Query<TenantQuery>,
) -> Response {
    let mut op = match find_operation(&st, q.tenant_id, id).await {
        Ok(op) => op,
        Err(resp) => return resp,
    };

    match tcore_operations::cancel_operation(&mut op) {
        Ok(outcome) => {
            if let Err(e) = tcore_db::update_operation_status(&st.pool, q.tenant_id, id, op.status).await {
                return err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
            st.bus.publish("operation.cancelled", &json!({"operation_id": id}));
            (StatusCode::OK, Json(json!({"operation": op, "already_cancelled": matches!(outcome, tcore_operations::CancelOutcome::AlreadyCancelled)}))).into_response()
        }
        Err(conflict) => err(StatusCode::CONFLICT, conflict.to_string()),
    }
}

// ---------------------------------------------------------------------------
// POST /trade/risk-managed/{buy,sell}
// ---------------------------------------------------------------------------

pub(crate) async fn risk_managed_buy(
    State(st): State<Arc<AppState>>,
    Json(body): Json<RiskManagedTradeBody>,
) -> Response {
    risk_managed_trade(st, body, Side::Buy).await
}

pub(crate) async fn risk_managed_sell(
    State(st): State<Arc<AppState>>,
    Json(body): Json<RiskManagedTradeBody>,
) -> Response {
    risk_managed_trade(st, body, Side::Sell).await
}

async fn risk_managed_trade(st: Arc<AppState>, body: RiskManagedTradeBody, side: Side) -> Response {
    let mode = match parse_mode(body.mode.as_deref()) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    if mode == ExecutionMode::Live && !st.config.trading_enabled {
        return err(StatusCode::FORBIDDEN, "TRADING_ENABLED is false; live execution is disabled");
    }

    let create_body = CreateIntentBody {
        tenant_id: body.tenant_id,
        symbol: body.symbol,
        strategy_id: body.strategy_id,
        auto: Some(false),
        side: Some(side),
        entry_price: Some(body.entry_price),
        stop_price: Some(body.stop_price),
        capital: Some(body.capital),
        regime: body.regime,
        reason: body.reason,
        pattern_code: None,
        pattern_event_id: None,
        pattern_source: None,
    };
    let mut intent = match do_create_intent(&st, create_body).await {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    let risk_config = json!({
        "max_drawdown_percent": tcore_risk::DEFAULT_MAX_DRAWDOWN_PERCENT,
        "stop_loss_percent": intent.risk_percent,
    });
    let ctx = tcore_risk::PlanContext {
        tenant_id: body.tenant_id,
        risk_config,
        operation_type: "RISK_MANAGED_TRADE".to_string(),
        symbol: intent.symbol.clone(),
        quantity: intent.quantity,
    };
    let report = tcore_risk::ValidatePlanUseCase::execute(&ctx);
    let passed = report.is_pass();
    if let Err(e) = tcore_intent::validate_intent(&mut intent, report.to_dict(), passed, st.clock.as_ref()) {
        return err(StatusCode::CONFLICT, e.to_string());
    }
    let _ = tcore_db::mark_intent_validated(&st.pool, body.tenant_id, intent.intent_id, &report.to_dict()).await;

    if !passed {
        return (
            StatusCode::OK,
            Json(RiskManagedTradeResponse { intent, validation: report.to_dict(), execution: Value::Null }),
        )
            .into_response();
    }

    let policy = load_current_policy_state(&st, body.tenant_id).await;
    let guards = build_execution_guards(&intent, mode, body.confirmed.unwrap_or(false), policy.as_ref());
    let request = tcore_execution::ExecutionRequest {
        symbol: intent.symbol.clone(),
        side: intent.side,
        quantity: intent.quantity,
        is_opening: true,
        stop_price: Some(intent.stop_price),
        existing_stop_order_id: None,
    };
    let result = tcore_execution::execute(st.exchange.as_ref(), st.clock.as_ref(), mode, guards, request).await;
    let succeeded = result.status == tcore_schemas::ExecutionStatus::Success;
    let result_json = serde_json::to_value(&result).unwrap_or(Value::Null);
    let _ = tcore_intent::execute_intent(&mut intent, result_json.clone(), succeeded, st.clock.as_ref());
    let _ = if succeeded {
        tcore_db::mark_intent_executed(&st.pool, body.tenant_id, intent.intent_id, &result_json).await
    } else {
        tcore_db::mark_intent_failed(&st.pool, body.tenant_id, intent.intent_id, result.error.as_deref().unwrap_or("execution failed")).await
    };

    (
        StatusCode::OK,
        Json(RiskManagedTradeResponse { intent, validation: report.to_dict(), execution: result_json }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /trade/risk-managed/validate
// ---------------------------------------------------------------------------

pub(crate) async fn risk_managed_validate(Json(body): Json<RiskManagedValidateBody>) -> Response {
    let capital = Micros::from_f64(body.capital);
    let entry_price = Micros::from_f64(body.entry_price);
    let stop_price = Micros::from_f64(body.stop_price);
    let sizing = tcore_sizing::size(capital, entry_price, stop_price, body.max_risk_percent.unwrap_or(tcore_sizing::DEFAULT_MAX_RISK_PERCENT));

    let risk_input = tcore_risk::RiskManagementInput {
        entry_price,
        stop_price: Some(stop_price),
        side: body.side,
        capital,
        quantity: sizing.quantity,
        max_risk_percent: body.max_risk_percent.unwrap_or(tcore_sizing::DEFAULT_MAX_RISK_PERCENT),
    };
    let guard = tcore_risk::check_risk_management(&risk_input);

    let ctx = tcore_risk::PlanContext {
        tenant_id: body.tenant_id,
        risk_config: json!({
            "max_drawdown_percent": body.max_drawdown_percent.unwrap_or(tcore_risk::DEFAULT_MAX_DRAWDOWN_PERCENT),
            "stop_loss_percent": sizing.risk_percent,
        }),
        operation_type: "RISK_MANAGED_VALIDATION".to_string(),
        symbol: body.symbol,
        quantity: sizing.quantity,
    };
    let report = tcore_risk::ValidatePlanUseCase::execute(&ctx);

    (
        StatusCode::OK,
        Json(json!({
            "sizing": sizing,
            "risk_guard": tcore_execution::GuardOutcomeDto::from(&guard),
            "validation": report.to_dict(),
        })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /trade/risk-status
// ---------------------------------------------------------------------------

pub(crate) async fn risk_status(State(st): State<Arc<AppState>>, Query(q): Query<RiskStatusQuery>) -> Response {
    let month = q.month.unwrap_or_else(|| st.clock.now_millis().format("%Y-%m").to_string());
    match tcore_db::fetch_policy_state(&st.pool, q.tenant_id, &month).await {
        Ok(Some(state)) => (StatusCode::OK, Json(state)).into_response(),
        Ok(None) => err(StatusCode::NOT_FOUND, format!("no policy state for tenant {} month {month}", q.tenant_id)),
        Err(e) => err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// GET /portfolio/positions
// ---------------------------------------------------------------------------

pub(crate) async fn portfolio_positions(
    State(st): State<Arc<AppState>>,
    Query(q): Query<PortfolioPositionsQuery>,
) -> Response {
    let mut cards = Vec::new();

    let operations = match tcore_db::list_operations(&st.pool, q.tenant_id, Some("ACTIVE")).await {
        Ok(rows) => rows,
        Err(e) => return err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    for op in operations.iter().filter(|o| q.symbol.as_deref().map(|s| s == o.symbol).unwrap_or(true)) {
        let current_price = match current_price_for(&st, &op.symbol, op.side).await {
            Ok(p) => p,
            Err(_) => op.weighted_entry_price,
        };
        cards.push(tcore_operations::spot_position_card(op, current_price));
    }

    let margin_positions = match tcore_db::list_open_margin_positions(&st.pool, q.tenant_id).await {
        Ok(rows) => rows,
        Err(e) => return err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let mut by_symbol: std::collections::BTreeMap<String, Vec<tcore_schemas::MarginPosition>> = Default::default();
    for mp in margin_positions {
        if q.symbol.as_deref().map(|s| s == mp.symbol).unwrap_or(true) {
            by_symbol.entry(mp.symbol.clone()).or_default().push(mp);
        }
    }
    for (symbol, positions) in by_symbol {
        let side = positions[0].side;
        let current_price = current_price_for(&st, &symbol, side).await.unwrap_or(positions[0].current_price);
        if let Some(card) = tcore_operations::aggregate_margin_positions(&positions, current_price) {
            cards.push(card);
        }
    }

    (StatusCode::OK, Json(cards)).into_response()
}

async fn current_price_for(st: &AppState, symbol: &str, side: Side) -> Result<Micros, tcore_exchange::ExchangeError> {
    match side {
        Side::Buy => st.exchange.best_bid(symbol).await,
        Side::Sell => st.exchange.best_ask(symbol).await,
    }
}
