//! Every closed-enum text column in the schema has a CHECK constraint that
//! rejects out-of-range values at the DB level (PostgreSQL SQLSTATE 23514 —
//! `check_violation`), independent of any application-layer validation.
//!
//! DB-backed test. Skips if `TCORE_DATABASE_URL` is not set.

use chrono::Utc;
use uuid::Uuid;

fn is_check_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        db_err.code().as_deref() == Some("23514")
    } else {
        false
    }
}

#[tokio::test]
async fn check_constraints_reject_invalid_enum_values() -> anyhow::Result<()> {
    let url = match std::env::var(tcore_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: TCORE_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;

    tcore_db::migrate(&pool).await?;

    sqlx::query(
        "insert into strategies (tenant_id, name, market_bias, config) values ($1, $2, 'BULLISH', '{}'::jsonb) \
         on conflict (tenant_id, name) do nothing",
    )
    .bind(1i64)
    .bind(format!("check-test-{}", Uuid::new_v4()))
    .execute(&pool)
    .await?;
    let (strategy_id,): (i64,) = sqlx::query_as(
        "select id from strategies where tenant_id = $1 order by id desc limit 1",
    )
    .bind(1i64)
    .fetch_one(&pool)
    .await?;

    // trading_intents.status CHECK
    let err = sqlx::query(
        r#"
        insert into trading_intents (
            intent_id, tenant_id, symbol, strategy_id, side, entry_price, stop_price,
            quantity, capital, risk_amount, risk_percent, regime, confidence, reason, status
        ) values ($1, 1, 'BTCUSDC', $2, 'BUY', 1, 1, '1', 1, 1, 1.0, 'r', 0.5, 'r', 'NOT_A_STATUS')
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(strategy_id)
    .execute(&pool)
    .await
    .unwrap_err();
    assert!(
        is_check_violation(&err),
        "trading_intents.status: must reject out-of-range value; got {err}"
    );

    // trading_intents.side CHECK
    let err = sqlx::query(
        r#"
        insert into trading_intents (
            intent_id, tenant_id, symbol, strategy_id, side, entry_price, stop_price,
            quantity, capital, risk_amount, risk_percent, regime, confidence, reason, status
        ) values ($1, 1, 'BTCUSDC', $2, 'SIDEWAYS', 1, 1, '1', 1, 1, 1.0, 'r', 0.5, 'r', 'PENDING')
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(strategy_id)
    .execute(&pool)
    .await
    .unwrap_err();
    assert!(
        is_check_violation(&err),
        "trading_intents.side: must reject out-of-range value; got {err}"
    );

    // policy_states.status CHECK
    let err = sqlx::query(
        r#"
        insert into policy_states (
            tenant_id, month, status, starting_capital, current_capital, realized_pnl,
            unrealized_pnl, max_drawdown_percent, max_trades_per_day
        ) values (999999, '2026-01', 'NOT_A_STATUS', 1, 1, 0, 0, 4.0, 50)
        "#,
    )
    .execute(&pool)
    .await
    .unwrap_err();
    assert!(
        is_check_violation(&err),
        "policy_states.status: must reject out-of-range value; got {err}"
    );

    // stop_adjustments.reason CHECK
    let err = sqlx::query(
        r#"
        insert into stop_adjustments (
            position_id, old_stop, new_stop, reason, adjustment_token, ts_utc,
            current_price, spans_crossed, step_index
        ) values (1, 1, 1, 'NOT_A_REASON', $1, $2, 1, 0, 0)
        "#,
    )
    .bind(format!("check-{}", Uuid::new_v4()))
    .bind(Utc::now())
    .execute(&pool)
    .await
    .unwrap_err();
    assert!(
        is_check_violation(&err),
        "stop_adjustments.reason: must reject out-of-range value; got {err}"
    );

    Ok(())
}
