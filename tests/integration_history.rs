use qore_history::engine::traits::{Database, Transaction};
use qore_history::interceptor::materialize::materialize_one;
use qore_history::{
    init_tracing, migrate, CallContext, EngineResult, HistoryConfig, HistoryHandler, LogTarget,
    PgDatabase, PoolConfig, RowImage, SchemaConfig, TableTarget, Value,
};
use serde_json::json;
use uuid::Uuid;

const DEFAULT_DB: &str = "testdb";

fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u16_or_default(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn env_bool_or_default(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

fn pg_test_required() -> bool {
    env_bool_or_default("QOREDB_TEST_PG_REQUIRED", false)
}

fn pool_config() -> PoolConfig {
    let url = format!(
        "postgres://{}:{}@{}:{}/{}",
        env_or_default("QOREDB_TEST_PG_USER", "qoredb"),
        env_or_default("QOREDB_TEST_PG_PASSWORD", "qoredb_test"),
        env_or_default("QOREDB_TEST_PG_HOST", "127.0.0.1"),
        env_u16_or_default("QOREDB_TEST_PG_PORT", 54321),
        env_or_default("QOREDB_TEST_PG_DB", DEFAULT_DB),
    );
    PoolConfig {
        acquire_timeout_secs: 5,
        ..PoolConfig::new(url)
    }
}

fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Connects, or returns None when the server is absent and not required
async fn connect_postgres() -> Option<PgDatabase> {
    init_tracing(LogTarget::Stderr);
    match PgDatabase::connect(&pool_config()).await {
        Ok(db) => Some(db),
        Err(err) if !pg_test_required() => {
            eprintln!("Skipping PostgreSQL history test: {}", err);
            None
        }
        Err(err) => panic!("PostgreSQL is required but unavailable: {}", err),
    }
}

async fn exec(db: &PgDatabase, sql: &str) -> EngineResult<()> {
    let mut tx = db.begin().await?;
    tx.execute(sql, &[]).await?;
    tx.commit().await
}

async fn fetch_one(db: &PgDatabase, sql: &str) -> EngineResult<RowImage> {
    let mut tx = db.begin().await?;
    let row = materialize_one(tx.fetch(sql, &[])).await?;
    tx.rollback().await?;
    Ok(row)
}

async fn count(db: &PgDatabase, table: &str) -> EngineResult<i64> {
    let row = fetch_one(db, &format!("SELECT count(*) AS n FROM \"{}\"", table)).await?;
    Ok(row["n"].as_i64().unwrap_or(-1))
}

async fn create_orders(db: &PgDatabase, table: &str) -> EngineResult<()> {
    exec(
        db,
        &format!(
            "CREATE TABLE \"{}\" (id BIGSERIAL PRIMARY KEY, amount INT NOT NULL, note TEXT)",
            table
        ),
    )
    .await
}

async fn drop_tables(db: &PgDatabase, table: &str) -> EngineResult<()> {
    exec(
        db,
        &format!(
            "DROP TABLE IF EXISTS \"{t}_history\", \"{t}\"",
            t = table
        ),
    )
    .await
}

#[tokio::test]
async fn insert_returning_writes_after_image() -> EngineResult<()> {
    let Some(db) = connect_postgres().await else {
        return Ok(());
    };
    let table = unique_name("qh_orders");
    create_orders(&db, &table).await?;
    migrate(&db, &SchemaConfig::default(), &[TableTarget::name(&table)]).await?;

    let tracked = HistoryHandler::new(HistoryConfig::default()).wrap(db.clone());
    let ctx = CallContext::new()
        .with_operator("alice")
        .with_trace_id("trace-42")
        .with_reason("checkout");
    let tx = tracked.begin(ctx.clone()).await?;
    let result = tx
        .execute(
            &ctx,
            &format!("INSERT INTO \"{}\" (amount, note) VALUES ($1, $2) RETURNING *", table),
            &[Value::Int(10), Value::from("first")],
        )
        .await?;
    assert!(result.is_captured());
    assert_eq!(result.rows_affected(), 1);
    tx.commit().await?;

    let history = format!("{}_history", table);
    assert_eq!(count(&db, &history).await?, 1);

    let row = fetch_one(
        &db,
        &format!(
            "SELECT id, operation, operated_by, trace_id, reason, \
             before = 'null'::jsonb AS before_null, after FROM \"{}\"",
            history
        ),
    )
    .await?;
    assert_eq!(row["id"], json!(1));
    assert_eq!(row["operation"], json!("INSERT"));
    assert_eq!(row["operated_by"], json!("alice"));
    assert_eq!(row["trace_id"], json!("trace-42"));
    assert_eq!(row["reason"], json!("checkout"));
    assert_eq!(row["before_null"], json!(true));
    assert_eq!(row["after"]["amount"], json!(10));
    assert_eq!(row["after"]["note"], json!("first"));

    drop_tables(&db, &table).await
}

#[tokio::test]
async fn delete_returning_writes_before_image() -> EngineResult<()> {
    let Some(db) = connect_postgres().await else {
        return Ok(());
    };
    let table = unique_name("qh_orders");
    create_orders(&db, &table).await?;
    exec(&db, &format!("INSERT INTO \"{}\" (amount) VALUES (5), (6)", table)).await?;
    migrate(&db, &SchemaConfig::default(), &[TableTarget::name(&table)]).await?;

    let tracked = HistoryHandler::new(HistoryConfig::default()).wrap(db.clone());
    let ctx = CallContext::new();
    let tx = tracked.begin(ctx.clone()).await?;
    let result = tx
        .execute(
            &ctx,
            &format!("DELETE FROM \"{}\" o WHERE o.amount = $1 RETURNING o.*", table),
            &[Value::Int(5)],
        )
        .await?;
    assert_eq!(result.rows_affected(), 1);
    tx.commit().await?;

    let row = fetch_one(
        &db,
        &format!(
            "SELECT operation, before, after = 'null'::jsonb AS after_null FROM \"{}_history\"",
            table
        ),
    )
    .await?;
    assert_eq!(row["operation"], json!("DELETE"));
    assert_eq!(row["before"]["amount"], json!(5));
    assert_eq!(row["after_null"], json!(true));
    assert_eq!(count(&db, &table).await?, 1);

    drop_tables(&db, &table).await
}

#[tokio::test]
async fn rollback_leaves_history_unchanged() -> EngineResult<()> {
    let Some(db) = connect_postgres().await else {
        return Ok(());
    };
    let table = unique_name("qh_orders");
    create_orders(&db, &table).await?;
    migrate(&db, &SchemaConfig::default(), &[TableTarget::name(&table)]).await?;

    let tracked = HistoryHandler::new(HistoryConfig::default()).wrap(db.clone());
    let ctx = CallContext::new();
    let tx = tracked.begin(ctx.clone()).await?;
    for amount in [1, 2, 3] {
        tx.execute(
            &ctx,
            &format!("INSERT INTO \"{}\" (amount) VALUES ($1) RETURNING id", table),
            &[Value::Int(amount)],
        )
        .await?;
    }
    tx.execute(&ctx, &format!("UPDATE \"{}\" SET note = 'x'", table), &[])
        .await?;
    assert_eq!(tx.buffered(), 4);
    tx.rollback().await?;

    assert_eq!(count(&db, &format!("{}_history", table)).await?, 0);
    assert_eq!(count(&db, &table).await?, 0);

    drop_tables(&db, &table).await
}

#[tokio::test]
async fn plain_update_writes_statement_record() -> EngineResult<()> {
    let Some(db) = connect_postgres().await else {
        return Ok(());
    };
    let table = unique_name("qh_orders");
    create_orders(&db, &table).await?;
    exec(&db, &format!("INSERT INTO \"{}\" (amount) VALUES (1)", table)).await?;
    migrate(&db, &SchemaConfig::default(), &[TableTarget::name(&table)]).await?;

    let tracked = HistoryHandler::new(HistoryConfig::default()).wrap(db.clone());
    let ctx = CallContext::new().with_operator("batch");
    let tx = tracked.begin(ctx.clone()).await?;
    let result = tx
        .execute(&ctx, &format!("UPDATE \"{}\" SET amount = amount + 1", table), &[])
        .await?;
    assert!(!result.is_captured());
    assert_eq!(result.rows_affected(), 1);
    tx.commit().await?;

    let row = fetch_one(
        &db,
        &format!(
            "SELECT id IS NULL AS id_null, operation, operated_by FROM \"{}_history\"",
            table
        ),
    )
    .await?;
    assert_eq!(row["id_null"], json!(true));
    assert_eq!(row["operation"], json!("UPDATE"));
    assert_eq!(row["operated_by"], json!("batch"));

    drop_tables(&db, &table).await
}

#[tokio::test]
async fn skip_if_missing_commits_without_history_table() -> EngineResult<()> {
    let Some(db) = connect_postgres().await else {
        return Ok(());
    };
    let table = unique_name("qh_orders");
    create_orders(&db, &table).await?;

    let tracked = HistoryHandler::new(HistoryConfig {
        skip_if_missing: true,
        ..HistoryConfig::default()
    })
    .wrap(db.clone());
    let ctx = CallContext::new();
    let tx = tracked.begin(ctx.clone()).await?;
    tx.execute(
        &ctx,
        &format!("INSERT INTO \"{}\" (amount) VALUES (7) RETURNING *", table),
        &[],
    )
    .await?;
    tx.commit().await?;

    assert_eq!(count(&db, &table).await?, 1);
    let probe = fetch_one(
        &db,
        &format!("SELECT to_regclass('\"{}_history\"') IS NULL AS absent", table),
    )
    .await?;
    assert_eq!(probe["absent"], json!(true));

    drop_tables(&db, &table).await
}

#[tokio::test]
async fn missing_history_table_fails_commit_without_skip() -> EngineResult<()> {
    let Some(db) = connect_postgres().await else {
        return Ok(());
    };
    let table = unique_name("qh_orders");
    create_orders(&db, &table).await?;

    let tracked = HistoryHandler::new(HistoryConfig::default()).wrap(db.clone());
    let ctx = CallContext::new();
    let tx = tracked.begin(ctx.clone()).await?;
    tx.execute(
        &ctx,
        &format!("INSERT INTO \"{}\" (amount) VALUES (7) RETURNING *", table),
        &[],
    )
    .await?;

    let err = tx.commit().await.unwrap_err();
    assert!(matches!(
        err,
        qore_history::EngineError::HistoryWrite { .. }
    ));
    tx.rollback().await?;
    assert_eq!(count(&db, &table).await?, 0);

    drop_tables(&db, &table).await
}

#[tokio::test]
async fn migrate_types_id_after_base_table() -> EngineResult<()> {
    let Some(db) = connect_postgres().await else {
        return Ok(());
    };
    let table = unique_name("qh_accounts");
    exec(
        &db,
        &format!("CREATE TABLE \"{}\" (id UUID PRIMARY KEY, email TEXT)", table),
    )
    .await?;

    let config = SchemaConfig {
        create_id_index: true,
        ..SchemaConfig::default()
    };
    let migrated = migrate(&db, &config, &[TableTarget::name(format!("public.{}", table))]).await?;
    assert_eq!(migrated.len(), 1);
    assert_eq!(migrated[0].id_type.as_deref(), Some("uuid"));

    let row = fetch_one(
        &db,
        &format!(
            "SELECT pg_catalog.format_type(a.atttypid, a.atttypmod) AS id_type, \
             (SELECT count(*) FROM pg_indexes WHERE indexname = 'idx_{t}_history_id') AS indexes \
             FROM pg_attribute a WHERE a.attrelid = '\"{t}_history\"'::regclass AND a.attname = 'id'",
            t = table
        ),
    )
    .await?;
    assert_eq!(row["id_type"], json!("uuid"));
    assert_eq!(row["indexes"], json!(1));

    // Running it again is a no-op.
    migrate(&db, &config, &[TableTarget::name(&table)]).await?;

    let tracked = HistoryHandler::new(HistoryConfig::default())
        .with_redactor("email", qore_history::interceptor::mask)?
        .wrap(db.clone());
    let ctx = CallContext::new();
    let tx = tracked.begin(ctx.clone()).await?;
    let id = Uuid::new_v4().to_string();
    tx.execute(
        &ctx,
        &format!(
            "INSERT INTO \"{}\" (id, email) VALUES ($1::uuid, $2) RETURNING *",
            table
        ),
        &[Value::from(id.as_str()), Value::from("a@example.com")],
    )
    .await?;
    tx.commit().await?;

    let row = fetch_one(
        &db,
        &format!("SELECT id::text AS id, after FROM \"{}_history\"", table),
    )
    .await?;
    assert_eq!(row["id"], json!(id));
    assert_eq!(row["after"]["email"], json!("***"));

    drop_tables(&db, &table).await
}

#[tokio::test]
async fn migrate_rejects_unknown_table() -> EngineResult<()> {
    let Some(db) = connect_postgres().await else {
        return Ok(());
    };
    let err = migrate(
        &db,
        &SchemaConfig::default(),
        &[TableTarget::name(unique_name("qh_missing"))],
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        qore_history::EngineError::ValidationError { .. }
    ));
    Ok(())
}
