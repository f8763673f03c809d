//! Startup schema for the `record` table

use sqlx::PgPool;

const CREATE_RECORD_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS record (
        id SERIAL PRIMARY KEY,
        trace_id TEXT,
        type TEXT,
        timestamp TIMESTAMP
    )
"#;

/// Create the `record` table if it is absent. Safe to run on every start.
pub async fn ensure_record_table(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_RECORD_TABLE).execute(pool).await?;
    tracing::info!("record table ready");
    Ok(())
}
