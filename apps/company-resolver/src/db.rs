use anyhow::{bail, Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::info;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Table names are interpolated into SQL, so only `[A-Za-z0-9_.]` is accepted.
pub fn validate_table_name(table: &str) -> Result<()> {
    if table.is_empty()
        || !table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        bail!("Cache table name '{table}' is not a plain SQL identifier");
    }
    Ok(())
}

/// Creates the resolution cache table and its unique keys if missing.
///
/// One row per website key when a website is known, otherwise one row per
/// normalized name.
pub async fn ensure_cache_schema(pool: &PgPool, table: &str) -> Result<()> {
    validate_table_name(table)?;
    let index_prefix = table.replace('.', "_");
    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id                BIGSERIAL PRIMARY KEY,
            normalized_name   TEXT NOT NULL,
            website           TEXT,
            original_name     TEXT NOT NULL,
            company_id        BIGINT,
            lookup_tier       TEXT NOT NULL DEFAULT 'none',
            confidence        DOUBLE PRECISION NOT NULL DEFAULT 0,
            metadata          JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            hit_count         BIGINT NOT NULL DEFAULT 0,
            created_at        TIMESTAMPTZ NOT NULL DEFAULT now(),
            last_accessed_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
            lookup_successful BOOLEAN NOT NULL DEFAULT false
        );
        CREATE UNIQUE INDEX IF NOT EXISTS {index_prefix}_website_key
            ON {table} (website) WHERE website IS NOT NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS {index_prefix}_name_key
            ON {table} (normalized_name) WHERE website IS NULL;
        "#
    );

    pool.execute(ddl.as_str())
        .await
        .with_context(|| format!("Failed to create cache table '{table}'"))?;

    info!("Cache table '{table}' is ready");
    Ok(())
}
