//! Postgres-backed lock service.
//!
//! Every [`LockService`] primitive maps to exactly one SQL statement, so the
//! compare-and-extend heartbeat and the NX acquisition are atomic on the
//! server. TTLs are evaluated against the database clock (`now()`), which is
//! the single time source shared by every node.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use wolfe_lock::{LockError, LockService};

pub const ENV_DB_URL: &str = "WOLFE_DATABASE_URL";

/// Connect to Postgres using `url`.
pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Connect to Postgres using WOLFE_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    tracing::info!("lock-service migrations applied");
    Ok(())
}

#[derive(Clone)]
pub struct PgLockService {
    pool: PgPool,
}

impl PgLockService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn backend(e: sqlx::Error) -> LockError {
    LockError::Backend(e.to_string())
}

/// TTL as the signed `bigint` the interval arithmetic binds.
fn ttl_param(ttl_ms: u64) -> Result<i64, LockError> {
    i64::try_from(ttl_ms)
        .map_err(|_| LockError::Backend(format!("ttl_ms {ttl_ms} out of range for bigint")))
}

#[async_trait]
impl LockService for PgLockService {
    async fn incr(&self, key: &str) -> Result<u64, LockError> {
        let row = sqlx::query(
            r#"
            insert into ha_counters (key, value) values ($1, 1)
            on conflict (key) do update set value = ha_counters.value + 1
            returning value
            "#,
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        let v: i64 = row.try_get("value").map_err(backend)?;
        u64::try_from(v).map_err(|_| LockError::Backend(format!("negative counter {v}")))
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool, LockError> {
        let ttl = ttl_param(ttl_ms)?;
        let res = sqlx::query(
            r#"
            insert into ha_kv (key, value, expires_at)
            values ($1, $2, now() + ($3::bigint * interval '1 millisecond'))
            on conflict (key) do update
              set value = excluded.value, expires_at = excluded.expires_at
              where ha_kv.expires_at is not null and ha_kv.expires_at <= now()
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(ttl)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(res.rows_affected() == 1)
    }

    async fn extend_if_value(
        &self,
        key: &str,
        expected: &str,
        ttl_ms: u64,
    ) -> Result<bool, LockError> {
        let ttl = ttl_param(ttl_ms)?;
        let res = sqlx::query(
            r#"
            update ha_kv
               set expires_at = now() + ($3::bigint * interval '1 millisecond')
             where key = $1
               and value = $2
               and (expires_at is null or expires_at > now())
            "#,
        )
        .bind(key)
        .bind(expected)
        .bind(ttl)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(res.rows_affected() == 1)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockError> {
        let row = sqlx::query(
            r#"
            select value from ha_kv
             where key = $1 and (expires_at is null or expires_at > now())
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(|r| r.try_get::<String, _>("value").map_err(backend))
            .transpose()
    }

    async fn release_if_value(&self, key: &str, expected: &str) -> Result<bool, LockError> {
        let res = sqlx::query(
            r#"
            delete from ha_kv
             where key = $1
               and value = $2
               and (expires_at is null or expires_at > now())
            "#,
        )
        .bind(key)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(res.rows_affected() == 1)
    }

    async fn hset(&self, hash: &str, field: &str, value: &str) -> Result<(), LockError> {
        sqlx::query(
            r#"
            insert into ha_hash (hash, field, value) values ($1, $2, $3)
            on conflict (hash, field) do update set value = excluded.value
            "#,
        )
        .bind(hash)
        .bind(field)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn hget(&self, hash: &str, field: &str) -> Result<Option<String>, LockError> {
        let row = sqlx::query("select value from ha_hash where hash = $1 and field = $2")
            .bind(hash)
            .bind(field)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.map(|r| r.try_get::<String, _>("value").map_err(backend))
            .transpose()
    }
}
