//! fl-db
//!
//! Postgres persistence for the freightline core.
//!
//! Architectural decisions:
//! - Statuses are stored as their canonical strings and checked by CHECK
//!   constraints; decoding an unknown string is an error, never a default
//! - Vehicle holds rely on the partial unique index
//!   `uq_vehicle_reservation_active`, so check-and-insert is atomic in the DB
//! - A `UnitOfWork` commits in one transaction; version-guarded updates that
//!   touch zero rows abort it with `StaleWrite`

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

mod rows;
mod store;

pub use store::PgStore;

pub const ENV_DB_URL: &str = "FL_DATABASE_URL";

/// Connect to Postgres using FL_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
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

/// Pool for DB-backed tests: FL_DATABASE_URL, migrated.
pub async fn testkit_db_pool() -> Result<PgPool> {
    let pool = connect_from_env().await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='shipments'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_shipments_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_shipments_table: bool,
}

/// Count trips still on the road. The CLI refuses to migrate while any exist
/// unless forced.
pub async fn count_active_trips(pool: &PgPool) -> Result<i64> {
    // No schema yet means nothing is running.
    if !status(pool).await?.has_shipments_table {
        return Ok(0);
    }
    let (n,): (i64,) =
        sqlx::query_as::<_, (i64,)>("select count(*)::bigint from trips where status = 'ACTIVE'")
            .fetch_one(pool)
            .await
            .context("count_active_trips failed")?;
    Ok(n)
}

/// Detect a Postgres unique constraint violation by name.
pub(crate) fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            // Postgres unique_violation is 23505.
            db_err.constraint() == Some(constraint)
                && db_err.code().as_deref().map_or(true, |c| c == "23505")
        }
        _ => false,
    }
}
