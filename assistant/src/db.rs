use crate::errors::{Error, Result};
use crate::metrics::{DB_FAILURES_TOTAL, READINGS_SKIPPED_TOTAL};
use crate::model::EnergyReading;
use crate::retry::{with_backoff, Backoff};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};

const INSERT_BACKOFF: Backoff =
    Backoff::new(4, Duration::from_millis(100), Duration::from_millis(3200));

pub async fn make_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Database connection established");
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

/// Appends readings, retrying transient connection errors. Readings for unknown
/// devices and duplicates of an existing `(device, ts)` are skipped.
pub async fn insert_batch(pool: &PgPool, batch: &[EnergyReading]) -> Result<u64> {
    if batch.is_empty() {
        return Ok(0);
    }

    let inserted = with_backoff(
        &INSERT_BACKOFF,
        "Database insert",
        |e| {
            let transient = matches!(e, Error::Database(db_err) if is_transient_error(db_err));
            if transient {
                DB_FAILURES_TOTAL.inc();
            }
            transient
        },
        || insert_batch_inner(pool, batch),
    )
    .await?;

    let skipped = batch.len() as u64 - inserted.min(batch.len() as u64);
    if skipped > 0 {
        debug!("Skipped {} readings (unknown device or duplicate)", skipped);
        READINGS_SKIPPED_TOTAL.inc_by(skipped as f64);
    }

    Ok(inserted)
}

async fn insert_batch_inner(pool: &PgPool, batch: &[EnergyReading]) -> Result<u64> {
    let device_ids: Vec<&str> = batch.iter().map(|r| r.device_id.as_str()).collect();
    let timestamps: Vec<chrono::DateTime<chrono::Utc>> =
        batch.iter().map(|r| r.timestamp).collect();
    let watts: Vec<f64> = batch.iter().map(|r| r.energy_watts).collect();

    let query = r#"
        INSERT INTO telemetry (device_id, ts, energy_watts)
        SELECT d.id, r.ts, r.energy_watts
        FROM UNNEST($1::text[], $2::timestamptz[], $3::float8[]) AS r(external_id, ts, energy_watts)
        JOIN devices d ON d.device_id = r.external_id
        ON CONFLICT (device_id, ts) DO NOTHING
        "#;

    let result = sqlx::query(query)
        .bind(&device_ids)
        .bind(&timestamps)
        .bind(&watts)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => {
            // Connection-class SQLSTATEs
            db_err.code().is_some_and(|code| {
                code == "08000" || // connection_exception
                code == "08003" || // connection_does_not_exist
                code == "08006" || // connection_failure
                code == "57P03" || // cannot_connect_now
                code == "53300" // too_many_connections
            })
        }
        _ => false,
    }
}
