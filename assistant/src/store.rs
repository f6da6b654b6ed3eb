//! Read-side storage collaborator used by the chat handlers.
//!
//! Every operation takes the requesting owner and filters on it in the query itself,
//! so a device id that belongs to someone else never contributes a row.

use crate::aggregate::rank_by_average;
use crate::errors::Result;
use crate::model::{Device, DeviceAverage, ReadingStats, TelemetryReading, UserId};
use crate::window::TimeWindow;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnergyStore: Send + Sync {
    /// All devices of `owner`, active or not, in creation order.
    async fn list_devices(&self, owner: UserId) -> Result<Vec<Device>>;

    /// Case-insensitive exact name match among `owner`'s devices.
    async fn find_device_by_name(&self, owner: UserId, name: &str) -> Result<Option<Device>>;

    /// Readings of `device_ids` inside `window`, newest first, at most `limit`.
    async fn query_readings(
        &self,
        owner: UserId,
        device_ids: &[i64],
        window: TimeWindow,
        limit: i64,
    ) -> Result<Vec<TelemetryReading>>;

    /// Count/average/max/min over all readings of `device_ids` inside `window`.
    async fn aggregate_readings(
        &self,
        owner: UserId,
        device_ids: &[i64],
        window: TimeWindow,
    ) -> Result<ReadingStats>;

    /// Devices with readings in `window`, by descending average power, ties broken by
    /// creation order, at most `min(limit, 10)` entries.
    async fn rank_devices_by_average(
        &self,
        owner: UserId,
        window: TimeWindow,
        limit: usize,
    ) -> Result<Vec<DeviceAverage>>;
}

const DEVICE_COLUMNS: &str =
    "d.id, d.device_id, d.name, d.device_type, d.user_id, d.is_active, d.created_at";

#[derive(Debug, Clone)]
pub struct PgEnergyStore {
    pool: PgPool,
}

impl PgEnergyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnergyStore for PgEnergyStore {
    async fn list_devices(&self, owner: UserId) -> Result<Vec<Device>> {
        let query = format!(
            "SELECT {DEVICE_COLUMNS} FROM devices d \
             WHERE d.user_id = $1 ORDER BY d.created_at, d.id"
        );

        let devices = sqlx::query_as::<_, Device>(&query)
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;

        debug!(owner, count = devices.len(), "Listed devices");
        Ok(devices)
    }

    async fn find_device_by_name(&self, owner: UserId, name: &str) -> Result<Option<Device>> {
        let query = format!(
            "SELECT {DEVICE_COLUMNS} FROM devices d
             WHERE d.user_id = $1 AND lower(d.name) = lower($2)
             ORDER BY d.created_at, d.id
             LIMIT 1"
        );

        let device = sqlx::query_as::<_, Device>(&query)
            .bind(owner)
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(device)
    }

    async fn query_readings(
        &self,
        owner: UserId,
        device_ids: &[i64],
        window: TimeWindow,
        limit: i64,
    ) -> Result<Vec<TelemetryReading>> {
        if device_ids.is_empty() {
            return Ok(Vec::new());
        }

        let readings = sqlx::query_as::<_, TelemetryReading>(
            r#"
            SELECT t.device_id, t.ts AS timestamp, t.energy_watts
            FROM telemetry t
            JOIN devices d ON d.id = t.device_id
            WHERE d.user_id = $1
              AND t.device_id = ANY($2)
              AND ($3::timestamptz IS NULL OR t.ts >= $3)
              AND ($4::timestamptz IS NULL OR t.ts <= $4)
            ORDER BY t.ts DESC
            LIMIT $5
            "#,
        )
        .bind(owner)
        .bind(device_ids)
        .bind(window.start)
        .bind(window.end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(readings)
    }

    async fn aggregate_readings(
        &self,
        owner: UserId,
        device_ids: &[i64],
        window: TimeWindow,
    ) -> Result<ReadingStats> {
        if device_ids.is_empty() {
            return Ok(ReadingStats::default());
        }

        let stats = sqlx::query_as::<_, ReadingStats>(
            r#"
            SELECT COUNT(*) AS reading_count,
                   COALESCE(AVG(t.energy_watts), 0) AS average_power_watts,
                   COALESCE(MAX(t.energy_watts), 0) AS max_power_watts,
                   COALESCE(MIN(t.energy_watts), 0) AS min_power_watts
            FROM telemetry t
            JOIN devices d ON d.id = t.device_id
            WHERE d.user_id = $1
              AND t.device_id = ANY($2)
              AND ($3::timestamptz IS NULL OR t.ts >= $3)
              AND ($4::timestamptz IS NULL OR t.ts <= $4)
            "#,
        )
        .bind(owner)
        .bind(device_ids)
        .bind(window.start)
        .bind(window.end)
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }

    async fn rank_devices_by_average(
        &self,
        owner: UserId,
        window: TimeWindow,
        limit: usize,
    ) -> Result<Vec<DeviceAverage>> {
        let query = format!(
            "SELECT {DEVICE_COLUMNS}, AVG(t.energy_watts) AS average_power_watts
             FROM devices d
             JOIN telemetry t ON t.device_id = d.id
             WHERE d.user_id = $1
               AND ($2::timestamptz IS NULL OR t.ts >= $2)
               AND ($3::timestamptz IS NULL OR t.ts <= $3)
             GROUP BY d.id
             ORDER BY d.created_at, d.id"
        );

        let averages = sqlx::query_as::<_, DeviceAverage>(&query)
            .bind(owner)
            .bind(window.start)
            .bind(window.end)
            .fetch_all(&self.pool)
            .await?;

        // Ordering and the cap live in one place so every store ranks identically.
        Ok(rank_by_average(averages, limit))
    }
}
