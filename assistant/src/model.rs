use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of the account that owns devices.
pub type UserId = i64;

/// A metered appliance owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    /// Internal row id; also encodes creation order.
    pub id: i64,
    /// Stable, user-facing external identifier.
    pub device_id: String,
    pub name: String,
    pub device_type: String,
    pub user_id: UserId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Single power measurement for one device, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TelemetryReading {
    /// Internal id of the owning device.
    pub device_id: i64,
    pub timestamp: DateTime<Utc>,
    pub energy_watts: f64,
}

/// Energy reading as published by a meter over MQTT, keyed by external device id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyReading {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub energy_watts: f64,
}

/// Count/average/max/min over a set of readings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReadingStats {
    pub reading_count: i64,
    pub average_power_watts: f64,
    pub max_power_watts: f64,
    pub min_power_watts: f64,
}

/// One entry of a top-consumer ranking.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DeviceAverage {
    #[sqlx(flatten)]
    pub device: Device,
    pub average_power_watts: f64,
}

/// Chat request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// Chat response body. `data` mirrors the numbers quoted in `answer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub chat_id: String,
    pub answer: String,
    pub data: Option<Value>,
}
