use crate::errors::{Error, Result};
use crate::model::EnergyReading;
use chrono::{DateTime, Duration, Utc};

const WATTS_MIN: f64 = 0.0;
const WATTS_MAX: f64 = 100_000.0;
/// Tolerated clock skew for meter timestamps.
const MAX_FUTURE_SKEW_SECS: i64 = 300;

/// Validates an incoming energy reading
pub fn validate(reading: &EnergyReading) -> Result<()> {
    validate_at(reading, Utc::now())
}

fn validate_at(reading: &EnergyReading, now: DateTime<Utc>) -> Result<()> {
    if reading.device_id.trim().is_empty() {
        return Err(Error::Validation("Device ID cannot be empty".to_string()));
    }

    if !reading.energy_watts.is_finite()
        || reading.energy_watts < WATTS_MIN
        || reading.energy_watts > WATTS_MAX
    {
        return Err(Error::Validation(format!(
            "Energy {} W out of range [{}, {}]",
            reading.energy_watts, WATTS_MIN, WATTS_MAX
        )));
    }

    if reading.timestamp > now + Duration::seconds(MAX_FUTURE_SKEW_SECS) {
        return Err(Error::Validation(format!(
            "Timestamp {} is in the future",
            reading.timestamp.to_rfc3339()
        )));
    }

    Ok(())
}
