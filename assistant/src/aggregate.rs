//! In-process statistics over readings and the top-consumer ranking order.

use crate::model::{DeviceAverage, ReadingStats, TelemetryReading};
use std::cmp::Ordering;

/// Hard cap on ranking length, whatever the caller asks for.
pub const MAX_RANKING: usize = 10;
/// Ranking length when the query names none.
pub const DEFAULT_RANKING: usize = 5;

/// Ranking length for a requested limit: zero or absent falls back to `default`,
/// and the result never exceeds [`MAX_RANKING`].
pub fn capped_limit(requested: Option<u32>, default: usize) -> usize {
    requested
        .filter(|n| *n > 0)
        .map_or(default, |n| n as usize)
        .min(MAX_RANKING)
}

/// Count/average/max/min of `readings`; all zero when there are none.
pub fn summarize(readings: &[TelemetryReading]) -> ReadingStats {
    let Some(first) = readings.first() else {
        return ReadingStats::default();
    };

    let (sum, max, min) = readings.iter().fold(
        (0.0, first.energy_watts, first.energy_watts),
        |(sum, max, min), r| {
            (
                sum + r.energy_watts,
                max.max(r.energy_watts),
                min.min(r.energy_watts),
            )
        },
    );

    ReadingStats {
        reading_count: readings.len() as i64,
        average_power_watts: sum / readings.len() as f64,
        max_power_watts: max,
        min_power_watts: min,
    }
}

/// Orders devices by descending average power, ties by creation order, and keeps at
/// most `min(limit, MAX_RANKING)` entries.
pub fn rank_by_average(mut entries: Vec<DeviceAverage>, limit: usize) -> Vec<DeviceAverage> {
    entries.sort_by(|a, b| {
        b.average_power_watts
            .total_cmp(&a.average_power_watts)
            .then_with(|| creation_order(a, b))
    });
    entries.truncate(limit.min(MAX_RANKING));
    entries
}

fn creation_order(a: &DeviceAverage, b: &DeviceAverage) -> Ordering {
    a.device
        .created_at
        .cmp(&b.device.created_at)
        .then(a.device.id.cmp(&b.device.id))
}
