//! Per-intent handlers. Each one resolves its window, queries the store on behalf of
//! a single owner, and reports what it found as an [`Outcome`].

use crate::aggregate::{capped_limit, summarize, DEFAULT_RANKING};
use crate::errors::Result;
use crate::intent::Intent;
use crate::model::{Device, DeviceAverage, ReadingStats, UserId};
use crate::params::QueryParameters;
use crate::store::EnergyStore;
use crate::window::{resolve_window, Period, TimeWindow, DEFAULT_PERIOD};
use tracing::debug;

/// Readings fetched for a single-device summary.
pub const DEVICE_READINGS_LIMIT: i64 = 100;

/// Window a handler aggregates over, with the label quoted back to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPeriod {
    pub label: String,
    pub window: TimeWindow,
}

impl ResolvedPeriod {
    /// Recognized named period first, then explicit bounds, then `default`.
    ///
    /// An unrecognized period token (e.g. `specific_hours`) without usable bounds means
    /// all history, as does a `None` default.
    pub fn from_params(params: &QueryParameters, default: Option<&str>) -> Self {
        let token = params.time_period.as_deref();
        if let Some(period) = token.and_then(Period::parse) {
            return Self::named(period);
        }
        if let Some(window) = params.explicit_window() {
            return Self::explicit(window);
        }
        if token.is_some() {
            return Self::all_time();
        }
        match default.and_then(Period::parse) {
            Some(period) => Self::named(period),
            None => Self::all_time(),
        }
    }

    fn named(period: Period) -> Self {
        Self {
            label: period.as_str().to_string(),
            window: resolve_window(Some(period.as_str())),
        }
    }

    fn explicit(window: TimeWindow) -> Self {
        let fmt = |ts: Option<chrono::DateTime<chrono::Utc>>| {
            ts.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_default()
        };
        Self {
            label: format!("{} to {}", fmt(window.start), fmt(window.end)),
            window,
        }
    }

    fn all_time() -> Self {
        Self {
            label: "all time".to_string(),
            window: TimeWindow::unbounded(),
        }
    }
}

/// Which devices an all-devices summary covered.
#[derive(Debug, Clone, PartialEq)]
pub enum Scope {
    AllDevices,
    DeviceType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingKind {
    Comparison,
    TopConsumers,
}

/// Result of one pipeline run, before it is put into words.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    SmallTalk(Intent),
    NoDevices,
    DeviceNotFound {
        requested: String,
        devices: Vec<Device>,
    },
    DeviceTypeNotFound {
        requested: String,
        devices: Vec<Device>,
    },
    NoData {
        subject: String,
        period: ResolvedPeriod,
    },
    DeviceUsage {
        device: Device,
        period: ResolvedPeriod,
        stats: ReadingStats,
    },
    UsageSummary {
        scope: Scope,
        device_count: usize,
        period: ResolvedPeriod,
        stats: ReadingStats,
    },
    EnergySummary {
        device_count: usize,
        period: ResolvedPeriod,
        stats: ReadingStats,
    },
    Ranking {
        kind: RankingKind,
        period: ResolvedPeriod,
        entries: Vec<DeviceAverage>,
    },
    NoRankingData {
        kind: RankingKind,
    },
    DeviceList(Vec<Device>),
    Failed,
}

/// Runs the handler for a non-conversational `intent`.
pub async fn handle(
    store: &dyn EnergyStore,
    user_id: UserId,
    intent: Intent,
    params: &QueryParameters,
) -> Result<Outcome> {
    debug!(user_id, intent = %intent, "Dispatching handler");

    match intent {
        Intent::EnergyUsage => energy_usage(store, user_id, params).await,
        Intent::EnergySummary => energy_summary(store, user_id, params).await,
        Intent::DeviceComparison => ranking(store, user_id, params, RankingKind::Comparison).await,
        Intent::TopConsumers => ranking(store, user_id, params, RankingKind::TopConsumers).await,
        Intent::DeviceList => device_list(store, user_id).await,
        Intent::Greeting | Intent::Thanks | Intent::Goodbye | Intent::OffTopic => {
            Ok(Outcome::SmallTalk(intent))
        }
    }
}

async fn energy_usage(
    store: &dyn EnergyStore,
    user_id: UserId,
    params: &QueryParameters,
) -> Result<Outcome> {
    let period = ResolvedPeriod::from_params(params, Some(DEFAULT_PERIOD));

    if let Some(name) = params.device_name.as_deref() {
        let Some(device) = store.find_device_by_name(user_id, name).await? else {
            return Ok(Outcome::DeviceNotFound {
                requested: name.to_string(),
                devices: store.list_devices(user_id).await?,
            });
        };
        return device_usage(store, user_id, device, period).await;
    }

    let devices = store.list_devices(user_id).await?;
    if devices.is_empty() {
        return Ok(Outcome::NoDevices);
    }

    let (scope, selected) = match params.device_type.as_deref() {
        Some(device_type) => {
            let selected: Vec<&Device> = devices
                .iter()
                .filter(|d| d.device_type.eq_ignore_ascii_case(device_type))
                .collect();
            if selected.is_empty() {
                return Ok(Outcome::DeviceTypeNotFound {
                    requested: device_type.to_string(),
                    devices,
                });
            }
            (Scope::DeviceType(device_type.to_string()), selected)
        }
        None => (Scope::AllDevices, devices.iter().collect()),
    };

    let ids: Vec<i64> = selected.iter().map(|d| d.id).collect();
    let stats = store.aggregate_readings(user_id, &ids, period.window).await?;
    if stats.reading_count == 0 {
        let subject = match &scope {
            Scope::AllDevices => "your devices".to_string(),
            Scope::DeviceType(t) => format!("your {t} devices"),
        };
        return Ok(Outcome::NoData { subject, period });
    }

    Ok(Outcome::UsageSummary {
        scope,
        device_count: ids.len(),
        period,
        stats,
    })
}

async fn device_usage(
    store: &dyn EnergyStore,
    user_id: UserId,
    device: Device,
    period: ResolvedPeriod,
) -> Result<Outcome> {
    let readings = store
        .query_readings(user_id, &[device.id], period.window, DEVICE_READINGS_LIMIT)
        .await?;

    let stats = summarize(&readings);
    if stats.reading_count == 0 {
        return Ok(Outcome::NoData {
            subject: device.name,
            period,
        });
    }

    Ok(Outcome::DeviceUsage {
        device,
        period,
        stats,
    })
}

async fn energy_summary(
    store: &dyn EnergyStore,
    user_id: UserId,
    params: &QueryParameters,
) -> Result<Outcome> {
    let period = ResolvedPeriod::from_params(params, Some(DEFAULT_PERIOD));

    let devices = store.list_devices(user_id).await?;
    if devices.is_empty() {
        return Ok(Outcome::NoDevices);
    }

    let ids: Vec<i64> = devices.iter().map(|d| d.id).collect();
    let stats = store.aggregate_readings(user_id, &ids, period.window).await?;
    if stats.reading_count == 0 {
        return Ok(Outcome::NoData {
            subject: "your devices".to_string(),
            period,
        });
    }

    Ok(Outcome::EnergySummary {
        device_count: ids.len(),
        period,
        stats,
    })
}

async fn ranking(
    store: &dyn EnergyStore,
    user_id: UserId,
    params: &QueryParameters,
    kind: RankingKind,
) -> Result<Outcome> {
    let period = ResolvedPeriod::from_params(params, None);
    let limit = capped_limit(params.limit, DEFAULT_RANKING);

    let entries = store
        .rank_devices_by_average(user_id, period.window, limit)
        .await?;

    if entries.is_empty() {
        return Ok(Outcome::NoRankingData { kind });
    }

    Ok(Outcome::Ranking {
        kind,
        period,
        entries,
    })
}

async fn device_list(store: &dyn EnergyStore, user_id: UserId) -> Result<Outcome> {
    let devices = store.list_devices(user_id).await?;
    if devices.is_empty() {
        return Ok(Outcome::NoDevices);
    }
    Ok(Outcome::DeviceList(devices))
}
