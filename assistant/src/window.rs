//! Resolution of named periods ("today", "last_week", ...) into concrete UTC windows.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;

/// Period used when a query names none.
pub const DEFAULT_PERIOD: &str = "today";

/// Named periods understood by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Today,
    Yesterday,
    LastWeek,
    LastMonth,
}

impl Period {
    /// Parses a period token. Case, surrounding whitespace and space/hyphen separators
    /// are ignored; anything else is unrecognized.
    pub fn parse(token: &str) -> Option<Self> {
        let normalized = token.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "today" => Some(Period::Today),
            "yesterday" => Some(Period::Yesterday),
            "last_week" => Some(Period::LastWeek),
            "last_month" => Some(Period::LastMonth),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Today => "today",
            Period::Yesterday => "yesterday",
            Period::LastWeek => "last_week",
            Period::LastMonth => "last_month",
        }
    }
}

/// Time range used to filter readings. Both bounds absent means "all history".
///
/// Bounds are applied inclusively: `start <= ts <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// Window without any bound.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Explicit window; rejected when `start > end`.
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start <= end).then_some(Self {
            start: Some(start),
            end: Some(end),
        })
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| ts >= start) && self.end.map_or(true, |end| ts <= end)
    }
}

fn midnight(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Resolves `period` against a single captured `now`.
///
/// `yesterday` is a closed day ending at 23:59:59; the other periods end at `now`.
/// Unknown or absent tokens resolve to the unbounded window.
pub fn resolve_window_at(period: Option<&str>, now: DateTime<Utc>) -> TimeWindow {
    let Some(period) = period.and_then(Period::parse) else {
        return TimeWindow::unbounded();
    };

    let today = midnight(now);
    let (start, end) = match period {
        Period::Today => (today, now),
        Period::Yesterday => {
            let start = today - Duration::days(1);
            (start, start + Duration::seconds(86_399))
        }
        Period::LastWeek => (midnight(now - Duration::days(7)), now),
        Period::LastMonth => (midnight(now - Duration::days(30)), now),
    };

    TimeWindow {
        start: Some(start),
        end: Some(end),
    }
}

/// Resolves `period` against the current UTC instant.
pub fn resolve_window(period: Option<&str>) -> TimeWindow {
    resolve_window_at(period, Utc::now())
}
