//! Turns handler outcomes into the answer text and the matching `data` payload.
//! Every number in an answer comes from the outcome; `data` carries the same numbers
//! unrounded.

use crate::handlers::{Outcome, RankingKind, ResolvedPeriod, Scope};
use crate::intent::Intent;
use crate::model::{Device, DeviceAverage, ReadingStats};
use serde_json::{json, Value};
use std::fmt::Write;

pub const GREETING: &str = "Hello! I'm your smart home energy assistant. I can help you monitor \
your energy usage, compare devices, and find the biggest consumers. What would you like to know \
about your energy consumption?";
pub const THANKS: &str =
    "You're welcome! Feel free to ask me anything about your energy usage anytime.";
pub const GOODBYE: &str =
    "Goodbye! Have a great day and remember to keep an eye on your energy usage!";
pub const OFF_TOPIC: &str = "I'm here to help with energy monitoring questions. \
I can help you with:\n\
• Energy usage for specific devices\n\
• Comparing energy consumption between devices\n\
• Finding your highest energy consuming devices\n\
• Energy usage summaries\n\
• Listing your devices";
pub const NO_DEVICES: &str = "You don't have any devices registered yet.";
pub const FAILURE: &str = "Sorry, I encountered an error while processing your request. \
Please try again or rephrase your question.";

/// Answer text plus optional structured payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Composed {
    pub answer: String,
    pub data: Option<Value>,
}

impl Composed {
    fn text(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            data: None,
        }
    }
}

pub fn compose(outcome: &Outcome) -> Composed {
    match outcome {
        Outcome::SmallTalk(intent) => Composed::text(small_talk(*intent)),
        Outcome::NoDevices => Composed::text(NO_DEVICES),
        Outcome::Failed => Composed::text(FAILURE),
        Outcome::DeviceNotFound { requested, devices } => Composed::text(not_found(
            &format!("a device named '{requested}'"),
            devices,
        )),
        Outcome::DeviceTypeNotFound { requested, devices } => Composed::text(not_found(
            &format!("any devices of type '{requested}'"),
            devices,
        )),
        Outcome::NoData { subject, period } => Composed::text(format!(
            "No energy data found for {subject} in the specified time period ({}).",
            period.label
        )),
        Outcome::DeviceUsage {
            device,
            period,
            stats,
        } => device_usage(device, period, stats),
        Outcome::UsageSummary {
            scope,
            device_count,
            period,
            stats,
        } => usage_summary(scope, *device_count, period, stats),
        Outcome::EnergySummary {
            device_count,
            period,
            stats,
        } => energy_summary(*device_count, period, stats),
        Outcome::Ranking {
            kind,
            period,
            entries,
        } => ranking(*kind, period, entries),
        Outcome::NoRankingData { kind } => Composed::text(match kind {
            RankingKind::Comparison => "No energy data available for device comparison.",
            RankingKind::TopConsumers => "No energy data available.",
        }),
        Outcome::DeviceList(devices) => device_list(devices),
    }
}

fn small_talk(intent: Intent) -> &'static str {
    match intent {
        Intent::Greeting => GREETING,
        Intent::Thanks => THANKS,
        Intent::Goodbye => GOODBYE,
        _ => OFF_TOPIC,
    }
}

fn not_found(what: &str, devices: &[Device]) -> String {
    if devices.is_empty() {
        return format!("I couldn't find {what}, and you don't have any devices registered yet.");
    }
    let names: Vec<String> = devices
        .iter()
        .map(|d| format!("{} ({})", d.name, d.device_type))
        .collect();
    format!("I couldn't find {what}. Here are your devices: {}", names.join(", "))
}

fn stats_lines(answer: &mut String, stats: &ReadingStats, with_min: bool) {
    let _ = writeln!(answer, "• Average power: {:.1} watts", stats.average_power_watts);
    let _ = writeln!(answer, "• Peak power: {:.1} watts", stats.max_power_watts);
    if with_min {
        let _ = writeln!(answer, "• Minimum power: {:.1} watts", stats.min_power_watts);
    }
    let _ = write!(answer, "• Total readings: {}", stats.reading_count);
}

fn device_usage(device: &Device, period: &ResolvedPeriod, stats: &ReadingStats) -> Composed {
    let mut answer = format!("Energy usage for {} ({}):\n", device.name, period.label);
    stats_lines(&mut answer, stats, false);

    Composed {
        answer,
        data: Some(json!({
            "device_id": device.device_id,
            "device_name": device.name,
            "device_type": device.device_type,
            "time_period": period.label,
            "average_power": stats.average_power_watts,
            "max_power": stats.max_power_watts,
            "readings_count": stats.reading_count,
        })),
    }
}

fn usage_summary(
    scope: &Scope,
    device_count: usize,
    period: &ResolvedPeriod,
    stats: &ReadingStats,
) -> Composed {
    let (heading, scope_value) = match scope {
        Scope::AllDevices => ("all devices".to_string(), "all_devices".to_string()),
        Scope::DeviceType(t) => (format!("your {t} devices"), t.clone()),
    };
    let mut answer = format!("Energy summary for {heading} ({}):\n", period.label);
    stats_lines(&mut answer, stats, false);

    Composed {
        answer,
        data: Some(summary_data(&scope_value, device_count, period, stats)),
    }
}

fn energy_summary(device_count: usize, period: &ResolvedPeriod, stats: &ReadingStats) -> Composed {
    let mut answer = format!("Energy summary ({}):\n", period.label);
    stats_lines(&mut answer, stats, true);

    Composed {
        answer,
        data: Some(summary_data("all_devices", device_count, period, stats)),
    }
}

fn summary_data(
    scope: &str,
    device_count: usize,
    period: &ResolvedPeriod,
    stats: &ReadingStats,
) -> Value {
    json!({
        "scope": scope,
        "device_count": device_count,
        "time_period": period.label,
        "reading_count": stats.reading_count,
        "average_power_watts": stats.average_power_watts,
        "max_power_watts": stats.max_power_watts,
        "min_power_watts": stats.min_power_watts,
    })
}

fn ranking(kind: RankingKind, period: &ResolvedPeriod, entries: &[DeviceAverage]) -> Composed {
    let mut answer = match kind {
        RankingKind::TopConsumers => format!(
            "Top {} energy consuming devices ({}):",
            entries.len(),
            period.label
        ),
        RankingKind::Comparison => {
            format!("Device comparison by average power ({}):", period.label)
        }
    };
    for (i, entry) in entries.iter().enumerate() {
        let _ = write!(
            answer,
            "\n{}. {} ({}): {:.1} watts",
            i + 1,
            entry.device.name,
            entry.device.device_type,
            entry.average_power_watts
        );
    }

    let top: Vec<Value> = entries
        .iter()
        .map(|e| {
            json!({
                "device_id": e.device.device_id,
                "name": e.device.name,
                "type": e.device.device_type,
                "average_power_watts": e.average_power_watts,
            })
        })
        .collect();

    Composed {
        answer,
        data: Some(json!({ "time_period": period.label, "top_consumers": top })),
    }
}

fn device_list(devices: &[Device]) -> Composed {
    let mut answer = String::from("Your registered devices:");
    for (i, d) in devices.iter().enumerate() {
        let status = if d.is_active { "Active" } else { "Inactive" };
        let _ = write!(answer, "\n{}. {} ({}) - {}", i + 1, d.name, d.device_type, status);
    }

    let listed: Vec<Value> = devices
        .iter()
        .map(|d| {
            json!({
                "device_id": d.device_id,
                "name": d.name,
                "type": d.device_type,
                "active": d.is_active,
            })
        })
        .collect();

    Composed {
        answer,
        data: Some(json!({ "devices": listed })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::TimeWindow;
    use chrono::Utc;

    fn device(name: &str, active: bool) -> Device {
        Device {
            id: 1,
            device_id: "ext-1".to_string(),
            name: name.to_string(),
            device_type: "refrigerator".to_string(),
            user_id: 1,
            is_active: active,
            created_at: Utc::now(),
        }
    }

    fn period(label: &str) -> ResolvedPeriod {
        ResolvedPeriod {
            label: label.to_string(),
            window: TimeWindow::unbounded(),
        }
    }

    fn stats() -> ReadingStats {
        ReadingStats {
            reading_count: 42,
            average_power_watts: 98.4,
            max_power_watts: 149.0,
            min_power_watts: 51.5,
        }
    }

    #[test]
    fn test_small_talk_has_no_data() {
        for intent in [Intent::Greeting, Intent::Thanks, Intent::Goodbye, Intent::OffTopic] {
            let composed = compose(&Outcome::SmallTalk(intent));
            assert!(!composed.answer.is_empty());
            assert!(composed.data.is_none());
        }
        assert_eq!(compose(&Outcome::SmallTalk(Intent::Greeting)).answer, GREETING);
    }

    #[test]
    fn test_device_usage_numbers_match_data() {
        let composed = compose(&Outcome::DeviceUsage {
            device: device("Kitchen Fridge", true),
            period: period("yesterday"),
            stats: stats(),
        });

        assert!(composed.answer.starts_with("Energy usage for Kitchen Fridge (yesterday):"));
        assert!(composed.answer.contains("Average power: 98.4 watts"));
        assert!(composed.answer.contains("Peak power: 149.0 watts"));
        assert!(composed.answer.contains("Total readings: 42"));

        let data = composed.data.unwrap();
        assert_eq!(data["device_name"], "Kitchen Fridge");
        assert_eq!(data["average_power"], 98.4);
        assert_eq!(data["max_power"], 149.0);
        assert_eq!(data["readings_count"], 42);
    }

    #[test]
    fn test_energy_summary_includes_minimum() {
        let composed = compose(&Outcome::EnergySummary {
            device_count: 3,
            period: period("today"),
            stats: stats(),
        });
        assert!(composed.answer.contains("Minimum power: 51.5 watts"));
        assert_eq!(composed.data.unwrap()["min_power_watts"], 51.5);
    }

    #[test]
    fn test_not_found_lists_devices() {
        let composed = compose(&Outcome::DeviceNotFound {
            requested: "fridge".to_string(),
            devices: vec![device("Garage Freezer", true)],
        });
        assert_eq!(
            composed.answer,
            "I couldn't find a device named 'fridge'. \
             Here are your devices: Garage Freezer (refrigerator)"
        );
        assert!(composed.data.is_none());
    }

    #[test]
    fn test_device_list_shows_status() {
        let composed = compose(&Outcome::DeviceList(vec![
            device("Kitchen Fridge", true),
            device("Old TV", false),
        ]));
        assert!(composed.answer.contains("1. Kitchen Fridge (refrigerator) - Active"));
        assert!(composed.answer.contains("2. Old TV (refrigerator) - Inactive"));
        assert_eq!(composed.data.unwrap()["devices"][1]["active"], false);
    }

    #[test]
    fn test_ranking_is_numbered() {
        let entries = vec![
            DeviceAverage {
                device: device("AC", true),
                average_power_watts: 2000.0,
            },
            DeviceAverage {
                device: device("Fridge", true),
                average_power_watts: 100.04,
            },
        ];
        let composed = compose(&Outcome::Ranking {
            kind: RankingKind::TopConsumers,
            period: period("all time"),
            entries,
        });
        assert!(composed.answer.starts_with("Top 2 energy consuming devices (all time):"));
        assert!(composed.answer.ends_with("2. Fridge (refrigerator): 100.0 watts"));
        assert_eq!(composed.data.unwrap()["top_consumers"].as_array().unwrap().len(), 2);
    }
}
