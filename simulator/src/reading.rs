use chrono::{DateTime, Timelike, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Payload published on `telemetry/{device_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyReading {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub energy_watts: f64,
}

/// Power draw range of an appliance class, in watts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile {
    pub device_type: &'static str,
    pub min_watts: f64,
    pub max_watts: f64,
}

pub const PROFILES: [Profile; 4] = [
    Profile {
        device_type: "refrigerator",
        min_watts: 50.0,
        max_watts: 150.0,
    },
    Profile {
        device_type: "air_conditioner",
        min_watts: 1000.0,
        max_watts: 3000.0,
    },
    Profile {
        device_type: "television",
        min_watts: 50.0,
        max_watts: 200.0,
    },
    Profile {
        device_type: "appliance",
        min_watts: 200.0,
        max_watts: 800.0,
    },
];

const FALLBACK: Profile = Profile {
    device_type: "other",
    min_watts: 50.0,
    max_watts: 300.0,
};

impl Profile {
    pub fn for_type(device_type: &str) -> Profile {
        PROFILES
            .iter()
            .copied()
            .find(|p| p.device_type.eq_ignore_ascii_case(device_type.trim()))
            .unwrap_or(FALLBACK)
    }
}

/// A simulated meter.
#[derive(Debug, Clone, PartialEq)]
pub struct Meter {
    pub device_id: String,
    pub profile: Profile,
}

/// Parses `id[=type]` entries separated by commas. Entries without a type cycle
/// through the known profiles.
pub fn parse_meters(list: &str) -> Vec<Meter> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .enumerate()
        .filter_map(|(i, entry)| {
            let (id, profile) = match entry.split_once('=') {
                Some((id, device_type)) => (id.trim(), Profile::for_type(device_type)),
                None => (entry, PROFILES[i % PROFILES.len()]),
            };
            (!id.is_empty()).then(|| Meter {
                device_id: id.to_string(),
                profile,
            })
        })
        .collect()
}

/// `count` meters named `dev-0..`, cycling through the known profiles.
pub fn generated_meters(count: usize) -> Vec<Meter> {
    (0..count)
        .map(|i| Meter {
            device_id: format!("dev-{i}"),
            profile: PROFILES[i % PROFILES.len()],
        })
        .collect()
}

/// Random draw within the profile, with +/-10% noise and more load around midday.
pub fn generate_reading(rng: &mut impl Rng, meter: &Meter, at: DateTime<Utc>) -> EnergyReading {
    let base = rng.gen_range(meter.profile.min_watts..=meter.profile.max_watts);
    let noise = rng.gen_range(-0.1..=0.1) * base;
    let hour = at.hour() as f64;
    let time_factor = 1.0 + 0.2 * ((hour - 12.0) / 12.0).abs();
    let watts = ((base + noise).max(0.0) * time_factor * 100.0).round() / 100.0;

    EnergyReading {
        device_id: meter.device_id.clone(),
        timestamp: at,
        energy_watts: watts,
    }
}
