//! Intent classification. A single language-model call maps the query onto a closed set
//! of categories; every failure resolves to `OffTopic`.

use std::fmt;

use tracing::{info, warn};

use crate::metrics::{NLM_FAILURES_TOTAL, UNKNOWN_INTENTS_TOTAL};
use crate::nlm::Classifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    EnergyUsage,
    DeviceComparison,
    TopConsumers,
    EnergySummary,
    DeviceList,
    Greeting,
    Thanks,
    Goodbye,
    OffTopic,
}

impl Intent {
    pub const ALL: [Intent; 9] = [
        Intent::EnergyUsage,
        Intent::DeviceComparison,
        Intent::TopConsumers,
        Intent::EnergySummary,
        Intent::DeviceList,
        Intent::Greeting,
        Intent::Thanks,
        Intent::Goodbye,
        Intent::OffTopic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::EnergyUsage => "ENERGY_USAGE",
            Intent::DeviceComparison => "DEVICE_COMPARISON",
            Intent::TopConsumers => "TOP_CONSUMERS",
            Intent::EnergySummary => "ENERGY_SUMMARY",
            Intent::DeviceList => "DEVICE_LIST",
            Intent::Greeting => "GREETING",
            Intent::Thanks => "THANKS",
            Intent::Goodbye => "GOODBYE",
            Intent::OffTopic => "OFF_TOPIC",
        }
    }

    /// Matches a raw category label after uppercasing and turning spaces into
    /// underscores. Returns `None` for labels outside the closed set.
    pub fn from_label(raw: &str) -> Option<Self> {
        let label = raw.trim().to_uppercase().replace(' ', "_");
        Intent::ALL.into_iter().find(|intent| intent.as_str() == label)
    }

    /// Small talk needs neither parameters nor storage access.
    pub fn is_conversational(&self) -> bool {
        matches!(
            self,
            Intent::Greeting | Intent::Thanks | Intent::Goodbye | Intent::OffTopic
        )
    }

    /// Analytical intents whose handlers consume an extracted parameter record.
    pub fn needs_parameters(&self) -> bool {
        matches!(
            self,
            Intent::EnergyUsage
                | Intent::DeviceComparison
                | Intent::TopConsumers
                | Intent::EnergySummary
        )
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies `query`. Never fails: transport errors and unknown labels become `OffTopic`.
pub async fn classify_intent(classifier: &dyn Classifier, query: &str) -> Intent {
    let raw = match classifier.classify(query).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Intent classification failed, defaulting to OFF_TOPIC");
            NLM_FAILURES_TOTAL.with_label_values(&["classify"]).inc();
            return Intent::OffTopic;
        }
    };

    match Intent::from_label(&raw) {
        Some(intent) => {
            info!(intent = %intent, "Classified query");
            intent
        }
        None => {
            warn!(label = %raw.trim(), "Unknown intent label, defaulting to OFF_TOPIC");
            UNKNOWN_INTENTS_TOTAL.inc();
            Intent::OffTopic
        }
    }
}
