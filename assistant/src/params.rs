//! Structured parameters extracted from analytical queries.
//!
//! The model is asked for a bare JSON object but is not trusted to comply: output is
//! decoded strictly (directly, or after dropping a leading and/or trailing Markdown fence
//! marker) and any failure yields the empty record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::metrics::{EXTRACTION_FALLBACKS_TOTAL, NLM_FAILURES_TOTAL};
use crate::nlm::Extractor;
use crate::window::TimeWindow;

/// Parameter record. Every field is optional; `None` means "unspecified".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParameters {
    #[serde(deserialize_with = "lenient_string")]
    pub device_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub device_type: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub time_period: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub start_time: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub end_time: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub comparison: Option<bool>,
    #[serde(deserialize_with = "lenient_string")]
    pub aggregation: Option<String>,
    #[serde(deserialize_with = "lenient_limit")]
    pub limit: Option<u32>,
}

impl QueryParameters {
    /// Decodes model output. `None` when the text holds no JSON object.
    pub fn from_model_output(raw: &str) -> Option<Self> {
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }

        decode_object(text).or_else(|| unfenced(text).and_then(decode_object))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Window spelled out with explicit RFC 3339 bounds, if both parse and are ordered.
    pub fn explicit_window(&self) -> Option<TimeWindow> {
        let start = parse_instant(self.start_time.as_deref()?)?;
        let end = parse_instant(self.end_time.as_deref()?)?;
        TimeWindow::between(start, end)
    }
}

fn decode_object(text: &str) -> Option<QueryParameters> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => QueryParameters::deserialize(value).ok(),
        _ => None,
    }
}

/// Text with an optional leading ```` ``` ````/```` ```json ```` marker and an optional
/// trailing ```` ``` ```` removed, each on its own. `None` when neither marker is present
/// or another fence remains inside.
fn unfenced(text: &str) -> Option<&str> {
    let mut body = text;
    let mut stripped = false;

    if let Some(rest) = body.strip_prefix("```") {
        body = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
        stripped = true;
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
        stripped = true;
    }

    let body = body.trim();
    (stripped && !body.contains("```")).then_some(body)
}

fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => {
            let s = s.trim();
            (!s.is_empty() && !s.eq_ignore_ascii_case("null")).then(|| s.to_string())
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::String(s)) => s.trim().to_lowercase().parse().ok(),
        _ => None,
    })
}

fn lenient_limit<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .map(|n| n.min(u32::MAX as u64) as u32),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Extracts parameters for `query`. Never fails: errors yield the empty record.
pub async fn extract_parameters(extractor: &dyn Extractor, query: &str) -> QueryParameters {
    let raw = match extractor.extract_parameters(query).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Parameter extraction failed, using empty parameters");
            NLM_FAILURES_TOTAL.with_label_values(&["extract"]).inc();
            return QueryParameters::default();
        }
    };

    match QueryParameters::from_model_output(&raw) {
        Some(params) => {
            debug!(?params, "Extracted query parameters");
            params
        }
        None => {
            warn!(response = %raw, "Model returned no JSON object, using empty parameters");
            EXTRACTION_FALLBACKS_TOTAL.inc();
            QueryParameters::default()
        }
    }
}
