use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One harvested content unit.
///
/// `occurred_at`, `author`, and `body` form the dedup identity; everything
/// else is best-effort payload. `engagement_texts` is only populated when
/// the engagement sub-harvest is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Source-provided timestamp of the unit.
    pub occurred_at: DateTime<Utc>,
    pub author: String,
    /// Normalized body: no embedded line breaks, trimmed.
    pub body: String,
    /// Metric-name → count, parsed from the unit's accessible label.
    #[serde(default)]
    pub metrics: BTreeMap<String, u64>,
    /// Related-content texts from the sub-harvest, in collection order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub engagement_texts: Vec<String>,
}

impl Record {
    pub fn new(occurred_at: DateTime<Utc>, author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            occurred_at,
            author: author.into(),
            body: body.into(),
            metrics: BTreeMap::new(),
            engagement_texts: Vec::new(),
        }
    }

    /// The dedup key. Two records with an identical triple are the same
    /// logical unit regardless of other field differences.
    pub fn identity(&self) -> Identity {
        Identity {
            occurred_at: self.occurred_at,
            author: self.author.clone(),
            body: self.body.clone(),
        }
    }
}

/// The (timestamp, author, normalized body) dedup triple.
///
/// This is an approximation — the source exposes no stable unique ID, so
/// two distinct real units sharing the triple collapse to one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub occurred_at: DateTime<Utc>,
    pub author: String,
    pub body: String,
}

/// Strip carriage returns and line feeds, trim surrounding whitespace.
/// An empty result is reported as `None`, never retried.
pub fn normalize_text(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse an accessible-label metrics string of comma-separated
/// `"<count> <label>"` segments into a label → count map.
///
/// Any segment that fails to parse degrades the whole field to an empty
/// map — a format problem in the label is never a unit-level failure.
pub fn parse_metric_counts(label: &str) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for segment in label.split(", ") {
        let Some((count, name)) = segment.split_once(' ') else {
            return BTreeMap::new();
        };
        let Ok(count) = count.parse::<u64>() else {
            return BTreeMap::new();
        };
        if name.trim().is_empty() {
            return BTreeMap::new();
        }
        counts.insert(name.trim().to_string(), count);
    }
    counts
}

/// Timestamp-derived default output filename, e.g. `records_20250102_1542.json`.
pub fn default_output_name(prefix: &str) -> String {
    format!("{}_{}.json", prefix, Utc::now().format("%Y%m%d_%H%M"))
}
