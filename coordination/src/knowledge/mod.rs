//! Shared knowledge: the per-domain store and the confidence it records.
//!
//! Confidence of a published result is `0.7 × completeness + 0.3 × recency`.
//! Completeness is the fraction of the producer kind's expected fields that
//! are present and non-null. Recency decays linearly from the content's
//! `as_of` (or `timestamp`) to zero at the horizon; content without a
//! timestamp counts as fresh.

pub mod store;

pub use store::{
    KnowledgeStore, SharedKnowledgeEntry, SharedKnowledgeStore, StoreError, StoreResult,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::producer::ContentMap;

pub const DEFAULT_RECENCY_HORIZON_DAYS: u32 = 30;

const COMPLETENESS_WEIGHT: f64 = 0.7;
const RECENCY_WEIGHT: f64 = 0.3;

/// Content keys read as the content's reference time, in order.
const TIMESTAMP_KEYS: &[&str] = &["as_of", "timestamp"];

/// Scores published knowledge by completeness and recency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceModel {
    pub recency_horizon_days: u32,
}

impl Default for ConfidenceModel {
    fn default() -> Self {
        Self {
            recency_horizon_days: DEFAULT_RECENCY_HORIZON_DAYS,
        }
    }
}

impl ConfidenceModel {
    pub fn new(recency_horizon_days: u32) -> Self {
        Self {
            recency_horizon_days,
        }
    }

    /// Fraction of `expected` fields present and non-null. No expectations → 1.0.
    pub fn completeness(&self, expected: &[&str], content: &ContentMap) -> f64 {
        if expected.is_empty() {
            return 1.0;
        }
        let present = expected
            .iter()
            .filter(|f| content.get(**f).is_some_and(|v| !v.is_null()))
            .count();
        present as f64 / expected.len() as f64
    }

    /// `max(0, 1 − age / horizon)`. Future or missing timestamps are fresh.
    pub fn recency(&self, content: &ContentMap, now: DateTime<Utc>) -> f64 {
        let Some(as_of) = content_timestamp(content) else {
            return 1.0;
        };
        if self.recency_horizon_days == 0 {
            return if as_of >= now { 1.0 } else { 0.0 };
        }
        let age_secs = (now - as_of).num_seconds().max(0) as f64;
        let horizon_secs = f64::from(self.recency_horizon_days) * 86_400.0;
        (1.0 - age_secs / horizon_secs).max(0.0)
    }

    /// Combined confidence in 0.0–1.0.
    pub fn score(&self, expected: &[&str], content: &ContentMap, now: DateTime<Utc>) -> f64 {
        (COMPLETENESS_WEIGHT * self.completeness(expected, content)
            + RECENCY_WEIGHT * self.recency(content, now))
        .clamp(0.0, 1.0)
    }
}

fn content_timestamp(content: &ContentMap) -> Option<DateTime<Utc>> {
    TIMESTAMP_KEYS.iter().find_map(|key| {
        content
            .get(*key)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    })
}
