//! Proposals: one producer's versioned position in a debate.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::producer::{ContentMap, ProducerId};
use crate::resolver::{Priority, Recommendation};

/// Threshold at or above which a priority signal is high.
pub const HIGH_PRIORITY_THRESHOLD: f64 = 0.75;
/// Threshold at or above which a priority signal is medium.
pub const MEDIUM_PRIORITY_THRESHOLD: f64 = 0.45;

/// Content keys that carry structure rather than domain findings.
pub const RESERVED_KEYS: &[&str] = &["recommendations", "impact_zones"];

/// Substring of a content key → impact zone it signals.
const ZONE_KEYWORDS: &[(&str, &str)] = &[
    ("hashtag", "discovery"),
    ("trend", "discovery"),
    ("viral", "discovery"),
    ("engagement", "engagement"),
    ("comment", "engagement"),
    ("audience", "audience"),
    ("follower", "growth"),
    ("growth", "growth"),
    ("posting", "timing"),
    ("schedule", "timing"),
    ("timing", "timing"),
    ("competitor", "market"),
    ("benchmark", "market"),
    ("market", "market"),
    ("quality", "content_quality"),
    ("content", "content"),
    ("fraud", "integrity"),
    ("bot", "integrity"),
    ("risk", "integrity"),
    ("reach", "reach"),
    ("impression", "reach"),
    ("conversion", "monetization"),
    ("revenue", "monetization"),
    ("sponsor", "monetization"),
];

/// A producer's position at one point of the debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub producer_id: ProducerId,
    pub confidence: f64,
    pub content: ContentMap,
    pub priority: Priority,
    pub impact_zones: BTreeSet<String>,
    /// Starts at 1; each refinement produces the next version
    pub version: u32,
}

impl Proposal {
    /// Initial proposal. Priority and impact zones are derived from content.
    pub fn new(producer_id: impl Into<ProducerId>, content: ContentMap, confidence: f64) -> Self {
        let confidence = clamp_confidence(confidence);
        Self {
            producer_id: producer_id.into(),
            priority: derive_priority(&content, confidence),
            impact_zones: extract_impact_zones(&content),
            content,
            confidence,
            version: 1,
        }
    }

    /// Stand-in for a producer that failed to contribute.
    pub fn empty(producer_id: impl Into<ProducerId>) -> Self {
        Self::new(producer_id, ContentMap::new(), 0.0)
    }

    /// Next version with new content and confidence.
    pub fn revise(&self, content: ContentMap, confidence: f64) -> Self {
        let confidence = clamp_confidence(confidence);
        Self {
            producer_id: self.producer_id.clone(),
            priority: derive_priority(&content, confidence),
            impact_zones: extract_impact_zones(&content),
            content,
            confidence,
            version: self.version + 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Domain content keys, excluding structural ones.
    pub fn domain_keys(&self) -> impl Iterator<Item = &String> {
        self.content
            .keys()
            .filter(|k| !RESERVED_KEYS.contains(&k.as_str()))
    }

    /// Recommendations carried in `content["recommendations"]`.
    ///
    /// Invalid entries are skipped; missing fields inherit this proposal's
    /// confidence and priority.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        match self.content.get("recommendations") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| {
                    Recommendation::from_content(item, self.confidence, self.priority)
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Derive a priority from content, falling back to confidence.
///
/// Signal order: explicit `priority` label, then `impact_score` or `urgency`
/// in 0.0–1.0, then the proposal confidence.
pub fn derive_priority(content: &ContentMap, confidence: f64) -> Priority {
    if let Some(priority) = content
        .get("priority")
        .and_then(Value::as_str)
        .and_then(Priority::parse)
    {
        return priority;
    }

    let signal = ["impact_score", "urgency"]
        .iter()
        .find_map(|key| content.get(*key).and_then(Value::as_f64))
        .filter(|v| v.is_finite())
        .unwrap_or(confidence)
        .clamp(0.0, 1.0);

    if signal >= HIGH_PRIORITY_THRESHOLD {
        Priority::High
    } else if signal >= MEDIUM_PRIORITY_THRESHOLD {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Impact zones signalled by content: explicit `impact_zones`, keyword
/// matches over content keys, and recommendation categories.
pub fn extract_impact_zones(content: &ContentMap) -> BTreeSet<String> {
    let mut zones = BTreeSet::new();

    if let Some(Value::Array(explicit)) = content.get("impact_zones") {
        zones.extend(
            explicit
                .iter()
                .filter_map(Value::as_str)
                .map(|z| z.trim().to_ascii_lowercase())
                .filter(|z| !z.is_empty()),
        );
    }

    for key in content.keys() {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        let key = key.to_ascii_lowercase();
        for (keyword, zone) in ZONE_KEYWORDS {
            if key.contains(keyword) {
                zones.insert((*zone).to_string());
            }
        }
    }

    if let Some(Value::Array(recs)) = content.get("recommendations") {
        zones.extend(
            recs.iter()
                .filter_map(|r| r.get("category"))
                .filter_map(Value::as_str)
                .map(|c| c.trim().to_ascii_lowercase())
                .filter(|c| !c.is_empty()),
        );
    }

    zones
}
