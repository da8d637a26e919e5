//! Recommendation data model and scoring.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Category assigned when a recommendation does not declare one.
pub const DEFAULT_CATEGORY: &str = "general";

/// Confidence assigned when neither the recommendation nor its proposal declares one.
pub const DEFAULT_RECOMMENDATION_CONFIDENCE: f64 = 0.5;

/// Recommendation priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    /// Scoring weight: low 1, medium 2, high 3.
    pub fn weight(self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 2.0,
            Self::High => 3.0,
        }
    }

    /// Parse a priority label, case-insensitively.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Declared execution window. Bounds are kept as written and parsed on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

impl TimeWindow {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

/// Expected effect of a recommendation, each axis in 0.0–1.0.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExpectedImpact {
    #[serde(default)]
    pub engagement: f64,
    #[serde(default)]
    pub reach: f64,
    #[serde(default)]
    pub conversion: f64,
}

impl ExpectedImpact {
    pub fn new(engagement: f64, reach: f64, conversion: f64) -> Self {
        Self {
            engagement: engagement.clamp(0.0, 1.0),
            reach: reach.clamp(0.0, 1.0),
            conversion: conversion.clamp(0.0, 1.0),
        }
    }

    /// Weighted impact term of the score.
    pub fn weighted(&self) -> f64 {
        0.3 * self.engagement + 0.3 * self.reach + 0.4 * self.conversion
    }

    fn clamped(self) -> Self {
        Self::new(self.engagement, self.reach, self.conversion)
    }
}

/// An actionable unit extracted from a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub resources: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<TimeWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    #[serde(default, alias = "strategy", skip_serializing_if = "Option::is_none")]
    pub strategy_label: Option<String>,
    #[serde(default)]
    pub actions: BTreeSet<String>,
    #[serde(default)]
    pub expected_impact: ExpectedImpact,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_confidence() -> f64 {
    DEFAULT_RECOMMENDATION_CONFIDENCE
}

/// Loosely-typed recommendation as it appears inside proposal content.
#[derive(Debug, Deserialize)]
struct RecommendationDraft {
    category: Option<String>,
    priority: Option<String>,
    #[serde(default)]
    resources: BTreeSet<String>,
    timing: Option<TimeWindow>,
    objective: Option<String>,
    #[serde(alias = "strategy")]
    strategy_label: Option<String>,
    #[serde(default)]
    actions: BTreeSet<String>,
    #[serde(default)]
    expected_impact: ExpectedImpact,
    confidence: Option<f64>,
}

impl Recommendation {
    /// New recommendation in `category` with default priority and confidence.
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            priority: Priority::Low,
            resources: BTreeSet::new(),
            timing: None,
            objective: None,
            strategy_label: None,
            actions: BTreeSet::new(),
            expected_impact: ExpectedImpact::default(),
            confidence: DEFAULT_RECOMMENDATION_CONFIDENCE,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources = resources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timing(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.timing = Some(TimeWindow::new(start, end));
        self
    }

    pub fn with_objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = Some(objective.into());
        self
    }

    pub fn with_strategy(mut self, label: impl Into<String>) -> Self {
        self.strategy_label = Some(label.into());
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_impact(mut self, engagement: f64, reach: f64, conversion: f64) -> Self {
        self.expected_impact = ExpectedImpact::new(engagement, reach, conversion);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// `(priority_weight + 0.3·engagement + 0.3·reach + 0.4·conversion) × confidence`
    pub fn score(&self) -> f64 {
        (self.priority.weight() + self.expected_impact.weighted()) * self.confidence
    }

    /// Parse one entry of a proposal's `recommendations` array.
    ///
    /// Missing confidence and priority inherit the proposal's values. Entries
    /// that are not objects or have ill-typed fields yield `None`.
    pub fn from_content(
        value: &Value,
        inherited_confidence: f64,
        inherited_priority: Priority,
    ) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let draft: RecommendationDraft = match serde_json::from_value(value.clone()) {
            Ok(draft) => draft,
            Err(e) => {
                debug!(error = %e, "Skipping malformed recommendation");
                return None;
            }
        };

        let priority = draft
            .priority
            .as_deref()
            .and_then(Priority::parse)
            .unwrap_or(inherited_priority);
        let confidence = draft
            .confidence
            .filter(|c| c.is_finite())
            .unwrap_or(inherited_confidence)
            .clamp(0.0, 1.0);

        Some(Self {
            category: draft
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            priority,
            resources: draft.resources,
            timing: draft.timing,
            objective: draft.objective,
            strategy_label: draft.strategy_label,
            actions: draft.actions,
            expected_impact: draft.expected_impact.clamped(),
            confidence,
        })
    }
}
