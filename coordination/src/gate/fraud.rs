//! Fraud signal extraction and high-risk results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::producer::{Analysis, ContentMap};

/// Weighted components of the overall risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudComponent {
    /// Like/comment velocity manipulation
    Engagement,
    /// Bot followers and interactions
    Bots,
    /// Fake accounts in the audience
    FakeAccounts,
    /// Growth and timing anomalies
    Temporal,
}

impl FraudComponent {
    pub const ALL: [FraudComponent; 4] = [
        FraudComponent::Engagement,
        FraudComponent::Bots,
        FraudComponent::FakeAccounts,
        FraudComponent::Temporal,
    ];

    pub fn weight(self) -> f64 {
        match self {
            Self::Engagement => 0.3,
            Self::Bots => 0.3,
            Self::FakeAccounts => 0.2,
            Self::Temporal => 0.2,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Engagement => "engagement",
            Self::Bots => "bots",
            Self::FakeAccounts => "fake_accounts",
            Self::Temporal => "temporal",
        }
    }

    pub fn mitigation(self) -> &'static str {
        match self {
            Self::Engagement => "Audit engagement sources and discount manipulated likes and comments",
            Self::Bots => "Remove bot followers and bot interactions from the dataset",
            Self::FakeAccounts => "Filter fake accounts out of the audience sample",
            Self::Temporal => "Normalize growth metrics around the detected anomalies",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }
}

impl std::fmt::Display for FraudComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Fraud assessment of the raw input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FraudSignal {
    /// Overall risk in 0.0–1.0
    pub risk_score: f64,
    /// Per-component risk in 0.0–1.0
    pub components: BTreeMap<FraudComponent, f64>,
    /// Raw fraud analysis, carried into high-risk results
    pub analysis: ContentMap,
}

impl FraudSignal {
    /// No fraud detected.
    pub fn none() -> Self {
        Self::default()
    }

    /// Risk as the weighted sum of component scores.
    pub fn from_components(components: BTreeMap<FraudComponent, f64>) -> Self {
        let components: BTreeMap<FraudComponent, f64> = components
            .into_iter()
            .map(|(c, v)| (c, clamp_unit(v)))
            .collect();
        let risk_score = components
            .iter()
            .map(|(c, v)| c.weight() * v)
            .sum::<f64>()
            .clamp(0.0, 1.0);
        Self {
            risk_score,
            components,
            analysis: ContentMap::new(),
        }
    }

    /// Read `risk_score` and `fraud_components` from content.
    ///
    /// An explicit `risk_score` wins; otherwise the weighted components give
    /// the score. Content with neither carries no risk.
    pub fn from_content(content: &ContentMap) -> Self {
        let components: BTreeMap<FraudComponent, f64> = match content.get("fraud_components") {
            Some(Value::Object(raw)) => raw
                .iter()
                .filter_map(|(k, v)| Some((FraudComponent::from_key(k)?, v.as_f64()?)))
                .collect(),
            _ => BTreeMap::new(),
        };

        let mut signal = Self::from_components(components);
        if let Some(score) = content.get("risk_score").and_then(Value::as_f64) {
            signal.risk_score = clamp_unit(score);
        }
        signal.analysis = content.clone();
        signal
    }

    /// Signal reported by a fraud producer.
    pub fn from_analysis(analysis: &Analysis) -> Self {
        Self::from_content(&analysis.content)
    }

    /// Components at or above `threshold`.
    pub fn elevated(&self, threshold: f64) -> Vec<FraudComponent> {
        self.components
            .iter()
            .filter(|(_, v)| **v >= threshold)
            .map(|(c, _)| *c)
            .collect()
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

/// Returned instead of a strategy when the input is too risky to analyze.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighRiskResult {
    pub risk_score: f64,
    pub fraud_analysis: ContentMap,
    pub elevated_components: Vec<FraudComponent>,
    pub mitigation_steps: Vec<String>,
    pub clean_data_required: bool,
}

impl HighRiskResult {
    pub fn from_signal(signal: &FraudSignal, elevated_threshold: f64) -> Self {
        let elevated = signal.elevated(elevated_threshold);
        let mut steps: Vec<String> = elevated
            .iter()
            .map(|c| c.mitigation().to_string())
            .collect();
        steps.push("Resubmit the request with cleaned data".to_string());

        Self {
            risk_score: signal.risk_score,
            fraud_analysis: signal.analysis.clone(),
            elevated_components: elevated,
            mitigation_steps: steps,
            clean_data_required: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content(value: Value) -> ContentMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_weighted_components() {
        let signal = FraudSignal::from_components(BTreeMap::from([
            (FraudComponent::Engagement, 1.0),
            (FraudComponent::Bots, 1.0),
            (FraudComponent::FakeAccounts, 0.5),
            (FraudComponent::Temporal, 0.0),
        ]));
        assert!((signal.risk_score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_explicit_risk_score_wins() {
        let signal = FraudSignal::from_content(&content(json!({
            "risk_score": 0.85,
            "fraud_components": {"bots": 0.9, "unknown": 0.4}
        })));
        assert_eq!(signal.risk_score, 0.85);
        assert_eq!(signal.components.len(), 1);
        assert_eq!(signal.elevated(0.6), vec![FraudComponent::Bots]);
        assert_eq!(signal.analysis["risk_score"], json!(0.85));
    }

    #[test]
    fn test_no_signal_means_no_risk() {
        let signal = FraudSignal::from_content(&content(json!({"followers": 1200})));
        assert_eq!(signal.risk_score, 0.0);
        assert!(signal.components.is_empty());
    }

    #[test]
    fn test_high_risk_result_mitigations() {
        let signal = FraudSignal::from_content(&content(json!({
            "fraud_components": {"bots": 0.95, "engagement": 0.9, "temporal": 0.1}
        })));
        let result = HighRiskResult::from_signal(&signal, 0.6);
        assert!(result.clean_data_required);
        assert_eq!(
            result.elevated_components,
            vec![FraudComponent::Engagement, FraudComponent::Bots]
        );
        assert_eq!(result.mitigation_steps.len(), 3);
    }
}
