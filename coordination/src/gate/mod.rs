//! Validation gate around the negotiation pipeline.
//!
//! ```text
//! raw input ──pre-check──▶ HighRisk (risk > threshold, nothing else runs)
//!                     └──▶ Cleared { fraud_flags }
//! strategy  ──post-check─▶ Validated { adjustments, review_flags, confidence_scores }
//! ```
//!
//! The post-check looks at every numeric entry of the strategy's priority
//! metrics and success indicators. Infeasible values are clamped to the
//! nearest observed sample, never dropped. Values that disagree with prior
//! accepted strategies are flagged for review, never corrected.

pub mod feasibility;
pub mod fraud;

pub use feasibility::{feasibility, nearest, GroundTruth, StrategyHistory, HISTORY_TOLERANCE};
pub use fraud::{FraudComponent, FraudSignal, HighRiskResult};

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::debate::ConsensusStrategy;
use crate::producer::ContentMap;

pub const DEFAULT_RISK_THRESHOLD: f64 = 0.7;
pub const DEFAULT_FEASIBILITY_THRESHOLD: f64 = 0.6;
pub const DEFAULT_HISTORICAL_THRESHOLD: f64 = 0.5;
pub const DEFAULT_ELEVATED_THRESHOLD: f64 = 0.6;
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Historical confidence assumed for a field with no history.
const NEUTRAL_HISTORICAL_CONFIDENCE: f64 = 0.5;

const HISTORICAL_WEIGHT: f64 = 0.4;
const FEASIBILITY_WEIGHT: f64 = 0.3;
const CONSENSUS_WEIGHT: f64 = 0.3;

/// Thresholds of the validation gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Risk above which the pipeline is short-circuited.
    pub risk_threshold: f64,
    /// Feasibility below which a value is clamped.
    pub feasibility_threshold: f64,
    /// Historical confidence below which a value is flagged.
    pub historical_threshold: f64,
    /// Component risk at which input is flagged but still analyzed.
    pub elevated_threshold: f64,
    /// Accepted strategies kept for historical comparison.
    pub history_limit: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            risk_threshold: DEFAULT_RISK_THRESHOLD,
            feasibility_threshold: DEFAULT_FEASIBILITY_THRESHOLD,
            historical_threshold: DEFAULT_HISTORICAL_THRESHOLD,
            elevated_threshold: DEFAULT_ELEVATED_THRESHOLD,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// What is being validated.
#[derive(Debug, Clone)]
pub enum ValidationSubject<'a> {
    RawInput(&'a ContentMap),
    Strategy(ConsensusStrategy),
}

/// A value replaced by its nearest observed sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAdjustment {
    pub field: String,
    pub original: f64,
    pub adjusted: f64,
    pub feasibility: f64,
}

/// A value left in place but needing human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewFlag {
    pub field: String,
    pub value: f64,
    pub historical_confidence: f64,
}

/// Strategy after the post-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedStrategy {
    pub strategy: ConsensusStrategy,
    pub adjustments: Vec<FieldAdjustment>,
    pub review_flags: Vec<ReviewFlag>,
    /// Per-field `0.4·historical + 0.3·feasibility + 0.3·consensus`
    pub confidence_scores: BTreeMap<String, f64>,
}

impl ValidatedStrategy {
    pub fn needs_review(&self) -> bool {
        !self.review_flags.is_empty()
    }
}

/// Result of a validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum GateVerdict {
    /// Raw input may be analyzed; elevated components are listed
    Cleared { fraud_flags: Vec<FraudComponent> },
    /// Input rejected before analysis
    HighRisk(HighRiskResult),
    /// Strategy post-checked
    Validated(Box<ValidatedStrategy>),
}

/// Pre- and post-checks with a bounded history of accepted strategies.
#[derive(Debug)]
pub struct ValidationGate {
    config: GateConfig,
    history: Mutex<StrategyHistory>,
}

impl Default for ValidationGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}

impl ValidationGate {
    pub fn new(config: GateConfig) -> Self {
        let history = Mutex::new(StrategyHistory::new(config.history_limit));
        Self { config, history }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    fn history(&self) -> MutexGuard<'_, StrategyHistory> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of accepted strategies remembered.
    pub fn history_len(&self) -> usize {
        self.history().len()
    }

    /// Validate raw input or a strategy. Risk above the threshold always
    /// yields `HighRisk`.
    pub fn validate(
        &self,
        subject: ValidationSubject<'_>,
        fraud: &FraudSignal,
        ground_truth: &GroundTruth,
    ) -> GateVerdict {
        if fraud.risk_score > self.config.risk_threshold {
            warn!(
                risk_score = fraud.risk_score,
                threshold = self.config.risk_threshold,
                "High fraud risk detected"
            );
            return GateVerdict::HighRisk(HighRiskResult::from_signal(
                fraud,
                self.config.elevated_threshold,
            ));
        }

        match subject {
            ValidationSubject::RawInput(_) => GateVerdict::Cleared {
                fraud_flags: fraud.elevated(self.config.elevated_threshold),
            },
            ValidationSubject::Strategy(strategy) => {
                GateVerdict::Validated(Box::new(self.post_check(strategy, ground_truth)))
            }
        }
    }

    /// Feasibility clamping, historical flags and per-field confidence.
    pub fn post_check(
        &self,
        mut strategy: ConsensusStrategy,
        ground_truth: &GroundTruth,
    ) -> ValidatedStrategy {
        let consensus_level = strategy.summary.consensus_level;
        let mut adjustments = Vec::new();
        let mut review_flags = Vec::new();
        let mut confidence_scores = BTreeMap::new();
        let mut accepted = BTreeMap::new();

        let mut history = self.history();
        for (section, fields) in [
            ("priority_metrics", &mut strategy.priority_metrics),
            ("success_indicators", &mut strategy.success_indicators),
        ] {
            for (key, value) in fields.iter_mut() {
                let Some(original) = value.as_f64().filter(|v| v.is_finite()) else {
                    continue;
                };
                let field = format!("{}.{}", section, key);

                let samples = ground_truth.samples(key);
                let feasible = samples
                    .and_then(|s| feasibility(original, s))
                    .unwrap_or(1.0);
                let mut kept = original;
                if feasible < self.config.feasibility_threshold {
                    if let Some(adjusted) = samples.and_then(|s| nearest(original, s)) {
                        *value = number(adjusted);
                        kept = adjusted;
                        adjustments.push(FieldAdjustment {
                            field: field.clone(),
                            original,
                            adjusted,
                            feasibility: feasible,
                        });
                    }
                }

                let historical = history.historical_confidence(&field, kept);
                if let Some(h) = historical {
                    if h < self.config.historical_threshold {
                        review_flags.push(ReviewFlag {
                            field: field.clone(),
                            value: kept,
                            historical_confidence: h,
                        });
                    }
                }

                let h = historical.unwrap_or(NEUTRAL_HISTORICAL_CONFIDENCE);
                let score = (HISTORICAL_WEIGHT * h
                    + FEASIBILITY_WEIGHT * feasible
                    + CONSENSUS_WEIGHT * consensus_level)
                    .clamp(0.0, 1.0);
                confidence_scores.insert(field.clone(), score);
                accepted.insert(field, kept);
            }
        }
        history.record(accepted);
        drop(history);

        info!(
            adjustments = adjustments.len(),
            review_flags = review_flags.len(),
            fields = confidence_scores.len(),
            "Strategy post-check complete"
        );

        ValidatedStrategy {
            strategy,
            adjustments,
            review_flags,
            confidence_scores,
        }
    }
}

fn number(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        json!(v as i64)
    } else {
        json!(v)
    }
}
