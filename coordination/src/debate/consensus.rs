//! Consensus synthesis: fold final proposals into one strategy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::proposal::Proposal;
use super::state::{DebateTranscript, ProposalConflict};
use crate::producer::{ContentMap, ProducerId};
use crate::resolver::{ConflictResolver, Recommendation};

/// Strategy section that producer content is distributed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    ShortTermActions,
    MediumTermActions,
    LongTermActions,
    PriorityMetrics,
    RiskFactors,
    SuccessIndicators,
    Timeline,
}

impl Bucket {
    pub const ALL: [Bucket; 7] = [
        Bucket::ShortTermActions,
        Bucket::MediumTermActions,
        Bucket::LongTermActions,
        Bucket::PriorityMetrics,
        Bucket::RiskFactors,
        Bucket::SuccessIndicators,
        Bucket::Timeline,
    ];

    /// Content keys feeding this bucket.
    pub fn content_keys(self) -> &'static [&'static str] {
        match self {
            Self::ShortTermActions => &["short_term_actions", "immediate_actions", "actions"],
            Self::MediumTermActions => &["medium_term_actions"],
            Self::LongTermActions => &["long_term_actions", "long_term_goals"],
            Self::PriorityMetrics => &["priority_metrics", "key_metrics", "metrics"],
            Self::RiskFactors => &["risk_factors", "risks", "issues"],
            Self::SuccessIndicators => &["success_indicators", "kpis", "targets"],
            Self::Timeline => &["timeline", "schedule", "best_posting_times"],
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShortTermActions => write!(f, "short_term_actions"),
            Self::MediumTermActions => write!(f, "medium_term_actions"),
            Self::LongTermActions => write!(f, "long_term_actions"),
            Self::PriorityMetrics => write!(f, "priority_metrics"),
            Self::RiskFactors => write!(f, "risk_factors"),
            Self::SuccessIndicators => write!(f, "success_indicators"),
            Self::Timeline => write!(f, "timeline"),
        }
    }
}

/// Mutable view of a bucket's storage.
enum BucketSlot<'a> {
    List(&'a mut Vec<Value>),
    Map(&'a mut ContentMap),
}

/// A pair of producers that strongly agreed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyAgreement {
    pub producers: (ProducerId, ProducerId),
    pub agreement_level: f64,
}

/// Summary statistics of a negotiation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebateSummary {
    pub round_count: u32,
    pub key_agreements: Vec<KeyAgreement>,
    /// Conflicts still present in the final round
    pub resolved_conflicts: Vec<ProposalConflict>,
    /// Mean final confidence × (1 − variance of final-round agreement)
    pub consensus_level: f64,
}

/// The merged, per-producer-attributed outcome of one negotiation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusStrategy {
    pub short_term_actions: Vec<Value>,
    pub medium_term_actions: Vec<Value>,
    pub long_term_actions: Vec<Value>,
    pub priority_metrics: ContentMap,
    pub risk_factors: Vec<Value>,
    pub success_indicators: ContentMap,
    pub timeline: ContentMap,
    /// Final content of each producer
    pub contributions: BTreeMap<ProducerId, ContentMap>,
    pub recommendations: Vec<Recommendation>,
    /// Set when recommendations were passed through unresolved
    pub degraded: bool,
    pub summary: DebateSummary,
}

impl ConsensusStrategy {
    fn slot(&mut self, bucket: Bucket) -> BucketSlot<'_> {
        match bucket {
            Bucket::ShortTermActions => BucketSlot::List(&mut self.short_term_actions),
            Bucket::MediumTermActions => BucketSlot::List(&mut self.medium_term_actions),
            Bucket::LongTermActions => BucketSlot::List(&mut self.long_term_actions),
            Bucket::PriorityMetrics => BucketSlot::Map(&mut self.priority_metrics),
            Bucket::RiskFactors => BucketSlot::List(&mut self.risk_factors),
            Bucket::SuccessIndicators => BucketSlot::Map(&mut self.success_indicators),
            Bucket::Timeline => BucketSlot::Map(&mut self.timeline),
        }
    }

    /// Accretively add `value` to `bucket`. Existing entries are never replaced.
    ///
    /// List buckets take each array element (or the value itself) once. Map
    /// buckets take each object entry, or the whole value keyed by `source`.
    pub fn integrate(&mut self, bucket: Bucket, value: &Value, source: &str) {
        match self.slot(bucket) {
            BucketSlot::List(items) => {
                let incoming: Vec<&Value> = match value {
                    Value::Array(values) => values.iter().collect(),
                    Value::Null => Vec::new(),
                    other => vec![other],
                };
                for v in incoming {
                    if !items.contains(v) {
                        items.push(v.clone());
                    }
                }
            }
            BucketSlot::Map(map) => match value {
                Value::Object(entries) => {
                    for (k, v) in entries {
                        map.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                }
                Value::Null => {}
                other => {
                    map.entry(source.to_string())
                        .or_insert_with(|| other.clone());
                }
            },
        }
    }

    /// Distribute one producer's content into every bucket.
    pub fn absorb(&mut self, proposal: &Proposal) {
        for bucket in Bucket::ALL {
            for key in bucket.content_keys() {
                if let Some(value) = proposal.content.get(*key) {
                    self.integrate(bucket, value, &proposal.producer_id);
                }
            }
        }
        self.contributions
            .entry(proposal.producer_id.clone())
            .or_insert_with(|| proposal.content.clone());
    }
}

/// Build the consensus strategy from a completed transcript.
pub fn synthesize(
    transcript: &DebateTranscript,
    resolver: &ConflictResolver,
    key_agreement_threshold: f64,
) -> ConsensusStrategy {
    let finals = transcript.final_proposals();
    let mut strategy = ConsensusStrategy::default();
    for proposal in finals {
        strategy.absorb(proposal);
    }

    let recs: Vec<Recommendation> = finals.iter().flat_map(|p| p.recommendations()).collect();
    let resolved = resolver.resolve(&recs);
    strategy.degraded = resolved.is_degraded();
    strategy.recommendations = resolved.into_payload();

    strategy.summary = summarize(transcript, key_agreement_threshold);
    strategy
}

/// Summary statistics over a transcript.
pub fn summarize(transcript: &DebateTranscript, key_agreement_threshold: f64) -> DebateSummary {
    let mut best: BTreeMap<(ProducerId, ProducerId), f64> = BTreeMap::new();
    for fb in transcript.all_feedback() {
        if fb.agreement_level <= key_agreement_threshold {
            continue;
        }
        let pair = if fb.from <= fb.to {
            (fb.from.clone(), fb.to.clone())
        } else {
            (fb.to.clone(), fb.from.clone())
        };
        let level = best.entry(pair).or_insert(fb.agreement_level);
        if fb.agreement_level > *level {
            *level = fb.agreement_level;
        }
    }
    let key_agreements = best
        .into_iter()
        .map(|(producers, agreement_level)| KeyAgreement {
            producers,
            agreement_level,
        })
        .collect();

    let resolved_conflicts = transcript
        .last_round()
        .map(|r| r.conflicts.clone())
        .unwrap_or_default();

    DebateSummary {
        round_count: transcript.round_count(),
        key_agreements,
        resolved_conflicts,
        consensus_level: consensus_level(transcript),
    }
}

fn consensus_level(transcript: &DebateTranscript) -> f64 {
    let finals = transcript.final_proposals();
    if finals.is_empty() {
        return 0.0;
    }
    let mean_confidence =
        finals.iter().map(|p| p.confidence).sum::<f64>() / finals.len() as f64;

    let levels: Vec<f64> = transcript
        .last_round()
        .map(|r| r.feedback.iter().map(|f| f.agreement_level).collect())
        .unwrap_or_default();
    let variance = if levels.is_empty() {
        0.0
    } else {
        let mean = levels.iter().sum::<f64>() / levels.len() as f64;
        levels.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / levels.len() as f64
    };

    (mean_confidence * (1.0 - variance)).clamp(0.0, 1.0)
}
