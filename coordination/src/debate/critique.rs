//! Peer feedback: agreement, concerns, and suggestions between proposals.
//!
//! Every proposal is critiqued by every other proposal of the same round.
//! Feedback from sufficiently agreeing peers is folded back into the target
//! proposal by [`apply_feedback`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::proposal::Proposal;
use crate::producer::{ContentMap, ProducerId};

/// Relative tolerance under which two numbers count as consistent.
pub const NUMERIC_TOLERANCE: f64 = 0.1;

/// Peer confidence below which the peer itself is raised as a concern.
pub const LOW_PEER_CONFIDENCE: f64 = 0.3;

/// Weight of the prior confidence when recomputing.
const PRIOR_WEIGHT: f64 = 0.7;
/// Weight of mean peer agreement when recomputing.
const AGREEMENT_WEIGHT: f64 = 0.3;
/// Penalty per concern received.
const CONCERN_PENALTY: f64 = 0.02;
/// Cap on the total concern penalty.
const MAX_CONCERN_PENALTY: f64 = 0.1;

/// Feedback from one proposal (`from`) on another (`to`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub from: ProducerId,
    pub to: ProducerId,
    /// 0.0–1.0, higher when the two proposals agree
    pub agreement_level: f64,
    pub concerns: Vec<String>,
    /// Peer entries whose keys the target lacks
    pub suggestions: ContentMap,
}

/// Critique `target` from the point of view of `peer`.
pub fn assess(target: &Proposal, peer: &Proposal) -> Feedback {
    let target_keys: BTreeSet<&String> = target.domain_keys().collect();
    let peer_keys: BTreeSet<&String> = peer.domain_keys().collect();

    let mut concerns = Vec::new();
    let mut consistent = 0usize;
    for key in target_keys.intersection(&peer_keys) {
        if values_consistent(&target.content[key.as_str()], &peer.content[key.as_str()]) {
            consistent += 1;
        } else {
            concerns.push(format!("conflicting values for '{}'", key));
        }
    }

    let union = target_keys.union(&peer_keys).count();
    let key_ratio = if union == 0 {
        0.0
    } else {
        consistent as f64 / union as f64
    };
    let agreement_level =
        (0.5 * jaccard(&target.impact_zones, &peer.impact_zones) + 0.5 * key_ratio)
            .clamp(0.0, 1.0);

    if peer.confidence < LOW_PEER_CONFIDENCE {
        concerns.push(format!(
            "low confidence source {} ({:.2})",
            peer.producer_id, peer.confidence
        ));
    }

    let suggestions: ContentMap = peer
        .domain_keys()
        .filter(|k| !target.content.contains_key(k.as_str()))
        .map(|k| (k.clone(), peer.content[k.as_str()].clone()))
        .collect();

    Feedback {
        from: peer.producer_id.clone(),
        to: target.producer_id.clone(),
        agreement_level,
        concerns,
        suggestions,
    }
}

/// Refine `target` with the feedback it received this round.
///
/// Suggestions from peers above `suggestion_threshold` are merged by key; on
/// collision the higher-agreement peer wins (earlier peer on ties). Priority
/// and impact zones are re-derived and the version advances.
pub fn apply_feedback(
    target: &Proposal,
    received: &[&Feedback],
    suggestion_threshold: f64,
) -> Proposal {
    if received.is_empty() {
        return target.revise(target.content.clone(), target.confidence);
    }

    let mut accepted: Vec<&Feedback> = received
        .iter()
        .copied()
        .filter(|f| f.agreement_level > suggestion_threshold)
        .collect();
    // stable: equal agreement keeps peer order
    accepted.sort_by(|a, b| b.agreement_level.total_cmp(&a.agreement_level));

    let mut content = target.content.clone();
    for feedback in accepted {
        for (key, value) in &feedback.suggestions {
            if !content.contains_key(key) {
                content.insert(key.clone(), value.clone());
            }
        }
    }

    let mean_agreement =
        received.iter().map(|f| f.agreement_level).sum::<f64>() / received.len() as f64;
    let concern_count: usize = received.iter().map(|f| f.concerns.len()).sum();
    let penalty = (CONCERN_PENALTY * concern_count as f64).min(MAX_CONCERN_PENALTY);
    let confidence =
        (PRIOR_WEIGHT * target.confidence + AGREEMENT_WEIGHT * mean_agreement - penalty)
            .clamp(0.0, 1.0);

    target.revise(content, confidence)
}

/// Whether two content values agree. Numbers within 10% relative tolerance
/// agree; strings compare case-insensitively; everything else exactly.
pub fn values_consistent(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => {
                let scale = x.abs().max(y.abs());
                scale == 0.0 || (x - y).abs() <= NUMERIC_TOLERANCE * scale
            }
            _ => x == y,
        },
        (Value::String(x), Value::String(y)) => x.trim().eq_ignore_ascii_case(y.trim()),
        _ => a == b,
    }
}

/// |A ∩ B| / |A ∪ B|, zero when both are empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn proposal(id: &str, value: Value, confidence: f64) -> Proposal {
        match value {
            Value::Object(map) => Proposal::new(id, map, confidence),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_values_consistent_numeric_tolerance() {
        assert!(values_consistent(&json!(100), &json!(105)));
        assert!(!values_consistent(&json!(100), &json!(120)));
        assert!(values_consistent(&json!(0), &json!(0.0)));
        assert!(values_consistent(&json!("Reels"), &json!("reels")));
        assert!(!values_consistent(&json!([1]), &json!([2])));
    }

    #[test]
    fn test_identical_proposals_fully_agree() {
        let a = proposal("trend", json!({"engagement_rate": 0.05}), 0.8);
        let b = proposal("quality", json!({"engagement_rate": 0.05}), 0.8);
        let fb = assess(&a, &b);
        assert_eq!(fb.from, "quality");
        assert_eq!(fb.to, "trend");
        assert!((fb.agreement_level - 1.0).abs() < 1e-9);
        assert!(fb.concerns.is_empty());
        assert!(fb.suggestions.is_empty());
    }

    #[test]
    fn test_disjoint_proposals_do_not_agree() {
        let a = proposal("trend", json!({"trending_hashtags": ["#a"]}), 0.8);
        let b = proposal("competitor", json!({"market_position": 3}), 0.8);
        let fb = assess(&a, &b);
        assert_eq!(fb.agreement_level, 0.0);
        assert_eq!(fb.suggestions.len(), 1);
        assert!(fb.suggestions.contains_key("market_position"));
    }

    #[test]
    fn test_inconsistent_values_raise_concern() {
        let a = proposal("trend", json!({"engagement_rate": 0.05}), 0.8);
        let b = proposal("quality", json!({"engagement_rate": 0.09}), 0.2);
        let fb = assess(&a, &b);
        assert_eq!(fb.concerns.len(), 2);
        assert!(fb.concerns[0].contains("engagement_rate"));
        assert!(fb.concerns[1].contains("low confidence"));
        // zones agree fully, keys do not
        assert!((fb.agreement_level - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_apply_feedback_higher_agreement_wins() {
        let target = proposal("trend", json!({"engagement_rate": 0.05}), 0.5);
        let low = Feedback {
            from: "a".into(),
            to: "trend".into(),
            agreement_level: 0.7,
            concerns: vec![],
            suggestions: match json!({"best_time": "09:00"}) {
                Value::Object(m) => m,
                _ => unreachable!(),
            },
        };
        let high = Feedback {
            from: "b".into(),
            to: "trend".into(),
            agreement_level: 0.9,
            concerns: vec![],
            suggestions: match json!({"best_time": "18:00"}) {
                Value::Object(m) => m,
                _ => unreachable!(),
            },
        };
        let refined = apply_feedback(&target, &[&low, &high], 0.6);
        assert_eq!(refined.content["best_time"], json!("18:00"));
        assert_eq!(refined.version, 2);
        // 0.7 * 0.5 + 0.3 * 0.8
        assert!((refined.confidence - 0.59).abs() < 1e-9);
    }

    #[test]
    fn test_apply_feedback_ignores_low_agreement_suggestions() {
        let target = proposal("trend", json!({}), 0.5);
        let fb = Feedback {
            from: "a".into(),
            to: "trend".into(),
            agreement_level: 0.6,
            concerns: vec!["x".into(); 10],
            suggestions: match json!({"k": 1}) {
                Value::Object(m) => m,
                _ => unreachable!(),
            },
        };
        let refined = apply_feedback(&target, &[&fb], 0.6);
        assert!(!refined.content.contains_key("k"));
        // 0.35 + 0.18 - capped penalty 0.1
        assert!((refined.confidence - 0.43).abs() < 1e-9);
    }

    #[test]
    fn test_apply_feedback_without_peers_keeps_confidence() {
        let target = proposal("trend", json!({"a": 1}), 0.42);
        let refined = apply_feedback(&target, &[], 0.6);
        assert_eq!(refined.confidence, 0.42);
        assert_eq!(refined.version, 2);
    }

    #[test]
    fn test_jaccard() {
        let a: BTreeSet<String> = ["x", "y"].iter().map(|s| s.to_string()).collect();
        let b: BTreeSet<String> = ["y", "z"].iter().map(|s| s.to_string()).collect();
        assert!((jaccard(&a, &b) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(jaccard(&BTreeSet::new(), &BTreeSet::new()), 0.0);
    }
}
