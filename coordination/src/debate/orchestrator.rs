//! Debate coordinator: collect, refine for a fixed number of rounds, synthesize.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::consensus::{synthesize, ConsensusStrategy};
use super::critique::{apply_feedback, assess, Feedback};
use super::proposal::Proposal;
use super::state::{DebateTranscript, ProposalConflict, RoundRecord};
use crate::producer::{invoke, ContentMap, SharedProducer};
use crate::resolver::{ConflictResolver, Recommendation};

pub const DEFAULT_ROUNDS: u32 = 3;
pub const DEFAULT_SUGGESTION_THRESHOLD: f64 = 0.6;
pub const DEFAULT_KEY_AGREEMENT_THRESHOLD: f64 = 0.8;
pub const DEFAULT_PRODUCER_TIMEOUT_MS: u64 = 30_000;

/// Configuration for the debate coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateConfig {
    /// Refinement rounds. Always run in full.
    pub rounds: u32,
    /// Peer agreement above which suggestions are merged.
    pub suggestion_threshold: f64,
    /// Peer agreement above which a pair is reported as a key agreement.
    pub key_agreement_threshold: f64,
    /// Upper bound on each producer call during collection.
    pub producer_timeout_ms: u64,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_ROUNDS,
            suggestion_threshold: DEFAULT_SUGGESTION_THRESHOLD,
            key_agreement_threshold: DEFAULT_KEY_AGREEMENT_THRESHOLD,
            producer_timeout_ms: DEFAULT_PRODUCER_TIMEOUT_MS,
        }
    }
}

impl DebateConfig {
    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds;
        self
    }

    pub fn producer_timeout(&self) -> Duration {
        Duration::from_millis(self.producer_timeout_ms)
    }
}

/// Outcome of a completed negotiation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateOutcome {
    pub strategy: ConsensusStrategy,
    pub transcript: DebateTranscript,
}

impl DebateOutcome {
    /// Compact summary line.
    pub fn summary_line(&self) -> String {
        format!(
            "[{}] {} rounds | {} producers | {} recommendations | consensus={:.2}",
            if self.strategy.degraded { "DEGRADED" } else { "OK" },
            self.transcript.round_count(),
            self.transcript.final_proposals().len(),
            self.strategy.recommendations.len(),
            self.strategy.summary.consensus_level,
        )
    }
}

/// Drives the fixed-round refinement protocol.
#[derive(Debug, Clone, Default)]
pub struct DebateCoordinator {
    config: DebateConfig,
    resolver: ConflictResolver,
}

impl DebateCoordinator {
    pub fn new(config: DebateConfig, resolver: ConflictResolver) -> Self {
        Self { config, resolver }
    }

    pub fn config(&self) -> &DebateConfig {
        &self.config
    }

    /// Collect initial proposals from producers and negotiate them.
    pub async fn negotiate(
        &self,
        producers: &[SharedProducer],
        context: &ContentMap,
    ) -> DebateOutcome {
        let proposals = self.collect(producers, context).await;
        self.negotiate_proposals(proposals)
    }

    /// Call every producer once, concurrently, keeping declaration order.
    ///
    /// Failed or timed-out producers contribute an empty proposal.
    pub async fn collect(
        &self,
        producers: &[SharedProducer],
        context: &ContentMap,
    ) -> Vec<Proposal> {
        let timeout = self.config.producer_timeout();
        let calls = producers.iter().map(|producer| async move {
            let id = producer.id();
            match invoke(producer.as_ref(), context, timeout).await {
                Ok(analysis) => Proposal::new(id, analysis.content, analysis.confidence),
                Err(failure) => {
                    warn!(producer = %id, error = %failure, "Producer failed, contributing empty proposal");
                    Proposal::empty(id)
                }
            }
        });
        join_all(calls).await
    }

    /// Run the refinement rounds over given proposals and synthesize.
    pub fn negotiate_proposals(&self, proposals: Vec<Proposal>) -> DebateOutcome {
        let proposals = dedupe_by_producer(proposals);
        info!(
            producers = proposals.len(),
            rounds = self.config.rounds,
            "Starting negotiation"
        );

        let mut transcript = DebateTranscript::new(proposals.clone());
        let mut current = proposals;
        for round in 1..=self.config.rounds {
            let record = self.run_round(round, &current);
            current = record.proposals.clone();
            transcript.record_round(record);
        }

        let strategy = synthesize(
            &transcript,
            &self.resolver,
            self.config.key_agreement_threshold,
        );
        let outcome = DebateOutcome {
            strategy,
            transcript,
        };
        info!(summary = %outcome.summary_line(), "Negotiation complete");
        outcome
    }

    /// One round: every proposal is critiqued by every other proposal of the
    /// round-start snapshot, then refined.
    fn run_round(&self, round: u32, current: &[Proposal]) -> RoundRecord {
        let started_at = Utc::now();
        let start = Instant::now();

        let mut feedback: Vec<Feedback> = Vec::new();
        for (i, target) in current.iter().enumerate() {
            for (j, peer) in current.iter().enumerate() {
                if i != j {
                    feedback.push(assess(target, peer));
                }
            }
        }

        let refined: Vec<Proposal> = current
            .iter()
            .map(|target| {
                let received: Vec<&Feedback> = feedback
                    .iter()
                    .filter(|f| f.to == target.producer_id)
                    .collect();
                apply_feedback(target, &received, self.config.suggestion_threshold)
            })
            .collect();

        let conflicts = self.proposal_conflicts(&refined);
        debug!(
            round,
            proposals = refined.len(),
            feedback = feedback.len(),
            conflicts = conflicts.len(),
            "Round complete"
        );

        RoundRecord {
            round,
            proposals: refined,
            feedback,
            conflicts,
            duration_ms: start.elapsed().as_millis() as u64,
            started_at,
        }
    }

    /// Conflicts among the recommendations carried by `proposals`.
    pub fn proposal_conflicts(&self, proposals: &[Proposal]) -> Vec<ProposalConflict> {
        let mut owners = Vec::new();
        let mut recs: Vec<Recommendation> = Vec::new();
        for proposal in proposals {
            for rec in proposal.recommendations() {
                owners.push(proposal.producer_id.clone());
                recs.push(rec);
            }
        }

        self.resolver
            .detect_conflicts(&recs)
            .into_iter()
            .map(|c| ProposalConflict {
                first: owners[c.first].clone(),
                second: owners[c.second].clone(),
                category: recs[c.first].category.clone(),
                kind: c.kind,
            })
            .collect()
    }
}

/// Keep the first proposal of each producer.
fn dedupe_by_producer(proposals: Vec<Proposal>) -> Vec<Proposal> {
    let mut seen = BTreeSet::new();
    proposals
        .into_iter()
        .filter(|p| {
            let fresh = seen.insert(p.producer_id.clone());
            if !fresh {
                warn!(producer = %p.producer_id, "Dropping duplicate proposal");
            }
            fresh
        })
        .collect()
}
