//! Debate transcript: append-only round history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::critique::Feedback;
use super::proposal::Proposal;
use crate::producer::ProducerId;
use crate::resolver::ConflictKind;

/// A conflict between recommendations of two proposals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalConflict {
    pub first: ProducerId,
    pub second: ProducerId,
    pub category: String,
    pub kind: ConflictKind,
}

/// Record of a single refinement round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Round number (1-indexed).
    pub round: u32,
    /// Proposal set at the end of the round, one per producer.
    pub proposals: Vec<Proposal>,
    /// Feedback exchanged during the round.
    pub feedback: Vec<Feedback>,
    /// Conflicts among the round's recommendations.
    pub conflicts: Vec<ProposalConflict>,
    /// Round duration in milliseconds.
    pub duration_ms: u64,
    /// When this round started.
    pub started_at: DateTime<Utc>,
}

/// Full history of one negotiation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateTranscript {
    pub session_id: String,
    /// Proposals as collected, before any refinement.
    initial: Vec<Proposal>,
    rounds: Vec<RoundRecord>,
    pub started_at: DateTime<Utc>,
}

impl DebateTranscript {
    pub fn new(initial: Vec<Proposal>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            initial,
            rounds: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Append a round. Round numbers are assigned in order.
    pub fn record_round(&mut self, mut record: RoundRecord) {
        record.round = self.rounds.len() as u32 + 1;
        self.rounds.push(record);
    }

    pub fn initial_proposals(&self) -> &[Proposal] {
        &self.initial
    }

    pub fn rounds(&self) -> &[RoundRecord] {
        &self.rounds
    }

    pub fn round_count(&self) -> u32 {
        self.rounds.len() as u32
    }

    pub fn last_round(&self) -> Option<&RoundRecord> {
        self.rounds.last()
    }

    /// Proposals after the last round, or the initial set when no round ran.
    pub fn final_proposals(&self) -> &[Proposal] {
        self.rounds
            .last()
            .map(|r| r.proposals.as_slice())
            .unwrap_or(self.initial.as_slice())
    }

    /// Every feedback item across all rounds.
    pub fn all_feedback(&self) -> impl Iterator<Item = &Feedback> {
        self.rounds.iter().flat_map(|r| r.feedback.iter())
    }
}
