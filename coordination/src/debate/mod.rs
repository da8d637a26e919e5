//! Debate: fixed-round negotiation between producer proposals.
//!
//! # Flow
//!
//! ```text
//! producers ──collect──▶ proposals v1
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │ round r (r = 1..=R)        │
//!              │   critique: all ordered    │
//!              │     pairs of the snapshot  │
//!              │   refine: merge accepted   │
//!              │     suggestions, rescore   │
//!              │   record round + conflicts │
//!              └─────────────┬─────────────┘
//!                            ▼
//!                synthesize ─▶ ConsensusStrategy
//! ```
//!
//! No early exit: every negotiation runs exactly R rounds, and every round
//! holds exactly one proposal per producer.

pub mod consensus;
pub mod critique;
pub mod orchestrator;
pub mod proposal;
pub mod state;

pub use consensus::{synthesize, Bucket, ConsensusStrategy, DebateSummary, KeyAgreement};
pub use critique::{apply_feedback, assess, jaccard, values_consistent, Feedback};
pub use orchestrator::{DebateConfig, DebateCoordinator, DebateOutcome};
pub use proposal::{derive_priority, extract_impact_zones, Proposal};
pub use state::{DebateTranscript, ProposalConflict, RoundRecord};
