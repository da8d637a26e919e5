//! Strategy consensus engine
//!
//! Composes the outputs of independent analysis producers (trend, competitor,
//! quality, fraud, performance, content strategy) into one conflict-free
//! consensus strategy.
//!
//! # Components
//!
//! - [`orchestrator`]: runs a cycle. Fraud pre-check, the producer pipeline
//!   with accretive context, negotiation, strategy post-check. Also routes
//!   inter-component messages.
//! - [`debate`]: fixed-round refinement of producer proposals and consensus
//!   synthesis.
//! - [`resolver`]: deterministic conflict resolution over recommendations.
//! - [`gate`]: fraud short-circuit, feasibility clamping and historical review
//!   flags.
//! - [`knowledge`]: per-domain shared knowledge store and its confidence model.
//! - [`messages`]: inter-component message envelopes.
//! - [`producer`]: the trait external analysis capabilities implement.
//!
//! # Usage
//!
//! ```ignore
//! let orchestrator = Orchestrator::new(EngineConfig::from_env())
//!     .with_producer(trend)
//!     .with_producer(strategy);
//! let report = orchestrator.coordinate_cycle(&raw_input).await;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod debate;
pub mod gate;
pub mod knowledge;
pub mod messages;
pub mod orchestrator;
pub mod producer;
pub mod resilience;
pub mod resolver;

pub use config::{ConfigError, ConfigResult, EngineConfig};
pub use debate::{
    ConsensusStrategy, DebateConfig, DebateCoordinator, DebateOutcome, DebateTranscript, Proposal,
};
pub use gate::{
    FraudSignal, GateConfig, GateVerdict, GroundTruth, HighRiskResult, ValidatedStrategy,
    ValidationGate, ValidationSubject,
};
pub use knowledge::{
    ConfidenceModel, KnowledgeStore, SharedKnowledgeEntry, SharedKnowledgeStore, StoreError,
};
pub use messages::{ComponentMessage, MessageError, MessagePayload, MessageReply, MessageResult};
pub use orchestrator::{CycleReport, CycleStatus, Orchestrator};
pub use producer::{
    Analysis, ContentMap, Producer, ProducerFailure, ProducerId, ProducerKind, SharedProducer,
};
pub use resilience::{DegradationLevel, DegradedResponse};
pub use resolver::{ConflictResolver, ConflictTables, Priority, Recommendation};
