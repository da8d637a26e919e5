//! Cycle orchestration and message routing.
//!
//! # Cycle
//!
//! ```text
//! raw input
//!   → fraud pre-check ──risk > threshold──▶ high_risk (no producer runs)
//!   → trend → competitor → quality → performance → content strategy
//!       each sees raw input + every earlier `<kind>_context`
//!       each result is published under its domain
//!   → negotiation over the pipeline results
//!   → strategy post-check
//! ```
//!
//! A failed producer contributes empty content and the cycle goes on. Only
//! the content-strategy producer is required: without it the cycle ends in
//! an error report.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::debate::{DebateCoordinator, DebateTranscript, Proposal};
use crate::gate::{
    FraudSignal, GateVerdict, GroundTruth, HighRiskResult, ValidatedStrategy, ValidationGate,
    ValidationSubject,
};
use crate::knowledge::{ConfidenceModel, KnowledgeStore, SharedKnowledgeEntry, SharedKnowledgeStore};
use crate::messages::{AlertSeverity, ComponentMessage, MessagePayload, MessageReply, MessageResult};
use crate::producer::{
    invoke, Analysis, ContentMap, ProducerFailure, ProducerKind, SharedProducer,
};
use crate::resolver::ConflictResolver;

/// Content keys that carry a fraud signal in the raw input.
const RAW_FRAUD_KEYS: &[&str] = &["risk_score", "fraud_components"];

/// Outcome class of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Success,
    HighRisk,
    Error,
    Degraded,
}

impl std::fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::HighRisk => write!(f, "high_risk"),
            Self::Error => write!(f, "error"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

/// Everything a cycle produced. Every cycle returns one, whatever happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub status: CycleStatus,
    pub strategy: Option<ValidatedStrategy>,
    pub transcript: Option<DebateTranscript>,
    pub high_risk: Option<HighRiskResult>,
    pub producer_failures: Vec<ProducerFailure>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl CycleReport {
    fn new(cycle_id: String, status: CycleStatus) -> Self {
        Self {
            cycle_id,
            status,
            strategy: None,
            transcript: None,
            high_risk: None,
            producer_failures: Vec::new(),
            warnings: Vec::new(),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CycleStatus::Success
    }
}

/// Sequences producers, owns the knowledge store handle and routes messages.
pub struct Orchestrator {
    config: EngineConfig,
    producers: BTreeMap<ProducerKind, SharedProducer>,
    store: SharedKnowledgeStore,
    debate: DebateCoordinator,
    gate: ValidationGate,
    confidence: ConfidenceModel,
    ground_truth: GroundTruth,
    cycle_lock: Mutex<()>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Orchestrator {
    pub fn new(config: EngineConfig) -> Self {
        let debate = DebateCoordinator::new(
            config.debate.clone(),
            ConflictResolver::new(config.conflicts.clone()),
        );
        let gate = ValidationGate::new(config.gate.clone());
        let confidence = config.knowledge;
        Self {
            config,
            producers: BTreeMap::new(),
            store: KnowledgeStore::new().shared(),
            debate,
            gate,
            confidence,
            ground_truth: GroundTruth::new(),
            cycle_lock: Mutex::new(()),
        }
    }

    /// Register a producer under its kind, replacing any earlier one.
    pub fn with_producer(mut self, producer: SharedProducer) -> Self {
        let kind = producer.kind();
        if self.producers.insert(kind, producer).is_some() {
            warn!(kind = %kind, "Replacing registered producer");
        }
        self
    }

    /// Use an existing store handle.
    pub fn with_store(mut self, store: SharedKnowledgeStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_ground_truth(mut self, ground_truth: GroundTruth) -> Self {
        self.ground_truth = ground_truth;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> SharedKnowledgeStore {
        self.store.clone()
    }

    pub fn gate(&self) -> &ValidationGate {
        &self.gate
    }

    /// Run one full cycle over `raw_input`. Cycles never overlap.
    pub async fn coordinate_cycle(&self, raw_input: &ContentMap) -> CycleReport {
        let _cycle = self.cycle_lock.lock().await;
        let start = Instant::now();
        let cycle_id = uuid::Uuid::new_v4().to_string();
        info!(
            cycle_id = %cycle_id,
            producers = self.producers.len(),
            "Starting coordination cycle"
        );

        let mut report = self.run_cycle(cycle_id, raw_input).await;
        report.duration_ms = start.elapsed().as_millis() as u64;

        match report.status {
            CycleStatus::Error => error!(
                cycle_id = %report.cycle_id,
                error = report.error.as_deref().unwrap_or_default(),
                "Cycle failed"
            ),
            status => info!(
                cycle_id = %report.cycle_id,
                status = %status,
                failures = report.producer_failures.len(),
                duration_ms = report.duration_ms,
                "Cycle complete"
            ),
        }
        report
    }

    async fn run_cycle(&self, cycle_id: String, raw_input: &ContentMap) -> CycleReport {
        let mut failures = Vec::new();
        let mut warnings = Vec::new();

        let signal = self.fraud_signal(raw_input, &mut failures, &mut warnings).await;
        let fraud_flags = match self.gate.validate(
            ValidationSubject::RawInput(raw_input),
            &signal,
            &self.ground_truth,
        ) {
            GateVerdict::HighRisk(result) => {
                let mut report = CycleReport::new(cycle_id, CycleStatus::HighRisk);
                report.high_risk = Some(result);
                report.producer_failures = failures;
                report.warnings = warnings;
                return report;
            }
            GateVerdict::Cleared { fraud_flags } => fraud_flags,
            GateVerdict::Validated(_) => Vec::new(),
        };

        let mut context = raw_input.clone();
        if !fraud_flags.is_empty() {
            info!(flags = ?fraud_flags, "Input flagged for elevated fraud components");
            context.insert("fraud_flags".into(), json!(fraud_flags));
        }

        let timeout = self.config.producer_timeout();
        let mut proposals = Vec::new();
        for kind in ProducerKind::pipeline() {
            let Some(producer) = self.producers.get(kind) else {
                if *kind == ProducerKind::ContentStrategy {
                    return self.failure_report(
                        cycle_id,
                        "no content strategy producer registered".to_string(),
                        failures,
                        warnings,
                    );
                }
                warn!(kind = %kind, "No producer registered, skipping");
                warnings.push(format!("no {} producer registered", kind));
                continue;
            };

            let mut call_context = context.clone();
            if *kind == ProducerKind::ContentStrategy {
                match self.store.to_content() {
                    Ok(snapshot) => {
                        call_context.insert("shared_knowledge".into(), Value::Object(snapshot));
                    }
                    Err(e) => {
                        warn!(error = %e, "Knowledge snapshot unavailable");
                        warnings.push(format!("knowledge snapshot unavailable: {}", e));
                        call_context.insert("shared_knowledge".into(), json!({}));
                    }
                }
            }

            let analysis = match invoke(producer.as_ref(), &call_context, timeout).await {
                Ok(analysis) => analysis,
                Err(failure) if *kind == ProducerKind::ContentStrategy => {
                    let message = failure.to_string();
                    failures.push(failure);
                    return self.failure_report(cycle_id, message, failures, warnings);
                }
                Err(failure) => {
                    failures.push(failure);
                    Analysis::empty()
                }
            };

            if let Err(e) = self.publish_analysis(*kind, &producer.id(), &analysis) {
                warn!(kind = %kind, error = %e, "Failed to publish analysis");
                warnings.push(format!("{} not published: {}", kind.domain(), e));
            }

            // producer output replaces any same-named key from the raw input
            let shadowed = context.insert(
                kind.context_key().to_string(),
                Value::Object(analysis.content.clone()),
            );
            if shadowed.is_some() {
                warn!(
                    kind = %kind,
                    key = kind.context_key(),
                    "Raw input key replaced by producer output"
                );
            }
            proposals.push(Proposal::new(
                producer.id(),
                analysis.content,
                analysis.confidence,
            ));
        }

        let outcome = self.debate.negotiate_proposals(proposals);
        let degraded_resolution = outcome.strategy.degraded;
        if degraded_resolution {
            warnings.push("recommendations passed through unresolved".to_string());
        }
        let validated = self
            .gate
            .post_check(outcome.strategy, &self.ground_truth);

        let status = if failures.is_empty() && warnings.is_empty() {
            CycleStatus::Success
        } else {
            CycleStatus::Degraded
        };
        let mut report = CycleReport::new(cycle_id, status);
        report.strategy = Some(validated);
        report.transcript = Some(outcome.transcript);
        report.producer_failures = failures;
        report.warnings = warnings;
        report
    }

    /// Fraud signal for the pre-check.
    ///
    /// A signal carried by the raw input is used as is. Otherwise the fraud
    /// producer is consulted; its failure falls back to an empty signal.
    async fn fraud_signal(
        &self,
        raw_input: &ContentMap,
        failures: &mut Vec<ProducerFailure>,
        warnings: &mut Vec<String>,
    ) -> FraudSignal {
        let raw = FraudSignal::from_content(raw_input);
        if RAW_FRAUD_KEYS.iter().any(|k| raw_input.contains_key(*k)) {
            return raw;
        }
        let Some(producer) = self.producers.get(&ProducerKind::Fraud) else {
            return raw;
        };

        match invoke(producer.as_ref(), raw_input, self.config.producer_timeout()).await {
            Ok(analysis) => {
                if let Err(e) = self.publish_analysis(ProducerKind::Fraud, &producer.id(), &analysis) {
                    warn!(error = %e, "Failed to publish fraud analysis");
                    warnings.push(format!("fraud not published: {}", e));
                }
                FraudSignal::from_analysis(&analysis)
            }
            Err(failure) => {
                failures.push(failure);
                raw
            }
        }
    }

    /// Publish under the kind's domain. Empty content is published with zero
    /// confidence.
    fn publish_analysis(
        &self,
        kind: ProducerKind,
        source: &str,
        analysis: &Analysis,
    ) -> crate::knowledge::StoreResult<()> {
        let confidence = if analysis.content.is_empty() {
            0.0
        } else {
            self.confidence
                .score(kind.expected_fields(), &analysis.content, Utc::now())
        };
        self.store.publish(
            kind.domain(),
            SharedKnowledgeEntry::new(source, analysis.content.clone(), confidence),
        )
    }

    fn failure_report(
        &self,
        cycle_id: String,
        message: String,
        failures: Vec<ProducerFailure>,
        warnings: Vec<String>,
    ) -> CycleReport {
        let mut report = CycleReport::new(cycle_id, CycleStatus::Error);
        report.error = Some(message);
        report.producer_failures = failures;
        report.warnings = warnings;
        report
    }

    /// Validate and dispatch an inter-component message.
    pub fn deliver(&self, envelope: &Value) -> MessageResult<MessageReply> {
        let message = ComponentMessage::parse(envelope)?;
        debug!(
            id = %message.id,
            source = %message.source,
            target = %message.target,
            kind = message.payload.kind(),
            "Delivering message"
        );

        match message.payload {
            MessagePayload::RequestData { domain } => Ok(MessageReply::Data {
                entry: self.store.get(&domain)?,
                domain,
            }),
            MessagePayload::Update {
                domain,
                content,
                confidence,
            } => {
                let confidence = confidence.unwrap_or_else(|| self.domain_confidence(&domain, &content));
                self.store.publish(
                    &domain,
                    SharedKnowledgeEntry::new(message.source, content, confidence),
                )?;
                Ok(MessageReply::Stored { domain })
            }
            MessagePayload::SharedData { data_type, content } => {
                let confidence = self.domain_confidence(&data_type, &content);
                self.store.publish(
                    &data_type,
                    SharedKnowledgeEntry::new(message.source, content, confidence),
                )?;
                Ok(MessageReply::Stored { domain: data_type })
            }
            MessagePayload::Alert { severity, message: text } => {
                match severity {
                    AlertSeverity::Critical => {
                        error!(source = %message.source, alert = %text, "Critical alert")
                    }
                    AlertSeverity::Warning => {
                        warn!(source = %message.source, alert = %text, "Alert")
                    }
                    AlertSeverity::Info => {
                        info!(source = %message.source, alert = %text, "Alert")
                    }
                }
                Ok(MessageReply::Acknowledged { id: message.id })
            }
            MessagePayload::Sync { domains } => {
                let entries = if domains.is_empty() {
                    self.store.snapshot()?
                } else {
                    self.store.snapshot_domains(&domains)?
                };
                Ok(MessageReply::Snapshot { entries })
            }
        }
    }

    fn domain_confidence(&self, domain: &str, content: &ContentMap) -> f64 {
        let expected = ProducerKind::from_domain(domain)
            .map(|k| k.expected_fields())
            .unwrap_or_default();
        self.confidence.score(expected, content, Utc::now())
    }
}
