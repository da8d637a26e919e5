//! Producer interface for the external analysis capabilities the engine composes.
//!
//! Producers (trend, competitor, quality, fraud, performance, content strategy)
//! wrap model inference that lives outside this crate. The engine only sees
//! the narrow [`Producer`] trait: given an enriched context map, return an
//! [`Analysis`]. Producers must be total: failures are reported in
//! [`Analysis::error`] rather than by panicking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Opaque key→value content exchanged between producers and the engine.
pub type ContentMap = Map<String, Value>;

/// Identifier of a producer within one cycle.
pub type ProducerId = String;

/// Shared handle to a producer.
pub type SharedProducer = Arc<dyn Producer>;

/// Kind of analysis a producer performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerKind {
    /// Hashtag and topic trend forecasting
    Trend,
    /// Competitor benchmarking
    Competitor,
    /// Content and audience quality control
    Quality,
    /// Engagement fraud and bot detection
    Fraud,
    /// Posting performance optimization
    Performance,
    /// Final content-strategy synthesis
    ContentStrategy,
}

impl ProducerKind {
    pub const ALL: [ProducerKind; 6] = [
        ProducerKind::Trend,
        ProducerKind::Competitor,
        ProducerKind::Quality,
        ProducerKind::Fraud,
        ProducerKind::Performance,
        ProducerKind::ContentStrategy,
    ];

    /// Kind publishing under `domain`, if any.
    pub fn from_domain(domain: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.domain() == domain)
    }

    /// Canonical execution order of the orchestrated pipeline.
    ///
    /// Fraud is not part of the pipeline; it feeds the validation gate.
    pub fn pipeline() -> &'static [ProducerKind] {
        &[
            ProducerKind::Trend,
            ProducerKind::Competitor,
            ProducerKind::Quality,
            ProducerKind::Performance,
            ProducerKind::ContentStrategy,
        ]
    }

    /// Domain name under which results are published to the knowledge store.
    pub fn domain(&self) -> &'static str {
        match self {
            ProducerKind::Trend => "trends",
            ProducerKind::Competitor => "competition",
            ProducerKind::Quality => "quality",
            ProducerKind::Fraud => "fraud",
            ProducerKind::Performance => "performance",
            ProducerKind::ContentStrategy => "strategy",
        }
    }

    /// Context key under which downstream producers see this producer's output.
    pub fn context_key(&self) -> &'static str {
        match self {
            ProducerKind::Trend => "trend_context",
            ProducerKind::Competitor => "competitor_context",
            ProducerKind::Quality => "quality_context",
            ProducerKind::Fraud => "fraud_context",
            ProducerKind::Performance => "performance_context",
            ProducerKind::ContentStrategy => "strategy_context",
        }
    }

    /// Fields a complete analysis of this kind is expected to carry.
    pub fn expected_fields(&self) -> &'static [&'static str] {
        match self {
            ProducerKind::Trend => &["trending_hashtags", "growth_velocity", "engagement_rates"],
            ProducerKind::Competitor => &["competitors", "benchmarks", "market_position"],
            ProducerKind::Quality => &["quality_score", "audience_quality", "issues"],
            ProducerKind::Fraud => &["risk_score", "fraud_components"],
            ProducerKind::Performance => &["metrics", "best_posting_times", "recommendations"],
            ProducerKind::ContentStrategy => &[
                "short_term_actions",
                "priority_metrics",
                "recommendations",
            ],
        }
    }
}

impl std::fmt::Display for ProducerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProducerKind::Trend => write!(f, "trend"),
            ProducerKind::Competitor => write!(f, "competitor"),
            ProducerKind::Quality => write!(f, "quality"),
            ProducerKind::Fraud => write!(f, "fraud"),
            ProducerKind::Performance => write!(f, "performance"),
            ProducerKind::ContentStrategy => write!(f, "content_strategy"),
        }
    }
}

/// Result of one producer invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Producer-specific content
    #[serde(default)]
    pub content: ContentMap,
    /// Self-reported confidence (clamped to 0.0–1.0 on use)
    #[serde(default)]
    pub confidence: f64,
    /// Set when the producer could not complete its analysis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Analysis {
    /// Successful analysis.
    pub fn new(content: ContentMap, confidence: f64) -> Self {
        Self {
            content,
            confidence: confidence.clamp(0.0, 1.0),
            error: None,
        }
    }

    /// Failed analysis with an error message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            content: ContentMap::new(),
            confidence: 0.0,
            error: Some(message.into()),
        }
    }

    /// Empty stand-in used when a producer's contribution is unavailable.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// An external analysis capability.
#[async_trait]
pub trait Producer: Send + Sync {
    /// What this producer analyzes
    fn kind(&self) -> ProducerKind;

    /// Identifier used in proposals and transcripts
    fn id(&self) -> ProducerId {
        self.kind().to_string()
    }

    /// Analyze the given context. Must not panic; report failures in `error`.
    async fn analyze(&self, context: &ContentMap) -> Analysis;
}

/// Why a producer's contribution was replaced with empty content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProducerFailure {
    #[error("producer {producer} reported an error: {message}")]
    Reported { producer: ProducerId, message: String },

    #[error("producer {producer} timed out after {timeout_ms}ms")]
    TimedOut { producer: ProducerId, timeout_ms: u64 },
}

impl ProducerFailure {
    /// The producer this failure belongs to.
    pub fn producer(&self) -> &str {
        match self {
            ProducerFailure::Reported { producer, .. } => producer,
            ProducerFailure::TimedOut { producer, .. } => producer,
        }
    }
}

/// Invoke a producer with a bounded wait.
///
/// A timeout or a reported error both surface as [`ProducerFailure`].
pub async fn invoke(
    producer: &dyn Producer,
    context: &ContentMap,
    timeout: Duration,
) -> Result<Analysis, ProducerFailure> {
    let id = producer.id();
    let start = Instant::now();

    let analysis = match tokio::time::timeout(timeout, producer.analyze(context)).await {
        Ok(analysis) => analysis,
        Err(_) => {
            warn!(producer = %id, timeout_ms = timeout.as_millis() as u64, "Producer timed out");
            return Err(ProducerFailure::TimedOut {
                producer: id,
                timeout_ms: timeout.as_millis() as u64,
            });
        }
    };

    if let Some(message) = analysis.error {
        warn!(producer = %id, error = %message, "Producer reported an error");
        return Err(ProducerFailure::Reported {
            producer: id,
            message,
        });
    }

    debug!(
        producer = %id,
        keys = analysis.content.len(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Producer completed"
    );

    Ok(Analysis {
        confidence: analysis.confidence.clamp(0.0, 1.0),
        ..analysis
    })
}
