//! End-to-end cycle tests with deterministic mock producers.
//!
//! Covers: fraud short-circuit, accretive context, knowledge publication,
//! partial failure, synthesis failure, strategy post-check and message
//! delivery, all through the public orchestrator surface.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use consensus_coordination::gate::GroundTruth;
use consensus_coordination::messages::{MessageError, MessageReply};
use consensus_coordination::producer::{Analysis, ContentMap, Producer, ProducerKind};
use consensus_coordination::{CycleStatus, EngineConfig, Orchestrator, ProducerFailure};

/// Mock producer recording every context it is given.
struct Recording {
    kind: ProducerKind,
    reply: Option<Value>,
    confidence: f64,
    calls: AtomicUsize,
    contexts: Mutex<Vec<ContentMap>>,
}

impl Recording {
    fn ok(kind: ProducerKind, reply: Value) -> Arc<Self> {
        Arc::new(Self {
            kind,
            reply: Some(reply),
            confidence: 0.8,
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        })
    }

    fn failing(kind: ProducerKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            reply: None,
            confidence: 0.0,
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_context(&self) -> ContentMap {
        self.contexts
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("producer was never called")
    }
}

#[async_trait]
impl Producer for Recording {
    fn kind(&self) -> ProducerKind {
        self.kind
    }

    async fn analyze(&self, context: &ContentMap) -> Analysis {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.clone());
        match &self.reply {
            Some(Value::Object(map)) => Analysis::new(map.clone(), self.confidence),
            _ => Analysis::failed(format!("{} model unavailable", self.kind)),
        }
    }
}

struct Pipeline {
    trend: Arc<Recording>,
    competitor: Arc<Recording>,
    quality: Arc<Recording>,
    performance: Arc<Recording>,
    strategy: Arc<Recording>,
}

impl Pipeline {
    fn healthy() -> Self {
        Self {
            trend: Recording::ok(
                ProducerKind::Trend,
                json!({
                    "trending_hashtags": ["#ai"],
                    "growth_velocity": 0.3,
                    "engagement_rates": {"reels": 0.06}
                }),
            ),
            competitor: Recording::ok(
                ProducerKind::Competitor,
                json!({
                    "competitors": ["@rival"],
                    "benchmarks": {"engagement_rate": 0.04},
                    "market_position": "challenger"
                }),
            ),
            quality: Recording::ok(
                ProducerKind::Quality,
                json!({
                    "quality_score": 0.8,
                    "audience_quality": 0.7,
                    "issues": ["low caption quality"]
                }),
            ),
            performance: Recording::ok(
                ProducerKind::Performance,
                json!({
                    "metrics": {"reach": 1500},
                    "best_posting_times": {"weekday": "18:00"},
                    "recommendations": [
                        {"category": "timing", "resources": ["evening_slot"], "priority": "high"}
                    ]
                }),
            ),
            strategy: Recording::ok(
                ProducerKind::ContentStrategy,
                json!({
                    "short_term_actions": ["post reels daily"],
                    "priority_metrics": {"engagement_rate": 0.9},
                    "recommendations": [
                        {"category": "timing", "resources": ["evening_slot", "morning_slot"]}
                    ]
                }),
            ),
        }
    }

    fn orchestrator(&self, config: EngineConfig) -> Orchestrator {
        Orchestrator::new(config)
            .with_producer(self.trend.clone())
            .with_producer(self.competitor.clone())
            .with_producer(self.quality.clone())
            .with_producer(self.performance.clone())
            .with_producer(self.strategy.clone())
    }

    fn total_calls(&self) -> usize {
        [
            &self.trend,
            &self.competitor,
            &self.quality,
            &self.performance,
            &self.strategy,
        ]
        .iter()
        .map(|p| p.calls())
        .sum()
    }
}

fn input(value: Value) -> ContentMap {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

// ── Fraud pre-check ────────────────────────────────────────────────

#[tokio::test]
async fn test_high_risk_input_short_circuits() {
    let pipeline = Pipeline::healthy();
    let fraud = Recording::ok(ProducerKind::Fraud, json!({"risk_score": 0.1}));
    let orchestrator = pipeline
        .orchestrator(EngineConfig::default())
        .with_producer(fraud.clone());

    let report = orchestrator
        .coordinate_cycle(&input(json!({"account": "@me", "risk_score": 0.85})))
        .await;

    assert_eq!(report.status, CycleStatus::HighRisk);
    let high_risk = report.high_risk.expect("high risk result");
    assert!(high_risk.clean_data_required);
    assert_eq!(high_risk.risk_score, 0.85);
    assert!(!high_risk.mitigation_steps.is_empty());
    assert!(report.strategy.is_none());
    assert!(report.transcript.is_none());
    assert_eq!(pipeline.total_calls(), 0);
    assert_eq!(fraud.calls(), 0);
    assert!(orchestrator.store().is_empty().expect("store readable"));
}

#[tokio::test]
async fn test_fraud_producer_consulted_without_raw_signal() {
    let pipeline = Pipeline::healthy();
    let fraud = Recording::ok(
        ProducerKind::Fraud,
        json!({"fraud_components": {"engagement": 1.0, "bots": 1.0, "fake_accounts": 0.9}}),
    );
    let orchestrator = pipeline
        .orchestrator(EngineConfig::default())
        .with_producer(fraud.clone());

    let report = orchestrator.coordinate_cycle(&input(json!({"account": "@me"}))).await;

    // 0.3 + 0.3 + 0.18 = 0.78
    assert_eq!(report.status, CycleStatus::HighRisk);
    assert_eq!(fraud.calls(), 1);
    assert_eq!(pipeline.total_calls(), 0);
    assert!(orchestrator.store().get("fraud").expect("store readable").is_some());
}

#[tokio::test]
async fn test_failed_fraud_producer_falls_back_to_input() {
    let pipeline = Pipeline::healthy();
    let orchestrator = pipeline
        .orchestrator(EngineConfig::default())
        .with_producer(Recording::failing(ProducerKind::Fraud));

    let report = orchestrator.coordinate_cycle(&ContentMap::new()).await;
    assert_eq!(report.status, CycleStatus::Degraded);
    assert_eq!(report.producer_failures.len(), 1);
    assert_eq!(report.producer_failures[0].producer(), "fraud");
    assert!(report.strategy.is_some());
}

// ── Pipeline ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_healthy_cycle_succeeds() -> anyhow::Result<()> {
    let pipeline = Pipeline::healthy();
    let orchestrator = pipeline.orchestrator(EngineConfig::default());

    let report = orchestrator
        .coordinate_cycle(&input(json!({"account": "@me"})))
        .await;
    assert_eq!(report.status, CycleStatus::Success, "{:?}", report.warnings);
    assert!(report.producer_failures.is_empty());

    let transcript = report.transcript.as_ref().expect("transcript");
    assert_eq!(transcript.round_count(), 3);
    for round in transcript.rounds() {
        assert_eq!(round.proposals.len(), 5);
    }

    let validated = report.strategy.as_ref().expect("strategy");
    assert_eq!(validated.strategy.recommendations.len(), 1);
    assert!(validated
        .strategy
        .short_term_actions
        .contains(&json!("post reels daily")));

    let domains = orchestrator.store().domains()?;
    assert_eq!(
        domains,
        vec!["competition", "performance", "quality", "strategy", "trends"]
    );
    let trends = orchestrator.store().get("trends")?.expect("trends entry");
    // all expected fields, no content timestamp
    assert!((trends.confidence - 1.0).abs() < 1e-9);

    let json = serde_json::to_value(&report)?;
    assert_eq!(json["status"], json!("success"));
    Ok(())
}

#[tokio::test]
async fn test_context_is_accretive() {
    let pipeline = Pipeline::healthy();
    let orchestrator = pipeline.orchestrator(EngineConfig::default());
    orchestrator
        .coordinate_cycle(&input(json!({"account": "@me"})))
        .await;

    let trend_ctx = pipeline.trend.last_context();
    assert_eq!(trend_ctx["account"], json!("@me"));
    assert!(!trend_ctx.contains_key("trend_context"));

    let quality_ctx = pipeline.quality.last_context();
    assert_eq!(quality_ctx["trend_context"]["growth_velocity"], json!(0.3));
    assert_eq!(
        quality_ctx["competitor_context"]["market_position"],
        json!("challenger")
    );
    assert!(!quality_ctx.contains_key("quality_context"));

    let strategy_ctx = pipeline.strategy.last_context();
    for key in [
        "trend_context",
        "competitor_context",
        "quality_context",
        "performance_context",
    ] {
        assert!(strategy_ctx.contains_key(key), "missing {}", key);
    }
    let knowledge = strategy_ctx["shared_knowledge"]
        .as_object()
        .expect("shared knowledge snapshot");
    assert_eq!(knowledge.len(), 4);
    assert!(knowledge.contains_key("performance"));
}

#[tokio::test]
async fn test_partial_failure_degrades() {
    let mut pipeline = Pipeline::healthy();
    pipeline.competitor = Recording::failing(ProducerKind::Competitor);
    let orchestrator = pipeline.orchestrator(EngineConfig::default());

    let report = orchestrator.coordinate_cycle(&ContentMap::new()).await;
    assert_eq!(report.status, CycleStatus::Degraded);
    assert!(matches!(
        &report.producer_failures[..],
        [ProducerFailure::Reported { producer, .. }] if producer == "competitor"
    ));

    // downstream producers still ran and saw an empty contribution
    let quality_ctx = pipeline.quality.last_context();
    assert_eq!(quality_ctx["competitor_context"], json!({}));
    let entry = orchestrator
        .store()
        .get("competition")
        .expect("store readable")
        .expect("published");
    assert!(entry.data.is_empty());
    assert_eq!(entry.confidence, 0.0);

    let transcript = report.transcript.expect("transcript");
    assert_eq!(transcript.initial_proposals().len(), 5);
}

#[tokio::test]
async fn test_synthesis_failure_is_error() {
    let mut pipeline = Pipeline::healthy();
    pipeline.strategy = Recording::failing(ProducerKind::ContentStrategy);
    let orchestrator = pipeline.orchestrator(EngineConfig::default());

    let report = orchestrator.coordinate_cycle(&ContentMap::new()).await;
    assert_eq!(report.status, CycleStatus::Error);
    assert!(report.error.expect("error message").contains("model unavailable"));
    assert!(report.strategy.is_none());
    assert_eq!(pipeline.performance.calls(), 1);
}

// ── Post-check ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_infeasible_metric_clamped_in_cycle() {
    let pipeline = Pipeline::healthy();
    let orchestrator = pipeline
        .orchestrator(EngineConfig::default())
        .with_ground_truth(
            GroundTruth::new().with_samples("engagement_rate", [0.02, 0.04, 0.06]),
        );

    let report = orchestrator.coordinate_cycle(&ContentMap::new()).await;
    let validated = report.strategy.expect("strategy");
    assert_eq!(validated.adjustments.len(), 1);
    assert_eq!(validated.adjustments[0].field, "priority_metrics.engagement_rate");
    assert_eq!(
        validated.strategy.priority_metrics["engagement_rate"],
        json!(0.06)
    );
    assert!(validated
        .confidence_scores
        .contains_key("priority_metrics.engagement_rate"));
}

#[tokio::test]
async fn test_history_flags_outlier_cycle() {
    let orchestrator = Pipeline::healthy().orchestrator(EngineConfig::default());
    let first = orchestrator.coordinate_cycle(&ContentMap::new()).await;
    assert!(!first.strategy.expect("strategy").needs_review());

    let outlier = Recording::ok(
        ProducerKind::ContentStrategy,
        json!({"priority_metrics": {"engagement_rate": 0.2}}),
    );
    let orchestrator = orchestrator.with_producer(outlier);
    let second = orchestrator.coordinate_cycle(&ContentMap::new()).await;
    let validated = second.strategy.expect("strategy");
    assert!(validated.needs_review());
    assert_eq!(orchestrator.gate().history_len(), 2);
}

// ── Messages ───────────────────────────────────────────────────────

fn envelope(kind: &str, data: Value) -> Value {
    json!({
        "id": format!("{}-1", kind),
        "source": "performance",
        "target": "orchestrator",
        "type": kind,
        "data": data,
        "timestamp": "2024-05-01T10:00:00Z"
    })
}

#[test]
fn test_deliver_routes_every_kind() {
    let orchestrator = Orchestrator::default();

    let stored = orchestrator
        .deliver(&envelope(
            "update",
            json!({"domain": "performance", "content": {"metrics": {}}, "confidence": 0.4}),
        ))
        .unwrap();
    assert_eq!(
        stored,
        MessageReply::Stored {
            domain: "performance".into()
        }
    );

    let shared = orchestrator
        .deliver(&envelope(
            "shared_data",
            json!({"type": "audience_insights", "content": {"top_city": "Lisbon"}}),
        ))
        .unwrap();
    assert_eq!(
        shared,
        MessageReply::Stored {
            domain: "audience_insights".into()
        }
    );

    match orchestrator
        .deliver(&envelope("request_data", json!({"domain": "performance"})))
        .unwrap()
    {
        MessageReply::Data { domain, entry } => {
            assert_eq!(domain, "performance");
            assert_eq!(entry.expect("entry").confidence, 0.4);
        }
        other => panic!("expected Data, got {:?}", other),
    }

    match orchestrator
        .deliver(&envelope("sync", json!({"domains": ["audience_insights", "fraud"]})))
        .unwrap()
    {
        MessageReply::Snapshot { entries } => {
            assert_eq!(entries.len(), 1);
            assert!(entries.contains_key("audience_insights"));
        }
        other => panic!("expected Snapshot, got {:?}", other),
    }

    match orchestrator.deliver(&envelope("sync", json!({}))).unwrap() {
        MessageReply::Snapshot { entries } => assert_eq!(entries.len(), 2),
        other => panic!("expected Snapshot, got {:?}", other),
    }

    let ack = orchestrator
        .deliver(&envelope("alert", json!({"message": "posting gap"})))
        .unwrap();
    assert_eq!(ack, MessageReply::Acknowledged { id: "alert-1".into() });
}

#[test]
fn test_deliver_rejects_invalid_envelopes() {
    let orchestrator = Orchestrator::default();

    let mut missing = envelope("request_data", json!({"domain": "trends"}));
    missing.as_object_mut().unwrap().remove("source");
    assert!(matches!(
        orchestrator.deliver(&missing),
        Err(MessageError::MissingFields(fields)) if fields == vec!["source".to_string()]
    ));

    assert!(matches!(
        orchestrator.deliver(&envelope("gossip", json!({}))),
        Err(MessageError::UnknownType(_))
    ));
    assert!(orchestrator.store().is_empty().expect("store readable"));
}

#[tokio::test]
async fn test_cycle_publications_visible_to_messages() {
    let orchestrator = Pipeline::healthy().orchestrator(EngineConfig::default());
    orchestrator.coordinate_cycle(&ContentMap::new()).await;

    match orchestrator
        .deliver(&envelope("request_data", json!({"domain": "quality"})))
        .unwrap()
    {
        MessageReply::Data { entry, .. } => {
            let entry = entry.expect("quality entry");
            assert_eq!(entry.source, "quality");
            assert_eq!(entry.data["quality_score"], json!(0.8));
        }
        other => panic!("expected Data, got {:?}", other),
    }
}

#[tokio::test]
async fn test_store_handle_shared_between_orchestrators() {
    let store = consensus_coordination::KnowledgeStore::new().shared();
    let producer_side = Pipeline::healthy()
        .orchestrator(EngineConfig::default())
        .with_store(store.clone());
    let router = Orchestrator::default().with_store(store.clone());

    let report = producer_side.coordinate_cycle(&ContentMap::new()).await;
    assert!(report.is_success());

    match router
        .deliver(&envelope("sync", json!({"domains": ["strategy"]})))
        .unwrap()
    {
        MessageReply::Snapshot { entries } => {
            assert_eq!(entries["strategy"].source, "content_strategy");
        }
        other => panic!("expected Snapshot, got {:?}", other),
    }
    assert_eq!(store.len().expect("store readable"), 5);
}
