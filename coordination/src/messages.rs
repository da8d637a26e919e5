//! Inter-component messages.
//!
//! Messages travel as JSON envelopes:
//!
//! ```text
//! { "id", "source", "target", "type", "data", "timestamp" }
//! ```
//!
//! `message_id` is accepted in place of `id`. Envelopes are validated before
//! dispatch; a missing routing field is an error returned to the sender, never
//! silently dropped. `type` + `data` decode into the closed [`MessagePayload`].

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::knowledge::{SharedKnowledgeEntry, StoreError};
use crate::producer::ContentMap;

/// Envelope fields every message must carry, in reporting order.
pub const REQUIRED_FIELDS: &[&str] = &["source", "target", "type", "data", "timestamp", "id"];

/// Message types understood by [`MessagePayload`].
pub const MESSAGE_TYPES: &[&str] = &["request_data", "update", "alert", "sync", "shared_data"];

/// Error type for message validation and delivery
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Message is not a JSON object")]
    NotAnObject,

    #[error("Missing required fields: {0:?}")]
    MissingFields(Vec<String>),

    #[error("Field {field} must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Malformed {kind} payload: {reason}")]
    MalformedPayload { kind: String, reason: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for message operations
pub type MessageResult<T> = Result<T, MessageError>;

/// Severity of an alert message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    #[default]
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Closed set of message kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessagePayload {
    /// Ask for the latest knowledge of a domain
    RequestData { domain: String },
    /// Publish new knowledge for a domain
    Update {
        domain: String,
        content: ContentMap,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
    },
    /// Notify of a condition worth logging
    Alert {
        #[serde(default)]
        severity: AlertSeverity,
        message: String,
    },
    /// Ask for a snapshot of some (empty = all) domains
    Sync {
        #[serde(default)]
        domains: Vec<String>,
    },
    /// Share validated data with every component
    SharedData {
        #[serde(alias = "type")]
        data_type: String,
        content: ContentMap,
    },
}

impl MessagePayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestData { .. } => "request_data",
            Self::Update { .. } => "update",
            Self::Alert { .. } => "alert",
            Self::Sync { .. } => "sync",
            Self::SharedData { .. } => "shared_data",
        }
    }
}

/// A validated inter-component message.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentMessage {
    pub id: String,
    pub source: String,
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub payload: MessagePayload,
}

impl ComponentMessage {
    /// New message with a fresh id and the current time.
    pub fn new(source: impl Into<String>, target: impl Into<String>, payload: MessagePayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.into(),
            target: target.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Validate and decode an envelope.
    pub fn parse(envelope: &Value) -> MessageResult<Self> {
        let obj = envelope.as_object().ok_or(MessageError::NotAnObject)?;

        let present = |field: &str| match field {
            "id" => ["id", "message_id"]
                .iter()
                .any(|k| obj.get(*k).is_some_and(|v| !v.is_null())),
            other => obj.get(other).is_some_and(|v| !v.is_null()),
        };
        let missing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|f| !present(**f))
            .map(|f| f.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(MessageError::MissingFields(missing));
        }

        let text = |field: &'static str| -> MessageResult<String> {
            obj.get(field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(MessageError::InvalidField {
                    field,
                    expected: "a string",
                })
        };
        let source = text("source")?;
        let target = text("target")?;
        let kind = text("type")?;
        let id = match obj.get("id").filter(|v| !v.is_null()) {
            Some(_) => text("id")?,
            None => text("message_id")?,
        };
        let timestamp = parse_timestamp(&text("timestamp")?)?;

        if !MESSAGE_TYPES.contains(&kind.as_str()) {
            return Err(MessageError::UnknownType(kind));
        }
        let payload: MessagePayload =
            serde_json::from_value(json!({"type": kind, "data": obj["data"]})).map_err(|e| {
                MessageError::MalformedPayload {
                    kind: kind.clone(),
                    reason: e.to_string(),
                }
            })?;

        Ok(Self {
            id,
            source,
            target,
            timestamp,
            payload,
        })
    }

    /// Render as a wire envelope.
    pub fn to_envelope(&self) -> Value {
        let mut envelope = match serde_json::to_value(&self.payload) {
            Ok(Value::Object(map)) => map,
            _ => ContentMap::new(),
        };
        envelope.insert("id".into(), json!(self.id));
        envelope.insert("source".into(), json!(self.source));
        envelope.insert("target".into(), json!(self.target));
        envelope.insert("timestamp".into(), json!(self.timestamp.to_rfc3339()));
        Value::Object(envelope)
    }
}

/// RFC3339, or a naive ISO-8601 date-time taken as UTC.
fn parse_timestamp(raw: &str) -> MessageResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|dt| dt.and_utc())
        .map_err(|_| MessageError::InvalidTimestamp(raw.to_string()))
}

/// Reply to a delivered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MessageReply {
    /// Latest entry of the requested domain, if any
    Data {
        domain: String,
        entry: Option<SharedKnowledgeEntry>,
    },
    /// Content stored under a domain
    Stored { domain: String },
    /// Alert logged
    Acknowledged { id: String },
    /// Requested domains that exist
    Snapshot {
        entries: BTreeMap<String, SharedKnowledgeEntry>,
    },
}
