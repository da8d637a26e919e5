//! Resilience: degraded results instead of hard failures.
//!
//! Components that must never fail the pipeline, such as the conflict
//! resolver, wrap their output in a [`DegradedResponse`]. When the
//! primary computation cannot complete, the payload carries a best-effort
//! pass-through and the level records that it was not computed normally.
//!
//! ```text
//! resolve(recs)
//!   ├─ computation succeeds → DegradedResponse { level: Full, payload: resolved }
//!   └─ internal failure     → DegradedResponse { level: PassThrough, payload: input, warnings }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the payload of a [`DegradedResponse`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    /// Primary computation succeeded.
    Full,
    /// Primary computation failed; the input was passed through unchanged.
    PassThrough,
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::PassThrough => write!(f, "pass_through"),
        }
    }
}

/// A component result wrapped with degradation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradedResponse<T> {
    /// The actual payload.
    pub payload: T,
    /// Current degradation level.
    pub level: DegradationLevel,
    /// Which component produced this response.
    pub served_by: String,
    /// Diagnostics for the consumer.
    pub warnings: Vec<String>,
    /// When this response was produced.
    pub timestamp: DateTime<Utc>,
}

impl<T> DegradedResponse<T> {
    /// Response from a successful primary computation.
    pub fn full(payload: T, served_by: &str) -> Self {
        Self {
            payload,
            level: DegradationLevel::Full,
            served_by: served_by.to_string(),
            warnings: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Pass-through response after an internal failure.
    pub fn pass_through(payload: T, served_by: &str, warning: impl Into<String>) -> Self {
        Self {
            payload,
            level: DegradationLevel::PassThrough,
            served_by: served_by.to_string(),
            warnings: vec![warning.into()],
            timestamp: Utc::now(),
        }
    }

    /// Whether any degradation has occurred.
    pub fn is_degraded(&self) -> bool {
        self.level != DegradationLevel::Full
    }

    /// Unwrap into the payload, discarding metadata.
    pub fn into_payload(self) -> T {
        self.payload
    }
}
