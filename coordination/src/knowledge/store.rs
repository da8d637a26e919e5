//! In-memory knowledge store shared by handle across components.
//!
//! One entry per domain. Publishing overwrites the domain's previous entry;
//! entries are never removed automatically.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::producer::ContentMap;

/// Error type for knowledge store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for knowledge store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to KnowledgeStore
pub type SharedKnowledgeStore = Arc<KnowledgeStore>;

/// Latest published knowledge for one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedKnowledgeEntry {
    /// Component that published the entry
    pub source: String,
    pub data: ContentMap,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
}

impl SharedKnowledgeEntry {
    pub fn new(source: impl Into<String>, data: ContentMap, confidence: f64) -> Self {
        Self {
            source: source.into(),
            data,
            timestamp: Utc::now(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Domain → entry map behind a read/write lock.
#[derive(Debug, Default)]
pub struct KnowledgeStore {
    entries: RwLock<BTreeMap<String, SharedKnowledgeEntry>>,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedKnowledgeStore {
        Arc::new(self)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<String, SharedKnowledgeEntry>>> {
        self.entries.read().map_err(|_| StoreError::LockPoisoned)
    }

    /// Latest entry for a domain.
    pub fn get(&self, domain: &str) -> StoreResult<Option<SharedKnowledgeEntry>> {
        Ok(self.read()?.get(domain).cloned())
    }

    /// Replace the entry for a domain.
    pub fn publish(&self, domain: &str, entry: SharedKnowledgeEntry) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        debug!(
            domain,
            source = %entry.source,
            confidence = entry.confidence,
            keys = entry.data.len(),
            "Publishing knowledge"
        );
        entries.insert(domain.to_string(), entry);
        Ok(())
    }

    /// Copy of every entry.
    pub fn snapshot(&self) -> StoreResult<BTreeMap<String, SharedKnowledgeEntry>> {
        Ok(self.read()?.clone())
    }

    /// Copy of the requested domains that exist.
    pub fn snapshot_domains(
        &self,
        domains: &[String],
    ) -> StoreResult<BTreeMap<String, SharedKnowledgeEntry>> {
        let entries = self.read()?;
        Ok(domains
            .iter()
            .filter_map(|d| entries.get(d).map(|e| (d.clone(), e.clone())))
            .collect())
    }

    pub fn domains(&self) -> StoreResult<Vec<String>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.read()?.is_empty())
    }

    /// Snapshot rendered as content, keyed by domain.
    pub fn to_content(&self) -> StoreResult<ContentMap> {
        self.snapshot()?
            .into_iter()
            .map(|(domain, entry)| {
                serde_json::to_value(entry)
                    .map(|v| (domain, v))
                    .map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .collect::<StoreResult<ContentMap>>()
    }
}
