//! Conflict resolution over recommendation lists.
//!
//! # Flow
//!
//! ```text
//! recommendations
//!   → categorize (first-seen order)
//!   → pairwise predicates per category → single-linkage groups
//!   → one winner per group (max score, earliest on ties)
//!   → merge compatible survivors to a fixed point
//!   → sort by score desc, origin asc
//! ```
//!
//! The output never contains a conflicting pair and `resolve` is idempotent.
//! Internal failures degrade to passing the input through unchanged.

pub mod grouping;
pub mod predicates;
pub mod types;

pub use grouping::conflict_groups;
pub use predicates::{
    conflict_kind, in_conflict, ConflictKind, ConflictTables, PredicateError, PredicateResult,
};
pub use types::{ExpectedImpact, Priority, Recommendation, TimeWindow, DEFAULT_CATEGORY};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::resilience::DegradedResponse;

const SERVED_BY: &str = "conflict_resolver";

/// Error type for resolution. Never surfaced; callers get a degraded response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error("Non-finite score at index {index}")]
    NonFiniteScore { index: usize },
}

/// Result type for resolution internals
pub type ResolveResult<T> = Result<T, ResolveError>;

/// A conflicting pair, by input index (`first < second`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedConflict {
    pub first: usize,
    pub second: usize,
    pub kind: ConflictKind,
}

/// A recommendation under resolution with its provenance.
#[derive(Debug, Clone)]
struct Candidate {
    rec: Recommendation,
    /// Smallest input index among constituents
    origin: usize,
    /// Number of input recommendations merged into this one
    size: usize,
}

/// Stateless conflict resolver parametrized by domain conflict tables.
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    tables: ConflictTables,
}

impl ConflictResolver {
    pub fn new(tables: ConflictTables) -> Self {
        Self { tables }
    }

    /// Whether two recommendations conflict under this resolver's tables.
    pub fn in_conflict(&self, a: &Recommendation, b: &Recommendation) -> bool {
        in_conflict(a, b, &self.tables)
    }

    /// All conflicting pairs in `recs`, in index order.
    pub fn detect_conflicts(&self, recs: &[Recommendation]) -> Vec<DetectedConflict> {
        let mut conflicts = Vec::new();
        for i in 0..recs.len() {
            for j in (i + 1)..recs.len() {
                if let Some(kind) = conflict_kind(&recs[i], &recs[j], &self.tables) {
                    conflicts.push(DetectedConflict {
                        first: i,
                        second: j,
                        kind,
                    });
                }
            }
        }
        conflicts
    }

    /// Resolve conflicts and return a conflict-free, score-ordered list.
    ///
    /// Never fails: on internal error the input is returned unchanged and
    /// flagged degraded.
    pub fn resolve(&self, recs: &[Recommendation]) -> DegradedResponse<Vec<Recommendation>> {
        match self.try_resolve(recs) {
            Ok(resolved) => {
                info!(
                    input = recs.len(),
                    output = resolved.len(),
                    "Resolved recommendations"
                );
                DegradedResponse::full(resolved, SERVED_BY)
            }
            Err(e) => {
                warn!(error = %e, input = recs.len(), "Resolution failed, passing input through");
                DegradedResponse::pass_through(recs.to_vec(), SERVED_BY, e.to_string())
            }
        }
    }

    fn try_resolve(&self, recs: &[Recommendation]) -> ResolveResult<Vec<Recommendation>> {
        if let Some(index) = recs.iter().position(|r| !r.score().is_finite()) {
            return Err(ResolveError::NonFiniteScore { index });
        }

        let mut survivors: Vec<Candidate> = Vec::new();
        for (category, indices) in categorize(recs) {
            let winners = self.select_winners(recs, &indices);
            let merged = self.merge_to_fixed_point(winners);
            debug!(
                category = %category,
                input = indices.len(),
                survivors = merged.len(),
                "Resolved category"
            );
            survivors.extend(merged);
        }

        for candidate in &survivors {
            if !candidate.rec.score().is_finite() {
                return Err(ResolveError::NonFiniteScore {
                    index: candidate.origin,
                });
            }
        }

        survivors.sort_by(|a, b| {
            b.rec
                .score()
                .total_cmp(&a.rec.score())
                .then(a.origin.cmp(&b.origin))
        });
        Ok(survivors.into_iter().map(|c| c.rec).collect())
    }

    /// Group one category's recommendations and keep the best of each group.
    fn select_winners(&self, recs: &[Recommendation], indices: &[usize]) -> Vec<Candidate> {
        let mut edges = Vec::new();
        for a in 0..indices.len() {
            for b in (a + 1)..indices.len() {
                if in_conflict(&recs[indices[a]], &recs[indices[b]], &self.tables) {
                    edges.push((a, b));
                }
            }
        }

        conflict_groups(indices.len(), &edges)
            .into_iter()
            .filter_map(|group| {
                let mut best: Option<usize> = None;
                for local in group {
                    let idx = indices[local];
                    best = match best {
                        Some(current) if recs[idx].score() <= recs[current].score() => {
                            Some(current)
                        }
                        _ => Some(idx),
                    };
                }
                best.map(|idx| Candidate {
                    rec: recs[idx].clone(),
                    origin: idx,
                    size: 1,
                })
            })
            .collect()
    }

    fn merge_to_fixed_point(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        'outer: loop {
            for i in 0..candidates.len() {
                for j in (i + 1)..candidates.len() {
                    if let Some(merged) = self.try_merge(&candidates, i, j) {
                        debug!(
                            category = %merged.rec.category,
                            size = merged.size,
                            "Merged compatible recommendations"
                        );
                        candidates[i] = merged;
                        candidates.remove(j);
                        continue 'outer;
                    }
                }
            }
            return candidates;
        }
    }

    /// Merge `candidates[i]` and `candidates[j]` when compatible and the
    /// result conflicts with no other survivor.
    fn try_merge(&self, candidates: &[Candidate], i: usize, j: usize) -> Option<Candidate> {
        let a = &candidates[i];
        let b = &candidates[j];

        let objective = a.rec.objective.as_ref()?;
        if b.rec.objective.as_ref() != Some(objective) {
            return None;
        }
        if !a.rec.resources.is_disjoint(&b.rec.resources) {
            return None;
        }
        let timing = predicates::timing_hull(a.rec.timing.as_ref(), b.rec.timing.as_ref()).ok()?;

        let merged = merge_pair(a, b, timing);
        let clashes = candidates
            .iter()
            .enumerate()
            .filter(|(k, _)| *k != i && *k != j)
            .any(|(_, other)| in_conflict(&merged.rec, &other.rec, &self.tables));
        if clashes {
            return None;
        }
        Some(merged)
    }
}

/// Group input indices by category, categories in first-seen order.
fn categorize(recs: &[Recommendation]) -> Vec<(String, Vec<usize>)> {
    let mut categories: Vec<(String, Vec<usize>)> = Vec::new();
    for (idx, rec) in recs.iter().enumerate() {
        match categories.iter_mut().find(|(c, _)| *c == rec.category) {
            Some((_, indices)) => indices.push(idx),
            None => categories.push((rec.category.clone(), vec![idx])),
        }
    }
    categories
}

fn merge_pair(a: &Candidate, b: &Candidate, timing: Option<TimeWindow>) -> Candidate {
    let (na, nb) = (a.size as f64, b.size as f64);
    let weighted = |x: f64, y: f64| (x * na + y * nb) / (na + nb);

    let ia = a.rec.expected_impact;
    let ib = b.rec.expected_impact;

    let rec = Recommendation {
        category: a.rec.category.clone(),
        priority: a.rec.priority.max(b.rec.priority),
        resources: a.rec.resources.union(&b.rec.resources).cloned().collect(),
        timing,
        objective: a.rec.objective.clone(),
        strategy_label: a
            .rec
            .strategy_label
            .clone()
            .or_else(|| b.rec.strategy_label.clone()),
        actions: a.rec.actions.union(&b.rec.actions).cloned().collect(),
        expected_impact: ExpectedImpact::new(
            weighted(ia.engagement, ib.engagement),
            weighted(ia.reach, ib.reach),
            weighted(ia.conversion, ib.conversion),
        ),
        confidence: weighted(a.rec.confidence, b.rec.confidence).clamp(0.0, 1.0),
    };

    Candidate {
        rec,
        origin: a.origin.min(b.origin),
        size: a.size + b.size,
    }
}
