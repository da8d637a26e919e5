//! Pairwise conflict predicates.
//!
//! Three independent checks decide whether two same-category recommendations
//! conflict: shared resources, overlapping execution windows, and strategic
//! inconsistency. A predicate that cannot be evaluated counts as a conflict.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::{Recommendation, TimeWindow};

/// Resource overlap ratio above which two recommendations conflict.
pub const RESOURCE_OVERLAP_THRESHOLD: f64 = 0.5;

/// Error raised while evaluating a predicate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredicateError {
    #[error("Unparseable time: {0:?}")]
    UnparseableTime(String),

    #[error("Incomparable times: {0:?} and {1:?}")]
    IncomparableTimes(String, String),
}

/// Result type for predicate evaluation
pub type PredicateResult<T> = Result<T, PredicateError>;

/// Why two recommendations conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Resource sets overlap beyond the threshold (or one is empty)
    Resource,
    /// Declared execution windows overlap
    Timing,
    /// Opposing strategies or mutually exclusive actions
    Consistency,
    /// A predicate could not be evaluated
    PredicateFailure,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resource => write!(f, "resource"),
            Self::Timing => write!(f, "timing"),
            Self::Consistency => write!(f, "consistency"),
            Self::PredicateFailure => write!(f, "predicate_failure"),
        }
    }
}

/// Domain tables for the consistency predicate. Pairs are unordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictTables {
    /// Strategy labels that pull in opposite directions
    pub opposing_strategies: Vec<(String, String)>,
    /// Actions that cannot both be carried out
    pub exclusive_actions: Vec<(String, String)>,
}

impl Default for ConflictTables {
    fn default() -> Self {
        let pairs = |raw: &[(&str, &str)]| {
            raw.iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect()
        };
        Self {
            opposing_strategies: pairs(&[
                ("increase_posting", "decrease_posting"),
                ("aggressive_growth", "organic_growth"),
                ("broad_reach", "niche_focus"),
                ("trend_following", "evergreen_content"),
                ("paid_promotion", "organic_only"),
            ]),
            exclusive_actions: pairs(&[
                ("boost_paid_ads", "pause_paid_ads"),
                ("increase_frequency", "decrease_frequency"),
                ("start_collaboration", "end_collaboration"),
                ("enable_comments", "disable_comments"),
                ("launch_campaign", "cancel_campaign"),
            ]),
        }
    }
}

impl ConflictTables {
    fn contains(pairs: &[(String, String)], a: &str, b: &str) -> bool {
        pairs
            .iter()
            .any(|(x, y)| (x == a && y == b) || (x == b && y == a))
    }

    /// Whether two strategy labels are listed as opposing.
    pub fn are_opposing(&self, a: &str, b: &str) -> bool {
        Self::contains(&self.opposing_strategies, a, b)
    }

    /// Whether any action of `a` excludes any action of `b`.
    pub fn are_exclusive(&self, a: &BTreeSet<String>, b: &BTreeSet<String>) -> bool {
        a.iter()
            .any(|x| b.iter().any(|y| Self::contains(&self.exclusive_actions, x, y)))
    }
}

/// `|R1 ∩ R2| / min(|R1|, |R2|) > 0.5`; an empty set on either side conflicts.
pub fn resource_conflict(a: &Recommendation, b: &Recommendation) -> bool {
    if a.resources.is_empty() || b.resources.is_empty() {
        return true;
    }
    let shared = a.resources.intersection(&b.resources).count() as f64;
    let smaller = a.resources.len().min(b.resources.len()) as f64;
    shared / smaller > RESOURCE_OVERLAP_THRESHOLD
}

/// Both windows declared and overlapping (`start1 ≤ end2 ∧ start2 ≤ end1`).
pub fn timing_conflict(a: &Recommendation, b: &Recommendation) -> PredicateResult<bool> {
    let (Some(w1), Some(w2)) = (&a.timing, &b.timing) else {
        return Ok(false);
    };
    let (s1, e1) = parse_window(w1)?;
    let (s2, e2) = parse_window(w2)?;
    Ok(s1.le(&e2, &w1.start, &w2.end)? && s2.le(&e1, &w2.start, &w1.end)?)
}

/// Different objectives with opposing strategies, or mutually exclusive actions.
pub fn consistency_conflict(
    a: &Recommendation,
    b: &Recommendation,
    tables: &ConflictTables,
) -> bool {
    if a.objective != b.objective {
        if let (Some(s1), Some(s2)) = (&a.strategy_label, &b.strategy_label) {
            if tables.are_opposing(s1, s2) {
                return true;
            }
        }
    }
    tables.are_exclusive(&a.actions, &b.actions)
}

/// Classify the conflict between two recommendations, if any.
///
/// Recommendations in different categories never conflict.
pub fn conflict_kind(
    a: &Recommendation,
    b: &Recommendation,
    tables: &ConflictTables,
) -> Option<ConflictKind> {
    if a.category != b.category {
        return None;
    }
    if resource_conflict(a, b) {
        return Some(ConflictKind::Resource);
    }
    match timing_conflict(a, b) {
        Ok(true) => return Some(ConflictKind::Timing),
        Ok(false) => {}
        Err(e) => {
            warn!(category = %a.category, error = %e, "Timing predicate failed, treating as conflict");
            return Some(ConflictKind::PredicateFailure);
        }
    }
    if consistency_conflict(a, b, tables) {
        return Some(ConflictKind::Consistency);
    }
    None
}

/// Whether two recommendations conflict.
pub fn in_conflict(a: &Recommendation, b: &Recommendation, tables: &ConflictTables) -> bool {
    conflict_kind(a, b, tables).is_some()
}

/// A parsed window bound. Absolute instants and clock times do not compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimePoint {
    /// Seconds since the Unix epoch
    Instant(i64),
    /// Seconds since midnight
    ClockTime(u32),
}

impl TimePoint {
    fn le(&self, other: &TimePoint, raw_self: &str, raw_other: &str) -> PredicateResult<bool> {
        match (self, other) {
            (TimePoint::Instant(a), TimePoint::Instant(b)) => Ok(a <= b),
            (TimePoint::ClockTime(a), TimePoint::ClockTime(b)) => Ok(a <= b),
            _ => Err(PredicateError::IncomparableTimes(
                raw_self.to_string(),
                raw_other.to_string(),
            )),
        }
    }

    fn cmp_same_kind(&self, other: &TimePoint) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (TimePoint::Instant(a), TimePoint::Instant(b)) => Some(a.cmp(b)),
            (TimePoint::ClockTime(a), TimePoint::ClockTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

fn parse_time(raw: &str) -> PredicateResult<TimePoint> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(TimePoint::Instant(dt.timestamp()));
    }
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(TimePoint::Instant(dt.and_utc().timestamp()));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(TimePoint::Instant(dt.and_utc().timestamp()));
        }
    }
    if let Ok(time) = NaiveTime::parse_from_str(s, "%H:%M") {
        return Ok(TimePoint::ClockTime(time.num_seconds_from_midnight()));
    }
    Err(PredicateError::UnparseableTime(raw.to_string()))
}

fn parse_window(window: &TimeWindow) -> PredicateResult<(TimePoint, TimePoint)> {
    Ok((parse_time(&window.start)?, parse_time(&window.end)?))
}

/// Smallest window covering both inputs, keeping the original bound strings.
///
/// Absent windows are ignored. Fails when bounds cannot be parsed or compared.
pub fn timing_hull(
    a: Option<&TimeWindow>,
    b: Option<&TimeWindow>,
) -> PredicateResult<Option<TimeWindow>> {
    let (w1, w2) = match (a, b) {
        (None, None) => return Ok(None),
        (Some(w), None) | (None, Some(w)) => return Ok(Some(w.clone())),
        (Some(w1), Some(w2)) => (w1, w2),
    };
    let (s1, e1) = parse_window(w1)?;
    let (s2, e2) = parse_window(w2)?;

    let start_order = s1
        .cmp_same_kind(&s2)
        .ok_or_else(|| PredicateError::IncomparableTimes(w1.start.clone(), w2.start.clone()))?;
    let end_order = e1
        .cmp_same_kind(&e2)
        .ok_or_else(|| PredicateError::IncomparableTimes(w1.end.clone(), w2.end.clone()))?;

    let start = if start_order.is_le() { &w1.start } else { &w2.start };
    let end = if end_order.is_ge() { &w1.end } else { &w2.end };
    Ok(Some(TimeWindow::new(start.clone(), end.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(resources: &[&str]) -> Recommendation {
        Recommendation::new("timing").with_resources(resources.iter().copied())
    }

    #[test]
    fn test_resource_overlap_full() {
        assert!(resource_conflict(
            &rec(&["model_A"]),
            &rec(&["model_A", "model_B"])
        ));
    }

    #[test]
    fn test_resource_overlap_half_is_not_conflict() {
        // 1 shared of min size 2 = 0.5, not strictly above threshold
        assert!(!resource_conflict(
            &rec(&["a", "b"]),
            &rec(&["b", "c", "d"])
        ));
    }

    #[test]
    fn test_empty_resources_fail_closed() {
        assert!(resource_conflict(&rec(&[]), &rec(&["a"])));
        assert!(resource_conflict(&rec(&["a"]), &rec(&[])));
    }

    #[test]
    fn test_timing_overlap_dates() {
        let a = rec(&["a"]).with_timing("2024-03-01", "2024-03-10");
        let b = rec(&["b"]).with_timing("2024-03-10 09:00", "2024-03-20");
        let c = rec(&["c"]).with_timing("2024-03-11", "2024-03-12");
        assert_eq!(timing_conflict(&a, &b), Ok(false));
        assert_eq!(timing_conflict(&b, &c), Ok(true));
        assert_eq!(timing_conflict(&a, &c), Ok(false));
    }

    #[test]
    fn test_timing_touching_bounds_overlap() {
        let a = rec(&["a"]).with_timing("09:00", "12:00");
        let b = rec(&["b"]).with_timing("12:00", "14:00");
        assert_eq!(timing_conflict(&a, &b), Ok(true));
    }

    #[test]
    fn test_timing_rfc3339() {
        let a = rec(&["a"]).with_timing("2024-03-01T08:00:00Z", "2024-03-01T10:00:00Z");
        let b = rec(&["b"]).with_timing("2024-03-01T11:00:00+02:00", "2024-03-01T12:00:00+02:00");
        // 09:00Z..10:00Z overlaps the first window
        assert_eq!(timing_conflict(&a, &b), Ok(true));
    }

    #[test]
    fn test_timing_missing_window_is_not_conflict() {
        let a = rec(&["a"]).with_timing("09:00", "12:00");
        let b = rec(&["b"]);
        assert_eq!(timing_conflict(&a, &b), Ok(false));
    }

    #[test]
    fn test_timing_parse_failure_is_conflict() {
        let tables = ConflictTables::default();
        let a = rec(&["a"]).with_timing("soon", "later");
        let b = rec(&["b"]).with_timing("09:00", "10:00");
        assert!(timing_conflict(&a, &b).is_err());
        assert_eq!(
            conflict_kind(&a, &b, &tables),
            Some(ConflictKind::PredicateFailure)
        );
    }

    #[test]
    fn test_timing_mixed_kinds_is_conflict() {
        let tables = ConflictTables::default();
        let a = rec(&["a"]).with_timing("2024-03-01", "2024-03-02");
        let b = rec(&["b"]).with_timing("09:00", "10:00");
        assert_eq!(
            conflict_kind(&a, &b, &tables),
            Some(ConflictKind::PredicateFailure)
        );
    }

    #[test]
    fn test_opposing_strategies_need_different_objectives() {
        let tables = ConflictTables::default();
        let a = rec(&["a"])
            .with_objective("growth")
            .with_strategy("increase_posting");
        let b = rec(&["b"])
            .with_objective("retention")
            .with_strategy("decrease_posting");
        let same_objective = rec(&["c"])
            .with_objective("growth")
            .with_strategy("decrease_posting");
        assert!(consistency_conflict(&a, &b, &tables));
        assert!(!consistency_conflict(&a, &same_objective, &tables));
    }

    #[test]
    fn test_exclusive_actions() {
        let tables = ConflictTables::default();
        let a = rec(&["a"]).with_actions(["boost_paid_ads", "post_reels"]);
        let b = rec(&["b"]).with_actions(["pause_paid_ads"]);
        let c = rec(&["c"]).with_actions(["post_reels"]);
        assert!(consistency_conflict(&a, &b, &tables));
        assert!(!consistency_conflict(&a, &c, &tables));
    }

    #[test]
    fn test_different_categories_never_conflict() {
        let tables = ConflictTables::default();
        let a = Recommendation::new("timing");
        let b = Recommendation::new("content");
        assert_eq!(conflict_kind(&a, &b, &tables), None);
    }

    #[test]
    fn test_timing_hull() {
        let w1 = TimeWindow::new("2024-03-01", "2024-03-05");
        let w2 = TimeWindow::new("2024-03-07", "2024-03-09");
        let hull = timing_hull(Some(&w1), Some(&w2)).unwrap().unwrap();
        assert_eq!(hull, TimeWindow::new("2024-03-01", "2024-03-09"));

        assert_eq!(timing_hull(Some(&w1), None).unwrap(), Some(w1.clone()));
        assert_eq!(timing_hull(None, None).unwrap(), None);

        let clock = TimeWindow::new("09:00", "10:00");
        assert!(timing_hull(Some(&w1), Some(&clock)).is_err());
    }
}
