//! Ground-truth feasibility and historical agreement of strategy values.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

/// Relative tolerance for agreeing with a prior accepted value.
pub const HISTORY_TOLERANCE: f64 = 0.25;

/// Observed realistic values per metric name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    samples: BTreeMap<String, Vec<f64>>,
}

impl GroundTruth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add samples for a metric. Non-finite values are ignored.
    pub fn with_samples(mut self, metric: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        self.samples
            .entry(metric.into())
            .or_default()
            .extend(values.into_iter().filter(|v| v.is_finite()));
        self
    }

    pub fn samples(&self, metric: &str) -> Option<&[f64]> {
        self.samples
            .get(metric)
            .map(Vec::as_slice)
            .filter(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.samples.values().all(Vec::is_empty)
    }
}

/// 1.0 inside the observed range, decaying linearly with the distance
/// outside it relative to the range width. `None` without samples.
pub fn feasibility(value: f64, samples: &[f64]) -> Option<f64> {
    let (min, max) = bounds(samples)?;
    if (min..=max).contains(&value) {
        return Some(1.0);
    }
    let distance = if value < min { min - value } else { value - max };
    let scale = if max - min > f64::EPSILON {
        max - min
    } else {
        min.abs().max(1.0)
    };
    Some((1.0 - distance / scale).max(0.0))
}

/// Observed sample closest to `value` (the smaller one on ties).
pub fn nearest(value: f64, samples: &[f64]) -> Option<f64> {
    samples
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .min_by(|a, b| {
            (a - value)
                .abs()
                .total_cmp(&(b - value).abs())
                .then(a.total_cmp(b))
        })
}

fn bounds(samples: &[f64]) -> Option<(f64, f64)> {
    let mut finite = samples.iter().copied().filter(|s| s.is_finite());
    let first = finite.next()?;
    Some(finite.fold((first, first), |(lo, hi), s| (lo.min(s), hi.max(s))))
}

/// Bounded record of previously accepted strategy values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyHistory {
    limit: usize,
    accepted: VecDeque<BTreeMap<String, f64>>,
}

impl StrategyHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            accepted: VecDeque::new(),
        }
    }

    /// Record accepted values, evicting the oldest record beyond the limit.
    pub fn record(&mut self, values: BTreeMap<String, f64>) {
        if values.is_empty() {
            return;
        }
        self.accepted.push_back(values);
        while self.accepted.len() > self.limit {
            self.accepted.pop_front();
        }
    }

    /// Fraction of prior records holding `field` that agree with `value`
    /// within 25%. `None` when no prior record holds the field.
    pub fn historical_confidence(&self, field: &str, value: f64) -> Option<f64> {
        let priors: Vec<f64> = self
            .accepted
            .iter()
            .filter_map(|r| r.get(field).copied())
            .collect();
        if priors.is_empty() {
            return None;
        }
        let agreeing = priors
            .iter()
            .filter(|p| (value - **p).abs() <= HISTORY_TOLERANCE * p.abs().max(f64::EPSILON))
            .count();
        Some(agreeing as f64 / priors.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}
