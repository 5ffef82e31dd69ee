//! Per-epoch workload deltas.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One epoch of workload: entity name → signed delta.
pub type Epoch = BTreeMap<String, f64>;

/// Chronologically ordered epochs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSeries {
    epochs: Vec<Epoch>,
}

impl WorkloadSeries {
    /// Empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an epoch after the current last one.
    pub fn push(&mut self, epoch: Epoch) {
        self.epochs.push(epoch);
    }

    /// Add `delta` for `name` to the last epoch, opening one if needed.
    pub fn record(&mut self, name: &str, delta: f64) {
        if self.epochs.is_empty() {
            self.epochs.push(Epoch::new());
        }
        if let Some(epoch) = self.epochs.last_mut() {
            *epoch.entry(name.to_string()).or_insert(0.0) += delta;
        }
    }

    /// Number of epochs.
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    /// Whether the series has no epochs.
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Epoch at `idx`.
    pub fn epoch(&self, idx: usize) -> Option<&Epoch> {
        self.epochs.get(idx)
    }

    /// All epochs in order.
    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    /// Sum of all deltas inside `range` of epochs.
    pub fn total(&self, range: std::ops::Range<usize>) -> f64 {
        self.epochs[range].iter().flat_map(|e| e.values()).sum()
    }
}

impl FromIterator<Epoch> for WorkloadSeries {
    fn from_iter<T: IntoIterator<Item = Epoch>>(iter: T) -> Self {
        Self { epochs: iter.into_iter().collect() }
    }
}
