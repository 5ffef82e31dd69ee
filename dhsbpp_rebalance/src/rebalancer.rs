//! Violation scan and the rebalancing loop.

use dhsbpp_packing::{Bin, Bins, Packer, Thresholds};
use dhsbpp_tree::{PartitionTree, WorkloadSeries};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::Result;
use crate::repack::{local_repack, RetieMode};
use crate::window::SlidingWindow;

/// Which side of the load band a bin left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Size reached the overload bound.
    Overload,
    /// Size fell to the underload bound.
    Underload,
}

/// A bin found outside its load band after applying `epoch`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Epoch whose application exposed the violation.
    pub epoch: usize,
    /// Offending bin.
    pub bin: usize,
    /// Its size at that point.
    pub size: f64,
    /// Bound that was crossed.
    pub kind: ViolationKind,
}

/// Outcome of handling one violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Migration {
    /// Epoch of the violation.
    pub epoch: usize,
    /// Repacked bin.
    pub bin: usize,
    /// Bound that triggered the repack.
    pub kind: ViolationKind,
    /// Bin size before the repack.
    pub old_size: f64,
    /// Bin size after the repack.
    pub new_size: f64,
    /// `old_size - new_size`.
    pub migration_size: f64,
    /// Bins the repack opened.
    pub opened: Vec<usize>,
}

/// Replays the remainder of a workload series against packed bins.
///
/// Bins that are already underloaded when rebalancing starts are remembered
/// and never reported as underloaded. The flags are captured once; bins a
/// repack opens start unflagged.
#[derive(Debug, Clone)]
pub struct Rebalancer {
    packer: Packer,
    retie: RetieMode,
    thresholds: Thresholds,
    window: SlidingWindow,
    initially_underloaded: Vec<bool>,
}

impl Rebalancer {
    /// Start rebalancing after the first `window` epochs, which must already
    /// be reflected in the tree and bins.
    pub fn new(bins: &Bins, series: &WorkloadSeries, window: usize, packer: Packer, retie: RetieMode) -> Result<Self> {
        let thresholds = bins.params().thresholds();
        let window = SlidingWindow::new(window, series)?;
        let initially_underloaded = bins.iter().map(|b| b.size() <= thresholds.underload).collect();
        Ok(Self { packer, retie, thresholds, window, initially_underloaded })
    }

    /// Overload and underload bounds in use.
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Index of the next epoch to apply.
    pub fn next_epoch(&self) -> usize {
        self.window.next_epoch()
    }

    /// Whether `bin` was already underloaded when rebalancing started.
    /// Bins opened later never are.
    pub fn is_initially_underloaded(&self, bin: usize) -> bool {
        bin.checked_sub(1)
            .and_then(|pos| self.initially_underloaded.get(pos))
            .copied()
            .unwrap_or(false)
    }

    fn classify(&self, bin: &Bin) -> Option<ViolationKind> {
        if bin.size() >= self.thresholds.overload {
            Some(ViolationKind::Overload)
        } else if bin.size() <= self.thresholds.underload && !bin.is_empty() && !self.is_initially_underloaded(bin.index()) {
            Some(ViolationKind::Underload)
        } else {
            None
        }
    }

    /// First bin, in index order, outside the load band.
    pub fn scan(&self, bins: &Bins) -> Option<(usize, ViolationKind)> {
        bins.iter().find_map(|bin| self.classify(bin).map(|kind| (bin.index(), kind)))
    }

    /// Advance the window epoch by epoch until a bin violates the band.
    /// Returns `None` once the series is exhausted.
    pub fn find_violation(
        &mut self,
        tree: &mut PartitionTree,
        bins: &mut Bins,
        series: &WorkloadSeries,
    ) -> Result<Option<Violation>> {
        while let Some(epoch) = self.window.advance(tree, bins, series)? {
            if let Some((bin, kind)) = self.scan(bins) {
                let size = bins.get(bin).map_or(0.0, |b| b.size());
                info!(epoch, bin, size, ?kind, "bin out of band");
                return Ok(Some(Violation { epoch, bin, size, kind }));
            }
        }
        Ok(None)
    }

    /// Repack the violating bin and record the migration.
    pub fn resolve(&mut self, tree: &mut PartitionTree, bins: &mut Bins, violation: &Violation) -> Result<Migration> {
        let repack = local_repack(tree, bins, violation.bin, &self.packer, self.retie)?;

        self.initially_underloaded.resize(bins.len(), false);

        info!(
            epoch = violation.epoch,
            bin = repack.bin,
            migration = repack.migration_size,
            opened = repack.opened.len(),
            "bin repacked"
        );
        Ok(Migration {
            epoch: violation.epoch,
            bin: repack.bin,
            kind: violation.kind,
            old_size: repack.old_size,
            new_size: repack.new_size,
            migration_size: repack.migration_size,
            opened: repack.opened,
        })
    }

    /// Replay the rest of the series, repacking every violation found.
    #[instrument(skip_all, fields(from = self.next_epoch(), epochs = series.len()))]
    pub fn run(&mut self, tree: &mut PartitionTree, bins: &mut Bins, series: &WorkloadSeries) -> Result<Vec<Migration>> {
        let mut migrations = Vec::new();
        while let Some(violation) = self.find_violation(tree, bins, series)? {
            migrations.push(self.resolve(tree, bins, &violation)?);
        }
        Ok(migrations)
    }
}
