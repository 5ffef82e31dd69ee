//! Trailing epoch window over the workload series.

use dhsbpp_packing::{Bins, PackError};
use dhsbpp_tree::{PartitionTree, TreeError, WorkloadSeries};
use tracing::trace;

use crate::error::Result;

/// Trailing window of `width` epochs over a workload series.
///
/// Each advance adds the next epoch and subtracts the one falling out of the
/// window, so tracked load always equals the sum of the last `width` epochs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindow {
    width: usize,
    next: usize,
}

impl SlidingWindow {
    /// Window whose first `width` epochs are already applied.
    pub fn new(width: usize, series: &WorkloadSeries) -> Result<Self> {
        if width == 0 || width > series.len() {
            return Err(TreeError::WindowOutOfRange { window: width, epochs: series.len() }.into());
        }
        Ok(Self { width, next: width })
    }

    /// Number of epochs summed into the current load.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Index of the epoch the next advance will apply.
    pub fn next_epoch(&self) -> usize {
        self.next
    }

    /// True once every epoch has been applied.
    pub fn is_exhausted(&self, series: &WorkloadSeries) -> bool {
        self.next >= series.len()
    }

    /// Apply the next epoch and roll off the oldest one, routing every delta
    /// through the owning bin. Returns the applied epoch, or `None` once the
    /// series is exhausted.
    ///
    /// Names are resolved and ownership checked before anything changes, so
    /// a bad epoch leaves tree and bins untouched.
    pub fn advance(&mut self, tree: &mut PartitionTree, bins: &mut Bins, series: &WorkloadSeries) -> Result<Option<usize>> {
        let (Some(incoming), Some(outgoing)) = (series.epoch(self.next), series.epoch(self.next - self.width)) else {
            return Ok(None);
        };
        let incoming = tree.resolve_epoch(incoming)?;
        let outgoing = tree.resolve_epoch(outgoing)?;
        if let Some((id, _)) = incoming.iter().chain(&outgoing).find(|(id, _)| bins.owner_of(*id).is_none()) {
            return Err(PackError::Unplaced(tree.node(*id).name().to_string()).into());
        }

        for (id, delta) in incoming {
            bins.add_to_bin_size(tree, id, delta)?;
        }
        for (id, delta) in outgoing {
            bins.add_to_bin_size(tree, id, -delta)?;
        }
        let epoch = self.next;
        self.next += 1;
        trace!(epoch, "window advanced");
        Ok(Some(epoch))
    }
}
