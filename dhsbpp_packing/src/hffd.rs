//! Hierarchical First-Fit-Decreasing placement and its greedy baseline.

use dhsbpp_tree::{NodeId, PartitionTree, SeparationPolicy};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::bin::Bins;
use crate::error::{PackError, Result};
use crate::preprocess::preprocess;

/// Where a unit that fits a bin is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackingPolicy {
    /// First bin in creation order with enough free space, else a new bin.
    #[default]
    FirstFitDecreasing,
    /// Always a fresh bin.
    GreedyDecreasing,
}

/// Packing strategy: placement policy plus separation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Packer {
    /// Placement of fitting units.
    pub packing: PackingPolicy,
    /// Split applied to oversized subtrees.
    pub separation: SeparationPolicy,
}

impl Packer {
    /// Combine both policies.
    pub fn new(packing: PackingPolicy, separation: SeparationPolicy) -> Self {
        Self { packing, separation }
    }

    /// Preprocess the whole tree and pack it from the root.
    #[instrument(skip_all, fields(nodes = tree.len()))]
    pub fn pack_tree(&self, tree: &mut PartitionTree, bins: &mut Bins) -> Result<()> {
        let root = tree.root();
        let volume = bins.params().volume();
        let spilled = preprocess(tree, root, volume);
        self.pack(tree, root, bins)?;
        debug!(bins = bins.len(), spilled = spilled.len(), "tree packed");
        Ok(())
    }

    /// Place the subtree rooted at `node`.
    ///
    /// Fitting subtrees go in whole. Larger ones are split, the units are
    /// packed largest first against the same bin list, and the split is
    /// undone before returning.
    pub fn pack(&self, tree: &mut PartitionTree, node: NodeId, bins: &mut Bins) -> Result<()> {
        let volume = bins.params().volume();
        let size = tree.node(node).subtree_size();
        if size <= volume {
            let fit = match self.packing {
                PackingPolicy::FirstFitDecreasing => bins.first_fit(size),
                PackingPolicy::GreedyDecreasing => None,
            };
            let index = fit.unwrap_or_else(|| bins.open());
            bins.place_subtree(index, tree, node)?;
            debug!(node = tree.node(node).name(), size, bin = index, "placed subtree");
            return Ok(());
        }

        tree.with_split(node, self.separation, |tree, units| {
            if units.len() < 2 {
                return Err(PackError::Unsplittable { node: tree.node(node).name().to_string(), size, volume });
            }
            let mut units = units.to_vec();
            units.sort_by(|a, b| tree.node(*b).subtree_size().total_cmp(&tree.node(*a).subtree_size()));
            debug!(node = tree.node(node).name(), size, units = units.len(), "split oversized subtree");
            for unit in units {
                self.pack(tree, unit, bins)?;
            }
            Ok(())
        })
    }
}
