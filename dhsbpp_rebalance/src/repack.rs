//! Local repack of a single bin.

use dhsbpp_packing::{preprocess, Bins, PackError, Packer};
use dhsbpp_tree::{NodeId, PartitionTree};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// How foreign children detached before a repack are reattached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetieMode {
    /// `append_child` each child back, restoring ancestors incrementally.
    #[default]
    Exact,
    /// Reattach without sizing, then rebuild every aggregate from own sizes.
    Recompute,
}

/// Result of repacking one bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repack {
    /// Index of the repacked bin.
    pub bin: usize,
    /// Bin size before the repack.
    pub old_size: f64,
    /// Bin size after the repack.
    pub new_size: f64,
    /// Net load that left the bin: `old_size - new_size`.
    pub migration_size: f64,
    /// Bins opened while placing the content.
    pub opened: Vec<usize>,
}

/// Empty bin `index` and pack its former subtrees against the whole bin list.
///
/// Children of members that live in other bins are untied first so the
/// packer only walks this bin's nodes, and retied afterwards even when
/// packing fails. On a packing error the bin list is restored to its state
/// before the call.
pub fn local_repack(
    tree: &mut PartitionTree,
    bins: &mut Bins,
    index: usize,
    packer: &Packer,
    retie: RetieMode,
) -> Result<Repack> {
    let bin = bins.get(index).ok_or(PackError::UnknownBin(index))?;
    let old_size = bin.size();
    let members = bin.members().clone();

    let untied: Vec<(NodeId, NodeId)> = members
        .iter()
        .flat_map(|&parent| {
            tree.node(parent)
                .children()
                .iter()
                .filter(|c| !members.contains(*c))
                .map(move |&child| (parent, child))
                .collect::<Vec<_>>()
        })
        .collect();
    for &(parent, child) in &untied {
        tree.remove_child(parent, child)?;
    }

    let mut roots = bin_roots(tree, bins, index);
    let snapshot = bins.clone();
    bins.clear(index)?;
    roots.sort_by(|a, b| tree.node(*b).subtree_size().total_cmp(&tree.node(*a).subtree_size()));
    debug!(bin = index, roots = roots.len(), untied = untied.len(), "repacking bin");

    let before = bins.len();
    let packed = repack_roots(tree, bins, &roots, packer);
    retie_children(tree, &untied, retie)?;
    if let Err(err) = packed {
        *bins = snapshot;
        return Err(err);
    }

    let new_size = bins.get(index).map_or(0.0, |b| b.size());
    Ok(Repack {
        bin: index,
        old_size,
        new_size,
        migration_size: old_size - new_size,
        opened: (before + 1..=bins.len()).collect(),
    })
}

fn bin_roots(tree: &PartitionTree, bins: &Bins, index: usize) -> Vec<NodeId> {
    bins.get(index).map(|b| b.root_nodes(tree)).unwrap_or_default()
}

fn repack_roots(tree: &mut PartitionTree, bins: &mut Bins, roots: &[NodeId], packer: &Packer) -> Result<()> {
    let volume = bins.params().volume();
    for &root in roots {
        preprocess(tree, root, volume);
        packer.pack(tree, root, bins)?;
    }
    Ok(())
}

fn retie_children(tree: &mut PartitionTree, untied: &[(NodeId, NodeId)], mode: RetieMode) -> Result<()> {
    for &(parent, child) in untied.iter().rev() {
        match mode {
            RetieMode::Exact => tree.append_child(parent, child)?,
            RetieMode::Recompute => tree.append_child_unsized(parent, child)?,
        }
    }
    if mode == RetieMode::Recompute {
        tree.recompute_aggregates();
    }
    Ok(())
}
