//! Tree of bins: each maximal subtree held by a bin becomes one bin node,
//! linked to the bin node that holds its tree parent.

use std::collections::{BTreeSet, HashMap};

use dhsbpp_tree::{NodeId, PartitionTree};
use serde::Serialize;

use crate::bin::Bins;

/// One maximal subtree held by a bin.
#[derive(Debug, Clone, Serialize)]
pub struct BinNode {
    /// Index of the bin holding the subtree.
    pub bin_index: usize,
    /// Top node of the subtree.
    pub root: NodeId,
    /// Every tree node of the subtree.
    pub nodes: BTreeSet<NodeId>,
    /// Sum of own sizes over `nodes`.
    pub size: f64,
    /// Position of the bin node holding `root`'s tree parent.
    pub parent: Option<usize>,
    /// Positions of the bin nodes hanging below this one, smallest first.
    pub children: Vec<usize>,
}

/// Forest of [`BinNode`]s; `roots` index into `nodes`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BinForest {
    /// All bin nodes, grouped by bin in creation order.
    pub nodes: Vec<BinNode>,
    /// Bin nodes without a parent.
    pub roots: Vec<usize>,
}

impl BinForest {
    /// Derive the forest from the current placement.
    pub fn build(tree: &PartitionTree, bins: &Bins) -> Self {
        let mut forest = Self::default();
        let mut holder: HashMap<NodeId, usize> = HashMap::new();

        for bin in bins.iter() {
            for root in bin.root_nodes(tree) {
                let mut nodes = BTreeSet::new();
                let mut stack = vec![root];
                while let Some(id) = stack.pop() {
                    if !bin.contains(id) {
                        continue;
                    }
                    nodes.insert(id);
                    stack.extend(tree.node(id).children().iter().copied());
                }
                let pos = forest.nodes.len();
                holder.extend(nodes.iter().map(|&id| (id, pos)));
                let size = nodes.iter().map(|&id| tree.node(id).own_size()).sum();
                forest.nodes.push(BinNode { bin_index: bin.index(), root, nodes, size, parent: None, children: Vec::new() });
            }
        }

        for pos in 0..forest.nodes.len() {
            let parent = tree.node(forest.nodes[pos].root).parent().and_then(|p| holder.get(&p).copied());
            forest.nodes[pos].parent = parent;
            match parent {
                Some(parent) => forest.nodes[parent].children.push(pos),
                None => forest.roots.push(pos),
            }
        }
        // Smaller subtrees first, as the renderer lays them out.
        for pos in 0..forest.nodes.len() {
            let mut children = std::mem::take(&mut forest.nodes[pos].children);
            children.sort_by_key(|&c| forest.nodes[c].nodes.len());
            forest.nodes[pos].children = children;
        }
        forest
    }

    /// Number of bin nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no bin holds anything.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
