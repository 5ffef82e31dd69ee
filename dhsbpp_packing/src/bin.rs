//! Bins, capacity parameters and the global bin list.

use std::collections::{BTreeSet, HashMap};

use dhsbpp_tree::{NodeId, PartitionTree};
use serde::{Deserialize, Serialize};

use crate::error::{PackError, Result};

/// Capacity parameters shared by every bin.
///
/// `allocation_factor` and `reallocation_delta` are percentages of
/// `max_capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinParams {
    /// Absolute capacity of one bin.
    pub max_capacity: f64,
    /// Share of `max_capacity` packing may fill.
    pub allocation_factor: f64,
    /// Half width of the tolerated load band.
    pub reallocation_delta: f64,
}

impl BinParams {
    /// Validate and build parameters.
    pub fn new(max_capacity: f64, allocation_factor: f64, reallocation_delta: f64) -> Result<Self> {
        if !(max_capacity.is_finite() && max_capacity > 0.0) {
            return Err(PackError::InvalidParams(format!("max_capacity must be positive, got {max_capacity}")));
        }
        if !(allocation_factor > 0.0 && allocation_factor <= 100.0) {
            return Err(PackError::InvalidParams(format!(
                "allocation_factor must be in (0, 100], got {allocation_factor}"
            )));
        }
        if !(reallocation_delta >= 0.0 && reallocation_delta <= allocation_factor) {
            return Err(PackError::InvalidParams(format!(
                "reallocation_delta must be in [0, {allocation_factor}], got {reallocation_delta}"
            )));
        }
        Ok(Self { max_capacity, allocation_factor, reallocation_delta })
    }

    /// Usable capacity of one bin.
    pub fn volume(&self) -> f64 {
        self.max_capacity * self.allocation_factor / 100.0
    }

    /// Width of the hysteresis band on either side of the volume.
    pub fn delta_share(&self) -> f64 {
        self.max_capacity * self.reallocation_delta / 100.0
    }

    /// Overload and underload bounds derived from volume and delta.
    pub fn thresholds(&self) -> Thresholds {
        let volume = self.volume();
        let share = self.delta_share();
        Thresholds { overload: volume + share, underload: volume - share }
    }
}

/// Load bounds outside of which a bin is rebalanced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// A bin at or above this size is overloaded.
    pub overload: f64,
    /// A bin at or below this size is underloaded.
    pub underload: f64,
}

/// A fixed-capacity bin referencing the tree nodes assigned to it.
#[derive(Debug, Clone)]
pub struct Bin {
    index: usize,
    params: BinParams,
    size: f64,
    members: BTreeSet<NodeId>,
}

impl Bin {
    fn new(index: usize, params: BinParams) -> Self {
        Self { index, params, size: 0.0, members: BTreeSet::new() }
    }

    /// 1-based creation index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Sum of own sizes of all members.
    pub fn size(&self) -> f64 {
        self.size
    }

    /// Usable capacity, see [`BinParams::volume`].
    pub fn volume(&self) -> f64 {
        self.params.volume()
    }

    /// Room left below the volume.
    pub fn free_space(&self) -> f64 {
        self.volume() - self.size
    }

    /// Member nodes in id order.
    pub fn members(&self) -> &BTreeSet<NodeId> {
        &self.members
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: NodeId) -> bool {
        self.members.contains(&id)
    }

    /// True when the bin holds no node.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members whose parent is absent or lives outside this bin, i.e. the
    /// tops of the disjoint subtrees held here.
    pub fn root_nodes(&self, tree: &PartitionTree) -> Vec<NodeId> {
        self.members
            .iter()
            .copied()
            .filter(|&id| tree.node(id).parent().map_or(true, |p| !self.members.contains(&p)))
            .collect()
    }
}

/// The global bin list plus the node → bin owner map.
///
/// A node is a member of at most one bin; every placement goes through
/// [`Bins::place_subtree`], which refuses nodes that are already owned.
#[derive(Debug, Clone)]
pub struct Bins {
    params: BinParams,
    bins: Vec<Bin>,
    owner: HashMap<NodeId, usize>,
}

impl Bins {
    /// Empty bin list sharing `params`.
    pub fn new(params: BinParams) -> Self {
        Self { params, bins: Vec::new(), owner: HashMap::new() }
    }

    /// Capacity parameters of every bin.
    pub fn params(&self) -> &BinParams {
        &self.params
    }

    /// Number of open bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// True before any bin is opened.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Bins in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Bin> {
        self.bins.iter()
    }

    /// Bin by 1-based index.
    pub fn get(&self, index: usize) -> Option<&Bin> {
        index.checked_sub(1).and_then(|pos| self.bins.get(pos))
    }

    fn get_mut(&mut self, index: usize) -> Result<&mut Bin> {
        index
            .checked_sub(1)
            .and_then(|pos| self.bins.get_mut(pos))
            .ok_or(PackError::UnknownBin(index))
    }

    /// Index of the bin owning `id`.
    pub fn owner_of(&self, id: NodeId) -> Option<usize> {
        self.owner.get(&id).copied()
    }

    /// Open an empty bin at the end of the list and return its index.
    pub fn open(&mut self) -> usize {
        let index = self.bins.len() + 1;
        self.bins.push(Bin::new(index, self.params));
        index
    }

    /// First bin, in creation order, with room for `size`.
    pub fn first_fit(&self, size: f64) -> Option<usize> {
        self.bins.iter().find(|b| b.free_space() >= size).map(Bin::index)
    }

    /// Assign `root` and all its attached descendants to bin `index`.
    pub fn place_subtree(&mut self, index: usize, tree: &PartitionTree, root: NodeId) -> Result<()> {
        let nodes = tree.descendants(root);
        if let Some(&taken) = nodes.iter().find(|id| self.owner.contains_key(id)) {
            return Err(PackError::AlreadyPlaced(tree.node(taken).name().to_string()));
        }
        let bin = self.get_mut(index)?;
        bin.size += tree.node(root).subtree_size();
        bin.members.extend(nodes.iter().copied());
        for id in nodes {
            self.owner.insert(id, index);
        }
        Ok(())
    }

    /// Change a node's own size and its owning bin's size in one step.
    /// Returns the owning bin index.
    pub fn add_to_bin_size(&mut self, tree: &mut PartitionTree, id: NodeId, delta: f64) -> Result<usize> {
        let index = self.owner_of(id).ok_or_else(|| PackError::Unplaced(tree.node(id).name().to_string()))?;
        tree.add_to_own_size(id, delta);
        self.get_mut(index)?.size += delta;
        Ok(index)
    }

    /// Empty bin `index` and return its former members.
    pub fn clear(&mut self, index: usize) -> Result<BTreeSet<NodeId>> {
        let bin = self.get_mut(index)?;
        bin.size = 0.0;
        let members = std::mem::take(&mut bin.members);
        for id in &members {
            self.owner.remove(id);
        }
        Ok(members)
    }

    /// Nodes of the tree not owned by any bin.
    pub fn unplaced(&self, tree: &PartitionTree) -> Vec<NodeId> {
        tree.ids().filter(|id| !self.owner.contains_key(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dhsbpp_tree::Hierarchy;

    fn params() -> BinParams {
        BinParams::new(100.0, 60.0, 20.0).unwrap()
    }

    #[test]
    fn thresholds_follow_percentages() {
        let p = params();
        assert_eq!(p.volume(), 60.0);
        let t = p.thresholds();
        assert_eq!(t.overload, 80.0);
        assert_eq!(t.underload, 40.0);
    }

    #[test]
    fn rejects_bad_params() {
        assert!(BinParams::new(0.0, 60.0, 10.0).is_err());
        assert!(BinParams::new(100.0, 0.0, 0.0).is_err());
        assert!(BinParams::new(100.0, 120.0, 10.0).is_err());
        assert!(BinParams::new(100.0, 50.0, 60.0).is_err());
    }

    #[test]
    fn place_and_clear() {
        let h = Hierarchy::from_pairs([("r", "r"), ("a", "r"), ("b", "a")]).unwrap();
        let mut tree = PartitionTree::from_hierarchy(&h);
        let (r, a, b) = (tree.root(), tree.lookup("a").unwrap(), tree.lookup("b").unwrap());
        tree.add_to_own_size(r, 5.0);
        tree.add_to_own_size(a, 10.0);
        tree.add_to_own_size(b, 20.0);

        let mut bins = Bins::new(params());
        let first = bins.open();
        let second = bins.open();
        assert_eq!((first, second), (1, 2));

        bins.place_subtree(first, &tree, r).unwrap();
        assert_eq!(bins.get(1).unwrap().size(), 35.0);
        assert_eq!(bins.owner_of(b), Some(1));
        assert_eq!(bins.get(1).unwrap().root_nodes(&tree), vec![r]);
        assert_eq!(
            bins.place_subtree(second, &tree, a),
            Err(PackError::AlreadyPlaced("a".into()))
        );
        assert!(bins.unplaced(&tree).is_empty());

        assert_eq!(bins.add_to_bin_size(&mut tree, b, 4.0).unwrap(), 1);
        assert_eq!(bins.get(1).unwrap().size(), 39.0);
        assert_eq!(tree.node(r).subtree_size(), 39.0);

        let former = bins.clear(1).unwrap();
        assert_eq!(former.len(), 3);
        assert_eq!(bins.get(1).unwrap().size(), 0.0);
        assert_eq!(bins.owner_of(a), None);
        assert_eq!(bins.first_fit(60.0), Some(1));
        assert_eq!(bins.first_fit(61.0), None);
        assert!(matches!(bins.add_to_bin_size(&mut tree, a, 1.0), Err(PackError::Unplaced(_))));
    }
}
