//! Arena-backed partition tree with aggregate subtree sizes.
//!
//! Nodes own their children by being their designated parent; the parent
//! link is a plain index. `add_to_own_size`, `remove_child` and
//! `append_child` are the only primitives that touch aggregates and each one
//! propagates its delta to every ancestor before returning.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TreeError};
use crate::hierarchy::Hierarchy;
use crate::series::{Epoch, WorkloadSeries};

/// Relative tolerance used when comparing aggregates.
const AGGREGATE_EPSILON: f64 = 1e-9;

/// Stable index of a node inside a [`PartitionTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// A node of the partition tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionNode {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    own_size: f64,
    subtree_size: f64,
}

impl PartitionNode {
    fn new(name: String, parent: Option<NodeId>) -> Self {
        Self { name, parent, children: Vec::new(), own_size: 0.0, subtree_size: 0.0 }
    }

    /// Unique entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current parent, `None` for the root or a detached unit.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Current children.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Load assigned to this node alone.
    pub fn own_size(&self) -> f64 {
        self.own_size
    }

    /// Load of this node plus all attached descendants.
    pub fn subtree_size(&self) -> f64 {
        self.subtree_size
    }
}

/// How an oversized subtree is broken into independently packable units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeparationPolicy {
    /// Detach every child: the node and each former child become units.
    #[default]
    Root,
    /// Detach only the heaviest child: exactly two units.
    MaxChild,
}

/// Outcome of a split: the units to pack and the children to reattach.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    /// Independent units, including the split node itself.
    pub units: Vec<NodeId>,
    /// Children detached from the split node, in detachment order.
    pub removed: Vec<NodeId>,
}

/// Mutable tree mirroring a validated [`Hierarchy`].
#[derive(Debug, Clone)]
pub struct PartitionTree {
    nodes: Vec<PartitionNode>,
    root: NodeId,
    index: HashMap<String, NodeId>,
}

impl PartitionTree {
    /// Deep-copy a validated hierarchy into a fresh arena with zero sizes.
    pub fn from_hierarchy(hierarchy: &Hierarchy) -> Self {
        let mut tree = Self { nodes: Vec::with_capacity(hierarchy.len()), root: NodeId(0), index: HashMap::new() };
        let root = tree.push_node(hierarchy.name(hierarchy.root()).to_string(), None);
        tree.root = root;

        let mut stack = vec![(hierarchy.root(), root)];
        while let Some((src, dst)) = stack.pop() {
            for &child in hierarchy.children(src) {
                let id = tree.push_node(hierarchy.name(child).to_string(), Some(dst));
                tree.nodes[dst.0].children.push(id);
                stack.push((child, id));
            }
        }
        tree
    }

    fn push_node(&mut self, name: String, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.index.insert(name.clone(), id);
        self.nodes.push(PartitionNode::new(name, parent));
        id
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes, synthetic ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a tree built from a hierarchy.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Borrow a node.
    pub fn node(&self, id: NodeId) -> &PartitionNode {
        &self.nodes[id.0]
    }

    /// Every node id in arena order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Resolve a name through the name index.
    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    /// Resolve every entry of an epoch, failing on the first unknown name.
    pub fn resolve_epoch(&self, epoch: &Epoch) -> Result<Vec<(NodeId, f64)>> {
        epoch
            .iter()
            .map(|(name, delta)| {
                self.lookup(name)
                    .map(|id| (id, *delta))
                    .ok_or_else(|| TreeError::UnresolvedEntity(name.clone()))
            })
            .collect()
    }

    /// Ancestors of `id`, nearest first, excluding `id`.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.nodes[id.0].parent, move |p| self.nodes[p.0].parent)
    }

    /// `id` and its attached descendants in pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            stack.extend(self.nodes[cur.0].children.iter().rev().copied());
        }
        out
    }

    /// Seed own sizes from the first `window` epochs of `series`.
    ///
    /// Rejected when the tree already carries load, so the window is never
    /// applied twice. All names are resolved before anything is mutated.
    pub fn set_initial_size(&mut self, series: &WorkloadSeries, window: usize) -> Result<()> {
        if window == 0 || window > series.len() {
            return Err(TreeError::WindowOutOfRange { window, epochs: series.len() });
        }
        let current = self.nodes[self.root.0].subtree_size;
        if current != 0.0 {
            return Err(TreeError::AlreadyInitialized(current));
        }
        let resolved = series.epochs()[..window]
            .iter()
            .map(|epoch| self.resolve_epoch(epoch))
            .collect::<Result<Vec<_>>>()?;
        for (id, delta) in resolved.into_iter().flatten() {
            self.add_to_own_size(id, delta);
        }
        debug!(window, size = self.nodes[self.root.0].subtree_size, "initial size applied");
        Ok(())
    }

    /// Add `delta` (possibly negative) to a node's own size and to the
    /// subtree size of the node and every ancestor.
    pub fn add_to_own_size(&mut self, id: NodeId, delta: f64) {
        self.nodes[id.0].own_size += delta;
        self.propagate(Some(id), delta);
    }

    fn propagate(&mut self, from: Option<NodeId>, delta: f64) {
        let mut cur = from;
        while let Some(id) = cur {
            let node = &mut self.nodes[id.0];
            node.subtree_size += delta;
            cur = node.parent;
        }
    }

    /// Detach `child` from `parent`. The child keeps its own subtree size and
    /// becomes an independent root until reattached.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let pos = self.nodes[parent.0]
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or(TreeError::NotAChild { parent, child })?;
        self.nodes[parent.0].children.remove(pos);
        self.nodes[child.0].parent = None;
        let size = self.nodes[child.0].subtree_size;
        self.propagate(Some(parent), -size);
        Ok(())
    }

    /// Attach a detached `child` under `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.attach(parent, child)?;
        let size = self.nodes[child.0].subtree_size;
        self.propagate(Some(parent), size);
        Ok(())
    }

    /// Attach without touching any aggregate. Callers must follow up with
    /// [`PartitionTree::recompute_aggregates`].
    pub fn append_child_unsized(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.attach(parent, child)
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.nodes[child.0].parent.is_some() || child == self.root {
            return Err(TreeError::AlreadyAttached(child));
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        Ok(())
    }

    /// Flattening split: detach all children of `id`.
    pub fn separate(&mut self, id: NodeId) -> Split {
        let removed = std::mem::take(&mut self.nodes[id.0].children);
        let mut detached = 0.0;
        for &child in &removed {
            let node = &mut self.nodes[child.0];
            node.parent = None;
            detached += node.subtree_size;
        }
        self.propagate(Some(id), -detached);

        let mut units = Vec::with_capacity(removed.len() + 1);
        units.push(id);
        units.extend(removed.iter().copied());
        Split { units, removed }
    }

    /// Bisecting split: detach only the heaviest child of `id` (first seen
    /// wins ties). Units are ordered heavier first.
    pub fn separate_max_child(&mut self, id: NodeId) -> Result<Split> {
        let mut heaviest: Option<NodeId> = None;
        for &child in &self.nodes[id.0].children {
            let size = self.nodes[child.0].subtree_size;
            if heaviest.map_or(true, |h| size > self.nodes[h.0].subtree_size) {
                heaviest = Some(child);
            }
        }
        let Some(child) = heaviest else {
            return Ok(Split { units: vec![id], removed: Vec::new() });
        };

        self.remove_child(id, child)?;
        let units = if self.nodes[child.0].subtree_size > self.nodes[id.0].subtree_size {
            vec![child, id]
        } else {
            vec![id, child]
        };
        Ok(Split { units, removed: vec![child] })
    }

    /// Split `id` with the given policy.
    pub fn split(&mut self, id: NodeId, policy: SeparationPolicy) -> Result<Split> {
        match policy {
            SeparationPolicy::Root => Ok(self.separate(id)),
            SeparationPolicy::MaxChild => self.separate_max_child(id),
        }
    }

    /// Reattach the children removed by a previous split of `id`.
    pub fn unite(&mut self, id: NodeId, removed: &[NodeId]) -> Result<()> {
        for &child in removed {
            self.append_child(id, child)?;
        }
        Ok(())
    }

    /// Split `id`, hand the units to `f`, then unite again regardless of
    /// what `f` returned.
    pub fn with_split<R, E>(
        &mut self,
        id: NodeId,
        policy: SeparationPolicy,
        f: impl FnOnce(&mut Self, &[NodeId]) -> std::result::Result<R, E>,
    ) -> std::result::Result<R, E>
    where
        E: From<TreeError>,
    {
        let split = self.split(id, policy)?;
        let outcome = f(self, &split.units);
        self.unite(id, &split.removed)?;
        outcome
    }

    /// If `id`'s own size exceeds `cap`, move the excess and all current
    /// children into a new synthetic child named `<name>#` and return it.
    ///
    /// Subtree sizes of `id` and its ancestors are unchanged. Non-finite
    /// sizes are left alone.
    pub fn spill_overflow(&mut self, id: NodeId, cap: f64) -> Option<NodeId> {
        let own = self.nodes[id.0].own_size;
        if !own.is_finite() || own <= cap {
            return None;
        }
        let mut name = format!("{}#", self.nodes[id.0].name);
        while self.index.contains_key(&name) {
            name.push('#');
        }

        let spill = self.push_node(name, Some(id));
        let inherited = std::mem::replace(&mut self.nodes[id.0].children, vec![spill]);
        for &child in &inherited {
            self.nodes[child.0].parent = Some(spill);
        }
        let subtree = self.nodes[id.0].subtree_size;
        let node = &mut self.nodes[spill.0];
        node.children = inherited;
        node.own_size = own - cap;
        node.subtree_size = subtree - cap;
        self.nodes[id.0].own_size = cap;
        Some(spill)
    }

    /// Rebuild every subtree size bottom-up from own sizes.
    pub fn recompute_aggregates(&mut self) {
        let mut order = Vec::with_capacity(self.nodes.len());
        for top in self.ids().filter(|&id| self.nodes[id.0].parent.is_none()) {
            order.extend(self.descendants(top));
        }
        for &id in order.iter().rev() {
            let sum: f64 = self.nodes[id.0].children.iter().map(|c| self.nodes[c.0].subtree_size).sum();
            let node = &mut self.nodes[id.0];
            node.subtree_size = node.own_size + sum;
        }
    }

    /// Verify aggregate consistency for every node; returns the first
    /// offending node.
    pub fn check_aggregates(&self) -> std::result::Result<(), NodeId> {
        for (idx, node) in self.nodes.iter().enumerate() {
            let expected = node.own_size + node.children.iter().map(|c| self.nodes[c.0].subtree_size).sum::<f64>();
            let tolerance = AGGREGATE_EPSILON * expected.abs().max(1.0);
            if (expected - node.subtree_size).abs() > tolerance {
                return Err(NodeId(idx));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// root(10) with children a(40) and b(40); a has child c(5).
    fn sample() -> PartitionTree {
        let h = Hierarchy::from_pairs([("root", "root"), ("a", "root"), ("b", "root"), ("c", "a")]).unwrap();
        let mut tree = PartitionTree::from_hierarchy(&h);
        for (name, size) in [("root", 10.0), ("a", 35.0), ("b", 40.0), ("c", 5.0)] {
            let id = tree.lookup(name).unwrap();
            tree.add_to_own_size(id, size);
        }
        tree
    }

    fn id(tree: &PartitionTree, name: &str) -> NodeId {
        tree.lookup(name).unwrap()
    }

    #[test]
    fn add_propagates_to_ancestors() {
        let tree = sample();
        assert_eq!(tree.node(tree.root()).subtree_size(), 90.0);
        assert_eq!(tree.node(id(&tree, "a")).subtree_size(), 40.0);
        assert!(tree.check_aggregates().is_ok());
    }

    #[test]
    fn remove_and_append_child() {
        let mut tree = sample();
        let (root, a, c) = (tree.root(), id(&tree, "a"), id(&tree, "c"));
        tree.remove_child(a, c).unwrap();
        assert_eq!(tree.node(root).subtree_size(), 85.0);
        assert_eq!(tree.node(c).subtree_size(), 5.0);
        assert_eq!(tree.node(c).parent(), None);
        assert!(tree.check_aggregates().is_ok());

        tree.append_child(a, c).unwrap();
        assert_eq!(tree.node(root).subtree_size(), 90.0);
        assert_eq!(tree.node(c).parent(), Some(a));
    }

    #[test]
    fn remove_unknown_child_fails() {
        let mut tree = sample();
        let (b, c) = (id(&tree, "b"), id(&tree, "c"));
        assert_eq!(tree.remove_child(b, c), Err(TreeError::NotAChild { parent: b, child: c }));
        assert_eq!(tree.node(tree.root()).subtree_size(), 90.0);
    }

    #[test]
    fn append_attached_child_fails() {
        let mut tree = sample();
        let (b, c) = (id(&tree, "b"), id(&tree, "c"));
        assert_eq!(tree.append_child(b, c), Err(TreeError::AlreadyAttached(c)));
    }

    #[test]
    fn separate_then_unite_restores_shape() {
        let mut tree = sample();
        let root = tree.root();
        let before: Vec<NodeId> = tree.node(root).children().to_vec();

        let split = tree.separate(root);
        assert_eq!(split.units.len(), 3);
        assert_eq!(tree.node(root).subtree_size(), 10.0);
        assert!(tree.node(root).children().is_empty());
        assert!(tree.check_aggregates().is_ok());

        tree.unite(root, &split.removed).unwrap();
        assert_eq!(tree.node(root).children(), before.as_slice());
        assert_eq!(tree.node(root).subtree_size(), 90.0);
    }

    #[test]
    fn separate_max_child_peels_heaviest() {
        let mut tree = sample();
        let root = tree.root();
        // a and b both weigh 40; a is seen first.
        let split = tree.separate_max_child(root).unwrap();
        let a = id(&tree, "a");
        assert_eq!(split.removed, vec![a]);
        assert_eq!(split.units, vec![root, a]);
        assert_eq!(tree.node(root).subtree_size(), 50.0);

        tree.unite(root, &split.removed).unwrap();
        assert_eq!(tree.node(root).subtree_size(), 90.0);
        assert_eq!(tree.node(root).children().len(), 2);
    }

    #[test]
    fn separate_max_child_of_leaf_is_identity() {
        let mut tree = sample();
        let c = id(&tree, "c");
        let split = tree.separate_max_child(c).unwrap();
        assert_eq!(split.units, vec![c]);
        assert!(split.removed.is_empty());
    }

    #[test]
    fn with_split_unites_on_error() {
        let mut tree = sample();
        let root = tree.root();
        let res: std::result::Result<(), TreeError> =
            tree.with_split(root, SeparationPolicy::Root, |_, _| Err(TreeError::UnresolvedEntity("x".into())));
        assert!(res.is_err());
        assert_eq!(tree.node(root).children().len(), 2);
        assert_eq!(tree.node(root).subtree_size(), 90.0);
    }

    #[test]
    fn initial_size_applies_window_once() {
        let h = Hierarchy::from_pairs([("r", "r"), ("a", "r")]).unwrap();
        let mut tree = PartitionTree::from_hierarchy(&h);
        let series = WorkloadSeries::from_iter([
            Epoch::from([("a".to_string(), 3.0)]),
            Epoch::from([("r".to_string(), 2.0), ("a".to_string(), 1.0)]),
            Epoch::from([("a".to_string(), 100.0)]),
        ]);
        tree.set_initial_size(&series, 2).unwrap();
        assert_eq!(tree.node(tree.root()).subtree_size(), 6.0);
        assert_eq!(tree.set_initial_size(&series, 2), Err(TreeError::AlreadyInitialized(6.0)));
    }

    #[test]
    fn initial_size_rejects_unknown_names_without_mutation() {
        let h = Hierarchy::from_pairs([("r", "r"), ("a", "r")]).unwrap();
        let mut tree = PartitionTree::from_hierarchy(&h);
        let series = WorkloadSeries::from_iter([
            Epoch::from([("a".to_string(), 3.0)]),
            Epoch::from([("ghost".to_string(), 1.0)]),
        ]);
        assert_eq!(tree.set_initial_size(&series, 2), Err(TreeError::UnresolvedEntity("ghost".into())));
        assert_eq!(tree.node(tree.root()).subtree_size(), 0.0);
        assert!(matches!(tree.set_initial_size(&series, 3), Err(TreeError::WindowOutOfRange { .. })));
    }

    #[test]
    fn spill_overflow_caps_node() {
        let h = Hierarchy::from_pairs([("t", "t"), ("k", "t")]).unwrap();
        let mut tree = PartitionTree::from_hierarchy(&h);
        let (t, k) = (tree.root(), tree.lookup("k").unwrap());
        tree.add_to_own_size(t, 120.0);
        tree.add_to_own_size(k, 7.0);

        let spill = tree.spill_overflow(t, 50.0).unwrap();
        assert_eq!(tree.node(spill).name(), "t#");
        assert_eq!(tree.node(t).own_size(), 50.0);
        assert_eq!(tree.node(spill).own_size(), 70.0);
        assert_eq!(tree.node(t).children(), &[spill]);
        assert_eq!(tree.node(k).parent(), Some(spill));
        assert_eq!(tree.node(t).subtree_size(), 127.0);
        assert!(tree.check_aggregates().is_ok());
        assert_eq!(tree.spill_overflow(t, 50.0), None);
    }

    #[test]
    fn spill_names_stay_unique() {
        let h = Hierarchy::from_pairs([("t", "t")]).unwrap();
        let mut tree = PartitionTree::from_hierarchy(&h);
        let t = tree.root();
        tree.add_to_own_size(t, 80.0);
        tree.spill_overflow(t, 50.0).unwrap();
        tree.add_to_own_size(t, 30.0);
        let second = tree.spill_overflow(t, 50.0).unwrap();
        assert_eq!(tree.node(second).name(), "t##");
        assert!(tree.check_aggregates().is_ok());
    }

    #[test]
    fn non_finite_sizes_are_not_spilled() {
        for size in [f64::INFINITY, f64::NAN] {
            let h = Hierarchy::from_pairs([("t", "t")]).unwrap();
            let mut tree = PartitionTree::from_hierarchy(&h);
            let t = tree.root();
            tree.add_to_own_size(t, size);
            assert_eq!(tree.spill_overflow(t, 50.0), None);
            assert_eq!(tree.len(), 1);
        }
    }

    #[test]
    fn recompute_matches_incremental() {
        let mut tree = sample();
        let (a, c) = (id(&tree, "a"), id(&tree, "c"));
        tree.remove_child(a, c).unwrap();
        tree.append_child_unsized(a, c).unwrap();
        assert!(tree.check_aggregates().is_err());
        tree.recompute_aggregates();
        assert!(tree.check_aggregates().is_ok());
        assert_eq!(tree.node(tree.root()).subtree_size(), 90.0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(usize, i32),
        Split(usize, bool),
        Move(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..16, -50i32..50).prop_map(|(n, d)| Op::Add(n, d)),
            (0usize..16, any::<bool>()).prop_map(|(n, b)| Op::Split(n, b)),
            (0usize..16).prop_map(Op::Move),
        ]
    }

    /// A 16-node tree where node i > 0 hangs under i / 2.
    fn heap_tree() -> PartitionTree {
        let pairs: Vec<(String, String)> =
            (0..16).map(|i| (format!("n{i}"), format!("n{}", if i == 0 { 0 } else { i / 2 }))).collect();
        PartitionTree::from_hierarchy(&Hierarchy::from_pairs(pairs).unwrap())
    }

    proptest! {
        #[test]
        fn aggregates_hold_under_mutation(ops in prop::collection::vec(op(), 1..40)) {
            let mut tree = heap_tree();
            for op in ops {
                match op {
                    Op::Add(n, d) => tree.add_to_own_size(NodeId(n), d as f64),
                    Op::Split(n, bisect) => {
                        let policy = if bisect { SeparationPolicy::MaxChild } else { SeparationPolicy::Root };
                        let before = tree.node(NodeId(n)).subtree_size();
                        let mut kids = tree.node(NodeId(n)).children().to_vec();
                        let split = tree.split(NodeId(n), policy).unwrap();
                        prop_assert!(tree.check_aggregates().is_ok());
                        tree.unite(NodeId(n), &split.removed).unwrap();
                        let mut after = tree.node(NodeId(n)).children().to_vec();
                        kids.sort();
                        after.sort();
                        prop_assert_eq!(kids, after);
                        prop_assert!((tree.node(NodeId(n)).subtree_size() - before).abs() < 1e-9);
                    }
                    Op::Move(n) => {
                        if let Some(parent) = tree.node(NodeId(n)).parent() {
                            tree.remove_child(parent, NodeId(n)).unwrap();
                            prop_assert!(tree.check_aggregates().is_ok());
                            tree.append_child(parent, NodeId(n)).unwrap();
                        }
                    }
                }
                prop_assert!(tree.check_aggregates().is_ok());
            }
        }
    }
}
