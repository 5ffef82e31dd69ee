//! Capacity capping ahead of packing.

use dhsbpp_tree::{NodeId, PartitionTree};
use tracing::debug;

/// Cap every node reachable from `top` at `volume` own size.
///
/// Overflow is pushed into synthetic `<name>#` children (chained when the
/// overflow itself exceeds `volume`). Returns the synthetic nodes created.
pub fn preprocess(tree: &mut PartitionTree, top: NodeId, volume: f64) -> Vec<NodeId> {
    let mut created = Vec::new();
    let mut stack = vec![top];
    while let Some(id) = stack.pop() {
        if let Some(spill) = tree.spill_overflow(id, volume) {
            debug!(node = tree.node(id).name(), spill = tree.node(spill).name(), "capped oversized node");
            created.push(spill);
        }
        stack.extend(tree.node(id).children().iter().copied());
    }
    created
}

#[cfg(test)]
mod tests {
    use super::*;
    use dhsbpp_tree::Hierarchy;

    #[test]
    fn caps_single_node() {
        let h = Hierarchy::from_pairs([("big", "big")]).unwrap();
        let mut tree = PartitionTree::from_hierarchy(&h);
        let big = tree.root();
        tree.add_to_own_size(big, 120.0);

        let created = preprocess(&mut tree, big, 50.0);
        assert_eq!(created.len(), 1);
        let spill = created[0];
        assert_eq!(tree.node(big).own_size(), 50.0);
        assert_eq!(tree.node(spill).name(), "big#");
        assert_eq!(tree.node(spill).own_size(), 70.0);
        assert_eq!(tree.node(big).children(), &[spill]);
    }

    #[test]
    fn every_node_fits_after_preprocess() {
        let h = Hierarchy::from_pairs([("r", "r"), ("a", "r"), ("b", "a")]).unwrap();
        let mut tree = PartitionTree::from_hierarchy(&h);
        for (name, size) in [("r", 30.0), ("a", 175.0), ("b", 51.0)] {
            let id = tree.lookup(name).unwrap();
            tree.add_to_own_size(id, size);
        }
        let root = tree.root();
        preprocess(&mut tree, root, 50.0);

        assert!(tree.ids().all(|id| tree.node(id).own_size() <= 50.0));
        assert_eq!(tree.node(root).subtree_size(), 256.0);
        assert!(tree.check_aggregates().is_ok());
        // a(175) -> a(50) / a#(125) -> a#(50) / a##(75) -> a##(50) / a###(25); b -> b(50) / b#(1)
        assert_eq!(tree.len(), 3 + 4);
        let b = tree.lookup("b").unwrap();
        assert_eq!(tree.ancestors(b).count(), 5);
    }
}
