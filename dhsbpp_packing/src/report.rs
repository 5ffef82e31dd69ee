//! Serializable bin snapshots.

use dhsbpp_tree::PartitionTree;
use serde::{Deserialize, Serialize};

use crate::bin::Bins;

/// One member of a bin as seen by a renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSummary {
    /// Node name.
    pub name: String,
    /// Own load of the node.
    pub own_size: f64,
    /// Name of the tree parent, if attached.
    pub parent: Option<String>,
}

/// One bin with its members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinSummary {
    /// 1-based bin index.
    pub index: usize,
    /// Current bin size.
    pub size: f64,
    /// Usable capacity.
    pub volume: f64,
    /// Members in id order.
    pub members: Vec<MemberSummary>,
}

/// Snapshot of the bin list, detached from the arena.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BinReport {
    /// Bins in creation order.
    pub bins: Vec<BinSummary>,
}

impl BinReport {
    /// Copy names and sizes out of the tree for every bin.
    pub fn capture(tree: &PartitionTree, bins: &Bins) -> Self {
        let bins = bins
            .iter()
            .map(|bin| BinSummary {
                index: bin.index(),
                size: bin.size(),
                volume: bin.volume(),
                members: bin
                    .members()
                    .iter()
                    .map(|&id| {
                        let node = tree.node(id);
                        MemberSummary {
                            name: node.name().to_string(),
                            own_size: node.own_size(),
                            parent: node.parent().map(|p| tree.node(p).name().to_string()),
                        }
                    })
                    .collect(),
            })
            .collect();
        Self { bins }
    }

    /// Sum of all bin sizes.
    pub fn total_size(&self) -> f64 {
        self.bins.iter().map(|b| b.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BinParams, Packer};
    use dhsbpp_tree::Hierarchy;

    #[test]
    fn captures_members_with_parents() {
        let h = Hierarchy::from_pairs([("root", "root"), ("a", "root")]).unwrap();
        let mut tree = PartitionTree::from_hierarchy(&h);
        let a = tree.lookup("a").unwrap();
        tree.add_to_own_size(a, 12.0);
        let mut bins = Bins::new(BinParams::new(100.0, 60.0, 10.0).unwrap());
        Packer::default().pack_tree(&mut tree, &mut bins).unwrap();

        let report = BinReport::capture(&tree, &bins);
        assert_eq!(report.bins.len(), 1);
        assert_eq!(report.bins[0].volume, 60.0);
        assert_eq!(report.total_size(), 12.0);
        let member = report.bins[0].members.iter().find(|m| m.name == "a").unwrap();
        assert_eq!(member.parent.as_deref(), Some("root"));

        let json = serde_json::to_string(&report).unwrap();
        let back: BinReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
