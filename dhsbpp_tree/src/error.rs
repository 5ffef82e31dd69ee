//! Error types for hierarchy validation and tree edits.

use crate::partition::NodeId;

/// Result type alias for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Why a child→parent mapping does not describe a single rooted tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyDefect {
    /// No name maps to itself.
    #[error("no root (a name mapping to itself) found")]
    NoRoot,
    /// More than one name maps to itself.
    #[error("multiple roots: {0:?}")]
    MultipleRoots(Vec<String>),
    /// A node was reached twice during traversal.
    #[error("node `{0}` reached twice (cycle or several parents)")]
    VisitedTwice(String),
    /// Nodes not reachable from the root.
    #[error("unreachable from the root: {0:?}")]
    Unreachable(Vec<String>),
}

/// Partition tree errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    /// The input hierarchy failed validation.
    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(#[from] HierarchyDefect),
    /// Initial sizing was requested on a tree that already carries load.
    #[error("partition tree already initialized (root subtree size {0})")]
    AlreadyInitialized(f64),
    /// A workload entry names an entity absent from the tree.
    #[error("unresolved entity `{0}`")]
    UnresolvedEntity(String),
    /// The requested window does not fit the series.
    #[error("window of {window} epochs out of range for a series of {epochs}")]
    WindowOutOfRange {
        /// Requested window width.
        window: usize,
        /// Number of epochs in the series.
        epochs: usize,
    },
    /// `child` is not currently a child of `parent`.
    #[error("{child:?} is not a child of {parent:?}")]
    NotAChild {
        /// Expected parent.
        parent: NodeId,
        /// Node that was looked up.
        child: NodeId,
    },
    /// The node to attach already has a parent.
    #[error("{0:?} is already attached")]
    AlreadyAttached(NodeId),
}
