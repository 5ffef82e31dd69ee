//! Hierarchy validation and the partition tree used by the DHSBPP packer.
//!
//! The partition tree is an arena of [`PartitionNode`]s addressed by
//! [`NodeId`]. Every node carries its own load and the aggregate load of its
//! subtree; all structural edits keep the aggregates consistent.
#![deny(missing_docs)]

pub mod error;
pub mod hierarchy;
pub mod partition;
pub mod series;

pub use error::{HierarchyDefect, Result, TreeError};
pub use hierarchy::Hierarchy;
pub use partition::{NodeId, PartitionNode, PartitionTree, SeparationPolicy, Split};
pub use series::{Epoch, WorkloadSeries};
