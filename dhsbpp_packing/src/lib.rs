//! Hierarchical bin packing of partition trees.
//!
//! Subtrees are placed whole whenever they fit a bin's volume; oversized
//! subtrees are split with a configurable [`SeparationPolicy`] and the pieces
//! are placed largest first (HFFD).
#![deny(missing_docs)]

pub mod bin;
pub mod error;
pub mod forest;
pub mod hffd;
pub mod preprocess;
pub mod report;

pub use bin::{Bin, BinParams, Bins, Thresholds};
pub use dhsbpp_tree::SeparationPolicy;
pub use error::{PackError, Result};
pub use forest::{BinForest, BinNode};
pub use hffd::{Packer, PackingPolicy};
pub use preprocess::preprocess;
pub use report::{BinReport, BinSummary, MemberSummary};
