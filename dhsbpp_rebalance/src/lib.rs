//! Sliding-window drift detection and local repacking of bins.
//!
//! The rebalancer replays the workload series against already packed bins.
//! After every epoch it scans the bins for the first one outside the load
//! band and re-packs only that bin's content, reporting how much load left it.
#![deny(missing_docs)]

pub mod error;
pub mod rebalancer;
pub mod repack;
pub mod window;

pub use error::{RebalanceError, Result};
pub use rebalancer::{Migration, Rebalancer, Violation, ViolationKind};
pub use repack::{local_repack, Repack, RetieMode};
pub use window::SlidingWindow;
