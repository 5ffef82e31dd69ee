//! Rebalancing error type.

use dhsbpp_packing::PackError;
use dhsbpp_tree::TreeError;

/// Result type alias for rebalancing.
pub type Result<T> = std::result::Result<T, RebalanceError>;

/// Rebalancing errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RebalanceError {
    /// Tree edit or epoch resolution failed.
    #[error(transparent)]
    Tree(#[from] TreeError),
    /// Placement or bin bookkeeping failed.
    #[error(transparent)]
    Pack(#[from] PackError),
}
