//! Packing error type.

use dhsbpp_tree::TreeError;

/// Result type alias for packing operations.
pub type Result<T> = std::result::Result<T, PackError>;

/// Packing errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PackError {
    /// Structural tree error raised while splitting or uniting.
    #[error(transparent)]
    Tree(#[from] TreeError),
    /// A leaf above bin volume reached the packer. Preprocessing rules this out.
    #[error("node `{node}` of size {size} cannot be split below volume {volume}")]
    Unsplittable {
        /// Name of the offending node.
        node: String,
        /// Its subtree size.
        size: f64,
        /// Bin volume it had to fit.
        volume: f64,
    },
    /// Rejected capacity parameters.
    #[error("invalid bin parameters: {0}")]
    InvalidParams(String),
    /// The node is already a member of some bin.
    #[error("node `{0}` is already placed")]
    AlreadyPlaced(String),
    /// The node is not a member of any bin.
    #[error("node `{0}` is not placed in any bin")]
    Unplaced(String),
    /// No bin carries this index.
    #[error("no bin with index {0}")]
    UnknownBin(usize),
}
