//! Error types for grid storage.

use thiserror::Error;

/// Errors that can occur while allocating grid storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    /// A grid needs at least one row and one column.
    #[error("grid dimensions must be non-zero: {width}x{height}")]
    EmptyDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// A supplied buffer does not match the grid dimensions.
    #[error("buffer holds {actual} tiles, expected {expected}")]
    LengthMismatch {
        /// Tiles implied by the dimensions.
        expected: usize,
        /// Tiles actually supplied.
        actual: usize,
    },

    /// The backing store for the requested tile count could not be reserved.
    #[error("failed to allocate storage for {tiles} tiles")]
    Allocation {
        /// Number of tiles requested.
        tiles: u64,
    },
}

/// Result type for grid operations.
pub type GridResult<T> = Result<T, GridError>;
