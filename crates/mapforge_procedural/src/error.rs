//! Error types for map generation.
//!
//! Only configuration validation and allocation can fail; every stage after
//! validation is infallible.

use mapforge_core::GridError;
use thiserror::Error;

/// Errors that can occur while configuring or running the generator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MapError {
    /// Width or height is zero or above the supported maximum.
    #[error("invalid map dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// A height threshold lies outside [0, 1].
    #[error("threshold {name} = {value} is outside [0, 1]")]
    ThresholdOutOfRange {
        /// Threshold name.
        name: &'static str,
        /// Offending value.
        value: f32,
    },

    /// Height thresholds must strictly increase from sea level to mountains.
    #[error("threshold {lower} must be below {upper}")]
    NonMonotonicThresholds {
        /// The threshold that should be smaller.
        lower: &'static str,
        /// The threshold that should be larger.
        upper: &'static str,
    },

    /// Any other out-of-domain parameter.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter path, e.g. `noise.octaves`.
        name: &'static str,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// Grid storage could not be allocated.
    #[error("failed to allocate a map of {tiles} tiles")]
    Allocation {
        /// Tiles requested.
        tiles: u64,
    },

    /// A configuration document could not be parsed or written.
    #[error("configuration error: {0}")]
    ConfigParse(String),
}

impl MapError {
    /// Shorthand for [`MapError::InvalidParameter`].
    #[must_use]
    pub const fn invalid(name: &'static str, reason: &'static str) -> Self {
        Self::InvalidParameter { name, reason }
    }
}

impl From<GridError> for MapError {
    fn from(err: GridError) -> Self {
        match err {
            GridError::EmptyDimensions { width, height } => Self::InvalidDimensions { width, height },
            GridError::Allocation { tiles } => Self::Allocation { tiles },
            GridError::LengthMismatch { expected, .. } => Self::Allocation {
                tiles: expected as u64,
            },
        }
    }
}

/// Result type for map generation.
pub type MapResult<T> = Result<T, MapError>;
