//! Error types for powderpix-core.

use thiserror::Error;

/// Result type alias for powderpix operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for powderpix operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// An array does not have the shape of the image it accompanies.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// A ray or direction never meets the detector plane.
    #[error("no physical intersection: {0}")]
    NoIntersection(String),

    /// The image carries no usable diffraction metadata.
    #[error("no detector geometry available for this image")]
    MissingGeometry,

    /// Detector geometry parameters are inconsistent.
    #[error("invalid detector geometry: {0}")]
    InvalidGeometry(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    InvalidConfig(String),
}
