//! powderpix-core: Core types for powder diffraction image integration.
//!
//! This crate provides the detector geometry model, the beam environment,
//! the integration configuration and the profile/map result types shared by
//! the algorithm, I/O and CLI crates.
//!

pub mod config;
pub mod error;
pub mod geometry;
pub mod metadata;
pub mod result;

pub use config::{BinningKey, Dimensions, ErrorModel, IntegrationConfig, XAxis};
pub use error::{Error, Result};
pub use geometry::DetectorGeometry;
pub use metadata::{
    d_spacing_from_q, q_from_two_theta, two_theta_from_q, CrystalEnvironment,
    DiffractionMetadata,
};
pub use result::{Axis, AxisKind, IntegrationResult, Map2D, Profile1D};

// Re-export the linear algebra types used by the geometry API
pub use nalgebra::{Matrix3, Vector3};
