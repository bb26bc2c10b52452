//! powderpix-algorithms: Azimuthal integration kernels.
//!
//! This crate turns detector images into reduced diffraction data:
//! - **Coordinate arrays** - Q, 2θ, d-spacing, pixel radius and azimuth per
//!   pixel centre or per pixel corner range
//! - **Bin edges** - linear or log10, from explicit ranges or the data
//! - **Integration** - 1D and 2D, whole-pixel or pixel-splitting
//! - **Outlier masks** - per-bin median and MAD rejection
//! - **Remapping** - regular Q by azimuth grids
//!
#![warn(missing_docs)]

mod accumulate;
pub mod arrays;
pub mod bins;
mod cache;
mod integration;
mod outlier;
mod processing;
mod remap;

pub use accumulate::ImageInput;
pub use arrays::{
    azimuthal_array, azimuthal_range_arrays, radial_array, radial_range_arrays, wrap_angle,
    CoordinateArray,
};
pub use bins::{edges_for, BinEdges, Scale};
pub use cache::{CacheStatistics, IntegrationCache, PreparedBins};
pub use integration::{
    integrate_prepared, non_split_1d, non_split_2d, sanitise, split_1d, split_2d, Binned,
    SplittingPolicy,
};
pub use outlier::{outlier_mask, outlier_mask_from_radial, OutlierConfig, OutlierSide};
pub use processing::{integrate, PixelIntegrator};
pub use remap::{remap_image, remap_to_2d, remap_to_2d_split, RemapGrid};

// Re-export the core configuration and result types
pub use powderpix_core::{
    Dimensions, ErrorModel, IntegrationConfig, IntegrationResult, Map2D, Profile1D, XAxis,
};
