//! Integration configuration.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Radial quantity a profile is binned in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum XAxis {
    /// Scattering vector magnitude in Å⁻¹.
    #[default]
    Q,
    /// Scattering angle 2θ in degrees.
    Angle,
    /// d-spacing in Å.
    Resolution,
    /// Distance from the beam centre in pixels.
    Pixel,
}

/// Whether integration produces a profile or a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Dimensions {
    /// 1D profile along the x axis.
    #[default]
    One,
    /// 2D radial × azimuthal map.
    Two,
}

/// How per-pixel uncertainties are obtained when none are supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrorModel {
    /// No error propagation unless a variance array is supplied.
    #[default]
    None,
    /// Variance equals the (non-negative) pixel value.
    Poisson,
}

/// Configuration for pixel integration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntegrationConfig {
    /// Number of radial bins.
    pub n_bins: usize,
    /// Number of azimuthal bins.
    pub n_azimuthal_bins: usize,
    /// Radial range `[min, max]` in units of `x_axis`.
    pub radial_range: Option<[f64; 2]>,
    /// Azimuthal range `[min, max]` in degrees.
    pub azimuthal_range: Option<[f64; 2]>,
    /// Bin the radial quantity on a log10 scale.
    pub log_radial: bool,
    /// Distribute each pixel over the bins it overlaps.
    pub pixel_splitting: bool,
    /// Radial quantity.
    pub x_axis: XAxis,
    /// Use azimuth as the x axis (1D) or as the map's x axis (2D).
    pub azimuthal_is_x: bool,
    /// Profile or map.
    pub dimensions: Dimensions,
    /// Replace non-finite outputs (empty bins) with zero.
    pub sanitise: bool,
    /// Integrate only the leading `(rows, columns)` region of the image.
    /// Coordinate arrays are generated for this shape.
    pub shape: Option<(usize, usize)>,
    /// Error propagation model.
    pub error_model: ErrorModel,
    /// Record, for 2D non-split maps, the last pixel landing in each cell.
    pub record_lookup: bool,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            n_bins: 1000,
            n_azimuthal_bins: 360,
            radial_range: None,
            azimuthal_range: None,
            log_radial: false,
            pixel_splitting: false,
            x_axis: XAxis::Q,
            azimuthal_is_x: false,
            dimensions: Dimensions::One,
            sanitise: true,
            shape: None,
            error_model: ErrorModel::None,
            record_lookup: false,
        }
    }
}

impl IntegrationConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of radial bins.
    #[must_use]
    pub fn with_bins(mut self, n_bins: usize) -> Self {
        self.n_bins = n_bins;
        self
    }

    /// Sets the number of azimuthal bins.
    #[must_use]
    pub fn with_azimuthal_bins(mut self, n_bins: usize) -> Self {
        self.n_azimuthal_bins = n_bins;
        self
    }

    /// Restricts the radial range.
    #[must_use]
    pub fn with_radial_range(mut self, min: f64, max: f64) -> Self {
        self.radial_range = Some([min, max]);
        self
    }

    /// Restricts the azimuthal range (degrees).
    #[must_use]
    pub fn with_azimuthal_range(mut self, min: f64, max: f64) -> Self {
        self.azimuthal_range = Some([min, max]);
        self
    }

    /// Enables log10 radial binning.
    #[must_use]
    pub fn with_log_radial(mut self, log: bool) -> Self {
        self.log_radial = log;
        self
    }

    /// Enables pixel splitting.
    #[must_use]
    pub fn with_pixel_splitting(mut self, split: bool) -> Self {
        self.pixel_splitting = split;
        self
    }

    /// Sets the radial quantity.
    #[must_use]
    pub fn with_x_axis(mut self, x_axis: XAxis) -> Self {
        self.x_axis = x_axis;
        self
    }

    /// Uses azimuth as the x axis.
    #[must_use]
    pub fn with_azimuthal_x(mut self, azimuthal_is_x: bool) -> Self {
        self.azimuthal_is_x = azimuthal_is_x;
        self
    }

    /// Selects profile or map output.
    #[must_use]
    pub fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Sets whether empty bins are sanitised to zero.
    #[must_use]
    pub fn with_sanitise(mut self, sanitise: bool) -> Self {
        self.sanitise = sanitise;
        self
    }

    /// Restricts integration to the leading `rows` x `columns` region.
    #[must_use]
    pub fn with_shape(mut self, rows: usize, columns: usize) -> Self {
        self.shape = Some((rows, columns));
        self
    }

    /// Sets the error model.
    #[must_use]
    pub fn with_error_model(mut self, error_model: ErrorModel) -> Self {
        self.error_model = error_model;
        self
    }

    /// Enables the per-cell pixel lookup for 2D non-split maps.
    #[must_use]
    pub fn with_lookup(mut self, record: bool) -> Self {
        self.record_lookup = record;
        self
    }

    /// Checks bin counts and ranges.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for zero bin counts, non-finite or
    /// inverted ranges, or a log radial range reaching zero.
    pub fn validate(&self) -> Result<()> {
        if self.n_bins == 0 {
            return Err(Error::InvalidConfig("n_bins must be at least 1".to_string()));
        }
        if self.n_azimuthal_bins == 0 {
            return Err(Error::InvalidConfig(
                "n_azimuthal_bins must be at least 1".to_string(),
            ));
        }
        for (name, range) in [
            ("radial_range", self.radial_range),
            ("azimuthal_range", self.azimuthal_range),
        ] {
            if let Some([min, max]) = range {
                if !(min.is_finite() && max.is_finite()) || min > max {
                    return Err(Error::InvalidConfig(format!(
                        "{name} must be finite and ordered, got [{min}, {max}]"
                    )));
                }
            }
        }
        if let (true, Some([min, _])) = (self.log_radial, self.radial_range) {
            if min <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "log radial range must be positive, got minimum {min}"
                )));
            }
        }
        if let Some((rows, columns)) = self.shape {
            if rows == 0 || columns == 0 {
                return Err(Error::InvalidConfig(format!(
                    "shape must be non-empty, got {rows}x{columns}"
                )));
            }
        }
        Ok(())
    }

    /// The part of the configuration that determines coordinate arrays and
    /// bin edges.
    #[must_use]
    pub fn binning_key(&self) -> BinningKey {
        BinningKey {
            n_bins: self.n_bins,
            n_azimuthal_bins: self.n_azimuthal_bins,
            radial_range: self.radial_range,
            azimuthal_range: self.azimuthal_range,
            log_radial: self.log_radial,
            pixel_splitting: self.pixel_splitting,
            x_axis: self.x_axis,
        }
    }
}

/// Configuration fields that the integration cache keys on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinningKey {
    /// Number of radial bins.
    pub n_bins: usize,
    /// Number of azimuthal bins.
    pub n_azimuthal_bins: usize,
    /// Radial range in the units of `x_axis`.
    pub radial_range: Option<[f64; 2]>,
    /// Azimuthal range in degrees.
    pub azimuthal_range: Option<[f64; 2]>,
    /// Log10-spaced radial bins.
    pub log_radial: bool,
    /// Pixel-splitting (corner range) coordinates.
    pub pixel_splitting: bool,
    /// Radial quantity.
    pub x_axis: XAxis,
}
