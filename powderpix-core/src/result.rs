//! Integration outputs: labelled axes, profiles and maps.

use crate::config::XAxis;
use ndarray::{Array1, Array2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Physical meaning of an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AxisKind {
    /// |Q| in Å⁻¹.
    Q,
    /// 2θ in degrees.
    TwoTheta,
    /// d-spacing in Å.
    DSpacing,
    /// Radius from the beam centre in pixels.
    Pixel,
    /// Azimuthal angle in degrees.
    Azimuth,
}

impl AxisKind {
    /// Name and unit tag, e.g. `q [1/Å]`.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Q => "q [1/Å]",
            Self::TwoTheta => "2-theta [degrees]",
            Self::DSpacing => "d-spacing [Å]",
            Self::Pixel => "pixel",
            Self::Azimuth => "azimuthal angle [degrees]",
        }
    }
}

impl From<XAxis> for AxisKind {
    fn from(x_axis: XAxis) -> Self {
        match x_axis {
            XAxis::Q => Self::Q,
            XAxis::Angle => Self::TwoTheta,
            XAxis::Resolution => Self::DSpacing,
            XAxis::Pixel => Self::Pixel,
        }
    }
}

/// Bin-centre values with their physical meaning.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Axis {
    /// What the values measure.
    pub kind: AxisKind,
    /// Bin centres.
    pub values: Array1<f64>,
}

impl Axis {
    /// Creates an axis.
    #[must_use]
    pub fn new(kind: AxisKind, values: Array1<f64>) -> Self {
        Self { kind, values }
    }

    /// Name and unit tag.
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.kind.label()
    }

    /// Number of bins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the axis has no bins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A 1D reduced profile.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Profile1D {
    /// Bin centres.
    pub axis: Axis,
    /// Mean intensity per bin.
    pub intensity: Array1<f64>,
    /// Standard error of the mean per bin, when propagated.
    pub error: Option<Array1<f64>>,
    /// Pixel count (or fractional pixel weight) per bin.
    pub histogram: Array1<f64>,
}

/// A 2D reduced map, indexed `[y, x]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Map2D {
    /// Column axis.
    pub x_axis: Axis,
    /// Row axis.
    pub y_axis: Axis,
    /// Mean intensity per cell.
    pub intensity: Array2<f64>,
    /// Standard error of the mean per cell, when propagated.
    pub error: Option<Array2<f64>>,
    /// Pixel count (or fractional area) per cell.
    pub histogram: Array2<f64>,
    /// Flat index of the last pixel landing in each cell, -1 where none did.
    pub lookup: Option<Array2<i64>>,
}

/// Output of an integration call.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IntegrationResult {
    /// `[axis, intensity]`.
    Profile(Profile1D),
    /// `[x axis, intensity, y axis]`.
    Map(Map2D),
}

impl IntegrationResult {
    /// The profile, if this is one.
    #[must_use]
    pub fn as_profile(&self) -> Option<&Profile1D> {
        match self {
            Self::Profile(profile) => Some(profile),
            Self::Map(_) => None,
        }
    }

    /// The map, if this is one.
    #[must_use]
    pub fn as_map(&self) -> Option<&Map2D> {
        match self {
            Self::Map(map) => Some(map),
            Self::Profile(_) => None,
        }
    }

    /// Consumes the result, returning the profile if this is one.
    #[must_use]
    pub fn into_profile(self) -> Option<Profile1D> {
        match self {
            Self::Profile(profile) => Some(profile),
            Self::Map(_) => None,
        }
    }

    /// Consumes the result, returning the map if this is one.
    #[must_use]
    pub fn into_map(self) -> Option<Map2D> {
        match self {
            Self::Map(map) => Some(map),
            Self::Profile(_) => None,
        }
    }

    /// Total histogram weight.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        match self {
            Self::Profile(profile) => profile.histogram.sum(),
            Self::Map(map) => map.histogram.sum(),
        }
    }
}
