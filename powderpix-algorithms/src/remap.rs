//! Rebinning of per-pixel `(q, azimuth, intensity)` onto a regular Q by
//! azimuth grid.

use crate::accumulate::ImageInput;
use crate::arrays::{
    azimuthal_array, azimuthal_range_arrays, radial_array, radial_range_arrays, CoordinateArray,
};
use crate::bins::{edges_for, BinEdges, Scale};
use crate::integration::{non_split_2d, sanitise, split_2d, Binned};
use ndarray::ArrayView2;
use num_traits::AsPrimitive;
use powderpix_core::{
    AxisKind, DiffractionMetadata, Error, ErrorModel, IntegrationResult, Map2D, Result, XAxis,
};

/// Output grid of a remap. Ranges are outer edges; unset ranges span the data.
#[derive(Debug, Clone, PartialEq)]
pub struct RemapGrid {
    /// Q range in Å⁻¹.
    pub q_range: Option<[f64; 2]>,
    /// Azimuthal range in degrees.
    pub azimuthal_range: Option<[f64; 2]>,
    /// Number of Q columns.
    pub n_q: usize,
    /// Number of azimuthal rows.
    pub n_azimuthal: usize,
    /// Variance source for the error map.
    pub error_model: ErrorModel,
    /// Replace NaN in empty cells with zero.
    pub sanitise: bool,
}

impl Default for RemapGrid {
    fn default() -> Self {
        Self {
            q_range: None,
            azimuthal_range: None,
            n_q: 500,
            n_azimuthal: 360,
            error_model: ErrorModel::None,
            sanitise: true,
        }
    }
}

impl RemapGrid {
    /// Grid of `n_q` by `n_azimuthal` cells.
    #[must_use]
    pub fn new(n_q: usize, n_azimuthal: usize) -> Self {
        Self {
            n_q,
            n_azimuthal,
            ..Self::default()
        }
    }

    /// Sets the Q range.
    #[must_use]
    pub fn with_q_range(mut self, min: f64, max: f64) -> Self {
        self.q_range = Some([min, max]);
        self
    }

    /// Sets the azimuthal range.
    #[must_use]
    pub fn with_azimuthal_range(mut self, min: f64, max: f64) -> Self {
        self.azimuthal_range = Some([min, max]);
        self
    }

    /// Sets the error model.
    #[must_use]
    pub fn with_error_model(mut self, error_model: ErrorModel) -> Self {
        self.error_model = error_model;
        self
    }

    /// Checks cell counts and ranges.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for empty or inverted grids.
    pub fn validate(&self) -> Result<()> {
        if self.n_q == 0 || self.n_azimuthal == 0 {
            return Err(Error::InvalidConfig("remap grid must have cells".into()));
        }
        for [min, max] in [self.q_range, self.azimuthal_range].into_iter().flatten() {
            if !(min < max) {
                return Err(Error::InvalidConfig(format!(
                    "remap range [{min}, {max}] is empty or inverted"
                )));
            }
        }
        Ok(())
    }

    fn edges(&self, q: &CoordinateArray, azimuth: &CoordinateArray) -> (BinEdges, BinEdges) {
        (
            edges_for(q, self.q_range, self.n_q, Scale::Linear, false),
            edges_for(
                azimuth,
                self.azimuthal_range,
                self.n_azimuthal,
                Scale::Linear,
                false,
            ),
        )
    }

    fn azimuthal_base(&self) -> f64 {
        self.azimuthal_range.map_or(-180.0, |[min, _]| min)
    }
}

fn remap<T>(
    input: &ImageInput<'_, T>,
    q: &CoordinateArray,
    azimuth: &CoordinateArray,
    grid: &RemapGrid,
) -> Result<Map2D>
where
    T: AsPrimitive<f64>,
{
    grid.validate()?;
    input.validate()?;
    input.check_shape(q.shape())?;
    input.check_shape(azimuth.shape())?;

    let (q_edges, azimuthal_edges) = grid.edges(q, azimuth);
    let x = Binned {
        coords: q,
        edges: &q_edges,
        limits: None,
        kind: AxisKind::Q,
    };
    let y = Binned {
        coords: azimuth,
        edges: &azimuthal_edges,
        limits: None,
        kind: AxisKind::Azimuth,
    };
    let mut result = match q {
        CoordinateArray::Centre(_) => non_split_2d(input, &x, &y, grid.error_model, false)?,
        CoordinateArray::Range { .. } => split_2d(input, &x, &y, grid.error_model)?,
    };
    if grid.sanitise {
        sanitise(&mut result);
    }
    match result {
        IntegrationResult::Map(map) => Ok(map),
        IntegrationResult::Profile(_) => Err(Error::InvalidConfig(
            "remap produced a profile instead of a map".into(),
        )),
    }
}

/// Assigns each pixel wholly to the cell holding its `(q, azimuth)`.
///
/// # Errors
/// Returns [`Error::ShapeMismatch`] if the arrays differ in shape, or
/// [`Error::InvalidConfig`] for an invalid grid.
pub fn remap_to_2d<T>(
    input: &ImageInput<'_, T>,
    q: ArrayView2<'_, f64>,
    azimuth: ArrayView2<'_, f64>,
    grid: &RemapGrid,
) -> Result<Map2D>
where
    T: AsPrimitive<f64>,
{
    remap(
        input,
        &CoordinateArray::Centre(q.to_owned()),
        &CoordinateArray::Centre(azimuth.to_owned()),
        grid,
    )
}

/// Shares each pixel between the cells its `[q_min, q_max]` by
/// `[azimuth_min, azimuth_max]` rectangle overlaps, by area.
///
/// # Errors
/// Returns [`Error::ShapeMismatch`] if the arrays differ in shape, or
/// [`Error::InvalidConfig`] for an invalid grid.
pub fn remap_to_2d_split<T>(
    input: &ImageInput<'_, T>,
    q: (ArrayView2<'_, f64>, ArrayView2<'_, f64>),
    azimuth: (ArrayView2<'_, f64>, ArrayView2<'_, f64>),
    grid: &RemapGrid,
) -> Result<Map2D>
where
    T: AsPrimitive<f64>,
{
    if q.0.dim() != q.1.dim() || azimuth.0.dim() != azimuth.1.dim() {
        return Err(Error::ShapeMismatch {
            expected: q.0.dim(),
            found: if q.0.dim() == q.1.dim() {
                azimuth.1.dim()
            } else {
                q.1.dim()
            },
        });
    }
    remap(
        input,
        &CoordinateArray::Range {
            min: q.0.to_owned(),
            max: q.1.to_owned(),
        },
        &CoordinateArray::Range {
            min: azimuth.0.to_owned(),
            max: azimuth.1.to_owned(),
        },
        grid,
    )
}

/// Remaps an image using Q and azimuth derived from `metadata`.
///
/// # Errors
/// Returns geometry errors raised while generating coordinates, plus those of
/// [`remap_to_2d`].
pub fn remap_image<T>(
    input: &ImageInput<'_, T>,
    metadata: &DiffractionMetadata,
    grid: &RemapGrid,
    split: bool,
) -> Result<Map2D>
where
    T: AsPrimitive<f64>,
{
    let shape = input.shape();
    let beam_centre = metadata.detector.beam_centre_coords()?;
    let base = grid.azimuthal_base();
    let (q, azimuth) = if split {
        let (min, max) = radial_range_arrays(metadata, shape, XAxis::Q)?;
        let (az_min, az_max) = azimuthal_range_arrays(beam_centre, shape, base, false);
        (
            CoordinateArray::Range { min, max },
            CoordinateArray::Range {
                min: az_min,
                max: az_max,
            },
        )
    } else {
        (
            CoordinateArray::Centre(radial_array(metadata, shape, XAxis::Q)?),
            CoordinateArray::Centre(azimuthal_array(beam_centre, shape, base, false)),
        )
    };
    remap(input, &q, &azimuth, grid)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use powderpix_core::{CrystalEnvironment, DetectorGeometry};

    #[test]
    fn test_nearest_remap() {
        let image = array![[1.0, 2.0], [3.0, 5.0]];
        let q = array![[0.5, 1.5], [0.5, 1.5]];
        let azimuth = array![[-90.0, -90.0], [90.0, 90.0]];
        let grid = RemapGrid::new(2, 2)
            .with_q_range(0.0, 2.0)
            .with_azimuthal_range(-180.0, 180.0);
        let input = ImageInput::new(image.view());
        let map = remap_to_2d(&input, q.view(), azimuth.view(), &grid).unwrap();
        assert_eq!(map.intensity, array![[1.0, 2.0], [3.0, 5.0]]);
        assert_eq!(map.x_axis.values, array![0.5, 1.5]);
        assert_eq!(map.y_axis.values, array![-90.0, 90.0]);
        assert_eq!(map.x_axis.kind, AxisKind::Q);
        assert!(map.lookup.is_none());
    }

    #[test]
    fn test_split_remap_conserves_weight() {
        let image = array![[2.0]];
        let (q_min, q_max) = (array![[0.25]], array![[1.75]]);
        let (az_min, az_max) = (array![[-10.0]], array![[10.0]]);
        let grid = RemapGrid::new(2, 2)
            .with_q_range(0.0, 2.0)
            .with_azimuthal_range(-20.0, 20.0);
        let input = ImageInput::new(image.view());
        let map = remap_to_2d_split(
            &input,
            (q_min.view(), q_max.view()),
            (az_min.view(), az_max.view()),
            &grid,
        )
        .unwrap();
        assert_abs_diff_eq!(map.histogram.sum(), 1.0, epsilon = 1e-12);
        for value in &map.intensity {
            assert_abs_diff_eq!(*value, 2.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let image = Array2::<f64>::zeros((2, 2));
        let q = Array2::<f64>::zeros((2, 3));
        let grid = RemapGrid::new(2, 2);
        let input = ImageInput::new(image.view());
        assert!(matches!(
            remap_to_2d(&input, q.view(), image.view(), &grid),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_image_remap_uniform() {
        let detector = DetectorGeometry::from_beam_centre((24, 24), 0.2, (12.0, 12.0), 80.0).unwrap();
        let md = DiffractionMetadata::new(detector, CrystalEnvironment::new(1.0).unwrap());
        let image = Array2::from_elem((24, 24), 3.0f32);
        let input = ImageInput::new(image.view());
        let grid = RemapGrid::new(8, 12);
        for split in [false, true] {
            let map = remap_image(&input, &md, &grid, split).unwrap();
            assert_eq!(map.intensity.dim(), (12, 8));
            for (&value, &weight) in map.intensity.iter().zip(&map.histogram) {
                if weight > 1e-9 {
                    assert_abs_diff_eq!(value, 3.0, epsilon = 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_invalid_grid() {
        assert!(RemapGrid::new(0, 4).validate().is_err());
        assert!(RemapGrid::new(4, 4).with_q_range(2.0, 1.0).validate().is_err());
    }
}
