//! The four integration variants.
//!
//! Each variant walks the image once in row-major order, skips masked pixels
//! and pixels outside the configured ranges, and accumulates intensity,
//! weight and optionally variance into flat per-bin buffers. The variant is
//! picked once per call from a [`SplittingPolicy`].
#![allow(clippy::cast_possible_wrap)]

use crate::accumulate::{Accumulator, ImageInput};
use crate::arrays::CoordinateArray;
use crate::bins::BinEdges;
use crate::cache::PreparedBins;
use ndarray::Array2;
use num_traits::AsPrimitive;
use powderpix_core::{
    Axis, AxisKind, Dimensions, Error, ErrorModel, IntegrationConfig, IntegrationResult, Map2D,
    Profile1D, Result,
};

/// Which accumulation kernel to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplittingPolicy {
    /// Whole pixel into the bin holding its centre.
    NonSplit1D,
    /// Pixel interval shared between overlapped bins.
    Split1D,
    /// Whole pixel into the cell holding its centre.
    NonSplit2D,
    /// Pixel footprint shared between overlapped cells by area.
    Split2D,
}

impl SplittingPolicy {
    /// Policy selected by `dimensions` and `pixel_splitting`.
    #[must_use]
    pub fn from_config(config: &IntegrationConfig) -> Self {
        match (config.dimensions, config.pixel_splitting) {
            (Dimensions::One, false) => Self::NonSplit1D,
            (Dimensions::One, true) => Self::Split1D,
            (Dimensions::Two, false) => Self::NonSplit2D,
            (Dimensions::Two, true) => Self::Split2D,
        }
    }

    /// Returns true for the pixel-splitting variants.
    #[must_use]
    pub fn splits(self) -> bool {
        matches!(self, Self::Split1D | Self::Split2D)
    }
}

/// One binned axis: per-pixel coordinates, their edges and an optional
/// restriction in binning space.
#[derive(Debug, Clone, Copy)]
pub struct Binned<'p> {
    /// Per-pixel coordinates.
    pub coords: &'p CoordinateArray,
    /// Bin edges along this axis.
    pub edges: &'p BinEdges,
    /// Inclusive range a pixel must fall in when this axis is integrated out.
    pub limits: Option<[f64; 2]>,
    /// Meaning of the axis.
    pub kind: AxisKind,
}

impl Binned<'_> {
    fn axis(&self) -> Axis {
        Axis::new(self.kind, self.edges.centres().clone())
    }
}

fn centres(coords: &CoordinateArray) -> Result<&Array2<f64>> {
    coords
        .centre()
        .ok_or_else(|| Error::InvalidConfig("pixel-centre coordinates required".into()))
}

fn ranges(coords: &CoordinateArray) -> Result<(&Array2<f64>, &Array2<f64>)> {
    coords
        .range()
        .ok_or_else(|| Error::InvalidConfig("pixel-range coordinates required".into()))
}

fn within(limits: Option<[f64; 2]>, value: f64) -> bool {
    limits.map_or(true, |[min, max]| value >= min && value <= max)
}

/// Share of `[lo, hi]` inside `limits`, or `None` if nothing is.
fn range_scale(limits: Option<[f64; 2]>, lo: f64, hi: f64) -> Option<f64> {
    let Some([min, max]) = limits else {
        return Some(1.0);
    };
    if !(hi >= min && lo <= max) {
        return None;
    }
    let extent = hi - lo;
    if extent > 0.0 {
        let clipped = hi.min(max) - lo.max(min);
        (clipped > 0.0).then(|| clipped / extent)
    } else {
        Some(1.0)
    }
}

/// Accumulates along `primary`, restricting by `orthogonal.limits`.
///
/// # Errors
/// Returns [`Error::InvalidConfig`] if either axis holds range coordinates.
pub fn non_split_1d<T>(
    input: &ImageInput<'_, T>,
    primary: &Binned<'_>,
    orthogonal: &Binned<'_>,
    model: ErrorModel,
) -> Result<IntegrationResult>
where
    T: AsPrimitive<f64>,
{
    let values = centres(primary.coords)?;
    let across = centres(orthogonal.coords)?;
    let mut acc = Accumulator::new(primary.edges.n_bins(), input.propagates_errors(model));
    for (row, col, _, value) in input.pixels() {
        if !input.is_kept(row, col) || !within(orthogonal.limits, across[[row, col]]) {
            continue;
        }
        if let Some(bin) = primary.edges.index_of(values[[row, col]]) {
            acc.add(bin, value, input.variance_at(row, col, value, model), 1.0);
        }
    }
    Ok(acc.into_profile(primary.axis()))
}

/// Distributes each pixel's interval along `primary` over the bins it
/// overlaps. A pixel partly outside `orthogonal.limits` contributes the share
/// of its orthogonal interval that lies inside.
///
/// # Errors
/// Returns [`Error::InvalidConfig`] if either axis holds centre coordinates.
pub fn split_1d<T>(
    input: &ImageInput<'_, T>,
    primary: &Binned<'_>,
    orthogonal: &Binned<'_>,
    model: ErrorModel,
) -> Result<IntegrationResult>
where
    T: AsPrimitive<f64>,
{
    let (min, max) = ranges(primary.coords)?;
    let (across_min, across_max) = ranges(orthogonal.coords)?;
    let mut acc = Accumulator::new(primary.edges.n_bins(), input.propagates_errors(model));
    for (row, col, _, value) in input.pixels() {
        if !input.is_kept(row, col) {
            continue;
        }
        let Some(scale) = range_scale(
            orthogonal.limits,
            across_min[[row, col]],
            across_max[[row, col]],
        ) else {
            continue;
        };
        let variance = input.variance_at(row, col, value, model);
        primary
            .edges
            .for_each_overlap(min[[row, col]], max[[row, col]], |bin, fraction| {
                acc.add(bin, value, variance, fraction * scale);
            });
    }
    Ok(acc.into_profile(primary.axis()))
}

/// Bins each pixel centre into an `x` by `y` grid. With `record_lookup`, the
/// flat index of the last pixel landing in each cell is kept.
///
/// # Errors
/// Returns [`Error::InvalidConfig`] if either axis holds range coordinates.
pub fn non_split_2d<T>(
    input: &ImageInput<'_, T>,
    x: &Binned<'_>,
    y: &Binned<'_>,
    model: ErrorModel,
    record_lookup: bool,
) -> Result<IntegrationResult>
where
    T: AsPrimitive<f64>,
{
    let (x_values, y_values) = (centres(x.coords)?, centres(y.coords)?);
    let (nx, ny) = (x.edges.n_bins(), y.edges.n_bins());
    let mut acc = Accumulator::new(nx * ny, input.propagates_errors(model));
    let mut lookup = record_lookup.then(|| vec![-1i64; nx * ny]);
    for (row, col, flat, value) in input.pixels() {
        if !input.is_kept(row, col) {
            continue;
        }
        let (Some(ix), Some(iy)) = (
            x.edges.index_of(x_values[[row, col]]),
            y.edges.index_of(y_values[[row, col]]),
        ) else {
            continue;
        };
        let cell = iy * nx + ix;
        acc.add(cell, value, input.variance_at(row, col, value, model), 1.0);
        if let Some(lookup) = lookup.as_mut() {
            lookup[cell] = flat as i64;
        }
    }
    let lookup = lookup
        .map(|cells| {
            Array2::from_shape_vec((ny, nx), cells).map_err(|e| Error::InvalidConfig(e.to_string()))
        })
        .transpose()?;
    acc.into_map(x.axis(), y.axis(), lookup)
}

/// Shares each pixel's rectangular footprint in `(x, y)` between the cells
/// it overlaps, weighted by the product of per-axis overlap fractions.
///
/// # Errors
/// Returns [`Error::InvalidConfig`] if either axis holds centre coordinates.
pub fn split_2d<T>(
    input: &ImageInput<'_, T>,
    x: &Binned<'_>,
    y: &Binned<'_>,
    model: ErrorModel,
) -> Result<IntegrationResult>
where
    T: AsPrimitive<f64>,
{
    let (x_min, x_max) = ranges(x.coords)?;
    let (y_min, y_max) = ranges(y.coords)?;
    let nx = x.edges.n_bins();
    let mut acc = Accumulator::new(nx * y.edges.n_bins(), input.propagates_errors(model));
    let mut x_parts: Vec<(usize, f64)> = Vec::new();
    let mut y_parts: Vec<(usize, f64)> = Vec::new();
    for (row, col, _, value) in input.pixels() {
        if !input.is_kept(row, col) {
            continue;
        }
        x_parts.clear();
        x.edges
            .for_each_overlap(x_min[[row, col]], x_max[[row, col]], |bin, fraction| {
                x_parts.push((bin, fraction));
            });
        if x_parts.is_empty() {
            continue;
        }
        y_parts.clear();
        y.edges
            .for_each_overlap(y_min[[row, col]], y_max[[row, col]], |bin, fraction| {
                y_parts.push((bin, fraction));
            });
        let variance = input.variance_at(row, col, value, model);
        for &(iy, fy) in &y_parts {
            for &(ix, fx) in &x_parts {
                acc.add(iy * nx + ix, value, variance, fx * fy);
            }
        }
    }
    acc.into_map(x.axis(), y.axis(), None)
}

/// Runs the kernel chosen by `policy` against prepared coordinates.
///
/// The radial axis is the x axis unless `config.azimuthal_is_x` is set. For
/// 1D variants the other axis is integrated out within its configured range.
///
/// # Errors
/// Returns [`Error::InvalidConfig`] if the prepared coordinates do not match
/// the policy.
pub fn integrate_prepared<T>(
    policy: SplittingPolicy,
    prepared: &PreparedBins,
    input: &ImageInput<'_, T>,
    config: &IntegrationConfig,
) -> Result<IntegrationResult>
where
    T: AsPrimitive<f64>,
{
    let radial = Binned {
        coords: &prepared.radial,
        edges: &prepared.radial_edges,
        limits: prepared.radial_limits,
        kind: prepared.radial_kind,
    };
    let azimuthal = Binned {
        coords: &prepared.azimuthal,
        edges: &prepared.azimuthal_edges,
        limits: prepared.azimuthal_limits,
        kind: AxisKind::Azimuth,
    };
    let (x, y) = if config.azimuthal_is_x {
        (azimuthal, radial)
    } else {
        (radial, azimuthal)
    };

    let model = config.error_model;
    let mut result = match policy {
        SplittingPolicy::NonSplit1D => non_split_1d(input, &x, &y, model)?,
        SplittingPolicy::Split1D => split_1d(input, &x, &y, model)?,
        SplittingPolicy::NonSplit2D => non_split_2d(input, &x, &y, model, config.record_lookup)?,
        SplittingPolicy::Split2D => split_2d(input, &x, &y, model)?,
    };
    if config.sanitise {
        sanitise(&mut result);
    }
    log::debug!(
        "{policy:?}: total weight {:.3} over {} pixels",
        result.total_weight(),
        input.shape().0 * input.shape().1
    );
    Ok(result)
}

/// Replaces non-finite intensities and errors by zero.
pub fn sanitise(result: &mut IntegrationResult) {
    let clean = |v: &mut f64| {
        if !v.is_finite() {
            *v = 0.0;
        }
    };
    match result {
        IntegrationResult::Profile(profile) => {
            profile.intensity.iter_mut().for_each(clean);
            if let Some(error) = profile.error.as_mut() {
                error.iter_mut().for_each(clean);
            }
        }
        IntegrationResult::Map(map) => {
            map.intensity.iter_mut().for_each(clean);
            if let Some(error) = map.error.as_mut() {
                error.iter_mut().for_each(clean);
            }
        }
    }
}

impl Accumulator {
    fn into_profile(self, axis: Axis) -> IntegrationResult {
        let (intensity, error, histogram) = self.normalise().into_1d();
        IntegrationResult::Profile(Profile1D {
            axis,
            intensity,
            error,
            histogram,
        })
    }

    fn into_map(
        self,
        x_axis: Axis,
        y_axis: Axis,
        lookup: Option<Array2<i64>>,
    ) -> Result<IntegrationResult> {
        let shape = (y_axis.len(), x_axis.len());
        let (intensity, error, histogram) = self.normalise().into_2d(shape)?;
        Ok(IntegrationResult::Map(Map2D {
            x_axis,
            y_axis,
            intensity,
            error,
            histogram,
            lookup,
        }))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::bins::Scale;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn axis<'p>(coords: &'p CoordinateArray, edges: &'p BinEdges) -> Binned<'p> {
        Binned {
            coords,
            edges,
            limits: None,
            kind: AxisKind::Pixel,
        }
    }

    #[test]
    fn test_policy_from_config() {
        let config = IntegrationConfig::new();
        assert_eq!(SplittingPolicy::from_config(&config), SplittingPolicy::NonSplit1D);
        let config = config
            .with_pixel_splitting(true)
            .with_dimensions(Dimensions::Two);
        assert_eq!(SplittingPolicy::from_config(&config), SplittingPolicy::Split2D);
        assert!(SplittingPolicy::Split2D.splits());
    }

    #[test]
    fn test_non_split_1d_with_orthogonal_limits() {
        let image = array![[1.0, 2.0], [3.0, 4.0]];
        let radial = CoordinateArray::Centre(array![[0.5, 1.5], [0.5, 1.5]]);
        let azimuth = CoordinateArray::Centre(array![[10.0, 10.0], [50.0, 50.0]]);
        let edges = BinEdges::from_edge_range(0.0, 2.0, 2, Scale::Linear);
        let az_edges = BinEdges::from_edge_range(0.0, 60.0, 1, Scale::Linear);
        let mut across = axis(&azimuth, &az_edges);
        across.limits = Some([0.0, 20.0]);

        let input = ImageInput::new(image.view());
        let result = non_split_1d(&input, &axis(&radial, &edges), &across, ErrorModel::None)
            .unwrap()
            .into_profile()
            .unwrap();
        assert_eq!(result.histogram, array![1.0, 1.0]);
        assert_eq!(result.intensity, array![1.0, 2.0]);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_mask_excludes_pixels() {
        let image = array![[1.0, 100.0]];
        let mask = array![[true, false]];
        let radial = CoordinateArray::Centre(array![[0.5, 0.6]]);
        let azimuth = CoordinateArray::Centre(array![[0.0, 0.0]]);
        let edges = BinEdges::from_edge_range(0.0, 1.0, 1, Scale::Linear);
        let input = ImageInput::new(image.view()).with_mask(mask.view());
        let profile = non_split_1d(
            &input,
            &axis(&radial, &edges),
            &axis(&azimuth, &edges),
            ErrorModel::Poisson,
        )
        .unwrap()
        .into_profile()
        .unwrap();
        assert_abs_diff_eq!(profile.intensity[0], 1.0);
        assert_abs_diff_eq!(profile.error.unwrap()[0], 1.0);
    }

    #[test]
    fn test_split_1d_range_scale() {
        let image = array![[6.0]];
        let radial = CoordinateArray::Range {
            min: array![[0.5]],
            max: array![[1.5]],
        };
        let azimuth = CoordinateArray::Range {
            min: array![[0.0]],
            max: array![[40.0]],
        };
        let edges = BinEdges::from_edge_range(0.0, 2.0, 2, Scale::Linear);
        let az_edges = BinEdges::from_edge_range(0.0, 40.0, 1, Scale::Linear);
        let mut across = axis(&azimuth, &az_edges);
        across.limits = Some([0.0, 10.0]);

        let input = ImageInput::new(image.view());
        let profile = split_1d(&input, &axis(&radial, &edges), &across, ErrorModel::None)
            .unwrap()
            .into_profile()
            .unwrap();
        assert_abs_diff_eq!(profile.histogram[0], 0.125, epsilon = 1e-12);
        assert_abs_diff_eq!(profile.histogram[1], 0.125, epsilon = 1e-12);
        assert_abs_diff_eq!(profile.intensity[0], 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_non_split_2d_lookup_last_writer() {
        let image = array![[1.0, 2.0, 3.0]];
        let x = CoordinateArray::Centre(array![[0.2, 0.4, 1.5]]);
        let y = CoordinateArray::Centre(array![[0.5, 0.5, 0.5]]);
        let x_edges = BinEdges::from_edge_range(0.0, 2.0, 2, Scale::Linear);
        let y_edges = BinEdges::from_edge_range(0.0, 1.0, 1, Scale::Linear);
        let input = ImageInput::new(image.view());
        let map = non_split_2d(
            &input,
            &axis(&x, &x_edges),
            &axis(&y, &y_edges),
            ErrorModel::None,
            true,
        )
        .unwrap()
        .into_map()
        .unwrap();
        assert_eq!(map.intensity.dim(), (1, 2));
        assert_eq!(map.histogram, array![[2.0, 1.0]]);
        assert_eq!(map.intensity, array![[1.5, 3.0]]);
        assert_eq!(map.lookup, Some(array![[1, 2]]));
    }

    #[test]
    fn test_split_2d_area_weights() {
        let image = array![[4.0]];
        let x = CoordinateArray::Range {
            min: array![[0.5]],
            max: array![[1.5]],
        };
        let y = CoordinateArray::Range {
            min: array![[0.0]],
            max: array![[2.0]],
        };
        let edges = BinEdges::from_edge_range(0.0, 2.0, 2, Scale::Linear);
        let input = ImageInput::new(image.view());
        let map = split_2d(&input, &axis(&x, &edges), &axis(&y, &edges), ErrorModel::None)
            .unwrap()
            .into_map()
            .unwrap();
        assert_abs_diff_eq!(map.histogram.sum(), 1.0, epsilon = 1e-12);
        for weight in &map.histogram {
            assert_abs_diff_eq!(*weight, 0.25, epsilon = 1e-12);
        }
        for value in &map.intensity {
            assert_abs_diff_eq!(*value, 4.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_wrong_coordinates_rejected() {
        let image = array![[1.0]];
        let centre = CoordinateArray::Centre(array![[0.5]]);
        let edges = BinEdges::from_edge_range(0.0, 1.0, 1, Scale::Linear);
        let input = ImageInput::new(image.view());
        let result = split_1d(
            &input,
            &axis(&centre, &edges),
            &axis(&centre, &edges),
            ErrorModel::None,
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
