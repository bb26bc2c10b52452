//! Per-pixel radial and azimuthal coordinate arrays.
//!
//! Non-split integration samples each quantity at the pixel centre
//! `(x + 0.5, y + 0.5)`. Split integration evaluates the four pixel corners
//! and keeps the smallest and largest value, giving the interval of the
//! quantity the pixel covers. Corner grids are computed once with shape
//! `(rows + 1, columns + 1)` and shared by neighbouring pixels.
#![allow(clippy::cast_precision_loss)]

use ndarray::{Array2, Zip};
use powderpix_core::{two_theta_from_q, DiffractionMetadata, Result, XAxis};

const FULL_CIRCLE: f64 = 360.0;
const HALF_CIRCLE: f64 = 180.0;
// corners closer than this to the beam centre (in pixels) have no azimuth
const CENTRE_TOLERANCE: f64 = 1e-9;

/// Coordinates of every pixel in one quantity.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateArray {
    /// Value at each pixel centre.
    Centre(Array2<f64>),
    /// Interval `[min, max]` covered by each pixel.
    Range {
        /// Lower bound per pixel.
        min: Array2<f64>,
        /// Upper bound per pixel.
        max: Array2<f64>,
    },
}

impl CoordinateArray {
    /// Array shape `(rows, columns)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        let array = match self {
            Self::Centre(values) => values,
            Self::Range { min, .. } => min,
        };
        array.dim()
    }

    /// Centre values, if this is a centre array.
    #[must_use]
    pub fn centre(&self) -> Option<&Array2<f64>> {
        match self {
            Self::Centre(values) => Some(values),
            Self::Range { .. } => None,
        }
    }

    /// Interval bounds, if this is a range array.
    #[must_use]
    pub fn range(&self) -> Option<(&Array2<f64>, &Array2<f64>)> {
        match self {
            Self::Range { min, max } => Some((min, max)),
            Self::Centre(_) => None,
        }
    }

    /// Smallest and largest finite value, or `None` if there is none.
    #[must_use]
    pub fn finite_bounds(&self) -> Option<(f64, f64)> {
        match self {
            Self::Centre(values) => finite_bounds(values.iter()),
            Self::Range { min, max } => finite_bounds(min.iter().chain(max.iter())),
        }
    }

    /// Replaces every value by its log10; non-positive values become NaN so
    /// the pixels drop out of binning.
    #[must_use]
    pub fn into_log10(self) -> Self {
        let log = |v: f64| if v > 0.0 { v.log10() } else { f64::NAN };
        match self {
            Self::Centre(values) => Self::Centre(values.mapv_into(log)),
            Self::Range { min, max } => Self::Range {
                min: min.mapv_into(log),
                max: max.mapv_into(log),
            },
        }
    }
}

fn finite_bounds<'a>(values: impl Iterator<Item = &'a f64>) -> Option<(f64, f64)> {
    values
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Radial quantity at detector point `(x, y)`.
fn radial_value(
    metadata: &DiffractionMetadata,
    x_axis: XAxis,
    x: f64,
    y: f64,
    centre: (f64, f64),
) -> f64 {
    match x_axis {
        XAxis::Q => metadata.pixel_q(x, y),
        XAxis::Angle => two_theta_from_q(metadata.pixel_q(x, y), metadata.wavelength()),
        XAxis::Resolution => metadata.pixel_d_spacing(x, y),
        XAxis::Pixel => (x - centre.0).hypot(y - centre.1),
    }
}

fn beam_centre_for(metadata: &DiffractionMetadata, x_axis: XAxis) -> Result<(f64, f64)> {
    match x_axis {
        XAxis::Pixel => metadata.detector.beam_centre_coords(),
        _ => Ok((0.0, 0.0)),
    }
}

/// Radial quantity at every pixel centre.
///
/// # Errors
/// Returns [`powderpix_core::Error::NoIntersection`] for [`XAxis::Pixel`] when
/// the beam misses the detector.
pub fn radial_array(
    metadata: &DiffractionMetadata,
    shape: (usize, usize),
    x_axis: XAxis,
) -> Result<Array2<f64>> {
    let centre = beam_centre_for(metadata, x_axis)?;
    let mut values = Array2::zeros(shape);
    Zip::indexed(&mut values).par_for_each(|(row, col), value| {
        *value = radial_value(metadata, x_axis, col as f64 + 0.5, row as f64 + 0.5, centre);
    });
    Ok(values)
}

/// Smallest and largest radial quantity over each pixel's four corners.
///
/// 2θ is derived from the corner |Q| values; d-spacing is inversely
/// proportional to |Q| so its minimum comes from the largest |Q|.
///
/// # Errors
/// Returns [`powderpix_core::Error::NoIntersection`] for [`XAxis::Pixel`] when
/// the beam misses the detector.
pub fn radial_range_arrays(
    metadata: &DiffractionMetadata,
    shape: (usize, usize),
    x_axis: XAxis,
) -> Result<(Array2<f64>, Array2<f64>)> {
    let centre = beam_centre_for(metadata, x_axis)?;
    let corner_axis = match x_axis {
        XAxis::Pixel => XAxis::Pixel,
        _ => XAxis::Q,
    };
    let mut corners = Array2::zeros((shape.0 + 1, shape.1 + 1));
    Zip::indexed(&mut corners).par_for_each(|(row, col), value| {
        *value = radial_value(metadata, corner_axis, col as f64, row as f64, centre);
    });
    let (min, max) = corner_envelope(&corners, shape);

    let wavelength = metadata.wavelength();
    Ok(match x_axis {
        XAxis::Q | XAxis::Pixel => (min, max),
        XAxis::Angle => (
            min.mapv_into(|q| two_theta_from_q(q, wavelength)),
            max.mapv_into(|q| two_theta_from_q(q, wavelength)),
        ),
        XAxis::Resolution => (
            max.mapv_into(powderpix_core::d_spacing_from_q),
            min.mapv_into(powderpix_core::d_spacing_from_q),
        ),
    })
}

fn corner_envelope(corners: &Array2<f64>, shape: (usize, usize)) -> (Array2<f64>, Array2<f64>) {
    let mut min = Array2::zeros(shape);
    let mut max = Array2::zeros(shape);
    Zip::indexed(&mut min)
        .and(&mut max)
        .par_for_each(|(row, col), lo, hi| {
            let values = [
                corners[[row, col]],
                corners[[row, col + 1]],
                corners[[row + 1, col]],
                corners[[row + 1, col + 1]],
            ];
            *lo = values.iter().copied().fold(f64::INFINITY, f64::min);
            *hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        });
    (min, max)
}

/// Wraps an angle in degrees into `[base, base + 360)`.
#[must_use]
pub fn wrap_angle(angle: f64, base: f64) -> f64 {
    let wrapped = angle - FULL_CIRCLE * ((angle - base) / FULL_CIRCLE).floor();
    if wrapped >= base + FULL_CIRCLE {
        wrapped - FULL_CIRCLE
    } else {
        wrapped
    }
}

fn azimuth_degrees(x: f64, y: f64, centre: (f64, f64), base: f64) -> f64 {
    wrap_angle((y - centre.1).atan2(x - centre.0).to_degrees(), base)
}

fn to_unit(degrees: f64, radians: bool) -> f64 {
    if radians {
        degrees.to_radians()
    } else {
        degrees
    }
}

/// Azimuthal angle of every pixel centre about `beam_centre`.
///
/// Angles fall in `[base, base + 360)` degrees (or the radian equivalent when
/// `radians` is set, in which case `base` is also in radians). A base below
/// -180 or above 180 addresses later revolutions, e.g. `base = 180` maps the
/// circle onto `[180, 540)`.
#[must_use]
pub fn azimuthal_array(
    beam_centre: (f64, f64),
    shape: (usize, usize),
    base: f64,
    radians: bool,
) -> Array2<f64> {
    let base = if radians { base.to_degrees() } else { base };
    let mut values = Array2::zeros(shape);
    Zip::indexed(&mut values).par_for_each(|(row, col), value| {
        let angle = azimuth_degrees(col as f64 + 0.5, row as f64 + 0.5, beam_centre, base);
        *value = to_unit(angle, radians);
    });
    values
}

/// Smallest and largest azimuthal angle covered by each pixel.
///
/// Corner angles are wrapped into `[base, base + 360)`. A corner lying on the
/// beam centre has no azimuth and is left out of the envelope. A pixel whose
/// corners spread over more than 180° straddles the branch cut at `base`; it
/// is truncated to the side of the cut with more angular room and the whole
/// signal goes there. This is an approximation for the few pixels on the cut.
#[must_use]
pub fn azimuthal_range_arrays(
    beam_centre: (f64, f64),
    shape: (usize, usize),
    base: f64,
    radians: bool,
) -> (Array2<f64>, Array2<f64>) {
    let base = if radians { base.to_degrees() } else { base };
    let mut corners = Array2::zeros((shape.0 + 1, shape.1 + 1));
    Zip::indexed(&mut corners).par_for_each(|(row, col), value| {
        let (x, y) = (col as f64, row as f64);
        *value = if (x - beam_centre.0).hypot(y - beam_centre.1) < CENTRE_TOLERANCE {
            f64::NAN
        } else {
            azimuth_degrees(x, y, beam_centre, base)
        };
    });

    let mut min = Array2::zeros(shape);
    let mut max = Array2::zeros(shape);
    Zip::indexed(&mut min)
        .and(&mut max)
        .par_for_each(|(row, col), lo, hi| {
            let mut values = [0.0; 4];
            let mut count = 0;
            for corner in [
                corners[[row, col]],
                corners[[row, col + 1]],
                corners[[row + 1, col]],
                corners[[row + 1, col + 1]],
            ] {
                if !corner.is_nan() {
                    values[count] = corner;
                    count += 1;
                }
            }
            let values = &mut values[..count];
            values.sort_by(f64::total_cmp);
            let (a, b) = resolve_branch_cut(values, base);
            *lo = to_unit(a, radians);
            *hi = to_unit(b, radians);
        });
    (min, max)
}

/// Collapses sorted corner angles to one interval inside `[base, base + 360]`.
fn resolve_branch_cut(sorted: &[f64], base: f64) -> (f64, f64) {
    let last = sorted.len() - 1;
    if sorted[last] - sorted[0] <= HALF_CIRCLE {
        return (sorted[0], sorted[last]);
    }
    // the cut sits in the widest gap between consecutive corners
    let mut split = 0;
    for i in 1..last {
        if sorted[i + 1] - sorted[i] > sorted[split + 1] - sorted[split] {
            split = i;
        }
    }
    let above = base + FULL_CIRCLE - sorted[split + 1];
    let below = sorted[split] - base;
    if above >= below {
        (sorted[split + 1], base + FULL_CIRCLE)
    } else {
        (base, sorted[split])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use powderpix_core::{CrystalEnvironment, DetectorGeometry};

    fn metadata(centre: (f64, f64)) -> DiffractionMetadata {
        let detector = DetectorGeometry::from_beam_centre((20, 10), 0.1, centre, 100.0).unwrap();
        DiffractionMetadata::new(detector, CrystalEnvironment::new(1.0).unwrap())
    }

    #[test]
    fn test_pixel_radius_at_centres() {
        let md = metadata((10.0, 5.0));
        let radius = radial_array(&md, (10, 20), XAxis::Pixel).unwrap();
        assert_eq!(radius.dim(), (10, 20));
        assert_abs_diff_eq!(radius[[5, 10]], 0.5f64.hypot(0.5), epsilon = 1e-12);
        assert_abs_diff_eq!(radius[[5, 0]], 9.5f64.hypot(0.5), epsilon = 1e-12);
    }

    #[test]
    fn test_range_arrays_bracket_centres() {
        let md = metadata((7.3, 4.1));
        for axis in [XAxis::Q, XAxis::Angle, XAxis::Resolution, XAxis::Pixel] {
            let centre = radial_array(&md, (10, 20), axis).unwrap();
            let (min, max) = radial_range_arrays(&md, (10, 20), axis).unwrap();
            for ((idx, &c), (&lo, &hi)) in centre.indexed_iter().zip(min.iter().zip(max.iter())) {
                assert!(lo <= hi, "{axis:?} {idx:?}: {lo} > {hi}");
                if c.is_finite() && lo.is_finite() && hi.is_finite() {
                    assert!(lo <= c + 1e-12 && c <= hi + 1e-12, "{axis:?} {idx:?}");
                }
            }
        }
    }

    #[test]
    fn test_angle_follows_q() {
        let md = metadata((10.0, 5.0));
        let q = radial_array(&md, (10, 20), XAxis::Q).unwrap();
        let angle = radial_array(&md, (10, 20), XAxis::Angle).unwrap();
        let expected = md.pixel_two_theta(3.5, 2.5);
        assert_abs_diff_eq!(angle[[2, 3]], expected, epsilon = 1e-9);
        assert_abs_diff_eq!(angle[[2, 3]], two_theta_from_q(q[[2, 3]], 1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_wrap_angle() {
        assert_abs_diff_eq!(wrap_angle(190.0, -180.0), -170.0);
        assert_abs_diff_eq!(wrap_angle(-90.0, 0.0), 270.0);
        assert_abs_diff_eq!(wrap_angle(10.0, 180.0), 370.0);
        assert_abs_diff_eq!(wrap_angle(-180.0, -180.0), -180.0);
    }

    #[test]
    fn test_azimuth_quadrants() {
        let azimuth = azimuthal_array((2.0, 2.0), (4, 4), -180.0, false);
        // pixel right of centre, image row below centre
        assert_abs_diff_eq!(azimuth[[2, 3]], 0.5f64.atan2(1.5).to_degrees(), epsilon = 1e-12);
        assert!(azimuth[[0, 0]] < -90.0);
        let radians = azimuthal_array((2.0, 2.0), (4, 4), -std::f64::consts::PI, true);
        assert_abs_diff_eq!(radians[[0, 0]], azimuth[[0, 0]].to_radians(), epsilon = 1e-12);
    }

    #[test]
    fn test_branch_cut_pixel_is_truncated() {
        // the pixel left of the centre straddles +-180
        let (min, max) = azimuthal_range_arrays((2.0, 2.5), (4, 4), -180.0, false);
        let (lo, hi) = (min[[2, 0]], max[[2, 0]]);
        assert!(hi - lo <= 180.0);
        assert!(lo >= -180.0 && hi <= 180.0);
        // an ordinary pixel keeps its true span
        assert!(max[[3, 3]] - min[[3, 3]] < 90.0);
    }

    #[test]
    fn test_beam_centre_on_pixel_corner() {
        let (min, max) = azimuthal_range_arrays((2.0, 2.0), (4, 4), -180.0, false);
        assert!(min.iter().chain(max.iter()).all(|v| v.is_finite()));
        // the four pixels meeting at the centre each cover one quadrant
        for ((row, col), expected) in [
            ((1, 1), (-180.0, -90.0)),
            ((1, 2), (-90.0, 0.0)),
            ((2, 2), (0.0, 90.0)),
            ((2, 1), (90.0, 180.0)),
        ] {
            assert_abs_diff_eq!(min[[row, col]], expected.0, epsilon = 1e-9);
            assert_abs_diff_eq!(max[[row, col]], expected.1, epsilon = 1e-9);
        }
        let md = metadata((10.0, 5.0));
        let (qmin, _) = radial_range_arrays(&md, (10, 20), XAxis::Q).unwrap();
        assert_abs_diff_eq!(qmin[[5, 10]], 0.0, epsilon = 1e-12);
    }
}
