//! Outlier mask from per-bin median and median absolute deviation.
//!
//! Pixels are binned by their radial coordinate. Each bin's median and MAD
//! are taken over the kept, finite, non-zero pixel values in it. A pixel is
//! then flagged when its deviation from the median exceeds `scale * MAD` on
//! the chosen side. Zero-valued pixels do not contribute to the statistics
//! but are still tested.

use crate::accumulate::ImageInput;
use crate::arrays::{radial_array, CoordinateArray};
use crate::bins::{edges_for, BinEdges, Scale};
use ndarray::{Array2, ArrayView2};
use num_traits::AsPrimitive;
use powderpix_core::{DiffractionMetadata, Error, Result, XAxis};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which deviations count as outliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OutlierSide {
    /// Values below the median.
    Low,
    /// Values above the median.
    High,
    /// Either side.
    #[default]
    Both,
}

impl OutlierSide {
    fn exceeds(self, value: f64, median: f64, threshold: f64) -> bool {
        match self {
            Self::Low => median - value > threshold,
            Self::High => value - median > threshold,
            Self::Both => (value - median).abs() > threshold,
        }
    }
}

/// Outlier-rejection settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OutlierConfig {
    /// Multiple of the MAD beyond which a pixel is flagged.
    pub scale: f64,
    /// Side(s) tested.
    pub side: OutlierSide,
    /// Radial bins used for the statistics.
    pub n_bins: usize,
    /// Radial quantity to bin by.
    pub x_axis: XAxis,
    /// Radial range of bin centres; derived from the data if unset.
    pub radial_range: Option<[f64; 2]>,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            scale: 3.0,
            side: OutlierSide::Both,
            n_bins: 1000,
            x_axis: XAxis::Q,
            radial_range: None,
        }
    }
}

impl OutlierConfig {
    /// Sets the MAD multiple.
    #[must_use]
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Sets the tested side.
    #[must_use]
    pub fn with_side(mut self, side: OutlierSide) -> Self {
        self.side = side;
        self
    }

    /// Sets the number of radial bins.
    #[must_use]
    pub fn with_bins(mut self, n_bins: usize) -> Self {
        self.n_bins = n_bins;
        self
    }

    /// Sets the radial quantity.
    #[must_use]
    pub fn with_x_axis(mut self, x_axis: XAxis) -> Self {
        self.x_axis = x_axis;
        self
    }

    /// Restricts the radial range.
    #[must_use]
    pub fn with_radial_range(mut self, min: f64, max: f64) -> Self {
        self.radial_range = Some([min, max]);
        self
    }

    /// Checks the settings.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for a zero bin count, a negative or
    /// non-finite scale, or an inverted range.
    pub fn validate(&self) -> Result<()> {
        if self.n_bins == 0 {
            return Err(Error::InvalidConfig("n_bins must be positive".into()));
        }
        if !(self.scale.is_finite() && self.scale >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "outlier scale must be finite and non-negative, got {}",
                self.scale
            )));
        }
        if let Some([min, max]) = self.radial_range {
            if !(min <= max) {
                return Err(Error::InvalidConfig(format!(
                    "radial range [{min}, {max}] is inverted"
                )));
            }
        }
        Ok(())
    }
}

/// Median and MAD of one bin.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BinStatistics {
    median: f64,
    mad: f64,
}

fn median(values: &mut [f64]) -> Option<f64> {
    let len = values.len();
    if len == 0 {
        return None;
    }
    let mid = len / 2;
    let (lower, &mut upper, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    if len % 2 == 1 {
        return Some(upper);
    }
    let below = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(0.5 * (below + upper))
}

fn statistics(values: &mut [f64]) -> Option<BinStatistics> {
    let median = median(values)?;
    values.iter_mut().for_each(|v| *v = (*v - median).abs());
    let mad = self::median(values)?;
    Some(BinStatistics { median, mad })
}

/// Outlier mask from precomputed radial coordinates. `true` keeps a pixel.
///
/// Pixels masked in `input` stay `false`. Pixels outside every bin, and all
/// pixels of an empty bin, stay `true`.
///
/// # Errors
/// Returns [`Error::ShapeMismatch`] if `radial`, the mask or the variance
/// differ in shape from the image.
pub fn outlier_mask_from_radial<T>(
    input: &ImageInput<'_, T>,
    radial: ArrayView2<'_, f64>,
    edges: &BinEdges,
    scale: f64,
    side: OutlierSide,
) -> Result<Array2<bool>>
where
    T: AsPrimitive<f64>,
{
    input.validate()?;
    input.check_shape(radial.dim())?;

    let mut assigned: Vec<Option<usize>> = Vec::with_capacity(radial.len());
    let mut members: Vec<Vec<f64>> = vec![Vec::new(); edges.n_bins()];
    for (row, col, _, value) in input.pixels() {
        let bin = if input.is_kept(row, col) {
            edges.index_of(radial[[row, col]])
        } else {
            None
        };
        if let Some(bin) = bin {
            if value != 0.0 && value.is_finite() {
                members[bin].push(value);
            }
        }
        assigned.push(bin);
    }

    let stats: Vec<Option<BinStatistics>> = members
        .par_iter_mut()
        .map(|values| statistics(values))
        .collect();

    let mut mask = Array2::from_elem(input.shape(), true);
    let mut flagged = 0usize;
    for ((row, col, flat, value), bin) in input.pixels().zip(assigned) {
        if !input.is_kept(row, col) {
            mask[[row, col]] = false;
            continue;
        }
        let Some(BinStatistics { median, mad }) = bin.and_then(|bin| stats[bin]) else {
            continue;
        };
        if side.exceeds(value, median, scale * mad) {
            mask[[row, col]] = false;
            flagged += 1;
            log::trace!("pixel {flat} flagged: value {value}, median {median}, mad {mad}");
        }
    }
    log::debug!("outlier mask flagged {flagged} pixels");
    Ok(mask)
}

/// Outlier mask for an image under `metadata`. `true` keeps a pixel.
///
/// # Errors
/// - [`Error::InvalidConfig`] if `config` fails validation
/// - [`Error::ShapeMismatch`] if the mask or variance disagree with the image
/// - geometry errors raised while generating coordinates
pub fn outlier_mask<T>(
    input: &ImageInput<'_, T>,
    metadata: &DiffractionMetadata,
    config: &OutlierConfig,
) -> Result<Array2<bool>>
where
    T: AsPrimitive<f64>,
{
    config.validate()?;
    input.validate()?;
    let radial = CoordinateArray::Centre(radial_array(metadata, input.shape(), config.x_axis)?);
    let edges = edges_for(
        &radial,
        config.radial_range,
        config.n_bins,
        Scale::Linear,
        true,
    );
    let values = radial
        .centre()
        .ok_or_else(|| Error::InvalidConfig("pixel-centre coordinates required".into()))?;
    outlier_mask_from_radial(input, values.view(), &edges, config.scale, config.side)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use ndarray::array;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn test_mad() {
        let stats = statistics(&mut [1.0, 1.0, 2.0, 2.0, 4.0, 6.0, 9.0]).unwrap();
        assert_eq!(stats.median, 2.0);
        assert_eq!(stats.mad, 1.0);
    }

    #[test]
    fn test_sides() {
        let radial = array![[0.5, 0.5, 0.5, 0.5, 0.5]];
        let image = array![[10.0, 10.0, 10.0, 0.1, 1000.0]];
        let edges = BinEdges::from_edge_range(0.0, 1.0, 1, Scale::Linear);
        let input = ImageInput::new(image.view());

        let both = outlier_mask_from_radial(&input, radial.view(), &edges, 3.0, OutlierSide::Both)
            .unwrap();
        assert_eq!(both, array![[true, true, true, false, false]]);
        let high = outlier_mask_from_radial(&input, radial.view(), &edges, 3.0, OutlierSide::High)
            .unwrap();
        assert_eq!(high, array![[true, true, true, true, false]]);
        let low = outlier_mask_from_radial(&input, radial.view(), &edges, 3.0, OutlierSide::Low)
            .unwrap();
        assert_eq!(low, array![[true, true, true, false, true]]);
    }

    #[test]
    fn test_masked_and_unbinned_pixels() {
        let radial = array![[0.5, 0.5, 7.0]];
        let image = array![[1.0, 50.0, 1000.0]];
        let mask = array![[true, false, true]];
        let edges = BinEdges::from_edge_range(0.0, 1.0, 1, Scale::Linear);
        let input = ImageInput::new(image.view()).with_mask(mask.view());
        let result =
            outlier_mask_from_radial(&input, radial.view(), &edges, 3.0, OutlierSide::Both)
                .unwrap();
        assert_eq!(result, array![[true, false, true]]);
    }

    #[test]
    fn test_zero_values_tested_not_counted() {
        let radial = array![[0.5, 0.5, 0.5, 0.5]];
        let image = array![[0.0, 0.0, 0.0, 5.0]];
        let edges = BinEdges::from_edge_range(0.0, 1.0, 1, Scale::Linear);
        let input = ImageInput::new(image.view());
        let result =
            outlier_mask_from_radial(&input, radial.view(), &edges, 3.0, OutlierSide::Both)
                .unwrap();
        assert_eq!(result, array![[false, false, false, true]]);
    }

    #[test]
    fn test_radial_shape_checked() {
        let radial = Array2::<f64>::zeros((2, 2));
        let image = Array2::<f64>::zeros((3, 2));
        let edges = BinEdges::from_edge_range(0.0, 1.0, 1, Scale::Linear);
        let input = ImageInput::new(image.view());
        assert!(matches!(
            outlier_mask_from_radial(&input, radial.view(), &edges, 3.0, OutlierSide::Both),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(OutlierConfig::default().validate().is_ok());
        assert!(OutlierConfig::default().with_scale(-1.0).validate().is_err());
        assert!(OutlierConfig::default().with_bins(0).validate().is_err());
    }
}
