//! Image input and per-bin accumulation buffers.

use ndarray::{s, Array1, Array2, ArrayView2};
use num_traits::AsPrimitive;
use powderpix_core::{Error, ErrorModel, Result};

/// An image with its optional mask and per-pixel variance.
///
/// `false` in the mask excludes a pixel from every accumulation.
#[derive(Debug, Clone)]
pub struct ImageInput<'a, T> {
    image: ArrayView2<'a, T>,
    mask: Option<ArrayView2<'a, bool>>,
    variance: Option<ArrayView2<'a, f64>>,
}

impl<'a, T> ImageInput<'a, T>
where
    T: AsPrimitive<f64>,
{
    /// Wraps an image without mask or variance.
    #[must_use]
    pub fn new(image: ArrayView2<'a, T>) -> Self {
        Self {
            image,
            mask: None,
            variance: None,
        }
    }

    /// Attaches a mask.
    #[must_use]
    pub fn with_mask(mut self, mask: ArrayView2<'a, bool>) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Attaches an optional mask.
    #[must_use]
    pub fn with_optional_mask(mut self, mask: Option<ArrayView2<'a, bool>>) -> Self {
        self.mask = mask;
        self
    }

    /// Attaches per-pixel variances.
    #[must_use]
    pub fn with_variance(mut self, variance: ArrayView2<'a, f64>) -> Self {
        self.variance = Some(variance);
        self
    }

    /// Image shape `(rows, columns)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.image.dim()
    }

    /// The image.
    #[must_use]
    pub fn image(&self) -> &ArrayView2<'a, T> {
        &self.image
    }

    /// The mask, if any.
    #[must_use]
    pub fn mask(&self) -> Option<&ArrayView2<'a, bool>> {
        self.mask.as_ref()
    }

    /// Checks that mask and variance match the image.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] on the first array that differs.
    pub fn validate(&self) -> Result<()> {
        let expected = self.shape();
        let shapes = [
            self.mask.as_ref().map(ArrayView2::dim),
            self.variance.as_ref().map(ArrayView2::dim),
        ];
        for found in shapes.into_iter().flatten() {
            if found != expected {
                return Err(Error::ShapeMismatch { expected, found });
            }
        }
        Ok(())
    }

    /// Checks that coordinate arrays of `shape` cover the image.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if the shapes differ.
    pub fn check_shape(&self, shape: (usize, usize)) -> Result<()> {
        if shape == self.shape() {
            Ok(())
        } else {
            Err(Error::ShapeMismatch {
                expected: shape,
                found: self.shape(),
            })
        }
    }

    /// Restricts the input to its leading `(rows, columns)` region.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if `shape` exceeds the image.
    pub fn cropped(&self, shape: (usize, usize)) -> Result<Self> {
        let (rows, columns) = shape;
        let found = self.shape();
        if rows > found.0 || columns > found.1 {
            return Err(Error::ShapeMismatch {
                expected: shape,
                found,
            });
        }
        Ok(Self {
            image: self.image.clone().slice_move(s![..rows, ..columns]),
            mask: self
                .mask
                .as_ref()
                .map(|mask| mask.clone().slice_move(s![..rows, ..columns])),
            variance: self
                .variance
                .as_ref()
                .map(|variance| variance.clone().slice_move(s![..rows, ..columns])),
        })
    }

    /// Returns true if the pixel takes part in accumulation.
    #[inline]
    #[must_use]
    pub fn is_kept(&self, row: usize, col: usize) -> bool {
        self.mask.as_ref().map_or(true, |mask| mask[[row, col]])
    }

    /// Returns true if variances will be accumulated under `model`.
    #[must_use]
    pub fn propagates_errors(&self, model: ErrorModel) -> bool {
        self.variance.is_some() || model == ErrorModel::Poisson
    }

    /// Variance of the pixel, from the supplied array or the error model.
    #[inline]
    #[must_use]
    pub fn variance_at(&self, row: usize, col: usize, value: f64, model: ErrorModel) -> f64 {
        match (&self.variance, model) {
            (Some(variance), _) => variance[[row, col]],
            (None, ErrorModel::Poisson) => value.max(0.0),
            (None, ErrorModel::None) => 0.0,
        }
    }

    /// Iterates `(row, col, flat index, value)` in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, usize, f64)> + '_ {
        let columns = self.image.ncols();
        self.image
            .indexed_iter()
            .map(move |((row, col), &value)| (row, col, row * columns + col, value.as_()))
    }
}

/// Weighted sums per bin.
#[derive(Debug, Clone)]
pub(crate) struct Accumulator {
    sum: Vec<f64>,
    weight: Vec<f64>,
    variance: Option<Vec<f64>>,
}

/// Normalised accumulator contents.
#[derive(Debug, Clone)]
pub(crate) struct Normalised {
    pub intensity: Vec<f64>,
    pub error: Option<Vec<f64>>,
    pub histogram: Vec<f64>,
}

impl Accumulator {
    pub(crate) fn new(cells: usize, with_variance: bool) -> Self {
        Self {
            sum: vec![0.0; cells],
            weight: vec![0.0; cells],
            variance: with_variance.then(|| vec![0.0; cells]),
        }
    }

    #[inline]
    pub(crate) fn add(&mut self, cell: usize, value: f64, variance: f64, weight: f64) {
        self.sum[cell] += value * weight;
        self.weight[cell] += weight;
        if let Some(accumulated) = self.variance.as_mut() {
            accumulated[cell] += variance * weight;
        }
    }

    /// Divides sums by bin weight. The error is `sqrt(sum of variances) / weight`.
    /// Empty bins come out as NaN.
    pub(crate) fn normalise(self) -> Normalised {
        let intensity = self
            .sum
            .iter()
            .zip(&self.weight)
            .map(|(&sum, &weight)| sum / weight)
            .collect();
        let error = self.variance.map(|variance| {
            variance
                .iter()
                .zip(&self.weight)
                .map(|(&var, &weight)| var.sqrt() / weight)
                .collect()
        });
        Normalised {
            intensity,
            error,
            histogram: self.weight,
        }
    }
}

impl Normalised {
    pub(crate) fn into_1d(self) -> (Array1<f64>, Option<Array1<f64>>, Array1<f64>) {
        (
            Array1::from(self.intensity),
            self.error.map(Array1::from),
            Array1::from(self.histogram),
        )
    }

    pub(crate) fn into_2d(
        self,
        shape: (usize, usize),
    ) -> Result<(Array2<f64>, Option<Array2<f64>>, Array2<f64>)> {
        let reshape = |values: Vec<f64>| {
            Array2::from_shape_vec(shape, values).map_err(|e| Error::InvalidConfig(e.to_string()))
        };
        Ok((
            reshape(self.intensity)?,
            self.error.map(&reshape).transpose()?,
            reshape(self.histogram)?,
        ))
    }
}
