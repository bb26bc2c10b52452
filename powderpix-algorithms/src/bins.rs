//! Bin edges and bin-centre axes.
//!
//! Edges are uniformly spaced in the binning space, which is the quantity
//! itself or its log10 for log-radial binning. Centres are reported in the
//! physical quantity.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use crate::arrays::CoordinateArray;
use ndarray::Array1;

/// Spacing of the bin edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scale {
    /// Edges uniform in the quantity.
    #[default]
    Linear,
    /// Edges uniform in log10 of the quantity.
    Log10,
}

impl Scale {
    /// Maps a physical value into binning space.
    #[must_use]
    pub fn forward(self, value: f64) -> f64 {
        match self {
            Self::Linear => value,
            Self::Log10 => value.log10(),
        }
    }

    /// Maps a binning-space value back to the physical quantity.
    #[must_use]
    pub fn inverse(self, value: f64) -> f64 {
        match self {
            Self::Linear => value,
            Self::Log10 => 10f64.powf(value),
        }
    }
}

/// Uniform bin edges with their bin-centre axis.
#[derive(Debug, Clone, PartialEq)]
pub struct BinEdges {
    /// `n + 1` increasing edges in binning space.
    edges: Array1<f64>,
    /// `n` bin centres in the physical quantity.
    centres: Array1<f64>,
    scale: Scale,
}

impl BinEdges {
    /// Edges for a range whose bounds are the first and last bin *centres*.
    ///
    /// The edges extend half a bin beyond each bound, so the returned axis
    /// is exactly `linspace(min, max, n)`. A single bin spans `[min, max]`.
    #[must_use]
    pub fn from_centre_range(min: f64, max: f64, n_bins: usize, scale: Scale) -> Self {
        let n_bins = n_bins.max(1);
        let (lo, hi) = (scale.forward(min), scale.forward(max));
        if n_bins == 1 {
            return Self::from_edges(Array1::from(vec![lo, hi]), scale);
        }
        let half = (hi - lo) / (2.0 * (n_bins - 1) as f64);
        let edges = Array1::linspace(lo - half, hi + half, n_bins + 1);
        let centres = Array1::linspace(lo, hi, n_bins).mapv_into(|v| scale.inverse(v));
        Self {
            edges,
            centres,
            scale,
        }
    }

    /// Edges for a range whose bounds are the outer bin *edges*.
    #[must_use]
    pub fn from_edge_range(min: f64, max: f64, n_bins: usize, scale: Scale) -> Self {
        let edges = Array1::linspace(scale.forward(min), scale.forward(max), n_bins.max(1) + 1);
        Self::from_edges(edges, scale)
    }

    /// Edges spanning `[min, max]` already expressed in binning space.
    #[must_use]
    pub fn spanning(min: f64, max: f64, n_bins: usize, scale: Scale) -> Self {
        Self::from_edges(Array1::linspace(min, max, n_bins.max(1) + 1), scale)
    }

    fn from_edges(edges: Array1<f64>, scale: Scale) -> Self {
        let centres = edges
            .windows(2)
            .into_iter()
            .map(|pair| scale.inverse(0.5 * (pair[0] + pair[1])))
            .collect();
        Self {
            edges,
            centres,
            scale,
        }
    }

    /// Edges in binning space.
    #[must_use]
    pub fn edges(&self) -> &Array1<f64> {
        &self.edges
    }

    /// Bin centres in the physical quantity.
    #[must_use]
    pub fn centres(&self) -> &Array1<f64> {
        &self.centres
    }

    /// Edge spacing.
    #[must_use]
    pub fn scale(&self) -> Scale {
        self.scale
    }

    /// Number of bins.
    #[must_use]
    pub fn n_bins(&self) -> usize {
        self.centres.len()
    }

    /// First edge.
    #[must_use]
    pub fn lo(&self) -> f64 {
        self.edges[0]
    }

    /// Last edge.
    #[must_use]
    pub fn hi(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Bin width in binning space.
    #[must_use]
    pub fn width(&self) -> f64 {
        (self.hi() - self.lo()) / self.n_bins() as f64
    }

    /// Returns true if all edges coincide.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        !(self.hi() > self.lo())
    }

    /// Bin holding `value`, or `None` outside `[lo, hi]`.
    ///
    /// A value on an interior edge belongs to the bin above it; the last
    /// edge belongs to the last bin. Degenerate edges put every in-range
    /// value into bin 0.
    #[must_use]
    pub fn index_of(&self, value: f64) -> Option<usize> {
        let (lo, hi) = (self.lo(), self.hi());
        if !(value >= lo && value <= hi) {
            return None;
        }
        if self.is_degenerate() {
            return Some(0);
        }
        let position = ((value - lo) / self.width()).floor() as usize;
        Some(position.min(self.n_bins() - 1))
    }

    /// Calls `visit(bin, fraction)` for every bin overlapped by `[min, max]`.
    ///
    /// `fraction` is the share of the interval inside the bin, so fractions
    /// sum to one for an interval lying wholly within the edges and to the
    /// retained share for one that is clipped. A zero-width interval counts
    /// fully in the bin holding it. Degenerate edges give bin 0 everything.
    pub fn for_each_overlap(&self, min: f64, max: f64, mut visit: impl FnMut(usize, f64)) {
        let (lo, hi) = (self.lo(), self.hi());
        if !(max >= lo && min <= hi) {
            return;
        }
        if self.is_degenerate() {
            visit(0, 1.0);
            return;
        }
        let n = self.n_bins() as f64;
        let width = self.width();
        let start = (min - lo) / width;
        let end = (max - lo) / width;
        let extent = end - start;
        if !(extent > 0.0) {
            if extent == 0.0 {
                visit(start.floor().clamp(0.0, n - 1.0) as usize, 1.0);
            }
            return;
        }
        let clipped_start = start.max(0.0);
        let clipped_end = end.min(n);
        let first = clipped_start.floor() as usize;
        let last = (clipped_end.ceil() as usize).min(self.n_bins());
        for bin in first..last {
            let b = bin as f64;
            let overlap = clipped_end.min(b + 1.0) - clipped_start.max(b);
            if overlap > 0.0 {
                visit(bin, overlap / extent);
            }
        }
    }
}

/// Derives edges for one axis of an integration.
///
/// With an explicit physical `range`, `centred` selects whether the bounds
/// are bin centres (non-split integration) or outer edges (split
/// integration). Without one, the edges span the finite values of `coords`,
/// which are already in binning space.
#[must_use]
pub fn edges_for(
    coords: &CoordinateArray,
    range: Option<[f64; 2]>,
    n_bins: usize,
    scale: Scale,
    centred: bool,
) -> BinEdges {
    match range {
        Some([min, max]) if centred => BinEdges::from_centre_range(min, max, n_bins, scale),
        Some([min, max]) => BinEdges::from_edge_range(min, max, n_bins, scale),
        None => {
            let (min, max) = coords.finite_bounds().unwrap_or_else(|| {
                log::warn!("no finite coordinates to derive bin edges from");
                (0.0, 0.0)
            });
            if min == max {
                log::warn!("degenerate bin range [{min}, {max}]");
            }
            BinEdges::spanning(min, max, n_bins, scale)
        }
    }
}
