//! Memoised coordinate arrays and bin edges.
//!
//! Generating coordinate arrays costs a full pass over every pixel and its
//! corners, so results are kept per `(metadata, binning, shape)` and reused
//! while all three compare equal. Keys compare by value: mutating a detector
//! or the wavelength produces a different key and the stale entry is never
//! returned.

use crate::arrays::{
    azimuthal_array, azimuthal_range_arrays, radial_array, radial_range_arrays, CoordinateArray,
};
use crate::bins::{edges_for, BinEdges, Scale};
use parking_lot::Mutex;
use powderpix_core::{AxisKind, BinningKey, DiffractionMetadata, IntegrationConfig, Result};
use std::collections::VecDeque;
use std::sync::Arc;

const DEFAULT_AZIMUTHAL_BASE: f64 = -180.0;

/// Coordinate arrays and edges ready for integration.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedBins {
    /// Radial coordinates, in binning space.
    pub radial: CoordinateArray,
    /// Azimuthal coordinates in degrees.
    pub azimuthal: CoordinateArray,
    /// Radial edges.
    pub radial_edges: BinEdges,
    /// Azimuthal edges.
    pub azimuthal_edges: BinEdges,
    /// Configured radial range in binning space.
    pub radial_limits: Option<[f64; 2]>,
    /// Configured azimuthal range in degrees.
    pub azimuthal_limits: Option<[f64; 2]>,
    /// Meaning of the radial axis.
    pub radial_kind: AxisKind,
    /// Array shape `(rows, columns)`.
    pub shape: (usize, usize),
}

impl PreparedBins {
    /// Generates coordinate arrays and edges for `shape`.
    ///
    /// # Errors
    /// Fails if the beam centre cannot be located on the detector.
    pub fn build(
        metadata: &DiffractionMetadata,
        key: &BinningKey,
        shape: (usize, usize),
    ) -> Result<Self> {
        let beam_centre = metadata.detector.beam_centre_coords()?;
        let base = key
            .azimuthal_range
            .map_or(DEFAULT_AZIMUTHAL_BASE, |[min, _]| min);

        let (radial, azimuthal) = if key.pixel_splitting {
            let (min, max) = radial_range_arrays(metadata, shape, key.x_axis)?;
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
                CoordinateArray::Centre(radial_array(metadata, shape, key.x_axis)?),
                CoordinateArray::Centre(azimuthal_array(beam_centre, shape, base, false)),
            )
        };

        let scale = if key.log_radial {
            Scale::Log10
        } else {
            Scale::Linear
        };
        let radial = match scale {
            Scale::Log10 => radial.into_log10(),
            Scale::Linear => radial,
        };

        let centred = !key.pixel_splitting;
        let radial_edges = edges_for(&radial, key.radial_range, key.n_bins, scale, centred);
        let azimuthal_edges = edges_for(
            &azimuthal,
            key.azimuthal_range,
            key.n_azimuthal_bins,
            Scale::Linear,
            centred,
        );

        Ok(Self {
            radial,
            azimuthal,
            radial_edges,
            azimuthal_edges,
            radial_limits: key
                .radial_range
                .map(|[min, max]| [scale.forward(min), scale.forward(max)]),
            azimuthal_limits: key.azimuthal_range,
            radial_kind: AxisKind::from(key.x_axis),
            shape,
        })
    }
}

struct CacheEntry {
    metadata: DiffractionMetadata,
    key: BinningKey,
    shape: (usize, usize),
    bins: Arc<PreparedBins>,
}

#[derive(Default)]
struct CacheState {
    entries: VecDeque<CacheEntry>,
    hits: usize,
    misses: usize,
}

impl CacheState {
    fn find(
        &self,
        metadata: &DiffractionMetadata,
        key: &BinningKey,
        shape: (usize, usize),
    ) -> Option<Arc<PreparedBins>> {
        self.entries
            .iter()
            .find(|e| e.shape == shape && e.key == *key && e.metadata == *metadata)
            .map(|e| Arc::clone(&e.bins))
    }
}

/// Hit and miss counts of an [`IntegrationCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    /// Lookups answered from the cache.
    pub hits: usize,
    /// Lookups that generated new arrays.
    pub misses: usize,
    /// Entries currently held.
    pub entries: usize,
}

/// Thread-safe cache of [`PreparedBins`].
///
/// Lookups and insertions are serialised by one lock. Arrays are generated
/// outside it, so two threads missing on the same key at once may both build;
/// the first insertion wins and later callers receive that entry.
pub struct IntegrationCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl Default for IntegrationCache {
    fn default() -> Self {
        Self::new(8)
    }
}

impl IntegrationCache {
    /// Creates a cache holding up to `capacity` entries (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Returns the prepared bins for this calibration and configuration,
    /// generating them on a miss.
    ///
    /// # Errors
    /// Propagates failures from [`PreparedBins::build`].
    pub fn get_or_prepare(
        &self,
        metadata: &DiffractionMetadata,
        config: &IntegrationConfig,
        shape: (usize, usize),
    ) -> Result<Arc<PreparedBins>> {
        let key = config.binning_key();
        {
            let mut state = self.state.lock();
            if let Some(bins) = state.find(metadata, &key, shape) {
                state.hits += 1;
                log::debug!("integration cache hit for shape {shape:?}");
                return Ok(bins);
            }
            state.misses += 1;
        }

        // the lock must not be held here: generation runs rayon jobs and a
        // worker waiting on them may re-enter this cache
        log::debug!("integration cache miss for shape {shape:?}, generating arrays");
        let bins = Arc::new(PreparedBins::build(metadata, &key, shape)?);

        let mut state = self.state.lock();
        if let Some(existing) = state.find(metadata, &key, shape) {
            return Ok(existing);
        }
        if state.entries.len() == self.capacity {
            state.entries.pop_front();
        }
        state.entries.push_back(CacheEntry {
            metadata: metadata.clone(),
            key,
            shape,
            bins: Arc::clone(&bins),
        });
        Ok(bins)
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if no entries are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit and miss counts.
    #[must_use]
    pub fn statistics(&self) -> CacheStatistics {
        let state = self.state.lock();
        CacheStatistics {
            hits: state.hits,
            misses: state.misses,
            entries: state.entries.len(),
        }
    }
}
