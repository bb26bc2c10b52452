//! High-level integration entry points that combine caching and the kernels.

use crate::accumulate::ImageInput;
use crate::cache::{IntegrationCache, PreparedBins};
use crate::integration::{integrate_prepared, SplittingPolicy};
use num_traits::AsPrimitive;
use powderpix_core::{DiffractionMetadata, Error, IntegrationConfig, IntegrationResult, Result};
use rayon::prelude::*;

/// Integrates images against a calibration, reusing coordinate arrays
/// between calls.
pub struct PixelIntegrator {
    config: IntegrationConfig,
    cache: IntegrationCache,
}

impl PixelIntegrator {
    /// Creates an integrator with a default-sized cache.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `config` fails validation.
    pub fn new(config: IntegrationConfig) -> Result<Self> {
        Self::with_cache(config, IntegrationCache::default())
    }

    /// Creates an integrator around an existing cache.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `config` fails validation.
    pub fn with_cache(config: IntegrationConfig, cache: IntegrationCache) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, cache })
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    /// The coordinate cache.
    #[must_use]
    pub fn cache(&self) -> &IntegrationCache {
        &self.cache
    }

    /// Integrates one image.
    ///
    /// # Errors
    /// - [`Error::MissingGeometry`] if `metadata` is `None`
    /// - [`Error::ShapeMismatch`] if the mask, variance or shape override
    ///   disagree with the image
    /// - geometry errors raised while generating coordinates
    pub fn integrate<T>(
        &self,
        input: &ImageInput<'_, T>,
        metadata: Option<&DiffractionMetadata>,
    ) -> Result<IntegrationResult>
    where
        T: AsPrimitive<f64>,
    {
        let metadata = metadata.ok_or(Error::MissingGeometry)?;
        let input = prepare_input(input, &self.config)?;
        let prepared = self
            .cache
            .get_or_prepare(metadata, &self.config, input.shape())?;
        integrate_prepared(
            SplittingPolicy::from_config(&self.config),
            &prepared,
            &input,
            &self.config,
        )
    }

    /// Integrates several images in parallel against one calibration.
    ///
    /// Results keep the input order. The first failure aborts the batch.
    ///
    /// # Errors
    /// See [`PixelIntegrator::integrate`].
    pub fn integrate_batch<T>(
        &self,
        inputs: &[ImageInput<'_, T>],
        metadata: Option<&DiffractionMetadata>,
    ) -> Result<Vec<IntegrationResult>>
    where
        T: AsPrimitive<f64> + Sync,
    {
        inputs
            .par_iter()
            .map(|input| self.integrate(input, metadata))
            .collect()
    }
}

fn prepare_input<'a, T>(
    input: &ImageInput<'a, T>,
    config: &IntegrationConfig,
) -> Result<ImageInput<'a, T>>
where
    T: AsPrimitive<f64>,
{
    input.validate()?;
    input.cropped(config.shape.unwrap_or_else(|| input.shape()))
}

/// Integrates one image without caching.
///
/// # Errors
/// See [`PixelIntegrator::integrate`]; also fails if `config` is invalid.
pub fn integrate<T>(
    input: &ImageInput<'_, T>,
    metadata: Option<&DiffractionMetadata>,
    config: &IntegrationConfig,
) -> Result<IntegrationResult>
where
    T: AsPrimitive<f64>,
{
    config.validate()?;
    let metadata = metadata.ok_or(Error::MissingGeometry)?;
    let input = prepare_input(input, config)?;
    let prepared = PreparedBins::build(metadata, &config.binning_key(), input.shape())?;
    integrate_prepared(SplittingPolicy::from_config(config), &prepared, &input, config)
}
