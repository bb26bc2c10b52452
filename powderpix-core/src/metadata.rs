//! Beam environment and combined diffraction metadata.

use crate::error::{Error, Result};
use crate::geometry::DetectorGeometry;
use nalgebra::Vector3;
use std::f64::consts::PI;

/// Beam and exposure parameters of a measurement.
///
/// Only the wavelength takes part in integration; the remaining fields are
/// carried for callers that keep them alongside the image.
#[derive(Debug, Clone, PartialEq)]
pub struct CrystalEnvironment {
    /// Wavelength in Å.
    wavelength: f64,
    /// Exposure time in seconds.
    pub exposure_time: Option<f64>,
    /// Rotation angle at the start of the exposure, degrees.
    pub phi_start: f64,
    /// Rotation range covered during the exposure, degrees.
    pub phi_range: f64,
}

impl CrystalEnvironment {
    /// Creates an environment with the given wavelength in Å.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if the wavelength is not positive.
    pub fn new(wavelength: f64) -> Result<Self> {
        let mut environment = Self {
            wavelength: 1.0,
            exposure_time: None,
            phi_start: 0.0,
            phi_range: 0.0,
        };
        environment.set_wavelength(wavelength)?;
        Ok(environment)
    }

    /// Creates an environment from a photon energy in keV.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if the energy is not positive.
    pub fn from_energy_kev(energy: f64) -> Result<Self> {
        Self::new(HC_KEV_ANGSTROM / energy)
    }

    /// Wavelength in Å.
    #[must_use]
    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    /// Sets the wavelength in Å.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if the wavelength is not positive.
    pub fn set_wavelength(&mut self, wavelength: f64) -> Result<()> {
        if !(wavelength > 0.0 && wavelength.is_finite()) {
            return Err(Error::InvalidGeometry(format!(
                "wavelength must be positive, got {wavelength}"
            )));
        }
        self.wavelength = wavelength;
        Ok(())
    }
}

/// hc in keV·Å.
const HC_KEV_ANGSTROM: f64 = 12.398_419_843_320_026;

/// Detector geometry paired with the beam environment.
///
/// Equality compares every geometric and environmental field, which is what
/// the integration cache keys on: any mutation yields a different key.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffractionMetadata {
    /// Detector calibration.
    pub detector: DetectorGeometry,
    /// Beam environment.
    pub environment: CrystalEnvironment,
}

impl DiffractionMetadata {
    /// Pairs a detector with an environment.
    #[must_use]
    pub fn new(detector: DetectorGeometry, environment: CrystalEnvironment) -> Self {
        Self {
            detector,
            environment,
        }
    }

    /// Wavelength in Å.
    #[must_use]
    pub fn wavelength(&self) -> f64 {
        self.environment.wavelength()
    }

    /// Scattering vector (Å⁻¹) for a lab-frame position.
    #[must_use]
    pub fn q_vector(&self, position: &Vector3<f64>) -> Vector3<f64> {
        let k = 2.0 * PI / self.wavelength();
        let norm = position.norm();
        if norm == 0.0 {
            return Vector3::zeros();
        }
        (position / norm - self.detector.beam_vector()) * k
    }

    /// Scattering angle 2θ (radians) of a scattering vector; NaN beyond the
    /// Ewald limit.
    #[must_use]
    pub fn scattering_angle(&self, q: &Vector3<f64>) -> f64 {
        2.0 * (q.norm() * self.wavelength() / (4.0 * PI)).asin()
    }

    /// |Q| (Å⁻¹) at detector point `(x, y)` in pixel units.
    #[must_use]
    pub fn pixel_q(&self, x: f64, y: f64) -> f64 {
        self.q_vector(&self.detector.pixel_position(x, y)).norm()
    }

    /// Scattering angle 2θ in degrees at detector point `(x, y)`.
    #[must_use]
    pub fn pixel_two_theta(&self, x: f64, y: f64) -> f64 {
        self.detector.pixel_scattering_angle(x, y).to_degrees()
    }

    /// d-spacing (Å) at detector point `(x, y)`; infinite at the beam centre.
    #[must_use]
    pub fn pixel_d_spacing(&self, x: f64, y: f64) -> f64 {
        d_spacing_from_q(self.pixel_q(x, y))
    }

    /// Largest |Q| reached at any detector corner.
    #[must_use]
    pub fn max_q(&self) -> f64 {
        self.detector
            .corner_positions()
            .iter()
            .map(|p| self.q_vector(p).norm())
            .fold(0.0, f64::max)
    }
}

/// Scattering angle 2θ in degrees for |Q| at `wavelength`; NaN beyond the
/// Ewald limit.
#[must_use]
pub fn two_theta_from_q(q: f64, wavelength: f64) -> f64 {
    (2.0 * (q * wavelength / (4.0 * PI)).asin()).to_degrees()
}

/// |Q| for a scattering angle 2θ in degrees.
#[must_use]
pub fn q_from_two_theta(two_theta: f64, wavelength: f64) -> f64 {
    4.0 * PI * (two_theta.to_radians() / 2.0).sin() / wavelength
}

/// d-spacing for |Q|.
#[must_use]
pub fn d_spacing_from_q(q: f64) -> f64 {
    2.0 * PI / q
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn metadata() -> DiffractionMetadata {
        let detector =
            DetectorGeometry::from_beam_centre((200, 200), 0.2, (100.0, 100.0), 150.0).unwrap();
        DiffractionMetadata::new(detector, CrystalEnvironment::new(0.5).unwrap())
    }

    #[test]
    fn test_q_matches_bragg() {
        let md = metadata();
        let q = md.pixel_q(180.0, 100.0);
        let two_theta = md.pixel_two_theta(180.0, 100.0);
        assert_abs_diff_eq!(q, q_from_two_theta(two_theta, 0.5), epsilon = 1e-12);
        assert_abs_diff_eq!(two_theta_from_q(q, 0.5), two_theta, epsilon = 1e-9);
        assert_abs_diff_eq!(md.pixel_d_spacing(180.0, 100.0) * q, 2.0 * PI, epsilon = 1e-12);
    }

    #[test]
    fn test_scattering_angle_of_q_vector() {
        let md = metadata();
        for (x, y) in [(180.0, 100.0), (10.0, 35.0), (100.0, 100.0)] {
            let position = md.detector.pixel_position(x, y);
            let q = md.q_vector(&position);
            assert_abs_diff_eq!(
                md.scattering_angle(&q),
                md.detector.scattering_angle(&position),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_q_zero_at_beam_centre() {
        let md = metadata();
        assert_abs_diff_eq!(md.pixel_q(100.0, 100.0), 0.0, epsilon = 1e-12);
        assert!(md.pixel_d_spacing(100.0, 100.0).is_infinite());
    }

    #[test]
    fn test_max_q_at_corner() {
        let md = metadata();
        assert_abs_diff_eq!(md.max_q(), md.pixel_q(0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_energy_conversion() {
        let env = CrystalEnvironment::from_energy_kev(12.398_419_843_320_026).unwrap();
        assert_abs_diff_eq!(env.wavelength(), 1.0, epsilon = 1e-12);
        assert!(CrystalEnvironment::new(0.0).is_err());
    }

    #[test]
    fn test_equality_tracks_mutation() {
        let md = metadata();
        let mut other = md.clone();
        assert_eq!(md, other);
        other.environment.set_wavelength(0.6).unwrap();
        assert_ne!(md, other);
    }
}
