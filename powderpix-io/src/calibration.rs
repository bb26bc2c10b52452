//! JSON calibration and configuration files.
//!
//! A calibration file describes a detector by its beam centre rather than
//! by raw vectors:
//!
//! ```json
//! {
//!   "pixels": [2048, 2048],
//!   "pixel_size": 0.2,
//!   "beam_centre": [1024.5, 1010.0],
//!   "distance": 250.0,
//!   "wavelength": 0.4959,
//!   "tilt": { "yaw": 0.0, "pitch": 0.5, "roll": 30.0 }
//! }
//! ```
//!
//! `energy_kev` may replace `wavelength`.

use crate::{Error, Result};
use powderpix_core::{
    CrystalEnvironment, DetectorGeometry, DiffractionMetadata, IntegrationConfig,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Detector rotation in degrees about the beam-centre pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tilt {
    /// Rotation about the lab vertical axis.
    pub yaw: f64,
    /// Rotation about the lab horizontal axis.
    pub pitch: f64,
    /// Rotation about the beam.
    pub roll: f64,
}

impl Tilt {
    fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// On-disk detector calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationFile {
    /// Pixel counts `[columns, rows]`.
    pub pixels: [usize; 2],
    /// Square pixel size in mm.
    pub pixel_size: f64,
    /// Beam centre `[x, y]` in pixels.
    pub beam_centre: [f64; 2],
    /// Sample to beam-centre distance in mm.
    pub distance: f64,
    /// Wavelength in Å.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wavelength: Option<f64>,
    /// Photon energy in keV, used when no wavelength is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_kev: Option<f64>,
    /// Detector tilt.
    #[serde(default)]
    pub tilt: Tilt,
    /// Exposure time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure_time: Option<f64>,
}

impl CalibrationFile {
    /// Builds the detector geometry and beam environment.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] unless exactly one of `wavelength`
    /// and `energy_kev` is set, and core errors for invalid geometry.
    pub fn to_metadata(&self) -> Result<DiffractionMetadata> {
        let [columns, rows] = self.pixels;
        let [cx, cy] = self.beam_centre;
        let mut detector = DetectorGeometry::from_beam_centre(
            (columns, rows),
            self.pixel_size,
            (cx, cy),
            self.distance,
        )?;
        if !self.tilt.is_zero() {
            detector = detector.with_tilt(self.tilt.yaw, self.tilt.pitch, self.tilt.roll)?;
        }
        let mut environment = match (self.wavelength, self.energy_kev) {
            (Some(wavelength), None) => CrystalEnvironment::new(wavelength)?,
            (None, Some(energy)) => CrystalEnvironment::from_energy_kev(energy)?,
            (Some(_), Some(_)) => {
                return Err(Error::InvalidFormat(
                    "calibration gives both wavelength and energy_kev".to_string(),
                ))
            }
            (None, None) => {
                return Err(Error::InvalidFormat(
                    "calibration needs a wavelength or energy_kev".to_string(),
                ))
            }
        };
        environment.exposure_time = self.exposure_time;
        Ok(DiffractionMetadata::new(detector, environment))
    }
}

/// Reads a calibration file.
///
/// # Errors
/// Returns I/O and JSON errors.
pub fn load_calibration<P: AsRef<Path>>(path: P) -> Result<CalibrationFile> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Reads a calibration file and builds its metadata.
///
/// # Errors
/// See [`load_calibration`] and [`CalibrationFile::to_metadata`].
pub fn load_metadata<P: AsRef<Path>>(path: P) -> Result<DiffractionMetadata> {
    load_calibration(path)?.to_metadata()
}

/// Writes a calibration file as pretty-printed JSON.
///
/// # Errors
/// Returns I/O and JSON errors.
pub fn save_calibration<P: AsRef<Path>>(path: P, calibration: &CalibrationFile) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, calibration)?;
    writer.flush()?;
    Ok(())
}

/// Reads an integration configuration and validates it.
///
/// # Errors
/// Returns I/O and JSON errors, or [`Error::CoreError`] if validation fails.
pub fn load_integration_config<P: AsRef<Path>>(path: P) -> Result<IntegrationConfig> {
    let reader = BufReader::new(File::open(path)?);
    let config: IntegrationConfig = serde_json::from_reader(reader)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tempfile::NamedTempFile;

    fn calibration() -> CalibrationFile {
        CalibrationFile {
            pixels: [100, 80],
            pixel_size: 0.1,
            beam_centre: [50.0, 40.0],
            distance: 200.0,
            wavelength: Some(0.8),
            energy_kev: None,
            tilt: Tilt::default(),
            exposure_time: Some(2.0),
        }
    }

    #[test]
    fn test_metadata_from_calibration() {
        let md = calibration().to_metadata().unwrap();
        assert_eq!(md.detector.pixel_counts(), (100, 80));
        let (x, y) = md.detector.beam_centre_coords().unwrap();
        assert_abs_diff_eq!(x, 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(y, 40.0, epsilon = 1e-9);
        assert_abs_diff_eq!(md.wavelength(), 0.8);
        assert_eq!(md.environment.exposure_time, Some(2.0));
    }

    #[test]
    fn test_wavelength_or_energy_required() {
        let mut both = calibration();
        both.energy_kev = Some(15.0);
        assert!(matches!(both.to_metadata(), Err(Error::InvalidFormat(_))));

        let mut energy = calibration();
        energy.wavelength = None;
        energy.energy_kev = Some(12.398_419_843_320_026);
        assert_abs_diff_eq!(energy.to_metadata().unwrap().wavelength(), 1.0, epsilon = 1e-12);

        let mut neither = calibration();
        neither.wavelength = None;
        assert!(neither.to_metadata().is_err());
    }

    #[test]
    fn test_tilted_calibration_keeps_beam_centre() {
        let mut tilted = calibration();
        tilted.tilt = Tilt {
            yaw: 2.0,
            pitch: -1.0,
            roll: 45.0,
        };
        let md = tilted.to_metadata().unwrap();
        let (x, y) = md.detector.beam_centre_coords().unwrap();
        assert_abs_diff_eq!(x, 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(y, 40.0, epsilon = 1e-9);
        assert_ne!(md, calibration().to_metadata().unwrap());
    }

    #[test]
    fn test_save_and_load() {
        let file = NamedTempFile::new().unwrap();
        save_calibration(file.path(), &calibration()).unwrap();
        assert_eq!(load_calibration(file.path()).unwrap(), calibration());
    }

    #[test]
    fn test_parse_minimal_json() {
        let json = r#"{"pixels": [10, 10], "pixel_size": 0.2, "beam_centre": [5, 5],
                       "distance": 100, "energy_kev": 20}"#;
        let calibration: CalibrationFile = serde_json::from_str(json).unwrap();
        assert_eq!(calibration.tilt, Tilt::default());
        assert!(calibration.to_metadata().is_ok());

        let unknown = r#"{"pixels": [10, 10], "pixel_size": 0.2, "beam_centre": [5, 5],
                          "distance": 100, "wavelength": 1, "colour": "red"}"#;
        assert!(serde_json::from_str::<CalibrationFile>(unknown).is_err());
    }

    #[test]
    fn test_load_integration_config() {
        let file = NamedTempFile::new().unwrap();
        let config = IntegrationConfig::new().with_bins(250).with_pixel_splitting(true);
        std::fs::write(file.path(), serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(load_integration_config(file.path()).unwrap(), config);

        let invalid = IntegrationConfig::new().with_bins(0);
        std::fs::write(file.path(), serde_json::to_string(&invalid).unwrap()).unwrap();
        assert!(matches!(
            load_integration_config(file.path()),
            Err(Error::CoreError(_))
        ));
    }
}
