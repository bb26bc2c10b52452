//! Detector geometry: where each pixel sits in the laboratory frame.
//!
//! The laboratory frame has the sample at the origin and the incident beam
//! travelling along `beam` (normally +z). The detector frame has its origin at
//! the outer corner of pixel (0, 0), +x along image columns and +y along image
//! rows, so pixel `(x, y)` with integer coordinates is a pixel corner and
//! `(x + 0.5, y + 0.5)` is a pixel centre.
#![allow(
    clippy::cast_precision_loss,
    clippy::many_single_char_names,
    clippy::neg_cmp_op_on_partial_ord
)]

use crate::error::{Error, Result};
use nalgebra::{Matrix3, Rotation3, Vector3};

const ORTHOGONALITY_TOLERANCE: f64 = 1e-6;
const PARALLEL_TOLERANCE: f64 = 1e-12;

/// Calibrated model of a flat area detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorGeometry {
    /// Lab-frame position of the outer corner of pixel (0, 0), in mm.
    origin: Vector3<f64>,
    /// Rotation taking detector-frame vectors to the lab frame.
    orientation: Matrix3<f64>,
    /// Unit vector of the incident beam.
    beam: Vector3<f64>,
    /// Pixel count along x (columns).
    px: usize,
    /// Pixel count along y (rows).
    py: usize,
    /// Horizontal pixel size in mm.
    h_pixel_size: f64,
    /// Vertical pixel size in mm.
    v_pixel_size: f64,
}

impl DetectorGeometry {
    /// Creates a detector from its full set of parameters.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if the orientation is not orthogonal,
    /// the beam vector is not unit length, or a size or count is not positive.
    pub fn new(
        origin: Vector3<f64>,
        orientation: Matrix3<f64>,
        beam: Vector3<f64>,
        (px, py): (usize, usize),
        (h_pixel_size, v_pixel_size): (f64, f64),
    ) -> Result<Self> {
        let geometry = Self {
            origin,
            orientation,
            beam,
            px,
            py,
            h_pixel_size,
            v_pixel_size,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Creates a detector normal to a +z beam with the given beam centre
    /// (in pixel coordinates) at `distance` mm from the sample.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] for non-positive sizes or distance.
    pub fn from_beam_centre(
        (px, py): (usize, usize),
        pixel_size: f64,
        (cx, cy): (f64, f64),
        distance: f64,
    ) -> Result<Self> {
        if !(distance > 0.0) {
            return Err(Error::InvalidGeometry(format!(
                "distance must be positive, got {distance}"
            )));
        }
        Self::new(
            Vector3::new(-cx * pixel_size, -cy * pixel_size, distance),
            Matrix3::identity(),
            Vector3::z(),
            (px, py),
            (pixel_size, pixel_size),
        )
    }

    /// Rotates the detector about its beam-centre pixel.
    ///
    /// Angles are in degrees: `yaw` about the lab vertical (y) axis, `pitch`
    /// about the lab horizontal (x) axis and `roll` about the beam axis. The
    /// beam-centre pixel and the sample to beam-centre distance are preserved.
    ///
    /// # Errors
    /// Returns [`Error::NoIntersection`] if the beam does not hit the detector
    /// before or after the rotation.
    pub fn with_tilt(mut self, yaw: f64, pitch: f64, roll: f64) -> Result<Self> {
        let centre = self.beam_centre_coords()?;
        let distance = self.distance_to_beam_centre()?;
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), roll.to_radians())
            * Rotation3::from_axis_angle(&Vector3::y_axis(), yaw.to_radians())
            * Rotation3::from_axis_angle(&Vector3::x_axis(), pitch.to_radians());
        self.orientation = rotation.matrix() * self.orientation;
        self.place_beam_centre(centre, distance)?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.px == 0 || self.py == 0 {
            return Err(Error::InvalidGeometry(format!(
                "pixel counts must be positive, got {}x{}",
                self.px, self.py
            )));
        }
        if !(self.h_pixel_size > 0.0 && self.v_pixel_size > 0.0) {
            return Err(Error::InvalidGeometry(format!(
                "pixel sizes must be positive, got {}x{}",
                self.h_pixel_size, self.v_pixel_size
            )));
        }
        let deviation = (self.orientation.transpose() * self.orientation - Matrix3::identity())
            .abs()
            .max();
        if !(deviation < ORTHOGONALITY_TOLERANCE) {
            return Err(Error::InvalidGeometry(
                "orientation matrix is not orthogonal".to_string(),
            ));
        }
        if !((self.beam.norm() - 1.0).abs() < ORTHOGONALITY_TOLERANCE) {
            return Err(Error::InvalidGeometry(
                "beam vector is not unit length".to_string(),
            ));
        }
        if !self.origin.iter().all(|v| v.is_finite()) {
            return Err(Error::InvalidGeometry("origin is not finite".to_string()));
        }
        Ok(())
    }

    /// Lab-frame position of the outer corner of pixel (0, 0), in mm.
    #[must_use]
    pub fn origin(&self) -> &Vector3<f64> {
        &self.origin
    }

    /// Detector to lab rotation.
    #[must_use]
    pub fn orientation(&self) -> &Matrix3<f64> {
        &self.orientation
    }

    /// Unit vector of the incident beam.
    #[must_use]
    pub fn beam_vector(&self) -> &Vector3<f64> {
        &self.beam
    }

    /// Pixel counts as `(px, py)`.
    #[must_use]
    pub fn pixel_counts(&self) -> (usize, usize) {
        (self.px, self.py)
    }

    /// Array shape `(rows, columns)` of an image from this detector.
    #[must_use]
    pub fn image_shape(&self) -> (usize, usize) {
        (self.py, self.px)
    }

    /// Pixel sizes as `(horizontal, vertical)` in mm.
    #[must_use]
    pub fn pixel_size(&self) -> (f64, f64) {
        (self.h_pixel_size, self.v_pixel_size)
    }

    /// Unit normal of the detector plane in the lab frame.
    #[must_use]
    pub fn normal(&self) -> Vector3<f64> {
        self.orientation * Vector3::z()
    }

    /// Sets the origin.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if the origin is not finite.
    pub fn set_origin(&mut self, origin: Vector3<f64>) -> Result<()> {
        let previous = std::mem::replace(&mut self.origin, origin);
        self.validate().inspect_err(|_| self.origin = previous)
    }

    /// Sets the orientation matrix.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if the matrix is not orthogonal.
    pub fn set_orientation(&mut self, orientation: Matrix3<f64>) -> Result<()> {
        let previous = std::mem::replace(&mut self.orientation, orientation);
        self.validate().inspect_err(|_| self.orientation = previous)
    }

    /// Sets the beam vector.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if the vector is not unit length.
    pub fn set_beam_vector(&mut self, beam: Vector3<f64>) -> Result<()> {
        let previous = std::mem::replace(&mut self.beam, beam);
        self.validate().inspect_err(|_| self.beam = previous)
    }

    /// Sets the pixel sizes in mm.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if a size is not positive.
    pub fn set_pixel_size(&mut self, h_pixel_size: f64, v_pixel_size: f64) -> Result<()> {
        let previous = (self.h_pixel_size, self.v_pixel_size);
        self.h_pixel_size = h_pixel_size;
        self.v_pixel_size = v_pixel_size;
        self.validate().inspect_err(|_| {
            (self.h_pixel_size, self.v_pixel_size) = previous;
        })
    }

    /// Moves the detector in its own plane so the beam hits pixel `(x, y)`.
    ///
    /// # Errors
    /// Returns [`Error::NoIntersection`] if the beam misses the detector plane.
    pub fn set_beam_centre(&mut self, x: f64, y: f64) -> Result<()> {
        let distance = self.distance_to_beam_centre()?;
        self.place_beam_centre((x, y), distance)
    }

    /// Moves the detector along the beam, keeping its beam-centre pixel.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if `distance` is not positive, or
    /// [`Error::NoIntersection`] if the beam misses the detector plane.
    pub fn set_distance(&mut self, distance: f64) -> Result<()> {
        if !(distance > 0.0) {
            return Err(Error::InvalidGeometry(format!(
                "distance must be positive, got {distance}"
            )));
        }
        let centre = self.beam_centre_coords()?;
        self.place_beam_centre(centre, distance)
    }

    fn place_beam_centre(&mut self, (x, y): (f64, f64), distance: f64) -> Result<()> {
        let local = Vector3::new(x * self.h_pixel_size, y * self.v_pixel_size, 0.0);
        self.set_origin(self.beam * distance - self.orientation * local)
    }

    /// Lab-frame position of detector point `(x, y)` given in pixel units.
    #[must_use]
    pub fn pixel_position(&self, x: f64, y: f64) -> Vector3<f64> {
        let local = Vector3::new(x * self.h_pixel_size, y * self.v_pixel_size, 0.0);
        self.origin + self.orientation * local
    }

    /// Pixel coordinates where the ray from the sample through `position`
    /// meets the detector plane.
    ///
    /// # Errors
    /// Returns [`Error::NoIntersection`] if the ray is parallel to the plane
    /// or points away from it.
    pub fn pixel_coords(&self, position: &Vector3<f64>) -> Result<(f64, f64)> {
        let t = self.ray_parameter(position)?;
        let local = self.orientation.transpose() * (position * t - self.origin);
        Ok((local.x / self.h_pixel_size, local.y / self.v_pixel_size))
    }

    fn ray_parameter(&self, direction: &Vector3<f64>) -> Result<f64> {
        let normal = self.normal();
        let denominator = normal.dot(direction);
        if denominator.abs() < PARALLEL_TOLERANCE {
            return Err(Error::NoIntersection(
                "direction is parallel to the detector plane".to_string(),
            ));
        }
        let t = normal.dot(&self.origin) / denominator;
        if !(t > 0.0) {
            return Err(Error::NoIntersection(
                "detector plane lies behind the direction".to_string(),
            ));
        }
        Ok(t)
    }

    /// Pixel coordinates of the direct beam on the detector.
    ///
    /// # Errors
    /// Returns [`Error::NoIntersection`] if the beam misses the detector plane.
    pub fn beam_centre_coords(&self) -> Result<(f64, f64)> {
        self.pixel_coords(&self.beam)
    }

    /// Sample to beam-centre distance in mm.
    ///
    /// # Errors
    /// Returns [`Error::NoIntersection`] if the beam misses the detector plane.
    pub fn distance_to_beam_centre(&self) -> Result<f64> {
        self.ray_parameter(&self.beam).map(|t| t * self.beam.norm())
    }

    /// Scattering angle 2θ (radians) of a lab-frame position.
    #[must_use]
    pub fn scattering_angle(&self, position: &Vector3<f64>) -> f64 {
        let norm = position.norm();
        if norm == 0.0 {
            return 0.0;
        }
        (self.beam.dot(position) / norm).clamp(-1.0, 1.0).acos()
    }

    /// Scattering angle 2θ (radians) at detector point `(x, y)`.
    #[must_use]
    pub fn pixel_scattering_angle(&self, x: f64, y: f64) -> f64 {
        self.scattering_angle(&self.pixel_position(x, y))
    }

    /// Distance in pixels from the beam centre to detector point `(x, y)`.
    ///
    /// # Errors
    /// Returns [`Error::NoIntersection`] if the beam misses the detector plane.
    pub fn pixel_radius(&self, x: f64, y: f64) -> Result<f64> {
        let (cx, cy) = self.beam_centre_coords()?;
        Ok((x - cx).hypot(y - cy))
    }

    /// Azimuthal angle in degrees, in `(-180, 180]`, of detector point
    /// `(x, y)` about the beam centre. Zero points along +x.
    ///
    /// # Errors
    /// Returns [`Error::NoIntersection`] if the beam misses the detector plane.
    pub fn pixel_azimuth(&self, x: f64, y: f64) -> Result<f64> {
        let (cx, cy) = self.beam_centre_coords()?;
        Ok((y - cy).atan2(x - cx).to_degrees())
    }

    /// Lab positions of the four outer detector corners.
    #[must_use]
    pub fn corner_positions(&self) -> [Vector3<f64>; 4] {
        let (w, h) = (self.px as f64, self.py as f64);
        [
            self.pixel_position(0.0, 0.0),
            self.pixel_position(w, 0.0),
            self.pixel_position(0.0, h),
            self.pixel_position(w, h),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square_detector() -> DetectorGeometry {
        DetectorGeometry::from_beam_centre((100, 80), 0.1, (50.0, 40.0), 200.0).unwrap()
    }

    #[test]
    fn test_beam_centre_round_trip() {
        let geometry = square_detector();
        let (x, y) = geometry.beam_centre_coords().unwrap();
        assert_abs_diff_eq!(x, 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(y, 40.0, epsilon = 1e-9);
        assert_abs_diff_eq!(geometry.distance_to_beam_centre().unwrap(), 200.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pixel_position_and_back() {
        let geometry = square_detector();
        let position = geometry.pixel_position(12.5, 70.25);
        assert_abs_diff_eq!(position.z, 200.0, epsilon = 1e-9);
        let (x, y) = geometry.pixel_coords(&position).unwrap();
        assert_abs_diff_eq!(x, 12.5, epsilon = 1e-9);
        assert_abs_diff_eq!(y, 70.25, epsilon = 1e-9);
    }

    #[test]
    fn test_scattering_angle_at_known_offset() {
        let geometry = square_detector();
        // 20 mm off axis at 200 mm
        let two_theta = geometry.pixel_scattering_angle(250.0, 40.0);
        assert_abs_diff_eq!(two_theta, (20.0f64 / 200.0).atan(), epsilon = 1e-12);
        assert_abs_diff_eq!(geometry.pixel_scattering_angle(50.0, 40.0), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pixel_radius_and_azimuth() {
        let geometry = square_detector();
        assert_abs_diff_eq!(geometry.pixel_radius(53.0, 44.0).unwrap(), 5.0, epsilon = 1e-9);
        assert_abs_diff_eq!(geometry.pixel_azimuth(60.0, 40.0).unwrap(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(geometry.pixel_azimuth(50.0, 50.0).unwrap(), 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(geometry.pixel_azimuth(40.0, 40.0).unwrap(), 180.0, epsilon = 1e-9);
    }

    #[test]
    fn test_tilt_preserves_beam_centre() {
        let geometry = square_detector().with_tilt(10.0, -5.0, 30.0).unwrap();
        let (x, y) = geometry.beam_centre_coords().unwrap();
        assert_abs_diff_eq!(x, 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(y, 40.0, epsilon = 1e-9);
        assert_abs_diff_eq!(geometry.distance_to_beam_centre().unwrap(), 200.0, epsilon = 1e-9);
        assert!((geometry.normal() - Vector3::z()).norm() > 1e-3);
    }

    #[test]
    fn test_parallel_beam_has_no_intersection() {
        let mut geometry = square_detector();
        geometry.set_beam_vector(Vector3::x()).unwrap();
        assert!(matches!(
            geometry.beam_centre_coords(),
            Err(Error::NoIntersection(_))
        ));
    }

    #[test]
    fn test_invalid_orientation_rejected() {
        let mut geometry = square_detector();
        let skew = Matrix3::new(1.0, 0.5, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        assert!(geometry.set_orientation(skew).is_err());
        assert_eq!(geometry.orientation(), &Matrix3::identity());
    }

    #[test]
    fn test_setters_change_equality() {
        let original = square_detector();
        let mut moved = original.clone();
        moved.set_beam_centre(51.0, 40.0).unwrap();
        assert_ne!(original, moved);
        assert_abs_diff_eq!(moved.beam_centre_coords().unwrap().0, 51.0, epsilon = 1e-9);

        let mut further = original.clone();
        further.set_distance(300.0).unwrap();
        assert_abs_diff_eq!(further.distance_to_beam_centre().unwrap(), 300.0, epsilon = 1e-9);
        assert_abs_diff_eq!(further.beam_centre_coords().unwrap().1, 40.0, epsilon = 1e-9);
    }
}
