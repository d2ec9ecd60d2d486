//! # Scale calibration
//!
//! Converts pixel displacement into real-world distance using a single
//! coarse scalar derived from a user-supplied reference distance and an
//! assumed camera geometry. This is deliberately not a full photogrammetric
//! model.

use crate::prelude::v1::*;

/// Assumed camera tilt towards the road, in degrees.
pub const CAMERA_TILT_DEG: f32 = 30.0;

/// Assumed horizontal field of view, in degrees.
pub const FOV_HORIZONTAL_DEG: f32 = 60.0;

/// Pixel-to-metre calibration state for one video.
#[derive(Clone, Copy, Debug)]
pub struct Calibration {
    known_distance_m: f32,
    frame_width: usize,
    fps: f64,
    scale_m_per_px: f32,
}

impl Calibration {
    /// Create a calibration for a stream.
    ///
    /// # Arguments
    ///
    /// * `known_distance_m` - real-world width the frame is assumed to span.
    /// * `frame_width` - frame width in pixels.
    /// * `fps` - stream framerate.
    ///
    /// Fails on non-positive distance, framerate, or width. These are fatal
    /// before a pipeline may start.
    pub fn new(known_distance_m: f32, frame_width: usize, fps: f64) -> Result<Self> {
        ensure!(
            known_distance_m > 0.0,
            "known distance must be positive (got {known_distance_m})"
        );
        ensure!(fps > 0.0, "framerate must be positive (got {fps})");
        ensure!(frame_width > 0, "frame width must be positive");

        let mut calibration = Self {
            known_distance_m,
            frame_width,
            fps,
            scale_m_per_px: 0.0,
        };
        calibration.recompute_scale()?;

        Ok(calibration)
    }

    // Invariant: the derived scale stays strictly positive.
    fn recompute_scale(&mut self) -> Result<()> {
        let tilt = CAMERA_TILT_DEG.to_radians();
        let scale = self.known_distance_m / (self.frame_width as f32 * tilt.cos());

        ensure!(
            scale.is_finite() && scale > 0.0,
            "derived scale is not positive ({scale})"
        );

        log::debug!(
            "calibration scale: {scale} m/px ({}m over {}px)",
            self.known_distance_m,
            self.frame_width
        );

        self.scale_m_per_px = scale;
        Ok(())
    }

    /// Update the frame width, recomputing the scale.
    pub fn set_frame_width(&mut self, frame_width: usize) -> Result<()> {
        ensure!(frame_width > 0, "frame width must be positive");
        self.frame_width = frame_width;
        self.recompute_scale()
    }

    /// Update the reference distance, recomputing the scale.
    pub fn set_known_distance(&mut self, known_distance_m: f32) -> Result<()> {
        ensure!(
            known_distance_m > 0.0,
            "known distance must be positive (got {known_distance_m})"
        );
        self.known_distance_m = known_distance_m;
        self.recompute_scale()
    }

    /// Metres represented by one pixel of horizontal displacement.
    pub fn scale_m_per_px(&self) -> f32 {
        self.scale_m_per_px
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frame_width(&self) -> usize {
        self.frame_width
    }

    pub fn known_distance_m(&self) -> f32 {
        self.known_distance_m
    }

    /// Time between consecutive frames, in seconds.
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.fps
    }

    /// Distance from the camera to the image plane, in pixels, under the
    /// assumed horizontal field of view.
    pub fn viewing_distance_px(&self) -> f32 {
        self.frame_width as f32 / (2.0 * (FOV_HORIZONTAL_DEG.to_radians() / 2.0).tan())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn scale_shrinks_with_width() {
        let narrow = Calibration::new(10.0, 1280, 30.0).unwrap();
        let wide = Calibration::new(10.0, 2560, 30.0).unwrap();

        assert!(narrow.scale_m_per_px() > 0.0);
        assert_approx_eq!(wide.scale_m_per_px(), narrow.scale_m_per_px() / 2.0, 1e-6);
    }

    #[test]
    fn scale_formula() {
        let calibration = Calibration::new(10.0, 1000, 25.0).unwrap();
        let expected = 10.0 / (1000.0 * 30.0f32.to_radians().cos());
        assert_approx_eq!(calibration.scale_m_per_px(), expected, 1e-6);
        assert_approx_eq!(calibration.frame_interval() as f32, 0.04, 1e-6);
    }

    #[test]
    fn invalid_inputs_rejected() {
        assert!(Calibration::new(0.0, 1280, 30.0).is_err());
        assert!(Calibration::new(-1.0, 1280, 30.0).is_err());
        assert!(Calibration::new(10.0, 0, 30.0).is_err());
        assert!(Calibration::new(10.0, 1280, 0.0).is_err());

        let mut calibration = Calibration::new(10.0, 1280, 30.0).unwrap();
        assert!(calibration.set_known_distance(0.0).is_err());
        assert!(calibration.set_frame_width(0).is_err());
    }

    #[test]
    fn updates_recompute_scale() {
        let mut calibration = Calibration::new(10.0, 1280, 30.0).unwrap();
        let base = calibration.scale_m_per_px();

        calibration.set_known_distance(20.0).unwrap();
        assert_approx_eq!(calibration.scale_m_per_px(), base * 2.0, 1e-6);

        calibration.set_frame_width(640).unwrap();
        assert_approx_eq!(calibration.scale_m_per_px(), base * 4.0, 1e-6);
    }

    #[test]
    fn viewing_distance() {
        let calibration = Calibration::new(10.0, 1000, 30.0).unwrap();
        // width / (2 tan(30 deg))
        assert_approx_eq!(calibration.viewing_distance_px(), 866.0254, 0.01);
    }
}
