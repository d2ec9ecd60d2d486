//! Motion detection primitives

use nalgebra as na;

/// Axis-aligned bounding box of one connected region of motion.
///
/// A blob is valid for exactly one frame. Correlating blobs across frames is
/// the tracker's job, never the extractor's.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MotionBlob {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl MotionBlob {
    /// Center point of the bounding box.
    pub fn center(&self) -> na::Point2<f32> {
        na::Point2::new(
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    /// Area of the bounding box.
    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn center_and_area() {
        let blob = MotionBlob {
            x: 10,
            y: 20,
            width: 4,
            height: 6,
        };
        let center = blob.center();
        assert_approx_eq!(center.x, 12.0, 1e-6);
        assert_approx_eq!(center.y, 23.0, 1e-6);
        assert_eq!(blob.area(), 24);
    }
}
