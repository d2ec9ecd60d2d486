//! # Frame decoding and sourcing

use crate::prelude::v1::*;
use bytemuck::{Pod, Zeroable};

/// RGBA colour structure.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct RGBA {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl RGBA {
    /// Convert from a slice containing `[r, g, b]` elements.
    pub fn from_rgb_slice(rgb: &[u8]) -> Self {
        Self {
            r: rgb[0],
            g: rgb[1],
            b: rgb[2],
            a: 255,
        }
    }

    /// Convert from a slice containing [r, g, b, a] elements.
    pub fn from_rgba_slice(rgba: &[u8]) -> Self {
        Self {
            r: rgba[0],
            g: rgba[1],
            b: rgba[2],
            a: rgba[3],
        }
    }

    /// Convert from a single luminance value.
    pub fn from_luma(luma: u8) -> Self {
        Self {
            r: luma,
            g: luma,
            b: luma,
            a: 255,
        }
    }

    /// Rec. 601 luminance of the pixel.
    pub fn luma(&self) -> f32 {
        0.299 * self.r as f32 + 0.587 * self.g as f32 + 0.114 * self.b as f32
    }
}

/// Single decoded video frame.
///
/// The pixel grid is immutable once constructed. Ownership moves from the
/// frame source, through the frame buffer, to the processing callback.
#[derive(Clone, Debug)]
pub struct Frame {
    pixels: Vec<RGBA>,
    width: usize,
    height: usize,
    index: usize,
}

impl Frame {
    /// Create a frame from raw pixels.
    ///
    /// Fails if the pixel count does not match `width * height`.
    pub fn new(pixels: Vec<RGBA>, width: usize, height: usize, index: usize) -> Result<Self> {
        ensure!(
            pixels.len() == width * height,
            "pixel count {} does not match {}x{} frame",
            pixels.len(),
            width,
            height
        );

        Ok(Self {
            pixels,
            width,
            height,
            index,
        })
    }

    /// Create a grayscale frame from raw luminance bytes.
    pub fn from_luma(luma: &[u8], width: usize, height: usize, index: usize) -> Result<Self> {
        Self::new(
            luma.iter().copied().map(RGBA::from_luma).collect(),
            width,
            height,
            index,
        )
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Sequence index of the frame within its stream.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn pixels(&self) -> &[RGBA] {
        &self.pixels
    }

    /// Luminance at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates lie outside the frame.
    pub fn luma_at(&self, x: usize, y: usize) -> f32 {
        assert!(x < self.width && y < self.height);
        self.pixels[y * self.width + x].luma()
    }
}

/// Video frame source.
///
/// This is the sole interface the pipeline has towards the decode layer.
/// Implementations wrap a camera, a container demuxer, or a raw stream.
pub trait FrameSource {
    /// Read the next frame in the stream.
    ///
    /// Returns `Ok(None)` once the source is exhausted. Exhaustion is not an
    /// error; the pipeline treats it as graceful completion.
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Get the total number of frames, if known.
    ///
    /// Live sources may not know their length. In such cases `None` is
    /// returned and progress reporting is unavailable.
    fn frame_count(&self) -> Option<usize>;

    /// Get the framerate of the stream, if known.
    fn framerate(&self) -> Option<f64>;

    /// Get frame dimensions as `(width, height)`, if known.
    ///
    /// Dimensions may only become known after the first frame is read.
    fn frame_size(&self) -> Option<(usize, usize)>;

    /// Seek to the given frame index.
    fn seek(&mut self, frame_idx: usize) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn frame_rejects_mismatched_pixels() {
        let pixels = vec![RGBA::from_luma(0); 12];
        assert!(Frame::new(pixels.clone(), 4, 3, 0).is_ok());
        assert!(Frame::new(pixels, 4, 4, 0).is_err());
    }

    #[test]
    fn luma_weights() {
        let white = RGBA::from_rgb_slice(&[255, 255, 255]);
        assert_approx_eq!(white.luma(), 255.0, 0.01);

        let green = RGBA::from_rgb_slice(&[0, 255, 0]);
        assert_approx_eq!(green.luma(), 0.587 * 255.0, 0.01);
    }

    #[test]
    fn luma_frame_indexing() {
        let frame = Frame::from_luma(&[0, 64, 128, 255], 2, 2, 7).unwrap();
        assert_eq!(frame.index(), 7);
        assert_approx_eq!(frame.luma_at(1, 1), 255.0, 0.01);
        assert_approx_eq!(frame.luma_at(0, 1), 128.0, 0.01);
    }
}
