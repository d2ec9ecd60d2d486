//! Motion blob extraction
//!
//! Maintains an adaptive per-pixel background model and extracts connected
//! foreground regions as bounding boxes. The extractor holds no cross-frame
//! identity; the background model is the only state carried forward.

use vsd::prelude::v1::*;

/// Background model parameters.
///
/// Defaults follow a lightweight MOG2-style setup with shadow detection left
/// out entirely for speed.
#[derive(Clone, Copy, Debug)]
pub struct BackgroundConfig {
    /// Number of frames the model adapts over.
    pub history: usize,
    /// Squared-deviation multiplier above which a pixel counts as foreground.
    pub var_threshold: f32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            history: 100,
            var_threshold: 40.0,
        }
    }
}

/// Variance assigned to a pixel before any evidence is accumulated.
const INITIAL_VARIANCE: f32 = 225.0;

/// Lower variance bound, keeps noise-free regions from becoming degenerate.
const MIN_VARIANCE: f32 = 4.0;

/// Adaptive per-pixel running Gaussian background model.
pub struct BackgroundModel {
    mean: Vec<f32>,
    variance: Vec<f32>,
    width: usize,
    height: usize,
    frames_seen: usize,
    config: BackgroundConfig,
}

impl BackgroundModel {
    pub fn new(width: usize, height: usize, config: BackgroundConfig) -> Self {
        Self {
            mean: vec![0.0; width * height],
            variance: vec![INITIAL_VARIANCE; width * height],
            width,
            height,
            frames_seen: 0,
            config,
        }
    }

    /// Classify each pixel of `frame` and update the model.
    ///
    /// Returns a foreground mask with 255 for moving pixels and 0 for
    /// background. The learning rate is `1 / history`, sped up while fewer
    /// than `history` frames have been seen so the model warms up quickly.
    pub fn apply(&mut self, frame: &Frame) -> Result<Vec<u8>> {
        ensure!(
            frame.width() == self.width && frame.height() == self.height,
            "frame size {}x{} does not match model size {}x{}",
            frame.width(),
            frame.height(),
            self.width,
            self.height
        );

        let alpha = 1.0 / self.frames_seen.min(self.config.history).max(1) as f32;
        let first = self.frames_seen == 0;

        let mut mask = vec![0u8; self.width * self.height];

        for (i, pixel) in frame.pixels().iter().enumerate() {
            let luma = pixel.luma();

            if first {
                self.mean[i] = luma;
                continue;
            }

            let delta = luma - self.mean[i];
            if delta * delta > self.config.var_threshold * self.variance[i] {
                mask[i] = 255;
            }

            self.mean[i] += alpha * delta;
            self.variance[i] =
                (self.variance[i] + alpha * (delta * delta - self.variance[i])).max(MIN_VARIANCE);
        }

        self.frames_seen += 1;

        Ok(mask)
    }
}

/// Blob extraction parameters.
#[derive(Clone, Copy, Debug)]
pub struct BlobConfig {
    /// Binary threshold applied to the foreground mask.
    pub mask_threshold: u8,
    /// Regions smaller than this many pixels are discarded.
    pub min_area: usize,
    /// At most this many regions are returned per frame.
    pub max_blobs: usize,
    pub background: BackgroundConfig,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            mask_threshold: 200,
            min_area: 500,
            max_blobs: 5,
            background: BackgroundConfig::default(),
        }
    }
}

/// Per-frame motion blob extractor.
///
/// A pure function of (current frame, background model state). Sorting is by
/// descending region area, bounding the per-frame cost independent of scene
/// complexity.
pub struct BlobExtractor {
    model: BackgroundModel,
    config: BlobConfig,
    width: usize,
    height: usize,
}

impl BlobExtractor {
    pub fn new(width: usize, height: usize, config: BlobConfig) -> Self {
        Self {
            model: BackgroundModel::new(width, height, config.background),
            config,
            width,
            height,
        }
    }

    /// Extract up to `max_blobs` motion blobs from the frame.
    pub fn extract(&mut self, frame: &Frame) -> Result<Vec<MotionBlob>> {
        let mut mask = self.model.apply(frame)?;

        // (pixel count, bounding box) per connected region.
        let mut regions: Vec<(usize, MotionBlob)> = vec![];

        for y in 0..self.height {
            for x in 0..self.width {
                if mask[y * self.width + x] < self.config.mask_threshold {
                    continue;
                }

                let mut area = 0;
                let (mut min_x, mut min_y, mut max_x, mut max_y) = (x, y, x, y);

                mask[y * self.width + x] = 0;
                let mut to_fill = vec![(x, y); 1];

                while let Some((x, y)) = to_fill.pop() {
                    area += 1;
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);

                    let neighbor_offs = (-1..=1).flat_map(|x| (-1..=1).map(move |y| (x, y)));

                    // Go through each neighbor and add any unvisited and over
                    // threshold entries.
                    for (x, y) in neighbor_offs
                        .map(|(ox, oy)| (x as isize + ox, y as isize + oy))
                        .filter(|&(ox, oy)| {
                            (0..self.width as isize).contains(&ox)
                                && (0..self.height as isize).contains(&oy)
                        })
                        .map(|(x, y)| (x as usize, y as usize))
                    {
                        if mask[y * self.width + x] >= self.config.mask_threshold {
                            to_fill.push((x, y));
                            mask[y * self.width + x] = 0;
                        }
                    }
                }

                if area >= self.config.min_area {
                    regions.push((
                        area,
                        MotionBlob {
                            x: min_x,
                            y: min_y,
                            width: max_x - min_x + 1,
                            height: max_y - min_y + 1,
                        },
                    ));
                }
            }
        }

        // Stable sort keeps scan order between equally sized regions.
        regions.sort_by(|a, b| b.0.cmp(&a.0));
        regions.truncate(self.config.max_blobs);

        log::trace!(
            "frame {}: {} motion blob(s)",
            frame.index(),
            regions.len()
        );

        Ok(regions.into_iter().map(|(_, blob)| blob).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: usize = 64;
    const H: usize = 48;

    fn flat_frame(luma: u8, index: usize) -> Frame {
        Frame::from_luma(&vec![luma; W * H], W, H, index).unwrap()
    }

    fn frame_with_square(
        luma: u8,
        square: u8,
        (sx, sy): (usize, usize),
        (sw, sh): (usize, usize),
        index: usize,
    ) -> Frame {
        let mut pixels = vec![luma; W * H];
        for y in sy..sy + sh {
            for x in sx..sx + sw {
                pixels[y * W + x] = square;
            }
        }
        Frame::from_luma(&pixels, W, H, index).unwrap()
    }

    fn extractor(min_area: usize, max_blobs: usize) -> BlobExtractor {
        BlobExtractor::new(
            W,
            H,
            BlobConfig {
                min_area,
                max_blobs,
                ..Default::default()
            },
        )
    }

    fn warm_up(extractor: &mut BlobExtractor, frames: usize) {
        for i in 0..frames {
            let blobs = extractor.extract(&flat_frame(50, i)).unwrap();
            assert!(blobs.is_empty(), "static scene produced blobs at frame {i}");
        }
    }

    #[test]
    fn moving_square_detected() {
        let mut extractor = extractor(64, 5);
        warm_up(&mut extractor, 20);

        let frame = frame_with_square(50, 255, (10, 12), (16, 16), 20);
        let blobs = extractor.extract(&frame).unwrap();

        assert_eq!(blobs.len(), 1);
        assert_eq!(
            blobs[0],
            MotionBlob {
                x: 10,
                y: 12,
                width: 16,
                height: 16
            }
        );
    }

    #[test]
    fn small_regions_filtered() {
        let mut extractor = extractor(64, 5);
        warm_up(&mut extractor, 20);

        // 4x4 = 16 px, below the 64 px minimum.
        let frame = frame_with_square(50, 255, (10, 12), (4, 4), 20);
        assert!(extractor.extract(&frame).unwrap().is_empty());
    }

    #[test]
    fn blob_count_bounded_and_sorted() {
        let mut extractor = extractor(4, 3);
        warm_up(&mut extractor, 20);

        // Five disjoint squares of growing size.
        let mut pixels = vec![50u8; W * H];
        for (i, side) in [2usize, 3, 4, 5, 6].iter().enumerate() {
            let (sx, sy) = (2 + i * 12, 4);
            for y in sy..sy + side {
                for x in sx..sx + side {
                    pixels[y * W + x] = 255;
                }
            }
        }
        let frame = Frame::from_luma(&pixels, W, H, 20).unwrap();

        let blobs = extractor.extract(&frame).unwrap();
        assert_eq!(blobs.len(), 3);
        // Largest first.
        assert_eq!(blobs[0].width, 6);
        assert_eq!(blobs[1].width, 5);
        assert_eq!(blobs[2].width, 4);
    }

    #[test]
    fn model_rejects_size_mismatch() {
        let mut model = BackgroundModel::new(8, 8, Default::default());
        let frame = Frame::from_luma(&vec![0; 16], 4, 4, 0).unwrap();
        assert!(model.apply(&frame).is_err());
    }

    #[test]
    fn model_adapts_to_new_background() {
        let mut model = BackgroundModel::new(4, 4, Default::default());
        for i in 0..50 {
            model
                .apply(&Frame::from_luma(&vec![50; 16], 4, 4, i).unwrap())
                .unwrap();
        }

        // A sudden change is foreground at first...
        let bright = Frame::from_luma(&vec![200; 16], 4, 4, 50).unwrap();
        let mask = model.apply(&bright).unwrap();
        assert!(mask.iter().all(|&m| m == 255));

        // ...but fades into the background once it persists.
        for i in 51..600 {
            model
                .apply(&Frame::from_luma(&vec![200; 16], 4, 4, i).unwrap())
                .unwrap();
        }
        let mask = model.apply(&Frame::from_luma(&vec![200; 16], 4, 4, 600).unwrap()).unwrap();
        assert!(mask.iter().all(|&m| m == 0));
    }
}
