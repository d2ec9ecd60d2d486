//! Single-target speed estimation
//!
//! Tracks one operator-selected point of interest through per-frame motion
//! blobs and converts its displacement into a smoothed, perspective-corrected
//! and rate-limited speed value.

use nalgebra as na;
use std::collections::VecDeque;
use vsd::prelude::v1::*;

/// Estimator parameters.
#[derive(Clone, Copy, Debug)]
pub struct EstimatorConfig {
    /// Sliding window length for both position and speed history.
    pub speed_window: usize,
    /// Maximum allowed speed change between frames, in km/h.
    pub max_speed_change: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            speed_window: 5,
            max_speed_change: 10.0,
        }
    }
}

/// Result of feeding one frame's blobs through the estimator.
#[derive(Clone, Debug)]
pub enum Observation {
    /// No target chosen yet; blobs are returned for display only.
    Idle { blobs: Vec<MotionBlob> },
    /// A reference point has been set.
    ///
    /// `target` is the blob matched this frame, if any. `speed_kmh` is the
    /// smoothed display value and stays `None` until enough history exists
    /// and a target is matched; it is never a garbage number.
    Tracking {
        target: Option<MotionBlob>,
        speed_kmh: Option<f32>,
    },
}

/// Single-target speed estimator.
///
/// Matching picks the blob closest (Manhattan distance) to the previously
/// matched center. This can silently re-lock onto an unrelated object if the
/// true target temporarily leaves the motion mask and a different blob
/// happens to be closer; downstream behaviour expects this, so it stays.
pub struct SpeedEstimator {
    calibration: Calibration,
    frame_height: usize,
    config: EstimatorConfig,
    selected: Option<na::Point2<f32>>,
    positions: VecDeque<na::Point2<f32>>,
    speeds: VecDeque<f32>,
}

impl SpeedEstimator {
    pub fn new(
        calibration: Calibration,
        frame_height: usize,
        config: EstimatorConfig,
    ) -> Result<Self> {
        ensure!(config.speed_window >= 2, "speed window must be at least 2");
        ensure!(
            config.max_speed_change >= 0.0,
            "max speed change must not be negative"
        );
        ensure!(frame_height > 0, "frame height must be positive");

        Ok(Self {
            calibration,
            frame_height,
            config,
            selected: None,
            positions: VecDeque::with_capacity(config.speed_window),
            speeds: VecDeque::with_capacity(config.speed_window),
        })
    }

    /// Select the target at the given point.
    ///
    /// No validation that a blob exists there; the next matching pass locks
    /// onto whatever moves closest. The selection is never cleared
    /// automatically.
    pub fn select(&mut self, point: na::Point2<f32>) {
        log::info!("vehicle selected at ({}, {})", point.x, point.y);
        self.selected = Some(point);
    }

    pub fn is_selected(&self) -> bool {
        self.selected.is_some()
    }

    /// Smoothed speed for display: the median of the speed history.
    pub fn current_speed_kmh(&self) -> Option<f32> {
        if self.speeds.is_empty() {
            None
        } else {
            Some(median(self.speeds.iter().copied()))
        }
    }

    /// Raw (rate-limited, pre-median) speed history, oldest first.
    pub fn speed_history(&self) -> impl Iterator<Item = f32> + '_ {
        self.speeds.iter().copied()
    }

    /// Perspective correction for a point at height `y` in the frame.
    ///
    /// Equals 1 at the top of the frame and grows towards the bottom,
    /// compensating foreshortening of objects closer to the camera.
    pub fn perspective_factor(&self, y: f32) -> f32 {
        1.0 + 0.5 * (y / self.frame_height as f32)
    }

    /// Process one frame's motion blobs.
    pub fn update(&mut self, blobs: &[MotionBlob]) -> Observation {
        let selected = match self.selected {
            Some(selected) => selected,
            None => {
                return Observation::Idle {
                    blobs: blobs.to_vec(),
                }
            }
        };

        // Match against the previous center, or the selection before the
        // first match.
        let anchor = self.positions.back().copied().unwrap_or(selected);

        let target = blobs
            .iter()
            .copied()
            .min_by(|a, b| {
                let da = manhattan(a.center(), anchor);
                let db = manhattan(b.center(), anchor);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            });

        let target = match target {
            Some(target) => target,
            // No motion this frame; history stays untouched.
            None => {
                return Observation::Tracking {
                    target: None,
                    speed_kmh: None,
                }
            }
        };

        self.push_position(target.center());

        let speed_kmh = self.compute_speed().map(|speed| {
            self.push_speed(speed);
            median(self.speeds.iter().copied())
        });

        Observation::Tracking {
            target: Some(target),
            speed_kmh,
        }
    }

    fn push_position(&mut self, center: na::Point2<f32>) {
        self.positions.push_back(center);
        while self.positions.len() > self.config.speed_window {
            self.positions.pop_front();
        }
    }

    /// Weighted average of per-pair instantaneous speeds, rate limited
    /// against the previously stored value.
    fn compute_speed(&self) -> Option<f32> {
        if self.positions.len() < 2 {
            return None;
        }

        let scale = self.calibration.scale_m_per_px();
        let fps = self.calibration.fps() as f32;

        let pairs = self.positions.len() - 1;
        let mut weighted_sum = 0.0;
        let mut weight_sum = 0.0;

        for (i, (prev, curr)) in self
            .positions
            .iter()
            .zip(self.positions.iter().skip(1))
            .enumerate()
        {
            let pixel_distance = (curr - prev).norm();
            let distance_m = pixel_distance * scale * self.perspective_factor(curr.y);
            let speed_kmh = distance_m * fps * 3.6;

            // Oldest pair weighs 0.5, newest 1.0.
            let weight = if pairs == 1 {
                0.5
            } else {
                0.5 + 0.5 * i as f32 / (pairs - 1) as f32
            };

            weighted_sum += weight * speed_kmh;
            weight_sum += weight;
        }

        let mut speed = weighted_sum / weight_sum;

        // Clamp single-frame outliers to the configured rate of change.
        if let Some(prev) = self.speeds.back().copied() {
            let change = speed - prev;
            if change.abs() > self.config.max_speed_change {
                speed = prev + self.config.max_speed_change * change.signum();
            }
        }

        Some(speed)
    }

    fn push_speed(&mut self, speed: f32) {
        self.speeds.push_back(speed);
        while self.speeds.len() > self.config.speed_window {
            self.speeds.pop_front();
        }
    }
}

fn manhattan(a: na::Point2<f32>, b: na::Point2<f32>) -> f32 {
    (a.x - b.x).abs() + (a.y - b.y).abs()
}

/// Median of the values; the mean of the two middle values for even counts.
fn median(values: impl Iterator<Item = f32>) -> f32 {
    let mut values = values.collect::<Vec<_>>();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}
