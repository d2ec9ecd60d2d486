//! Multi-target vehicle tracking
//!
//! Associates per-frame motion blobs with persistent tracks using
//! nearest-neighbour matching, ages tracks out after a timeout and keeps
//! per-track position and speed history.
//!
//! Speeds at this layer are raw pixels per second over wall-clock time; no
//! real-world calibration is applied.

use nalgebra as na;
use rand::Rng;
use serde::Serialize;
use vsd::prelude::v1::*;

/// Tracker parameters.
#[derive(Clone, Copy, Debug)]
pub struct TrackerConfig {
    /// Maximum association distance in pixels.
    pub max_distance: f32,
    /// Seconds without an update before a track goes inactive.
    pub timeout: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_distance: 50.0,
            timeout: 1.0,
        }
    }
}

/// One tracked vehicle with accumulated history.
///
/// `positions`, `timestamps` and `speeds` are parallel append-only
/// sequences; `speeds` lags one entry behind since a speed needs two
/// positions.
#[derive(Clone, Debug)]
pub struct VehicleTrack {
    pub id: u64,
    pub positions: Vec<na::Point2<f32>>,
    pub timestamps: Vec<f64>,
    pub speeds: Vec<f32>,
    pub last_update: f64,
    /// Display colour assigned at spawn.
    pub color: [u8; 3],
}

impl VehicleTrack {
    fn new(id: u64, center: na::Point2<f32>, now: f64, color: [u8; 3]) -> Self {
        Self {
            id,
            positions: vec![center],
            timestamps: vec![now],
            speeds: vec![],
            last_update: now,
            color,
        }
    }

    /// Latest instantaneous speed in px/s.
    pub fn current_speed(&self) -> Option<f32> {
        self.speeds.last().copied()
    }

    /// Mean of all recorded speeds in px/s.
    pub fn average_speed(&self) -> Option<f32> {
        if self.speeds.is_empty() {
            None
        } else {
            Some(self.speeds.iter().sum::<f32>() / self.speeds.len() as f32)
        }
    }

    /// Fastest recorded speed in px/s.
    pub fn max_speed(&self) -> Option<f32> {
        self.speeds.iter().copied().reduce(f32::max)
    }

    /// A track is active while its last update is within the timeout.
    pub fn is_active(&self, now: f64, timeout: f64) -> bool {
        now - self.last_update < timeout
    }

    fn push(&mut self, center: na::Point2<f32>, now: f64) {
        if let (Some(prev), Some(prev_ts)) = (self.positions.last(), self.timestamps.last()) {
            let dt = now - prev_ts;
            if dt > 0.0 {
                self.speeds.push((center - prev).norm() / dt as f32);
            }
        }

        self.positions.push(center);
        self.timestamps.push(now);
        self.last_update = now;
    }
}

/// Per-track speed statistics.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct TrackStats {
    pub id: u64,
    pub current: f32,
    pub average: f32,
    pub max: f32,
}

/// Full track history for export.
#[derive(Clone, Debug, Serialize)]
pub struct TrackExport {
    pub id: u64,
    pub positions: Vec<(f32, f32)>,
    pub timestamps: Vec<f64>,
    pub speeds: Vec<f32>,
    pub average_speed: Option<f32>,
    pub max_speed: Option<f32>,
}

/// Nearest-neighbour multi-vehicle tracker.
pub struct MultiVehicleTracker {
    config: TrackerConfig,
    tracks: Vec<VehicleTrack>,
    next_id: u64,
}

impl MultiVehicleTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: vec![],
            next_id: 0,
        }
    }

    /// Update tracks with one frame's blobs.
    ///
    /// `now` is the wall-clock timestamp in seconds. Each blob associates
    /// with the nearest active track within `max_distance`; a track receives
    /// at most one update per pass (nearest wins, ties resolved towards the
    /// older track). Blobs with no candidate spawn fresh tracks with
    /// monotonically increasing ids. Inactive tracks that were not matched
    /// this pass are dropped afterwards.
    pub fn update(&mut self, blobs: &[MotionBlob], now: f64) {
        let mut matched = vec![false; self.tracks.len()];

        for blob in blobs {
            let center = blob.center();

            let closest = self
                .tracks
                .iter()
                .enumerate()
                .filter(|(i, track)| !matched[*i] && track.is_active(now, self.config.timeout))
                .filter_map(|(i, track)| {
                    let last = track.positions.last()?;
                    let dist = (center - last).norm();
                    (dist < self.config.max_distance).then(|| (i, dist))
                })
                // Tracks sit in spawn order, so the first minimum is the
                // oldest (lowest id) of equally distant candidates.
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

            if let Some((i, _)) = closest {
                matched[i] = true;
                self.tracks[i].push(center, now);
            } else {
                self.spawn(center, now);
                matched.push(true);
            }
        }

        // Drop tracks that are both inactive and went unmatched this pass.
        // `retain` visits in order, so `matched` indexes line up.
        let timeout = self.config.timeout;
        let mut idx = 0;
        self.tracks.retain(|track| {
            let keep = track.is_active(now, timeout) || matched[idx];
            if !keep {
                log::debug!("track {} pruned after {:.2}s idle", track.id, now - track.last_update);
            }
            idx += 1;
            keep
        });
    }

    fn spawn(&mut self, center: na::Point2<f32>, now: f64) {
        let mut rng = rand::thread_rng();
        let color = [rng.gen(), rng.gen(), rng.gen()];

        log::debug!("track {} spawned at ({}, {})", self.next_id, center.x, center.y);
        self.tracks
            .push(VehicleTrack::new(self.next_id, center, now, color));
        self.next_id += 1;
    }

    /// Tracks still within the activity timeout.
    pub fn active_tracks(&self, now: f64) -> impl Iterator<Item = &VehicleTrack> {
        let timeout = self.config.timeout;
        self.tracks
            .iter()
            .filter(move |track| track.is_active(now, timeout))
    }

    pub fn tracks(&self) -> &[VehicleTrack] {
        &self.tracks
    }

    /// Statistics for every track that has at least one speed sample.
    pub fn statistics(&self) -> Vec<TrackStats> {
        self.tracks
            .iter()
            .filter_map(|track| {
                Some(TrackStats {
                    id: track.id,
                    current: track.current_speed()?,
                    average: track.average_speed()?,
                    max: track.max_speed()?,
                })
            })
            .collect()
    }

    /// Export full history of all live tracks.
    pub fn export(&self) -> Vec<TrackExport> {
        self.tracks
            .iter()
            .map(|track| TrackExport {
                id: track.id,
                positions: track.positions.iter().map(|p| (p.x, p.y)).collect(),
                timestamps: track.timestamps.clone(),
                speeds: track.speeds.clone(),
                average_speed: track.average_speed(),
                max_speed: track.max_speed(),
            })
            .collect()
    }
}
