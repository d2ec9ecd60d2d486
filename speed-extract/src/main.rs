//! Extract vehicle speeds from a raw frame stream.
//!
//! Usage: `speed-extract <input.vsdraw> [config.json] [x,y]`
//!
//! The optional `x,y` argument selects the single-target point of interest,
//! as a stand-in for the click a GUI front end would deliver. Per-track
//! statistics are printed to stdout as JSON once the stream drains.

mod raw;

use blob_detector::{BlobConfig, BlobExtractor};
use log::*;
use nalgebra as na;
use raw::RawSource;
use speed_estimator::{EstimatorConfig, Observation, SpeedEstimator};
use std::fs::File;
use std::sync::{mpsc, Arc, Mutex};
use std::thread::sleep;
use std::time::{Duration, Instant};
use vehicle_tracker::{MultiVehicleTracker, TrackerConfig};
use vsd::prelude::v1::*;
use vsd_pipeline::{PipelineOptions, VideoProcessor};

fn main() -> Result<()> {
    env_logger::init();

    let input = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("Please supply a raw frame stream!"))?;

    let config = match std::env::args().nth(2) {
        Some(path) => serde_json::from_reader(File::open(&path)?)
            .with_context(|| format!("cannot parse config {path}"))?,
        None => DetectorConfig::default(),
    };
    config.validate()?;

    let selection = std::env::args().nth(3).map(parse_point).transpose()?;

    let source = RawSource::open(&input)?;
    let (width, height) = source
        .frame_size()
        .ok_or_else(|| anyhow!("unknown frame size"))?;
    let fps = source.framerate().ok_or_else(|| anyhow!("unknown framerate"))?;

    info!("{input}: {width}x{height} @ {fps} fps");

    let calibration = Calibration::new(config.known_distance_m, width, fps)?;

    let mut extractor = BlobExtractor::new(width, height, BlobConfig::default());
    let estimator = Arc::new(Mutex::new(SpeedEstimator::new(
        calibration,
        height,
        EstimatorConfig {
            speed_window: config.speed_window,
            max_speed_change: config.max_speed_change,
        },
    )?));
    let tracker = Arc::new(Mutex::new(MultiVehicleTracker::new(TrackerConfig::default())));

    // Selection events arrive over a channel, the same way a UI layer would
    // deliver clicks without touching the worker threads directly.
    let (select_tx, select_rx) = mpsc::channel();
    if let Some(point) = selection {
        select_tx.send(point)?;
    }

    let mut processor = VideoProcessor::new(PipelineOptions {
        frame_skip: config.frame_skip,
        buffer_size: config.buffer_size,
    })?;

    let start = Instant::now();

    processor.start(source, {
        let estimator = estimator.clone();
        let tracker = tracker.clone();

        move |frame| {
            let mut estimator = estimator
                .lock()
                .map_err(|_| anyhow!("estimator lock poisoned"))?;

            for point in select_rx.try_iter() {
                estimator.select(point);
            }

            let blobs = extractor.extract(&frame)?;

            tracker
                .lock()
                .map_err(|_| anyhow!("tracker lock poisoned"))?
                .update(&blobs, start.elapsed().as_secs_f64());

            match estimator.update(&blobs) {
                Observation::Idle { blobs } => {
                    debug!("frame {}: {} blob(s), no target", frame.index(), blobs.len())
                }
                Observation::Tracking { target, speed_kmh } => debug!(
                    "frame {}: target {:?}, speed {:?} km/h",
                    frame.index(),
                    target,
                    speed_kmh
                ),
            }

            Ok(())
        }
    })?;

    // Drain the whole stream, then shut the workers down.
    while !(processor.is_finished() && processor.pending() == 0) {
        sleep(Duration::from_millis(10));
    }
    sleep(Duration::from_millis(20));
    info!("progress: {:.1}%", processor.progress());
    processor.stop();

    let tracker = tracker
        .lock()
        .map_err(|_| anyhow!("tracker lock poisoned"))?;
    println!("{}", serde_json::to_string_pretty(&tracker.export())?);

    for stats in tracker.statistics() {
        info!(
            "track {}: current {:.1} px/s, avg {:.1} px/s, max {:.1} px/s",
            stats.id, stats.current, stats.average, stats.max
        );
    }

    if config.show_speed {
        let estimator = estimator
            .lock()
            .map_err(|_| anyhow!("estimator lock poisoned"))?;
        match estimator.current_speed_kmh() {
            Some(speed) => info!(
                "tracked vehicle speed: {:.1} {}",
                config.speed_unit.convert(speed),
                config.speed_unit
            ),
            None => info!("tracked vehicle speed: —"),
        }
    }

    Ok(())
}

fn parse_point(arg: String) -> Result<na::Point2<f32>> {
    let (x, y) = arg
        .split_once(',')
        .ok_or_else(|| anyhow!("selection must look like x,y"))?;
    Ok(na::Point2::new(x.trim().parse()?, y.trim().parse()?))
}
