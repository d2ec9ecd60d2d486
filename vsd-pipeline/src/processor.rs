//! Pipeline orchestrator

use crate::buffer::FrameBuffer;
use log::*;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::thread::{sleep, spawn, JoinHandle};
use std::time::Duration;
use vsd::prelude::v1::*;

/// How long the producer waits when the channel is near-full.
const PRODUCER_BACKOFF: Duration = Duration::from_millis(10);

/// How long the consumer waits when the channel is empty.
const CONSUMER_BACKOFF: Duration = Duration::from_millis(1);

/// Orchestrator parameters.
#[derive(Clone, Copy, Debug)]
pub struct PipelineOptions {
    /// Process only every nth frame.
    pub frame_skip: usize,
    /// Frame channel capacity.
    pub buffer_size: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            frame_skip: 1,
            buffer_size: 30,
        }
    }
}

/// Two-thread frame pipeline.
///
/// The producer loop reads frames from a [`FrameSource`] into the channel,
/// skipping frames per policy; the consumer loop feeds them to a processing
/// callback. The only shared state is the channel, its two flags and the
/// frame index counter (producer-written, orchestrator-read).
pub struct VideoProcessor {
    options: PipelineOptions,
    buffer: Arc<FrameBuffer>,
    frame_index: Arc<AtomicUsize>,
    total_frames: Option<usize>,
    read_handle: Option<JoinHandle<()>>,
    process_handle: Option<JoinHandle<()>>,
}

impl VideoProcessor {
    pub fn new(options: PipelineOptions) -> Result<Self> {
        ensure!(options.frame_skip >= 1, "frame skip must be at least 1");
        ensure!(options.buffer_size >= 1, "buffer size must be at least 1");

        Ok(Self {
            buffer: Arc::new(FrameBuffer::new(options.buffer_size)),
            options,
            frame_index: Arc::new(AtomicUsize::new(0)),
            total_frames: None,
            read_handle: None,
            process_handle: None,
        })
    }

    /// Start the producer and consumer threads.
    ///
    /// `process_fn` runs on the consumer thread; a failing invocation is
    /// logged and the frame skipped, it never halts playback.
    pub fn start<S, F>(&mut self, source: S, process_fn: F) -> Result<()>
    where
        S: FrameSource + Send + 'static,
        F: FnMut(Frame) -> Result<()> + Send + 'static,
    {
        ensure!(
            self.read_handle.is_none() && self.process_handle.is_none(),
            "pipeline is already running"
        );

        self.total_frames = source.frame_count();

        self.read_handle = Some(spawn_producer(
            source,
            self.buffer.clone(),
            self.frame_index.clone(),
            self.options.frame_skip,
        ));
        self.process_handle = Some(spawn_consumer(self.buffer.clone(), process_fn));

        Ok(())
    }

    /// Stop the pipeline and join both threads.
    ///
    /// Frames still buffered are discarded, not drained through the
    /// callback; stopping is not lossless.
    pub fn stop(&mut self) {
        self.buffer.signal_stop();

        if let Some(handle) = self.read_handle.take() {
            let _ = handle.join();
        }

        // The producer is gone; release the consumer's exit condition and
        // throw away whatever it has not picked up.
        self.buffer.mark_finished();
        self.buffer.clear();

        if let Some(handle) = self.process_handle.take() {
            let _ = handle.join();
        }

        self.buffer.clear();
    }

    /// Progress through the stream as a percentage in `[0, 100]`.
    ///
    /// Reports 0 when the total frame count is unknown or zero.
    pub fn progress(&self) -> f32 {
        match self.total_frames {
            Some(total) if total > 0 => {
                let current = self.current_frame_index() as f32;
                (current / total as f32 * 100.0).clamp(0.0, 100.0)
            }
            _ => 0.0,
        }
    }

    /// Number of frames read from the source so far.
    ///
    /// Tolerant of stale reads; only the producer writes this.
    pub fn current_frame_index(&self) -> usize {
        self.frame_index.load(Ordering::Relaxed)
    }

    /// Whether the producer reached the end of the source.
    pub fn is_finished(&self) -> bool {
        self.buffer.is_finished()
    }

    /// Frames buffered but not yet consumed.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_running(&self) -> bool {
        self.read_handle.is_some() || self.process_handle.is_some()
    }
}

impl Drop for VideoProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_producer<S>(
    mut source: S,
    buffer: Arc<FrameBuffer>,
    frame_index: Arc<AtomicUsize>,
    frame_skip: usize,
) -> JoinHandle<()>
where
    S: FrameSource + Send + 'static,
{
    spawn(move || {
        let mut frames_to_skip = 0;

        while !buffer.should_stop() {
            if buffer.near_full() {
                // Channel almost full, give the consumer a moment.
                sleep(PRODUCER_BACKOFF);
                continue;
            }

            let frame = match source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("reached end of stream");
                    buffer.mark_finished();
                    break;
                }
                // A read failure ends the stream gracefully.
                Err(err) => {
                    warn!("source read failed, treating as end of stream: {err:#}");
                    buffer.mark_finished();
                    break;
                }
            };

            let index = frame_index.fetch_add(1, Ordering::Relaxed) + 1;

            // Dynamic skip: discard a run of frames after an overflow so the
            // consumer can catch up.
            if frames_to_skip > 0 {
                frames_to_skip -= 1;
                continue;
            }

            if index % frame_skip != 0 {
                continue;
            }

            if !buffer.put(frame) {
                frames_to_skip = frame_skip;
                debug!("frame channel full, engaging dynamic skip");
            }
        }
    })
}

fn spawn_consumer<F>(buffer: Arc<FrameBuffer>, mut process_fn: F) -> JoinHandle<()>
where
    F: FnMut(Frame) -> Result<()> + Send + 'static,
{
    spawn(move || loop {
        // Exit only once stopped, the producer is done, and the channel has
        // drained. The ordering keeps buffered frames from being lost at
        // end-of-stream.
        if buffer.should_stop() && buffer.is_finished() && buffer.is_empty() {
            break;
        }

        let frame = match buffer.get() {
            Some(frame) => frame,
            None => {
                sleep(CONSUMER_BACKOFF);
                continue;
            }
        };

        // Once a stop is requested, remaining frames are discarded rather
        // than drained through the callback.
        if buffer.should_stop() {
            continue;
        }

        if let Err(err) = process_fn(frame) {
            error!("failed to process frame: {err:#}");
        }
    })
}
