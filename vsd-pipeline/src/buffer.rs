//! Bounded frame channel

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};
use vsd::source::Frame;

/// Fixed-capacity FIFO channel between the frame producer and consumer.
///
/// Both sides are non-blocking: `put` fails fast at capacity and `get`
/// returns `None` when empty. Dropped frames are silently lost; that is the
/// pipeline's backpressure mechanism, not an error. Two flags ride along:
/// stop-requested and producer-finished.
pub struct FrameBuffer {
    queue: Mutex<VecDeque<Frame>>,
    capacity: usize,
    stop: AtomicBool,
    finished: AtomicBool,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            stop: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    /// Enqueue a frame. Returns `false` without blocking if at capacity.
    pub fn put(&self, frame: Frame) -> bool {
        let mut queue = match self.queue.lock() {
            Ok(queue) => queue,
            Err(_) => return false,
        };

        if queue.len() >= self.capacity {
            false
        } else {
            queue.push_back(frame);
            true
        }
    }

    /// Dequeue the oldest frame, if any.
    pub fn get(&self) -> Option<Frame> {
        self.queue.lock().ok()?.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the channel is at or beyond 90% of capacity.
    pub fn near_full(&self) -> bool {
        self.len() * 10 >= self.capacity * 9
    }

    /// Drain all queued frames.
    ///
    /// Only safe to call while no producer is concurrently writing.
    pub fn clear(&self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }

    /// Request a stop. Idempotent, observed by both sides.
    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Mark the producer side as finished (end of stream).
    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: usize) -> Frame {
        Frame::from_luma(&[0; 4], 2, 2, index).unwrap()
    }

    #[test]
    fn capacity_never_exceeded() {
        let buffer = FrameBuffer::new(3);

        for i in 0..3 {
            assert!(buffer.put(frame(i)));
        }
        // Beyond capacity: fails fast, does not block, does not grow.
        assert!(!buffer.put(frame(3)));
        assert!(!buffer.put(frame(4)));
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn fifo_order() {
        let buffer = FrameBuffer::new(4);
        for i in 0..4 {
            buffer.put(frame(i));
        }

        for i in 0..4 {
            assert_eq!(buffer.get().unwrap().index(), i);
        }
        assert!(buffer.get().is_none());
    }

    #[test]
    fn near_full_watermark() {
        let buffer = FrameBuffer::new(10);
        for i in 0..8 {
            buffer.put(frame(i));
        }
        assert!(!buffer.near_full());

        buffer.put(frame(8));
        assert!(buffer.near_full());
    }

    #[test]
    fn clear_drains() {
        let buffer = FrameBuffer::new(4);
        for i in 0..4 {
            buffer.put(frame(i));
        }

        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.put(frame(9)));
    }

    #[test]
    fn stop_is_idempotent() {
        let buffer = FrameBuffer::new(1);
        assert!(!buffer.should_stop());

        buffer.signal_stop();
        buffer.signal_stop();
        assert!(buffer.should_stop());

        assert!(!buffer.is_finished());
        buffer.mark_finished();
        assert!(buffer.is_finished());
    }
}
