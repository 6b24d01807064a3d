use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::config::OverrunPolicy;
use crate::models::frame::AudioFrame;

/// What happened to a frame handed to `push`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued without loss.
    Queued,
    /// Queued after evicting the oldest pending frame.
    DroppedOldest,
    /// Refused; the queue is unchanged.
    Rejected,
    /// The queue is closed; the frame was discarded.
    Closed,
}

impl PushOutcome {
    /// Whether this push lost a frame to backpressure.
    pub fn lost_frame(&self) -> bool {
        matches!(self, PushOutcome::DroppedOldest | PushOutcome::Rejected)
    }
}

/// Result of a blocking `pop`.
#[derive(Debug, Clone, PartialEq)]
pub enum PopOutcome {
    Frame(AudioFrame),
    /// Nothing arrived within the timeout; the queue is still open.
    Empty,
    /// Closed and fully drained; no more frames will ever appear.
    Drained,
}

struct QueueInner {
    frames: VecDeque<AudioFrame>,
    closed: bool,
    dropped: u64,
}

/// Bounded frame queue between the capture callback and one encode worker.
///
/// `push` never blocks: on overflow the configured policy either evicts the
/// oldest pending frame or refuses the incoming one, and the loss is
/// counted. `pop` blocks the worker side with a timeout so shutdown flags
/// get re-checked.
pub struct FrameQueue {
    inner: Mutex<QueueInner>,
    ready: Condvar,
    capacity: usize,
    policy: OverrunPolicy,
}

impl FrameQueue {
    pub fn new(capacity: usize, policy: OverrunPolicy) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
                dropped: 0,
            }),
            ready: Condvar::new(),
            capacity,
            policy,
        }
    }

    pub fn push(&self, frame: AudioFrame) -> PushOutcome {
        let mut inner = self.inner.lock();
        if inner.closed {
            return PushOutcome::Closed;
        }
        let outcome = if inner.frames.len() >= self.capacity {
            match self.policy {
                OverrunPolicy::DropOldest => {
                    inner.frames.pop_front();
                    inner.dropped += 1;
                    inner.frames.push_back(frame);
                    PushOutcome::DroppedOldest
                }
                OverrunPolicy::RejectNewest => {
                    inner.dropped += 1;
                    return PushOutcome::Rejected;
                }
            }
        } else {
            inner.frames.push_back(frame);
            PushOutcome::Queued
        };
        drop(inner);
        self.ready.notify_one();
        outcome
    }

    /// Takes the next frame, waiting up to `timeout` for one to arrive.
    pub fn pop(&self, timeout: Duration) -> PopOutcome {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(frame) = inner.frames.pop_front() {
                return PopOutcome::Frame(frame);
            }
            if inner.closed {
                return PopOutcome::Drained;
            }
            if Instant::now() >= deadline {
                return PopOutcome::Empty;
            }
            self.ready.wait_until(&mut inner, deadline);
        }
    }

    /// Closes the queue for new frames; pending frames remain poppable.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        drop(inner);
        self.ready.notify_all();
    }

    /// Closes the queue and discards everything pending.
    pub fn abandon(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.frames.clear();
        drop(inner);
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames lost to backpressure so far.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn frame(seq: u64) -> AudioFrame {
        AudioFrame::new(seq, Duration::ZERO, vec![0i16; 4].into())
    }

    fn seq_of(outcome: PopOutcome) -> u64 {
        match outcome {
            PopOutcome::Frame(f) => f.seq,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[test]
    fn fifo_order() {
        let queue = FrameQueue::new(4, OverrunPolicy::DropOldest);
        for seq in 0..3 {
            assert_eq!(queue.push(frame(seq)), PushOutcome::Queued);
        }
        for seq in 0..3 {
            assert_eq!(seq_of(queue.pop(Duration::ZERO)), seq);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn drop_oldest_evicts_the_head() {
        let queue = FrameQueue::new(2, OverrunPolicy::DropOldest);
        queue.push(frame(0));
        queue.push(frame(1));
        assert_eq!(queue.push(frame(2)), PushOutcome::DroppedOldest);

        assert_eq!(seq_of(queue.pop(Duration::ZERO)), 1);
        assert_eq!(seq_of(queue.pop(Duration::ZERO)), 2);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn reject_newest_keeps_the_head() {
        let queue = FrameQueue::new(2, OverrunPolicy::RejectNewest);
        queue.push(frame(0));
        queue.push(frame(1));
        assert_eq!(queue.push(frame(2)), PushOutcome::Rejected);

        assert_eq!(seq_of(queue.pop(Duration::ZERO)), 0);
        assert_eq!(seq_of(queue.pop(Duration::ZERO)), 1);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn pop_times_out_on_an_open_queue() {
        let queue = FrameQueue::new(2, OverrunPolicy::DropOldest);
        assert_eq!(queue.pop(Duration::from_millis(5)), PopOutcome::Empty);
    }

    #[test]
    fn close_lets_pending_frames_drain() {
        let queue = FrameQueue::new(4, OverrunPolicy::DropOldest);
        queue.push(frame(0));
        queue.push(frame(1));
        queue.close();

        assert_eq!(seq_of(queue.pop(Duration::ZERO)), 0);
        assert_eq!(seq_of(queue.pop(Duration::ZERO)), 1);
        assert_eq!(queue.pop(Duration::ZERO), PopOutcome::Drained);
    }

    #[test]
    fn abandon_discards_pending_frames() {
        let queue = FrameQueue::new(4, OverrunPolicy::DropOldest);
        queue.push(frame(0));
        queue.push(frame(1));
        queue.abandon();
        assert_eq!(queue.pop(Duration::ZERO), PopOutcome::Drained);
    }

    #[test]
    fn push_after_close_is_discarded_without_counting() {
        let queue = FrameQueue::new(4, OverrunPolicy::DropOldest);
        queue.close();
        assert_eq!(queue.push(frame(0)), PushOutcome::Closed);
        assert_eq!(queue.dropped(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn wakes_a_blocked_consumer() {
        let queue = Arc::new(FrameQueue::new(128, OverrunPolicy::DropOldest));
        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                for seq in 0..100 {
                    queue.push(frame(seq));
                }
                queue.close();
            })
        };

        let mut seen = 0u64;
        loop {
            match queue.pop(Duration::from_secs(5)) {
                PopOutcome::Frame(f) => {
                    assert_eq!(f.seq, seen);
                    seen += 1;
                }
                PopOutcome::Empty => continue,
                PopOutcome::Drained => break,
            }
        }
        assert_eq!(seen, 100);
        producer.join().unwrap();
    }
}
