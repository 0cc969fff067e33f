//! Frame queue between the acquisition loop and the export pump.
//!
//! Unbounded FIFO: `push` never blocks and never drops. The consumer waits on
//! a condition variable with a timeout so it can notice shutdown.

use crate::core::types::Frame;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

struct QueueState {
    frames: VecDeque<Frame>,
    high_water_mark: usize,
}

pub struct FrameQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::new(),
                high_water_mark: 0,
            }),
            ready: Condvar::new(),
        }
    }

    pub fn push(&self, frame: Frame) {
        let mut state = self.state.lock();
        state.frames.push_back(frame);
        state.high_water_mark = state.high_water_mark.max(state.frames.len());
        drop(state);
        self.ready.notify_one();
    }

    pub fn try_pop(&self) -> Option<Frame> {
        self.state.lock().frames.pop_front()
    }

    /// Oldest frame, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout or when woken by [`FrameQueue::wake_all`]
    /// with nothing queued.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        if let Some(frame) = state.frames.pop_front() {
            return Some(frame);
        }
        // Single wait: a wakeup with nothing queued returns to the caller
        let _ = self.ready.wait_until(&mut state, deadline);
        state.frames.pop_front()
    }

    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().frames.is_empty()
    }

    /// Largest backlog seen since creation
    pub fn high_water_mark(&self) -> usize {
        self.state.lock().high_water_mark
    }

    /// Wake every waiting consumer
    pub fn wake_all(&self) {
        self.ready.notify_all();
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = FrameQueue::new();
        for id in 1..=5 {
            queue.push(Frame::new(id));
        }
        assert_eq!(queue.len(), 5);
        let ids: Vec<u64> = std::iter::from_fn(|| queue.try_pop())
            .map(|f| f.unique_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert!(queue.is_empty());
        assert_eq!(queue.high_water_mark(), 5);
    }

    #[test]
    fn test_pop_timeout_on_empty_queue() {
        let queue = FrameQueue::new();
        let start = Instant::now();
        assert!(queue.pop_timeout(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_push_wakes_waiting_consumer() {
        let queue = Arc::new(FrameQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop_timeout(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(Frame::new(42));
        let frame = consumer.join().unwrap();
        assert_eq!(frame.map(|f| f.unique_id), Some(42));
    }

    #[test]
    fn test_producer_order_preserved_with_concurrent_consumer() {
        let queue = Arc::new(FrameQueue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for id in 0..1000 {
                    queue.push(Frame::new(id));
                }
            })
        };

        let mut received = Vec::with_capacity(1000);
        while received.len() < 1000 {
            if let Some(frame) = queue.pop_timeout(Duration::from_millis(100)) {
                received.push(frame.unique_id);
            }
        }
        producer.join().unwrap();

        let expected: Vec<u64> = (0..1000).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn test_each_producer_keeps_its_order() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 500;
        const STRIDE: u64 = 1_000_000;

        let queue = Arc::new(FrameQueue::new());
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for seq in 0..PER_PRODUCER {
                        queue.push(Frame::new(producer * STRIDE + seq));
                    }
                })
            })
            .collect();

        let total = (PRODUCERS * PER_PRODUCER) as usize;
        let mut next_seq = vec![0u64; PRODUCERS as usize];
        let mut received = 0;
        while received < total {
            if let Some(frame) = queue.pop_timeout(Duration::from_millis(100)) {
                let producer = (frame.unique_id / STRIDE) as usize;
                let seq = frame.unique_id % STRIDE;
                assert_eq!(seq, next_seq[producer], "producer {} out of order", producer);
                next_seq[producer] += 1;
                received += 1;
            }
        }
        for producer in producers {
            producer.join().unwrap();
        }

        assert!(queue.is_empty());
        assert!(next_seq.iter().all(|&n| n == PER_PRODUCER));
    }

    #[test]
    fn test_wake_all_releases_idle_consumer() {
        let queue = Arc::new(FrameQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let start = Instant::now();
                let frame = queue.pop_timeout(Duration::from_secs(30));
                (frame.is_none(), start.elapsed())
            })
        };
        while !consumer.is_finished() {
            queue.wake_all();
            thread::sleep(Duration::from_millis(5));
        }
        let (empty, waited) = consumer.join().unwrap();
        assert!(empty);
        assert!(waited < Duration::from_secs(10));
    }
}
