//! Single-slot frame handoff between the capture and processing threads.
//!
//! Capacity is exactly one. The producer never waits: a frame that the
//! consumer has not yet taken is replaced and counted as dropped. The
//! consumer blocks until a frame arrives or the slot is closed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::types::Frame;

struct Inner {
    frame: Option<Frame>,
    closed: bool,
}

/// Overwrite-on-full channel of capacity one.
pub struct FrameSlot {
    inner: Mutex<Inner>,
    ready: Condvar,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                frame: None,
                closed: false,
            }),
            ready: Condvar::new(),
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Store `frame`, replacing any frame not yet taken.
    ///
    /// Returns `true` if a stale frame was dropped. Frames pushed after
    /// [`close`](Self::close) are discarded.
    pub fn push_or_replace(&self, frame: Frame) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        let stale = inner.frame.replace(frame).is_some();
        drop(inner);

        self.pushed.fetch_add(1, Ordering::Relaxed);
        if stale {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.ready.notify_one();
        stale
    }

    /// Block until a frame is available. `None` once the slot is closed.
    pub fn pop(&self) -> Option<Frame> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(frame) = inner.frame.take() {
                return Some(frame);
            }
            if inner.closed {
                return None;
            }
            self.ready.wait(&mut inner);
        }
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(frame) = inner.frame.take() {
                return Some(frame);
            }
            if inner.closed {
                return None;
            }
            if self.ready.wait_until(&mut inner, deadline).timed_out() {
                return inner.frame.take();
            }
        }
    }

    /// Wake the consumer and refuse further frames.
    ///
    /// A frame already in the slot can still be popped.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Frames accepted by `push_or_replace`.
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Frames replaced before the consumer took them.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn frame(tag: u8) -> Frame {
        Frame::new(1, 1, 1, vec![tag]).unwrap()
    }

    #[test]
    fn newest_frame_wins() {
        let slot = FrameSlot::new();
        assert!(!slot.push_or_replace(frame(1)));
        assert!(slot.push_or_replace(frame(2)));
        assert!(slot.push_or_replace(frame(3)));
        assert_eq!(slot.pop().unwrap().data, vec![3]);
        assert_eq!(slot.pushed(), 3);
        assert_eq!(slot.dropped(), 2);
    }

    #[test]
    fn pop_timeout_on_empty_slot() {
        let slot = FrameSlot::new();
        assert!(slot.pop_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn pop_wakes_on_push() {
        let slot = Arc::new(FrameSlot::new());
        let consumer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.pop())
        };
        thread::sleep(Duration::from_millis(20));
        slot.push_or_replace(frame(7));
        let got = consumer.join().unwrap();
        assert_eq!(got.unwrap().data, vec![7]);
    }

    #[test]
    fn close_unblocks_consumer() {
        let slot = Arc::new(FrameSlot::new());
        let consumer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.pop())
        };
        thread::sleep(Duration::from_millis(20));
        slot.close();
        assert!(consumer.join().unwrap().is_none());
        assert!(!slot.push_or_replace(frame(1)));
        assert!(slot.pop().is_none());
    }

    #[test]
    fn close_keeps_pending_frame() {
        let slot = FrameSlot::new();
        slot.push_or_replace(frame(4));
        slot.close();
        assert_eq!(slot.pop().unwrap().data, vec![4]);
        assert!(slot.pop().is_none());
    }

    #[test]
    fn slow_consumer_sees_only_latest() {
        let slot = Arc::new(FrameSlot::new());
        let producer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                for i in 0..=200u8 {
                    slot.push_or_replace(frame(i));
                }
            })
        };
        producer.join().unwrap();
        assert_eq!(slot.pop().unwrap().data, vec![200]);
        assert_eq!(slot.pushed() - slot.dropped(), 1);
    }
}
