//! Per-shard bounded ingestion queue.
//!
//! Writers push points into the buffer; the shard worker drains it in
//! batches. The buffer is the only place a write can block: once full, a
//! `push` blocks up to the caller's deadline, then fails with
//! [`Error::Backpressure`].

use crossbeam::channel::{Receiver, SendTimeoutError, Sender};
use std::time::{Duration, Instant};
use tsdb_core::error::{Error, Result};
use tsdb_core::types::Point;

/// A bounded MPSC queue of points awaiting the shard's Segment Builder.
pub struct WriteBuffer {
    sender: Sender<Point>,
    receiver: Receiver<Point>,
}

impl WriteBuffer {
    /// Create a buffer holding at most `capacity` points before writers
    /// start blocking.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam::channel::bounded(capacity.max(1));
        WriteBuffer { sender, receiver }
    }

    /// A cheap-to-clone handle writers use to push points.
    pub fn sender(&self) -> WriteBufferSender {
        WriteBufferSender { sender: self.sender.clone() }
    }

    /// The receiving half the shard worker drains.
    pub fn receiver(&self) -> Receiver<Point> {
        self.receiver.clone()
    }
}

/// Writer-facing handle into a shard's [`WriteBuffer`].
#[derive(Clone)]
pub struct WriteBufferSender {
    sender: Sender<Point>,
}

impl WriteBufferSender {
    /// Push one point, blocking until `deadline` if the buffer is full.
    /// Returns `Backpressure` if the deadline passes before room frees up.
    pub fn push(&self, point: Point, deadline: Instant) -> Result<()> {
        match self.sender.send_deadline(point, deadline) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(Error::Backpressure("write buffer full".into())),
            Err(SendTimeoutError::Disconnected(_)) => {
                Err(Error::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "shard worker stopped")))
            }
        }
    }

    /// Push one point with a fixed timeout from now.
    pub fn push_with_timeout(&self, point: Point, timeout: Duration) -> Result<()> {
        self.push(point, Instant::now() + timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsdb_core::types::SeriesId;

    fn point(ts: i64) -> Point {
        Point { series_id: SeriesId(1), ts, value: 1.0 }
    }

    #[test]
    fn push_and_drain_round_trips() {
        let buffer = WriteBuffer::new(4);
        let sender = buffer.sender();
        sender.push_with_timeout(point(1), Duration::from_millis(100)).unwrap();
        let received = buffer.receiver().recv().unwrap();
        assert_eq!(received.ts, 1);
    }

    #[test]
    fn push_times_out_when_full_and_undrained() {
        let buffer = WriteBuffer::new(1);
        let sender = buffer.sender();
        sender.push_with_timeout(point(1), Duration::from_millis(50)).unwrap();
        let err = sender.push_with_timeout(point(2), Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, Error::Backpressure(_)));
    }
}
