//! # Ingestion Channel
//!
//! The bounded FIFO between producer threads and the dispatcher.
//! Built on `crossbeam-channel`, which already gives the MPSC-safe,
//! non-blocking `try_send` semantics the gate needs without hand-rolling a
//! ring buffer.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};

use crate::error::{Error, ErrorKind, Severity};
use crate::record::{Level, Record};

/// Round-trip handle for the `sync` barrier: a sentinel enqueued
/// alongside ordinary records that the dispatcher signals the instant it is
/// dequeued, without performing any I/O. Lets a producer confirm "every
/// record I submitted before this call has reached the dispatcher" without
/// waiting for destinations to flush.
pub struct SyncBarrier {
    done: Mutex<bool>,
    cond: Condvar,
}

impl SyncBarrier {
    fn new() -> Arc<Self> {
        Arc::new(SyncBarrier {
            done: Mutex::new(false),
            cond: Condvar::new(),
        })
    }

    pub fn signal(&self) {
        *self.done.lock() = true;
        self.cond.notify_all();
    }

    pub fn wait(&self) {
        let mut guard = self.done.lock();
        while !*guard {
            self.cond.wait(&mut guard);
        }
    }

    /// Bounded-time variant of `wait`, backing `Logger::sync_timeout`/
    /// `flush_with_timeout`. Returns `false` if `timeout` elapses first.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.done.lock();
        let deadline = std::time::Instant::now() + timeout;
        while !*guard {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.cond.wait_for(&mut guard, remaining);
        }
        true
    }
}

/// What travels through the ingestion channel: either a producer's record or
/// a sync barrier the dispatcher must signal without dispatching it to any
/// destination.
pub enum Message {
    Record(Record),
    Sync(Arc<SyncBarrier>),
}

/// Producer handle. Cloned per producer thread; cheap, matches
/// `crossbeam_channel::Sender`'s own cloning cost.
#[derive(Clone)]
pub struct ChannelSender {
    inner: Sender<Message>,
}

/// Consumer handle, held only by the dispatcher.
pub struct ChannelReceiver {
    inner: Receiver<Message>,
}

pub fn bounded(capacity: usize) -> (ChannelSender, ChannelReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (ChannelSender { inner: tx }, ChannelReceiver { inner: rx })
}

impl ChannelSender {
    /// Non-blocking submit On a full channel, returns a
    /// `ChannelFull` error classified High for Error-level records (so the
    /// caller can route them to the side-band stderr fallback) and
    /// Medium otherwise.
    pub fn try_send(&self, record: Record) -> Result<(), Error> {
        let level = record.level;
        match self.inner.try_send(Message::Record(record)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(channel_full_error(level)),
            Err(TrySendError::Disconnected(_)) => Err(Error::new(
                ErrorKind::ChannelClosed,
                "submit",
                Severity::High,
            )),
        }
    }

    /// Context-aware variant: waits up to `timeout` for capacity before
    /// giving up.
    pub fn send_timeout(&self, record: Record, timeout: Duration) -> Result<(), Error> {
        let level = record.level;
        match self.inner.send_timeout(Message::Record(record), timeout) {
            Ok(()) => Ok(()),
            Err(crossbeam_channel::SendTimeoutError::Timeout(_)) => Err(channel_full_error(level)),
            Err(crossbeam_channel::SendTimeoutError::Disconnected(_)) => Err(Error::new(
                ErrorKind::ChannelClosed,
                "submit",
                Severity::High,
            )),
        }
    }

    /// Enqueues a sync barrier and blocks until the dispatcher signals it.
    /// Submitted with a blocking send (not `try_send`): a caller explicitly
    /// asking for a sync barrier is not on the non-blocking hot path
    /// `log`/`structured_log` use.
    pub fn sync(&self) -> Result<(), Error> {
        let barrier = SyncBarrier::new();
        self.inner
            .send(Message::Sync(barrier.clone()))
            .map_err(|_| Error::new(ErrorKind::ChannelClosed, "sync", Severity::High))?;
        barrier.wait();
        Ok(())
    }

    /// Bounded-time variant of `sync`, used by `Logger::close_with_timeout`/
    /// `flush_with_timeout` so a stalled destination can't hang shutdown
    /// indefinitely.
    pub fn sync_timeout(&self, timeout: Duration) -> Result<(), Error> {
        let deadline = std::time::Instant::now() + timeout;
        let barrier = SyncBarrier::new();
        self.inner
            .send_timeout(Message::Sync(barrier.clone()), timeout)
            .map_err(|_| Error::new(ErrorKind::ChannelClosed, "sync", Severity::High))?;
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        if barrier.wait_timeout(remaining) {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::ShutdownTimeout, "sync", Severity::Medium)
                .with_cause("sync barrier timed out"))
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

fn channel_full_error(level: Level) -> Error {
    let severity = if level == Level::Error {
        Severity::High
    } else {
        Severity::Medium
    };
    Error::new(ErrorKind::ChannelFull, "submit", severity)
}

impl ChannelReceiver {
    pub fn recv(&self) -> Option<Message> {
        self.inner.recv().ok()
    }

    pub fn try_recv(&self) -> Option<Message> {
        self.inner.try_recv().ok()
    }

    /// Drains remaining records within `grace`, for use during shutdown.
    /// Sync barriers encountered while draining are signalled immediately so
    /// a concurrent `sync()` caller is never left waiting past shutdown.
    pub fn drain_with_deadline(&self, grace: Duration) -> Vec<Record> {
        let deadline = std::time::Instant::now() + grace;
        let mut drained = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.inner.recv_timeout(remaining) {
                Ok(Message::Record(record)) => drained.push(record),
                Ok(Message::Sync(barrier)) => barrier.signal(),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        drained
    }
}
