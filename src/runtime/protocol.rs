//! Read and poll protocol on top of sessions
//!
//! A read hands out the pending sample as the record `"<x>,<y>,<button>\n"`
//! and clears readiness, so every sample reaches exactly one read. Poll
//! reports readiness without consuming; a [`Poller`] waits on several
//! sessions at once and is woken once per new sample.

use bitflags::bitflags;
use crossbeam_channel::{
    Receiver as CrossbeamReceiver, RecvTimeoutError, Sender as CrossbeamSender, bounded,
};
use std::time::{Duration, Instant};

use super::channel::SlotStatus;
use super::errors::{ReadError, ReadResult};
use super::sample::Sample;
use super::session::{Endpoint, Session};
use super::watchdog::OperationGuard;

bitflags! {
    /// Poll result for one session
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Readiness: u8 {
        /// Priority data available (a sample is pending)
        const PRIORITY = 0b0001;
        /// A read will not block
        const READABLE = 0b0010;
        /// The session or the device is gone; nothing will ever arrive
        const HANGUP = 0b0100;
    }
}

/// Whether a read may wait for the next sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Blocking,
    NonBlocking,
}

impl Session {
    /// Read the pending sample.
    ///
    /// `NonBlocking` fails with `WouldBlock` when nothing is pending.
    /// `Blocking` waits for the next sample, or fails with `Closed` if the
    /// session is closed or the device shuts down meanwhile.
    pub fn read_sample(&self, mode: ReadMode) -> ReadResult<Sample> {
        self.consume(mode, |_| Ok(()))
    }

    /// Read the pending sample as its textual record
    pub fn read(&self, mode: ReadMode) -> ReadResult<String> {
        self.read_sample(mode).map(|sample| sample.to_record())
    }

    /// Copy the pending record into `buf` and return its length.
    ///
    /// If the record does not fit, fails with `BufferTooSmall` and leaves the
    /// sample pending.
    pub fn read_into(&self, buf: &mut [u8], mode: ReadMode) -> ReadResult<usize> {
        let available = buf.len();
        let sample = self.consume(mode, |sample| {
            // Runs under the slot lock the edge callback contends on
            let needed = sample.record_len();
            if needed > available {
                return Err(ReadError::BufferTooSmall { needed, available });
            }
            Ok(())
        })?;

        let record = sample.to_record();
        buf[..record.len()].copy_from_slice(record.as_bytes());
        Ok(record.len())
    }

    fn consume(
        &self,
        mode: ReadMode,
        accept: impl Fn(&Sample) -> ReadResult<()>,
    ) -> ReadResult<Sample> {
        if self.is_closed() {
            return Err(ReadError::Closed);
        }
        let result = match mode {
            ReadMode::NonBlocking => self.channel().consume_where(self.generation(), false, accept),
            ReadMode::Blocking => {
                let _guard = self.watchdog_handle.as_ref().map(OperationGuard::new);
                self.channel().consume_where(self.generation(), true, accept)
            }
        };
        match &result {
            Ok(sample) => tracing::trace!("{}: read {}", self.endpoint(), sample),
            Err(ReadError::Closed) => tracing::debug!("{}: read cancelled", self.endpoint()),
            Err(_) => {}
        }
        result
    }

    /// Readiness of this session, without registering for a wake-up
    pub fn poll(&self) -> Readiness {
        if self.is_closed() {
            return Readiness::HANGUP;
        }
        Self::readiness_of(self.channel().status())
    }

    /// Readiness of this session. When nothing is pending, `notify` receives
    /// this session's endpoint once, on the next sample.
    ///
    /// The registration lasts until that sample; drop it earlier with
    /// [`poll_deregister`](Self::poll_deregister).
    pub fn poll_register(&self, notify: &CrossbeamSender<Endpoint>) -> Readiness {
        if self.is_closed() {
            return Readiness::HANGUP;
        }
        Self::readiness_of(self.channel().status_or_register(notify))
    }

    /// Cancel a registration made by [`poll_register`](Self::poll_register)
    pub fn poll_deregister(&self, notify: &CrossbeamSender<Endpoint>) {
        self.channel().deregister(notify);
    }

    fn readiness_of(status: SlotStatus) -> Readiness {
        match status {
            SlotStatus::Empty => Readiness::empty(),
            SlotStatus::Ready => Readiness::PRIORITY | Readiness::READABLE,
            SlotStatus::Closed => Readiness::HANGUP,
        }
    }
}

/// Waits on several sessions until at least one is ready.
///
/// Each `wait` re-polls every session and registers the poller's wake-up
/// channel with those that are not ready, then sleeps on that channel.
/// Registrations are withdrawn before `wait` returns.
pub struct Poller {
    tx: CrossbeamSender<Endpoint>,
    rx: CrossbeamReceiver<Endpoint>,
}

impl Poller {
    /// Create a poller
    pub fn new() -> Self {
        let (tx, rx) = bounded(Endpoint::ALL.len());
        Self { tx, rx }
    }

    /// Wait up to `timeout` for any of `sessions` to become ready.
    ///
    /// Returns the non-empty readiness of each ready session, in input order.
    /// An empty result means the timeout elapsed.
    pub fn wait(&self, sessions: &[&Session], timeout: Duration) -> Vec<(Endpoint, Readiness)> {
        let ready = self.wait_registered(sessions, timeout);
        for session in sessions {
            session.poll_deregister(&self.tx);
        }
        ready
    }

    fn wait_registered(
        &self,
        sessions: &[&Session],
        timeout: Duration,
    ) -> Vec<(Endpoint, Readiness)> {
        // Overflowing deadline means wait forever
        let deadline = Instant::now().checked_add(timeout);
        loop {
            // Wake-ups from earlier rounds are stale; the re-poll below is authoritative.
            while self.rx.try_recv().is_ok() {}

            let ready: Vec<_> = sessions
                .iter()
                .map(|session| (session.endpoint(), session.poll_register(&self.tx)))
                .filter(|(_, readiness)| !readiness.is_empty())
                .collect();
            if !ready.is_empty() {
                return ready;
            }

            let woken = match deadline {
                Some(deadline) => self
                    .rx
                    .recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match woken {
                Ok(endpoint) => tracing::trace!("Poller woken by {}", endpoint),
                // The poller owns a sender, so the channel never disconnects
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                    return Vec::new();
                }
            }
        }
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}
