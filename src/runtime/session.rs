//! Endpoints and exclusive sessions
//!
//! The light pen exposes exactly two endpoints. Each one owns a
//! [`SampleChannel`] for the lifetime of the [`SessionManager`] and can be
//! held by at most one [`Session`] at a time.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use super::channel::SampleChannel;
use super::errors::OpenError;
use super::watchdog::{Watchdog, WatchdogHandle};

/// Logical sample stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Decoded pen positions (index 0)
    LightPen,
    /// Vertical sync stream (index 1). Nothing is ever produced here.
    VSync,
}

impl Endpoint {
    /// Both endpoints, in index order
    pub const ALL: [Endpoint; 2] = [Endpoint::LightPen, Endpoint::VSync];

    /// Addressable index of this endpoint
    pub fn index(self) -> usize {
        match self {
            Endpoint::LightPen => 0,
            Endpoint::VSync => 1,
        }
    }

    /// Endpoint at `index`, if any
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "lightpen{}", self.index())
    }
}

struct EndpointEntry {
    channel: Arc<SampleChannel>,
    held: AtomicBool,
}

/// Owns both endpoints' channels and enforces one open session per endpoint.
pub struct SessionManager {
    entries: [Arc<EndpointEntry>; 2],
    shut_down: AtomicBool,
    watchdog: Option<Watchdog>,
}

impl SessionManager {
    /// Create a manager with an empty channel per endpoint
    pub fn new() -> Self {
        Self {
            entries: Endpoint::ALL.map(|endpoint| {
                Arc::new(EndpointEntry {
                    channel: Arc::new(SampleChannel::new(endpoint)),
                    held: AtomicBool::new(false),
                })
            }),
            shut_down: AtomicBool::new(false),
            watchdog: None,
        }
    }

    /// Report blocking reads through `watchdog`
    pub fn with_watchdog(mut self, watchdog: Watchdog) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    /// Shared reference to an endpoint's channel (for the producer side)
    pub fn channel(&self, endpoint: Endpoint) -> Arc<SampleChannel> {
        Arc::clone(&self.entries[endpoint.index()].channel)
    }

    /// Open an exclusive session on `endpoint`
    pub fn open(&self, endpoint: Endpoint) -> Result<Session, OpenError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(OpenError::ShutDown);
        }

        let entry = &self.entries[endpoint.index()];
        if entry
            .held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(OpenError::AlreadyOpen(endpoint));
        }

        let generation = entry.channel.generation();
        let watchdog_handle = self
            .watchdog
            .as_ref()
            .map(|wd| wd.register_reader(&endpoint.to_string(), "read"));

        info!("{}: session opened", endpoint);
        Ok(Session {
            endpoint,
            entry: Arc::clone(entry),
            generation,
            closed: AtomicBool::new(false),
            watchdog_handle,
        })
    }

    /// Whether `endpoint` currently has an open session
    pub fn is_open(&self, endpoint: Endpoint) -> bool {
        self.entries[endpoint.index()].held.load(Ordering::Acquire)
    }

    /// Refuse further opens and close both channels, waking every reader.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        for entry in &self.entries {
            entry.channel.close();
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive handle on one endpoint.
///
/// `Session` is `Sync`: one thread may block in a read while another closes
/// the session, which makes the read return `ReadError::Closed`. Dropping the
/// session closes it.
pub struct Session {
    endpoint: Endpoint,
    entry: Arc<EndpointEntry>,
    generation: u64,
    closed: AtomicBool,
    pub(crate) watchdog_handle: Option<WatchdogHandle>,
}

impl Session {
    /// Endpoint this session holds
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub(crate) fn channel(&self) -> &SampleChannel {
        &self.entry.channel
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release the endpoint. Readers blocked on this session return
    /// `Closed`; a pending sample stays for the next session. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Cancel before releasing so the next session binds to the new generation.
        self.entry.channel.cancel_waiters();
        self.entry.held.store(false, Ordering::Release);
        info!("{}: session closed", self.endpoint);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("generation", &self.generation)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::errors::ReadError;
    use crate::runtime::sample::Sample;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_endpoint_indices() {
        assert_eq!(Endpoint::LightPen.index(), 0);
        assert_eq!(Endpoint::VSync.index(), 1);
        assert_eq!(Endpoint::from_index(1), Some(Endpoint::VSync));
        assert_eq!(Endpoint::from_index(2), None);
        assert_eq!(Endpoint::LightPen.to_string(), "lightpen0");
    }

    #[test]
    fn test_open_is_exclusive() {
        let manager = SessionManager::new();
        let session = manager.open(Endpoint::LightPen).unwrap();

        assert_eq!(
            manager.open(Endpoint::LightPen).unwrap_err(),
            OpenError::AlreadyOpen(Endpoint::LightPen)
        );
        // The other endpoint is independent
        let vsync = manager.open(Endpoint::VSync).unwrap();

        session.close();
        assert!(!manager.is_open(Endpoint::LightPen));
        let reopened = manager.open(Endpoint::LightPen).unwrap();
        assert_eq!(reopened.endpoint(), Endpoint::LightPen);
        drop(vsync);
    }

    #[test]
    fn test_drop_releases_endpoint() {
        let manager = SessionManager::new();
        {
            let _session = manager.open(Endpoint::VSync).unwrap();
            assert!(manager.is_open(Endpoint::VSync));
        }
        assert!(!manager.is_open(Endpoint::VSync));
        assert!(manager.open(Endpoint::VSync).is_ok());
    }

    #[test]
    fn test_double_close_does_not_release_new_holder() {
        let manager = SessionManager::new();
        let first = manager.open(Endpoint::LightPen).unwrap();
        first.close();

        let second = manager.open(Endpoint::LightPen).unwrap();
        first.close();
        drop(first);

        assert!(manager.is_open(Endpoint::LightPen));
        assert!(!second.is_closed());
    }

    #[test]
    fn test_close_keeps_pending_sample() {
        let manager = SessionManager::new();
        let producer = manager.channel(Endpoint::LightPen);

        let session = manager.open(Endpoint::LightPen).unwrap();
        producer.produce(Sample::new(3, 4, 1));
        session.close();

        let session = manager.open(Endpoint::LightPen).unwrap();
        assert_eq!(
            session.channel().try_consume_for(session.generation()),
            Ok(Sample::new(3, 4, 1))
        );
    }

    #[test]
    fn test_close_cancels_blocked_reader() {
        let manager = SessionManager::new();
        let session = Arc::new(manager.open(Endpoint::LightPen).unwrap());

        let reader = {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                session
                    .channel()
                    .consume_blocking_for(session.generation())
            })
        };

        thread::sleep(Duration::from_millis(50));
        session.close();
        assert_eq!(reader.join().unwrap(), Err(ReadError::Closed));
    }

    #[test]
    fn test_shutdown_refuses_open() {
        let manager = SessionManager::new();
        manager.shutdown();
        assert_eq!(
            manager.open(Endpoint::LightPen).unwrap_err(),
            OpenError::ShutDown
        );
        assert!(manager.channel(Endpoint::VSync).is_closed());
    }
}
