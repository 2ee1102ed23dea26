//! Stalled-read watchdog
//!
//! Low-overhead monitoring using atomic timestamps instead of locks.
//! Each session stores the start time of its blocking read in an atomic
//! variable, and the watchdog periodically scans these timestamps to report
//! readers that have been waiting longer than the configured threshold.
//!
//! A stalled read is not an error (a reader on the vsync endpoint never
//! wakes), so the watchdog only logs.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Timestamp in milliseconds since UNIX_EPOCH
#[inline(always)]
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Shared state for a single reader's operation tracking
struct ReaderState {
    /// Timestamp (ms since epoch) when the current read started, or 0 if idle
    last_op_start: AtomicU64,
    /// Track if we've already warned about this read being blocked
    has_warned: AtomicBool,
    endpoint: String,
    operation: &'static str,
}

/// Handle to a reader's watchdog state (held by a session)
#[derive(Clone)]
pub struct WatchdogHandle {
    state: Arc<ReaderState>,
}

impl WatchdogHandle {
    /// Mark the start of a blocking operation (stores current timestamp)
    #[inline(always)]
    pub fn start_operation(&self) {
        // 0 means idle, so clamp a pathological clock to 1
        self.state
            .last_op_start
            .store(now_millis().max(1), Ordering::Relaxed);
        self.state.has_warned.store(false, Ordering::Relaxed);
    }

    /// Mark the end of a blocking operation (clears timestamp to 0)
    #[inline(always)]
    pub fn finish_operation(&self) {
        if self.state.has_warned.load(Ordering::Relaxed) {
            info!(
                "UNBLOCKED: {} on '{}'",
                self.state.operation, self.state.endpoint
            );
            self.state.has_warned.store(false, Ordering::Relaxed);
        }
        self.state.last_op_start.store(0, Ordering::Relaxed);
    }

    /// Whether the current operation has been reported as stalled
    pub fn has_warned(&self) -> bool {
        self.state.has_warned.load(Ordering::Relaxed)
    }
}

/// Interval between scans of the registered readers
const SCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Shared watchdog state
#[derive(Clone)]
pub struct Watchdog {
    readers: Arc<Mutex<Vec<Weak<ReaderState>>>>,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
    threshold: Duration,
}

impl Watchdog {
    /// Create a new watchdog reporting reads blocked longer than `threshold`
    pub fn new(threshold: Duration) -> Self {
        let (stop_tx, stop_rx) = bounded(1);
        Self {
            readers: Arc::new(Mutex::new(Vec::new())),
            stop_tx,
            stop_rx,
            threshold,
        }
    }

    /// How long a read may block before it is reported
    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Register a new reader for monitoring
    pub fn register_reader(&self, endpoint: &str, operation: &'static str) -> WatchdogHandle {
        let state = Arc::new(ReaderState {
            last_op_start: AtomicU64::new(0),
            has_warned: AtomicBool::new(false),
            endpoint: endpoint.to_string(),
            operation,
        });

        self.readers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(&state));

        WatchdogHandle { state }
    }

    /// Check for blocked reads; returns how many are currently past the threshold
    pub fn check_for_blocked(&self) -> usize {
        let now = now_millis();
        let threshold_ms = self.threshold.as_millis() as u64;
        let mut blocked = 0;

        let mut readers = self.readers.lock().unwrap_or_else(PoisonError::into_inner);

        // Remove dead weak references and check live ones
        readers.retain(|weak| {
            let Some(state) = weak.upgrade() else {
                return false;
            };
            let start = state.last_op_start.load(Ordering::Relaxed);
            if start > 0 {
                let duration_ms = now.saturating_sub(start);
                if duration_ms >= threshold_ms {
                    blocked += 1;
                    // Only warn once per blocking operation
                    if !state.has_warned.swap(true, Ordering::Relaxed) {
                        warn!(
                            "BLOCKED: {} on '{}' for {:.1}s",
                            state.operation,
                            state.endpoint,
                            duration_ms as f64 / 1000.0
                        );
                    }
                }
            }
            true
        });

        blocked
    }

    /// Start the watchdog monitoring thread
    pub fn start_monitoring_thread(&self) -> JoinHandle<()> {
        let watchdog = self.clone();
        std::thread::spawn(move || {
            // The watchdog holds a sender too, so only `stop` ends the loop
            while let Err(RecvTimeoutError::Timeout) =
                watchdog.stop_rx.recv_timeout(SCAN_INTERVAL)
            {
                watchdog.check_for_blocked();
            }
        })
    }

    /// Stop the watchdog monitoring thread, waking it if it is waiting
    pub fn stop(&self) {
        // Full means a stop is already queued
        let _ = self.stop_tx.try_send(());
    }
}

/// RAII guard for tracking an operation - near-zero cost (just atomic stores)
pub struct OperationGuard<'a> {
    handle: &'a WatchdogHandle,
}

impl<'a> OperationGuard<'a> {
    #[inline(always)]
    pub fn new(handle: &'a WatchdogHandle) -> Self {
        handle.start_operation();
        Self { handle }
    }
}

impl Drop for OperationGuard<'_> {
    #[inline(always)]
    fn drop(&mut self) {
        self.handle.finish_operation();
    }
}
