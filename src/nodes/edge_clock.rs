//! Edge clock backends
//!
//! An [`EdgeClock`] timestamps rising edges on subscribed input lines and
//! reads auxiliary lines on demand. Real hardware backends deliver callbacks
//! from interrupt context; [`SimulatedEdgeClock`] delivers them on whichever
//! thread calls [`fire`](SimulatedEdgeClock::fire), so independent threads
//! behave like independent interrupt sources.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use crate::runtime::errors::ClockError;

/// Identifier of a physical input line (e.g. a GPIO number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineId(pub u32);

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rising-edge handler; receives the edge time in monotonic microseconds.
///
/// Runs in the backend's edge context and must not block.
pub type EdgeCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Source of timestamped rising edges and on-demand line levels
pub trait EdgeClock: Send + Sync {
    /// Whether `line` exists on this backend
    fn is_valid_line(&self, line: LineId) -> bool;

    /// Deliver every rising edge on `line` to `on_rising_edge`
    fn subscribe(&self, line: LineId, on_rising_edge: EdgeCallback) -> Result<(), ClockError>;

    /// Stop delivering edges for `line`. No-op if not subscribed.
    fn unsubscribe(&self, line: LineId);

    /// Current level of `line` (`true` = high)
    fn read_line(&self, line: LineId) -> bool;
}

/// In-process edge clock driven by explicit `fire` calls
pub struct SimulatedEdgeClock {
    levels: Vec<AtomicBool>,
    subscribers: RwLock<HashMap<LineId, EdgeCallback>>,
    origin: Instant,
}

impl SimulatedEdgeClock {
    /// Create a backend with lines `0..line_count`, all low
    pub fn new(line_count: u32) -> Self {
        Self {
            levels: (0..line_count).map(|_| AtomicBool::new(false)).collect(),
            subscribers: RwLock::new(HashMap::new()),
            origin: Instant::now(),
        }
    }

    /// Drive `line` high or low. Invalid lines are ignored.
    pub fn set_level(&self, line: LineId, high: bool) {
        if let Some(level) = self.levels.get(line.0 as usize) {
            level.store(high, Ordering::Release);
        }
    }

    /// Deliver a rising edge on `line` stamped `timestamp_us`, on the calling thread.
    ///
    /// Returns `false` if nobody is subscribed to `line`.
    pub fn fire(&self, line: LineId, timestamp_us: u64) -> bool {
        let callback = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&line)
            .cloned();
        match callback {
            Some(callback) => {
                callback(timestamp_us);
                true
            }
            None => false,
        }
    }

    /// Deliver a rising edge on `line` stamped with the current time
    pub fn fire_now(&self, line: LineId) -> bool {
        self.fire(line, self.now_us())
    }

    /// Monotonic microseconds since this backend was created
    pub fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    /// Whether `line` has an edge subscriber
    pub fn is_subscribed(&self, line: LineId) -> bool {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&line)
    }
}

impl EdgeClock for SimulatedEdgeClock {
    fn is_valid_line(&self, line: LineId) -> bool {
        (line.0 as usize) < self.levels.len()
    }

    fn subscribe(&self, line: LineId, on_rising_edge: EdgeCallback) -> Result<(), ClockError> {
        if !self.is_valid_line(line) {
            return Err(ClockError::InvalidLine(line));
        }
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if subscribers.contains_key(&line) {
            return Err(ClockError::AlreadySubscribed(line));
        }
        subscribers.insert(line, on_rising_edge);
        Ok(())
    }

    fn unsubscribe(&self, line: LineId) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&line);
    }

    fn read_line(&self, line: LineId) -> bool {
        self.levels
            .get(line.0 as usize)
            .is_some_and(|level| level.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_fire_reaches_subscriber() {
        let clock = SimulatedEdgeClock::new(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            clock
                .subscribe(LineId(3), Arc::new(move |t: u64| seen.lock().unwrap().push(t)))
                .unwrap();
        }

        assert!(clock.fire(LineId(3), 10));
        assert!(clock.fire(LineId(3), 20));
        assert!(!clock.fire(LineId(4), 30));
        assert_eq!(*seen.lock().unwrap(), vec![10, 20]);
    }

    #[test]
    fn test_subscribe_rejects_invalid_and_duplicate_lines() {
        let clock = SimulatedEdgeClock::new(4);
        assert_eq!(
            clock.subscribe(LineId(4), Arc::new(|_: u64| {})),
            Err(ClockError::InvalidLine(LineId(4)))
        );

        clock.subscribe(LineId(1), Arc::new(|_: u64| {})).unwrap();
        assert_eq!(
            clock.subscribe(LineId(1), Arc::new(|_: u64| {})),
            Err(ClockError::AlreadySubscribed(LineId(1)))
        );

        clock.unsubscribe(LineId(1));
        assert!(!clock.is_subscribed(LineId(1)));
        assert!(clock.subscribe(LineId(1), Arc::new(|_: u64| {})).is_ok());
    }

    #[test]
    fn test_levels() {
        let clock = SimulatedEdgeClock::new(4);
        assert!(!clock.read_line(LineId(2)));
        clock.set_level(LineId(2), true);
        assert!(clock.read_line(LineId(2)));

        // Out of range lines read low and ignore writes
        clock.set_level(LineId(9), true);
        assert!(!clock.read_line(LineId(9)));
    }
}
