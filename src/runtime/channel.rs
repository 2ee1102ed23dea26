//! Single-slot sample channel
//!
//! [`SampleChannel`] hands samples from an edge callback (producer) to a
//! reader (consumer) through one overwrite-on-produce slot:
//!
//! - `produce` replaces any unread sample, marks the slot ready and wakes one
//!   blocked reader. It never waits for the consumer and never allocates.
//! - `try_consume` takes the pending sample or reports `WouldBlock`.
//! - `consume_blocking` waits on a condition variable guarded by the same
//!   mutex as the ready flag, so a `produce` between the check and the wait
//!   cannot be lost.
//! - Poll subscribers are one-shot crossbeam senders fired by the next
//!   `produce` (edge-triggered).
//!
//! The producer side only holds the slot mutex for a copy and a flag update;
//! consumers never hold it across anything longer than that.

use crossbeam_channel::Sender as CrossbeamSender;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use super::errors::{ReadError, ReadResult};
use super::sample::Sample;
use super::session::Endpoint;

/// Readiness of a slot as seen by a poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// No sample pending
    Empty,
    /// A sample is pending and has not been read
    Ready,
    /// The channel was torn down; no sample will ever arrive
    Closed,
}

struct SlotState {
    value: Sample,
    ready: bool,
    closed: bool,
    /// Bumped by `cancel_waiters`. Readers bound to an older generation give up.
    generation: u64,
    /// One-shot readiness subscribers, drained by the next `produce`.
    pollers: Vec<CrossbeamSender<Endpoint>>,
}

/// Overwrite-on-produce, wake-one-waiter slot for one endpoint.
pub struct SampleChannel {
    endpoint: Endpoint,
    state: Mutex<SlotState>,
    data_ready: Condvar,
}

impl SampleChannel {
    /// Create an empty channel for `endpoint`
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            state: Mutex::new(SlotState {
                value: Sample::default(),
                ready: false,
                closed: false,
                generation: 0,
                pollers: Vec::with_capacity(2),
            }),
            data_ready: Condvar::new(),
        }
    }

    /// Endpoint this channel belongs to
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// A panic in a reader must not wedge the edge callback, so poisoning is ignored.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `sample`, overwriting any unread one, and wake one waiter.
    ///
    /// Ignored once the channel is closed.
    pub fn produce(&self, sample: Sample) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.value = sample;
        state.ready = true;
        for poller in state.pollers.drain(..) {
            // Full means the poller already has a wake-up queued.
            let _ = poller.try_send(self.endpoint);
        }
        drop(state);
        self.data_ready.notify_one();
    }

    /// Current generation. Sessions bind to it at open time.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Take the pending sample without waiting.
    pub fn try_consume(&self) -> ReadResult<Sample> {
        let generation = self.generation();
        self.try_consume_for(generation)
    }

    /// Like [`try_consume`](Self::try_consume), failing with `Closed` if the
    /// channel has moved past `generation`.
    pub fn try_consume_for(&self, generation: u64) -> ReadResult<Sample> {
        self.consume_where(generation, false, |_| Ok(()))
    }

    /// Wait until a sample is pending, then take it.
    ///
    /// Returns `Err(ReadError::Closed)` if the channel is closed or
    /// [`cancel_waiters`](Self::cancel_waiters) is called while waiting.
    pub fn consume_blocking(&self) -> ReadResult<Sample> {
        let generation = self.generation();
        self.consume_blocking_for(generation)
    }

    /// Like [`consume_blocking`](Self::consume_blocking), bound to `generation`.
    pub fn consume_blocking_for(&self, generation: u64) -> ReadResult<Sample> {
        self.consume_where(generation, true, |_| Ok(()))
    }

    /// Take the pending sample only if `accept` approves it; a rejected
    /// sample stays pending and the rejection is returned.
    pub(crate) fn consume_where(
        &self,
        generation: u64,
        blocking: bool,
        accept: impl Fn(&Sample) -> ReadResult<()>,
    ) -> ReadResult<Sample> {
        let mut state = self.lock();
        loop {
            if state.closed || state.generation != generation {
                return Err(ReadError::Closed);
            }
            if state.ready {
                accept(&state.value)?;
                state.ready = false;
                return Ok(state.value);
            }
            if !blocking {
                return Err(ReadError::WouldBlock);
            }
            state = self
                .data_ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Whether a sample is pending. Does not consume it.
    pub fn poll_readiness(&self) -> bool {
        self.status() == SlotStatus::Ready
    }

    /// Current slot status
    pub fn status(&self) -> SlotStatus {
        let state = self.lock();
        Self::status_of(&state)
    }

    /// Current slot status; when empty, `notify` is subscribed for the next sample.
    ///
    /// Subscribing the same crossbeam channel twice keeps a single registration.
    pub fn status_or_register(&self, notify: &CrossbeamSender<Endpoint>) -> SlotStatus {
        let mut state = self.lock();
        let status = Self::status_of(&state);
        if status == SlotStatus::Empty && !state.pollers.iter().any(|p| p.same_channel(notify)) {
            state.pollers.push(notify.clone());
        }
        status
    }

    /// Drop the subscription of `notify`, if any.
    pub fn deregister(&self, notify: &CrossbeamSender<Endpoint>) {
        self.lock().pollers.retain(|p| !p.same_channel(notify));
    }

    #[cfg(test)]
    pub(crate) fn poller_count(&self) -> usize {
        self.lock().pollers.len()
    }

    fn status_of(state: &SlotState) -> SlotStatus {
        if state.closed {
            SlotStatus::Closed
        } else if state.ready {
            SlotStatus::Ready
        } else {
            SlotStatus::Empty
        }
    }

    /// Start a new generation: every reader bound to the old one returns
    /// `Closed`, and poll subscriptions are dropped.
    ///
    /// The pending sample, if any, stays in the slot.
    pub fn cancel_waiters(&self) {
        let mut state = self.lock();
        state.generation = state.generation.wrapping_add(1);
        state.pollers.clear();
        drop(state);
        self.data_ready.notify_all();
    }

    /// Permanently close the channel. Discards the pending sample, wakes all
    /// readers and fires every poll subscription so pollers observe the hang-up.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.ready = false;
        for poller in state.pollers.drain(..) {
            let _ = poller.try_send(self.endpoint);
        }
        drop(state);
        self.data_ready.notify_all();
        tracing::debug!("SampleChannel[{}] closed", self.endpoint);
    }

    /// Whether the channel has been closed
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn channel() -> Arc<SampleChannel> {
        Arc::new(SampleChannel::new(Endpoint::LightPen))
    }

    #[test]
    fn test_try_consume_empty_would_block() {
        let ch = channel();
        assert_eq!(ch.try_consume(), Err(ReadError::WouldBlock));
        assert!(!ch.poll_readiness());
    }

    #[test]
    fn test_last_write_wins() {
        let ch = channel();
        ch.produce(Sample::new(1, 2, 0));
        ch.produce(Sample::new(3, 4, 1));

        assert_eq!(ch.try_consume(), Ok(Sample::new(3, 4, 1)));
        assert_eq!(ch.try_consume(), Err(ReadError::WouldBlock));
    }

    #[test]
    fn test_poll_does_not_consume() {
        let ch = channel();
        ch.produce(Sample::new(5, 6, 0));

        assert!(ch.poll_readiness());
        assert!(ch.poll_readiness());
        assert_eq!(ch.try_consume(), Ok(Sample::new(5, 6, 0)));
        assert!(!ch.poll_readiness());
    }

    #[test]
    fn test_consume_blocking_wakes_on_produce() {
        let ch = channel();
        let reader = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || ch.consume_blocking())
        };

        thread::sleep(Duration::from_millis(50));
        ch.produce(Sample::new(36, 1, 0));

        assert_eq!(reader.join().unwrap(), Ok(Sample::new(36, 1, 0)));
        assert_eq!(ch.try_consume(), Err(ReadError::WouldBlock));
    }

    #[test]
    fn test_consume_blocking_returns_pending_immediately() {
        let ch = channel();
        ch.produce(Sample::new(9, 9, 1));
        assert_eq!(ch.consume_blocking(), Ok(Sample::new(9, 9, 1)));
    }

    #[test]
    fn test_no_lost_wakeup_under_contention() {
        let ch = channel();
        let rounds = 200;

        let (ack_tx, ack_rx) = bounded::<()>(0);
        let reader = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || {
                let mut seen = Vec::with_capacity(rounds);
                for _ in 0..rounds {
                    seen.push(ch.consume_blocking().unwrap().x);
                    ack_tx.send(()).unwrap();
                }
                seen
            })
        };

        for i in 0..rounds {
            ch.produce(Sample::new(i as u32, 0, 0));
            ack_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }

        let seen = reader.join().unwrap();
        assert_eq!(seen, (0..rounds as u32).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancel_unblocks_reader_but_keeps_sample() {
        let ch = channel();
        let generation = ch.generation();
        let reader = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || ch.consume_blocking_for(generation))
        };

        thread::sleep(Duration::from_millis(50));
        ch.cancel_waiters();
        assert_eq!(reader.join().unwrap(), Err(ReadError::Closed));

        ch.produce(Sample::new(1, 1, 1));
        ch.cancel_waiters();
        assert_eq!(ch.try_consume(), Ok(Sample::new(1, 1, 1)));
    }

    #[test]
    fn test_stale_generation_is_closed() {
        let ch = channel();
        let old = ch.generation();
        ch.produce(Sample::new(2, 2, 0));
        ch.cancel_waiters();

        assert_eq!(ch.try_consume_for(old), Err(ReadError::Closed));
        assert_eq!(ch.consume_blocking_for(old), Err(ReadError::Closed));
        assert_eq!(ch.try_consume_for(ch.generation()), Ok(Sample::new(2, 2, 0)));
    }

    #[test]
    fn test_rejected_sample_stays_pending() {
        let ch = channel();
        ch.produce(Sample::new(4, 4, 0));

        let generation = ch.generation();
        assert_eq!(
            ch.consume_where(generation, false, |_| Err(ReadError::BufferTooSmall {
                needed: 6,
                available: 0
            })),
            Err(ReadError::BufferTooSmall { needed: 6, available: 0 })
        );
        assert!(ch.poll_readiness());
        assert_eq!(ch.try_consume(), Ok(Sample::new(4, 4, 0)));
    }

    #[test]
    fn test_close_unblocks_and_rejects_further_samples() {
        let ch = channel();
        let reader = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || ch.consume_blocking())
        };

        thread::sleep(Duration::from_millis(50));
        ch.close();
        assert_eq!(reader.join().unwrap(), Err(ReadError::Closed));

        ch.produce(Sample::new(1, 1, 1));
        assert_eq!(ch.try_consume(), Err(ReadError::Closed));
        assert_eq!(ch.status(), SlotStatus::Closed);
    }

    #[test]
    fn test_poll_registration_is_edge_triggered() {
        let ch = channel();
        let (tx, rx) = bounded::<Endpoint>(4);

        assert_eq!(ch.status_or_register(&tx), SlotStatus::Empty);
        // Duplicate registration collapses into one
        assert_eq!(ch.status_or_register(&tx), SlotStatus::Empty);

        ch.produce(Sample::new(1, 0, 0));
        assert_eq!(rx.try_recv(), Ok(Endpoint::LightPen));
        assert!(rx.try_recv().is_err());

        // Not re-armed until the poller registers again
        ch.produce(Sample::new(2, 0, 0));
        assert!(rx.try_recv().is_err());

        assert_eq!(ch.status_or_register(&tx), SlotStatus::Ready);
    }

    #[test]
    fn test_deregister_drops_subscription() {
        let ch = channel();
        let (tx, rx) = bounded::<Endpoint>(1);
        let (other_tx, other_rx) = bounded::<Endpoint>(1);
        ch.status_or_register(&tx);
        ch.status_or_register(&other_tx);
        assert_eq!(ch.poller_count(), 2);

        ch.deregister(&tx);
        assert_eq!(ch.poller_count(), 1);

        ch.produce(Sample::new(3, 0, 0));
        assert!(rx.try_recv().is_err());
        assert_eq!(other_rx.try_recv(), Ok(Endpoint::LightPen));
    }

    #[test]
    fn test_close_fires_pollers() {
        let ch = channel();
        let (tx, rx) = bounded::<Endpoint>(1);
        assert_eq!(ch.status_or_register(&tx), SlotStatus::Empty);

        ch.close();
        assert_eq!(rx.try_recv(), Ok(Endpoint::LightPen));
    }
}
