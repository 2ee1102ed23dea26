//! Light-pen position decoder: edge-by-edge state machine
//!
//! Consumes rising edges from two lines:
//!   - VSync edge: records the frame reference time and resets the light-pen
//!     debounce floor to it. Never produces a sample.
//!   - Light-pen edge: qualifies when a vsync has been seen, more than
//!     `debounce_us` has elapsed since the previous qualifying edge (or the
//!     last vsync), and the parity line is high. A qualifying edge becomes
//!     `Sample { x: offset % line, y: offset / line, button }` where
//!     `offset` is the time since the last vsync.
//!
//! Both edge contexts go through one mutex around [`DecoderState`]. The
//! critical section is a handful of integer operations, two line reads and
//! the channel handoff, none of which wait on a reader.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

use super::types::{DecodeOutcome, DecoderStats};
use crate::config::Config;
use crate::nodes::edge_clock::{EdgeClock, LineId};
use crate::runtime::{Sample, SampleChannel};

/// Mutable decoder state shared by both edge contexts
#[derive(Debug, Clone, Copy, Default)]
pub struct DecoderState {
    /// Time of the last vsync edge; `None` until the first one (Idle)
    pub last_vsync_us: Option<u64>,
    /// Debounce floor: last qualifying light-pen edge or last vsync
    pub last_light_pen_us: u64,
    pub stats: DecoderStats,
}

/// Turns vsync and light-pen edges into position samples
pub struct PositionDecoder {
    line_length_us: u32,
    debounce_us: u64,
    button_line: LineId,
    parity_line: LineId,
    lines: Arc<dyn EdgeClock>,
    state: Mutex<DecoderState>,
    output: Arc<SampleChannel>,
}

impl PositionDecoder {
    /// Create a decoder writing to `output` (the light-pen channel).
    ///
    /// `config` must already be validated; `line_length_us` is non-zero.
    pub fn new(config: &Config, lines: Arc<dyn EdgeClock>, output: Arc<SampleChannel>) -> Self {
        Self {
            line_length_us: config.line_length_us,
            debounce_us: config.debounce_us,
            button_line: config.button_line,
            parity_line: config.parity_line,
            lines,
            state: Mutex::new(DecoderState::default()),
            output,
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, DecoderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle a vsync rising edge at `timestamp_us`
    pub fn on_vsync(&self, timestamp_us: u64) {
        let mut state = self.lock();
        state.last_vsync_us = Some(timestamp_us);
        // Otherwise a pen edge right after the frame boundary would be
        // measured against the previous frame's edge.
        state.last_light_pen_us = timestamp_us;
        state.stats.vsync_edges += 1;
    }

    /// Handle a light-pen rising edge at `timestamp_us`
    pub fn on_light_pen(&self, timestamp_us: u64) -> DecodeOutcome {
        let parity = self.lines.read_line(self.parity_line);

        let mut state = self.lock();
        let outcome = self.decode(&mut state, timestamp_us, parity);
        state.stats.record(&outcome);

        match outcome {
            DecodeOutcome::Accepted(sample) => {
                debug!("#{}: {} at {}us", state.stats.accepted, sample, timestamp_us);
                // Still under the decoder lock so samples reach the slot in edge order.
                self.output.produce(sample);
            }
            discarded => trace!("light pen edge at {}us discarded: {:?}", timestamp_us, discarded),
        }
        outcome
    }

    fn decode(&self, state: &mut DecoderState, timestamp_us: u64, parity: bool) -> DecodeOutcome {
        let Some(last_vsync_us) = state.last_vsync_us else {
            return DecodeOutcome::Unsynced;
        };

        // An edge stamped before the debounce floor saturates to 0 and is rejected.
        if timestamp_us.saturating_sub(state.last_light_pen_us) <= self.debounce_us {
            return DecodeOutcome::Debounced;
        }
        if !parity {
            return DecodeOutcome::WrongParity;
        }

        state.last_light_pen_us = timestamp_us;
        let offset = timestamp_us - last_vsync_us;
        let button = self.lines.read_line(self.button_line);
        DecodeOutcome::Accepted(Sample::from_offset(offset, self.line_length_us, button))
    }

    /// Whether at least one vsync edge has been seen
    pub fn is_synced(&self) -> bool {
        self.lock().last_vsync_us.is_some()
    }

    /// Snapshot of the decoder state
    pub fn state(&self) -> DecoderState {
        *self.lock()
    }

    /// Snapshot of the edge counters
    pub fn stats(&self) -> DecoderStats {
        self.lock().stats
    }
}
