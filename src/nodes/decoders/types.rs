//! Common decoder types

use crate::runtime::Sample;

/// What the decoder did with one light-pen edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// Qualifying edge; the sample was handed to the light-pen channel
    Accepted(Sample),
    /// No vertical sync seen yet, so there is no reference for the offset
    Unsynced,
    /// Inside the debounce window of the previous qualifying edge
    Debounced,
    /// Parity line low: edge belongs to the other field
    WrongParity,
}

/// Running counts of light-pen edge outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub vsync_edges: u64,
    pub accepted: u64,
    pub unsynced: u64,
    pub debounced: u64,
    pub wrong_parity: u64,
}

impl DecoderStats {
    /// Total light-pen edges seen
    pub fn light_pen_edges(&self) -> u64 {
        self.accepted + self.unsynced + self.debounced + self.wrong_parity
    }

    pub(crate) fn record(&mut self, outcome: &DecodeOutcome) {
        match outcome {
            DecodeOutcome::Accepted(_) => self.accepted += 1,
            DecodeOutcome::Unsynced => self.unsynced += 1,
            DecodeOutcome::Debounced => self.debounced += 1,
            DecodeOutcome::WrongParity => self.wrong_parity += 1,
        }
    }
}
