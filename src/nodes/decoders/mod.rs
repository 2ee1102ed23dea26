//! Edge decoders
//!
//! Decoders consume timestamped edges from an [`EdgeClock`](crate::nodes::EdgeClock)
//! and hand finished samples to a [`SampleChannel`](crate::runtime::SampleChannel).

pub mod position_decoder;
pub mod types;

// Re-export common types
pub use types::{DecodeOutcome, DecoderStats};

// Re-export decoders
pub use position_decoder::{DecoderState, PositionDecoder};
