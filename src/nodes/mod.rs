//! Edge-driven input side
//!
//! - **Edge clock**: timestamps rising edges on the light-pen and vsync lines
//!   and reads the button and parity lines on demand
//! - **Decoders**: turn those edges into position samples
//!
//! Data flows one way: edge clock → decoder → light-pen sample channel.

pub mod decoders;
pub mod edge_clock;

pub use decoders::{DecodeOutcome, DecoderStats, PositionDecoder};
pub use edge_clock::{EdgeCallback, EdgeClock, LineId, SimulatedEdgeClock};
