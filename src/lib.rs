//! CRT light-pen decoder with exclusive, pollable sample endpoints
//!
//! Decodes the raster position of a light pen from two rising-edge lines
//! (the pen sensor and composite vertical sync) and hands each decoded
//! position to exactly one reader.
//!
//! # Architecture
//!
//! - **EdgeClock**: timestamps rising edges in microseconds and reads the
//!   button and odd/even field lines on demand
//! - **PositionDecoder**: debounce and field-parity gated state machine that
//!   turns edges into `Sample { x, y, button }`
//! - **SampleChannel**: single overwrite-on-produce slot per endpoint with
//!   wake-one blocking reads and edge-triggered poll notification
//! - **SessionManager**: one open session per endpoint
//! - **Read protocol**: `"<x>,<y>,<button>\n"` records, blocking and
//!   non-blocking reads, readiness polling and a multi-session [`Poller`]
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use lightpen::{Config, EdgeClock, Endpoint, LightPen, LineId, ReadMode, SimulatedEdgeClock};
//!
//! let clock = Arc::new(SimulatedEdgeClock::new(28));
//! let config = Config::new(LineId(17), LineId(18), LineId(22), LineId(23));
//! let pen = LightPen::start(config, Arc::clone(&clock) as Arc<dyn EdgeClock>)?;
//! let session = pen.open(Endpoint::LightPen)?;
//!
//! clock.set_level(LineId(23), true); // odd field
//! clock.fire(LineId(18), 0);         // vsync
//! clock.fire(LineId(17), 1000);      // beam passes the pen
//!
//! assert_eq!(session.read(ReadMode::NonBlocking)?, "40,15,0\n");
//! # Ok::<(), lightpen::LightpenError>(())
//! ```

use thiserror::Error;

pub mod config;
pub mod driver;
pub mod nodes;
pub mod runtime;

pub use config::Config;
pub use driver::LightPen;

// Re-export edge side
pub use nodes::{
    DecodeOutcome, DecoderStats, EdgeCallback, EdgeClock, LineId, PositionDecoder,
    SimulatedEdgeClock,
};

// Re-export runtime components
pub use runtime::{
    ClockError, ConfigError, Endpoint, OpenError, Poller, ReadError, ReadMode, Readiness, Sample,
    SampleChannel, Session, SessionManager,
};

#[derive(Error, Debug)]
pub enum LightpenError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Edge clock error: {0}")]
    Clock(#[from] ClockError),

    #[error("Open error: {0}")]
    Open(#[from] OpenError),

    #[error("Read error: {0}")]
    Read(#[from] ReadError),
}

pub type Result<T> = std::result::Result<T, LightpenError>;
