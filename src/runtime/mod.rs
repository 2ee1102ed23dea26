//! Runtime support: sample slots, sessions and the read/poll protocol

pub mod channel;
pub mod errors;
pub mod protocol;
pub mod sample;
pub mod session;
pub mod watchdog;

pub use channel::{SampleChannel, SlotStatus};
pub use errors::{ClockError, ConfigError, OpenError, ReadError, ReadResult};
pub use protocol::{Poller, ReadMode, Readiness};
pub use sample::Sample;
pub use session::{Endpoint, Session, SessionManager};
pub use watchdog::{Watchdog, WatchdogHandle};
