//! Startup configuration

use std::time::Duration;

use crate::nodes::{EdgeClock, LineId};
use crate::runtime::ConfigError;

/// Duration of one PAL scan line in microseconds
pub const PAL_LINE_LENGTH_US: u32 = 64;

/// Minimum re-trigger interval for the light-pen sensor, two PAL lines
pub const DEFAULT_DEBOUNCE_US: u64 = 128;

/// Default threshold before a blocked read is reported
pub const DEFAULT_READ_STALL_WARNING: Duration = Duration::from_secs(5);

/// Line assignment and timing constants, fixed once the light pen starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Edge line of the light-pen sensor
    pub light_pen_line: LineId,
    /// Edge line of the composite vertical sync
    pub vsync_line: LineId,
    /// Level line of the pen button, read on each qualifying edge
    pub button_line: LineId,
    /// Level line of the odd/even field indicator
    pub parity_line: LineId,
    /// Scan line period, the modulus for the x coordinate
    pub line_length_us: u32,
    /// Light-pen edges closer than this to the previous one are ignored
    pub debounce_us: u64,
    /// Report blocking reads stalled this long; `None` disables the watchdog
    pub read_stall_warning: Option<Duration>,
}

impl Config {
    /// Create a configuration with PAL timing
    pub fn new(
        light_pen_line: LineId,
        vsync_line: LineId,
        button_line: LineId,
        parity_line: LineId,
    ) -> Self {
        Self {
            light_pen_line,
            vsync_line,
            button_line,
            parity_line,
            line_length_us: PAL_LINE_LENGTH_US,
            debounce_us: DEFAULT_DEBOUNCE_US,
            read_stall_warning: Some(DEFAULT_READ_STALL_WARNING),
        }
    }

    /// Set the scan line period
    pub fn with_line_length_us(mut self, line_length_us: u32) -> Self {
        self.line_length_us = line_length_us;
        self
    }

    /// Set the debounce window
    pub fn with_debounce_us(mut self, debounce_us: u64) -> Self {
        self.debounce_us = debounce_us;
        self
    }

    /// Set or disable the stalled-read warning
    pub fn with_read_stall_warning(mut self, threshold: Option<Duration>) -> Self {
        self.read_stall_warning = threshold;
        self
    }

    /// Every line with its role, in allocation order
    pub fn lines(&self) -> [(&'static str, LineId); 4] {
        [
            ("light pen sensor", self.light_pen_line),
            ("vsync", self.vsync_line),
            ("light pen button", self.button_line),
            ("odd/even field indicator", self.parity_line),
        ]
    }

    /// Check the configuration against the lines `clock` provides
    pub fn validate(&self, clock: &dyn EdgeClock) -> Result<(), ConfigError> {
        if self.line_length_us == 0 {
            return Err(ConfigError::ZeroLineLength);
        }

        let lines = self.lines();
        for (i, &(role, line)) in lines.iter().enumerate() {
            if !clock.is_valid_line(line) {
                return Err(ConfigError::InvalidLine { role, line });
            }
            if let Some(&(first, _)) = lines[..i].iter().find(|(_, other)| *other == line) {
                return Err(ConfigError::DuplicateLine {
                    line,
                    first,
                    second: role,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::SimulatedEdgeClock;

    fn config() -> Config {
        Config::new(LineId(17), LineId(18), LineId(22), LineId(23))
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert_eq!(config.line_length_us, 64);
        assert_eq!(config.debounce_us, 128);
        assert_eq!(config.read_stall_warning, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_valid_config() {
        let clock = SimulatedEdgeClock::new(28);
        assert_eq!(config().validate(&clock), Ok(()));
    }

    #[test]
    fn test_invalid_line() {
        let clock = SimulatedEdgeClock::new(20);
        assert_eq!(
            config().validate(&clock),
            Err(ConfigError::InvalidLine {
                role: "light pen button",
                line: LineId(22)
            })
        );
    }

    #[test]
    fn test_duplicate_line() {
        let clock = SimulatedEdgeClock::new(28);
        let config = Config::new(LineId(17), LineId(18), LineId(22), LineId(17));
        assert_eq!(
            config.validate(&clock),
            Err(ConfigError::DuplicateLine {
                line: LineId(17),
                first: "light pen sensor",
                second: "odd/even field indicator",
            })
        );
    }

    #[test]
    fn test_zero_line_length() {
        let clock = SimulatedEdgeClock::new(28);
        assert_eq!(
            config().with_line_length_us(0).validate(&clock),
            Err(ConfigError::ZeroLineLength)
        );
    }
}
