//! Decoded light-pen position

use std::fmt;

/// Position of the light pen on the raster at the moment it saw the beam.
///
/// `x` is the offset within the scan line in microseconds, `y` the number of
/// whole lines since the last vertical sync. `button` is the pen switch level
/// sampled at the same instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sample {
    pub x: u32,
    pub y: u32,
    pub button: u8,
}

impl Sample {
    /// Create a new sample
    pub fn new(x: u32, y: u32, button: u8) -> Self {
        Self { x, y, button }
    }

    /// Decode a raster offset (microseconds since vertical sync) into a position.
    ///
    /// `line_length_us` must be non-zero. `y` saturates at `u32::MAX` when
    /// the last sync is too far back to count the lines.
    #[inline]
    pub fn from_offset(offset_us: u64, line_length_us: u32, button: bool) -> Self {
        let line = u64::from(line_length_us);
        Self {
            // Remainder is below `line_length_us`, which is a u32
            x: (offset_us % line) as u32,
            y: u32::try_from(offset_us / line).unwrap_or(u32::MAX),
            button: u8::from(button),
        }
    }

    /// The textual record handed to readers: `"<x>,<y>,<button>\n"`.
    pub fn to_record(&self) -> String {
        format!("{self}\n")
    }

    /// Length in bytes of [`to_record`](Self::to_record), without formatting it.
    pub fn record_len(&self) -> usize {
        // Two commas and the newline
        decimal_digits(self.x) + decimal_digits(self.y) + decimal_digits(self.button.into()) + 3
    }
}

fn decimal_digits(n: u32) -> usize {
    n.checked_ilog10().map_or(1, |log| log as usize + 1)
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.button)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_offset_splits_line_and_column() {
        let sample = Sample::from_offset(1000, 64, true);
        assert_eq!(sample, Sample::new(40, 15, 1));

        let sample = Sample::from_offset(100, 64, false);
        assert_eq!(sample, Sample::new(36, 1, 0));
    }

    #[test]
    fn test_from_offset_at_line_boundary() {
        assert_eq!(Sample::from_offset(0, 64, false), Sample::new(0, 0, 0));
        assert_eq!(Sample::from_offset(64, 64, false), Sample::new(0, 1, 0));
        assert_eq!(Sample::from_offset(63, 64, false), Sample::new(63, 0, 0));
    }

    #[test]
    fn test_from_offset_saturates_line_count() {
        let lines = u64::from(u32::MAX) + 5;
        let sample = Sample::from_offset(lines * 64 + 3, 64, false);
        assert_eq!(sample, Sample::new(3, u32::MAX, 0));
    }

    #[test]
    fn test_record_len_matches_record() {
        for sample in [
            Sample::new(0, 0, 0),
            Sample::new(9, 10, 1),
            Sample::new(63, 312, 0),
            Sample::new(99_999, 1_000_000, 1),
            Sample::new(u32::MAX, u32::MAX, 1),
        ] {
            assert_eq!(sample.record_len(), sample.to_record().len(), "{sample}");
        }
    }

    #[test]
    fn test_record_format() {
        assert_eq!(Sample::new(40, 15, 1).to_record(), "40,15,1\n");
        assert_eq!(Sample::new(0, 0, 0).to_record(), "0,0,0\n");
        assert_eq!(Sample::new(7, 312, 0).to_record(), "7,312,0\n");
    }
}
