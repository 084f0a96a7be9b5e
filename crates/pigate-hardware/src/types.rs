//! Common types shared across GPIO implementations.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Logical level of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    /// `High` when `energized` is true.
    #[must_use]
    pub fn from_energized(energized: bool) -> Self {
        if energized { Level::High } else { Level::Low }
    }

    /// Check if this is the high level.
    #[must_use]
    pub fn is_high(self) -> bool {
        matches!(self, Level::High)
    }

    /// Sysfs value file representation.
    #[must_use]
    pub fn as_sysfs(self) -> &'static str {
        match self {
            Level::Low => "0",
            Level::High => "1",
        }
    }
}

/// One of the two Wiegand data lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataLine {
    /// Pulses on D0 encode a `0` bit.
    D0,
    /// Pulses on D1 encode a `1` bit.
    D1,
}

impl DataLine {
    /// The bit value carried by a pulse on this line.
    #[must_use]
    pub fn bit(self) -> u8 {
        match self {
            DataLine::D0 => 0,
            DataLine::D1 => 1,
        }
    }

    /// The line that carries `bit` (any non-zero value maps to D1).
    #[must_use]
    pub fn for_bit(bit: u8) -> Self {
        if bit == 0 { DataLine::D0 } else { DataLine::D1 }
    }
}

/// A falling edge observed on one data line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    pub line: DataLine,
    pub at: Instant,
}

impl Pulse {
    /// Pulse observed now.
    #[must_use]
    pub fn now(line: DataLine) -> Self {
        Self {
            line,
            at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DataLine::D0, 0)]
    #[case(DataLine::D1, 1)]
    fn test_line_bits(#[case] line: DataLine, #[case] bit: u8) {
        assert_eq!(line.bit(), bit);
        assert_eq!(DataLine::for_bit(bit), line);
    }

    #[test]
    fn test_level_from_energized() {
        assert_eq!(Level::from_energized(true), Level::High);
        assert_eq!(Level::from_energized(false), Level::Low);
        assert!(Level::High.is_high());
        assert_eq!(Level::default(), Level::Low);
    }

    #[test]
    fn test_level_sysfs() {
        assert_eq!(Level::High.as_sysfs(), "1");
        assert_eq!(Level::Low.as_sysfs(), "0");
    }
}
