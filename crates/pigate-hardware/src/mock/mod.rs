//! Mock device implementations for testing and development.
//!
//! These devices are controlled and observed through handles, so tests and
//! the `--mock-hardware` controller mode run without a board.

pub mod output;
pub mod pulse;

pub use output::{MockOutput, MockOutputHandle};
pub use pulse::{MockPulseInput, MockPulseInputHandle};
