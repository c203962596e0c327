//! Digital input sampling
//!
//! The sensor side of the bridge is a single two-valued input line. Everything
//! above this module only sees [`SensorLevel`] samples coming out of an
//! [`InputReader`]; the Raspberry Pi implementation lives in [`gpio`].
//!
//! ```text
//! GPIO pin ──► InputReader::read_level() ──► SensorLevel ──► monitor
//! ```

pub mod gpio;

use std::fmt;

pub use gpio::GpioSensor;

/// A single sample of the input line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorLevel {
    Low,
    High,
}

impl fmt::Display for SensorLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SensorLevel::Low => write!(f, "LOW"),
            SensorLevel::High => write!(f, "HIGH"),
        }
    }
}

/// Last level recorded by the monitor.
///
/// `Unset` is distinct from both levels so the very first sample is always a
/// transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorState {
    #[default]
    Unset,
    Low,
    High,
}

impl From<SensorLevel> for SensorState {
    fn from(level: SensorLevel) -> Self {
        match level {
            SensorLevel::Low => SensorState::Low,
            SensorLevel::High => SensorState::High,
        }
    }
}

impl SensorState {
    /// True when `level` differs from the recorded state
    pub fn differs_from(&self, level: SensorLevel) -> bool {
        *self != SensorState::from(level)
    }
}

// Sensor errors
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("Failed to acquire GPIO peripheral: {0}")]
    AcquireError(#[from] rppal::gpio::Error),

    #[error("Input pin {0} has already been released")]
    Released(u8),
}

/// Source of input line samples.
///
/// `read_level` must not block. `release` gives the underlying hardware back
/// and must be safe to call more than once.
pub trait InputReader {
    fn read_level(&mut self) -> Result<SensorLevel, SensorError>;

    fn release(&mut self);
}
