//! State monitor subsystem
//!
//! Implements the sampling side of the bridge in two stages:
//!
//! 1. [`detector`] - Pure transition detection against the last recorded state
//! 2. [`state_monitor`] - Polling loop that samples, detects and publishes
//!
//! # Architecture
//!
//! ```text
//! InputReader ──► TransitionDetector ──► StatePublisher
//!  (sample)        (ON / OFF / nothing)   (retained QoS 0)
//! ```
//!
//! The loop polls every 100ms by default. The polling interval doubles as
//! debounce: changes shorter than one interval collapse into the latest sample.

pub mod detector;
pub mod state_monitor;

pub use detector::TransitionDetector;
pub use state_monitor::{MonitorSettings, MonitorStats, StateMonitor};

use std::future::Future;

use crate::mqtt::{PublishError, PublishMessage};

/// Sink for state messages produced by the monitor.
///
/// Publishing is fire-and-forget: implementations should fail fast rather
/// than wait for the broker.
pub trait StatePublisher {
    fn publish(
        &self,
        message: &PublishMessage,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}
