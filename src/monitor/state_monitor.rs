use chrono::Local;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{StatePublisher, TransitionDetector};
use crate::mqtt::{Payload, PublishMessage};
use crate::sensor::InputReader;

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(60);

// Monitor settings
#[derive(Clone, Debug)]
pub struct MonitorSettings {
    pub topic: String,
    pub poll_interval_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            topic: "motion-mqtt".to_string(),
            poll_interval_ms: 100,
        }
    }
}

/// Counters collected while the loop runs
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub samples: u64,
    pub transitions: u64,
    pub published: u64,
    pub failed: u64,
    pub abandoned: u64,
    pub unreadable: u64,
}

/// Polling loop bridging one input line to one topic.
///
/// Each iteration samples the reader, hands the level to the
/// [`TransitionDetector`] and publishes at most one message. A failed publish
/// is logged and dropped; the level still counts as recorded, so the next
/// publish happens only on the next real transition.
pub struct StateMonitor<R, P> {
    reader: R,
    publisher: P,
    detector: TransitionDetector,
    settings: MonitorSettings,
    stats: MonitorStats,
}

impl<R: InputReader, P: StatePublisher> StateMonitor<R, P> {
    pub fn new(reader: R, publisher: P, settings: Option<MonitorSettings>) -> Self {
        let settings = settings.unwrap_or_default();
        debug!("Creating state monitor with settings: {:?}", settings);

        Self {
            reader,
            publisher,
            detector: TransitionDetector::new(),
            settings,
            stats: MonitorStats::default(),
        }
    }

    /// One sample/compare/publish step. Returns the payload of a detected
    /// transition, whether or not publishing it succeeded.
    ///
    /// A publish still pending when `shutdown` is cancelled is abandoned.
    pub async fn tick(&mut self, shutdown: &CancellationToken) -> Option<Payload> {
        self.stats.samples += 1;

        let level = match self.reader.read_level() {
            Ok(level) => level,
            Err(e) => {
                warn!("Skipping unreadable sample: {}", e);
                self.stats.unreadable += 1;
                return None;
            }
        };

        let payload = self.detector.observe(level)?;
        self.stats.transitions += 1;

        match payload {
            Payload::On => info!("Sensor detected! {}", Local::now().to_rfc2822()),
            Payload::Off => debug!("Sensor cleared (level {})", level),
        }

        let message = PublishMessage::state(self.settings.topic.as_str(), payload);
        let outcome = tokio::select! {
            biased;
            result = self.publisher.publish(&message) => result,
            _ = shutdown.cancelled() => {
                self.stats.abandoned += 1;
                warn!("Abandoned in-flight publish of {} on shutdown", message);
                return Some(payload);
            }
        };

        match outcome {
            Ok(()) => {
                self.stats.published += 1;
                debug!("Published {}", message);
            }
            Err(e) => {
                self.stats.failed += 1;
                error!("Failed to publish {}: {}", message, e);
            }
        }

        Some(payload)
    }

    /// Runs until `shutdown` is cancelled.
    ///
    /// Cancellation is checked between iterations and while a publish is in
    /// flight; an unfinished publish is abandoned rather than awaited.
    pub async fn run(&mut self, shutdown: &CancellationToken) -> MonitorStats {
        let interval = Duration::from_millis(self.settings.poll_interval_ms);
        info!(
            "Started... waiting for sensor detection (topic '{}', polling every {:?})",
            self.settings.topic, interval
        );

        let mut last_log_time = Instant::now();

        loop {
            self.tick(shutdown).await;

            if last_log_time.elapsed() >= STATS_LOG_INTERVAL {
                debug!(
                    "State monitor stats: {:?}, last state {:?}",
                    self.stats,
                    self.detector.previous()
                );
                last_log_time = Instant::now();
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("State monitor stopped: {:?}", self.stats);
        self.stats.clone()
    }

    /// Hands back the reader and publisher, e.g. to release the hardware
    pub fn into_parts(self) -> (R, P) {
        (self.reader, self.publisher)
    }
}
