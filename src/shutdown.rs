//! Signal-driven shutdown
//!
//! Listens for SIGINT and SIGTERM once. The first signal cancels the shared
//! [`CancellationToken`]; the monitor loop notices it (abandoning a publish
//! still in flight) and returns, after which the coordinator releases the
//! input reader. `main` then exits with status 1.

use std::fmt;
use std::future::Future;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::monitor::{MonitorStats, StateMonitor, StatePublisher};
use crate::sensor::InputReader;

/// Termination signal that triggered the shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Outcome of a signal-driven shutdown. The reader has been released.
pub struct ShutdownReport<R> {
    pub signal: Option<ShutdownSignal>,
    pub stats: MonitorStats,
    pub reader: R,
}

pub struct ShutdownCoordinator {
    token: CancellationToken,
    task: JoinHandle<ShutdownSignal>,
}

impl ShutdownCoordinator {
    /// Registers the signal listeners and spawns the one-shot waiting task.
    ///
    /// Registration happens before returning so that a failure surfaces as a
    /// startup error.
    pub fn install(token: CancellationToken) -> std::io::Result<Self> {
        let interrupt = signal(SignalKind::interrupt())?;
        let terminate = signal(SignalKind::terminate())?;

        let coordinator = Self::spawn_with(token, first_signal(interrupt, terminate));
        info!("Shutdown coordinator listening for SIGINT and SIGTERM");

        Ok(coordinator)
    }

    /// Spawns the waiting task on an arbitrary trigger
    fn spawn_with<F>(token: CancellationToken, received: F) -> Self
    where
        F: Future<Output = ShutdownSignal> + Send + 'static,
    {
        let task = tokio::spawn(coordinate(received, token.clone()));
        Self { token, task }
    }

    /// Awaits `startup` unless a signal arrives first. On a signal the reader
    /// is released and `None` is returned.
    pub async fn guard_startup<T, R: InputReader>(
        &self,
        startup: impl Future<Output = T>,
        reader: &mut R,
    ) -> Option<T> {
        tokio::select! {
            result = startup => Some(result),
            _ = self.token.cancelled() => {
                warn!("Shutdown requested during startup");
                reader.release();
                None
            }
        }
    }

    /// Runs `monitor` until a signal arrives, waits for the coordinator task
    /// and releases the monitor's reader.
    pub async fn drive<R, P>(self, mut monitor: StateMonitor<R, P>) -> ShutdownReport<R>
    where
        R: InputReader,
        P: StatePublisher,
    {
        let stats = monitor.run(&self.token).await;

        let signal = self.task.await.ok();
        match signal {
            Some(signal) => info!("Shutting down after {}", signal),
            None => warn!("Shutdown coordinator ended abnormally"),
        }

        let (mut reader, _publisher) = monitor.into_parts();
        reader.release();

        ShutdownReport {
            signal,
            stats,
            reader,
        }
    }
}

async fn first_signal(mut interrupt: Signal, mut terminate: Signal) -> ShutdownSignal {
    tokio::select! {
        _ = interrupt.recv() => ShutdownSignal::Interrupt,
        _ = terminate.recv() => ShutdownSignal::Terminate,
    }
}

/// Awaits `received`, then cancels `token`
async fn coordinate<F>(received: F, token: CancellationToken) -> ShutdownSignal
where
    F: Future<Output = ShutdownSignal>,
{
    let signal = received.await;
    info!("Received {}, cleanup", signal);
    token.cancel();
    signal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::{PublishError, PublishMessage};
    use crate::sensor::{SensorError, SensorLevel};
    use std::time::Duration;

    #[tokio::test]
    async fn signal_cancels_token() {
        let token = CancellationToken::new();
        let signal = coordinate(async { ShutdownSignal::Terminate }, token.clone()).await;

        assert_eq!(signal, ShutdownSignal::Terminate);
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn token_stays_live_until_signal() {
        let token = CancellationToken::new();
        let task = tokio::spawn(coordinate(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                ShutdownSignal::Interrupt
            },
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!token.is_cancelled());

        token.cancelled().await;
        assert_eq!(task.await.unwrap(), ShutdownSignal::Interrupt);
    }

    #[test]
    fn signals_display_their_names() {
        assert_eq!(ShutdownSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownSignal::Terminate.to_string(), "SIGTERM");
    }

    // Records whether release happened after the token was cancelled
    struct TrackingReader {
        token: CancellationToken,
        released_after_cancel: Option<bool>,
    }

    impl TrackingReader {
        fn new(token: &CancellationToken) -> Self {
            Self {
                token: token.clone(),
                released_after_cancel: None,
            }
        }
    }

    impl InputReader for TrackingReader {
        fn read_level(&mut self) -> Result<SensorLevel, SensorError> {
            Ok(SensorLevel::Low)
        }

        fn release(&mut self) {
            self.released_after_cancel = Some(self.token.is_cancelled());
        }
    }

    struct NullPublisher;

    impl StatePublisher for NullPublisher {
        async fn publish(&self, _message: &PublishMessage) -> Result<(), PublishError> {
            Ok(())
        }
    }

    async fn signal_after(delay: Duration, signal: ShutdownSignal) -> ShutdownSignal {
        tokio::time::sleep(delay).await;
        signal
    }

    #[tokio::test(start_paused = true)]
    async fn signal_stops_monitor_then_releases_reader() {
        let token = CancellationToken::new();
        let coordinator = ShutdownCoordinator::spawn_with(
            token.clone(),
            signal_after(Duration::from_secs(2), ShutdownSignal::Terminate),
        );
        let monitor = StateMonitor::new(TrackingReader::new(&token), NullPublisher, None);

        let report = coordinator.drive(monitor).await;

        assert_eq!(report.signal, Some(ShutdownSignal::Terminate));
        assert_eq!(report.reader.released_after_cancel, Some(true));
        assert_eq!(report.stats.published, 1);
        assert!(report.stats.samples > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn signal_during_connect_wait_releases_reader() {
        let token = CancellationToken::new();
        let coordinator = ShutdownCoordinator::spawn_with(
            token.clone(),
            signal_after(Duration::from_secs(1), ShutdownSignal::Interrupt),
        );
        let mut reader = TrackingReader::new(&token);

        let outcome = coordinator
            .guard_startup(std::future::pending::<()>(), &mut reader)
            .await;

        assert!(outcome.is_none());
        assert_eq!(reader.released_after_cancel, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn completed_startup_keeps_reader() {
        let token = CancellationToken::new();
        let coordinator = ShutdownCoordinator::spawn_with(
            token.clone(),
            signal_after(Duration::from_secs(60), ShutdownSignal::Interrupt),
        );
        let mut reader = TrackingReader::new(&token);

        let outcome = coordinator.guard_startup(async { 7 }, &mut reader).await;

        assert_eq!(outcome, Some(7));
        assert_eq!(reader.released_after_cancel, None);
    }
}
