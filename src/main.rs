pub mod config;
pub mod monitor;
pub mod mqtt;
pub mod sensor;
pub mod shutdown;

use crate::config::{Cli, Settings};
use crate::monitor::StateMonitor;
use crate::mqtt::{BrokerEndpoint, BrokerSession};
use crate::sensor::GpioSensor;
use crate::shutdown::ShutdownCoordinator;
use clap::Parser;
use color_eyre::{eyre::WrapErr, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(cli.log_level())?;

    let settings = Settings::load(&cli).wrap_err("Failed to load settings")?;

    // Parse the broker URI before touching the hardware
    let endpoint = BrokerEndpoint::parse(&settings.broker_uri)?;

    let coordinator = ShutdownCoordinator::install(CancellationToken::new())
        .wrap_err("Failed to install signal handlers")?;

    // From here on the pin is released by GpioSensor's Drop if startup fails
    let mut sensor = GpioSensor::acquire(settings.gpio_pin)
        .wrap_err_with(|| format!("Failed to acquire GPIO pin {}", settings.gpio_pin))?;

    let policy = settings.handshake_policy();
    let connecting = BrokerSession::open(&settings.client_id, &endpoint, settings.keep_alive())?;
    let Some(result) = coordinator
        .guard_startup(connecting.establish(&policy), &mut sensor)
        .await
    else {
        std::process::exit(1);
    };
    let session =
        result.wrap_err_with(|| format!("Failed to connect to {}", endpoint.address()))?;
    info!(
        "Session '{}' ready on {}",
        session.client_id(),
        session.endpoint().address()
    );

    let monitor = StateMonitor::new(sensor, session, Some(settings.monitor_settings()));
    let report = coordinator.drive(monitor).await;
    let stats = report.stats;
    info!(
        "Pin {} released after {} samples, {} published, {} failed, {} abandoned",
        report.reader.pin_number(),
        stats.samples,
        stats.published,
        stats.failed,
        stats.abandoned
    );

    std::process::exit(1);
}

fn setup(level: Level) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env(level);
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
