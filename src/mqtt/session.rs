//! Broker session with compile-time connection state
//!
//! ```text
//! open() ──► BrokerSession<Connecting> ──establish()──► BrokerSession<Connected>
//!                    │                                         │
//!                    └── driver task polls the rumqttc EventLoop ──┘
//! ```
//!
//! The driver reports the handshake outcome through a watch channel. Before
//! the first ConnAck a transport error is final; afterwards errors are logged
//! and the event loop is polled again, which makes rumqttc reconnect and
//! resume the durable session.

use std::future::Future;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet};
use statum::{machine, state};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::{BrokerEndpoint, ConnectionError, MqttError, PublishError, PublishMessage};
use crate::monitor::StatePublisher;

const REQUEST_CAPACITY: usize = 10;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Handshake progress as seen by the driver task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeStatus {
    Pending,
    Established,
    Failed(String),
}

/// How long `establish` waits for the handshake.
///
/// The wait is split into quanta of `quantum`; with `max_quanta: None` it
/// never gives up on its own.
#[derive(Debug, Clone)]
pub struct HandshakePolicy {
    pub quantum: Duration,
    pub max_quanta: Option<u32>,
}

impl Default for HandshakePolicy {
    fn default() -> Self {
        Self {
            quantum: Duration::from_secs(3),
            max_quanta: Some(20),
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum SessionState {
    Connecting,
    Connected,
}

#[machine]
#[derive(Debug)]
pub struct BrokerSession<S: SessionState> {
    // MQTT client id, also the durable session key on the broker
    client_id: String,

    endpoint: BrokerEndpoint,

    // Request handle into the rumqttc event loop
    client: AsyncClient,

    // Handshake status published by the driver
    status_rx: watch::Receiver<HandshakeStatus>,

    // Background task polling the event loop
    driver: JoinHandle<()>,
}

impl<S: SessionState> BrokerSession<S> {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }
}

impl BrokerSession<Connecting> {
    /// Starts the connect handshake in the background.
    ///
    /// Must be called inside a tokio runtime. Returns immediately; use
    /// [`BrokerSession::establish`] to wait for the outcome.
    pub fn open(
        client_id: &str,
        endpoint: &BrokerEndpoint,
        keep_alive: Duration,
    ) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(client_id, endpoint, keep_alive)?;
        debug!(
            "Opening MQTT session to {} with keep-alive {:?}",
            endpoint.address(),
            keep_alive
        );

        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);
        let (status_tx, status_rx) = watch::channel(HandshakeStatus::Pending);
        let driver = tokio::spawn(drive_event_loop(event_loop, status_tx));

        Ok(Self::new(
            client_id.to_string(),
            endpoint.clone(),
            client,
            status_rx,
            driver,
        ))
    }

    /// Blocks until the broker confirms the connection or the handshake fails
    pub async fn establish(
        mut self,
        policy: &HandshakePolicy,
    ) -> Result<BrokerSession<Connected>, ConnectionError> {
        info!(
            "Connecting to MQTT broker at {} as '{}'",
            self.endpoint.address(),
            self.client_id
        );

        match wait_for_handshake(&mut self.status_rx, policy).await {
            Ok(()) => {
                info!("Connected to MQTT broker at {}", self.endpoint.address());
                Ok(self.transition())
            }
            Err(e) => {
                self.driver.abort();
                Err(e)
            }
        }
    }
}

impl BrokerSession<Connected> {
    /// Queues a state message without waiting.
    ///
    /// The request queue is only drained while the driver is connected, so a
    /// full queue during an outage is reported as an error instead of
    /// suspending the caller.
    pub fn try_publish(&self, message: &PublishMessage) -> Result<(), PublishError> {
        if self.driver.is_finished() {
            return Err(PublishError::DriverStopped);
        }

        self.client.try_publish(
            message.topic.as_str(),
            message.qos,
            message.retain,
            message.payload.as_str(),
        )?;
        Ok(())
    }
}

impl StatePublisher for BrokerSession<Connected> {
    fn publish(
        &self,
        message: &PublishMessage,
    ) -> impl Future<Output = Result<(), PublishError>> + Send {
        std::future::ready(self.try_publish(message))
    }
}

fn configure_mqtt_options(
    client_id: &str,
    endpoint: &BrokerEndpoint,
    keep_alive: Duration,
) -> Result<MqttOptions, MqttError> {
    if client_id.trim().is_empty() {
        return Err(MqttError::EmptyClientId);
    }

    let mut mqtt_options = MqttOptions::new(client_id, endpoint.host.clone(), endpoint.port);
    mqtt_options
        .set_keep_alive(keep_alive)
        .set_clean_session(false);
    if let Some((username, password)) = endpoint.credentials() {
        mqtt_options.set_credentials(username, password);
    }

    Ok(mqtt_options)
}

/// Waits on the driver's status channel in fixed quanta
async fn wait_for_handshake(
    status_rx: &mut watch::Receiver<HandshakeStatus>,
    policy: &HandshakePolicy,
) -> Result<(), ConnectionError> {
    let mut elapsed_quanta = 0u32;

    loop {
        let status = status_rx.borrow_and_update().clone();
        match status {
            HandshakeStatus::Established => return Ok(()),
            HandshakeStatus::Failed(reason) => return Err(ConnectionError::Transport(reason)),
            HandshakeStatus::Pending => {}
        }

        match tokio::time::timeout(policy.quantum, status_rx.changed()).await {
            Ok(Ok(())) => continue,
            Ok(Err(_)) => return Err(ConnectionError::DriverStopped),
            Err(_) => {
                elapsed_quanta += 1;
                info!(
                    "Still waiting for MQTT connection confirmation ({:?} elapsed)",
                    policy.quantum * elapsed_quanta
                );
                if let Some(max_quanta) = policy.max_quanta {
                    if elapsed_quanta >= max_quanta {
                        return Err(ConnectionError::Timeout {
                            quanta: elapsed_quanta,
                            waited: policy.quantum * elapsed_quanta,
                        });
                    }
                }
            }
        }
    }
}

async fn drive_event_loop(mut event_loop: EventLoop, status_tx: watch::Sender<HandshakeStatus>) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(
                    "Broker accepted connection (session present: {})",
                    ack.session_present
                );
                status_tx.send_replace(HandshakeStatus::Established);
            }
            Ok(event) => trace!("MQTT event: {:?}", event),
            Err(e) => {
                if *status_tx.borrow() != HandshakeStatus::Established {
                    error!("MQTT handshake failed: {}", e);
                    status_tx.send_replace(HandshakeStatus::Failed(e.to_string()));
                    return;
                }
                warn!(
                    "MQTT connection error: {}, retrying in {:?}",
                    e, RECONNECT_DELAY
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
