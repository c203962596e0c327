//! # MQTT Integration Module
//!
//! Broker side of the bridge: parsing the broker URI, establishing the durable
//! session and publishing retained ON/OFF state messages.
//!
//! ```text
//! mqtt/
//! ├── config.rs   - Broker URI parsing into host, port and credentials
//! ├── message.rs  - Payload and publish message representation
//! └── session.rs  - Connection state machine, event loop driver, publishing
//! ```
//!
//! ## Connection Lifecycle
//!
//! A [`session::BrokerSession`] starts in the `Connecting` state. The rumqttc
//! event loop runs in a background driver task and reports the handshake
//! outcome through a watch channel; `establish` waits on that channel in fixed
//! quanta and only a `Connected` session can publish.
//!
//! Sessions are opened with `clean_session = false` so broker-side state
//! survives reconnects.

pub mod config;
pub mod message;
pub mod session;

pub use config::BrokerEndpoint;
pub use message::{Payload, PublishMessage};
pub use session::{BrokerSession, HandshakePolicy};

use std::time::Duration;

/// Errors raised while preparing a broker session
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("Invalid broker URI '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Unsupported broker URI scheme '{0}' (expected mqtt or tcp)")]
    UnsupportedScheme(String),

    #[error("Broker URI '{0}' has no host")]
    MissingHost(String),

    #[error("MQTT client id must not be empty")]
    EmptyClientId,
}

/// Fatal failures of the connect handshake
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Broker connection failed: {0}")]
    Transport(String),

    #[error("No connection confirmation after {quanta} quanta ({waited:?})")]
    Timeout { quanta: u32, waited: Duration },

    #[error("MQTT event loop stopped before the handshake completed")]
    DriverStopped,
}

/// Failures of a single publish call; never fatal
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Publish request rejected: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("MQTT event loop is no longer running")]
    DriverStopped,
}
