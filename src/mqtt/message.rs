use std::fmt;

use rumqttc::QoS;

use crate::sensor::SensorLevel;

/// State payload published on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    On,
    Off,
}

impl Payload {
    pub fn as_str(&self) -> &'static str {
        match self {
            Payload::On => "ON",
            Payload::Off => "OFF",
        }
    }
}

impl From<SensorLevel> for Payload {
    fn from(level: SensorLevel) -> Self {
        match level {
            SensorLevel::High => Payload::On,
            SensorLevel::Low => Payload::Off,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One retained, fire-and-forget state message. Built fresh per transition.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishMessage {
    pub topic: String,
    pub payload: Payload,
    pub retain: bool,
    pub qos: QoS,
}

impl PublishMessage {
    pub fn state(topic: impl Into<String>, payload: Payload) -> Self {
        Self {
            topic: topic.into(),
            payload,
            retain: true,
            qos: QoS::AtMostOnce,
        }
    }
}

impl fmt::Display for PublishMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} <- {}", self.topic, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_maps_to_on_and_low_to_off() {
        assert_eq!(Payload::from(SensorLevel::High).as_str(), "ON");
        assert_eq!(Payload::from(SensorLevel::Low).as_str(), "OFF");
    }

    #[test]
    fn state_messages_are_retained_qos0() {
        let message = PublishMessage::state("motion-mqtt", Payload::On);
        assert!(message.retain);
        assert_eq!(message.qos, QoS::AtMostOnce);
        assert_eq!(message.to_string(), "motion-mqtt <- ON");
    }
}
