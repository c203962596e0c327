use crate::mqtt::Payload;
use crate::sensor::{SensorLevel, SensorState};

/// Tracks the previously observed level and reports transitions.
///
/// Owned by the monitor loop alone, so it needs no synchronisation.
#[derive(Debug, Clone, Default)]
pub struct TransitionDetector {
    previous: SensorState,
}

impl TransitionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `level` and returns the payload to publish if it differs from
    /// the previous state. The first observation always yields a payload.
    pub fn observe(&mut self, level: SensorLevel) -> Option<Payload> {
        if !self.previous.differs_from(level) {
            return None;
        }
        self.previous = level.into();
        Some(Payload::from(level))
    }

    pub fn previous(&self) -> SensorState {
        self.previous
    }
}
