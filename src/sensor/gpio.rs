use rppal::gpio::{Gpio, InputPin, Level};
use tracing::{debug, info, warn};

use super::{InputReader, SensorError, SensorLevel};

/// PIR sensor attached to a Raspberry Pi GPIO pin (BCM numbering).
///
/// The pin is configured as a plain input on acquisition. Dropping the
/// [`InputPin`] hands the pin back to rppal, which restores its previous mode.
pub struct GpioSensor {
    pin_number: u8,
    pin: Option<InputPin>,
}

impl GpioSensor {
    pub fn acquire(pin_number: u8) -> Result<Self, SensorError> {
        info!("Acquiring GPIO pin {} as input", pin_number);
        let gpio = Gpio::new()?;
        let pin = gpio.get(pin_number)?.into_input();
        debug!("GPIO pin {} configured as input", pin_number);

        Ok(Self {
            pin_number,
            pin: Some(pin),
        })
    }

    pub fn pin_number(&self) -> u8 {
        self.pin_number
    }
}

impl InputReader for GpioSensor {
    fn read_level(&mut self) -> Result<SensorLevel, SensorError> {
        match &self.pin {
            Some(pin) => Ok(match pin.read() {
                Level::Low => SensorLevel::Low,
                Level::High => SensorLevel::High,
            }),
            None => Err(SensorError::Released(self.pin_number)),
        }
    }

    fn release(&mut self) {
        if let Some(pin) = self.pin.take() {
            drop(pin);
            info!("Released GPIO pin {}", self.pin_number);
        }
    }
}

impl Drop for GpioSensor {
    fn drop(&mut self) {
        if self.pin.is_some() {
            warn!(
                "GPIO pin {} still held while dropping sensor, releasing",
                self.pin_number
            );
            self.release();
        }
    }
}
