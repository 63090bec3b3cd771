// src/hardware/rpi.rs - Raspberry Pi relay bank via rppal
use super::{HardwareError, PinDriver};
use rppal::gpio::{Gpio, OutputPin};
use std::collections::HashMap;
use std::sync::Mutex;

/// Drives relays on the Pi header using BCM numbering.
pub struct RppalPinDriver {
    gpio: Gpio,
    outputs: Mutex<HashMap<u8, OutputPin>>,
}

impl RppalPinDriver {
    pub fn new() -> Result<Self, HardwareError> {
        let gpio = Gpio::new()?;
        tracing::info!("GPIO initialized");
        Ok(Self {
            gpio,
            outputs: Mutex::new(HashMap::new()),
        })
    }

    fn with_output(&self, pin: u8, f: impl FnOnce(&mut OutputPin)) -> Result<(), HardwareError> {
        let mut outputs = self.outputs.lock().map_err(|_| HardwareError::WriteFailed {
            pin,
            reason: "output table poisoned".to_string(),
        })?;
        let output = outputs.get_mut(&pin).ok_or(HardwareError::NotConfigured(pin))?;
        f(output);
        Ok(())
    }
}

impl PinDriver for RppalPinDriver {
    fn configure_output(&self, pin: u8) -> Result<(), HardwareError> {
        let output = self.gpio.get(pin)?.into_output_low();
        let mut outputs = self.outputs.lock().map_err(|_| HardwareError::WriteFailed {
            pin,
            reason: "output table poisoned".to_string(),
        })?;
        outputs.insert(pin, output);
        tracing::debug!("GPIO {} configured as output", pin);
        Ok(())
    }

    fn set_high(&self, pin: u8) -> Result<(), HardwareError> {
        self.with_output(pin, |output| output.set_high())
    }

    fn set_low(&self, pin: u8) -> Result<(), HardwareError> {
        self.with_output(pin, |output| output.set_low())
    }
}
