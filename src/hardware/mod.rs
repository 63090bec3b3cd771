// src/hardware/mod.rs - GPIO relay abstraction
pub mod simulated;
#[cfg(feature = "rpi")]
pub mod rpi;

use std::sync::Arc;
use thiserror::Error;

pub use simulated::{PinEvent, SimulatedPinDriver};
#[cfg(feature = "rpi")]
pub use rpi::RppalPinDriver;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("pin {0} was never configured as an output")]
    NotConfigured(u8),
    #[error("pin {pin} write failed: {reason}")]
    WriteFailed { pin: u8, reason: String },
    #[cfg(feature = "rpi")]
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
}

/// Capability for driving digital output lines.
///
/// Implementations must be safe to share between tasks; the controller only
/// ever calls them while holding its movement lock.
pub trait PinDriver: Send + Sync {
    fn configure_output(&self, pin: u8) -> Result<(), HardwareError>;
    fn set_high(&self, pin: u8) -> Result<(), HardwareError>;
    fn set_low(&self, pin: u8) -> Result<(), HardwareError>;
}

/// One relay line owned by a surface.
pub struct Pin {
    number: u8,
    label: String,
    state: bool,
    driver: Arc<dyn PinDriver>,
}

impl Pin {
    /// Configure `number` as an output and start it low.
    pub fn new(driver: Arc<dyn PinDriver>, number: u8, label: impl Into<String>) -> Result<Self, HardwareError> {
        let label = label.into();
        driver.configure_output(number)?;
        tracing::info!("Pin {} {}", number, label);
        Ok(Self {
            number,
            label,
            state: false,
            driver,
        })
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn is_high(&self) -> bool {
        self.state
    }

    /// The state is recorded before the write so a failed write still
    /// counts as energized and gets a matching `set_low`.
    pub fn set_high(&mut self) -> Result<(), HardwareError> {
        self.state = true;
        tracing::debug!("Pin {} ({}) HIGH", self.number, self.label);
        self.driver.set_high(self.number)
    }

    pub fn set_low(&mut self) -> Result<(), HardwareError> {
        self.state = false;
        tracing::debug!("Pin {} ({}) LOW", self.number, self.label);
        self.driver.set_low(self.number)
    }
}

impl std::fmt::Debug for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pin")
            .field("number", &self.number)
            .field("label", &self.label)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_tracks_state_and_drives_hardware() {
        let driver = Arc::new(SimulatedPinDriver::new());
        let mut pin = Pin::new(driver.clone(), 17, "PORT.extend").unwrap();
        assert!(driver.is_configured(17));
        assert!(!pin.is_high());

        pin.set_high().unwrap();
        assert!(pin.is_high());
        assert!(driver.level(17));

        pin.set_low().unwrap();
        assert!(!pin.is_high());
        assert!(!driver.level(17));
        assert_eq!(driver.transitions(), vec![PinEvent::High(17), PinEvent::Low(17)]);
    }

    #[test]
    fn test_failed_write_still_marks_pin_high() {
        let driver = Arc::new(SimulatedPinDriver::new());
        let mut pin = Pin::new(driver.clone(), 4, "CENTER.retract").unwrap();
        driver.fail_pin(4);
        assert!(pin.set_high().is_err());
        assert!(pin.is_high());
    }
}
