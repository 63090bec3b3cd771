// src/hardware/simulated.rs - In-memory relay bank for tests and dry runs
use super::{HardwareError, PinDriver};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// A single transition observed by the simulated driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinEvent {
    Output(u8),
    High(u8),
    Low(u8),
}

#[derive(Debug, Default)]
struct SimState {
    configured: HashSet<u8>,
    levels: HashMap<u8, bool>,
    events: Vec<PinEvent>,
    failing: HashSet<u8>,
}

/// Pin driver that keeps levels in memory and records every call.
#[derive(Debug, Default)]
pub struct SimulatedPinDriver {
    state: Mutex<SimState>,
}

impl SimulatedPinDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A panicking test thread must not hide the recorded events.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn events(&self) -> Vec<PinEvent> {
        self.lock().events.clone()
    }

    /// Transitions only, skipping the output configuration calls.
    pub fn transitions(&self) -> Vec<PinEvent> {
        self.lock()
            .events
            .iter()
            .copied()
            .filter(|e| !matches!(e, PinEvent::Output(_)))
            .collect()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    pub fn level(&self, pin: u8) -> bool {
        self.lock().levels.get(&pin).copied().unwrap_or(false)
    }

    pub fn high_pins(&self) -> Vec<u8> {
        let mut pins: Vec<u8> = self
            .lock()
            .levels
            .iter()
            .filter(|(_, high)| **high)
            .map(|(pin, _)| *pin)
            .collect();
        pins.sort_unstable();
        pins
    }

    pub fn is_configured(&self, pin: u8) -> bool {
        self.lock().configured.contains(&pin)
    }

    /// Make every later write to `pin` fail.
    pub fn fail_pin(&self, pin: u8) {
        self.lock().failing.insert(pin);
    }

    fn write(&self, pin: u8, high: bool) -> Result<(), HardwareError> {
        let mut state = self.lock();
        if !state.configured.contains(&pin) {
            return Err(HardwareError::NotConfigured(pin));
        }
        if state.failing.contains(&pin) {
            return Err(HardwareError::WriteFailed {
                pin,
                reason: "simulated fault".to_string(),
            });
        }
        state.levels.insert(pin, high);
        state.events.push(if high { PinEvent::High(pin) } else { PinEvent::Low(pin) });
        Ok(())
    }
}

impl PinDriver for SimulatedPinDriver {
    fn configure_output(&self, pin: u8) -> Result<(), HardwareError> {
        let mut state = self.lock();
        state.configured.insert(pin);
        state.levels.insert(pin, false);
        state.events.push(PinEvent::Output(pin));
        Ok(())
    }

    fn set_high(&self, pin: u8) -> Result<(), HardwareError> {
        self.write(pin, true)
    }

    fn set_low(&self, pin: u8) -> Result<(), HardwareError> {
        self.write(pin, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_pin_rejected() {
        let driver = SimulatedPinDriver::new();
        assert!(matches!(driver.set_high(9), Err(HardwareError::NotConfigured(9))));
        assert!(driver.events().is_empty());
    }

    #[test]
    fn test_high_pins_sorted() {
        let driver = SimulatedPinDriver::new();
        for pin in [27, 5, 17] {
            driver.configure_output(pin).unwrap();
            driver.set_high(pin).unwrap();
        }
        driver.set_low(5).unwrap();
        assert_eq!(driver.high_pins(), vec![17, 27]);
        assert_eq!(driver.transitions().len(), 4);
    }
}
