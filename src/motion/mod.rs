// src/motion/mod.rs - Trim tab movement: travel model, surfaces, scheduling
pub mod planner;
pub mod scheduler;
pub mod surface;
pub mod travel;

pub use planner::{ChangeManifest, DeactivationSchedule, ManifestEntry, ScheduleStep};
pub use scheduler::Scheduler;
pub use surface::{Action, Surface};
pub use travel::{Mode, TravelTimeModel};

use crate::config::ConfigError;
use crate::hardware::HardwareError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MotionError {
    #[error("position {value} for '{surface}' is outside 0.0..=1.0")]
    OutOfRange { surface: String, value: f64 },
    #[error("unknown control surface '{0}'")]
    UnknownSurface(String),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("hardware error: {0}")]
    Hardware(#[from] HardwareError),
}

/// Reject anything outside the normalized stroke, NaN included.
pub fn check_fraction(surface: &str, value: f64) -> Result<(), MotionError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MotionError::OutOfRange {
            surface: surface.to_string(),
            value,
        })
    }
}

/// Positions are tracked to the hundredth so repeated nudges do not drift.
pub(crate) fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
