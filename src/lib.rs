// src/lib.rs - Trim tab controller library
pub mod config;
pub mod controller;
pub mod hardware;
pub mod motion;
pub mod profile;
pub mod scheduler;

pub use config::{Config, ConfigError, RetractStrategy};
pub use controller::{Controller, ControllerError, Positions, Snapshot, Values};
pub use hardware::{HardwareError, PinDriver, SimulatedPinDriver};
pub use motion::{Action, DeactivationSchedule, Mode, MotionError, Scheduler, Surface, TravelTimeModel};
pub use profile::{Profile, ProfileError, ProfileStore};
pub use scheduler::{Clock, SimulatedClock, TokioClock};
