// src/motion/surface.rs - A single trim tab and its two relays
use super::{check_fraction, round_hundredths, MotionError, Mode, TravelTimeModel};
use crate::config::SurfaceConfig;
use crate::hardware::{HardwareError, Pin, PinDriver};
use crate::scheduler::Clock;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

/// Direction a surface is driven in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Extend,
    Retract,
}

impl Action {
    pub fn opposite(self) -> Self {
        match self {
            Action::Extend => Action::Retract,
            Action::Retract => Action::Extend,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Extend => write!(f, "extend"),
            Action::Retract => write!(f, "retract"),
        }
    }
}

/// A trim tab with an extend relay, a retract relay, and a software-tracked
/// position in `0.0..=1.0`.
///
/// There is no position sensor: the surface is assumed fully retracted at
/// boot and every move is trusted to complete.
#[derive(Debug)]
pub struct Surface {
    name: String,
    position: f64,
    extend_pin: Pin,
    retract_pin: Pin,
}

impl Surface {
    pub fn new(
        name: impl Into<String>,
        extend_pin: u8,
        retract_pin: u8,
        driver: Arc<dyn PinDriver>,
    ) -> Result<Self, HardwareError> {
        let name = name.into();
        let extend_pin = Pin::new(driver.clone(), extend_pin, format!("extends {}", name))?;
        let retract_pin = Pin::new(driver, retract_pin, format!("retracts {}", name))?;
        Ok(Self {
            name,
            position: 0.0,
            extend_pin,
            retract_pin,
        })
    }

    pub fn from_config(config: &SurfaceConfig, driver: Arc<dyn PinDriver>) -> Result<Self, HardwareError> {
        Self::new(config.name.clone(), config.pins.extend, config.pins.retract, driver)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Position as a whole percentage.
    pub fn value(&self) -> i64 {
        (self.position * 100.0).round() as i64
    }

    pub(crate) fn set_position(&mut self, position: f64) {
        self.position = position;
    }

    pub fn pin(&self, action: Action) -> &Pin {
        match action {
            Action::Extend => &self.extend_pin,
            Action::Retract => &self.retract_pin,
        }
    }

    fn pin_mut(&mut self, action: Action) -> &mut Pin {
        match action {
            Action::Extend => &mut self.extend_pin,
            Action::Retract => &mut self.retract_pin,
        }
    }

    pub fn pins(&self) -> [&Pin; 2] {
        [&self.extend_pin, &self.retract_pin]
    }

    pub fn hot_pin_count(&self) -> usize {
        self.pins().iter().filter(|p| p.is_high()).count()
    }

    /// The direction currently being driven, if any.
    pub fn active_action(&self) -> Option<Action> {
        if self.extend_pin.is_high() {
            Some(Action::Extend)
        } else if self.retract_pin.is_high() {
            Some(Action::Retract)
        } else {
            None
        }
    }

    /// Drive `action`. The opposite relay is released first so both are
    /// never closed together.
    pub fn energize(&mut self, action: Action) -> Result<(), HardwareError> {
        if self.pin(action.opposite()).is_high() {
            tracing::warn!("{}: releasing {} before {}", self.name, action.opposite(), action);
            self.pin_mut(action.opposite()).set_low()?;
        }
        self.pin_mut(action).set_high()
    }

    pub fn release(&mut self, action: Action) -> Result<(), HardwareError> {
        self.pin_mut(action).set_low()
    }

    /// Hold one relay closed for `duration`, then release it. The relay is
    /// also released if the returned future is dropped mid-sleep.
    pub async fn hold(&mut self, action: Action, duration: Duration, clock: &dyn Clock) -> Result<(), HardwareError> {
        tracing::info!("{}: {} for {:.6} seconds", self.name, action, duration.as_secs_f64());
        let mut live = EnergizedSurfaces::new(std::slice::from_mut(self), vec![0]);
        let surface = &mut live[0];
        if let Err(e) = surface.energize(action) {
            if let Err(release) = surface.release(action) {
                tracing::error!("failed to release {} {}: {}", surface.name, action, release);
            }
            return Err(e);
        }
        clock.sleep(duration).await;
        live[0].release(action)
    }

    /// Extend by one `step`, unless that would pass full extension.
    /// Returns the new value as a percentage. The relay is held for the
    /// rounded change actually committed, not the raw step.
    pub async fn increment(
        &mut self,
        step: f64,
        model: &TravelTimeModel,
        clock: &dyn Clock,
    ) -> Result<i64, MotionError> {
        let next = round_hundredths(self.position + step);
        if next <= 1.0 && next > self.position {
            tracing::info!("extending {} from {} to {}", self.name, self.position, next);
            let duration = model.duration(next - self.position, 1, Mode::Deploy)?;
            self.position = next;
            self.hold(Action::Extend, duration, clock).await?;
        } else {
            tracing::debug!("{} already at {}, not extending", self.name, self.position);
        }
        Ok(self.value())
    }

    /// Retract by one `step`, unless that would pass full retraction.
    pub async fn decrement(
        &mut self,
        step: f64,
        model: &TravelTimeModel,
        clock: &dyn Clock,
    ) -> Result<i64, MotionError> {
        let next = round_hundredths(self.position - step);
        if next >= 0.0 && next < self.position {
            tracing::info!("retracting {} from {} to {}", self.name, self.position, next);
            let duration = model.duration(self.position - next, 1, Mode::Deploy)?;
            self.position = next;
            self.hold(Action::Retract, duration, clock).await?;
        } else {
            tracing::debug!("{} already at {}, not retracting", self.name, self.position);
        }
        Ok(self.value())
    }

    /// Move this surface alone to `target`.
    ///
    /// The new position is committed before the relay is held; a move that
    /// is cut short leaves the model ahead of the hardware.
    pub async fn move_to(
        &mut self,
        target: f64,
        mode: Mode,
        model: &TravelTimeModel,
        clock: &dyn Clock,
    ) -> Result<(), MotionError> {
        check_fraction(&self.name, target)?;
        if target == self.position {
            tracing::info!("{} is already at {}", self.name, target);
            return Ok(());
        }

        let action = if target > self.position { Action::Extend } else { Action::Retract };
        let duration = model.duration((target - self.position).abs(), 1, mode)?;
        tracing::info!("{}ing {} from {} to {}", action, self.name, self.position, target);
        self.position = target;
        self.hold(action, duration, clock).await?;
        Ok(())
    }
}

/// Surfaces with relays closed for an in-flight move.
///
/// Dropping it releases whatever is still energized on the tracked slots,
/// so a cancelled move never leaves a relay hot. Positions of surfaces
/// released this way are left where they were and no longer match the
/// hardware.
pub(crate) struct EnergizedSurfaces<'a> {
    surfaces: &'a mut [Surface],
    slots: Vec<usize>,
}

impl<'a> EnergizedSurfaces<'a> {
    pub(crate) fn new(surfaces: &'a mut [Surface], slots: Vec<usize>) -> Self {
        Self { surfaces, slots }
    }
}

impl Deref for EnergizedSurfaces<'_> {
    type Target = [Surface];

    fn deref(&self) -> &[Surface] {
        self.surfaces
    }
}

impl DerefMut for EnergizedSurfaces<'_> {
    fn deref_mut(&mut self) -> &mut [Surface] {
        self.surfaces
    }
}

impl Drop for EnergizedSurfaces<'_> {
    fn drop(&mut self) {
        for &slot in &self.slots {
            let Some(surface) = self.surfaces.get_mut(slot) else {
                continue;
            };
            while let Some(action) = surface.active_action() {
                tracing::warn!(
                    "{}: {} interrupted at an unknown position, releasing",
                    surface.name,
                    action
                );
                if let Err(e) = surface.release(action) {
                    tracing::error!("failed to release {} {}: {}", surface.name, action, e);
                }
            }
        }
    }
}
