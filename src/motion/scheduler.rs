// src/motion/scheduler.rs - Drive relays through a deactivation schedule
use super::surface::EnergizedSurfaces;
use super::{Action, ChangeManifest, MotionError, Mode, ScheduleStep, Surface, TravelTimeModel};
use crate::hardware::HardwareError;
use crate::scheduler::Clock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Current position of every surface, keyed by name.
pub fn positions(surfaces: &[Surface]) -> BTreeMap<String, f64> {
    surfaces.iter().map(|s| (s.name().to_string(), s.position())).collect()
}

/// Runs movement requests against the surfaces it is handed.
///
/// Callers must serialize access; the scheduler itself holds no lock.
pub struct Scheduler {
    model: TravelTimeModel,
    clock: Arc<dyn Clock>,
}

struct TimedStep<'a> {
    step: &'a ScheduleStep,
    hot_pins: usize,
    duration: Duration,
}

impl Scheduler {
    pub fn new(model: TravelTimeModel, clock: Arc<dyn Clock>) -> Self {
        Self { model, clock }
    }

    pub fn model(&self) -> &TravelTimeModel {
        &self.model
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Move every named surface to its target, running them concurrently.
    ///
    /// All implicated pins go high together, then groups are released in
    /// ascending order of travel. Durations are resolved before the first pin
    /// is touched; once energized the schedule always runs to the end, and
    /// the first hardware failure (if any) is returned afterwards. If the
    /// future is dropped part way, every relay it closed is released.
    /// `on_release` sees each surface as soon as its new position is committed.
    pub async fn move_to<F>(
        &self,
        surfaces: &mut [Surface],
        targets: &BTreeMap<String, f64>,
        mode: Mode,
        mut on_release: F,
    ) -> Result<ChangeManifest, MotionError>
    where
        F: FnMut(&str, f64) + Send,
    {
        let manifest = ChangeManifest::build(&positions(surfaces), targets)?;
        if manifest.is_empty() {
            tracing::info!("no change required, all positions already satisfied.");
            return Ok(manifest);
        }

        let index: HashMap<&str, usize> = surfaces
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name(), i))
            .collect();
        let slots: BTreeMap<String, usize> = manifest
            .iter()
            .map(|(name, _)| {
                index
                    .get(name.as_str())
                    .map(|i| (name.clone(), *i))
                    .ok_or_else(|| MotionError::UnknownSurface(name.clone()))
            })
            .collect::<Result<_, _>>()?;

        let schedule = manifest.schedule();
        let idle_hot: usize = surfaces
            .iter()
            .filter(|s| !slots.contains_key(s.name()))
            .map(Surface::hot_pin_count)
            .sum();
        let mut hot_pins = idle_hot + manifest.len();
        let mut plan = Vec::with_capacity(schedule.len());
        for step in &schedule {
            let duration = self.model.duration(step.travel, hot_pins, mode)?;
            plan.push(TimedStep { step, hot_pins, duration });
            hot_pins -= step.deactivate.len();
        }

        for (name, entry) in manifest.iter() {
            tracing::info!("{}ing {} from {} to {}", entry.action, name, entry.from, entry.to);
        }

        let started = self.clock.now_monotonic();
        let mut live = EnergizedSurfaces::new(surfaces, slots.values().copied().collect());
        let mut first_error: Option<HardwareError> = None;
        for (name, entry) in manifest.iter() {
            if let Err(e) = live[slots[name]].energize(entry.action) {
                tracing::error!("failed to energize {} {}: {}", name, entry.action, e);
                first_error.get_or_insert(e);
            }
        }

        for timed in plan {
            let seconds = timed.duration.as_secs_f64();
            tracing::info!(" > {} pin(s)", timed.hot_pins);
            tracing::info!(" > traveling {:.4}% full-travel", timed.step.travel * 100.0);
            tracing::info!(" > takes {:.6} seconds.", seconds);
            self.clock.sleep(timed.duration).await;

            for name in &timed.step.deactivate {
                let (Some(entry), Some(&slot)) = (manifest.get(name), slots.get(name)) else {
                    continue;
                };
                let surface = &mut live[slot];
                if let Err(e) = surface.release(entry.action) {
                    tracing::error!("failed to release {} {}: {}", name, entry.action, e);
                    first_error.get_or_insert(e);
                }
                surface.set_position(entry.to);
                on_release(name, entry.to);
            }
        }
        tracing::info!(
            "move finished in {:.3} seconds",
            self.clock.now_monotonic().duration_since(started).as_secs_f64()
        );

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(manifest),
        }
    }

    /// Hold every retract pin for a full withdraw stroke and zero all
    /// positions, regardless of where the model thinks surfaces are.
    pub async fn retract_blind<F>(&self, surfaces: &mut [Surface], mut on_release: F) -> Result<(), MotionError>
    where
        F: FnMut(&str, f64) + Send,
    {
        let duration = self.model.duration(1.0, surfaces.len(), Mode::Withdraw)?;
        let pins: Vec<u8> = surfaces
            .iter()
            .map(|s| s.pin(Action::Retract).number())
            .collect();
        tracing::info!("Setting pins {:?} high for {:.6} seconds...", pins, duration.as_secs_f64());

        let slots: Vec<usize> = (0..surfaces.len()).collect();
        let mut live = EnergizedSurfaces::new(surfaces, slots);
        let mut first_error: Option<HardwareError> = None;
        for surface in live.iter_mut() {
            if let Err(e) = surface.energize(Action::Retract) {
                tracing::error!("failed to energize {} retract: {}", surface.name(), e);
                first_error.get_or_insert(e);
            }
        }

        self.clock.sleep(duration).await;

        tracing::info!("Setting pins {:?} low...", pins);
        for surface in live.iter_mut() {
            if let Err(e) = surface.release(Action::Retract) {
                tracing::error!("failed to release {} retract: {}", surface.name(), e);
                first_error.get_or_insert(e);
            }
            surface.set_position(0.0);
            on_release(surface.name(), 0.0);
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
