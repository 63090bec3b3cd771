// src/controller.rs - The single authority over every trim tab
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex, MutexGuard};

use crate::config::{Config, ConfigError, RetractStrategy};
use crate::hardware::{HardwareError, PinDriver};
use crate::motion::scheduler::positions;
use crate::motion::{Action, MotionError, Mode, Scheduler, Surface, TravelTimeModel};
use crate::profile::{Profile, ProfileError};
use crate::scheduler::Clock;

/// Surface name -> normalized position.
pub type Positions = BTreeMap<String, f64>;
/// Surface name -> whole percentage.
pub type Values = BTreeMap<String, i64>;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Motion error: {0}")]
    Motion(#[from] MotionError),
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),
    #[error("percentage {value} for '{surface}' is outside 0..=100")]
    OutOfRange { surface: String, value: i64 },
    #[error("a move is already in progress")]
    Busy,
    #[error("pin {0} is not assigned to any control surface")]
    UnknownPin(u8),
}

/// What readers see without waiting on the movement lock.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub positions: Positions,
    pub active_profile: Option<String>,
    pub goofy: bool,
}

impl Snapshot {
    pub fn values(&self) -> Values {
        to_values(&self.positions)
    }
}

fn to_values(positions: &Positions) -> Values {
    positions
        .iter()
        .map(|(name, p)| (name.clone(), (p * 100.0).round() as i64))
        .collect()
}

struct ControllerState {
    surfaces: Vec<Surface>,
    active_profile: Option<String>,
    goofy: bool,
}

impl ControllerState {
    fn surface_mut(&mut self, name: &str) -> Result<&mut Surface, MotionError> {
        self.surfaces
            .iter_mut()
            .find(|s| s.name() == name)
            .ok_or_else(|| MotionError::UnknownSurface(name.to_string()))
    }
}

/// Raised for as long as a movement holds the lock.
struct MoveFlag<'a>(&'a AtomicBool);

impl<'a> MoveFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for MoveFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// The flag drops before the guard so the next holder cannot be cleared.
struct Session<'a> {
    _flag: MoveFlag<'a>,
    state: MutexGuard<'a, ControllerState>,
}

/// Owns every surface and serializes all movement through one lock.
///
/// Construct once at startup and share (`Arc<Controller>`) with whatever
/// front end issues commands.
pub struct Controller {
    state: Mutex<ControllerState>,
    scheduler: Scheduler,
    surface_names: Vec<String>,
    goofy_map: BTreeMap<String, String>,
    increment_step: f64,
    deactivate_strategy: RetractStrategy,
    moving: AtomicBool,
    snapshot: watch::Sender<Snapshot>,
}

impl Controller {
    /// Validate `config`, configure every relay as an output, and start with
    /// all surfaces assumed fully retracted.
    pub fn new(config: &Config, driver: Arc<dyn PinDriver>, clock: Arc<dyn Clock>) -> Result<Self, ControllerError> {
        config.validate()?;
        let model = TravelTimeModel::from_config(config)?;

        tracing::info!("Operating Mode: '{}'", config.operating_mode);
        model.log_table();

        let surfaces = config
            .surfaces
            .iter()
            .map(|s| Surface::from_config(s, driver.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let snapshot = Snapshot {
            positions: positions(&surfaces),
            active_profile: None,
            goofy: false,
        };
        let (snapshot, _) = watch::channel(snapshot);

        Ok(Self {
            state: Mutex::new(ControllerState {
                surfaces,
                active_profile: None,
                goofy: false,
            }),
            scheduler: Scheduler::new(model, clock),
            surface_names: config.surface_names(),
            goofy_map: config.goofy_map(),
            increment_step: config.increment_step,
            deactivate_strategy: config.deactivate,
            moving: AtomicBool::new(false),
            snapshot,
        })
    }

    async fn begin(&self) -> Session<'_> {
        let state = self.state.lock().await;
        Session {
            _flag: MoveFlag::raise(&self.moving),
            state,
        }
    }

    fn try_begin(&self) -> Result<Session<'_>, ControllerError> {
        let state = self.state.try_lock().map_err(|_| ControllerError::Busy)?;
        Ok(Session {
            _flag: MoveFlag::raise(&self.moving),
            state,
        })
    }

    fn publish(&self, state: &ControllerState) {
        self.snapshot.send_replace(Snapshot {
            positions: positions(&state.surfaces),
            active_profile: state.active_profile.clone(),
            goofy: state.goofy,
        });
    }

    fn publish_position(&self, name: &str, position: f64) {
        self.snapshot.send_modify(|s| {
            s.positions.insert(name.to_string(), position);
        });
    }

    async fn move_locked(
        &self,
        state: &mut ControllerState,
        targets: &Positions,
        mode: Mode,
    ) -> Result<(), ControllerError> {
        let result = self
            .scheduler
            .move_to(&mut state.surfaces, targets, mode, |name, p| self.publish_position(name, p))
            .await;
        self.publish(state);
        result?;
        Ok(())
    }

    /// Move surfaces to normalized targets, waiting behind any move already
    /// in flight.
    pub async fn move_to(&self, targets: &Positions, mode: Mode) -> Result<Positions, ControllerError> {
        let mut session = self.begin().await;
        self.move_locked(&mut session.state, targets, mode).await?;
        Ok(positions(&session.state.surfaces))
    }

    /// Like [`Controller::move_to`] but refuses instead of queueing.
    pub async fn try_move_to(&self, targets: &Positions, mode: Mode) -> Result<Positions, ControllerError> {
        let mut session = self.try_begin()?;
        self.move_locked(&mut session.state, targets, mode).await?;
        Ok(positions(&session.state.surfaces))
    }

    fn to_fractions(&self, percentages: &Values) -> Result<Positions, ControllerError> {
        percentages
            .iter()
            .map(|(name, &value)| {
                if !(0..=100).contains(&value) {
                    return Err(ControllerError::OutOfRange {
                        surface: name.clone(),
                        value,
                    });
                }
                Ok((name.clone(), value as f64 / 100.0))
            })
            .collect()
    }

    /// Move to percentage targets (0..=100) in deploy mode.
    pub async fn activate_profile(&self, percentages: &Values) -> Result<Values, ControllerError> {
        let targets = self.to_fractions(percentages)?;
        self.move_to(&targets, Mode::Deploy).await?;
        Ok(self.values())
    }

    /// Apply a saved profile, swapping counterparts when it is goofy.
    pub async fn activate(&self, profile: &Profile) -> Result<Values, ControllerError> {
        profile.validate(&self.surface_names)?;
        let mut targets = self.to_fractions(&profile.control_surfaces)?;
        if profile.goofy {
            targets = self.swap_goofy(&targets);
        }
        tracing::info!("activating profile '{}' (goofy: {})", profile.username, profile.goofy);

        let mut session = self.begin().await;
        session.state.active_profile = Some(profile.username.clone());
        session.state.goofy = profile.goofy;
        self.move_locked(&mut session.state, &targets, Mode::Deploy).await?;
        Ok(to_values(&positions(&session.state.surfaces)))
    }

    /// Bring every surface back to zero using the configured strategy.
    pub async fn deactivate_profile(&self) -> Result<Values, ControllerError> {
        let mut session = self.begin().await;
        session.state.active_profile = None;
        session.state.goofy = false;
        self.retract_locked(&mut session.state, self.deactivate_strategy).await?;
        Ok(to_values(&positions(&session.state.surfaces)))
    }

    pub async fn retract(&self, strategy: RetractStrategy) -> Result<Values, ControllerError> {
        let mut session = self.begin().await;
        self.retract_locked(&mut session.state, strategy).await?;
        Ok(to_values(&positions(&session.state.surfaces)))
    }

    async fn retract_locked(&self, state: &mut ControllerState, strategy: RetractStrategy) -> Result<(), ControllerError> {
        match strategy {
            RetractStrategy::Tracked => {
                let targets: Positions = self.surface_names.iter().map(|n| (n.clone(), 0.0)).collect();
                self.move_locked(state, &targets, Mode::Withdraw).await
            }
            RetractStrategy::Blind => {
                let result = self
                    .scheduler
                    .retract_blind(&mut state.surfaces, |name, p| self.publish_position(name, p))
                    .await;
                self.publish(state);
                result?;
                Ok(())
            }
        }
    }

    /// Targets where each surface takes its counterpart's value.
    fn swap_goofy(&self, positions: &Positions) -> Positions {
        let mut swapped = positions.clone();
        for (regular, goofy) in &self.goofy_map {
            if let Some(p) = positions.get(goofy) {
                swapped.insert(regular.clone(), *p);
            }
        }
        swapped
    }

    /// Swap every surface with its goofy counterpart.
    pub async fn invert(&self) -> Result<Values, ControllerError> {
        let mut session = self.begin().await;
        let current = positions(&session.state.surfaces);
        let targets: Positions = self
            .swap_goofy(&current)
            .into_iter()
            .filter(|(name, _)| self.goofy_map.contains_key(name))
            .collect();
        session.state.goofy = !session.state.goofy;
        self.move_locked(&mut session.state, &targets, Mode::Deploy).await?;
        Ok(to_values(&positions(&session.state.surfaces)))
    }

    /// Extend one surface by a single step.
    pub async fn increment(&self, name: &str) -> Result<i64, ControllerError> {
        let mut session = self.begin().await;
        let result = session
            .state
            .surface_mut(name)?
            .increment(self.increment_step, self.scheduler.model(), self.scheduler.clock())
            .await;
        self.publish(&session.state);
        Ok(result?)
    }

    /// Retract one surface by a single step.
    pub async fn decrement(&self, name: &str) -> Result<i64, ControllerError> {
        let mut session = self.begin().await;
        let result = session
            .state
            .surface_mut(name)?
            .decrement(self.increment_step, self.scheduler.model(), self.scheduler.clock())
            .await;
        self.publish(&session.state);
        Ok(result?)
    }

    /// Move a single surface on its own, timed as the only active pin.
    pub async fn move_surface(&self, name: &str, target: f64, mode: Mode) -> Result<f64, ControllerError> {
        let mut session = self.begin().await;
        let surface = session.state.surface_mut(name)?;
        let result = surface
            .move_to(target, mode, self.scheduler.model(), self.scheduler.clock())
            .await;
        let position = surface.position();
        self.publish(&session.state);
        result?;
        Ok(position)
    }

    fn locate_pin(state: &mut ControllerState, pin: u8) -> Result<(&mut Surface, Action), ControllerError> {
        state
            .surfaces
            .iter_mut()
            .find_map(|s| {
                [Action::Extend, Action::Retract]
                    .into_iter()
                    .find(|a| s.pin(*a).number() == pin)
                    .map(|a| (s, a))
            })
            .ok_or(ControllerError::UnknownPin(pin))
    }

    /// Close one relay for `duration` without touching the position model.
    pub async fn pulse_pin(&self, pin: u8, duration: Duration) -> Result<(), ControllerError> {
        let mut session = self.begin().await;
        let (surface, action) = Self::locate_pin(&mut session.state, pin)?;
        surface.hold(action, duration, self.scheduler.clock()).await?;
        Ok(())
    }

    /// Latch one relay high or low. The position model is left alone.
    pub async fn set_pin(&self, pin: u8, high: bool) -> Result<(), ControllerError> {
        let mut session = self.begin().await;
        let (surface, action) = Self::locate_pin(&mut session.state, pin)?;
        if high {
            surface.energize(action)?;
        } else {
            surface.release(action)?;
        }
        Ok(())
    }

    /// Pulse every configured relay in order, resting `cooldown` between them.
    pub async fn cycle_pins(&self, duration: Duration, cooldown: Duration) -> Result<(), ControllerError> {
        let mut session = self.begin().await;
        let clock = self.scheduler.clock();
        for surface in session.state.surfaces.iter_mut() {
            for action in [Action::Extend, Action::Retract] {
                tracing::info!("({}) {} {}", surface.pin(action).number(), surface.name(), action);
                surface.hold(action, duration, clock).await?;
                clock.sleep(cooldown).await;
            }
        }
        Ok(())
    }

    pub fn positions(&self) -> Positions {
        self.snapshot.borrow().positions.clone()
    }

    pub fn values(&self) -> Values {
        self.snapshot.borrow().values()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Live view of the position model for UIs.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    /// True while any command holds the movement lock.
    pub fn is_moving(&self) -> bool {
        self.moving.load(Ordering::SeqCst)
    }

    pub fn active_profile(&self) -> Option<String> {
        self.snapshot.borrow().active_profile.clone()
    }

    pub fn is_goofy(&self) -> bool {
        self.snapshot.borrow().goofy
    }

    /// Configured order.
    pub fn surface_names(&self) -> &[String] {
        &self.surface_names
    }

    /// Right-to-left, the way the helm display lays surfaces out.
    pub fn surface_display_order(&self) -> Vec<String> {
        self.surface_names.iter().rev().cloned().collect()
    }

    pub fn goofy_map(&self) -> &BTreeMap<String, String> {
        &self.goofy_map
    }
}
