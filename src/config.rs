//! # Trim Tab Configuration
//!
//! Static description of the boat: which control surfaces exist, which relay
//! pins drive them, how long a full stroke takes at each concurrency level,
//! and a handful of controller options.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! operating_mode = "wet"
//! deactivate = "tracked"
//!
//! [[surfaces]]
//! name = "PORT"
//! goofy = "STARBOARD"
//! pins = { extend = 17, retract = 27 }
//!
//! [[surfaces]]
//! name = "STARBOARD"
//! goofy = "PORT"
//! pins = { extend = 22, retract = 23 }
//!
//! [travel_durations.wet.1]
//! deploy = 5.5
//! withdraw = 5.0
//!
//! [travel_durations.wet.2]
//! deploy = 6.5
//! withdraw = 6.0
//! ```
//!
//! - Concurrency levels are keyed by the number of pins energized at once and
//!   must cover `1..=surfaces.len()` for the selected operating mode.
//! - A surface without `goofy` is its own counterpart.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("no control surfaces configured")]
    NoSurfaces,
    #[error("control surface names must not be empty")]
    EmptySurfaceName,
    #[error("control surface '{0}' is configured more than once")]
    DuplicateSurface(String),
    #[error("pin {pin} is assigned to both {first} and {second}")]
    DuplicatePin { pin: u8, first: String, second: String },
    #[error("surface '{surface}' names unknown goofy counterpart '{goofy}'")]
    UnknownGoofy { surface: String, goofy: String },
    #[error("surface '{0}' is the goofy counterpart of more than one surface")]
    GoofyNotPermutation(String),
    #[error("no travel durations for operating mode '{0}'")]
    MissingMode(String),
    #[error("travel durations for mode '{mode}' use non-numeric concurrency level '{key}'")]
    InvalidConcurrencyKey { mode: String, key: String },
    #[error("travel durations for mode '{mode}' are missing concurrency level {level}")]
    MissingConcurrency { mode: String, level: usize },
    #[error("travel duration for mode '{mode}', level {level}, {action} must be positive, got {value}")]
    InvalidDuration {
        mode: String,
        level: usize,
        action: &'static str,
        value: f64,
    },
    #[error("no travel duration for {level} concurrent pin(s); table covers 1..={max}")]
    ConcurrencyOutOfRange { level: usize, max: usize },
    #[error("increment step must be within (0, 1], got {0}")]
    InvalidIncrementStep(f64),
}

/// Top level configuration for the trim tab controller.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_operating_mode")]
    pub operating_mode: String,
    #[serde(default)]
    pub deactivate: RetractStrategy,
    #[serde(default = "default_increment_step")]
    pub increment_step: f64,
    #[serde(default = "default_profiles_dir")]
    pub profiles_dir: PathBuf,
    #[serde(default)]
    pub surfaces: Vec<SurfaceConfig>,
    /// operating mode -> concurrency level -> full-stroke durations
    #[serde(default)]
    pub travel_durations: BTreeMap<String, BTreeMap<String, TravelDuration>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            operating_mode: default_operating_mode(),
            deactivate: RetractStrategy::default(),
            increment_step: default_increment_step(),
            profiles_dir: default_profiles_dir(),
            surfaces: Vec::new(),
            travel_durations: BTreeMap::new(),
        }
    }
}

/// How a profile deactivation brings every surface back to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetractStrategy {
    /// Move to zero through the scheduler, honoring the tracked positions.
    #[default]
    Tracked,
    /// Hold every retract pin for a full withdraw stroke.
    Blind,
}

/// One trim tab and the relays that drive it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SurfaceConfig {
    pub name: String,
    #[serde(default)]
    pub goofy: Option<String>,
    pub pins: PinConfig,
}

impl SurfaceConfig {
    /// The goofy counterpart, falling back to the surface itself.
    pub fn goofy_name(&self) -> &str {
        self.goofy.as_deref().unwrap_or(&self.name)
    }
}

/// BCM pin numbers for a surface's two relays.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct PinConfig {
    pub extend: u8,
    pub retract: u8,
}

/// Seconds for one surface to travel from 0.0 to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TravelDuration {
    pub deploy: f64,
    pub withdraw: f64,
}

fn default_operating_mode() -> String { "wet".to_string() }
fn default_increment_step() -> f64 { 0.05 }
fn default_profiles_dir() -> PathBuf { PathBuf::from("profiles") }

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_path = config_path.as_ref();
        let mut file = File::open(config_path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let config = Self::from_toml(&contents)?;
        tracing::info!("Loaded configuration from TOML file: {}", config_path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn surface_names(&self) -> Vec<String> {
        self.surfaces.iter().map(|s| s.name.clone()).collect()
    }

    /// Surface name -> goofy counterpart, leaving out self-mapped surfaces.
    pub fn goofy_map(&self) -> BTreeMap<String, String> {
        self.surfaces
            .iter()
            .filter(|s| s.goofy_name() != s.name)
            .map(|s| (s.name.clone(), s.goofy_name().to_string()))
            .collect()
    }

    /// Run every static check. Nothing touches hardware until this passes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.surfaces.is_empty() {
            return Err(ConfigError::NoSurfaces);
        }
        if !(self.increment_step > 0.0 && self.increment_step <= 1.0) {
            return Err(ConfigError::InvalidIncrementStep(self.increment_step));
        }

        let mut names = HashSet::new();
        let mut pins: HashMap<u8, String> = HashMap::new();
        for surface in &self.surfaces {
            if surface.name.trim().is_empty() {
                return Err(ConfigError::EmptySurfaceName);
            }
            if !names.insert(surface.name.as_str()) {
                return Err(ConfigError::DuplicateSurface(surface.name.clone()));
            }
            for (role, pin) in [("extend", surface.pins.extend), ("retract", surface.pins.retract)] {
                let owner = format!("{}.{}", surface.name, role);
                if let Some(first) = pins.insert(pin, owner.clone()) {
                    return Err(ConfigError::DuplicatePin { pin, first, second: owner });
                }
            }
        }

        let mut counterparts = HashSet::new();
        for surface in &self.surfaces {
            let goofy = surface.goofy_name();
            if !names.contains(goofy) {
                return Err(ConfigError::UnknownGoofy {
                    surface: surface.name.clone(),
                    goofy: goofy.to_string(),
                });
            }
            if !counterparts.insert(goofy) {
                return Err(ConfigError::GoofyNotPermutation(goofy.to_string()));
            }
        }

        self.travel_table()?;
        Ok(())
    }

    /// The travel durations of the selected operating mode, keyed by
    /// concurrency level and checked to cover `1..=surfaces.len()`.
    pub fn travel_table(&self) -> Result<BTreeMap<usize, TravelDuration>, ConfigError> {
        let mode = &self.operating_mode;
        let raw = self
            .travel_durations
            .get(mode)
            .ok_or_else(|| ConfigError::MissingMode(mode.clone()))?;

        let mut table = BTreeMap::new();
        for (key, duration) in raw {
            let level: usize = key.trim().parse().map_err(|_| ConfigError::InvalidConcurrencyKey {
                mode: mode.clone(),
                key: key.clone(),
            })?;
            for (action, value) in [("deploy", duration.deploy), ("withdraw", duration.withdraw)] {
                if !(value.is_finite() && value > 0.0) {
                    return Err(ConfigError::InvalidDuration {
                        mode: mode.clone(),
                        level,
                        action,
                        value,
                    });
                }
            }
            table.insert(level, *duration);
        }

        for level in 1..=self.surfaces.len() {
            if !table.contains_key(&level) {
                return Err(ConfigError::MissingConcurrency { mode: mode.clone(), level });
            }
        }
        Ok(table)
    }
}
