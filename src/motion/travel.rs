// src/motion/travel.rs - Concurrency-aware actuator travel times
use crate::config::{Config, ConfigError, TravelDuration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Which column of the duration table applies to a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Deploy,
    Withdraw,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Deploy => write!(f, "deploy"),
            Mode::Withdraw => write!(f, "withdraw"),
        }
    }
}

/// Full-stroke durations per number of simultaneously energized pins.
///
/// Actuators share one supply, so each one slows down as more run at once.
#[derive(Debug, Clone)]
pub struct TravelTimeModel {
    table: BTreeMap<usize, TravelDuration>,
    max_concurrency: usize,
}

impl TravelTimeModel {
    /// Build from an already keyed table; every level in `1..=max_concurrency`
    /// must be present.
    pub fn new(table: BTreeMap<usize, TravelDuration>, max_concurrency: usize) -> Result<Self, ConfigError> {
        if let Some(level) = (1..=max_concurrency).find(|level| !table.contains_key(level)) {
            return Err(ConfigError::ConcurrencyOutOfRange {
                level,
                max: table.keys().next_back().copied().unwrap_or(0),
            });
        }
        Ok(Self { table, max_concurrency })
    }

    /// The table of the config's operating mode, sized to its surfaces.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(config.travel_table()?, config.surfaces.len())
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Seconds for a full 0.0 -> 1.0 stroke with `hot_pin_count` pins energized.
    pub fn full_travel_seconds(&self, hot_pin_count: usize, mode: Mode) -> Result<f64, ConfigError> {
        if hot_pin_count == 0 || hot_pin_count > self.max_concurrency {
            return Err(ConfigError::ConcurrencyOutOfRange {
                level: hot_pin_count,
                max: self.max_concurrency,
            });
        }
        let entry = self.table.get(&hot_pin_count).ok_or(ConfigError::ConcurrencyOutOfRange {
            level: hot_pin_count,
            max: self.max_concurrency,
        })?;
        Ok(match mode {
            Mode::Deploy => entry.deploy,
            Mode::Withdraw => entry.withdraw,
        })
    }

    pub fn duration_seconds(&self, travel_fraction: f64, hot_pin_count: usize, mode: Mode) -> Result<f64, ConfigError> {
        Ok(travel_fraction * self.full_travel_seconds(hot_pin_count, mode)?)
    }

    pub fn duration(&self, travel_fraction: f64, hot_pin_count: usize, mode: Mode) -> Result<Duration, ConfigError> {
        let seconds = self.duration_seconds(travel_fraction, hot_pin_count, mode)?;
        Ok(Duration::from_secs_f64(seconds.max(0.0)))
    }

    /// Log the table the way operators read it off the dock.
    pub fn log_table(&self) {
        for mode in [Mode::Deploy, Mode::Withdraw] {
            for (pins, entry) in self.table.range(1..=self.max_concurrency) {
                let seconds = match mode {
                    Mode::Deploy => entry.deploy,
                    Mode::Withdraw => entry.withdraw,
                };
                tracing::info!("  > to fully {} {} pin(s) takes: {} seconds", mode, pins, seconds);
            }
        }
    }
}
