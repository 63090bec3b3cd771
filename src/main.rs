// src/main.rs - Command line front end for the trim tab controller
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use surf_rs::hardware::{HardwareError, PinDriver, SimulatedPinDriver};
use surf_rs::{Config, Controller, Mode, Profile, ProfileStore, RetractStrategy, TokioClock};
use tokio::io::{AsyncBufReadExt, BufReader};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Trim tab host
#[derive(Parser, Debug)]
#[command(name = "surf-host", about = "Drive wake-surf trim tabs through GPIO relays.")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "surf.toml")]
    config: PathBuf,

    /// Operating mode (overrides `operating_mode` in the config)
    #[arg(long)]
    mode: Option<String>,

    /// Use in-memory relays instead of GPIO
    #[arg(long)]
    simulate: bool,

    /// Profile directory (overrides `profiles_dir` in the config)
    #[arg(long)]
    profiles_dir: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Move surfaces to fractions of full travel, e.g. `move PORT=0.4 STARBOARD=0`
    Move {
        #[arg(value_parser = parse_fraction, required = true)]
        targets: Vec<(String, f64)>,
        /// Time the move with withdraw durations
        #[arg(long)]
        withdraw: bool,
    },
    /// Apply a saved profile
    Activate { username: String },
    /// Bring every surface back to zero
    Deactivate {
        /// Hold all retract pins for a full stroke instead of a tracked move
        #[arg(long)]
        blind: bool,
    },
    /// Swap each surface with its goofy counterpart
    Invert,
    /// Step one surface by the configured increment
    Nudge {
        surface: String,
        #[arg(value_enum)]
        direction: Direction,
        #[arg(long, default_value_t = 1)]
        times: u32,
    },
    /// Print current positions
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Pulse a single relay, or latch it with --high / --low
    Pin {
        pin: u8,
        #[arg(long, conflicts_with = "low")]
        high: bool,
        #[arg(long)]
        low: bool,
        #[arg(long, default_value_t = 1.0)]
        duration: f64,
    },
    /// Pulse every relay in turn
    Cycle {
        #[arg(long, default_value_t = 1.0)]
        duration: f64,
        #[arg(long, default_value_t = 0.5)]
        cooldown: f64,
    },
    /// Manage saved profiles
    Profiles {
        #[command(subcommand)]
        command: ProfilesCommand,
    },
    /// Read commands from stdin, keeping positions between them
    Shell,
}

#[derive(Subcommand, Debug)]
enum ProfilesCommand {
    List,
    Show {
        username: String,
    },
    Create {
        name: String,
        #[arg(value_parser = parse_percent, required = true)]
        targets: Vec<(String, i64)>,
        #[arg(long)]
        goofy: bool,
    },
    Delete {
        username: String,
    },
}

/// One line typed into the shell.
#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Direction {
    Up,
    Down,
}

fn parse_key_val<T: std::str::FromStr>(s: &str) -> Result<(String, T), String>
where
    T::Err: std::fmt::Display,
{
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid SURFACE=VALUE: no `=` found in '{}'.", s))?;
    let value = value
        .trim()
        .parse::<T>()
        .map_err(|e| format!("Invalid value in '{}': {}", s, e))?;
    Ok((name.trim().to_string(), value))
}

fn parse_fraction(s: &str) -> Result<(String, f64), String> {
    parse_key_val(s)
}

fn parse_percent(s: &str) -> Result<(String, i64), String> {
    parse_key_val(s)
}

fn seconds(value: f64) -> Result<Duration, BoxError> {
    Ok(Duration::try_from_secs_f64(value)?)
}

#[cfg(feature = "rpi")]
fn pin_driver(simulate: bool) -> Result<Arc<dyn PinDriver>, HardwareError> {
    if simulate {
        return Ok(Arc::new(SimulatedPinDriver::new()));
    }
    Ok(Arc::new(surf_rs::hardware::RppalPinDriver::new()?))
}

#[cfg(not(feature = "rpi"))]
fn pin_driver(simulate: bool) -> Result<Arc<dyn PinDriver>, HardwareError> {
    if !simulate {
        tracing::warn!("built without the `rpi` feature, relays are simulated");
    }
    Ok(Arc::new(SimulatedPinDriver::new()))
}

fn print_values(controller: &Controller) {
    let values = controller.values();
    for name in controller.surface_display_order() {
        let value = values.get(&name).copied().unwrap_or_default();
        println!("{:>10}: {:>3}%", name, value);
    }
}

async fn run(controller: &Controller, store: &ProfileStore, command: Command) -> Result<(), BoxError> {
    match command {
        Command::Move { targets, withdraw } => {
            let targets: BTreeMap<String, f64> = targets.into_iter().collect();
            let mode = if withdraw { Mode::Withdraw } else { Mode::Deploy };
            controller.move_to(&targets, mode).await?;
            print_values(controller);
        }
        Command::Activate { username } => {
            let profile = store.load(&username)?;
            controller.activate(&profile).await?;
            print_values(controller);
        }
        Command::Deactivate { blind } => {
            if blind {
                controller.retract(RetractStrategy::Blind).await?;
            } else {
                controller.deactivate_profile().await?;
            }
            print_values(controller);
        }
        Command::Invert => {
            controller.invert().await?;
            println!("goofy: {}", controller.is_goofy());
            print_values(controller);
        }
        Command::Nudge { surface, direction, times } => {
            for _ in 0..times {
                let value = match direction {
                    Direction::Up => controller.increment(&surface).await?,
                    Direction::Down => controller.decrement(&surface).await?,
                };
                println!("{}: {}%", surface, value);
            }
        }
        Command::Status { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&controller.snapshot())?);
            } else {
                if let Some(profile) = controller.active_profile() {
                    println!("profile: {} (goofy: {})", profile, controller.is_goofy());
                }
                print_values(controller);
            }
        }
        Command::Pin { pin, high, low, duration } => {
            if high || low {
                controller.set_pin(pin, high).await?;
            } else {
                controller.pulse_pin(pin, seconds(duration)?).await?;
            }
        }
        Command::Cycle { duration, cooldown } => {
            controller.cycle_pins(seconds(duration)?, seconds(cooldown)?).await?;
        }
        Command::Profiles { command } => match command {
            ProfilesCommand::List => {
                for profile in store.list()? {
                    println!("{:<20} {}", profile.username, profile.name);
                }
            }
            ProfilesCommand::Show { username } => {
                let profile = store.load(&username)?;
                println!("{}", serde_json::to_string_pretty(&profile)?);
            }
            ProfilesCommand::Create { name, targets, goofy } => {
                let mut profile = Profile::new(name, targets.into_iter().collect());
                profile.goofy = goofy;
                store.create(&profile, controller.surface_names())?;
                println!("created {}", store.path(&profile.username).display());
            }
            ProfilesCommand::Delete { username } => {
                store.delete(&username)?;
            }
        },
        Command::Shell => {
            tracing::warn!("already in a shell");
        }
    }
    Ok(())
}

async fn shell(controller: &Controller, store: &ProfileStore) -> Result<(), BoxError> {
    let mut updates = controller.subscribe();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            tracing::debug!("positions: {:?}", updates.borrow_and_update().values());
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        match ShellLine::try_parse_from(line.split_whitespace()) {
            Ok(parsed) => {
                if let Err(e) = run(controller, store, parsed.command).await {
                    tracing::error!("{}", e);
                }
            }
            Err(e) => println!("{}", e),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).init();

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let mut config = Config::load(&cli.config).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", cli.config.display(), e);
        e
    })?;
    if let Some(mode) = cli.mode {
        config.operating_mode = mode;
    }
    if let Some(dir) = cli.profiles_dir {
        config.profiles_dir = dir;
    }

    let driver = pin_driver(cli.simulate)?;
    let controller = Controller::new(&config, driver, Arc::new(TokioClock))?;
    let store = ProfileStore::open(&config.profiles_dir)?;
    tracing::info!("{} profile(s) in {}", store.count()?, store.dir().display());

    let result = match cli.command {
        Command::Shell => shell(&controller, &store).await,
        command => run(&controller, &store, command).await,
    };
    if let Err(e) = &result {
        tracing::error!("{}", e);
    }
    result
}
