//! TerraForge CLI - command-line front end for the map core.
//!
//! Subcommands:
//! - `config` views and edits `config.ini`
//! - `fetch-area` downloads a bounding box into the offline tile store
//! - `snapshot` renders the map at a position to a PNG
//! - `locate` prints the tile under a coordinate

mod commands;
mod error;
mod surface;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use terraforge::config::{ConfigError, ConfigFile};
use terraforge::coord::LatLon;
use terraforge::logging::init_logging;

use commands::config::ConfigCommands;
use commands::fetch_area::FetchAreaArgs;
use commands::locate::LocateArgs;
use commands::snapshot::SnapshotArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "terraforge", version = terraforge::VERSION, about = "Slippy-map tiles for TerraForge")]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// View or change configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Download every tile of a bounding box into the offline store
    FetchArea {
        /// Upper-left corner as LAT,LON
        #[arg(long, value_parser = parse_lat_lon, allow_hyphen_values = true)]
        top_left: LatLon,

        /// Lower-right corner as LAT,LON
        #[arg(long, value_parser = parse_lat_lon, allow_hyphen_values = true)]
        bottom_right: LatLon,

        /// Lowest zoom level to download
        #[arg(long, default_value_t = 0)]
        min_zoom: u8,

        /// Highest zoom level to download
        #[arg(long)]
        max_zoom: u8,

        /// Store directory (default: fetch.store_dir or the user cache directory)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Concurrent downloads (default: fetch.workers)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Render the map around a coordinate to a PNG file
    Snapshot {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        #[arg(long)]
        zoom: f64,

        /// Image width (default: widget.width)
        #[arg(long)]
        width: Option<u32>,

        /// Image height (default: widget.height)
        #[arg(long)]
        height: Option<u32>,

        /// Drop a marker at the coordinate
        #[arg(long)]
        marker: bool,

        /// Output PNG path
        #[arg(long)]
        out: PathBuf,

        /// Seconds to wait for tiles before rendering what has arrived
        #[arg(long, default_value_t = 30)]
        wait_secs: u64,
    },

    /// Print the tile index and URL under a coordinate
    Locate {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        #[arg(long)]
        zoom: u8,
    },
}

/// Parses `LAT,LON`.
fn parse_lat_lon(value: &str) -> Result<LatLon, String> {
    let (lat, lon) = value
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got '{}'", value))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("invalid latitude '{}'", lat.trim()))?;
    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|_| format!("invalid longitude '{}'", lon.trim()))?;

    let point = LatLon::new(lat, lon);
    if !point.is_valid() {
        return Err(format!("{} is outside ±90°/±180°", point));
    }
    Ok(point)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let loaded = ConfigFile::load();

    let mut logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    let _guard = init_logging(&logging)?;

    dispatch(cli.command, loaded)
}

/// Runs `command`. Only `config` tolerates a config file that failed to load,
/// so a broken file can be repaired.
fn dispatch(command: Commands, loaded: Result<ConfigFile, ConfigError>) -> Result<(), CliError> {
    match command {
        Commands::Config { command } => commands::config::run(command),
        Commands::FetchArea {
            top_left,
            bottom_right,
            min_zoom,
            max_zoom,
            store,
            workers,
        } => commands::fetch_area::run(
            &loaded?,
            FetchAreaArgs {
                top_left,
                bottom_right,
                min_zoom,
                max_zoom,
                store,
                workers,
            },
        ),
        Commands::Snapshot {
            lat,
            lon,
            zoom,
            width,
            height,
            marker,
            out,
            wait_secs,
        } => commands::snapshot::run(
            &loaded?,
            SnapshotArgs {
                center: LatLon::new(lat, lon),
                zoom,
                width,
                height,
                marker,
                out,
                wait_secs,
            },
        ),
        Commands::Locate { lat, lon, zoom } => commands::locate::run(
            &loaded?,
            LocateArgs {
                position: LatLon::new(lat, lon),
                zoom,
            },
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreadable() -> Result<ConfigFile, ConfigError> {
        Err(ConfigError::Read {
            path: PathBuf::from("/etc/terraforge/config.ini"),
            message: "bad section header".to_string(),
        })
    }

    #[test]
    fn test_config_command_runs_on_unreadable_file() {
        let command = Commands::Config {
            command: ConfigCommands::Path,
        };
        assert!(dispatch(command, unreadable()).is_ok());
    }

    #[test]
    fn test_other_commands_report_unreadable_file() {
        let command = Commands::Locate {
            lat: 52.5,
            lon: 13.4,
            zoom: 10,
        };
        let err = dispatch(command, unreadable()).unwrap_err();
        assert!(matches!(err, CliError::Config(message) if message.contains("bad section header")));
    }

    #[test]
    fn test_parse_lat_lon() {
        assert_eq!(parse_lat_lon("52.5, 13.4").unwrap(), LatLon::new(52.5, 13.4));
        assert_eq!(parse_lat_lon("-33.9,151.2").unwrap(), LatLon::new(-33.9, 151.2));
        assert!(parse_lat_lon("52.5").is_err());
        assert!(parse_lat_lon("north,13").is_err());
        assert!(parse_lat_lon("95,0").is_err());
    }

    #[test]
    fn test_cli_parses_fetch_area() {
        let cli = Cli::try_parse_from([
            "terraforge",
            "fetch-area",
            "--top-left",
            "-10.5,20",
            "--bottom-right",
            "-12,22.5",
            "--max-zoom",
            "8",
        ])
        .unwrap();

        let Commands::FetchArea {
            top_left,
            bottom_right,
            min_zoom,
            max_zoom,
            ..
        } = cli.command
        else {
            panic!("expected fetch-area");
        };
        assert_eq!(top_left, LatLon::new(-10.5, 20.0));
        assert_eq!(bottom_right, LatLon::new(-12.0, 22.5));
        assert_eq!(min_zoom, 0);
        assert_eq!(max_zoom, 8);
    }

    #[test]
    fn test_cli_parses_snapshot() {
        let cli = Cli::try_parse_from([
            "terraforge", "snapshot", "--lat", "-33.9", "--lon", "151.2", "--zoom", "12",
            "--marker", "--out", "sydney.png",
        ])
        .unwrap();

        assert!(matches!(
            cli.command,
            Commands::Snapshot { marker: true, wait_secs: 30, .. }
        ));
    }
}
