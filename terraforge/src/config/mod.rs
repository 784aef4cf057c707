//! Configuration file handling.
//!
//! Settings live in an INI file at `~/.config/terraforge/config.ini` (the
//! platform config directory on other systems):
//!
//! ```ini
//! [tiles]
//! url_template = https://tile.openstreetmap.org/{z}/{x}/{y}.png
//! overlay_template =
//! tile_size = 256
//! max_zoom = 19
//!
//! [cache]
//! max_entries = 10000
//!
//! [fetch]
//! workers = 25
//! timeout_secs = 10
//! max_attempts = 4
//! store_dir =
//! store_only = false
//!
//! [precache]
//! max_radius = 8
//! ring_interval_ms = 100
//! max_pending = 256
//!
//! [widget]
//! width = 800
//! height = 600
//! initial_zoom = 3
//! initial_lat = 0
//! initial_lon = 0
//!
//! [logging]
//! level = info
//! directory =
//! ```

mod error;
mod file;
mod keys;

pub use error::ConfigError;
pub use file::{
    CacheSettings, ConfigFile, FetchSettings, TilesSettings, WidgetSettings, DEFAULT_INITIAL_ZOOM,
    DEFAULT_WIDGET_HEIGHT, DEFAULT_WIDGET_WIDTH,
};
pub use keys::ConfigKey;

use std::path::PathBuf;

/// Directory holding TerraForge's configuration.
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("terraforge")
}

/// Path of the configuration file.
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

/// Default persistent tile store location.
pub fn default_store_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("terraforge")
        .join("tiles")
}
