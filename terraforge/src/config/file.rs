//! The INI configuration file.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use ini::Ini;
use tracing::debug;

use super::error::ConfigError;
use super::keys::ConfigKey;
use super::config_file_path;
use crate::cache::DEFAULT_MAX_ENTRIES;
use crate::engine::DEFAULT_FETCH_TIMEOUT_SECS;
use crate::fetch::{DEFAULT_MAX_ATTEMPTS, DEFAULT_WORKER_COUNT};
use crate::logging::LoggingConfig;
use crate::precache::PreCacheConfig;
use crate::source::{DEFAULT_MAX_ZOOM, DEFAULT_TILE_TEMPLATE};
use crate::tile::DEFAULT_TILE_SIZE;

/// Default widget width in pixels.
pub const DEFAULT_WIDGET_WIDTH: u32 = 800;

/// Default widget height in pixels.
pub const DEFAULT_WIDGET_HEIGHT: u32 = 600;

/// Default initial zoom level.
pub const DEFAULT_INITIAL_ZOOM: f64 = 3.0;

/// `[tiles]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct TilesSettings {
    pub url_template: String,
    pub overlay_template: Option<String>,
    pub tile_size: u32,
    pub max_zoom: u8,
}

impl Default for TilesSettings {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_TILE_TEMPLATE.to_string(),
            overlay_template: None,
            tile_size: DEFAULT_TILE_SIZE,
            max_zoom: DEFAULT_MAX_ZOOM,
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// `[fetch]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    pub workers: usize,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub store_dir: Option<PathBuf>,
    pub store_only: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKER_COUNT,
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            store_dir: None,
            store_only: false,
        }
    }
}

/// `[widget]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetSettings {
    pub width: u32,
    pub height: u32,
    pub initial_zoom: f64,
    pub initial_lat: f64,
    pub initial_lon: f64,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDGET_WIDTH,
            height: DEFAULT_WIDGET_HEIGHT,
            initial_zoom: DEFAULT_INITIAL_ZOOM,
            initial_lat: 0.0,
            initial_lon: 0.0,
        }
    }
}

/// Contents of `config.ini`.
///
/// Missing sections and keys keep their defaults. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub tiles: TilesSettings,
    pub cache: CacheSettings,
    pub fetch: FetchSettings,
    pub precache: PreCacheConfig,
    pub widget: WidgetSettings,
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Loads the default config file, returning defaults if it does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Loads a config file, returning defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parses INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<string>"),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|section| section.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Saves to the default config file, creating its directory.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Saves to `path`, creating its directory.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |message: String| ConfigError::Write {
            path: path.to_path_buf(),
            message,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_error(e.to_string()))?;
        }
        self.to_ini()
            .write_to_file(path)
            .map_err(|e| write_error(e.to_string()))?;

        debug!(path = %path.display(), "Config file saved");
        Ok(())
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            ini.with_section(Some(key.section()))
                .set(key.key_name(), key.get(self));
        }
        ini
    }
}
