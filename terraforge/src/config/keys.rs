//! Typed access to individual `section.key` settings.
//!
//! Every setting in [`ConfigFile`] has a [`ConfigKey`]. Keys drive both the
//! INI reader and writer and the `config get`/`config set` CLI commands, so
//! validation lives in one place: [`ConfigKey::set`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::error::ConfigError;
use super::file::ConfigFile;
use crate::coord::MAX_SUPPORTED_ZOOM;
use crate::source::TileTemplate;

/// One configurable setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    TilesUrlTemplate,
    TilesOverlayTemplate,
    TilesTileSize,
    TilesMaxZoom,
    CacheMaxEntries,
    FetchWorkers,
    FetchTimeoutSecs,
    FetchMaxAttempts,
    FetchStoreDir,
    FetchStoreOnly,
    PrecacheMaxRadius,
    PrecacheRingIntervalMs,
    PrecacheMaxPending,
    WidgetWidth,
    WidgetHeight,
    WidgetInitialZoom,
    WidgetInitialLat,
    WidgetInitialLon,
    LoggingLevel,
    LoggingDirectory,
}

const ALL_KEYS: &[ConfigKey] = &[
    ConfigKey::TilesUrlTemplate,
    ConfigKey::TilesOverlayTemplate,
    ConfigKey::TilesTileSize,
    ConfigKey::TilesMaxZoom,
    ConfigKey::CacheMaxEntries,
    ConfigKey::FetchWorkers,
    ConfigKey::FetchTimeoutSecs,
    ConfigKey::FetchMaxAttempts,
    ConfigKey::FetchStoreDir,
    ConfigKey::FetchStoreOnly,
    ConfigKey::PrecacheMaxRadius,
    ConfigKey::PrecacheRingIntervalMs,
    ConfigKey::PrecacheMaxPending,
    ConfigKey::WidgetWidth,
    ConfigKey::WidgetHeight,
    ConfigKey::WidgetInitialZoom,
    ConfigKey::WidgetInitialLat,
    ConfigKey::WidgetInitialLon,
    ConfigKey::LoggingLevel,
    ConfigKey::LoggingDirectory,
];

impl ConfigKey {
    /// All keys, grouped by section in file order.
    pub fn all() -> &'static [ConfigKey] {
        ALL_KEYS
    }

    /// Full `section.key` name.
    pub fn name(&self) -> &'static str {
        match self {
            ConfigKey::TilesUrlTemplate => "tiles.url_template",
            ConfigKey::TilesOverlayTemplate => "tiles.overlay_template",
            ConfigKey::TilesTileSize => "tiles.tile_size",
            ConfigKey::TilesMaxZoom => "tiles.max_zoom",
            ConfigKey::CacheMaxEntries => "cache.max_entries",
            ConfigKey::FetchWorkers => "fetch.workers",
            ConfigKey::FetchTimeoutSecs => "fetch.timeout_secs",
            ConfigKey::FetchMaxAttempts => "fetch.max_attempts",
            ConfigKey::FetchStoreDir => "fetch.store_dir",
            ConfigKey::FetchStoreOnly => "fetch.store_only",
            ConfigKey::PrecacheMaxRadius => "precache.max_radius",
            ConfigKey::PrecacheRingIntervalMs => "precache.ring_interval_ms",
            ConfigKey::PrecacheMaxPending => "precache.max_pending",
            ConfigKey::WidgetWidth => "widget.width",
            ConfigKey::WidgetHeight => "widget.height",
            ConfigKey::WidgetInitialZoom => "widget.initial_zoom",
            ConfigKey::WidgetInitialLat => "widget.initial_lat",
            ConfigKey::WidgetInitialLon => "widget.initial_lon",
            ConfigKey::LoggingLevel => "logging.level",
            ConfigKey::LoggingDirectory => "logging.directory",
        }
    }

    /// INI section name.
    pub fn section(&self) -> &'static str {
        self.split().0
    }

    /// Key name within the section.
    pub fn key_name(&self) -> &'static str {
        self.split().1
    }

    fn split(&self) -> (&'static str, &'static str) {
        self.name().split_once('.').unwrap_or(("", self.name()))
    }

    /// Current value as a string. Unset optional values are empty.
    pub fn get(&self, config: &ConfigFile) -> String {
        let path = |p: &Option<PathBuf>| p.as_ref().map(|p| p.display().to_string()).unwrap_or_default();

        match self {
            ConfigKey::TilesUrlTemplate => config.tiles.url_template.clone(),
            ConfigKey::TilesOverlayTemplate => config.tiles.overlay_template.clone().unwrap_or_default(),
            ConfigKey::TilesTileSize => config.tiles.tile_size.to_string(),
            ConfigKey::TilesMaxZoom => config.tiles.max_zoom.to_string(),
            ConfigKey::CacheMaxEntries => config.cache.max_entries.to_string(),
            ConfigKey::FetchWorkers => config.fetch.workers.to_string(),
            ConfigKey::FetchTimeoutSecs => config.fetch.timeout.as_secs().to_string(),
            ConfigKey::FetchMaxAttempts => config.fetch.max_attempts.to_string(),
            ConfigKey::FetchStoreDir => path(&config.fetch.store_dir),
            ConfigKey::FetchStoreOnly => config.fetch.store_only.to_string(),
            ConfigKey::PrecacheMaxRadius => config.precache.max_radius.to_string(),
            ConfigKey::PrecacheRingIntervalMs => config.precache.ring_interval.as_millis().to_string(),
            ConfigKey::PrecacheMaxPending => config.precache.max_pending.to_string(),
            ConfigKey::WidgetWidth => config.widget.width.to_string(),
            ConfigKey::WidgetHeight => config.widget.height.to_string(),
            ConfigKey::WidgetInitialZoom => config.widget.initial_zoom.to_string(),
            ConfigKey::WidgetInitialLat => config.widget.initial_lat.to_string(),
            ConfigKey::WidgetInitialLon => config.widget.initial_lon.to_string(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingDirectory => path(&config.logging.directory),
        }
    }

    /// Validates `value` and stores it.
    ///
    /// An empty value clears optional settings.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let invalid = |reason: &str| ConfigError::InvalidValue {
            key: self.name().to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };
        let optional_path = |v: &str| (!v.is_empty()).then(|| PathBuf::from(v));

        match self {
            ConfigKey::TilesUrlTemplate => {
                TileTemplate::parse(value).map_err(|e| invalid(&e.to_string()))?;
                config.tiles.url_template = value.to_string();
            }
            ConfigKey::TilesOverlayTemplate => {
                if value.is_empty() {
                    config.tiles.overlay_template = None;
                } else {
                    TileTemplate::parse(value).map_err(|e| invalid(&e.to_string()))?;
                    config.tiles.overlay_template = Some(value.to_string());
                }
            }
            ConfigKey::TilesTileSize => {
                config.tiles.tile_size = parse_positive(value).map_err(|r| invalid(r))?;
            }
            ConfigKey::TilesMaxZoom => {
                let zoom: u8 = value.parse().map_err(|_| invalid("expected a zoom level"))?;
                if zoom > MAX_SUPPORTED_ZOOM {
                    return Err(invalid("zoom level too high"));
                }
                config.tiles.max_zoom = zoom;
            }
            ConfigKey::CacheMaxEntries => {
                config.cache.max_entries = parse_positive(value).map_err(|r| invalid(r))?;
            }
            ConfigKey::FetchWorkers => {
                config.fetch.workers = parse_positive(value).map_err(|r| invalid(r))?;
            }
            ConfigKey::FetchTimeoutSecs => {
                let secs: u64 = parse_positive(value).map_err(|r| invalid(r))?;
                config.fetch.timeout = Duration::from_secs(secs);
            }
            ConfigKey::FetchMaxAttempts => {
                config.fetch.max_attempts = parse_positive(value).map_err(|r| invalid(r))?;
            }
            ConfigKey::FetchStoreDir => config.fetch.store_dir = optional_path(value),
            ConfigKey::FetchStoreOnly => {
                config.fetch.store_only = parse_bool(value).ok_or_else(|| invalid("expected true or false"))?;
            }
            ConfigKey::PrecacheMaxRadius => {
                config.precache.max_radius = value.parse().map_err(|_| invalid("expected a number"))?;
            }
            ConfigKey::PrecacheRingIntervalMs => {
                let ms: u64 = value.parse().map_err(|_| invalid("expected milliseconds"))?;
                config.precache.ring_interval = Duration::from_millis(ms);
            }
            ConfigKey::PrecacheMaxPending => {
                config.precache.max_pending = parse_positive(value).map_err(|r| invalid(r))?;
            }
            ConfigKey::WidgetWidth => {
                config.widget.width = parse_positive(value).map_err(|r| invalid(r))?;
            }
            ConfigKey::WidgetHeight => {
                config.widget.height = parse_positive(value).map_err(|r| invalid(r))?;
            }
            ConfigKey::WidgetInitialZoom => {
                config.widget.initial_zoom = parse_in_range(value, 0.0, MAX_SUPPORTED_ZOOM as f64).map_err(|r| invalid(r))?;
            }
            ConfigKey::WidgetInitialLat => {
                config.widget.initial_lat = parse_in_range(value, -90.0, 90.0).map_err(|r| invalid(r))?;
            }
            ConfigKey::WidgetInitialLon => {
                config.widget.initial_lon = parse_in_range(value, -180.0, 180.0).map_err(|r| invalid(r))?;
            }
            ConfigKey::LoggingLevel => {
                if value.is_empty() {
                    return Err(invalid("expected a level or filter directive"));
                }
                config.logging.level = value.to_string();
            }
            ConfigKey::LoggingDirectory => config.logging.directory = optional_path(value),
        }
        Ok(())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ALL_KEYS
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

fn parse_positive<T>(value: &str) -> Result<T, &'static str>
where
    T: FromStr + PartialOrd + Default,
{
    let parsed: T = value.parse().map_err(|_| "expected a positive number")?;
    if parsed <= T::default() {
        return Err("must be greater than zero");
    }
    Ok(parsed)
}

fn parse_in_range(value: &str, min: f64, max: f64) -> Result<f64, &'static str> {
    let parsed: f64 = value.parse().map_err(|_| "expected a number")?;
    if !(min..=max).contains(&parsed) {
        return Err("out of range");
    }
    Ok(parsed)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_from_str() {
        for key in ConfigKey::all() {
            assert_eq!(key.name().parse::<ConfigKey>().unwrap(), *key);
            assert_eq!(format!("{}.{}", key.section(), key.key_name()), key.name());
        }
    }

    #[test]
    fn test_unknown_key() {
        assert!(matches!(
            "tiles.color".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_set_and_get() {
        let mut config = ConfigFile::default();
        ConfigKey::FetchWorkers.set(&mut config, "8").unwrap();
        ConfigKey::FetchStoreOnly.set(&mut config, "yes").unwrap();
        ConfigKey::FetchStoreDir.set(&mut config, "/var/tiles").unwrap();
        ConfigKey::WidgetInitialLat.set(&mut config, "-33.86").unwrap();

        assert_eq!(ConfigKey::FetchWorkers.get(&config), "8");
        assert_eq!(ConfigKey::FetchStoreOnly.get(&config), "true");
        assert_eq!(ConfigKey::FetchStoreDir.get(&config), "/var/tiles");
        assert_eq!(config.widget.initial_lat, -33.86);

        ConfigKey::FetchStoreDir.set(&mut config, "").unwrap();
        assert_eq!(ConfigKey::FetchStoreDir.get(&config), "");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = ConfigFile::default();
        let cases = [
            (ConfigKey::FetchWorkers, "0"),
            (ConfigKey::FetchWorkers, "many"),
            (ConfigKey::TilesMaxZoom, "31"),
            (ConfigKey::TilesUrlTemplate, "https://tiles/{z}/{x}.png"),
            (ConfigKey::WidgetInitialLon, "181"),
            (ConfigKey::FetchStoreOnly, "maybe"),
        ];
        for (key, value) in cases {
            let err = key.set(&mut config, value).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { .. }),
                "{} = {} should be rejected",
                key.name(),
                value
            );
        }
        assert_eq!(config, ConfigFile::default());
    }
}
