//! Widget configuration.

use std::time::Duration;

use crate::config::{ConfigFile, DEFAULT_INITIAL_ZOOM, DEFAULT_WIDGET_HEIGHT, DEFAULT_WIDGET_WIDTH};
use crate::coord::LatLon;
use crate::engine::EngineConfig;
use crate::fetch::RetryPolicy;

/// Settings for a [`MapWidget`](super::MapWidget).
#[derive(Debug, Clone, PartialEq)]
pub struct MapConfig {
    /// Background engine settings.
    pub engine: EngineConfig,
    /// Widget width in pixels.
    pub width: u32,
    /// Widget height in pixels.
    pub height: u32,
    /// Zoom shown on startup.
    pub initial_zoom: f64,
    /// Center shown on startup.
    pub center: LatLon,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            width: DEFAULT_WIDGET_WIDTH,
            height: DEFAULT_WIDGET_HEIGHT,
            initial_zoom: DEFAULT_INITIAL_ZOOM,
            center: LatLon::new(0.0, 0.0),
        }
    }
}

impl MapConfig {
    /// Builds widget and engine settings from a loaded config file.
    pub fn from_config_file(file: &ConfigFile) -> Self {
        let engine = EngineConfig::default()
            .with_url_template(file.tiles.url_template.clone())
            .with_overlay_template(file.tiles.overlay_template.clone())
            .with_tile_size(file.tiles.tile_size)
            .with_max_zoom(file.tiles.max_zoom)
            .with_cache_capacity(file.cache.max_entries)
            .with_workers(file.fetch.workers)
            .with_fetch_timeout(file.fetch.timeout)
            .with_retry(RetryPolicy::exponential(file.fetch.max_attempts))
            .with_store_dir(file.fetch.store_dir.clone())
            .with_store_only(file.fetch.store_only)
            .with_precache(file.precache.clone());

        Self {
            engine,
            width: file.widget.width,
            height: file.widget.height,
            initial_zoom: file.widget.initial_zoom,
            center: LatLon::new(file.widget.initial_lat, file.widget.initial_lon),
        }
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_center(mut self, center: LatLon, zoom: f64) -> Self {
        self.center = center;
        self.initial_zoom = zoom;
        self
    }

    /// Fetch timeout of the engine.
    pub fn fetch_timeout(&self) -> Duration {
        self.engine.fetch_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_from_config_file() {
        let file = ConfigFile::parse(
            "[tiles]\n\
             url_template = https://tiles.test/{z}/{x}/{y}.png\n\
             tile_size = 512\n\
             [fetch]\n\
             workers = 6\n\
             max_attempts = 2\n\
             store_dir = /srv/tiles\n\
             [precache]\n\
             max_radius = 3\n\
             [widget]\n\
             width = 1024\n\
             initial_lat = 52.5\n\
             initial_lon = 13.4\n",
        )
        .unwrap();

        let config = MapConfig::from_config_file(&file);

        assert_eq!(config.engine.url_template, "https://tiles.test/{z}/{x}/{y}.png");
        assert_eq!(config.engine.tile_size, 512);
        assert_eq!(config.engine.workers, 6);
        assert_eq!(config.engine.retry.max_attempts(), 2);
        assert_eq!(config.engine.store_dir, Some(PathBuf::from("/srv/tiles")));
        assert_eq!(config.engine.precache.max_radius, 3);
        assert_eq!(config.width, 1024);
        assert_eq!(config.height, DEFAULT_WIDGET_HEIGHT);
        assert_eq!(config.center, LatLon::new(52.5, 13.4));
    }

    #[test]
    fn test_defaults_match_config_file_defaults() {
        let config = MapConfig::from_config_file(&ConfigFile::default());
        assert_eq!(config, MapConfig::default());
    }
}
