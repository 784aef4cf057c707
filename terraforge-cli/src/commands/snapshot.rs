//! Snapshot command - render the map around a coordinate to a PNG.
//!
//! Drives a [`MapWidget`] headlessly: render commands are applied to an
//! offscreen [`Surface`] until every visible tile has arrived or the wait
//! expires, then the surface is written out.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use terraforge::config::ConfigFile;
use terraforge::coord::LatLon;
use terraforge::overlay::MarkerStyle;
use terraforge::tile::TileImage;
use terraforge::widget::{MapConfig, MapWidget};

use crate::error::CliError;
use crate::surface::Surface;

/// How often the widget is ticked while waiting for tiles.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Arguments for the snapshot command.
pub struct SnapshotArgs {
    pub center: LatLon,
    pub zoom: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub marker: bool,
    pub out: PathBuf,
    pub wait_secs: u64,
}

/// Run the snapshot command.
pub fn run(config: &ConfigFile, args: SnapshotArgs) -> Result<(), CliError> {
    if !args.center.is_valid() {
        return Err(CliError::InvalidArgument(format!(
            "{} is outside ±90°/±180°",
            args.center
        )));
    }

    let defaults = MapConfig::from_config_file(config);
    let width = args.width.unwrap_or(defaults.width);
    let height = args.height.unwrap_or(defaults.height);
    let map_config = defaults
        .with_center(args.center, args.zoom)
        .with_size(width, height);

    let mut map = MapWidget::new(map_config)?;
    if args.marker {
        map.set_position(args.center.lat, args.center.lon, Some(MarkerStyle::default()));
    }

    let mut surface = Surface::new(width, height);
    let deadline = Instant::now() + Duration::from_secs(args.wait_secs);
    loop {
        surface.apply_all(map.tick());
        if map.viewport().is_settled() || Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let pending = map
        .viewport()
        .slots()
        .filter(|slot| slot.image == TileImage::NotLoaded)
        .count();
    let unavailable = map
        .viewport()
        .slots()
        .filter(|slot| slot.image == TileImage::Unavailable)
        .count();
    if pending > 0 {
        warn!(pending, "Rendering before all tiles arrived");
    }

    let image = surface.render().ok_or_else(|| CliError::Render {
        path: args.out.clone(),
        message: format!("cannot allocate a {}x{} canvas", width, height),
    })?;
    image.save(&args.out).map_err(|e| CliError::Render {
        path: args.out.clone(),
        message: e.to_string(),
    })?;

    let stats = map.stats();
    info!(
        path = %args.out.display(),
        tiles = surface.tile_count(),
        cache_hits = stats.cache.hits,
        "Snapshot written"
    );
    map.shutdown();

    println!(
        "Wrote {} ({}x{}, zoom {:.1}, {} tiles)",
        args.out.display(),
        width,
        height,
        args.zoom,
        surface.tile_count()
    );
    if pending > 0 || unavailable > 0 {
        println!(
            "  {} tiles still loading, {} unavailable",
            pending, unavailable
        );
    }

    Ok(())
}
