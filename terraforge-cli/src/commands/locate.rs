//! Locate command - show which tile covers a coordinate.

use terraforge::config::ConfigFile;
use terraforge::coord::{decimal_to_tile, LatLon};
use terraforge::source::{DiskTileStore, TileSource};

use crate::error::CliError;

/// Arguments for the locate command.
pub struct LocateArgs {
    pub position: LatLon,
    pub zoom: u8,
}

/// Tile index and in-tile pixel offset of a coordinate.
#[derive(Debug, PartialEq)]
struct Location {
    x: i32,
    y: i32,
    pixel: (u32, u32),
}

fn locate(position: LatLon, zoom: u8, tile_size: u32) -> Location {
    let point = decimal_to_tile(position.lat, position.lon, zoom);
    let (x, y) = (point.x.floor(), point.y.floor());
    let ts = tile_size as f64;
    let offset = |v: f64| (((v * ts).floor()) as u32).min(tile_size - 1);
    Location {
        x: x as i32,
        y: y as i32,
        pixel: (offset(point.x - x), offset(point.y - y)),
    }
}

/// Run the locate command.
pub fn run(config: &ConfigFile, args: LocateArgs) -> Result<(), CliError> {
    if !args.position.is_valid() {
        return Err(CliError::InvalidArgument(format!(
            "{} is outside ±90°/±180°",
            args.position
        )));
    }

    let source = TileSource::new(
        &config.tiles.url_template,
        config.tiles.tile_size,
        config.tiles.max_zoom,
    )?
    .with_overlay(config.tiles.overlay_template.as_deref())?;
    if args.zoom > source.max_zoom() {
        return Err(CliError::InvalidArgument(format!(
            "zoom {} exceeds the source maximum {}",
            args.zoom,
            source.max_zoom()
        )));
    }

    let location = locate(args.position, args.zoom, source.tile_size());
    let key = source.key(args.zoom, location.x, location.y);

    println!("Position: {}", args.position);
    println!("Tile:     {}/{}/{}", args.zoom, location.x, location.y);
    println!("Pixel:    {}, {}", location.pixel.0, location.pixel.1);
    println!("URL:      {}", source.base().url_for(args.zoom, location.x, location.y));
    if let Some(overlay) = source.overlay() {
        println!("Overlay:  {}", overlay.url_for(args.zoom, location.x, location.y));
    }

    if let Some(dir) = &config.fetch.store_dir {
        let path = DiskTileStore::new(dir).tile_path(&source.base_key(&key));
        let state = if path.exists() { "stored" } else { "not stored" };
        println!("Store:    {} ({})", path.display(), state);
    }

    Ok(())
}
