//! Coordinate conversion module
//!
//! Provides conversions between geographic coordinates (latitude/longitude)
//! and fractional Web Mercator tile space. All functions are pure.

mod types;

pub use types::{LatLon, TilePoint, MAX_LATITUDE, MAX_SUPPORTED_ZOOM, MIN_LATITUDE};

use std::f64::consts::PI;

/// Number of tiles along one axis at the given zoom level.
#[inline]
pub fn world_size(zoom: u8) -> f64 {
    2.0_f64.powi(zoom as i32)
}

/// Returns true if the coordinate lies within ±90° latitude and ±180°
/// longitude.
///
/// Latitudes beyond the Mercator limit are still considered valid here; the
/// projection clamps them to [`MAX_LATITUDE`].
#[inline]
pub fn is_valid_decimal(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// Converts decimal degrees to a fractional tile-space position.
///
/// Latitude is clamped to ±[`MAX_LATITUDE`] so the result is always finite.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees
/// * `lon` - Longitude in degrees
/// * `zoom` - Zoom level
#[inline]
pub fn decimal_to_tile(lat: f64, lon: f64, zoom: u8) -> TilePoint {
    let n = world_size(zoom);
    let lat = lat.clamp(MIN_LATITUDE, MAX_LATITUDE);

    let x = (lon + 180.0) / 360.0 * n;

    let lat_rad = lat.to_radians();
    let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n;

    TilePoint { x, y }
}

/// Converts a fractional tile-space position back to decimal degrees.
///
/// Inverse of [`decimal_to_tile`] for latitudes inside the Mercator limit.
#[inline]
pub fn tile_to_decimal(x: f64, y: f64, zoom: u8) -> LatLon {
    let n = world_size(zoom);

    let lon = x / n * 360.0 - 180.0;

    let lat_rad = (PI * (1.0 - 2.0 * y / n)).sinh().atan();
    let lat = lat_rad.to_degrees();

    LatLon { lat, lon }
}
