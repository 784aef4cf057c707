//! Coordinate types shared by the projection, viewport and overlay code.

use std::fmt;

/// Maximum latitude representable in Web Mercator, in degrees.
pub const MAX_LATITUDE: f64 = 85.051_128_78;

/// Minimum latitude representable in Web Mercator, in degrees.
pub const MIN_LATITUDE: f64 = -MAX_LATITUDE;

/// Highest zoom level the tile pyramid supports.
///
/// At zoom 30 the pyramid has 2^30 tiles per axis, which still fits the
/// `i32` tile indices used by [`crate::tile::TileKey`].
pub const MAX_SUPPORTED_ZOOM: u8 = 30;

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    /// Latitude in degrees, positive north.
    pub lat: f64,
    /// Longitude in degrees, positive east.
    pub lon: f64,
}

impl LatLon {
    /// Creates a new coordinate.
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Returns true if the coordinate lies within ±90° latitude and ±180°
    /// longitude.
    pub fn is_valid(&self) -> bool {
        super::is_valid_decimal(self.lat, self.lon)
    }
}

impl From<(f64, f64)> for LatLon {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.7} {:.7}", self.lat, self.lon)
    }
}

/// A fractional position in tile space at some zoom level.
///
/// The integer part of each axis is the tile index, the fractional part the
/// offset inside that tile.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TilePoint {
    /// Column axis, increasing eastward.
    pub x: f64,
    /// Row axis, increasing southward.
    pub y: f64,
}

impl TilePoint {
    /// Creates a new tile-space point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns this point translated by `(dx, dy)` tiles.
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Returns the midpoint between two points.
    pub fn midpoint(self, other: Self) -> Self {
        Self {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
        }
    }
}
