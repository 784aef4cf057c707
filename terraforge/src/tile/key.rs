//! Tile identity types.

use std::fmt;
use std::sync::Arc;

use crate::coord::world_size;

/// Identifies the tile source a tile image was produced from.
///
/// Built from the base URL template plus the optional overlay template, so
/// two sources that would produce different pixels never share an id.
/// Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Arc<str>);

impl SourceId {
    /// Creates a source id from a base template and an optional overlay.
    pub fn new(base: &str, overlay: Option<&str>) -> Self {
        match overlay {
            Some(overlay) => Self(Arc::from(format!("{}|{}", base, overlay))),
            None => Self(Arc::from(base)),
        }
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Uniquely identifies one tile image in the slippy-map pyramid.
///
/// `x` increases eastward and `y` southward. Indices are signed so that
/// callers can form keys just outside the world (e.g. ring tiles near the
/// antimeridian) and filter them with [`TileKey::is_in_world`].
///
/// # Example
///
/// ```
/// use terraforge::tile::{SourceId, TileKey};
///
/// let source = SourceId::new("https://tile.example.com/{z}/{x}/{y}.png", None);
/// let key = TileKey::new(10, 512, 340, source);
/// assert!(key.is_in_world());
/// assert_eq!(key.position(), (512, 340));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Zoom level.
    pub zoom: u8,
    /// Tile column.
    pub x: i32,
    /// Tile row.
    pub y: i32,
    /// Source the tile belongs to.
    pub source: SourceId,
}

impl TileKey {
    /// Creates a new tile key.
    pub fn new(zoom: u8, x: i32, y: i32, source: SourceId) -> Self {
        Self { zoom, x, y, source }
    }

    /// Returns the `(x, y)` grid position of the tile.
    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    /// Returns true if the tile exists in the pyramid at its zoom level.
    pub fn is_in_world(&self) -> bool {
        let n = world_size(self.zoom);
        let inside = |v: i32| v >= 0 && (v as f64) < n;
        inside(self.x) && inside(self.y)
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}
