//! Render commands emitted for the host surface.

use crate::coord::TilePoint;
use crate::overlay::{OverlayId, OverlayStyle};
use crate::tile::{TileImage, TileKey};

/// One change the rendering surface must apply.
///
/// Tile positions are not carried in tile commands; the surface derives the
/// canvas position of tile `(x, y)` from the latest [`RenderCommand::SetOrigin`]:
/// `((x - upper_left.x) * tile_size, (y - upper_left.y) * tile_size)`.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    /// Remove every tile and overlay shape.
    Clear,
    /// The viewport moved; reposition every tile.
    SetOrigin {
        upper_left: TilePoint,
        tile_size: u32,
    },
    /// A new slot appeared.
    AddTile { key: TileKey, image: TileImage },
    /// A slot left the grid.
    RemoveTile { key: TileKey },
    /// A slot received a new image.
    UpdateTile { key: TileKey, image: TileImage },
    /// Create or replace an overlay shape. `points` are canvas pixels.
    DrawOverlay {
        id: OverlayId,
        style: OverlayStyle,
        points: Vec<(f64, f64)>,
    },
    /// An overlay shape was deleted.
    RemoveOverlay { id: OverlayId },
    /// Replace the in-progress selection outline. Empty `points` hide it.
    SelectionPreview { points: Vec<(f64, f64)>, closed: bool },
}

impl RenderCommand {
    /// Returns true for commands touching tiles rather than overlays.
    pub fn is_tile_command(&self) -> bool {
        matches!(
            self,
            RenderCommand::AddTile { .. }
                | RenderCommand::RemoveTile { .. }
                | RenderCommand::UpdateTile { .. }
        )
    }
}
