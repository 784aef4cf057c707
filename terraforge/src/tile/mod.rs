//! Tile identity and image types.
//!
//! A [`TileKey`] names one tile of one source; a [`TileImage`] is what a
//! slot displays for it, either a decoded raster or a placeholder.

mod key;
mod raster;

pub use key::{SourceId, TileKey};
pub use raster::{
    composite_overlay, TileImage, DEFAULT_TILE_SIZE, NOT_LOADED_COLOR, UNAVAILABLE_COLOR,
};

#[cfg(test)]
pub(crate) use raster::tests::png_bytes;
