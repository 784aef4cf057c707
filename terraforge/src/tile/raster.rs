//! Decoded tile rasters and placeholder sentinels.

use std::fmt;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{ImageResult, Rgba, RgbaImage};

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Fill color for a slot whose tile has not arrived yet.
pub const NOT_LOADED_COLOR: Rgba<u8> = Rgba([250, 250, 250, 255]);

/// Fill color for a slot whose tile could not be produced.
pub const UNAVAILABLE_COLOR: Rgba<u8> = Rgba([190, 190, 190, 255]);

/// An image assigned to a tile slot.
///
/// Loaded rasters are shared behind an `Arc`, so cloning a `TileImage` never
/// copies pixels.
#[derive(Clone, PartialEq)]
pub enum TileImage {
    /// A decoded `tile_size × tile_size` raster.
    Loaded(Arc<RgbaImage>),
    /// Placeholder shown while a fetch is pending.
    NotLoaded,
    /// Placeholder shown when the tile could not be fetched or decoded.
    Unavailable,
}

impl TileImage {
    /// Decodes encoded image bytes (PNG, JPEG, ...) into a tile raster,
    /// resizing it to `tile_size` if the source uses another size.
    pub fn decode(bytes: &[u8], tile_size: u32) -> ImageResult<Self> {
        let decoded = image::load_from_memory(bytes)?.into_rgba8();
        Ok(Self::from_rgba(fit_to_tile(decoded, tile_size)))
    }

    /// Wraps an already decoded raster.
    pub fn from_rgba(image: RgbaImage) -> Self {
        TileImage::Loaded(Arc::new(image))
    }

    /// Returns true for real rasters, false for placeholders.
    pub fn is_loaded(&self) -> bool {
        matches!(self, TileImage::Loaded(_))
    }

    /// Returns true for either placeholder variant.
    pub fn is_placeholder(&self) -> bool {
        !self.is_loaded()
    }

    /// Returns the raster, if loaded.
    pub fn raster(&self) -> Option<&Arc<RgbaImage>> {
        match self {
            TileImage::Loaded(raster) => Some(raster),
            _ => None,
        }
    }

    /// Returns a raster a host can draw for this image.
    ///
    /// Placeholders are rendered as a solid tile in their fill color.
    pub fn to_raster(&self, tile_size: u32) -> Arc<RgbaImage> {
        match self {
            TileImage::Loaded(raster) => Arc::clone(raster),
            TileImage::NotLoaded => Arc::new(RgbaImage::from_pixel(
                tile_size,
                tile_size,
                NOT_LOADED_COLOR,
            )),
            TileImage::Unavailable => Arc::new(RgbaImage::from_pixel(
                tile_size,
                tile_size,
                UNAVAILABLE_COLOR,
            )),
        }
    }
}

impl fmt::Debug for TileImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileImage::Loaded(raster) => {
                write!(f, "Loaded({}x{})", raster.width(), raster.height())
            }
            TileImage::NotLoaded => f.write_str("NotLoaded"),
            TileImage::Unavailable => f.write_str("Unavailable"),
        }
    }
}

/// Alpha-composites an encoded overlay tile on top of a base raster.
///
/// The overlay is scaled to the base raster's dimensions first.
pub fn composite_overlay(base: &RgbaImage, overlay_bytes: &[u8]) -> ImageResult<RgbaImage> {
    let overlay = image::load_from_memory(overlay_bytes)?.into_rgba8();
    let overlay = if overlay.dimensions() == base.dimensions() {
        overlay
    } else {
        imageops::resize(&overlay, base.width(), base.height(), FilterType::Triangle)
    };

    let mut composed = base.clone();
    imageops::overlay(&mut composed, &overlay, 0, 0);
    Ok(composed)
}

fn fit_to_tile(image: RgbaImage, tile_size: u32) -> RgbaImage {
    if image.width() == tile_size && image.height() == tile_size {
        image
    } else {
        imageops::resize(&image, tile_size, tile_size, FilterType::Triangle)
    }
}
