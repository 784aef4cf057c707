//! Offscreen rendering surface for render commands.
//!
//! Keeps the tile and overlay state a GUI canvas would hold and rasterizes
//! it on demand: tiles are blitted with `image`, vector overlays are drawn
//! with `tiny-skia`. Marker labels are not rasterized.

use std::collections::HashMap;

use image::{imageops, Rgba, RgbaImage};
use tiny_skia::{
    ColorU8, FillRule, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap, Stroke, Transform,
};

use terraforge::coord::TilePoint;
use terraforge::overlay::{OverlayId, OverlayStyle};
use terraforge::tile::{TileImage, TileKey, DEFAULT_TILE_SIZE};
use terraforge::viewport::RenderCommand;

/// Canvas color where no tile is drawn.
pub const BACKGROUND: Rgba<u8> = Rgba([230, 230, 230, 255]);

/// Outline color of selection previews.
pub const SELECTION_COLOR: Rgba<u8> = Rgba([30, 120, 255, 255]);

const MARKER_OUTLINE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const SELECTION_WIDTH: f32 = 2.0;

/// An overlay shape as last drawn.
#[derive(Debug, Clone)]
struct Shape {
    id: OverlayId,
    style: OverlayStyle,
    points: Vec<(f64, f64)>,
}

/// Applies [`RenderCommand`]s and renders the result to an image.
#[derive(Debug)]
pub struct Surface {
    width: u32,
    height: u32,
    upper_left: TilePoint,
    tile_size: u32,
    tiles: HashMap<TileKey, TileImage>,
    shapes: Vec<Shape>,
    selection: Option<(Vec<(f64, f64)>, bool)>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            upper_left: TilePoint::default(),
            tile_size: DEFAULT_TILE_SIZE,
            tiles: HashMap::new(),
            shapes: Vec::new(),
            selection: None,
        }
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn apply_all(&mut self, commands: impl IntoIterator<Item = RenderCommand>) {
        for command in commands {
            self.apply(command);
        }
    }

    pub fn apply(&mut self, command: RenderCommand) {
        match command {
            RenderCommand::Clear => {
                self.tiles.clear();
                self.shapes.clear();
                self.selection = None;
            }
            RenderCommand::SetOrigin {
                upper_left,
                tile_size,
            } => {
                self.upper_left = upper_left;
                self.tile_size = tile_size;
            }
            RenderCommand::AddTile { key, image } | RenderCommand::UpdateTile { key, image } => {
                self.tiles.insert(key, image);
            }
            RenderCommand::RemoveTile { key } => {
                self.tiles.remove(&key);
            }
            RenderCommand::DrawOverlay { id, style, points } => {
                let shape = Shape { id, style, points };
                match self.shapes.iter_mut().find(|s| s.id == id) {
                    Some(existing) => *existing = shape,
                    None => self.shapes.push(shape),
                }
            }
            RenderCommand::RemoveOverlay { id } => {
                self.shapes.retain(|s| s.id != id);
            }
            RenderCommand::SelectionPreview { points, closed } => {
                self.selection = (!points.is_empty()).then_some((points, closed));
            }
        }
    }

    /// Rasterizes tiles, then overlays in draw order, then the selection.
    pub fn render(&self) -> Option<RgbaImage> {
        let mut canvas = RgbaImage::from_pixel(self.width, self.height, BACKGROUND);
        let ts = self.tile_size as f64;
        for (key, image) in &self.tiles {
            let raster = image.to_raster(self.tile_size);
            let x = ((key.x as f64 - self.upper_left.x) * ts).round() as i64;
            let y = ((key.y as f64 - self.upper_left.y) * ts).round() as i64;
            imageops::overlay(&mut canvas, raster.as_ref(), x, y);
        }

        let mut pixmap = to_pixmap(&canvas)?;
        for shape in &self.shapes {
            draw_shape(&mut pixmap, &shape.style, &shape.points);
        }
        if let Some((points, closed)) = &self.selection {
            if let Some(path) = polyline(points, *closed) {
                pixmap.stroke_path(
                    &path,
                    &paint(SELECTION_COLOR),
                    &stroke(SELECTION_WIDTH),
                    Transform::identity(),
                    None,
                );
            }
        }

        Some(from_pixmap(&pixmap))
    }
}

fn draw_shape(pixmap: &mut Pixmap, style: &OverlayStyle, points: &[(f64, f64)]) {
    match style {
        OverlayStyle::Marker(marker) => {
            for &(x, y) in points {
                let Some(circle) = PathBuilder::from_circle(x as f32, y as f32, marker.radius) else {
                    continue;
                };
                pixmap.fill_path(
                    &circle,
                    &paint(marker.color),
                    FillRule::Winding,
                    Transform::identity(),
                    None,
                );
                pixmap.stroke_path(
                    &circle,
                    &paint(MARKER_OUTLINE),
                    &stroke(1.5),
                    Transform::identity(),
                    None,
                );
            }
        }
        OverlayStyle::Path(path_style) => {
            if let Some(path) = polyline(points, false) {
                pixmap.stroke_path(
                    &path,
                    &paint(path_style.color),
                    &stroke(path_style.width),
                    Transform::identity(),
                    None,
                );
            }
        }
        OverlayStyle::Polygon(polygon) => {
            let Some(path) = polyline(points, true) else {
                return;
            };
            if let Some(fill) = polygon.fill {
                pixmap.fill_path(
                    &path,
                    &paint(fill),
                    FillRule::EvenOdd,
                    Transform::identity(),
                    None,
                );
            }
            pixmap.stroke_path(
                &path,
                &paint(polygon.outline),
                &stroke(polygon.width),
                Transform::identity(),
                None,
            );
        }
    }
}

fn polyline(points: &[(f64, f64)], closed: bool) -> Option<Path> {
    let (first, rest) = points.split_first()?;
    let mut builder = PathBuilder::new();
    builder.move_to(first.0 as f32, first.1 as f32);
    for &(x, y) in rest {
        builder.line_to(x as f32, y as f32);
    }
    if closed {
        builder.close();
    }
    builder.finish()
}

fn paint(color: Rgba<u8>) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = true;
    paint
}

fn stroke(width: f32) -> Stroke {
    Stroke {
        width,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    }
}

fn to_pixmap(image: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(image.width(), image.height())?;
    for (pixel, target) in image.pixels().zip(pixmap.pixels_mut()) {
        let [r, g, b, a] = pixel.0;
        *target = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Some(pixmap)
}

fn from_pixmap(pixmap: &Pixmap) -> RgbaImage {
    let mut image = RgbaImage::new(pixmap.width(), pixmap.height());
    for (target, pixel) in image.pixels_mut().zip(pixmap.pixels()) {
        let color = pixel.demultiply();
        *target = Rgba([color.red(), color.green(), color.blue(), color.alpha()]);
    }
    image
}
