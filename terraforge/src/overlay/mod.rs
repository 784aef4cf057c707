//! Vector overlays drawn on top of the tiles.
//!
//! Shapes are stored in decimal degrees and projected to canvas pixels on
//! every [`OverlayLayer::redraw`], which the widget calls after each
//! viewport change. Redraw order is markers, then paths, then polygons;
//! vertices outside ±90° latitude or ±180° longitude are left out.

mod style;

pub use style::{
    MarkerStyle, OverlayId, OverlayKind, OverlayStyle, PathStyle, PolygonStyle,
    DEFAULT_LINE_COLOR, DEFAULT_LINE_WIDTH, DEFAULT_MARKER_COLOR, DEFAULT_MARKER_RADIUS,
};

use std::collections::BTreeMap;

use tracing::debug;

use crate::coord::LatLon;
use crate::viewport::{RenderCommand, Viewport, ViewportState};

/// Maps decimal coordinates to canvas pixels.
pub trait CanvasProjection {
    /// Canvas pixel of `point`, or `None` if it cannot be drawn.
    fn project(&self, point: LatLon) -> Option<(f64, f64)>;
}

impl CanvasProjection for ViewportState {
    fn project(&self, point: LatLon) -> Option<(f64, f64)> {
        self.decimal_to_canvas(point.lat, point.lon)
    }
}

impl CanvasProjection for Viewport {
    fn project(&self, point: LatLon) -> Option<(f64, f64)> {
        self.decimal_to_canvas(point.lat, point.lon)
    }
}

/// Operations shared by every drawable overlay shape.
pub trait CanvasShape {
    /// Recomputes canvas positions and returns the command drawing them.
    fn recompute(&mut self, projection: &dyn CanvasProjection) -> RenderCommand;

    /// Returns the command removing the shape from the canvas.
    fn delete(&self) -> RenderCommand;
}

/// A marker, path or polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayObject {
    id: OverlayId,
    points: Vec<LatLon>,
    style: OverlayStyle,
    canvas_positions: Vec<(f64, f64)>,
}

impl OverlayObject {
    pub fn id(&self) -> OverlayId {
        self.id
    }

    pub fn kind(&self) -> OverlayKind {
        self.style.kind()
    }

    /// Vertices in decimal degrees. A marker has exactly one.
    pub fn points(&self) -> &[LatLon] {
        &self.points
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Canvas pixels from the latest redraw, without the vertices that
    /// could not be projected.
    pub fn canvas_positions(&self) -> &[(f64, f64)] {
        &self.canvas_positions
    }
}

impl CanvasShape for OverlayObject {
    fn recompute(&mut self, projection: &dyn CanvasProjection) -> RenderCommand {
        self.canvas_positions = self
            .points
            .iter()
            .filter_map(|point| projection.project(*point))
            .collect();

        RenderCommand::DrawOverlay {
            id: self.id,
            style: self.style.clone(),
            points: self.canvas_positions.clone(),
        }
    }

    fn delete(&self) -> RenderCommand {
        RenderCommand::RemoveOverlay { id: self.id }
    }
}

/// All overlay shapes of one widget.
#[derive(Debug, Default)]
pub struct OverlayLayer {
    next_id: u64,
    markers: BTreeMap<OverlayId, OverlayObject>,
    paths: BTreeMap<OverlayId, OverlayObject>,
    polygons: BTreeMap<OverlayId, OverlayObject>,
    removed: Vec<RenderCommand>,
}

impl OverlayLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a marker at `position`.
    pub fn add_marker(&mut self, position: LatLon, style: MarkerStyle) -> OverlayId {
        self.insert(vec![position], OverlayStyle::Marker(style))
    }

    /// Adds an open path through `points`.
    pub fn add_path(&mut self, points: Vec<LatLon>, style: PathStyle) -> OverlayId {
        self.insert(points, OverlayStyle::Path(style))
    }

    /// Adds a closed polygon with vertices `points`.
    pub fn add_polygon(&mut self, points: Vec<LatLon>, style: PolygonStyle) -> OverlayId {
        self.insert(points, OverlayStyle::Polygon(style))
    }

    /// Removes a shape. Returns false if no shape has that id.
    pub fn remove(&mut self, id: OverlayId) -> bool {
        let removed = self
            .markers
            .remove(&id)
            .or_else(|| self.paths.remove(&id))
            .or_else(|| self.polygons.remove(&id));

        match removed {
            Some(shape) => {
                self.removed.push(shape.delete());
                true
            }
            None => false,
        }
    }

    /// Removes all markers and returns how many there were.
    pub fn clear_markers(&mut self) -> usize {
        Self::drain(&mut self.markers, &mut self.removed)
    }

    /// Removes all paths and returns how many there were.
    pub fn clear_paths(&mut self) -> usize {
        Self::drain(&mut self.paths, &mut self.removed)
    }

    /// Removes all polygons and returns how many there were.
    pub fn clear_polygons(&mut self) -> usize {
        Self::drain(&mut self.polygons, &mut self.removed)
    }

    /// Looks up a shape by id.
    pub fn get(&self, id: OverlayId) -> Option<&OverlayObject> {
        self.markers
            .get(&id)
            .or_else(|| self.paths.get(&id))
            .or_else(|| self.polygons.get(&id))
    }

    /// All shapes in redraw order.
    pub fn iter(&self) -> impl Iterator<Item = &OverlayObject> {
        self.markers
            .values()
            .chain(self.paths.values())
            .chain(self.polygons.values())
    }

    pub fn len(&self) -> usize {
        self.markers.len() + self.paths.len() + self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recomputes every shape's canvas positions.
    ///
    /// Returns removal commands for shapes deleted since the last redraw,
    /// followed by one draw command per shape.
    pub fn redraw(&mut self, projection: &dyn CanvasProjection) -> Vec<RenderCommand> {
        let mut commands = std::mem::take(&mut self.removed);
        commands.reserve(self.len());

        for shapes in [&mut self.markers, &mut self.paths, &mut self.polygons] {
            commands.extend(shapes.values_mut().map(|shape| shape.recompute(projection)));
        }
        commands
    }

    fn insert(&mut self, points: Vec<LatLon>, style: OverlayStyle) -> OverlayId {
        self.next_id += 1;
        let id = OverlayId(self.next_id);
        let kind = style.kind();
        debug!(%id, %kind, vertices = points.len(), "Overlay added");

        let shape = OverlayObject {
            id,
            points,
            style,
            canvas_positions: Vec::new(),
        };
        match kind {
            OverlayKind::Marker => self.markers.insert(id, shape),
            OverlayKind::Path => self.paths.insert(id, shape),
            OverlayKind::Polygon => self.polygons.insert(id, shape),
        };
        id
    }

    fn drain(shapes: &mut BTreeMap<OverlayId, OverlayObject>, removed: &mut Vec<RenderCommand>) -> usize {
        let count = shapes.len();
        removed.extend(std::mem::take(shapes).into_values().map(|shape| shape.delete()));
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Projects `(lat, lon)` to `(lon, -lat)` and rejects out-of-range input.
    struct Flat;

    impl CanvasProjection for Flat {
        fn project(&self, point: LatLon) -> Option<(f64, f64)> {
            point.is_valid().then_some((point.lon, -point.lat))
        }
    }

    fn ids(commands: &[RenderCommand]) -> Vec<OverlayId> {
        commands
            .iter()
            .filter_map(|c| match c {
                RenderCommand::DrawOverlay { id, .. } => Some(*id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_redraw_order_markers_paths_polygons() {
        let mut layer = OverlayLayer::new();
        let polygon = layer.add_polygon(
            vec![LatLon::new(0.0, 0.0), LatLon::new(1.0, 0.0), LatLon::new(1.0, 1.0)],
            PolygonStyle::default(),
        );
        let path = layer.add_path(
            vec![LatLon::new(0.0, 0.0), LatLon::new(2.0, 2.0)],
            PathStyle::default(),
        );
        let marker = layer.add_marker(LatLon::new(5.0, 5.0), MarkerStyle::default());

        let commands = layer.redraw(&Flat);
        assert_eq!(ids(&commands), vec![marker, path, polygon]);
    }

    #[test]
    fn test_invalid_vertices_are_omitted() {
        let mut layer = OverlayLayer::new();
        let path = layer.add_path(
            vec![
                LatLon::new(10.0, 20.0),
                LatLon::new(95.0, 0.0),
                LatLon::new(-10.0, 181.0),
                LatLon::new(-5.0, 30.0),
            ],
            PathStyle::default(),
        );

        layer.redraw(&Flat);

        let shape = layer.get(path).unwrap();
        assert_eq!(shape.points().len(), 4);
        assert_eq!(shape.canvas_positions(), &[(20.0, -10.0), (30.0, 5.0)]);
    }

    #[test]
    fn test_marker_beyond_pole_is_not_drawn() {
        let state = ViewportState::new(512, 512, 256, 19, LatLon::new(0.0, 0.0), 3.0);
        let mut layer = OverlayLayer::new();
        let shown = layer.add_marker(LatLon::new(10.0, 10.0), MarkerStyle::default());
        let hidden = layer.add_marker(LatLon::new(95.0, 0.0), MarkerStyle::default());

        let commands = layer.redraw(&state);

        assert_eq!(layer.get(shown).unwrap().canvas_positions().len(), 1);
        assert!(layer.get(hidden).unwrap().canvas_positions().is_empty());
        let drawn = commands
            .iter()
            .find_map(|c| match c {
                RenderCommand::DrawOverlay { id, points, .. } if *id == hidden => Some(points),
                _ => None,
            })
            .unwrap();
        assert!(drawn.is_empty());
    }

    #[test]
    fn test_styles_carry_closedness() {
        let mut layer = OverlayLayer::new();
        layer.add_path(vec![LatLon::new(0.0, 0.0)], PathStyle::default());
        layer.add_polygon(vec![LatLon::new(0.0, 0.0)], PolygonStyle::default());

        let closed: Vec<bool> = layer
            .redraw(&Flat)
            .iter()
            .filter_map(|c| match c {
                RenderCommand::DrawOverlay { style, .. } => Some(style.is_closed()),
                _ => None,
            })
            .collect();
        assert_eq!(closed, vec![false, true]);
    }

    #[test]
    fn test_remove_emits_removal_once() {
        let mut layer = OverlayLayer::new();
        let marker = layer.add_marker(LatLon::new(1.0, 1.0), MarkerStyle::default());

        assert!(layer.remove(marker));
        assert!(!layer.remove(marker));
        assert!(layer.get(marker).is_none());

        let commands = layer.redraw(&Flat);
        assert_eq!(commands, vec![RenderCommand::RemoveOverlay { id: marker }]);
        assert!(layer.redraw(&Flat).is_empty());
    }

    #[test]
    fn test_clear_by_kind() {
        let mut layer = OverlayLayer::new();
        layer.add_marker(LatLon::new(1.0, 1.0), MarkerStyle::default());
        layer.add_marker(LatLon::new(2.0, 2.0), MarkerStyle::default().with_text("B"));
        let path = layer.add_path(vec![LatLon::new(0.0, 0.0)], PathStyle::default());

        assert_eq!(layer.clear_markers(), 2);
        assert_eq!(layer.clear_polygons(), 0);
        assert_eq!(layer.len(), 1);
        assert_eq!(layer.get(path).unwrap().kind(), OverlayKind::Path);

        let commands = layer.redraw(&Flat);
        let removals = commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::RemoveOverlay { .. }))
            .count();
        assert_eq!(removals, 2);
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let mut layer = OverlayLayer::new();
        let a = layer.add_marker(LatLon::new(0.0, 0.0), MarkerStyle::default());
        layer.remove(a);
        let b = layer.add_marker(LatLon::new(0.0, 0.0), MarkerStyle::default());
        assert!(b > a);
        assert_eq!(b.to_string(), format!("overlay#{}", b.get()));
    }
}
