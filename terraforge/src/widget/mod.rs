//! The map widget facade.
//!
//! [`MapWidget`] ties a [`Viewport`], an [`OverlayLayer`] and a
//! [`TileEngine`] together and translates pointer input into viewport
//! operations. It does not draw anything itself: hosts feed it input, call
//! [`MapWidget::tick`] once per frame and apply the returned
//! [`RenderCommand`]s to their canvas.
//!
//! # Example
//!
//! ```ignore
//! use terraforge::widget::{MapConfig, MapWidget};
//!
//! let mut map = MapWidget::new(MapConfig::default())?;
//! map.set_position(52.52, 13.40, None);
//! loop {
//!     for command in map.tick() {
//!         canvas.apply(command);
//!     }
//!     map.tick_inertia(frame_seconds);
//! }
//! ```

mod config;
mod input;

pub use config::MapConfig;
pub use input::{
    Inertia, InteractionMode, MapEvent, ASSUMED_FRAME_RATE, INERTIA_DECAY, MIN_INERTIA_SPEED,
    POLYGON_CLOSE_RADIUS_PX, SCROLL_ZOOM_FACTOR,
};

use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::coord::LatLon;
use crate::engine::{EngineError, EngineStats, TileEngine};
use crate::overlay::{MarkerStyle, OverlayId, OverlayLayer, PathStyle, PolygonStyle};
use crate::viewport::{RenderCommand, Viewport, ViewportError};
use input::{rectangle, PointerState, Selection};

type ClickCallback = Box<dyn FnMut(LatLon) + Send>;
type AreaCallback = Box<dyn FnMut(LatLon, LatLon) + Send>;
type PolygonCallback = Box<dyn FnMut(&[LatLon]) + Send>;

/// Interactive slippy map.
pub struct MapWidget {
    viewport: Viewport,
    overlays: OverlayLayer,
    mode: InteractionMode,
    pointer: PointerState,
    selection: Selection,
    inertia: Inertia,
    commands: Vec<RenderCommand>,
    on_click: Option<ClickCallback>,
    on_area_selected: Option<AreaCallback>,
    on_polygon_selected: Option<PolygonCallback>,
    engine: TileEngine,
}

impl MapWidget {
    /// Creates a widget whose engine owns its own runtime.
    pub fn new(config: MapConfig) -> Result<Self, EngineError> {
        let engine = TileEngine::start(config.engine.clone())?;
        Self::with_engine(&config, engine)
    }

    /// Creates a widget whose engine spawns onto the caller's runtime.
    pub fn with_handle(config: MapConfig, handle: Handle) -> Result<Self, EngineError> {
        let engine = TileEngine::with_handle(config.engine.clone(), handle)?;
        Self::with_engine(&config, engine)
    }

    /// Creates a widget on an already started engine.
    ///
    /// The engine's tile source settings take precedence over
    /// `config.engine`.
    pub fn with_engine(config: &MapConfig, mut engine: TileEngine) -> Result<Self, EngineError> {
        let backend = engine.take_backend().ok_or(EngineError::BackendTaken)?;
        let viewport = Viewport::new(
            config.width,
            config.height,
            config.center,
            config.initial_zoom,
            backend,
        );

        info!(
            width = config.width,
            height = config.height,
            zoom = config.initial_zoom,
            lat = config.center.lat,
            lon = config.center.lon,
            "Map widget created"
        );

        let mut widget = Self {
            viewport,
            overlays: OverlayLayer::new(),
            mode: InteractionMode::Navigate,
            pointer: PointerState::default(),
            selection: Selection::None,
            inertia: Inertia::default(),
            commands: Vec::new(),
            on_click: None,
            on_area_selected: None,
            on_polygon_selected: None,
            engine,
        };
        widget.sync();
        Ok(widget)
    }

    // ==================== Frame loop ====================

    /// Applies arrived tiles and returns every pending render command.
    pub fn tick(&mut self) -> Vec<RenderCommand> {
        self.viewport.apply_results();
        self.take_commands()
    }

    /// Returns pending render commands without applying fetch results.
    pub fn take_commands(&mut self) -> Vec<RenderCommand> {
        self.commands.extend(self.viewport.take_commands());
        std::mem::take(&mut self.commands)
    }

    /// Advances drag inertia by `dt` seconds. Returns whether the map is
    /// still coasting.
    pub fn tick_inertia(&mut self, dt: f64) -> bool {
        if let Some((dx, dy)) = self.inertia.step(dt) {
            self.viewport.pan(-dx, -dy);
            self.sync();
        }
        self.inertia.is_active()
    }

    /// Starts coasting with a velocity in pixels per second, in pointer
    /// direction.
    pub fn fling(&mut self, vx: f64, vy: f64) {
        self.inertia.fling(vx, vy);
    }

    pub fn is_coasting(&self) -> bool {
        self.inertia.is_active()
    }

    // ==================== Pointer input ====================

    /// Primary button pressed at a canvas position.
    pub fn pointer_pressed(&mut self, x: f64, y: f64) -> Option<MapEvent> {
        self.inertia.stop();
        self.pointer.press(x, y);

        match self.mode {
            InteractionMode::Navigate => {}
            InteractionMode::AreaSelect => {
                self.selection = Selection::Area { start: (x, y) };
            }
            InteractionMode::PolygonSelect => {
                let point = self.viewport.canvas_to_decimal(x, y);
                let closes = match &self.selection {
                    Selection::Polygon { vertices, .. } if vertices.len() >= 3 => self
                        .viewport
                        .decimal_to_canvas(vertices[0].lat, vertices[0].lon)
                        .is_some_and(|first| {
                            (first.0 - x).hypot(first.1 - y) <= POLYGON_CLOSE_RADIUS_PX
                        }),
                    _ => false,
                };

                match &mut self.selection {
                    Selection::Polygon { vertices, closing } => {
                        if closes {
                            *closing = true;
                        } else {
                            vertices.push(point);
                        }
                    }
                    selection => {
                        *selection = Selection::Polygon {
                            vertices: vec![point],
                            closing: false,
                        };
                    }
                }
                self.preview_polygon((x, y));
            }
        }
        None
    }

    /// Pointer moved to a canvas position.
    pub fn pointer_moved(&mut self, x: f64, y: f64) -> Option<MapEvent> {
        let (dx, dy) = self.pointer.move_to(x, y);

        match self.mode {
            InteractionMode::Navigate => {
                if self.pointer.is_pressed() {
                    self.inertia.track(dx, dy);
                    self.viewport.pan(-dx, -dy);
                    self.sync();
                }
            }
            InteractionMode::AreaSelect => {
                if let Selection::Area { start } = self.selection {
                    if self.pointer.is_pressed() {
                        self.commands.push(RenderCommand::SelectionPreview {
                            points: rectangle(start, (x, y)),
                            closed: true,
                        });
                    }
                }
            }
            InteractionMode::PolygonSelect => {
                if matches!(self.selection, Selection::Polygon { .. }) {
                    self.preview_polygon((x, y));
                }
            }
        }
        None
    }

    /// Primary button released at a canvas position.
    pub fn pointer_released(&mut self, x: f64, y: f64) -> Option<MapEvent> {
        let pressed_at = self.pointer.release()?;
        self.pointer.last = (x, y);

        match self.mode {
            InteractionMode::Navigate => {
                if pressed_at == (x, y) {
                    self.inertia.stop();
                    let position = self.viewport.canvas_to_decimal(x, y);
                    debug!(lat = position.lat, lon = position.lon, "Map clicked");
                    if let Some(callback) = self.on_click.as_mut() {
                        callback(position);
                    }
                    return Some(MapEvent::Click {
                        position,
                        canvas: (x, y),
                    });
                }
                self.inertia.release();
                None
            }
            InteractionMode::AreaSelect => {
                let Selection::Area { start } = std::mem::take(&mut self.selection) else {
                    return None;
                };
                self.clear_preview();
                self.mode = InteractionMode::Navigate;

                let corners = rectangle(start, (x, y));
                let top_left = self.viewport.canvas_to_decimal(corners[0].0, corners[0].1);
                let bottom_right = self.viewport.canvas_to_decimal(corners[2].0, corners[2].1);
                info!(
                    top_left = %top_left,
                    bottom_right = %bottom_right,
                    "Area selected"
                );
                if let Some(callback) = self.on_area_selected.as_mut() {
                    callback(top_left, bottom_right);
                }
                Some(MapEvent::AreaSelected {
                    top_left,
                    bottom_right,
                })
            }
            InteractionMode::PolygonSelect => match &self.selection {
                Selection::Polygon { closing: true, .. } => self.finish_polygon(),
                _ => None,
            },
        }
    }

    /// Wheel scrolled at a canvas position. One notch is usually 120 units.
    pub fn scroll(&mut self, x: f64, y: f64, delta: f64) {
        let (width, height) = self.viewport.size();
        let zoom = self.viewport.zoom() + delta * SCROLL_ZOOM_FACTOR;
        self.viewport
            .set_zoom(zoom, x / width as f64, y / height as f64);
        self.sync();
    }

    /// Zooms in one level around the center.
    pub fn zoom_in(&mut self) {
        self.set_zoom(self.viewport.zoom() + 1.0, 0.5, 0.5);
    }

    /// Zooms out one level around the center.
    pub fn zoom_out(&mut self) {
        self.set_zoom(self.viewport.zoom() - 1.0, 0.5, 0.5);
    }

    // ==================== Selection ====================

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    /// Switches interaction mode, discarding any selection in progress.
    pub fn set_mode(&mut self, mode: InteractionMode) {
        if self.selection != Selection::None {
            self.clear_preview();
        }
        self.selection = Selection::None;
        self.mode = mode;
    }

    /// Finishes the polygon being drawn.
    ///
    /// Returns `None` (and keeps collecting) with fewer than three vertices.
    pub fn finish_polygon(&mut self) -> Option<MapEvent> {
        match &self.selection {
            Selection::Polygon { vertices, .. } if vertices.len() >= 3 => {}
            _ => return None,
        }
        let Selection::Polygon { vertices, .. } = std::mem::take(&mut self.selection) else {
            return None;
        };
        self.clear_preview();
        self.mode = InteractionMode::Navigate;

        info!(vertices = vertices.len(), "Polygon selected");
        if let Some(callback) = self.on_polygon_selected.as_mut() {
            callback(&vertices);
        }
        Some(MapEvent::PolygonSelected { vertices })
    }

    /// Abandons the selection in progress and returns to navigation.
    pub fn cancel_selection(&mut self) {
        self.set_mode(InteractionMode::Navigate);
    }

    pub fn on_click(&mut self, callback: impl FnMut(LatLon) + Send + 'static) {
        self.on_click = Some(Box::new(callback));
    }

    pub fn on_area_selected(&mut self, callback: impl FnMut(LatLon, LatLon) + Send + 'static) {
        self.on_area_selected = Some(Box::new(callback));
    }

    pub fn on_polygon_selected(&mut self, callback: impl FnMut(&[LatLon]) + Send + 'static) {
        self.on_polygon_selected = Some(Box::new(callback));
    }

    // ==================== View ====================

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn overlays(&self) -> &OverlayLayer {
        &self.overlays
    }

    pub fn engine(&self) -> &TileEngine {
        &self.engine
    }

    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }

    pub fn position(&self) -> LatLon {
        self.viewport.position()
    }

    pub fn zoom(&self) -> f64 {
        self.viewport.zoom()
    }

    /// Pans by a pixel delta. Positive `dx` moves the view east.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.viewport.pan(dx, dy);
        self.sync();
    }

    /// Sets the zoom anchored at the relative widget position `(ax, ay)`.
    pub fn set_zoom(&mut self, zoom: f64, ax: f64, ay: f64) {
        self.viewport.set_zoom(zoom, ax, ay);
        self.sync();
    }

    /// Centers on a coordinate, optionally dropping a marker there.
    pub fn set_position(&mut self, lat: f64, lon: f64, marker: Option<MarkerStyle>) -> Option<OverlayId> {
        self.viewport.set_position(lat, lon);
        let id = marker.map(|style| self.overlays.add_marker(LatLon::new(lat, lon), style));
        self.sync();
        id
    }

    /// Zooms and centers on a bounding box. Returns the chosen zoom.
    pub fn fit_bounding_box(
        &mut self,
        top_left: LatLon,
        bottom_right: LatLon,
    ) -> Result<u8, ViewportError> {
        let zoom = self.viewport.fit_bounding_box(top_left, bottom_right)?;
        self.sync();
        Ok(zoom)
    }

    pub fn set_tile_source(
        &mut self,
        template: &str,
        tile_size: u32,
        max_zoom: u8,
    ) -> Result<(), ViewportError> {
        self.viewport.set_tile_source(template, tile_size, max_zoom)?;
        self.sync();
        Ok(())
    }

    pub fn set_overlay_source(&mut self, template: Option<&str>) -> Result<(), ViewportError> {
        self.viewport.set_overlay_source(template)?;
        self.sync();
        Ok(())
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport.resize(width, height);
        self.sync();
    }

    /// Canvas pixel of a coordinate, if it is valid.
    pub fn decimal_to_canvas(&self, lat: f64, lon: f64) -> Option<(f64, f64)> {
        self.viewport.decimal_to_canvas(lat, lon)
    }

    pub fn canvas_to_decimal(&self, x: f64, y: f64) -> LatLon {
        self.viewport.canvas_to_decimal(x, y)
    }

    // ==================== Overlays ====================

    pub fn add_marker(&mut self, position: LatLon, style: MarkerStyle) -> OverlayId {
        let id = self.overlays.add_marker(position, style);
        self.sync();
        id
    }

    pub fn add_path(&mut self, points: Vec<LatLon>, style: PathStyle) -> OverlayId {
        let id = self.overlays.add_path(points, style);
        self.sync();
        id
    }

    pub fn add_polygon(&mut self, points: Vec<LatLon>, style: PolygonStyle) -> OverlayId {
        let id = self.overlays.add_polygon(points, style);
        self.sync();
        id
    }

    pub fn remove_overlay(&mut self, id: OverlayId) -> bool {
        let removed = self.overlays.remove(id);
        self.sync();
        removed
    }

    pub fn clear_markers(&mut self) -> usize {
        let count = self.overlays.clear_markers();
        self.sync();
        count
    }

    pub fn clear_paths(&mut self) -> usize {
        let count = self.overlays.clear_paths();
        self.sync();
        count
    }

    pub fn clear_polygons(&mut self) -> usize {
        let count = self.overlays.clear_polygons();
        self.sync();
        count
    }

    /// Stops the engine, waiting for workers if it owns its runtime.
    pub fn shutdown(self) {
        self.engine.shutdown();
    }

    // ==================== Internals ====================

    /// Collects viewport commands, redraws overlays and moves the
    /// pre-cache center.
    fn sync(&mut self) {
        self.commands.extend(self.viewport.take_commands());
        self.commands.extend(self.overlays.redraw(&self.viewport));
        self.engine
            .set_precache_center(self.viewport.precache_center());
    }

    fn preview_polygon(&mut self, pointer: (f64, f64)) {
        let Selection::Polygon { vertices, .. } = &self.selection else {
            return;
        };
        let mut points: Vec<(f64, f64)> = vertices
            .iter()
            .filter_map(|v| self.viewport.decimal_to_canvas(v.lat, v.lon))
            .collect();
        points.push(pointer);
        self.commands.push(RenderCommand::SelectionPreview {
            points,
            closed: false,
        });
    }

    fn clear_preview(&mut self) {
        self.commands.push(RenderCommand::SelectionPreview {
            points: Vec::new(),
            closed: false,
        });
    }
}

impl std::fmt::Debug for MapWidget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapWidget")
            .field("viewport", &self.viewport)
            .field("overlays", &self.overlays.len())
            .field("mode", &self.mode)
            .field("coasting", &self.inertia.is_active())
            .field("engine", &self.engine)
            .finish()
    }
}
