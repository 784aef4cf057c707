//! Viewport: the visible tile window and its maintenance.
//!
//! The viewport owns a continuous tile-space bounding box ([`ViewportState`])
//! and the live grid of [`TileSlot`]s covering it. Every operation mutates the
//! box, then brings the grid in line with it:
//!
//! - **Pan** patches the grid edge by edge, adding or dropping one row or
//!   column at a time. Work is proportional to the tiles entering or leaving.
//! - **Zoom** across an integer level clears the fetch queue and rebuilds the
//!   grid from the cache, queueing fetches for every miss.
//! - **Source changes** clear the cache and queue, then rebuild.
//!
//! Nothing here blocks. Fetched tiles arrive through [`Viewport::apply_results`],
//! which the host calls from its render loop, and every visible change is
//! recorded as a [`RenderCommand`] for the host to drain with
//! [`Viewport::take_commands`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use terraforge::cache::TileCache;
//! use terraforge::coord::LatLon;
//! use terraforge::fetch::FetchQueue;
//! use terraforge::source::{SourceHandle, TileSource};
//! use terraforge::viewport::{Viewport, ViewportBackend};
//!
//! let (_tx, results) = tokio::sync::mpsc::unbounded_channel();
//! let backend = ViewportBackend {
//!     cache: Arc::new(TileCache::default()),
//!     queue: Arc::new(FetchQueue::new()),
//!     source: Arc::new(SourceHandle::new(TileSource::default())),
//!     results,
//! };
//!
//! let mut viewport = Viewport::new(512, 512, LatLon::new(0.0, 0.0), 10.0, backend);
//! assert_eq!(viewport.slots().count(), 16);
//!
//! viewport.pan(256.0, 0.0);
//! assert_eq!(viewport.edges().unwrap().left, 511);
//! ```

mod commands;
mod grid;
mod state;

pub use commands::RenderCommand;
pub use grid::{Edge, TileSlot};
pub use state::{min_zoom_for, TileWindow, ViewportState};

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, trace};

use crate::cache::TileCache;
use crate::coord::{decimal_to_tile, LatLon};
use crate::fetch::{FetchOrigin, FetchQueue, FetchResult};
use crate::precache::PreCacheCenter;
use crate::source::{SourceError, SourceHandle, TileSource};
use crate::tile::{TileImage, TileKey};
use grid::TileGrid;

/// Extra tiles kept beyond each visible edge.
pub const WINDOW_SLACK: i32 = 1;

/// Errors returned by viewport operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewportError {
    /// The corners do not describe a box with `top_left` north-west of
    /// `bottom_right`.
    #[error("invalid bounding box: top-left {top_left:?} must be north-west of bottom-right {bottom_right:?}")]
    InvalidBoundingBox {
        top_left: LatLon,
        bottom_right: LatLon,
    },

    /// The new tile source could not be built.
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Shared state the viewport works against.
///
/// Built by the engine, which keeps the other ends: workers hold the cache,
/// queue and source handle, and own the sender side of `results`.
pub struct ViewportBackend {
    /// Decoded tile cache.
    pub cache: Arc<TileCache>,
    /// Fetch task queue.
    pub queue: Arc<FetchQueue>,
    /// Current tile source.
    pub source: Arc<SourceHandle>,
    /// Fetch results from the worker pool.
    pub results: UnboundedReceiver<FetchResult>,
}

/// The visible tile window of a map widget.
pub struct Viewport {
    state: ViewportState,
    grid: TileGrid,
    commands: Vec<RenderCommand>,
    cache: Arc<TileCache>,
    queue: Arc<FetchQueue>,
    source: Arc<SourceHandle>,
    results: UnboundedReceiver<FetchResult>,
}

impl Viewport {
    /// Creates a viewport of `width × height` pixels centered on `center`
    /// and fills its grid.
    ///
    /// Tile size and zoom bounds come from the backend's current source.
    pub fn new(width: u32, height: u32, center: LatLon, zoom: f64, backend: ViewportBackend) -> Self {
        let source = backend.source.current();
        let state = ViewportState::new(
            width,
            height,
            source.tile_size(),
            source.max_zoom(),
            center,
            zoom,
        );

        let mut viewport = Self {
            state,
            grid: TileGrid::default(),
            commands: Vec::new(),
            cache: backend.cache,
            queue: backend.queue,
            source: backend.source,
            results: backend.results,
        };
        viewport.rebuild();
        viewport
    }

    // ==================== Queries ====================

    /// Viewport geometry.
    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    /// Decimal coordinate at the center of the widget.
    pub fn position(&self) -> LatLon {
        self.state.center()
    }

    /// Current zoom, possibly fractional.
    pub fn zoom(&self) -> f64 {
        self.state.zoom()
    }

    /// Zoom level of the tiles on display.
    pub fn rounded_zoom(&self) -> u8 {
        self.state.rounded_zoom()
    }

    /// Widget size in pixels.
    pub fn size(&self) -> (u32, u32) {
        self.state.size()
    }

    /// Current tile source.
    pub fn source(&self) -> Arc<TileSource> {
        self.source.current()
    }

    /// Tile window held by the grid.
    pub fn edges(&self) -> Option<TileWindow> {
        self.grid.window()
    }

    /// All slots, column by column.
    pub fn slots(&self) -> impl Iterator<Item = &TileSlot> {
        self.grid.iter()
    }

    /// Slot at tile index `(x, y)`, if the grid holds it.
    pub fn slot(&self, x: i32, y: i32) -> Option<&TileSlot> {
        self.grid.get(x, y)
    }

    /// Returns true once no slot is waiting for a tile.
    pub fn is_settled(&self) -> bool {
        self.grid.iter().all(|slot| slot.image != TileImage::NotLoaded)
    }

    /// Canvas pixel of a slot's upper-left corner.
    pub fn slot_canvas_position(&self, slot: &TileSlot) -> (f64, f64) {
        self.state.tile_to_canvas(slot.key.x as f64, slot.key.y as f64)
    }

    /// Canvas pixel of a decimal coordinate, or `None` outside ±90°/±180°.
    pub fn decimal_to_canvas(&self, lat: f64, lon: f64) -> Option<(f64, f64)> {
        self.state.decimal_to_canvas(lat, lon)
    }

    /// Decimal coordinate under a canvas pixel.
    pub fn canvas_to_decimal(&self, px: f64, py: f64) -> LatLon {
        self.state.canvas_to_decimal(px, py)
    }

    /// Where pre-caching should be centered: the tile under the widget
    /// center, at the displayed zoom and source.
    pub fn precache_center(&self) -> PreCacheCenter {
        let center = self.state.center_tile();
        PreCacheCenter {
            x: center.x.round_ties_even() as i32,
            y: center.y.round_ties_even() as i32,
            zoom: self.state.rounded_zoom(),
            source: self.source.current().id().clone(),
        }
    }

    /// Drains the render commands recorded since the last call.
    pub fn take_commands(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.commands)
    }

    // ==================== Operations ====================

    /// Pans by a pixel delta. Positive `dx` moves the view east, positive
    /// `dy` south.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }
        let ts = self.state.tile_size() as f64;
        self.state.translate(dx / ts, dy / ts);
        self.state.correct_borders();
        self.update_window();
    }

    /// Sets the zoom, keeping the decimal coordinate under the relative
    /// widget position `(ax, ay)` fixed on screen.
    ///
    /// NaN zoom leaves the zoom unchanged; out-of-range zoom is clamped.
    pub fn set_zoom(&mut self, zoom: f64, ax: f64, ay: f64) {
        let ax = if ax.is_finite() { ax.clamp(0.0, 1.0) } else { 0.5 };
        let ay = if ay.is_finite() { ay.clamp(0.0, 1.0) } else { 0.5 };
        let (width, height) = self.state.size();

        let previous = self.state.rounded_zoom();
        let anchor = self
            .state
            .canvas_to_decimal(ax * width as f64, ay * height as f64);

        self.state.zoom = self.state.clamp_zoom(zoom);
        let rounded = self.state.rounded_zoom();
        let point = decimal_to_tile(anchor.lat, anchor.lon, rounded);
        self.state.place_anchor(point, ax, ay);
        self.state.correct_borders();

        if rounded != previous {
            debug!(from = previous, to = rounded, "Zoom level changed");
            self.rebuild();
        } else {
            self.update_window();
        }
    }

    /// Centers the widget on a decimal coordinate and rebuilds the grid.
    pub fn set_position(&mut self, lat: f64, lon: f64) {
        if !lat.is_finite() || !lon.is_finite() {
            return;
        }
        self.state.center_on(LatLon::new(lat, lon));
        self.rebuild();
    }

    /// Zooms and centers so that the box fits the widget.
    ///
    /// Picks the largest zoom at which both corners lie strictly inside the
    /// widget, scanning upward from the minimum zoom and stopping at the
    /// first level that does not fit. Returns the chosen zoom.
    pub fn fit_bounding_box(
        &mut self,
        top_left: LatLon,
        bottom_right: LatLon,
    ) -> Result<u8, ViewportError> {
        let valid = top_left.is_valid()
            && bottom_right.is_valid()
            && top_left.lat > bottom_right.lat
            && top_left.lon < bottom_right.lon;
        if !valid {
            return Err(ViewportError::InvalidBoundingBox {
                top_left,
                bottom_right,
            });
        }

        let middle = LatLon::new(
            (top_left.lat + bottom_right.lat) / 2.0,
            (top_left.lon + bottom_right.lon) / 2.0,
        );
        let (ex, ey) = self.state.extent();
        let (half_x, half_y) = (ex / 2.0, ey / 2.0);

        let mut best = self.state.min_zoom();
        for zoom in self.state.min_zoom()..=self.state.max_zoom() {
            let center = decimal_to_tile(middle.lat, middle.lon, zoom);
            let tl = decimal_to_tile(top_left.lat, top_left.lon, zoom);
            let br = decimal_to_tile(bottom_right.lat, bottom_right.lon, zoom);

            let fits = tl.x > center.x - half_x
                && tl.y > center.y - half_y
                && br.x < center.x + half_x
                && br.y < center.y + half_y;
            if !fits {
                break;
            }
            best = zoom;
        }

        self.set_zoom(best as f64, 0.5, 0.5);
        self.set_position(middle.lat, middle.lon);
        Ok(best)
    }

    /// Replaces the base tile source, keeping the overlay.
    pub fn set_tile_source(
        &mut self,
        template: &str,
        tile_size: u32,
        max_zoom: u8,
    ) -> Result<(), ViewportError> {
        let current = self.source.current();
        let overlay = current.overlay().map(|t| t.as_str().to_owned());
        let next = TileSource::new(template, tile_size, max_zoom)?.with_overlay(overlay.as_deref())?;
        self.install_source(next);
        Ok(())
    }

    /// Replaces or removes the overlay source.
    pub fn set_overlay_source(&mut self, template: Option<&str>) -> Result<(), ViewportError> {
        let next = self.source.current().with_overlay(template)?;
        self.install_source(next);
        Ok(())
    }

    /// Changes the widget size, keeping the center.
    pub fn resize(&mut self, width: u32, height: u32) {
        let center = self.state.center();
        self.state.width = width.max(1);
        self.state.height = height.max(1);
        self.refresh_zoom_bounds();
        self.state.center_on(center);
        self.rebuild();
    }

    /// Applies fetch results that arrived since the last call.
    ///
    /// Results for another zoom level or source, or for slots that have left
    /// the grid, are dropped. A loaded tile is never replaced by a
    /// placeholder. Returns the number of slots updated.
    pub fn apply_results(&mut self) -> usize {
        let zoom = self.state.rounded_zoom();
        let source = self.source.current();
        let mut applied = 0;

        while let Ok(result) = self.results.try_recv() {
            if result.key.zoom != zoom || &result.key.source != source.id() {
                trace!(tile = %result.key, "Dropping stale result");
                continue;
            }

            let Some(slot) = self.grid.get_mut(result.key.x, result.key.y) else {
                continue;
            };
            if slot.key != result.key || (slot.image.is_loaded() && !result.image.is_loaded()) {
                continue;
            }

            slot.image = result.image.clone();
            self.commands.push(RenderCommand::UpdateTile {
                key: result.key,
                image: result.image,
            });
            applied += 1;
        }

        applied
    }

    // ==================== Grid maintenance ====================

    fn install_source(&mut self, next: TileSource) {
        let center = self.state.center();
        let id = next.id().clone();
        let (tile_size, max_zoom) = (next.tile_size(), next.max_zoom());

        self.source.replace(next);
        self.cache.clear();
        self.grid.clear();

        self.state.tile_size = tile_size;
        self.state.max_zoom = max_zoom;
        self.refresh_zoom_bounds();
        self.state.center_on(center);
        self.rebuild();

        info!(source = %id, tile_size, max_zoom, "Tile source changed");
    }

    fn refresh_zoom_bounds(&mut self) {
        self.state.min_zoom = min_zoom_for(self.state.width, self.state.tile_size).min(self.state.max_zoom);
        self.state.zoom = self.state.clamp_zoom(self.state.zoom);
    }

    fn push_origin(&mut self) {
        self.commands.push(RenderCommand::SetOrigin {
            upper_left: self.state.upper_left(),
            tile_size: self.state.tile_size(),
        });
    }

    /// Drops every slot and queued fetch, then fills the target window.
    fn rebuild(&mut self) {
        let dropped = self.queue.clear();
        self.grid.clear();
        self.commands.push(RenderCommand::Clear);
        self.push_origin();

        if let Some(window) = self.state.target_window(WINDOW_SLACK) {
            let factory = SlotFactory::new(self);
            let commands = &mut self.commands;
            self.grid.fill(window, |x, y| factory.make(x, y, commands));
        }

        debug!(
            zoom = self.state.rounded_zoom(),
            slots = self.grid.len(),
            dropped_tasks = dropped,
            "Viewport rebuilt"
        );
    }

    /// Brings the grid edges in line with the target window.
    ///
    /// Edges are handled in the order top, left, bottom, right. Falls back
    /// to a rebuild when the grid and target share no tile.
    fn update_window(&mut self) {
        self.push_origin();

        let Some(target) = self.state.target_window(WINDOW_SLACK) else {
            return;
        };
        match self.grid.window() {
            Some(current) if current.intersects(&target) => {}
            _ => {
                self.rebuild();
                return;
            }
        }

        let factory = SlotFactory::new(self);
        let commands = &mut self.commands;
        for edge in [Edge::Top, Edge::Left, Edge::Bottom, Edge::Right] {
            while let Some(current) = self.grid.window() {
                let gap = outward_gap(edge, &current, &target);
                if gap > 0 {
                    self.grid.grow(edge, |x, y| factory.make(x, y, commands));
                } else if gap < 0 {
                    let removed = self.grid.shrink(edge);
                    if removed.is_empty() {
                        break;
                    }
                    commands.extend(
                        removed
                            .into_iter()
                            .map(|slot| RenderCommand::RemoveTile { key: slot.key }),
                    );
                } else {
                    break;
                }
            }
        }
    }
}

/// How many tiles `target` extends beyond `current` at `edge`. Negative when
/// the grid extends beyond the target.
fn outward_gap(edge: Edge, current: &TileWindow, target: &TileWindow) -> i32 {
    match edge {
        Edge::Top => current.top - target.top,
        Edge::Left => current.left - target.left,
        Edge::Bottom => target.bottom - current.bottom,
        Edge::Right => target.right - current.right,
    }
}

/// Builds new slots from the cache, queueing a visible fetch for each miss.
struct SlotFactory {
    cache: Arc<TileCache>,
    queue: Arc<FetchQueue>,
    source: Arc<TileSource>,
    zoom: u8,
}

impl SlotFactory {
    fn new(viewport: &Viewport) -> Self {
        Self {
            cache: Arc::clone(&viewport.cache),
            queue: Arc::clone(&viewport.queue),
            source: viewport.source.current(),
            zoom: viewport.state.rounded_zoom(),
        }
    }

    fn make(&self, x: i32, y: i32, commands: &mut Vec<RenderCommand>) -> TileSlot {
        let key: TileKey = self.source.key(self.zoom, x, y);
        let image = match self.cache.get(&key) {
            Some(image) => image,
            None => {
                self.queue.enqueue(key.clone(), FetchOrigin::Visible);
                TileImage::NotLoaded
            }
        };
        commands.push(RenderCommand::AddTile {
            key: key.clone(),
            image: image.clone(),
        });
        TileSlot { key, image }
    }
}

impl std::fmt::Debug for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewport")
            .field("state", &self.state)
            .field("window", &self.grid.window())
            .field("pending_commands", &self.commands.len())
            .finish()
    }
}
