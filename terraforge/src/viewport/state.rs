//! Continuous viewport geometry.
//!
//! Corners are fractional positions in the tile space of the *rounded* zoom
//! level. Fractional zoom only matters for rounding; the window always spans
//! `width / tile_size` by `height / tile_size` tiles.

use crate::coord::{decimal_to_tile, is_valid_decimal, tile_to_decimal, world_size, LatLon, TilePoint};

/// Tolerance applied before flooring/ceiling corner positions, so float
/// drift from many small pans cannot shift the computed window.
pub(crate) const EDGE_EPSILON: f64 = 1e-9;

/// Inclusive integer tile window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileWindow {
    /// Leftmost column.
    pub left: i32,
    /// Topmost row.
    pub top: i32,
    /// Rightmost column (inclusive).
    pub right: i32,
    /// Bottom row (inclusive).
    pub bottom: i32,
}

impl TileWindow {
    /// Number of columns.
    pub fn columns(&self) -> usize {
        (self.right - self.left + 1).max(0) as usize
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        (self.bottom - self.top + 1).max(0) as usize
    }

    /// Returns true if the windows share at least one tile.
    pub fn intersects(&self, other: &TileWindow) -> bool {
        self.left <= other.right
            && other.left <= self.right
            && self.top <= other.bottom
            && other.top <= self.bottom
    }

    /// Returns true if the tile lies inside the window.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        (self.left..=self.right).contains(&x) && (self.top..=self.bottom).contains(&y)
    }
}

/// Minimum zoom at which the world is at least as wide as the widget.
pub fn min_zoom_for(width: u32, tile_size: u32) -> u8 {
    let tiles = (width as f64 / tile_size.max(1) as f64).ceil().max(1.0);
    tiles.log2().ceil().max(0.0) as u8
}

/// Viewport geometry and zoom bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportState {
    pub(crate) zoom: f64,
    pub(crate) upper_left: TilePoint,
    pub(crate) lower_right: TilePoint,
    pub(crate) tile_size: u32,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) min_zoom: u8,
    pub(crate) max_zoom: u8,
}

impl ViewportState {
    /// Creates a state centered on `center`.
    pub fn new(width: u32, height: u32, tile_size: u32, max_zoom: u8, center: LatLon, zoom: f64) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let tile_size = tile_size.max(1);
        let min_zoom = min_zoom_for(width, tile_size).min(max_zoom);
        let mut state = Self {
            zoom: min_zoom as f64,
            upper_left: TilePoint::new(0.0, 0.0),
            lower_right: TilePoint::new(0.0, 0.0),
            tile_size,
            width,
            height,
            min_zoom,
            max_zoom,
        };
        state.zoom = state.clamp_zoom(zoom);
        state.center_on(center);
        state
    }

    /// Current (possibly fractional) zoom.
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Zoom level of the tile pyramid currently displayed.
    ///
    /// Halfway zooms round to the even level, so 2.5 shows level 2.
    pub fn rounded_zoom(&self) -> u8 {
        self.zoom.round_ties_even().clamp(0.0, u8::MAX as f64) as u8
    }

    /// Upper-left corner in tile space.
    pub fn upper_left(&self) -> TilePoint {
        self.upper_left
    }

    /// Lower-right corner in tile space.
    pub fn lower_right(&self) -> TilePoint {
        self.lower_right
    }

    /// Tile edge length in pixels.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Widget size in pixels.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Lowest allowed zoom.
    pub fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    /// Highest allowed zoom.
    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    /// Window extent in tiles.
    pub(crate) fn extent(&self) -> (f64, f64) {
        let ts = self.tile_size as f64;
        (self.width as f64 / ts, self.height as f64 / ts)
    }

    pub(crate) fn clamp_zoom(&self, zoom: f64) -> f64 {
        if zoom.is_nan() {
            return self.zoom;
        }
        zoom.clamp(self.min_zoom as f64, self.max_zoom as f64)
    }

    /// Tile-space midpoint of the window.
    pub fn center_tile(&self) -> TilePoint {
        self.upper_left.midpoint(self.lower_right)
    }

    /// Decimal coordinate at the window midpoint.
    pub fn center(&self) -> LatLon {
        let mid = self.center_tile();
        tile_to_decimal(mid.x, mid.y, self.rounded_zoom())
    }

    /// Places the window so that `center` is at its midpoint, at the current
    /// rounded zoom. Applies border correction.
    pub(crate) fn center_on(&mut self, center: LatLon) {
        let point = decimal_to_tile(center.lat, center.lon, self.rounded_zoom());
        self.place_anchor(point, 0.5, 0.5);
        self.correct_borders();
    }

    /// Derives both corners so that tile-space `point` sits at the relative
    /// widget position `(ax, ay)`.
    pub(crate) fn place_anchor(&mut self, point: TilePoint, ax: f64, ay: f64) {
        let (ex, ey) = self.extent();
        self.upper_left = TilePoint::new(point.x - ax * ex, point.y - ay * ey);
        self.lower_right = TilePoint::new(point.x + (1.0 - ax) * ex, point.y + (1.0 - ay) * ey);
    }

    /// Translates both corners by a tile-space delta.
    pub(crate) fn translate(&mut self, dx: f64, dy: f64) {
        self.upper_left = self.upper_left.offset(dx, dy);
        self.lower_right = self.lower_right.offset(dx, dy);
    }

    /// Shifts both corners together so the window stays inside
    /// `[0, 2^zoom]` on both axes. Never rescales.
    pub(crate) fn correct_borders(&mut self) {
        let n = world_size(self.rounded_zoom());
        let shift = |lo: f64, hi: f64| {
            let mut diff = 0.0;
            if lo < 0.0 {
                diff -= lo;
            }
            if hi > n {
                diff -= hi - n;
            }
            diff
        };
        let dx = shift(self.upper_left.x, self.lower_right.x);
        let dy = shift(self.upper_left.y, self.lower_right.y);
        self.translate(dx, dy);
    }

    /// Tile-space position under a canvas pixel.
    pub fn canvas_to_tile(&self, px: f64, py: f64) -> TilePoint {
        TilePoint::new(
            self.upper_left.x + (self.lower_right.x - self.upper_left.x) * (px / self.width as f64),
            self.upper_left.y + (self.lower_right.y - self.upper_left.y) * (py / self.height as f64),
        )
    }

    /// Decimal coordinate under a canvas pixel.
    pub fn canvas_to_decimal(&self, px: f64, py: f64) -> LatLon {
        let tile = self.canvas_to_tile(px, py);
        tile_to_decimal(tile.x, tile.y, self.rounded_zoom())
    }

    /// Canvas pixel of a decimal coordinate, or `None` when the coordinate is
    /// outside ±90° latitude or ±180° longitude.
    pub fn decimal_to_canvas(&self, lat: f64, lon: f64) -> Option<(f64, f64)> {
        if !is_valid_decimal(lat, lon) {
            return None;
        }
        let tile = decimal_to_tile(lat, lon, self.rounded_zoom());
        Some(self.tile_to_canvas(tile.x, tile.y))
    }

    /// Canvas pixel of a tile-space position.
    pub fn tile_to_canvas(&self, x: f64, y: f64) -> (f64, f64) {
        let ts = self.tile_size as f64;
        ((x - self.upper_left.x) * ts, (y - self.upper_left.y) * ts)
    }

    /// Integer tiles the grid should hold: every tile the window touches,
    /// widened by `slack` tiles per side and clipped to the world.
    ///
    /// Returns `None` if the window lies entirely outside the world.
    pub fn target_window(&self, slack: i32) -> Option<TileWindow> {
        let last = world_size(self.rounded_zoom()) as i64 - 1;
        let clip = |v: f64| (v as i64).clamp(0, last) as i32;

        let left = (self.upper_left.x + EDGE_EPSILON).floor() - slack as f64;
        let top = (self.upper_left.y + EDGE_EPSILON).floor() - slack as f64;
        let right = (self.lower_right.x - EDGE_EPSILON).ceil() - 1.0 + slack as f64;
        let bottom = (self.lower_right.y - EDGE_EPSILON).ceil() - 1.0 + slack as f64;

        if right < 0.0 || bottom < 0.0 || left > last as f64 || top > last as f64 {
            return None;
        }

        Some(TileWindow {
            left: clip(left),
            top: clip(top),
            right: clip(right),
            bottom: clip(bottom),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(width: u32, height: u32, zoom: f64, lat: f64, lon: f64) -> ViewportState {
        ViewportState::new(width, height, 256, 19, LatLon::new(lat, lon), zoom)
    }

    #[test]
    fn test_min_zoom() {
        assert_eq!(min_zoom_for(512, 256), 1);
        assert_eq!(min_zoom_for(200, 256), 0);
        assert_eq!(min_zoom_for(300, 256), 1);
        assert_eq!(min_zoom_for(1024, 256), 2);
        assert_eq!(min_zoom_for(1100, 256), 3);
    }

    #[test]
    fn test_rounded_zoom_ties_to_even() {
        assert_eq!(state(512, 512, 2.5, 0.0, 0.0).rounded_zoom(), 2);
        assert_eq!(state(512, 512, 3.5, 0.0, 0.0).rounded_zoom(), 4);
        assert_eq!(state(512, 512, 3.49, 0.0, 0.0).rounded_zoom(), 3);
        assert_eq!(state(512, 512, 3.51, 0.0, 0.0).rounded_zoom(), 4);
    }

    #[test]
    fn test_corner_extent_matches_size() {
        let s = state(800, 600, 12.0, 52.5, 13.4);
        let ts = s.tile_size() as f64;
        assert!(((s.lower_right.x - s.upper_left.x) * ts - 800.0).abs() < 1e-9);
        assert!(((s.lower_right.y - s.upper_left.y) * ts - 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_center_at_null_island() {
        let s = state(512, 512, 10.0, 0.0, 0.0);
        assert!((s.upper_left.x - 511.0).abs() < 1e-9);
        assert!((s.upper_left.y - 511.0).abs() < 1e-9);
        let c = s.center();
        assert!(c.lat.abs() < 1e-9 && c.lon.abs() < 1e-9);
    }

    #[test]
    fn test_zoom_is_clamped() {
        let s = state(512, 512, 100.0, 0.0, 0.0);
        assert_eq!(s.zoom(), 19.0);
        let s = state(512, 512, -3.0, 0.0, 0.0);
        assert_eq!(s.zoom(), 1.0);
    }

    #[test]
    fn test_border_correction_shifts_without_rescaling() {
        let mut s = state(512, 512, 3.0, 0.0, 0.0);
        s.translate(-10.0, 20.0);
        s.correct_borders();

        assert!((s.upper_left.x - 0.0).abs() < 1e-9);
        assert!((s.lower_right.y - 8.0).abs() < 1e-9);
        assert!((s.lower_right.x - s.upper_left.x - 2.0).abs() < 1e-9);
        assert!((s.lower_right.y - s.upper_left.y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_target_window_with_slack() {
        let s = state(512, 512, 10.0, 0.0, 0.0);
        let w = s.target_window(1).unwrap();
        assert_eq!(
            w,
            TileWindow {
                left: 510,
                top: 510,
                right: 513,
                bottom: 513
            }
        );
        assert_eq!((w.columns(), w.rows()), (4, 4));
    }

    #[test]
    fn test_target_window_clipped_to_world() {
        let s = state(512, 512, 1.0, 0.0, 0.0);
        let w = s.target_window(1).unwrap();
        assert_eq!((w.left, w.top, w.right, w.bottom), (0, 0, 1, 1));
    }

    #[test]
    fn test_target_window_tolerates_drift() {
        let mut s = state(512, 512, 10.0, 0.0, 0.0);
        let before = s.target_window(1);
        for _ in 0..7 {
            s.translate(0.1, -0.3);
        }
        for _ in 0..7 {
            s.translate(-0.1, 0.3);
        }
        assert_eq!(s.target_window(1), before);
    }

    #[test]
    fn test_canvas_roundtrip() {
        let s = state(640, 480, 8.0, 48.1, 11.6);
        let (px, py) = s.decimal_to_canvas(48.1, 11.6).unwrap();
        assert!((px - 320.0).abs() < 1e-6);
        assert!((py - 240.0).abs() < 1e-6);

        let back = s.canvas_to_decimal(px, py);
        assert!((back.lat - 48.1).abs() < 1e-9);
        assert!((back.lon - 11.6).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_decimal_has_no_canvas_position() {
        let s = state(512, 512, 5.0, 0.0, 0.0);
        assert!(s.decimal_to_canvas(95.0, 0.0).is_none());
        assert!(s.decimal_to_canvas(0.0, -181.0).is_none());
    }
}
