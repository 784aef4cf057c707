//! Pointer interaction state: modes, events, selection and inertia.

use crate::coord::LatLon;

/// Zoom change per wheel delta unit (one notch is usually 120 units).
pub const SCROLL_ZOOM_FACTOR: f64 = 0.001;

/// Frame rate assumed when turning a drag step into a velocity.
pub const ASSUMED_FRAME_RATE: f64 = 60.0;

/// Exponent of the inertia decay: velocity is multiplied by
/// `2^(-INERTIA_DECAY * dt)` per step.
pub const INERTIA_DECAY: f64 = 9.0;

/// Inertia stops once both velocity components are at or below this, in
/// pixels per second.
pub const MIN_INERTIA_SPEED: f64 = 1.0;

/// A press this close to the first polygon vertex closes the polygon.
pub const POLYGON_CLOSE_RADIUS_PX: f64 = 8.0;

/// What a left-button drag does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionMode {
    /// Drag pans the map; a press-release in place is a click.
    #[default]
    Navigate,
    /// Drag spans a selection rectangle.
    AreaSelect,
    /// Each press adds a polygon vertex.
    PolygonSelect,
}

/// Something the user did on the map.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// Press and release at the same position.
    Click {
        position: LatLon,
        canvas: (f64, f64),
    },
    /// A finished rectangle selection.
    AreaSelected {
        top_left: LatLon,
        bottom_right: LatLon,
    },
    /// A finished polygon selection, vertices in drawing order.
    PolygonSelected { vertices: Vec<LatLon> },
}

/// Press tracking for the current gesture.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct PointerState {
    /// Where the button went down, while it is down.
    pub pressed_at: Option<(f64, f64)>,
    /// Latest pointer position.
    pub last: (f64, f64),
}

impl PointerState {
    pub fn press(&mut self, x: f64, y: f64) {
        self.pressed_at = Some((x, y));
        self.last = (x, y);
    }

    /// Records a move and returns the delta since the last position.
    pub fn move_to(&mut self, x: f64, y: f64) -> (f64, f64) {
        let delta = (x - self.last.0, y - self.last.1);
        self.last = (x, y);
        delta
    }

    /// Ends the gesture, returning the press position.
    pub fn release(&mut self) -> Option<(f64, f64)> {
        self.pressed_at.take()
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed_at.is_some()
    }
}

/// In-progress selection.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) enum Selection {
    #[default]
    None,
    /// Rectangle anchored at a canvas position.
    Area { start: (f64, f64) },
    /// Polygon vertices collected so far. `closing` is set by a press on
    /// the first vertex; the following release finishes the polygon.
    Polygon { vertices: Vec<LatLon>, closing: bool },
}

/// Canvas rectangle corners spanned by two points, clockwise from the
/// upper-left.
pub(crate) fn rectangle(a: (f64, f64), b: (f64, f64)) -> Vec<(f64, f64)> {
    let (left, right) = (a.0.min(b.0), a.0.max(b.0));
    let (top, bottom) = (a.1.min(b.1), a.1.max(b.1));
    vec![(left, top), (right, top), (right, bottom), (left, bottom)]
}

/// Drag momentum that keeps panning after release.
///
/// Velocity is in canvas pixels per second, in the direction the pointer
/// moved.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Inertia {
    velocity: (f64, f64),
    active: bool,
}

impl Inertia {
    /// Records one drag step.
    pub fn track(&mut self, dx: f64, dy: f64) {
        self.velocity = (dx * ASSUMED_FRAME_RATE, dy * ASSUMED_FRAME_RATE);
    }

    /// Starts coasting with the tracked velocity, if it is fast enough.
    pub fn release(&mut self) {
        self.active = self.is_moving();
    }

    /// Starts coasting with an explicit velocity.
    pub fn fling(&mut self, vx: f64, vy: f64) {
        self.velocity = (vx, vy);
        self.release();
    }

    pub fn stop(&mut self) {
        self.velocity = (0.0, 0.0);
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn velocity(&self) -> (f64, f64) {
        self.velocity
    }

    /// Advances by `dt` seconds and returns the pointer-space displacement
    /// for this step, or `None` when not coasting.
    pub fn step(&mut self, dt: f64) -> Option<(f64, f64)> {
        if !self.active || !(dt > 0.0) {
            return None;
        }

        let displacement = (self.velocity.0 * dt, self.velocity.1 * dt);
        let decay = 2f64.powf(-INERTIA_DECAY * dt);
        self.velocity = (self.velocity.0 * decay, self.velocity.1 * decay);
        if !self.is_moving() {
            self.stop();
        }
        Some(displacement)
    }

    fn is_moving(&self) -> bool {
        self.velocity.0.abs() > MIN_INERTIA_SPEED || self.velocity.1.abs() > MIN_INERTIA_SPEED
    }
}
