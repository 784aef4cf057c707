//! Overlay identifiers and drawing styles.

use std::fmt;

use image::Rgba;

/// Default marker fill color.
pub const DEFAULT_MARKER_COLOR: Rgba<u8> = Rgba([200, 40, 40, 255]);

/// Default marker radius in pixels.
pub const DEFAULT_MARKER_RADIUS: f32 = 6.0;

/// Default path and polygon outline color.
pub const DEFAULT_LINE_COLOR: Rgba<u8> = Rgba([30, 90, 200, 255]);

/// Default path and polygon outline width in pixels.
pub const DEFAULT_LINE_WIDTH: f32 = 3.0;

/// Identifies an overlay shape within its layer.
///
/// Ids are assigned in increasing order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlayId(pub(crate) u64);

impl OverlayId {
    /// Numeric value of the id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "overlay#{}", self.0)
    }
}

/// Kind of overlay shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayKind {
    Marker,
    Path,
    Polygon,
}

impl fmt::Display for OverlayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayKind::Marker => write!(f, "marker"),
            OverlayKind::Path => write!(f, "path"),
            OverlayKind::Polygon => write!(f, "polygon"),
        }
    }
}

/// How a marker is drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerStyle {
    /// Fill color.
    pub color: Rgba<u8>,
    /// Radius in pixels.
    pub radius: f32,
    /// Optional label drawn next to the marker.
    pub text: Option<String>,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            color: DEFAULT_MARKER_COLOR,
            radius: DEFAULT_MARKER_RADIUS,
            text: None,
        }
    }
}

impl MarkerStyle {
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_color(mut self, color: Rgba<u8>) -> Self {
        self.color = color;
        self
    }
}

/// How an open path is drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct PathStyle {
    pub color: Rgba<u8>,
    pub width: f32,
}

impl Default for PathStyle {
    fn default() -> Self {
        Self {
            color: DEFAULT_LINE_COLOR,
            width: DEFAULT_LINE_WIDTH,
        }
    }
}

/// How a closed polygon is drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonStyle {
    /// Outline color.
    pub outline: Rgba<u8>,
    /// Fill color; `None` draws only the outline.
    pub fill: Option<Rgba<u8>>,
    /// Outline width in pixels.
    pub width: f32,
}

impl Default for PolygonStyle {
    fn default() -> Self {
        Self {
            outline: DEFAULT_LINE_COLOR,
            fill: None,
            width: DEFAULT_LINE_WIDTH,
        }
    }
}

/// Style of any overlay shape; the variant determines the shape kind.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayStyle {
    Marker(MarkerStyle),
    Path(PathStyle),
    Polygon(PolygonStyle),
}

impl OverlayStyle {
    /// Shape kind drawn with this style.
    pub fn kind(&self) -> OverlayKind {
        match self {
            OverlayStyle::Marker(_) => OverlayKind::Marker,
            OverlayStyle::Path(_) => OverlayKind::Path,
            OverlayStyle::Polygon(_) => OverlayKind::Polygon,
        }
    }

    /// Returns true if the outline joins its last vertex to its first.
    pub fn is_closed(&self) -> bool {
        matches!(self, OverlayStyle::Polygon(_))
    }
}
