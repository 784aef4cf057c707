//! Tile URL templates.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use super::SourceError;

/// Default base layer.
pub const DEFAULT_TILE_TEMPLATE: &str = "https://a.tile.openstreetmap.org/{z}/{x}/{y}.png";

fn placeholder_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([a-zA-Z_]+)\}").unwrap())
}

/// A tile URL (or store path) template with literal `{z}`, `{x}` and `{y}`
/// placeholders.
///
/// # Example
///
/// ```
/// use terraforge::source::TileTemplate;
///
/// let template = TileTemplate::parse("https://tile.example.com/{z}/{x}/{y}.png").unwrap();
/// assert_eq!(template.url_for(3, 4, 5), "https://tile.example.com/3/4/5.png");
///
/// assert!(TileTemplate::parse("https://tile.example.com/{z}/{x}.png").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileTemplate {
    raw: String,
}

impl TileTemplate {
    /// Validates and wraps a template string.
    ///
    /// All three placeholders must be present and no other `{name}`
    /// placeholder may appear.
    pub fn parse(template: &str) -> Result<Self, SourceError> {
        let invalid = |reason: String| SourceError::InvalidTemplate {
            template: template.to_string(),
            reason,
        };

        let mut seen = [false; 3];
        for capture in placeholder_regex().captures_iter(template) {
            match &capture[1] {
                "z" => seen[0] = true,
                "x" => seen[1] = true,
                "y" => seen[2] = true,
                other => return Err(invalid(format!("unknown placeholder {{{}}}", other))),
            }
        }

        let missing: Vec<&str> = ["{z}", "{x}", "{y}"]
            .iter()
            .zip(seen)
            .filter(|(_, present)| !present)
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(invalid(format!("missing {}", missing.join(", "))));
        }

        Ok(Self {
            raw: template.to_string(),
        })
    }

    /// Substitutes the tile index into the template.
    pub fn url_for(&self, zoom: u8, x: i32, y: i32) -> String {
        self.raw
            .replace("{z}", &zoom.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }

    /// Returns the template text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Default for TileTemplate {
    fn default() -> Self {
        Self {
            raw: DEFAULT_TILE_TEMPLATE.to_string(),
        }
    }
}

impl fmt::Display for TileTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
