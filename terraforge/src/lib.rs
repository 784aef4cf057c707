//! TerraForge map core - tile rendering and caching for a slippy-map widget.
//!
//! The crate turns a tile URL template into a pannable, zoomable map view.
//! A [`widget::MapWidget`] owns a [`viewport::Viewport`] that keeps a grid of
//! tile slots covering the visible area, and a [`engine::TileEngine`] that
//! fetches missing tiles in the background:
//!
//! ```text
//! pointer input ──► MapWidget ──► Viewport ──► FetchQueue ──► FetchWorkerPool
//!                      │             ▲                              │
//!                      │             └──── FetchResult channel ◄────┘
//!                      ▼                          │
//!               RenderCommand list          TileCache (LRU)
//! ```
//!
//! Hosts never see the grid directly: every change is reported as a
//! [`viewport::RenderCommand`] to apply to their own canvas.

pub mod cache;
pub mod config;
pub mod coord;
pub mod engine;
pub mod fetch;
pub mod logging;
pub mod overlay;
pub mod precache;
pub mod source;
pub mod tile;
pub mod viewport;
pub mod widget;

/// Version of the TerraForge map core.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
