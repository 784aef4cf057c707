//! Tile sources: where tile images come from.
//!
//! A [`TileSource`] describes the base layer (and optional overlay layer) as
//! URL templates plus tile geometry. A [`TileResolver`] turns a
//! [`TileKey`](crate::tile::TileKey) into a decoded
//! [`TileImage`](crate::tile::TileImage), consulting the persistent
//! [`TileStore`] before the network.
//!
//! # Architecture
//!
//! ```text
//! TileResolver::resolve(source, key)
//!     ├── base:    store.get(key) ──miss──► http.get(url)   (unless store-only)
//!     │            decode + resize to tile_size
//!     └── overlay: same path with the overlay template
//!                  alpha-composited onto the base (failure keeps the base)
//! ```
//!
//! The whole resolution runs under an explicit timeout so a hung connection
//! surfaces as a transient [`SourceError::Timeout`].

mod error;
mod http;
mod store;
mod template;

pub use error::SourceError;
pub use http::{HttpClient, ReqwestClient, DEFAULT_HTTP_TIMEOUT, DEFAULT_USER_AGENT};
pub use store::{source_dir_name, DiskTileStore, MemoryTileStore, TileStore};
pub use template::{TileTemplate, DEFAULT_TILE_TEMPLATE};

#[cfg(test)]
pub use http::tests::MockHttpClient;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use image::RgbaImage;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::coord::MAX_SUPPORTED_ZOOM;
use crate::tile::{composite_overlay, SourceId, TileImage, TileKey, DEFAULT_TILE_SIZE};

/// Boxed future returned by the async source traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default maximum zoom level of a tile source.
pub const DEFAULT_MAX_ZOOM: u8 = 19;

// =============================================================================
// Tile source
// =============================================================================

/// Immutable description of a tile layer stack.
///
/// Changing the base or overlay template produces a new source with a new
/// [`SourceId`], which is what invalidates in-flight fetches.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSource {
    base: TileTemplate,
    overlay: Option<TileTemplate>,
    tile_size: u32,
    max_zoom: u8,
    id: SourceId,
    base_id: SourceId,
    overlay_id: Option<SourceId>,
}

impl TileSource {
    /// Creates a source from a base template.
    ///
    /// `tile_size` of zero falls back to [`DEFAULT_TILE_SIZE`]; `max_zoom` is
    /// capped at [`MAX_SUPPORTED_ZOOM`].
    pub fn new(template: &str, tile_size: u32, max_zoom: u8) -> Result<Self, SourceError> {
        let base = TileTemplate::parse(template)?;
        let base_id = SourceId::new(base.as_str(), None);
        Ok(Self {
            base,
            overlay: None,
            tile_size: if tile_size == 0 {
                DEFAULT_TILE_SIZE
            } else {
                tile_size
            },
            max_zoom: max_zoom.min(MAX_SUPPORTED_ZOOM),
            id: base_id.clone(),
            base_id,
            overlay_id: None,
        })
    }

    /// Returns a copy of this source with the overlay replaced.
    pub fn with_overlay(&self, overlay: Option<&str>) -> Result<Self, SourceError> {
        let overlay = overlay.map(TileTemplate::parse).transpose()?;
        let overlay_id = overlay.as_ref().map(|t| SourceId::new(t.as_str(), None));
        Ok(Self {
            id: SourceId::new(self.base.as_str(), overlay.as_ref().map(|t| t.as_str())),
            overlay,
            overlay_id,
            ..self.clone()
        })
    }

    /// Identity of the composed layer stack.
    pub fn id(&self) -> &SourceId {
        &self.id
    }

    /// Base layer template.
    pub fn base(&self) -> &TileTemplate {
        &self.base
    }

    /// Overlay layer template, if any.
    pub fn overlay(&self) -> Option<&TileTemplate> {
        self.overlay.as_ref()
    }

    /// Tile edge length in pixels.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Highest zoom level the source serves.
    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    /// Key under which the base layer's raw bytes are stored.
    pub fn base_key(&self, key: &TileKey) -> TileKey {
        TileKey::new(key.zoom, key.x, key.y, self.base_id.clone())
    }

    /// Key under which the overlay layer's raw bytes are stored.
    pub fn overlay_key(&self, key: &TileKey) -> Option<TileKey> {
        self.overlay_id
            .as_ref()
            .map(|id| TileKey::new(key.zoom, key.x, key.y, id.clone()))
    }

    /// Builds the composed-layer key for a tile index.
    pub fn key(&self, zoom: u8, x: i32, y: i32) -> TileKey {
        TileKey::new(zoom, x, y, self.id.clone())
    }
}

impl Default for TileSource {
    fn default() -> Self {
        let base = TileTemplate::default();
        let id = SourceId::new(base.as_str(), None);
        Self {
            base,
            overlay: None,
            tile_size: DEFAULT_TILE_SIZE,
            max_zoom: DEFAULT_MAX_ZOOM,
            id: id.clone(),
            base_id: id,
            overlay_id: None,
        }
    }
}

/// Shared, swappable reference to the current tile source.
///
/// The viewport replaces the source; workers read it to resolve tasks and
/// to drop tasks that belong to a replaced source.
#[derive(Debug)]
pub struct SourceHandle {
    current: RwLock<Arc<TileSource>>,
}

impl SourceHandle {
    /// Creates a handle holding `source`.
    pub fn new(source: TileSource) -> Self {
        Self {
            current: RwLock::new(Arc::new(source)),
        }
    }

    /// Returns the current source.
    pub fn current(&self) -> Arc<TileSource> {
        Arc::clone(&self.current.read())
    }

    /// Replaces the current source.
    pub fn replace(&self, source: TileSource) {
        *self.current.write() = Arc::new(source);
    }

    /// Returns true if `id` names the current source.
    pub fn is_current(&self, id: &SourceId) -> bool {
        self.current.read().id() == id
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolves tile keys to decoded images via store and network.
pub struct TileResolver {
    http: Arc<dyn HttpClient>,
    store: Option<Arc<dyn TileStore>>,
    store_only: bool,
    timeout: Duration,
}

impl TileResolver {
    /// Creates a resolver that fetches from the network only.
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            store: None,
            store_only: false,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Consults `store` before the network.
    pub fn with_store(mut self, store: Arc<dyn TileStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Never touches the network when `store_only` is set.
    pub fn with_store_only(mut self, store_only: bool) -> Self {
        self.store_only = store_only;
        self
    }

    /// Sets the overall resolution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns true if the resolver is restricted to the store.
    pub fn is_store_only(&self) -> bool {
        self.store_only
    }

    /// Returns the configured store, if any.
    pub fn store(&self) -> Option<&Arc<dyn TileStore>> {
        self.store.as_ref()
    }

    /// Resolves `key` to a decoded, tile-sized image.
    pub async fn resolve(&self, source: &TileSource, key: &TileKey) -> Result<TileImage, SourceError> {
        if !key.is_in_world() {
            return Err(SourceError::OutOfWorld(key.to_string()));
        }

        match tokio::time::timeout(self.timeout, self.resolve_layers(source, key)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(self.timeout)),
        }
    }

    async fn resolve_layers(&self, source: &TileSource, key: &TileKey) -> Result<TileImage, SourceError> {
        let base_bytes = self.fetch_raw(source.base(), &source.base_key(key)).await?;
        let base = decode_blocking(base_bytes, source.tile_size()).await?;

        let (Some(template), Some(overlay_key)) = (source.overlay(), source.overlay_key(key)) else {
            return Ok(base);
        };
        let Some(raster) = base.raster().map(Arc::clone) else {
            return Ok(base);
        };

        let overlay_bytes = match self.fetch_raw(template, &overlay_key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(tile = %key, error = %e, "Overlay unavailable, showing base layer only");
                return Ok(base);
            }
        };

        match composite_blocking(raster, overlay_bytes).await {
            Ok(composed) => Ok(composed),
            Err(e) => {
                warn!(tile = %key, error = %e, "Overlay decode failed, showing base layer only");
                Ok(base)
            }
        }
    }

    /// Fetches the raw bytes of one layer, store first.
    ///
    /// `key` must carry the layer's own source id (see
    /// [`TileSource::base_key`]).
    pub async fn fetch_raw(&self, template: &TileTemplate, key: &TileKey) -> Result<Bytes, SourceError> {
        if let Some(store) = &self.store {
            match store.get(key).await {
                Ok(Some(bytes)) => {
                    debug!(tile = %key, "Tile served from store");
                    return Ok(bytes);
                }
                Ok(None) => {}
                Err(e) if self.store_only => {
                    warn!(tile = %key, error = %e, "Store read failed in store-only mode");
                    return Err(SourceError::NotStored(key.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        if self.store_only {
            return Err(SourceError::NotStored(key.to_string()));
        }

        let url = template.url_for(key.zoom, key.x, key.y);
        debug!(tile = %key, url = %url, "Fetching tile");
        self.http.get(&url).await
    }
}

// Decoding, resizing and compositing run on the blocking pool so a
// caller-provided runtime keeps its worker threads for I/O.

/// Decodes and fits one layer on the blocking thread pool.
async fn decode_blocking(bytes: Bytes, tile_size: u32) -> Result<TileImage, SourceError> {
    tokio::task::spawn_blocking(move || TileImage::decode(&bytes, tile_size))
        .await
        .map_err(|e| SourceError::Task(e.to_string()))?
        .map_err(|e| SourceError::Decode(e.to_string()))
}

/// Composites an overlay layer onto `base` on the blocking thread pool.
async fn composite_blocking(base: Arc<RgbaImage>, overlay: Bytes) -> Result<TileImage, SourceError> {
    tokio::task::spawn_blocking(move || composite_overlay(&base, &overlay))
        .await
        .map_err(|e| SourceError::Task(e.to_string()))?
        .map(TileImage::from_rgba)
        .map_err(|e| SourceError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::png_bytes;
    use image::Rgba;

    const BASE: &str = "https://base.example/{z}/{x}/{y}.png";
    const OVERLAY: &str = "https://overlay.example/{z}/{x}/{y}.png";

    fn red() -> Bytes {
        Bytes::from(png_bytes(256, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn test_source_ids() {
        let source = TileSource::new(BASE, 256, 19).unwrap();
        let layered = source.with_overlay(Some(OVERLAY)).unwrap();

        assert_ne!(source.id(), layered.id());
        assert_eq!(source.base_key(&source.key(1, 0, 0)).source, *source.id());
        assert!(source.overlay_key(&source.key(1, 0, 0)).is_none());
        assert!(layered.overlay_key(&layered.key(1, 0, 0)).is_some());

        let cleared = layered.with_overlay(None).unwrap();
        assert_eq!(cleared.id(), source.id());
    }

    #[test]
    fn test_source_rejects_bad_template() {
        assert!(TileSource::new("https://base/{z}.png", 256, 19).is_err());
        assert!(TileSource::default().with_overlay(Some("nope")).is_err());
    }

    #[test]
    fn test_source_handle_replace() {
        let handle = SourceHandle::new(TileSource::default());
        let old = handle.current().id().clone();

        handle.replace(TileSource::new(BASE, 256, 19).unwrap());
        assert!(!handle.is_current(&old));
        assert_eq!(handle.current().base().as_str(), BASE);
    }

    #[tokio::test]
    async fn test_resolve_from_network() {
        let http = Arc::new(MockHttpClient::always(Ok(red())));
        let resolver = TileResolver::new(http.clone());
        let source = TileSource::new(BASE, 256, 19).unwrap();

        let image = resolver.resolve(&source, &source.key(2, 1, 1)).await.unwrap();
        assert!(image.is_loaded());
        assert_eq!(http.requests.lock()[0], "https://base.example/2/1/1.png");
    }

    #[tokio::test]
    async fn test_store_is_consulted_before_network() {
        let http = Arc::new(MockHttpClient::always(Ok(red())));
        let store = Arc::new(MemoryTileStore::new());
        let source = TileSource::new(BASE, 256, 19).unwrap();
        store.insert(source.base_key(&source.key(2, 1, 1)), red());

        let resolver = TileResolver::new(http.clone()).with_store(store);
        let image = resolver.resolve(&source, &source.key(2, 1, 1)).await.unwrap();

        assert!(image.is_loaded());
        assert_eq!(http.call_count(), 0);
    }

    #[tokio::test]
    async fn test_store_only_miss_is_permanent() {
        let http = Arc::new(MockHttpClient::always(Ok(red())));
        let resolver = TileResolver::new(http.clone())
            .with_store(Arc::new(MemoryTileStore::new()))
            .with_store_only(true);
        let source = TileSource::new(BASE, 256, 19).unwrap();

        let err = resolver.resolve(&source, &source.key(2, 1, 1)).await.unwrap_err();
        assert!(matches!(err, SourceError::NotStored(_)));
        assert!(!err.is_transient());
        assert_eq!(http.call_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_world_is_rejected() {
        let http = Arc::new(MockHttpClient::always(Ok(red())));
        let resolver = TileResolver::new(http.clone());
        let source = TileSource::default();

        let err = resolver.resolve(&source, &source.key(1, 2, 0)).await.unwrap_err();
        assert!(matches!(err, SourceError::OutOfWorld(_)));
        assert_eq!(http.call_count(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_permanent() {
        let http = Arc::new(MockHttpClient::always(Ok(Bytes::from_static(b"<html>"))));
        let resolver = TileResolver::new(http);
        let source = TileSource::default();

        let err = resolver.resolve(&source, &source.key(1, 0, 0)).await.unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_overlay_is_composited() {
        let http = Arc::new(MockHttpClient::always(Ok(red())));
        http.respond(
            "https://overlay.example/1/0/0.png",
            Ok(Bytes::from(png_bytes(512, Rgba([0, 0, 255, 255])))),
        );
        let resolver = TileResolver::new(http.clone());
        let source = TileSource::new(BASE, 256, 19)
            .unwrap()
            .with_overlay(Some(OVERLAY))
            .unwrap();

        let image = resolver.resolve(&source, &source.key(1, 0, 0)).await.unwrap();
        let raster = image.raster().unwrap();
        assert_eq!(raster.dimensions(), (256, 256));
        assert_eq!(*raster.get_pixel(10, 10), Rgba([0, 0, 255, 255]));
        assert_eq!(http.call_count(), 2);
    }

    #[tokio::test]
    async fn test_overlay_failure_keeps_base() {
        let http = Arc::new(MockHttpClient::always(Ok(red())));
        http.respond(
            "https://overlay.example/1/0/0.png",
            Err(SourceError::Status {
                status: 404,
                url: "https://overlay.example/1/0/0.png".into(),
            }),
        );
        let resolver = TileResolver::new(http);
        let source = TileSource::new(BASE, 256, 19)
            .unwrap()
            .with_overlay(Some(OVERLAY))
            .unwrap();

        let image = resolver.resolve(&source, &source.key(1, 0, 0)).await.unwrap();
        assert_eq!(*image.raster().unwrap().get_pixel(0, 0), Rgba([255, 0, 0, 255]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_times_out() {
        struct Hang;
        impl HttpClient for Hang {
            fn get<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<Bytes, SourceError>> {
                Box::pin(std::future::pending())
            }
        }

        let resolver = TileResolver::new(Arc::new(Hang)).with_timeout(Duration::from_secs(10));
        let source = TileSource::default();

        let err = resolver.resolve(&source, &source.key(1, 0, 0)).await.unwrap_err();
        assert_eq!(err, SourceError::Timeout(Duration::from_secs(10)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_image_work_runs_on_blocking_pool() {
        let runtime_thread = std::thread::current().id();
        let worker_thread = tokio::task::spawn_blocking(|| std::thread::current().id())
            .await
            .unwrap();
        assert_ne!(runtime_thread, worker_thread);

        let base = decode_blocking(Bytes::from(png_bytes(128, Rgba([255, 0, 0, 255]))), 256)
            .await
            .unwrap();
        let raster = base.raster().map(Arc::clone).unwrap();
        assert_eq!(raster.dimensions(), (256, 256));

        let err = decode_blocking(Bytes::from_static(b"not a png"), 256).await.unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));

        let composed = composite_blocking(raster, Bytes::from(png_bytes(256, Rgba([0, 0, 255, 255]))))
            .await
            .unwrap();
        assert_eq!(*composed.raster().unwrap().get_pixel(10, 10), Rgba([0, 0, 255, 255]));
    }
}
