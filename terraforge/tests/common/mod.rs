//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;

use terraforge::coord::LatLon;
use terraforge::engine::{EngineConfig, TileEngine};
use terraforge::source::{HttpClient, SourceError};
use terraforge::viewport::RenderCommand;
use terraforge::widget::{MapConfig, MapWidget};

pub const BASE_TEMPLATE: &str = "https://base.test/{z}/{x}/{y}.png";
pub const OVERLAY_TEMPLATE: &str = "https://labels.test/{z}/{x}/{y}.png";

pub const RED: Rgba<u8> = Rgba([220, 30, 30, 255]);
pub const BLUE: Rgba<u8> = Rgba([30, 30, 220, 255]);

/// Encodes a solid-color PNG tile.
pub fn png(size: u32, color: Rgba<u8>) -> Bytes {
    let image = RgbaImage::from_pixel(size, size, color);
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("png encoding");
    Bytes::from(out.into_inner())
}

/// Fake tile server answering by URL prefix.
pub struct FakeTileServer {
    routes: Mutex<HashMap<String, Result<Bytes, SourceError>>>,
    fallback: Result<Bytes, SourceError>,
    requests: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeTileServer {
    /// Serves `body` for every URL.
    pub fn serving(body: Bytes) -> Self {
        Self::with_fallback(Ok(body))
    }

    /// Answers every URL with an HTTP status.
    pub fn failing(status: u16) -> Self {
        Self::with_fallback(Err(SourceError::Status {
            status,
            url: String::new(),
        }))
    }

    fn with_fallback(fallback: Result<Bytes, SourceError>) -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            fallback,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answers URLs starting with `prefix` with `response`.
    pub fn route(self, prefix: &str, response: Result<Bytes, SourceError>) -> Self {
        self.routes.lock().insert(prefix.to_string(), response);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|r| *r == url).count()
    }
}

impl HttpClient for FakeTileServer {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, SourceError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(url.to_string());
        let response = self
            .routes
            .lock()
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.fallback.clone());
        Box::pin(async move { response })
    }
}

/// Engine settings pointing at the fake server.
pub fn engine_config() -> EngineConfig {
    EngineConfig::default()
        .with_url_template(BASE_TEMPLATE)
        .with_workers(4)
}

/// A 512×512 widget on the caller's runtime.
pub fn widget(config: EngineConfig, center: LatLon, zoom: f64, http: Arc<FakeTileServer>) -> MapWidget {
    let config = MapConfig::default()
        .with_size(512, 512)
        .with_center(center, zoom)
        .with_engine(config);
    let engine = TileEngine::start_with_client(
        config.engine.clone(),
        Some(tokio::runtime::Handle::current()),
        http,
    )
    .expect("engine");
    MapWidget::with_engine(&config, engine).expect("widget")
}

/// Ticks until every visible slot has a final image or `timeout` elapses.
/// Returns all commands seen.
pub async fn tick_until_settled(map: &mut MapWidget, timeout: Duration) -> Vec<RenderCommand> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut commands = Vec::new();
    loop {
        commands.extend(map.tick());
        if map.viewport().is_settled() || tokio::time::Instant::now() >= deadline {
            return commands;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
