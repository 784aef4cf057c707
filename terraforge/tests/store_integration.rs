//! Offline store tests: tiles are served from a disk store before, or
//! instead of, the network.
//!
//! Run with: `cargo test --test store_integration`

mod common;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use terraforge::coord::LatLon;
use terraforge::source::{DiskTileStore, TileSource, TileStore};
use terraforge::tile::TileImage;

use common::{engine_config, png, tick_until_settled, widget, FakeTileServer, BASE_TEMPLATE, BLUE, RED};

const SETTLE: Duration = Duration::from_secs(5);

/// Seeds every tile of zoom level 2 into the store.
async fn seed_zoom_two(store: &DiskTileStore) {
    let source = TileSource::new(BASE_TEMPLATE, 256, 19).unwrap();
    for x in 0..4 {
        for y in 0..4 {
            let key = source.base_key(&source.key(2, x, y));
            store.put(&key, png(256, BLUE)).await.unwrap();
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_store_is_consulted_before_network() {
    let dir = TempDir::new().unwrap();
    let store = DiskTileStore::new(dir.path());
    seed_zoom_two(&store).await;

    let server = Arc::new(FakeTileServer::serving(png(256, RED)));
    let config = engine_config().with_store_dir(Some(dir.path().to_path_buf()));
    let mut map = widget(config, LatLon::new(0.0, 0.0), 2.0, Arc::clone(&server));

    tick_until_settled(&mut map, SETTLE).await;

    assert!(map.viewport().is_settled());
    let raster = map.viewport().slot(1, 1).unwrap().image.to_raster(256);
    assert_eq!(*raster.get_pixel(0, 0), BLUE);
    assert_eq!(server.requested("https://base.test/2/1/1.png"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_store_only_never_touches_network() {
    let dir = TempDir::new().unwrap();
    let store = DiskTileStore::new(dir.path());
    seed_zoom_two(&store).await;

    let server = Arc::new(FakeTileServer::serving(png(256, RED)));
    let config = engine_config()
        .with_store_dir(Some(dir.path().to_path_buf()))
        .with_store_only(true);
    let mut map = widget(config, LatLon::new(0.0, 0.0), 2.0, Arc::clone(&server));
    tick_until_settled(&mut map, SETTLE).await;
    assert!(map.viewport().slots().all(|slot| slot.image.is_loaded()));

    // Zoom 3 was never seeded.
    map.zoom_in();
    tick_until_settled(&mut map, SETTLE).await;

    assert!(map.viewport().is_settled());
    assert!(map
        .viewport()
        .slots()
        .all(|slot| slot.image == TileImage::Unavailable));
    assert_eq!(server.calls(), 0);
}
