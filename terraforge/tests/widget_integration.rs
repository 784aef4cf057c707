//! End-to-end tests driving a `MapWidget` against a fake tile server.
//!
//! Run with: `cargo test --test widget_integration`

mod common;

use std::sync::Arc;
use std::time::Duration;

use terraforge::coord::LatLon;
use terraforge::overlay::MarkerStyle;
use terraforge::tile::TileImage;
use terraforge::viewport::RenderCommand;
use terraforge::widget::{InteractionMode, MapEvent};

use common::{
    engine_config, png, tick_until_settled, widget, FakeTileServer, BLUE, OVERLAY_TEMPLATE, RED,
};

const SETTLE: Duration = Duration::from_secs(5);

fn loaded_updates(commands: &[RenderCommand]) -> usize {
    commands
        .iter()
        .filter(|c| matches!(c, RenderCommand::UpdateTile { image, .. } if image.is_loaded()))
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_visible_tiles_load_in_place() {
    let server = Arc::new(FakeTileServer::serving(png(256, RED)));
    let mut map = widget(engine_config(), LatLon::new(0.0, 0.0), 10.0, Arc::clone(&server));

    let commands = tick_until_settled(&mut map, SETTLE).await;

    assert!(map.viewport().is_settled());
    assert_eq!(map.viewport().slots().count(), 16);
    assert!(map.viewport().slots().all(|slot| slot.image.is_loaded()));
    assert!(loaded_updates(&commands) >= 16);
    assert!(server.requested("https://base.test/10/511/511.png") >= 1);

    let raster = map.viewport().slot(511, 511).unwrap().image.to_raster(256);
    assert_eq!(*raster.get_pixel(128, 128), RED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cached_tiles_return_without_refetch() {
    let server = Arc::new(FakeTileServer::serving(png(256, RED)));
    let mut map = widget(engine_config(), LatLon::new(0.0, 0.0), 10.0, Arc::clone(&server));
    tick_until_settled(&mut map, SETTLE).await;

    let left_column = "https://base.test/10/510/511.png";
    let before = server.requested(left_column);

    // Push the left column out of the grid, then bring it back.
    map.pan(512.0, 0.0);
    map.take_commands();
    map.pan(-512.0, 0.0);
    let commands = map.take_commands();

    let added: Vec<_> = commands
        .iter()
        .filter_map(|c| match c {
            RenderCommand::AddTile { key, image } => Some((key.x, image.clone())),
            _ => None,
        })
        .collect();
    assert!(!added.is_empty());
    assert!(added
        .iter()
        .filter(|(x, _)| *x == 510)
        .all(|(_, image)| image.is_loaded()));
    assert_eq!(server.requested(left_column), before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_tiles_become_unavailable() {
    let server = Arc::new(FakeTileServer::failing(404));
    let mut map = widget(engine_config(), LatLon::new(0.0, 0.0), 10.0, Arc::clone(&server));

    tick_until_settled(&mut map, SETTLE).await;

    assert!(map.viewport().is_settled());
    assert!(map
        .viewport()
        .slots()
        .all(|slot| slot.image == TileImage::Unavailable));
    assert!(server.requested("https://base.test/10/511/511.png") >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overlay_is_composited_over_base() {
    let server = Arc::new(
        FakeTileServer::serving(png(256, RED)).route("https://labels.test/", Ok(png(256, BLUE))),
    );
    let config = engine_config().with_overlay_template(Some(OVERLAY_TEMPLATE.to_string()));
    let mut map = widget(config, LatLon::new(0.0, 0.0), 10.0, Arc::clone(&server));

    tick_until_settled(&mut map, SETTLE).await;

    let raster = map.viewport().slot(512, 512).unwrap().image.to_raster(256);
    assert_eq!(*raster.get_pixel(10, 10), BLUE);
    assert!(server.requested("https://labels.test/10/512/512.png") >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_zoom_change_reloads_at_new_level() {
    let server = Arc::new(FakeTileServer::serving(png(256, RED)));
    let mut map = widget(engine_config(), LatLon::new(0.0, 0.0), 10.0, Arc::clone(&server));
    tick_until_settled(&mut map, SETTLE).await;

    map.zoom_in();
    let commands = tick_until_settled(&mut map, SETTLE).await;

    assert!(matches!(commands.first(), Some(RenderCommand::Clear)));
    assert!(map.viewport().is_settled());
    assert!(map.viewport().slots().all(|slot| slot.key.zoom == 11));
    assert!(server.requested("https://base.test/11/1023/1023.png") >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_click_and_marker_round_trip() {
    let server = Arc::new(FakeTileServer::serving(png(256, RED)));
    let mut map = widget(engine_config(), LatLon::new(0.0, 0.0), 10.0, server);

    map.pointer_pressed(256.0, 256.0);
    let Some(MapEvent::Click { position, .. }) = map.pointer_released(256.0, 256.0) else {
        panic!("expected a click");
    };
    assert!(position.lat.abs() < 1e-6);
    assert!(position.lon.abs() < 1e-6);

    let id = map
        .set_position(position.lat, position.lon, Some(MarkerStyle::default()))
        .unwrap();
    let drawn = map.take_commands().into_iter().find_map(|c| match c {
        RenderCommand::DrawOverlay { id: drawn, points, .. } if drawn == id => Some(points),
        _ => None,
    });
    let points = drawn.unwrap();
    assert!((points[0].0 - 256.0).abs() < 1e-6);
    assert!((points[0].1 - 256.0).abs() < 1e-6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_area_selection_then_fit() {
    let server = Arc::new(FakeTileServer::serving(png(256, RED)));
    let mut map = widget(engine_config(), LatLon::new(0.0, 0.0), 5.0, server);
    map.set_mode(InteractionMode::AreaSelect);

    map.pointer_pressed(200.0, 200.0);
    map.pointer_moved(320.0, 300.0);
    let Some(MapEvent::AreaSelected {
        top_left,
        bottom_right,
    }) = map.pointer_released(320.0, 300.0)
    else {
        panic!("expected an area selection");
    };

    let zoom = map.fit_bounding_box(top_left, bottom_right).unwrap();
    assert!(zoom >= 5);
    let (x, y) = map
        .decimal_to_canvas(top_left.lat, top_left.lon)
        .unwrap();
    assert!(x > 0.0 && x < 512.0);
    assert!(y > 0.0 && y < 512.0);
}
