//! Fetch-area command - fill the offline tile store for a bounding box.
//!
//! Every tile of every zoom level in the range is downloaded once and written
//! to the disk store, so the widget can later run with `fetch.store_only`.
//! Tiles already in the store are skipped. Overlay tiles are fetched too when
//! an overlay template is configured.

use std::path::PathBuf;

use console::style;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use terraforge::config::{default_store_dir, ConfigFile};
use terraforge::coord::{decimal_to_tile, world_size, LatLon};
use terraforge::fetch::RetryPolicy;
use terraforge::source::{
    DiskTileStore, HttpClient, ReqwestClient, SourceError, TileSource, TileStore, TileTemplate,
};
use terraforge::tile::TileKey;

use crate::error::CliError;

/// Arguments for the fetch-area command.
pub struct FetchAreaArgs {
    pub top_left: LatLon,
    pub bottom_right: LatLon,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub store: Option<PathBuf>,
    pub workers: Option<usize>,
}

/// One layer of one tile to download.
struct Download<'a> {
    template: &'a TileTemplate,
    key: TileKey,
}

enum Outcome {
    Downloaded,
    Skipped,
    Failed(SourceError),
}

#[derive(Debug, Default, PartialEq)]
struct FetchSummary {
    downloaded: usize,
    skipped: usize,
    failed: usize,
}

impl FetchSummary {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Downloaded => self.downloaded += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }

    fn total(&self) -> usize {
        self.downloaded + self.skipped + self.failed
    }
}

/// Run the fetch-area command.
pub fn run(config: &ConfigFile, args: FetchAreaArgs) -> Result<(), CliError> {
    let (tl, br) = (args.top_left, args.bottom_right);
    if tl.lat <= br.lat || tl.lon >= br.lon {
        return Err(CliError::InvalidArgument(format!(
            "top-left {} must lie north-west of bottom-right {}",
            tl, br
        )));
    }
    if args.min_zoom > args.max_zoom {
        return Err(CliError::InvalidArgument(format!(
            "min-zoom {} is above max-zoom {}",
            args.min_zoom, args.max_zoom
        )));
    }

    let source = TileSource::new(
        &config.tiles.url_template,
        config.tiles.tile_size,
        config.tiles.max_zoom,
    )?
    .with_overlay(config.tiles.overlay_template.as_deref())?;
    if args.max_zoom > source.max_zoom() {
        return Err(CliError::InvalidArgument(format!(
            "max-zoom {} exceeds the source maximum {}",
            args.max_zoom,
            source.max_zoom()
        )));
    }

    let store_dir = args
        .store
        .or_else(|| config.fetch.store_dir.clone())
        .unwrap_or_else(default_store_dir);
    let workers = args.workers.unwrap_or(config.fetch.workers).max(1);
    let retry = RetryPolicy::exponential(config.fetch.max_attempts);

    let downloads = plan(&source, tl, br, args.min_zoom, args.max_zoom);

    println!("TerraForge Area Download v{}", terraforge::VERSION);
    println!("===========================");
    println!();
    println!("Area:    {} to {}", tl, br);
    println!("Zoom:    {}-{}", args.min_zoom, args.max_zoom);
    println!("Source:  {}", source.id());
    println!("Store:   {}", store_dir.display());
    println!("Tiles:   {} ({} workers)", downloads.len(), workers);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping downloads...");
        handler_token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("terraforge-fetch")
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let http = ReqwestClient::with_timeout(config.fetch.timeout)?;
    let store = DiskTileStore::new(&store_dir);

    let progress = ProgressBar::new(downloads.len() as u64);
    if let Ok(bar_style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tiles ({per_sec}, eta {eta})",
    ) {
        progress.set_style(bar_style.progress_chars("=> "));
    }

    info!(
        tiles = downloads.len(),
        workers,
        store = %store_dir.display(),
        "Area download started"
    );

    let summary = runtime.block_on(async {
        let outcomes = stream::iter(downloads.iter())
            .map(|download| fetch_one(&http, &store, &retry, download))
            .buffer_unordered(workers)
            .take_until(cancel.cancelled());
        let mut outcomes = std::pin::pin!(outcomes);

        let mut summary = FetchSummary::default();
        while let Some(outcome) = outcomes.next().await {
            summary.record(&outcome);
            progress.inc(1);
        }
        summary
    });
    progress.finish_and_clear();

    info!(
        downloaded = summary.downloaded,
        skipped = summary.skipped,
        failed = summary.failed,
        "Area download finished"
    );

    if cancel.is_cancelled() {
        println!(
            "{} after {} of {} tiles",
            style("Stopped").yellow().bold(),
            summary.total(),
            downloads.len()
        );
    } else {
        println!("{}", style("Done").green().bold());
    }
    println!("  Downloaded: {}", summary.downloaded);
    println!("  Already stored: {}", summary.skipped);
    if summary.failed > 0 {
        println!("  Failed: {}", style(summary.failed).red());
    } else {
        println!("  Failed: 0");
    }

    Ok(())
}

/// Integer tile range covering a box at one zoom level, clipped to the world.
fn tile_range(top_left: LatLon, bottom_right: LatLon, zoom: u8) -> ((i32, i32), (i32, i32)) {
    let last = world_size(zoom) as i32 - 1;
    let a = decimal_to_tile(top_left.lat, top_left.lon, zoom);
    let b = decimal_to_tile(bottom_right.lat, bottom_right.lon, zoom);
    let clip = |v: f64| (v.floor() as i32).clamp(0, last);
    ((clip(a.x), clip(b.x)), (clip(a.y), clip(b.y)))
}

/// Every layer of every tile to download, lowest zoom first.
fn plan<'a>(
    source: &'a TileSource,
    top_left: LatLon,
    bottom_right: LatLon,
    min_zoom: u8,
    max_zoom: u8,
) -> Vec<Download<'a>> {
    let mut downloads = Vec::new();
    for zoom in min_zoom..=max_zoom {
        let ((x0, x1), (y0, y1)) = tile_range(top_left, bottom_right, zoom);
        for x in x0..=x1 {
            for y in y0..=y1 {
                let key = source.key(zoom, x, y);
                downloads.push(Download {
                    template: source.base(),
                    key: source.base_key(&key),
                });
                if let (Some(template), Some(overlay_key)) = (source.overlay(), source.overlay_key(&key)) {
                    downloads.push(Download {
                        template,
                        key: overlay_key,
                    });
                }
            }
        }
    }
    downloads
}

/// Downloads one layer unless the store already has it.
async fn fetch_one(
    http: &dyn HttpClient,
    store: &DiskTileStore,
    retry: &RetryPolicy,
    download: &Download<'_>,
) -> Outcome {
    let key = &download.key;
    if let Ok(Some(_)) = store.get(key).await {
        return Outcome::Skipped;
    }

    let url = download.template.url_for(key.zoom, key.x, key.y);
    let mut attempt = 0;
    loop {
        let error = match http.get(&url).await {
            Ok(bytes) => {
                if let Err(e) = validate_image(bytes.clone()).await {
                    warn!(tile = %key, url = %url, error = %e, "Downloaded tile is not an image");
                    return Outcome::Failed(e);
                }
                return match store.put(key, bytes).await {
                    Ok(()) => {
                        debug!(tile = %key, "Tile stored");
                        Outcome::Downloaded
                    }
                    Err(e) => {
                        warn!(tile = %key, error = %e, "Failed to store tile");
                        Outcome::Failed(e)
                    }
                };
            }
            Err(e) => e,
        };

        attempt += 1;
        match retry.delay_for_attempt(attempt) {
            Some(delay) if error.is_transient() => {
                debug!(tile = %key, attempt, error = %error, "Retrying tile download");
                tokio::time::sleep(delay).await;
            }
            _ => {
                warn!(tile = %key, url = %url, error = %error, "Tile download failed");
                return Outcome::Failed(error);
            }
        }
    }
}

/// Checks that a download decodes as an image, on the blocking thread pool.
async fn validate_image(bytes: impl AsRef<[u8]> + Send + 'static) -> Result<(), SourceError> {
    tokio::task::spawn_blocking(move || image::load_from_memory(bytes.as_ref()).map(|_| ()))
        .await
        .map_err(|e| SourceError::Task(e.to_string()))?
        .map_err(|e| SourceError::Decode(e.to_string()))
}
