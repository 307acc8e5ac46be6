// Headless runner for the twinmap overlay engine. It stands in for a map
// host: a fixed Mercator viewport, the pointer parked mid-canvas, the query
// loop polling the backend, and one frame described per tick. Useful for
// soak-testing the engine against a live backend without a UI.

use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tracing::{info, trace};
use tracing_subscriber::EnvFilter;

use twinmap::core_modules::mapper::{PixelPoint, WebMercatorMapper};
use twinmap::pipeline::{OverlayConfig, OverlayPipeline};
use twinmap::query::{BackendClient, run_query_loop};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = OverlayConfig::from_env();
    info!(
        backend = %config.backend_url,
        zoom = config.zoom,
        lat = config.center.lat,
        lng = config.center.lng,
        "starting overlay engine"
    );

    let mapper = WebMercatorMapper::centered(config.zoom, config.center, config.viewport());
    let mut pipeline = OverlayPipeline::new(&config, 0);
    pipeline.view_changed(&mapper);

    let client = BackendClient::new(config.backend_url.clone());
    // A pan/zoom host would push fresh extents through this sender; the
    // headless viewport never moves.
    let (_extent_tx, extent_rx) = watch::channel(pipeline.query_request(&mapper));
    let (response_tx, mut response_rx) = mpsc::channel(4);
    tokio::spawn(run_query_loop(
        client,
        extent_rx,
        response_tx,
        config.query_interval,
    ));

    let started = Instant::now();
    let pointer = PixelPoint::new(
        config.window_width as f64 / 2.0,
        config.window_height as f64 / 2.0,
    );
    let mut frames = tokio::time::interval(std::time::Duration::from_millis(
        1_000 / config.frame_rate as u64,
    ));
    let mut frame_count: u64 = 0;

    loop {
        tokio::select! {
            _ = frames.tick() => {
                let now_ms = started.elapsed().as_millis() as u64;
                let ops = pipeline.render_frame(&mapper, pointer, now_ms);
                trace!(ops = ops.len(), "frame described");

                frame_count += 1;
                if frame_count % (config.frame_rate as u64 * 10) == 0 {
                    let totals = pipeline.query_response().totals();
                    info!(
                        devices = totals.device_count,
                        happy = totals.happy_count,
                        sad = totals.sad_count,
                        regions = pipeline.query_response().region_summaries.len(),
                        "world totals"
                    );
                }
            }
            Some(response) = response_rx.recv() => {
                pipeline.apply_query_response(response);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}
