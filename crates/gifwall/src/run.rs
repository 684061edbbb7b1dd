use std::sync::Arc;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use gifsource::{FeedClient, FeedConfig, HttpImageFetcher};
use renderer::{buffer_size, Renderer, RendererConfig};
use wallgrid::{DownloadQueue, Grid, Sampler, Starfield};

use crate::cli::Cli;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let feed = FeedClient::new(FeedConfig::new(&cli.api_base, cli.count, cli.safe)?)
        .context("failed to construct gif listing client")?;
    let urls = match feed.fetch_urls() {
        Ok(urls) => {
            tracing::info!(count = urls.len(), "loaded gif candidates");
            urls
        }
        Err(err) => {
            // the wall degrades to stars on black rather than refusing to start
            tracing::warn!(error = %err, "gif listing unavailable; starting with an empty wall");
            Vec::new()
        }
    };

    let mut sampler: Box<dyn Sampler> = match cli.seed {
        Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
        None => Box::new(StdRng::from_entropy()),
    };

    let fetcher =
        Arc::new(HttpImageFetcher::new().context("failed to construct image fetcher")?);
    let queue = DownloadQueue::new(fetcher);

    let (buffer_width, buffer_height) = buffer_size(cli.size);
    let viewport = (buffer_width as f32, buffer_height as f32);
    let grid = Grid::new(urls, queue, viewport, sampler.as_mut());
    let stars = Starfield::new(viewport, sampler.as_mut());

    tracing::info!(
        window = ?cli.size,
        buffer = ?(buffer_width, buffer_height),
        crt = cli.shader,
        "starting gif wall"
    );

    Renderer::new(RendererConfig {
        window_size: cli.size,
        crt_filter: cli.shader,
        target_fps: cli.fps,
    })
    .run(grid, stars, sampler)
}
