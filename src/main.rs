//! Metatile Server - a metatile rendering cache for raster map tiles.
//!
//! This binary drives the tile service from the command line.

use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metatile_server::{
    config::{CheckConfig, Cli, Command, WarmConfig},
    tile::{CacheStats, GridRenderer, MapRenderer, TileRequest, TileResponse, TileService},
    TileError,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Warm(config) => run_warm(config).await,
        Command::Check(config) => run_check(config),
    }
}

// =============================================================================
// Warm Command
// =============================================================================

/// Summary of a warm run.
#[derive(Debug, Serialize)]
struct WarmReport {
    zoom: u8,
    requested: usize,
    hits: usize,
    misses: usize,
    failures: usize,
    peak_in_flight: usize,
    elapsed_ms: u64,
    cache: CacheStats,
}

impl WarmReport {
    fn record(&mut self, joined: Result<TileOutcome, JoinError>) {
        self.requested += 1;
        match joined {
            Ok((_, Ok(response))) if response.cache_hit => self.hits += 1,
            Ok((_, Ok(_))) => self.misses += 1,
            Ok((request, Err(e))) => {
                self.failures += 1;
                log_tile_error(&request, &e);
            }
            Err(e) => {
                self.failures += 1;
                error!("Tile task failed: {}", e);
            }
        }
    }
}

type TileOutcome = (TileRequest, Result<TileResponse, TileError>);

/// Resolve every tile of `tiles`, keeping at most `concurrency` tasks alive.
///
/// Tasks are spawned only once a slot is free, so the pending set stays
/// bounded no matter how large the range is.
async fn warm_tiles<R: MapRenderer>(
    service: Arc<TileService<R>>,
    tiles: impl Iterator<Item = (u32, u32)>,
    zoom: u8,
    concurrency: usize,
) -> WarmReport {
    let concurrency = concurrency.max(1);
    let mut report = WarmReport {
        zoom,
        requested: 0,
        hits: 0,
        misses: 0,
        failures: 0,
        peak_in_flight: 0,
        elapsed_ms: 0,
        cache: service.cache_stats().await,
    };

    let mut tasks = JoinSet::new();
    for (x, y) in tiles {
        if tasks.len() >= concurrency {
            if let Some(joined) = tasks.join_next().await {
                report.record(joined);
            }
        }

        let service = Arc::clone(&service);
        let request = TileRequest::new(x, y, zoom);
        tasks.spawn(async move { (request, service.get_tile(request).await) });
        report.peak_in_flight = report.peak_in_flight.max(tasks.len());
    }

    while let Some(joined) = tasks.join_next().await {
        report.record(joined);
    }

    report.cache = service.cache_stats().await;
    report
}

async fn run_warm(config: WarmConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let metatile_config = config.tiles.metatile_config();

    info!("Configuration:");
    info!("  Tile size: {}px", metatile_config.tile_size);
    info!(
        "  Metatile: {}x{} tiles ({}px)",
        1u32 << metatile_config.size_exponent,
        1u32 << metatile_config.size_exponent,
        metatile_config.metatile_pixels()
    );
    info!("  Cache: {} metatiles", config.tiles.cache_capacity);
    info!(
        "  Range: zoom {}, x {}..{}, y {}..{}",
        config.zoom,
        config.x,
        config.x + config.count,
        config.y,
        config.y + config.count
    );

    let service = Arc::new(TileService::with_cache_capacity(
        GridRenderer::new(),
        metatile_config,
        config.tiles.cache_capacity,
    ));
    let started = Instant::now();
    let mut report = warm_tiles(
        Arc::clone(&service),
        config.tiles(),
        config.zoom,
        config.concurrency,
    )
    .await;
    report.elapsed_ms = started.elapsed().as_millis() as u64;

    if config.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        info!("");
        info!(
            "Resolved {} tiles in {} ms: {} hits, {} misses, {} failures",
            report.requested, report.elapsed_ms, report.hits, report.misses, report.failures
        );
        info!(
            "Renders: {}, cached metatiles: {}/{}",
            report.cache.renders, report.cache.entries, report.cache.capacity
        );
    }

    if report.failures > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Log a failed tile at a level matching who caused it.
fn log_tile_error(request: &TileRequest, err: &TileError) {
    let address = request.address();
    if err.is_client_error() {
        warn!(tile = %address, error_type = err.kind(), "Client error: {}", err);
    } else {
        error!(tile = %address, error_type = err.kind(), "Tile error: {}", err);
    }
}

// =============================================================================
// Check Command
// =============================================================================

fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("Metatile Server Configuration Check");
    println!("═══════════════════════════════════");
    println!();

    if let Err(e) = config.validate() {
        println!("✗ Configuration: {}", e);
        return ExitCode::FAILURE;
    }

    let metatile_config = config.tiles.metatile_config();
    println!("✓ Tile size: {}px", metatile_config.tile_size);
    println!(
        "✓ Metatile exponent: {} ({}px metatiles)",
        metatile_config.size_exponent,
        metatile_config.metatile_pixels()
    );
    println!("✓ Cache capacity: {} metatiles", config.tiles.cache_capacity);
    println!();

    let service = TileService::with_cache_capacity(
        GridRenderer::new(),
        metatile_config,
        config.tiles.cache_capacity,
    );

    let mut usable = 0;
    let mut failed = 0;
    for zoom in config.zooms() {
        match service.check_geometry(zoom) {
            Ok(request) => {
                usable += 1;
                let (width, height) = request.dimensions();
                println!(
                    "✓ zoom {:>2}: {}x{} px, {} tiles per axis",
                    zoom,
                    width,
                    height,
                    request.tiles_across()
                );
            }
            Err(e) => {
                failed += 1;
                println!("✗ zoom {:>2}: {}", zoom, e);
            }
        }
    }

    println!();
    println!("═══════════════════════════════════");

    // Low zooms smaller than one metatile always mismatch; only fail when
    // nothing is renderable or a single requested zoom is not
    if usable == 0 || (config.zoom.is_some() && failed > 0) {
        println!("✗ Check failed");
        return ExitCode::FAILURE;
    }

    println!("✓ {} zoom level(s) renderable", usable);
    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "metatile_server=debug"
    } else {
        "metatile_server=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
