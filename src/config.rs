//! Configuration management for Metatile Server.
//!
//! This module provides a configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `METATILE_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use metatile_server::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Command::Warm(config) => println!("Warming zoom {}", config.zoom),
//!     Command::Check(config) => println!("Tile size {}", config.tiles.tile_size),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `METATILE_TILE_SIZE` - Edge length of a tile in pixels (default: 512)
//! - `METATILE_EXPONENT` - Metatile size exponent (default: 3, i.e. 8x8 tiles)
//! - `METATILE_CACHE_CAPACITY` - Max metatiles kept in memory (default: 15)
//! - `METATILE_CONCURRENCY` - Concurrent requests while warming (default: 8)

use clap::{Args, Parser, Subcommand};

use crate::tile::{
    tiles_at_zoom, MetatileConfig, DEFAULT_METATILE_CACHE_CAPACITY, DEFAULT_METATILE_EXPONENT,
    DEFAULT_TILE_SIZE, MAX_METATILE_PIXELS, MAX_ZOOM,
};

// =============================================================================
// Default Values
// =============================================================================

/// Largest accepted metatile size exponent (`1 << 13 == 8192`).
pub const MAX_METATILE_EXPONENT: u8 = 13;

/// Default zoom for the warm command.
pub const DEFAULT_WARM_ZOOM: u8 = 10;

/// Default number of tiles per axis for the warm command.
pub const DEFAULT_WARM_COUNT: u32 = 16;

/// Default number of concurrent tile requests for the warm command.
pub const DEFAULT_CONCURRENCY: usize = 8;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Metatile Server - a metatile rendering cache for raster map tiles.
#[derive(Parser, Debug, Clone)]
#[command(name = "metatile-server")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Resolve a square block of tiles concurrently and report cache behaviour.
    Warm(WarmConfig),

    /// Validate the configuration and print the metatile geometry per zoom.
    Check(CheckConfig),
}

/// Tile geometry and cache options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct TileConfig {
    /// Edge length of a single tile in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "METATILE_TILE_SIZE")]
    pub tile_size: u32,

    /// Metatile size exponent: a metatile covers 2^N x 2^N tiles.
    #[arg(long, default_value_t = DEFAULT_METATILE_EXPONENT, env = "METATILE_EXPONENT")]
    pub metatile_exponent: u8,

    /// Maximum number of metatiles kept in memory.
    #[arg(long, default_value_t = DEFAULT_METATILE_CACHE_CAPACITY, env = "METATILE_CACHE_CAPACITY")]
    pub cache_capacity: usize,
}

impl TileConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_size == 0 || self.tile_size > MAX_METATILE_PIXELS {
            return Err(format!(
                "tile_size must be between 1 and {}",
                MAX_METATILE_PIXELS
            ));
        }

        if self.metatile_exponent > MAX_METATILE_EXPONENT {
            return Err(format!(
                "metatile_exponent must be at most {}",
                MAX_METATILE_EXPONENT
            ));
        }

        if self.cache_capacity == 0 {
            return Err("cache_capacity must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Tile geometry for the tile service.
    pub fn metatile_config(&self) -> MetatileConfig {
        MetatileConfig::new(self.tile_size, self.metatile_exponent)
    }
}

/// Options for the `warm` command.
#[derive(Args, Debug, Clone)]
pub struct WarmConfig {
    #[command(flatten)]
    pub tiles: TileConfig,

    /// Zoom level to warm.
    #[arg(short, long, default_value_t = DEFAULT_WARM_ZOOM)]
    pub zoom: u8,

    /// First tile column.
    #[arg(short, long, default_value_t = 0)]
    pub x: u32,

    /// First tile row.
    #[arg(short, long, default_value_t = 0)]
    pub y: u32,

    /// Number of tiles per axis.
    #[arg(short, long, default_value_t = DEFAULT_WARM_COUNT)]
    pub count: u32,

    /// Number of tile requests in flight at once.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY, env = "METATILE_CONCURRENCY")]
    pub concurrency: usize,

    /// Print the final report as JSON on stdout.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl WarmConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.tiles.validate()?;

        if self.zoom > MAX_ZOOM {
            return Err(format!("zoom must be between 0 and {}", MAX_ZOOM));
        }

        if self.count == 0 {
            return Err("count must be greater than 0".to_string());
        }

        if self.concurrency == 0 {
            return Err("concurrency must be greater than 0".to_string());
        }

        let tiles = tiles_at_zoom(self.zoom);
        let last_x = u64::from(self.x) + u64::from(self.count);
        let last_y = u64::from(self.y) + u64::from(self.count);
        if last_x > tiles || last_y > tiles {
            return Err(format!(
                "tile range {}..{} x {}..{} exceeds the {} tiles per axis at zoom {}",
                self.x, last_x, self.y, last_y, tiles, self.zoom
            ));
        }

        Ok(())
    }

    /// All tile coordinates of the block, row by row.
    pub fn tiles(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.y..self.y + self.count)
            .flat_map(move |y| (self.x..self.x + self.count).map(move |x| (x, y)))
    }
}

/// Options for the `check` command.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    #[command(flatten)]
    pub tiles: TileConfig,

    /// Check a single zoom level instead of the whole pyramid.
    #[arg(short, long)]
    pub zoom: Option<u8>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl CheckConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.tiles.validate()?;

        if let Some(zoom) = self.zoom {
            if zoom > MAX_ZOOM {
                return Err(format!("zoom must be between 0 and {}", MAX_ZOOM));
            }
        }

        Ok(())
    }

    /// Zoom levels to check.
    pub fn zooms(&self) -> Vec<u8> {
        match self.zoom {
            Some(zoom) => vec![zoom],
            None => (0..=MAX_ZOOM).collect(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
