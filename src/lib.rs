//! # Metatile Server
//!
//! A metatile rendering cache for raster map tiles.
//!
//! Rendering a map is expensive and has a large fixed cost per call, so
//! instead of rendering every tile on its own this library renders a
//! square block of neighbouring tiles (a *metatile*) once, keeps it in
//! memory and crops individual tiles out of it.
//!
//! ## Features
//!
//! - **Deterministic keys**: Every tile maps to the key of its enclosing metatile
//! - **Bounded cache**: Count-bounded, with batch eviction of the least recently used half
//! - **Single render per metatile**: Misses are serialized behind one render lock
//! - **Pluggable renderer**: Any engine behind the [`MapRenderer`] trait
//!
//! ## Architecture
//!
//! - [`tile`] - Key encoding, metatile cache, tile service and renderer interface
//! - [`config`] - CLI and configuration types
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```rust
//! use metatile_server::{GridRenderer, MetatileConfig, TileAddress, TileService};
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = TileService::with_cache_capacity(
//!         GridRenderer::new(),
//!         MetatileConfig::new(256, 3),
//!         15,
//!     );
//!
//!     let tile = service.resolve(TileAddress::new(8, 8, 10)).await.unwrap();
//!     assert_eq!(tile.dimensions(), (256, 256));
//! }
//! ```

pub mod config;
pub mod error;
pub mod tile;

// Re-export commonly used types
pub use config::{CheckConfig, Cli, Command, TileConfig, WarmConfig};
pub use error::{RenderError, TileError};
pub use tile::{
    encode, CacheStats, GridRenderer, MapRenderer, Metatile, MetatileCache, MetatileConfig,
    MetatileKey, MetatileOrigin, RenderRequest, TileAddress, TileRequest, TileResponse,
    TileService, DEFAULT_METATILE_CACHE_CAPACITY, DEFAULT_METATILE_EXPONENT, DEFAULT_TILE_SIZE,
    MAX_METATILE_PIXELS, MAX_ZOOM,
};
