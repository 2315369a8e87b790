//! Metatile rendering and caching.
//!
//! This module turns individual tile requests into a bounded number of
//! metatile renders, keeps the rendered metatiles in memory and cuts single
//! tiles back out of them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             Tile requests               │
//! │            (x, y, zoom)                 │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ coords       │  │ MetatileCache   │  │
//! │  │ (key encode) │  │ (batch evict)   │  │
//! │  └──────────────┘  └─────────────────┘  │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ render lock  │  │ Metatile::crop  │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │        MapRenderer (external)           │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: Main entry point, coordinates lookups, renders and crops
//! - [`MetatileCache`]: Count-bounded cache with batch eviction
//! - [`Metatile`]: A rendered metatile; crops single tiles
//! - [`encode`]: Maps a tile to its [`MetatileKey`] and pixel origin
//! - [`MapRenderer`]: Interface to the rendering engine
//! - [`GridRenderer`]: Built-in checkerboard renderer
//!
//! # Example
//!
//! ```
//! use metatile_server::tile::{encode, TileAddress};
//!
//! // With 8x8 metatiles, tiles (9, 12) and (15, 8) share one render
//! let a = encode(9, 12, 10, 3).unwrap();
//! let b = encode(15, 8, 10, 3).unwrap();
//! assert_eq!(a.key, b.key);
//!
//! assert!(TileAddress::new(1024, 0, 10).validate().is_err());
//! ```

mod cache;
mod coords;
mod metatile;
mod renderer;
mod service;

pub use cache::{MetatileCache, DEFAULT_METATILE_CACHE_CAPACITY};
pub use coords::{
    encode, offset_in_cell, quantize, tiles_at_zoom, MetatileKey, MetatileOrigin, TileAddress,
    MAX_ZOOM, MAX_ZOOM_BITS, WORLD_EXTENT,
};
pub use metatile::Metatile;
pub use renderer::{GridRenderer, MapRenderer, RenderRequest, MAX_METATILE_PIXELS};
pub use service::{
    CacheStats, MetatileConfig, TileRequest, TileResponse, TileService,
    DEFAULT_METATILE_EXPONENT, DEFAULT_TILE_SIZE,
};
