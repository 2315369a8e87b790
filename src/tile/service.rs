//! Tile Service for resolving tiles out of cached metatiles.
//!
//! The TileService is the main entry point for tile requests. It orchestrates:
//! - Address validation and metatile key encoding
//! - Cache lookups
//! - Metatile rendering on a miss
//! - Result caching and tile cropping
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                             │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    get_tile()                           │    │
//! │  │  1. Encode address    4. Validate geometry              │    │
//! │  │  2. Check cache       5. Render metatile (blocking)     │    │
//! │  │  3. Take render lock  6. Cache, crop & return           │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │   ┌───────────────┐   ┌──────────────┐     ┌──────────────┐     │
//! │   │ MetatileCache │   │  Render lock │     │ MapRenderer  │     │
//! │   └───────────────┘   └──────────────┘     └──────────────┘     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Concurrency
//!
//! Hits only take the cache's read lock. Every miss, whatever its key, goes
//! through one service-wide mutex covering render, validation and insertion.
//! This keeps the renderer single-threaded and the eviction scan free of
//! races, but it also means a slow render stalls all other misses: the
//! miss rate the service can absorb is bounded by the renderer's latency.
//! There is no timeout on the render call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use image::RgbaImage;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{RenderError, TileError};

use super::cache::MetatileCache;
use super::coords::{encode, MetatileKey, MetatileOrigin, TileAddress, MAX_ZOOM};
use super::metatile::Metatile;
use super::renderer::{metatile_side, MapRenderer, RenderRequest};

/// Default edge length of a single tile in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Default metatile size exponent (8x8 tiles per metatile).
pub const DEFAULT_METATILE_EXPONENT: u8 = 3;

// =============================================================================
// Metatile Configuration
// =============================================================================

/// Tile geometry, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetatileConfig {
    /// Edge length of one tile in pixels
    pub tile_size: u32,

    /// A metatile covers `2^size_exponent` tiles per axis
    pub size_exponent: u8,
}

impl MetatileConfig {
    pub fn new(tile_size: u32, size_exponent: u8) -> Self {
        Self {
            tile_size,
            size_exponent,
        }
    }

    /// Edge length of a full metatile in pixels, saturating at `u64::MAX`.
    pub fn metatile_pixels(&self) -> u64 {
        metatile_side(self.tile_size, self.size_exponent).unwrap_or(u64::MAX)
    }
}

impl Default for MetatileConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_SIZE, DEFAULT_METATILE_EXPONENT)
    }
}

// =============================================================================
// Tile Request / Response
// =============================================================================

/// A request for a tile.
#[derive(Debug, Clone, Copy)]
pub struct TileRequest {
    /// Tile X coordinate
    pub x: u32,

    /// Tile Y coordinate
    pub y: u32,

    /// Zoom level
    pub zoom: u8,
}

impl TileRequest {
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    pub fn address(&self) -> TileAddress {
        TileAddress::new(self.x, self.y, self.zoom)
    }
}

impl From<TileAddress> for TileRequest {
    fn from(address: TileAddress) -> Self {
        Self::new(address.x, address.y, address.zoom)
    }
}

/// Response from the tile service.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// The cropped tile, `tile_size × tile_size`
    pub image: RgbaImage,

    /// Whether the metatile was already cached
    pub cache_hit: bool,

    /// Key of the metatile the tile was cut from
    pub key: MetatileKey,
}

/// Snapshot of cache usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Metatiles currently cached
    pub entries: usize,

    /// Maximum number of cached metatiles
    pub capacity: usize,

    /// Renderer invocations since the service was created
    pub renders: u64,
}

// =============================================================================
// Tile Service
// =============================================================================

/// Service resolving tiles through a metatile cache.
///
/// # Type Parameters
///
/// * `R` - The map renderer
///
/// # Example
///
/// ```
/// use metatile_server::tile::{GridRenderer, MetatileConfig, TileRequest, TileService};
///
/// #[tokio::main]
/// async fn main() {
///     let service = TileService::new(GridRenderer::new(), MetatileConfig::new(256, 3));
///
///     let first = service.get_tile(TileRequest::new(8, 8, 10)).await.unwrap();
///     let second = service.get_tile(TileRequest::new(9, 8, 10)).await.unwrap();
///
///     assert!(!first.cache_hit);
///     assert!(second.cache_hit);
///     assert_eq!(second.image.dimensions(), (256, 256));
/// }
/// ```
pub struct TileService<R: MapRenderer> {
    renderer: Arc<R>,

    cache: MetatileCache,

    /// Serializes every miss: render, validation and insertion
    render_lock: Mutex<()>,

    config: MetatileConfig,

    renders: AtomicU64,
}

impl<R: MapRenderer> TileService<R> {
    /// Create a new tile service with the default cache capacity.
    pub fn new(renderer: R, config: MetatileConfig) -> Self {
        Self::with_shared_renderer(Arc::new(renderer), config, MetatileCache::new())
    }

    /// Create a new tile service holding at most `capacity` metatiles.
    pub fn with_cache_capacity(renderer: R, config: MetatileConfig, capacity: usize) -> Self {
        Self::with_shared_renderer(
            Arc::new(renderer),
            config,
            MetatileCache::with_capacity(capacity),
        )
    }

    /// Create a new tile service around a renderer shared with other components.
    pub fn with_shared_renderer(
        renderer: Arc<R>,
        config: MetatileConfig,
        cache: MetatileCache,
    ) -> Self {
        Self {
            renderer,
            cache,
            render_lock: Mutex::new(()),
            config,
            renders: AtomicU64::new(0),
        }
    }

    /// Resolve a tile to its pixels.
    pub async fn resolve(&self, address: TileAddress) -> Result<RgbaImage, TileError> {
        Ok(self.get_tile(TileRequest::from(address)).await?.image)
    }

    /// Get a tile, rendering its metatile if it is not cached.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The zoom or coordinates are outside the pyramid
    /// - The metatile is larger than the pixel cap (`SizeExceeded`)
    /// - The metatile geometry disagrees with the configuration (`ConfigMismatch`)
    /// - The renderer fails (`RenderFailed`)
    pub async fn get_tile(&self, request: TileRequest) -> Result<TileResponse, TileError> {
        let MetatileConfig {
            tile_size,
            size_exponent,
        } = self.config;

        let origin = encode(request.x, request.y, request.zoom, size_exponent)?;

        let (metatile, cache_hit) = match self.cache.get(&origin.key).await {
            Some(metatile) => {
                self.cache.touch(&metatile);
                (metatile, true)
            }
            None => self.render_metatile(request.zoom, origin).await?,
        };

        Ok(TileResponse {
            image: metatile.crop(request.x, request.y, tile_size),
            cache_hit,
            key: origin.key,
        })
    }

    /// Miss path, run under the render lock.
    ///
    /// Returns the metatile and whether it turned out to be cached after all.
    async fn render_metatile(
        &self,
        zoom: u8,
        origin: MetatileOrigin,
    ) -> Result<(Arc<Metatile>, bool), TileError> {
        let _guard = self.render_lock.lock().await;

        // Rendered by another request while we waited for the lock
        if let Some(metatile) = self.cache.get(&origin.key).await {
            self.cache.touch(&metatile);
            return Ok((metatile, true));
        }

        let MetatileConfig {
            tile_size,
            size_exponent,
        } = self.config;

        let request = RenderRequest::for_metatile(&origin, zoom, size_exponent, tile_size);
        request.validate(tile_size, size_exponent)?;

        let started = Instant::now();
        self.renders.fetch_add(1, Ordering::Relaxed);

        let renderer = Arc::clone(&self.renderer);
        let image = tokio::task::spawn_blocking(move || renderer.render(&request))
            .await
            .map_err(|e| RenderError::Aborted(e.to_string()))??;

        let (width, height) = request.dimensions();
        if image.dimensions() != (width, height) {
            return Err(TileError::RenderFailed {
                message: format!(
                    "renderer returned {}x{} image, expected {}x{}",
                    image.width(),
                    image.height(),
                    width,
                    height
                ),
            });
        }

        debug!(
            left = origin.left,
            top = origin.top,
            zoom,
            width,
            height,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Rendered metatile"
        );

        let metatile = Arc::new(Metatile::new(
            origin,
            zoom,
            size_exponent,
            image,
            self.cache.now(),
        ));
        self.cache.put(Arc::clone(&metatile)).await;

        Ok((metatile, false))
    }

    /// Compute and validate the metatile geometry at `zoom` without rendering.
    pub fn check_geometry(&self, zoom: u8) -> Result<RenderRequest, TileError> {
        if zoom > MAX_ZOOM {
            return Err(TileError::InvalidZoom {
                zoom,
                max: MAX_ZOOM,
            });
        }

        let MetatileConfig {
            tile_size,
            size_exponent,
        } = self.config;

        let origin = encode(0, 0, zoom, size_exponent)?;
        let request = RenderRequest::for_metatile(&origin, zoom, size_exponent, tile_size);
        request.validate(tile_size, size_exponent)?;
        Ok(request)
    }

    /// Get cache statistics.
    pub async fn cache_stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.len().await,
            capacity: self.cache.capacity(),
            renders: self.render_count(),
        }
    }

    /// Number of renderer invocations so far.
    pub fn render_count(&self) -> u64 {
        self.renders.load(Ordering::Relaxed)
    }

    /// Clear the metatile cache.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    pub fn config(&self) -> MetatileConfig {
        self.config
    }

    /// Get a reference to the underlying renderer.
    pub fn renderer(&self) -> &Arc<R> {
        &self.renderer
    }
}

// =============================================================================
// Tests
// =============================================================================
