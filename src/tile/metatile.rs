//! Rendered metatiles and tile cropping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::{imageops, RgbaImage};

use super::coords::{offset_in_cell, quantize, MetatileKey, MetatileOrigin, MAX_ZOOM_BITS};

/// A rendered block of `2^size_exponent × 2^size_exponent` tiles.
///
/// The image is never modified after construction; only the access stamp
/// changes, and it is an atomic so that readers can touch an entry while
/// holding a shared lock on the cache.
#[derive(Debug)]
pub struct Metatile {
    key: MetatileKey,
    zoom: u8,
    left: u32,
    top: u32,
    size_exponent: u8,
    image: Arc<RgbaImage>,
    last_access: AtomicU64,
}

impl Metatile {
    /// Create a metatile for a rendered image, stamped with `accessed`.
    pub fn new(
        origin: MetatileOrigin,
        zoom: u8,
        size_exponent: u8,
        image: RgbaImage,
        accessed: u64,
    ) -> Self {
        Self {
            key: origin.key,
            zoom,
            left: origin.left,
            top: origin.top,
            size_exponent,
            image: Arc::new(image),
            last_access: AtomicU64::new(accessed),
        }
    }

    pub fn key(&self) -> MetatileKey {
        self.key
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Full-resolution pixel origin `(left, top)`.
    pub fn origin(&self) -> (u32, u32) {
        (self.left, self.top)
    }

    pub fn size_exponent(&self) -> u8 {
        self.size_exponent
    }

    /// Shared handle to the rendered image.
    pub fn image(&self) -> &Arc<RgbaImage> {
        &self.image
    }

    /// Last access stamp, in cache clock units.
    pub fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }

    /// Record an access at `stamp`. Concurrent touches: last write wins.
    pub fn touch_at(&self, stamp: u64) {
        self.last_access.store(stamp, Ordering::Relaxed);
    }

    /// Whether tile `(x, y)` belongs to this metatile's grid cell.
    ///
    /// Only the grid position is compared; the caller is expected to pass
    /// tiles from the same zoom.
    pub fn covers(&self, x: u32, y: u32) -> bool {
        let shift = MAX_ZOOM_BITS - u32::from(self.zoom);
        let cell_left = u64::from(quantize(x, self.size_exponent)) << shift;
        let cell_top = u64::from(quantize(y, self.size_exponent)) << shift;
        cell_left == u64::from(self.left) && cell_top == u64::from(self.top)
    }

    /// Cut tile `(x, y)` out of the metatile image.
    ///
    /// The tile must lie inside this metatile's cell; asking for a tile of
    /// another cell is a caller bug.
    pub fn crop(&self, x: u32, y: u32, tile_size: u32) -> RgbaImage {
        debug_assert!(
            self.covers(x, y),
            "tile ({}, {}) is outside metatile {}",
            x,
            y,
            self.key
        );

        let sub_left = offset_in_cell(x, self.size_exponent);
        let sub_top = offset_in_cell(y, self.size_exponent);

        imageops::crop_imm(
            self.image.as_ref(),
            sub_left * tile_size,
            sub_top * tile_size,
            tile_size,
            tile_size,
        )
        .to_image()
    }
}
