//! Renderer interface and metatile geometry.
//!
//! The map engine itself lives outside this crate. It is reached through
//! the [`MapRenderer`] trait, which receives a [`RenderRequest`] describing
//! the bounding box of one metatile in full-resolution pixel space and the
//! output image size.

use image::{Rgba, RgbaImage};

use crate::error::{RenderError, TileError};

use super::coords::{MetatileOrigin, MAX_ZOOM_BITS, WORLD_EXTENT};

/// Hard cap on metatile width and height in pixels.
pub const MAX_METATILE_PIXELS: u32 = 8192;

// =============================================================================
// Render Request
// =============================================================================

/// Bounding box and output size of one metatile render.
///
/// `left`/`top` are inclusive and `right`/`bottom` exclusive, all in the
/// `2^31` full-resolution pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderRequest {
    pub left: u64,
    pub top: u64,
    pub right: u64,
    pub bottom: u64,
    pub zoom: u8,

    /// Output width in pixels
    pub width: u64,

    /// Output height in pixels
    pub height: u64,
}

impl RenderRequest {
    /// Compute the render box of the metatile starting at `origin`.
    ///
    /// The box spans `2^(31 - zoom + size_exponent)` full-resolution units,
    /// capped at the whole world. Edges that would run past the world are
    /// clamped to it, which makes the output smaller than the configured
    /// metatile and is caught by [`validate`](Self::validate).
    pub fn for_metatile(
        origin: &MetatileOrigin,
        zoom: u8,
        size_exponent: u8,
        tile_size: u32,
    ) -> Self {
        let shift = MAX_ZOOM_BITS.saturating_sub(u32::from(zoom));
        let span = 1u64 << (shift + u32::from(size_exponent)).min(MAX_ZOOM_BITS);

        let left = u64::from(origin.left);
        let top = u64::from(origin.top);
        let right = (left + span).min(WORLD_EXTENT);
        let bottom = (top + span).min(WORLD_EXTENT);

        Self {
            left,
            top,
            right,
            bottom,
            zoom,
            width: ((right - left) * u64::from(tile_size)) >> shift,
            height: ((bottom - top) * u64::from(tile_size)) >> shift,
        }
    }

    /// Check the output size against the pixel cap and the configuration.
    ///
    /// # Errors
    ///
    /// - [`TileError::SizeExceeded`] if either side is above [`MAX_METATILE_PIXELS`]
    /// - [`TileError::ConfigMismatch`] if a side differs from `tile_size << size_exponent`,
    ///   or that side is zero or does not fit in 64 bits
    pub fn validate(&self, tile_size: u32, size_exponent: u8) -> Result<(), TileError> {
        let max = u64::from(MAX_METATILE_PIXELS);
        if self.width > max || self.height > max {
            return Err(TileError::SizeExceeded {
                width: saturate(self.width),
                height: saturate(self.height),
                max: MAX_METATILE_PIXELS,
            });
        }

        let expected = metatile_side(tile_size, size_exponent).filter(|&side| side > 0);
        if expected != Some(self.width) || expected != Some(self.height) {
            return Err(TileError::ConfigMismatch {
                expected: expected.map_or(u32::MAX, saturate),
                width: saturate(self.width),
                height: saturate(self.height),
            });
        }

        Ok(())
    }

    /// Output dimensions as `u32`. Only meaningful after [`validate`](Self::validate).
    pub fn dimensions(&self) -> (u32, u32) {
        (saturate(self.width), saturate(self.height))
    }

    /// Number of pyramid tiles covered per axis.
    pub fn tiles_across(&self) -> u64 {
        let shift = MAX_ZOOM_BITS.saturating_sub(u32::from(self.zoom));
        ((self.right - self.left) >> shift).max(1)
    }
}

/// `tile_size << size_exponent`, or `None` when the shift loses bits.
pub(crate) fn metatile_side(tile_size: u32, size_exponent: u8) -> Option<u64> {
    let tile_size = u64::from(tile_size);
    tile_size
        .checked_shl(u32::from(size_exponent))
        .filter(|side| side >> size_exponent == tile_size)
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

// =============================================================================
// Renderer Trait
// =============================================================================

/// The external rendering engine.
///
/// Rendering is a blocking, possibly slow call. The tile service runs it on
/// a blocking thread and never calls it concurrently with itself.
pub trait MapRenderer: Send + Sync + 'static {
    /// Render the requested box into an image of exactly
    /// `request.width × request.height` pixels.
    fn render(&self, request: &RenderRequest) -> Result<RgbaImage, RenderError>;
}

// =============================================================================
// Grid Renderer
// =============================================================================

/// Renderer that paints a checkerboard of tiles with dark borders.
///
/// Colours depend only on the global tile position, so a tile looks the same
/// whatever metatile it was rendered in. Useful for exercising the cache
/// without a map engine.
#[derive(Debug, Clone)]
pub struct GridRenderer {
    light: Rgba<u8>,
    dark: Rgba<u8>,
    border: Rgba<u8>,
}

impl GridRenderer {
    pub fn new() -> Self {
        Self {
            light: Rgba([238, 238, 238, 255]),
            dark: Rgba([196, 214, 232, 255]),
            border: Rgba([80, 80, 80, 255]),
        }
    }
}

impl Default for GridRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MapRenderer for GridRenderer {
    fn render(&self, request: &RenderRequest) -> Result<RgbaImage, RenderError> {
        let (width, height) = request.dimensions();
        if width == 0 || height == 0 {
            return Err(RenderError::Failed(format!(
                "empty render box {}x{}",
                width, height
            )));
        }

        let shift = MAX_ZOOM_BITS.saturating_sub(u32::from(request.zoom));
        let first_column = request.left >> shift;
        let first_row = request.top >> shift;
        let tile_px = (u64::from(width) / request.tiles_across()).max(1);

        let image = RgbaImage::from_fn(width, height, |px, py| {
            let (px, py) = (u64::from(px), u64::from(py));
            let (local_x, local_y) = (px % tile_px, py % tile_px);
            if local_x == 0 || local_y == 0 || local_x == tile_px - 1 || local_y == tile_px - 1 {
                return self.border;
            }

            let column = first_column + px / tile_px;
            let row = first_row + py / tile_px;
            if (column + row) % 2 == 0 {
                self.light
            } else {
                self.dark
            }
        });

        Ok(image)
    }
}
