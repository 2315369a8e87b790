//! Tile addressing and metatile key encoding.
//!
//! Tiles live in a standard power-of-two pyramid: at zoom `z` there are
//! `2^z × 2^z` tiles. Every tile is also projected into a fixed
//! full-resolution pixel space of `2^31 × 2^31`, where a tile at zoom `z`
//! spans `2^(31 - z)` units on each side.
//!
//! A metatile groups `2^e × 2^e` neighbouring tiles (`e` is the size
//! exponent). Tile coordinates are floored to the metatile grid and the
//! resulting origin is packed into a single [`MetatileKey`]:
//!
//! ```text
//! key = zoom + (left << (zoom + 5)) + (top << (2 * zoom + 5))
//!
//!  bits: | top (zoom bits) | left (zoom bits) | zero padding | zoom (5) |
//!         2z+36      z+36 z+36            36  35           5 4       0
//! ```
//!
//! `left` and `top` are multiples of `2^(31 - zoom)`, so after the shift
//! they land in disjoint bit ranges. At [`MAX_ZOOM`] the key needs 96 bits,
//! which is why it is stored as a `u128`.

use std::fmt;

use crate::error::TileError;

/// Depth of the full-resolution pixel space (coordinates are `< 2^31`).
pub const MAX_ZOOM_BITS: u32 = 31;

/// Highest zoom level accepted by the encoder.
pub const MAX_ZOOM: u8 = 30;

/// Exclusive upper bound of full-resolution pixel coordinates.
pub const WORLD_EXTENT: u64 = 1 << MAX_ZOOM_BITS;

// =============================================================================
// Tile Address
// =============================================================================

/// A single tile in the pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileAddress {
    /// Column (0-indexed from the west edge)
    pub x: u32,

    /// Row (0-indexed from the north edge)
    pub y: u32,

    /// Zoom level (0 = one tile covers the world)
    pub zoom: u8,
}

impl TileAddress {
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    /// Check zoom and coordinates against the pyramid bounds.
    pub fn validate(&self) -> Result<(), TileError> {
        if self.zoom > MAX_ZOOM {
            return Err(TileError::InvalidZoom {
                zoom: self.zoom,
                max: MAX_ZOOM,
            });
        }

        let tiles = tiles_at_zoom(self.zoom);
        if u64::from(self.x) >= tiles || u64::from(self.y) >= tiles {
            return Err(TileError::TileOutOfBounds {
                zoom: self.zoom,
                x: self.x,
                y: self.y,
                max: (tiles - 1) as u32,
            });
        }

        Ok(())
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Number of tiles per axis at the given zoom.
#[inline]
pub fn tiles_at_zoom(zoom: u8) -> u64 {
    1u64 << zoom.min(MAX_ZOOM)
}

// =============================================================================
// Metatile Key
// =============================================================================

/// Cache key shared by every tile of one metatile.
///
/// Only equality is meaningful. Keys carry no useful ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetatileKey(u128);

impl MetatileKey {
    /// Pack a zoom and a full-resolution pixel origin into a key.
    pub fn new(zoom: u8, left: u32, top: u32) -> Self {
        let zoom_bits = u32::from(zoom);
        let key = u128::from(zoom)
            + (u128::from(left) << (zoom_bits + 5))
            + (u128::from(top) << (2 * zoom_bits + 5));
        Self(key)
    }

    /// Zoom level stored in the low five bits.
    pub fn zoom(&self) -> u8 {
        (self.0 & 0x1F) as u8
    }

    /// Raw key value.
    pub fn value(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for MetatileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Result of mapping a tile onto the metatile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetatileOrigin {
    /// Key shared by all tiles in the cell
    pub key: MetatileKey,

    /// Full-resolution pixel x of the cell origin
    pub left: u32,

    /// Full-resolution pixel y of the cell origin
    pub top: u32,
}

/// Floor a tile coordinate to its metatile grid cell.
#[inline]
pub fn quantize(coord: u32, size_exponent: u8) -> u32 {
    coord
        .checked_shr(u32::from(size_exponent))
        .map_or(0, |cell| cell << size_exponent)
}

/// Offset of a tile inside its metatile grid cell, in tiles.
#[inline]
pub fn offset_in_cell(coord: u32, size_exponent: u8) -> u32 {
    coord - quantize(coord, size_exponent)
}

/// Map a tile address to its metatile key and full-resolution origin.
///
/// # Errors
///
/// Returns [`TileError::InvalidZoom`] above [`MAX_ZOOM`] and
/// [`TileError::TileOutOfBounds`] for coordinates outside the pyramid,
/// instead of letting the shifts wrap.
pub fn encode(x: u32, y: u32, zoom: u8, size_exponent: u8) -> Result<MetatileOrigin, TileError> {
    TileAddress::new(x, y, zoom).validate()?;

    let shift = MAX_ZOOM_BITS - u32::from(zoom);
    let left = to_pixel(quantize(x, size_exponent), shift);
    let top = to_pixel(quantize(y, size_exponent), shift);

    Ok(MetatileOrigin {
        key: MetatileKey::new(zoom, left, top),
        left,
        top,
    })
}

/// Scale a tile coordinate to full resolution, clamped into `[0, 2^31)`.
fn to_pixel(coord: u32, shift: u32) -> u32 {
    let pixel = u64::from(coord) << shift;
    pixel.min(WORLD_EXTENT - 1) as u32
}
