use thiserror::Error;

/// Errors reported by the external map renderer.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// The rendering engine reported a failure
    #[error("renderer failed: {0}")]
    Failed(String),

    /// The rendering thread panicked or was cancelled by the runtime
    #[error("render task aborted: {0}")]
    Aborted(String),
}

/// Errors that terminate the resolution of a single tile request.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Metatile exceeds the hard pixel cap
    #[error("Metatile exceeds {max}x{max} size (requested {width}x{height})")]
    SizeExceeded { width: u32, height: u32, max: u32 },

    /// Computed metatile geometry disagrees with the configured tile size and exponent
    #[error("Metatile has wrong size ({expected} != {width}x{height})")]
    ConfigMismatch { expected: u32, width: u32, height: u32 },

    /// The external renderer failed or returned an unusable image
    #[error("Render failed: {message}")]
    RenderFailed { message: String },

    /// Zoom outside the supported pyramid depth
    #[error("Invalid zoom: {zoom} (supported range: 0-{max})")]
    InvalidZoom { zoom: u8, max: u8 },

    /// Tile coordinates outside the pyramid at this zoom
    #[error("Tile coordinates ({x}, {y}) at zoom {zoom} are out of bounds (max: {max})")]
    TileOutOfBounds { zoom: u8, x: u32, y: u32, max: u32 },
}

impl From<RenderError> for TileError {
    fn from(err: RenderError) -> Self {
        TileError::RenderFailed {
            message: err.to_string(),
        }
    }
}

impl TileError {
    /// Short machine-readable identifier for the error kind.
    ///
    /// Transport bindings use this to pick their own status representation.
    pub fn kind(&self) -> &'static str {
        match self {
            TileError::SizeExceeded { .. } => "size_exceeded",
            TileError::ConfigMismatch { .. } => "config_mismatch",
            TileError::RenderFailed { .. } => "render_failed",
            TileError::InvalidZoom { .. } => "invalid_zoom",
            TileError::TileOutOfBounds { .. } => "tile_out_of_bounds",
        }
    }

    /// Whether the error was caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TileError::InvalidZoom { .. } | TileError::TileOutOfBounds { .. }
        )
    }
}
