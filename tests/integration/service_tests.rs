//! Tile service integration tests.
//!
//! Tests verify:
//! - A full metatile block triggers exactly one render
//! - Cropped tiles match tiles rendered on their own
//! - Oversized and misconfigured metatiles fail before rendering
//! - Renderer failures surface as RenderFailed

use metatile_server::tile::{
    encode, MetatileConfig, TileAddress, TileRequest, TileService, MAX_ZOOM, WORLD_EXTENT,
};
use metatile_server::TileError;

use super::test_utils::{reference_tile, FailingRenderer, TrackingRenderer};

// =============================================================================
// Single Render per Metatile
// =============================================================================

#[tokio::test]
async fn test_64_tiles_one_render() {
    let renderer = TrackingRenderer::new();
    let service = TileService::new(renderer.clone(), MetatileConfig::new(256, 3));

    let mut hits = 0;
    let mut misses = 0;
    for y in 8..16 {
        for x in 8..16 {
            let response = service.get_tile(TileRequest::new(x, y, 10)).await.unwrap();
            assert_eq!(response.image.dimensions(), (256, 256));
            if response.cache_hit {
                hits += 1;
            } else {
                misses += 1;
            }
        }
    }

    assert_eq!(renderer.call_count(), 1);
    assert_eq!(misses, 1);
    assert_eq!(hits, 63);

    // The one render covered exactly the 8x8 block
    let requests = renderer.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].left, 8 << 21);
    assert_eq!(requests[0].top, 8 << 21);
    assert_eq!(requests[0].right, 16 << 21);
    assert_eq!(requests[0].bottom, 16 << 21);
    assert_eq!(requests[0].dimensions(), (2048, 2048));
    assert_eq!(requests[0].zoom, 10);
}

#[tokio::test]
async fn test_neighbouring_metatile_renders_again() {
    let renderer = TrackingRenderer::new();
    let service = TileService::new(renderer.clone(), MetatileConfig::new(64, 2));

    let a = service.get_tile(TileRequest::new(3, 3, 6)).await.unwrap();
    let b = service.get_tile(TileRequest::new(4, 3, 6)).await.unwrap();

    assert!(!a.cache_hit);
    assert!(!b.cache_hit);
    assert_ne!(a.key, b.key);
    assert_eq!(renderer.call_count(), 2);
}

#[tokio::test]
async fn test_same_position_different_zoom_renders_again() {
    let renderer = TrackingRenderer::new();
    let service = TileService::new(renderer.clone(), MetatileConfig::new(64, 2));

    service.get_tile(TileRequest::new(0, 0, 6)).await.unwrap();
    let other = service.get_tile(TileRequest::new(0, 0, 7)).await.unwrap();

    assert!(!other.cache_hit);
    assert_eq!(renderer.call_count(), 2);
}

// =============================================================================
// Crop Correctness
// =============================================================================

#[tokio::test]
async fn test_cropped_tiles_match_reference() {
    let tile_size = 32;
    let service = TileService::new(TrackingRenderer::new(), MetatileConfig::new(tile_size, 3));

    for (x, y) in [(8, 8), (9, 8), (8, 15), (13, 10), (15, 15)] {
        let tile = service.resolve(TileAddress::new(x, y, 7)).await.unwrap();
        let expected = reference_tile(x, y, 7, tile_size);
        assert_eq!(tile.as_raw(), expected.as_raw(), "tile ({}, {})", x, y);
    }
}

#[tokio::test]
async fn test_world_tile_at_zoom_zero() {
    let service = TileService::new(TrackingRenderer::new(), MetatileConfig::new(128, 0));

    let tile = service.resolve(TileAddress::new(0, 0, 0)).await.unwrap();
    assert_eq!(tile.dimensions(), (128, 128));
    assert_eq!(tile.as_raw(), reference_tile(0, 0, 0, 128).as_raw());
}

#[tokio::test]
async fn test_last_metatile_of_the_world() {
    let renderer = TrackingRenderer::new();
    let service = TileService::new(renderer.clone(), MetatileConfig::new(16, 2));

    let response = service.get_tile(TileRequest::new(63, 63, 6)).await.unwrap();
    assert_eq!(response.image.dimensions(), (16, 16));

    let request = renderer.requests()[0];
    assert_eq!(request.right, WORLD_EXTENT);
    assert_eq!(request.bottom, WORLD_EXTENT);
}

#[tokio::test]
async fn test_max_zoom_tiles() {
    let renderer = TrackingRenderer::new();
    let service = TileService::new(renderer.clone(), MetatileConfig::new(16, 3));
    let last = (1u32 << MAX_ZOOM) - 1;

    let far = service.get_tile(TileRequest::new(last, last, MAX_ZOOM)).await.unwrap();
    let near = service.get_tile(TileRequest::new(0, 0, MAX_ZOOM)).await.unwrap();
    let same_cell = service
        .get_tile(TileRequest::new(last - 7, last - 7, MAX_ZOOM))
        .await
        .unwrap();

    assert_ne!(far.key, near.key);
    assert_eq!(far.key, same_cell.key);
    assert!(same_cell.cache_hit);
    assert_eq!(renderer.call_count(), 2);
}

// =============================================================================
// Validation Before Rendering
// =============================================================================

#[tokio::test]
async fn test_9000px_metatile_is_size_exceeded() {
    let renderer = TrackingRenderer::new();
    let service = TileService::new(renderer.clone(), MetatileConfig::new(9000, 0));

    let result = service.get_tile(TileRequest::new(3, 5, 10)).await;
    match result {
        Err(TileError::SizeExceeded { width, height, max }) => {
            assert_eq!(width, 9000);
            assert_eq!(height, 9000);
            assert_eq!(max, 8192);
        }
        other => panic!("Expected SizeExceeded, got {:?}", other.map(|r| r.key)),
    }

    assert_eq!(renderer.call_count(), 0);
    assert_eq!(service.cache_stats().await.entries, 0);
}

#[tokio::test]
async fn test_oversized_exponent_is_size_exceeded() {
    let renderer = TrackingRenderer::new();
    let service = TileService::new(renderer.clone(), MetatileConfig::new(512, 5));

    let result = service.get_tile(TileRequest::new(0, 0, 12)).await;
    assert!(matches!(result, Err(TileError::SizeExceeded { .. })));
    assert_eq!(renderer.call_count(), 0);
}

#[tokio::test]
async fn test_metatile_larger_than_world_is_config_mismatch() {
    let renderer = TrackingRenderer::new();
    let service = TileService::new(renderer.clone(), MetatileConfig::new(256, 3));

    // Zoom 2 has 4x4 tiles, an 8x8 metatile cannot be rendered at full size
    let result = service.get_tile(TileRequest::new(1, 1, 2)).await;
    match result {
        Err(TileError::ConfigMismatch {
            expected,
            width,
            height,
        }) => {
            assert_eq!(expected, 2048);
            assert_eq!(width, 1024);
            assert_eq!(height, 1024);
        }
        other => panic!("Expected ConfigMismatch, got {:?}", other.map(|r| r.key)),
    }
    assert_eq!(renderer.call_count(), 0);
}

#[tokio::test]
async fn test_invalid_addresses_never_render() {
    let renderer = TrackingRenderer::new();
    let service = TileService::new(renderer.clone(), MetatileConfig::new(64, 1));

    let zoom_err = service.get_tile(TileRequest::new(0, 0, MAX_ZOOM + 1)).await;
    assert!(matches!(zoom_err, Err(TileError::InvalidZoom { .. })));

    let bounds_err = service.get_tile(TileRequest::new(0, 16, 4)).await;
    assert!(matches!(bounds_err, Err(TileError::TileOutOfBounds { .. })));

    assert_eq!(renderer.call_count(), 0);
}

// =============================================================================
// Renderer Failures
// =============================================================================

#[tokio::test]
async fn test_render_failure_is_reported() {
    let renderer = FailingRenderer::new();
    let service = TileService::new(renderer.clone(), MetatileConfig::new(64, 2));

    let result = service.get_tile(TileRequest::new(0, 0, 5)).await;
    match result {
        Err(err @ TileError::RenderFailed { .. }) => {
            assert!(err.to_string().contains("not initialized"));
            assert_eq!(err.kind(), "render_failed");
        }
        other => panic!("Expected RenderFailed, got {:?}", other.map(|r| r.key)),
    }
    assert_eq!(renderer.call_count(), 1);
}

#[tokio::test]
async fn test_render_failure_not_retried_or_cached() {
    let renderer = FailingRenderer::new();
    let service = TileService::new(renderer.clone(), MetatileConfig::new(64, 2));

    for _ in 0..3 {
        assert!(service.get_tile(TileRequest::new(1, 1, 5)).await.is_err());
    }

    // One call per request, no hidden retries
    assert_eq!(renderer.call_count(), 3);
    assert_eq!(service.cache_stats().await.entries, 0);
}

#[tokio::test]
async fn test_response_key_matches_encoder() {
    let service = TileService::new(TrackingRenderer::new(), MetatileConfig::new(64, 2));

    let response = service.get_tile(TileRequest::new(10, 11, 8)).await.unwrap();
    assert_eq!(response.key, encode(10, 11, 8, 2).unwrap().key);
}
