//! Concurrency integration tests.
//!
//! Tests verify:
//! - Concurrent requests into one metatile render it once
//! - Misses on different metatiles never render in parallel
//! - Concurrent readers get identical crops
//! - Cache hits are served while a render is in flight

use std::sync::Arc;
use std::time::{Duration, Instant};

use metatile_server::tile::{MetatileConfig, TileRequest, TileService};

use super::test_utils::{reference_tile, TrackingRenderer};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_same_metatile_render_once() {
    let renderer = TrackingRenderer::new().with_delay(Duration::from_millis(50));
    let service = Arc::new(TileService::new(renderer.clone(), MetatileConfig::new(32, 3)));

    let mut handles = Vec::new();
    for x in 8..16 {
        for y in 8..16 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service.get_tile(TileRequest::new(x, y, 9)).await
            }));
        }
    }

    let mut misses = 0;
    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        if !response.cache_hit {
            misses += 1;
        }
    }

    assert_eq!(renderer.call_count(), 1);
    assert_eq!(misses, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_misses_on_distinct_metatiles_are_serialized() {
    let renderer = TrackingRenderer::new().with_delay(Duration::from_millis(20));
    let service = Arc::new(TileService::new(renderer.clone(), MetatileConfig::new(16, 1)));

    let mut handles = Vec::new();
    for i in 0..8u32 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.get_tile(TileRequest::new(i * 2, 0, 6)).await
        }));
    }

    for handle in handles {
        assert!(!handle.await.unwrap().unwrap().cache_hit);
    }

    assert_eq!(renderer.call_count(), 8);
    assert_eq!(renderer.max_in_flight(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_get_consistent_tiles() {
    let tile_size = 16;
    let service = Arc::new(TileService::new(
        TrackingRenderer::new(),
        MetatileConfig::new(tile_size, 2),
    ));

    // Warm the metatile first so every task hits
    service.get_tile(TileRequest::new(4, 4, 5)).await.unwrap();

    let mut handles = Vec::new();
    for round in 0..32u32 {
        let service = Arc::clone(&service);
        let (x, y) = (4 + round % 4, 4 + (round / 4) % 4);
        handles.push(tokio::spawn(async move {
            let response = service.get_tile(TileRequest::new(x, y, 5)).await.unwrap();
            (x, y, response)
        }));
    }

    for handle in handles {
        let (x, y, response) = handle.await.unwrap();
        assert!(response.cache_hit);
        assert_eq!(
            response.image.as_raw(),
            reference_tile(x, y, 5, tile_size).as_raw()
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_with_eviction() {
    let renderer = TrackingRenderer::new();
    let service = Arc::new(TileService::with_cache_capacity(
        renderer.clone(),
        MetatileConfig::new(8, 0),
        5,
    ));

    let mut handles = Vec::new();
    for i in 0..40u32 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.get_tile(TileRequest::new(i % 20, i / 20, 6)).await
        }));
    }

    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.image.dimensions(), (8, 8));
    }

    let stats = service.cache_stats().await;
    assert!(stats.entries <= 5);
    assert_eq!(stats.renders as usize, renderer.call_count());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hit_not_blocked_by_render_in_flight() {
    let render_time = Duration::from_millis(500);
    let renderer = TrackingRenderer::new().with_delay_on_zoom(6, render_time);
    let service = Arc::new(TileService::new(renderer.clone(), MetatileConfig::new(16, 2)));

    // Cached metatile at zoom 5
    service.get_tile(TileRequest::new(0, 0, 5)).await.unwrap();

    let slow = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.get_tile(TileRequest::new(0, 0, 6)).await })
    };

    // Wait until the zoom 6 render holds the lock
    let waiting = Instant::now();
    while renderer.in_flight() == 0 {
        assert!(waiting.elapsed() < render_time, "render never started");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let started = Instant::now();
    let hit = service.get_tile(TileRequest::new(1, 1, 5)).await.unwrap();
    let took = started.elapsed();

    assert!(hit.cache_hit);
    assert!(took < render_time / 5, "hit took {:?}", took);
    assert!(!slow.is_finished());

    assert!(!slow.await.unwrap().unwrap().cache_hit);
    assert_eq!(renderer.call_count(), 2);
}
