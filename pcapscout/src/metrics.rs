use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Counters shared by the engines of one run.
///
/// Clones share the same counters, so the driver keeps one handle and hands
/// another to the engine it builds.
#[derive(Debug, Clone)]
pub struct ScanMetrics {
    launches: Arc<AtomicU64>,
    small_packets: Arc<AtomicU64>,
    large_packets: Arc<AtomicU64>,
    tiles: Arc<AtomicU64>,
    tile_bytes: Arc<AtomicU64>,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self {
            launches: Arc::new(AtomicU64::new(0)),
            small_packets: Arc::new(AtomicU64::new(0)),
            large_packets: Arc::new(AtomicU64::new(0)),
            tiles: Arc::new(AtomicU64::new(0)),
            tile_bytes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn record_launch(&self) {
        let total = self.launches.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Launch {} started", total);
    }

    /// Records packets scanned whole, without tiling
    pub fn record_small_packets(&self, count: usize) {
        self.small_packets
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Records one packet scanned tile by tile
    pub fn record_large_packet(&self) {
        self.large_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one tile, `bytes` being what was copied into the tile buffer
    /// including the overlap
    pub fn record_tile(&self, bytes: usize) {
        self.tiles.fetch_add(1, Ordering::Relaxed);
        self.tile_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> ScanStats {
        ScanStats {
            launches: self.launches.load(Ordering::Relaxed),
            small_packets: self.small_packets.load(Ordering::Relaxed),
            large_packets: self.large_packets.load(Ordering::Relaxed),
            tiles: self.tiles.load(Ordering::Relaxed),
            tile_bytes: self.tile_bytes.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Scan stats:\n\
             Launches: {}\n\
             Packets scanned (small/large): {}/{}\n\
             Tiles: {} ({} bytes copied)",
            stats.launches,
            stats.small_packets,
            stats.large_packets,
            stats.tiles,
            stats.tile_bytes
        );
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of [`ScanMetrics`]; packet counts add up over every launch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub launches: u64,
    pub small_packets: u64,
    pub large_packets: u64,
    pub tiles: u64,
    pub tile_bytes: u64,
}
