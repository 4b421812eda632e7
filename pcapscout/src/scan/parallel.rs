use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::num::NonZeroUsize;
use tracing::{debug, trace};

use super::{Kernel, MatchSink, PacketPartition, ScanEngine};
use crate::capture::Capture;
use crate::errors::{ScanError, ScanResult};
use crate::metrics::ScanMetrics;

/// Engine backed by a dedicated rayon pool.
///
/// Small packets are spread over the pool one per task, with that task
/// stepping through the lanes itself. Each large packet is one task that walks
/// its tiles in order, fanning every tile's copy and scan out over the pool.
pub struct ParallelEngine {
    pool: ThreadPool,
    lanes: usize,
    tile_size: usize,
    metrics: ScanMetrics,
}

impl ParallelEngine {
    /// Builds the pool. Any failure to do so is reported as
    /// [`ScanError::DeviceInit`]; there is no fallback.
    pub fn new(
        threads: NonZeroUsize,
        lanes: NonZeroUsize,
        tile_size: usize,
        metrics: ScanMetrics,
    ) -> ScanResult<Self> {
        if tile_size == 0 {
            return Err(ScanError::config_error("tile_size_bytes must be positive"));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.get())
            .thread_name(|i| format!("pcapscout-scan-{}", i))
            .build()
            .map_err(|e| ScanError::device_init(e.to_string()))?;
        debug!(
            "Parallel engine ready: {} threads, {} lanes per group, {}-byte tiles",
            pool.current_num_threads(),
            lanes,
            tile_size
        );

        Ok(Self {
            pool,
            lanes: lanes.get(),
            tile_size,
            metrics,
        })
    }

    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    fn scan_small(&self, capture: &Capture, packets: &[usize], kernel: Kernel<'_>, sink: &MatchSink) {
        packets.par_iter().for_each(|&index| {
            let packet = capture.packet(index);
            for lane in 0..self.lanes {
                kernel.scan_lane(packet, packet.len(), lane, self.lanes, |offset, pattern| {
                    sink.record(index as u32, offset as u32, pattern);
                });
            }
        });
        self.metrics.record_small_packets(packets.len());
    }

    /// Scans one packet tile by tile. A tile owns the start positions
    /// `base..base + tile_len`; its buffer also holds the next
    /// `max_pattern_len - 1` bytes, when the packet has them, so that a match
    /// starting near the end of the tile can be confirmed without touching the
    /// next one.
    fn scan_tiled(&self, capture: &Capture, index: usize, kernel: Kernel<'_>, sink: &MatchSink) {
        let packet = capture.packet(index);
        let overlap = kernel.max_pattern_len().saturating_sub(1);
        let mut buffer = vec![0u8; self.tile_size + overlap];
        let mut base = 0;

        while base < packet.len() {
            let remaining = packet.len() - base;
            let tile_len = self.tile_size.min(remaining);
            let copy_len = (tile_len + overlap).min(remaining);
            let source = &packet[base..base + copy_len];

            // Cooperative copy; the join is the barrier before any lane reads
            let piece = copy_len.div_ceil(self.lanes).max(1);
            buffer[..copy_len]
                .par_chunks_mut(piece)
                .zip(source.par_chunks(piece))
                .for_each(|(dst, src)| dst.copy_from_slice(src));

            let window = &buffer[..copy_len];
            (0..self.lanes).into_par_iter().for_each(|lane| {
                kernel.scan_lane(window, tile_len, lane, self.lanes, |offset, pattern| {
                    sink.record(index as u32, (base + offset) as u32, pattern);
                });
            });

            trace!(
                "Packet {} tile at {}: {} owned bytes, {} copied",
                index,
                base,
                tile_len,
                copy_len
            );
            self.metrics.record_tile(copy_len);
            base += tile_len;
        }
        self.metrics.record_large_packet();
    }
}

impl ScanEngine for ParallelEngine {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn launch(
        &self,
        capture: &Capture,
        partition: &PacketPartition,
        kernel: Kernel<'_>,
        sink: &MatchSink,
    ) {
        self.metrics.record_launch();
        self.pool.install(|| {
            rayon::join(
                || self.scan_small(capture, &partition.small, kernel, sink),
                || {
                    partition
                        .large
                        .par_iter()
                        .for_each(|&index| self.scan_tiled(capture, index, kernel, sink))
                },
            );
        });
    }
}
