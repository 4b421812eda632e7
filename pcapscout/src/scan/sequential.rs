use super::{Kernel, MatchSink, PacketPartition, ScanEngine};
use crate::capture::Capture;
use crate::metrics::ScanMetrics;

/// Single-threaded engine: one cursor per packet, no lanes and no tiling.
///
/// The automaton is run as one streaming pass per packet instead of one walk
/// per start, so it reports end offsets for every output of every state it
/// reaches.
pub struct SequentialEngine {
    metrics: ScanMetrics,
}

impl SequentialEngine {
    pub fn new(metrics: ScanMetrics) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    fn scan_packets(&self, capture: &Capture, packets: &[usize], kernel: Kernel<'_>, sink: &MatchSink) {
        for &index in packets {
            kernel.scan_whole(capture.packet(index), |offset, pattern| {
                sink.record(index as u32, offset as u32, pattern);
            });
        }
    }
}

impl ScanEngine for SequentialEngine {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn launch(
        &self,
        capture: &Capture,
        partition: &PacketPartition,
        kernel: Kernel<'_>,
        sink: &MatchSink,
    ) {
        self.metrics.record_launch();
        self.scan_packets(capture, &partition.small, kernel, sink);
        self.metrics.record_small_packets(partition.small.len());
        self.scan_packets(capture, &partition.large, kernel, sink);
        for _ in &partition.large {
            self.metrics.record_large_packet();
        }
    }
}
