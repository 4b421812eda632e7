//! Scan output types.
//!
//! Engines hand back raw offsets whose meaning depends on the kernel that
//! produced them. By the time anything lands in a [`ScanReport`] every offset
//! has been normalized to the start of the match, so reports from different
//! strategies and engines can be compared directly.
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::capture::CaptureInfo;
use crate::metrics::ScanStats;
use crate::patterns::Strategy;

/// One occurrence of one pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MatchEntry {
    /// Index of the packet in capture order
    pub packet_id: u32,
    /// Offset of the first matched byte within the packet payload
    pub offset: u32,
    pub pattern_id: u32,
}

impl MatchEntry {
    pub fn new(packet_id: u32, offset: u32, pattern_id: u32) -> Self {
        Self {
            packet_id,
            offset,
            pattern_id,
        }
    }
}

/// Everything one scan produced.
///
/// `matches` is in no particular order; see [`ScanReport::sort_matches`].
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub matches: Vec<MatchEntry>,
    pub strategy: Strategy,
    pub engine: &'static str,
    pub pattern_count: usize,
    pub packets_scanned: usize,
    pub bytes_scanned: usize,
    pub small_packets: usize,
    pub large_packets: usize,
    pub tiles_processed: u64,
    /// Launches run: one per pattern for Horspool, one for the automaton
    pub passes: usize,
    /// Matches counted by the engines, including those the sink had no room for
    pub matches_found: u64,
    /// Matches actually stored, equal to `matches.len()`
    pub matches_recorded: u64,
    /// Stored matches per pattern id
    pub per_pattern_recorded: Vec<u64>,
    /// Present when the capture came from a file or buffer
    pub capture: Option<CaptureInfo>,
    pub stats: ScanStats,
    pub load_time: Duration,
    pub search_time: Duration,
}

impl ScanReport {
    /// Matches as a set, for order-independent comparison
    pub fn match_set(&self) -> BTreeSet<MatchEntry> {
        self.matches.iter().copied().collect()
    }

    /// Sorts by packet, then offset, then pattern id
    pub fn sort_matches(&mut self) {
        self.matches.sort_unstable();
    }

    pub fn overflowed(&self) -> bool {
        self.matches_found > self.matches_recorded
    }

    pub fn matches_for_pattern(&self, pattern_id: u32) -> impl Iterator<Item = &MatchEntry> + '_ {
        self.matches
            .iter()
            .filter(move |m| m.pattern_id == pattern_id)
    }

    /// Bytes scanned per second of search time, load time excluded
    pub fn throughput_mib_per_sec(&self) -> f64 {
        let secs = self.search_time.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes_scanned as f64 / (1024.0 * 1024.0) / secs
    }
}
