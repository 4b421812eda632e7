//! Launch execution.
//!
//! A launch runs one compiled [`Kernel`] over every packet of a capture and
//! feeds raw matches to a shared [`MatchSink`]. Packets are split once into a
//! small list, scanned whole by one group each, and a large list, scanned one
//! tile at a time through a group-private buffer.
//!
//! Within a group the work is divided between `lanes` cooperating lanes so that
//! every start position belongs to exactly one lane, which is what keeps each
//! occurrence from being reported more than once.

pub mod parallel;
pub mod sequential;
pub mod sink;

use serde::{Deserialize, Serialize};

use crate::capture::Capture;
use crate::config::ScanConfig;
use crate::errors::ScanResult;
use crate::metrics::ScanMetrics;
use crate::patterns::{Automaton, HorspoolPattern};

pub use parallel::ParallelEngine;
pub use sequential::SequentialEngine;
pub use sink::{MatchSink, SinkEntry};

/// Which engine executes launches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Rayon pool with lane-parallel groups and tiling
    #[default]
    Parallel,
    /// One cursor per packet on the calling thread
    Sequential,
}

impl EngineKind {
    /// Builds the engine this kind names from `config`
    pub fn build(self, config: &ScanConfig, metrics: ScanMetrics) -> ScanResult<Box<dyn ScanEngine>> {
        Ok(match self {
            EngineKind::Parallel => Box::new(ParallelEngine::new(
                config.thread_count,
                config.lanes_per_group,
                config.tile_size_bytes,
                metrics,
            )?),
            EngineKind::Sequential => Box::new(SequentialEngine::new(metrics)),
        })
    }
}

/// Packet indices split by length
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketPartition {
    /// Packets shorter than the threshold, in capture order
    pub small: Vec<usize>,
    /// Packets at least as long as the threshold, in capture order
    pub large: Vec<usize>,
}

impl PacketPartition {
    pub fn new(lengths: &[usize], large_threshold: usize) -> Self {
        let (large, small): (Vec<usize>, Vec<usize>) =
            (0..lengths.len()).partition(|&i| lengths[i] >= large_threshold);
        Self { small, large }
    }

    pub fn len(&self) -> usize {
        self.small.len() + self.large.len()
    }

    pub fn is_empty(&self) -> bool {
        self.small.is_empty() && self.large.is_empty()
    }
}

/// What one launch searches for: a single Horspool pattern, or the whole
/// pattern set through the automaton
#[derive(Debug, Clone, Copy)]
pub enum Kernel<'a> {
    Horspool(&'a HorspoolPattern),
    Automaton(&'a Automaton),
}

impl Kernel<'_> {
    /// Bytes a match may read past its start position
    pub fn max_pattern_len(&self) -> usize {
        match self {
            Kernel::Horspool(p) => p.len(),
            Kernel::Automaton(a) => a.max_pattern_len(),
        }
    }

    /// Scans the start positions `lane` owns among `0..start_limit` of
    /// `window`, calling `emit(raw_offset, pattern_id)` per match. The raw
    /// offset is a start offset for Horspool and an end offset for the
    /// automaton, both relative to `window`.
    ///
    /// Horspool lanes own one contiguous range each, so Horspool's shifts stay
    /// useful. Automaton lanes own every `lanes`-th start, beginning at `lane`.
    /// Either way a lane may read past its last start to finish a comparison.
    pub fn scan_lane(
        &self,
        window: &[u8],
        start_limit: usize,
        lane: usize,
        lanes: usize,
        mut emit: impl FnMut(usize, u32),
    ) {
        let start_limit = start_limit.min(window.len());
        match self {
            Kernel::Horspool(p) => {
                let chunk = start_limit.div_ceil(lanes).max(1);
                let first = lane * chunk;
                if first >= start_limit {
                    return;
                }
                let id = p.id();
                p.scan_range(window, first..(first + chunk).min(start_limit), |at| {
                    emit(at, id)
                });
            }
            Kernel::Automaton(a) => {
                for start in (lane..start_limit).step_by(lanes) {
                    a.walk_from(window, start, &mut emit);
                }
            }
        }
    }

    /// Scans all of `window` with a single cursor
    pub fn scan_whole(&self, window: &[u8], mut emit: impl FnMut(usize, u32)) {
        match self {
            Kernel::Horspool(p) => {
                let id = p.id();
                p.scan_range(window, 0..window.len(), |at| emit(at, id));
            }
            Kernel::Automaton(a) => a.scan_stream(window, emit),
        }
    }
}

/// Executes launches. A launch blocks until every match it found has been
/// handed to the sink.
pub trait ScanEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn launch(
        &self,
        capture: &Capture,
        partition: &PacketPartition,
        kernel: Kernel<'_>,
        sink: &MatchSink,
    );
}
