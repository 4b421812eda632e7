use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::capture::Capture;
use crate::config::ScanConfig;
use crate::errors::ScanResult;
use crate::metrics::ScanMetrics;
use crate::patterns::{CompiledPatterns, PatternCompiler, PatternSet};
use crate::results::{MatchEntry, ScanReport};
use crate::scan::{Kernel, MatchSink, SinkEntry};

/// Runs whole scans: load, compile, launch, collect.
#[derive(Debug, Clone, Default)]
pub struct Driver {
    config: ScanConfig,
}

/// Running totals over the passes of one scan
struct Passes {
    matches: Vec<MatchEntry>,
    found: u64,
    per_pattern: Vec<u64>,
    count: usize,
}

impl Passes {
    fn new(pattern_count: usize) -> Self {
        Self {
            matches: Vec::new(),
            found: 0,
            per_pattern: vec![0; pattern_count],
            count: 0,
        }
    }

    /// Folds one drained pass in, turning raw offsets into start offsets
    fn absorb(&mut self, found: u64, entries: Vec<SinkEntry>, start_of: impl Fn(&SinkEntry) -> u32) {
        self.count += 1;
        self.found += found;
        self.matches.reserve(entries.len());
        for entry in &entries {
            self.per_pattern[entry.pattern as usize] += 1;
            self.matches
                .push(MatchEntry::new(entry.packet, start_of(entry), entry.pattern));
        }
        debug!(
            "Pass {}: {} found, {} recorded",
            self.count,
            found,
            entries.len()
        );
    }
}

impl Driver {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Decodes and validates the configured patterns
    pub fn patterns(&self) -> ScanResult<PatternSet> {
        PatternSet::from_escaped(&self.config.patterns)
    }

    /// Loads `path` and scans it for `patterns`. Load time is measured
    /// separately and is not part of the search time.
    pub fn run(&self, path: &Path, patterns: &PatternSet) -> ScanResult<ScanReport> {
        self.config.validate()?;

        let start = Instant::now();
        let capture = Capture::load(path)?;
        let load_time = start.elapsed();

        let mut report = self.run_capture(&capture, patterns)?;
        report.load_time = load_time;
        Ok(report)
    }

    /// Scans a capture that is already loaded
    pub fn run_capture(&self, capture: &Capture, patterns: &PatternSet) -> ScanResult<ScanReport> {
        self.config.validate()?;
        info!(
            "Scanning {} packets ({} bytes) for {} patterns",
            capture.len(),
            capture.total_bytes(),
            patterns.len()
        );

        let metrics = ScanMetrics::new();
        let engine = self.config.engine.build(&self.config, metrics.clone())?;
        let compiled = PatternCompiler::new(self.config.pattern_count_threshold, self.config.strategy)
            .compile(patterns);
        let partition = capture.partition(self.config.large_packet_threshold_bytes);
        debug!(
            "{} small and {} large packets at threshold {}",
            partition.small.len(),
            partition.large.len(),
            self.config.large_packet_threshold_bytes
        );

        let mut sink = MatchSink::with_capacity(self.config.output_capacity);
        let mut passes = Passes::new(patterns.len());

        let started = Instant::now();
        match &compiled {
            CompiledPatterns::Horspool(tables) => {
                for table in tables {
                    engine.launch(capture, &partition, Kernel::Horspool(table), &sink);
                    let (found, entries) = sink.drain();
                    passes.absorb(found, entries, |e| e.offset);
                }
            }
            CompiledPatterns::Automaton(automaton) => {
                engine.launch(capture, &partition, Kernel::Automaton(automaton), &sink);
                let (found, entries) = sink.drain();
                passes.absorb(found, entries, |e| {
                    e.offset - automaton.pattern_len(e.pattern) as u32
                });
            }
        }
        let search_time = started.elapsed();
        metrics.log_stats();

        let recorded = passes.matches.len() as u64;
        if passes.found > recorded {
            warn!(
                "Match buffer full: {} matches found, only {} recorded (capacity {} per pass)",
                passes.found, recorded, self.config.output_capacity
            );
        }
        info!(
            "Scan complete in {:?}: {} matches over {} passes",
            search_time, passes.found, passes.count
        );

        let stats = metrics.get_stats();
        Ok(ScanReport {
            matches: passes.matches,
            strategy: compiled.strategy(),
            engine: engine.name(),
            pattern_count: patterns.len(),
            packets_scanned: capture.len(),
            bytes_scanned: capture.total_bytes(),
            small_packets: partition.small.len(),
            large_packets: partition.large.len(),
            tiles_processed: stats.tiles,
            passes: passes.count,
            matches_found: passes.found,
            matches_recorded: recorded,
            per_pattern_recorded: passes.per_pattern,
            capture: Some(capture.info().clone()),
            stats,
            load_time: Duration::ZERO,
            search_time,
        })
    }
}

/// Scans `capture` for `patterns` with the default configuration
pub fn scan_capture(capture: &Capture, patterns: &PatternSet) -> ScanResult<ScanReport> {
    Driver::default().run_capture(capture, patterns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{Strategy, StrategyChoice};
    use crate::scan::EngineKind;

    fn scenario_a() -> (Capture, PatternSet) {
        (
            Capture::from_packets([&b"AAAABBBBCCCC"[..], &b"XXXXAAAAYYYY"[..], &b"ZZZZ"[..]]),
            PatternSet::from_escaped(&["AAAA", "ZZZZ"]).unwrap(),
        )
    }

    #[test]
    fn test_scenario_a() {
        let (capture, patterns) = scenario_a();
        let mut report = scan_capture(&capture, &patterns).unwrap();
        report.sort_matches();

        assert_eq!(
            report.matches,
            vec![
                MatchEntry::new(0, 0, 0),
                MatchEntry::new(1, 4, 0),
                MatchEntry::new(2, 0, 1),
            ]
        );
        assert_eq!(report.matches_recorded, 3);
        assert_eq!(report.matches_found, 3);
        assert_eq!(report.strategy, Strategy::Horspool);
        assert_eq!(report.passes, 2);
        assert_eq!(report.per_pattern_recorded, vec![2, 1]);
        assert_eq!(report.engine, "parallel");
    }

    #[test]
    fn test_automaton_offsets_are_starts() {
        let (capture, patterns) = scenario_a();
        for engine in [EngineKind::Parallel, EngineKind::Sequential] {
            let driver = Driver::new(ScanConfig {
                strategy: StrategyChoice::Automaton,
                engine,
                ..ScanConfig::default()
            });
            let report = driver.run_capture(&capture, &patterns).unwrap();
            assert_eq!(report.strategy, Strategy::Automaton);
            assert_eq!(report.passes, 1);
            assert!(report.match_set().contains(&MatchEntry::new(1, 4, 0)));
            assert!(report.match_set().contains(&MatchEntry::new(2, 0, 1)));
        }
    }

    #[test]
    fn test_overflow_is_reported_not_an_error() {
        let capture = Capture::from_packets([vec![b'a'; 100]]);
        let patterns = PatternSet::from_escaped(&["a"]).unwrap();
        let driver = Driver::new(ScanConfig {
            output_capacity: 10,
            ..ScanConfig::default()
        });

        let report = driver.run_capture(&capture, &patterns).unwrap();
        assert_eq!(report.matches_found, 100);
        assert_eq!(report.matches_recorded, 10);
        assert_eq!(report.matches.len(), 10);
        assert!(report.overflowed());
    }

    #[test]
    fn test_invalid_config_rejected_before_scanning() {
        let (capture, patterns) = scenario_a();
        let driver = Driver::new(ScanConfig {
            tile_size_bytes: 0,
            ..ScanConfig::default()
        });
        assert!(driver.run_capture(&capture, &patterns).is_err());
    }

    #[test]
    fn test_configured_patterns() {
        let driver = Driver::new(ScanConfig {
            patterns: vec![r"\x41\x41".to_string(), String::new()],
            ..ScanConfig::default()
        });
        let patterns = driver.patterns().unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns.get(0).unwrap().bytes, b"AA");
    }
}
