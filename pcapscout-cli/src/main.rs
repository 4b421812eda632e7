use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use pcapscout::config::{
    DEFAULT_LARGE_PACKET_THRESHOLD, DEFAULT_OUTPUT_CAPACITY, DEFAULT_PATTERN_COUNT_THRESHOLD,
    DEFAULT_TILE_SIZE,
};
use pcapscout::{Driver, EngineKind, PatternSet, ScanConfig, ScanReport, StrategyChoice};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Capture file to search (classic pcap or pcapng)
    capture: PathBuf,

    /// Pattern to search for (can be specified multiple times).
    /// \xHH, \n, \r and \t escapes are decoded.
    #[arg(short = 's', long = "search")]
    patterns: Vec<String>,

    /// Packets at least this many bytes long are scanned in tiles
    #[arg(long, default_value_t = DEFAULT_LARGE_PACKET_THRESHOLD)]
    large_threshold: usize,

    /// Tile size for large packets
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE)]
    tile_bytes: usize,

    /// Matches stored per pass; further matches are only counted
    #[arg(long, default_value_t = DEFAULT_OUTPUT_CAPACITY)]
    max_matches: usize,

    /// Largest pattern count searched with per-pattern Horspool tables
    #[arg(long, default_value_t = DEFAULT_PATTERN_COUNT_THRESHOLD)]
    bmh_max_patterns: usize,

    /// Force a search strategy
    #[arg(long, value_enum, default_value_t = CliStrategy::Auto)]
    strategy: CliStrategy,

    /// Engine that runs the search
    #[arg(long, value_enum, default_value_t = CliEngine::Parallel)]
    engine: CliEngine,

    /// Number of threads to use
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Configuration file, layered over the global and local ones
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print every recorded match
    #[arg(long)]
    list: bool,

    /// Print the full report as JSON
    #[arg(long, conflicts_with = "list")]
    json: bool,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliStrategy {
    Auto,
    Horspool,
    Automaton,
}

impl From<CliStrategy> for StrategyChoice {
    fn from(s: CliStrategy) -> Self {
        match s {
            CliStrategy::Auto => StrategyChoice::Auto,
            CliStrategy::Horspool => StrategyChoice::Horspool,
            CliStrategy::Automaton => StrategyChoice::Automaton,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CliEngine {
    Parallel,
    Sequential,
}

impl From<CliEngine> for EngineKind {
    fn from(e: CliEngine) -> Self {
        match e {
            CliEngine::Parallel => EngineKind::Parallel,
            CliEngine::Sequential => EngineKind::Sequential,
        }
    }
}

impl Cli {
    fn scan_config(&self) -> ScanConfig {
        let defaults = ScanConfig::default();
        ScanConfig {
            patterns: self.patterns.clone(),
            large_packet_threshold_bytes: self.large_threshold,
            tile_size_bytes: self.tile_bytes,
            output_capacity: self.max_matches,
            pattern_count_threshold: self.bmh_max_patterns,
            thread_count: self.threads.unwrap_or(defaults.thread_count),
            strategy: self.strategy.into(),
            engine: self.engine.into(),
            log_level: if self.verbose {
                "debug".to_string()
            } else {
                defaults.log_level.clone()
            },
            ..defaults
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_config = ScanConfig::load_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let config = file_config.merge_with_cli(cli.scan_config());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let driver = Driver::new(config);
    debug!("Effective configuration: {:?}", driver.config());
    let patterns = driver.patterns()?;
    let mut report = driver.run(&cli.capture, &patterns)?;
    report.sort_matches();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let file_size = std::fs::metadata(&cli.capture)
        .with_context(|| format!("Cannot stat {}", cli.capture.display()))?
        .len();
    print_summary(&cli.capture, file_size, &patterns, &report);
    if cli.list {
        print_matches(&patterns, &report);
    }
    Ok(())
}

fn print_summary(path: &Path, file_size: u64, patterns: &PatternSet, report: &ScanReport) {
    println!("{}", "Scan summary".bold());
    println!("  File:        {} ({} bytes)", path.display().to_string().blue(), file_size);
    println!(
        "  Packets:     {} ({} small, {} large, {} tiles)",
        report.packets_scanned, report.small_packets, report.large_packets, report.tiles_processed
    );
    println!(
        "  Patterns:    {} ({:?}, {} engine, {} passes)",
        patterns.len(),
        report.strategy,
        report.engine,
        report.passes
    );
    println!("  Load time:   {}", humantime::format_duration(report.load_time));
    println!("  Search time: {}", humantime::format_duration(report.search_time));
    println!("  Throughput:  {:.2} MiB/s", report.throughput_mib_per_sec());
    println!(
        "  Matches:     {} found, {} recorded",
        report.matches_found.to_string().green(),
        report.matches_recorded
    );
    if report.overflowed() {
        println!(
            "  {}",
            "Match buffer overflowed; raise --max-matches to record every match".yellow()
        );
    }
}

fn print_matches(patterns: &PatternSet, report: &ScanReport) {
    println!();
    for m in &report.matches {
        let text = patterns
            .get(m.pattern_id)
            .map(|p| escape_bytes(&p.bytes))
            .unwrap_or_default();
        println!(
            "packet {} offset {} pattern {} {}",
            m.packet_id.to_string().green(),
            m.offset,
            m.pattern_id,
            text.cyan()
        );
    }
}

/// Printable ASCII as is, everything else as `\xHH`
fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{:02x}", b));
        }
    }
    out
}
