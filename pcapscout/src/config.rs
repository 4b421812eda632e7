use config::{Config as ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::errors::{ScanError, ScanResult};
use crate::patterns::StrategyChoice;
use crate::scan::EngineKind;

pub const DEFAULT_LARGE_PACKET_THRESHOLD: usize = 2048;
pub const DEFAULT_TILE_SIZE: usize = 8192;
pub const DEFAULT_OUTPUT_CAPACITY: usize = 2_000_000;
pub const DEFAULT_PATTERN_COUNT_THRESHOLD: usize = 16;
pub const DEFAULT_LANES_PER_GROUP: usize = 256;

/// Configuration for a scan.
///
/// # Configuration Locations
///
/// Loaded from, in increasing order of precedence:
/// 1. Global `$CONFIG_DIR/pcapscout/config.yaml`
/// 2. Local `.pcapscout.yaml` in the current directory
/// 3. A file passed explicitly (the CLI's `--config` flag)
///
/// Command-line arguments win over all of them, see [`ScanConfig::merge_with_cli`].
///
/// # Configuration Format
///
/// ```yaml
/// # Escape-coded patterns (\xHH, \n, \r, \t)
/// patterns: ["GET /", "\\x16\\x03\\x01"]
///
/// # Packets at least this long take the tiled path
/// large_packet_threshold_bytes: 2048
///
/// # Tile size for large packets
/// tile_size_bytes: 8192
///
/// # Matches stored per pass; extra matches are counted, not stored
/// output_capacity: 2000000
///
/// # Pattern sets up to this size use per-pattern Horspool tables
/// pattern_count_threshold: 16
///
/// # auto | horspool | automaton
/// strategy: "auto"
///
/// # parallel | sequential
/// engine: "parallel"
///
/// thread_count: 8
/// log_level: "info"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Escape-coded search patterns
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Packets at or above this many bytes are scanned tile by tile
    #[serde(default = "default_large_packet_threshold")]
    pub large_packet_threshold_bytes: usize,

    /// Bytes per tile on the large-packet path, not counting the overlap
    #[serde(default = "default_tile_size")]
    pub tile_size_bytes: usize,

    /// Number of matches the sink stores per pass
    #[serde(default = "default_output_capacity")]
    pub output_capacity: usize,

    /// Largest pattern count that still gets per-pattern Horspool tables
    #[serde(default = "default_pattern_count_threshold")]
    pub pattern_count_threshold: usize,

    /// Cooperating lanes per packet group
    #[serde(default = "default_lanes_per_group")]
    pub lanes_per_group: NonZeroUsize,

    /// Worker threads in the parallel engine's pool
    #[serde(default = "default_thread_count")]
    pub thread_count: NonZeroUsize,

    /// Which compiled structure to build
    #[serde(default)]
    pub strategy: StrategyChoice,

    /// Which engine executes the launches
    #[serde(default)]
    pub engine: EngineKind,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_large_packet_threshold() -> usize {
    DEFAULT_LARGE_PACKET_THRESHOLD
}

fn default_tile_size() -> usize {
    DEFAULT_TILE_SIZE
}

fn default_output_capacity() -> usize {
    DEFAULT_OUTPUT_CAPACITY
}

fn default_pattern_count_threshold() -> usize {
    DEFAULT_PATTERN_COUNT_THRESHOLD
}

fn default_lanes_per_group() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_LANES_PER_GROUP).unwrap_or(NonZeroUsize::MIN)
}

fn default_thread_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            large_packet_threshold_bytes: default_large_packet_threshold(),
            tile_size_bytes: default_tile_size(),
            output_capacity: default_output_capacity(),
            pattern_count_threshold: default_pattern_count_threshold(),
            lanes_per_group: default_lanes_per_group(),
            thread_count: default_thread_count(),
            strategy: StrategyChoice::default(),
            engine: EngineKind::default(),
            log_level: default_log_level(),
        }
    }
}

impl ScanConfig {
    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration, layering `config_path` over the default locations.
    /// An explicit path must exist.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        let defaults = [
            dirs::config_dir().map(|p| p.join("pcapscout/config.yaml")),
            Some(PathBuf::from(".pcapscout.yaml")),
        ];
        for path in defaults.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder.build()?.try_deserialize()
    }

    /// Merges CLI arguments with configuration file values. A CLI value only
    /// wins when it differs from the built-in default.
    pub fn merge_with_cli(mut self, cli_config: ScanConfig) -> Self {
        let defaults = ScanConfig::default();

        if !cli_config.patterns.is_empty() {
            self.patterns = cli_config.patterns;
        }
        if cli_config.large_packet_threshold_bytes != defaults.large_packet_threshold_bytes {
            self.large_packet_threshold_bytes = cli_config.large_packet_threshold_bytes;
        }
        if cli_config.tile_size_bytes != defaults.tile_size_bytes {
            self.tile_size_bytes = cli_config.tile_size_bytes;
        }
        if cli_config.output_capacity != defaults.output_capacity {
            self.output_capacity = cli_config.output_capacity;
        }
        if cli_config.pattern_count_threshold != defaults.pattern_count_threshold {
            self.pattern_count_threshold = cli_config.pattern_count_threshold;
        }
        if cli_config.lanes_per_group != defaults.lanes_per_group {
            self.lanes_per_group = cli_config.lanes_per_group;
        }
        if cli_config.thread_count != defaults.thread_count {
            self.thread_count = cli_config.thread_count;
        }
        if cli_config.strategy != defaults.strategy {
            self.strategy = cli_config.strategy;
        }
        if cli_config.engine != defaults.engine {
            self.engine = cli_config.engine;
        }
        if cli_config.log_level != defaults.log_level {
            self.log_level = cli_config.log_level;
        }
        self
    }

    /// Rejects settings the engines cannot run with
    pub fn validate(&self) -> ScanResult<()> {
        if self.tile_size_bytes == 0 {
            return Err(ScanError::config_error("tile_size_bytes must be positive"));
        }
        if self.large_packet_threshold_bytes == 0 {
            return Err(ScanError::config_error(
                "large_packet_threshold_bytes must be positive",
            ));
        }
        if self.output_capacity > u32::MAX as usize {
            return Err(ScanError::config_error(format!(
                "output_capacity {} exceeds {}",
                self.output_capacity,
                u32::MAX
            )));
        }
        Ok(())
    }
}
