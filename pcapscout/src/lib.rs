pub mod capture;
pub mod config;
pub mod driver;
pub mod errors;
pub mod metrics;
pub mod patterns;
pub mod results;
pub mod scan;

pub use capture::{Capture, CaptureFormat, CaptureInfo};
pub use config::ScanConfig;
pub use driver::{scan_capture, Driver};
pub use errors::{PatternError, ScanError, ScanResult};
pub use metrics::{ScanMetrics, ScanStats};
pub use patterns::{PatternCompiler, PatternSet, Strategy, StrategyChoice};
pub use results::{MatchEntry, ScanReport};
pub use scan::{EngineKind, MatchSink, ParallelEngine, ScanEngine, SequentialEngine};
