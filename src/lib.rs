pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod scanner;
pub mod sink;
pub mod target;
pub mod types;

// Re-export key types and functions at the crate root
pub use config::ScanConfig;
pub use error::ReportError;
pub use logging::{get_log_file_path, init_logging};
pub use pipeline::{ScanOutcome, run_scan};
pub use progress::{Diagnostics, ProgressReporter, ProgressSnapshot, ProgressTracker};
pub use report::{ParseSummary, parse_report};
pub use scanner::NmapScanner;
pub use sink::{Format, HostSink, create_sink};
pub use target::{TargetExpander, TargetKind};
pub use types::{Host, Network, Port, Transport};
