pub mod csv;
pub mod json;
pub mod table;
pub mod yaml;

pub use self::csv::CsvSink;
pub use self::json::JsonSink;
pub use self::table::TableSink;
pub use self::yaml::YamlSink;

use std::io::Write;

use clap::ValueEnum;
use eyre::Result;

use crate::types::Host;

/// Destination for rendered output: stdout or a file.
pub type Output = Box<dyn Write + Send>;

/// Consumes reachable hosts in completion order and renders them.
pub trait HostSink: Send {
    /// Sink identifier used in log lines
    fn name(&self) -> &'static str;

    fn add(&mut self, host: Host) -> Result<()>;

    /// Called exactly once after the report stream ends; flushes everything.
    fn finalize(&mut self) -> Result<()>;
}

/// Output formats selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Pick csv or table depending on where output goes
    Auto,
    Json,
    Yaml,
    Csv,
    Table,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Auto => "auto",
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Csv => "csv",
            Format::Table => "table",
        }
    }

    /// Resolve `Auto` to a concrete format.
    pub fn resolve(self, has_output_file: bool, stdout_is_terminal: bool) -> Format {
        match self {
            Format::Auto if has_output_file => Format::Csv,
            Format::Auto if stdout_is_terminal => Format::Table,
            Format::Auto => Format::Csv,
            format => format,
        }
    }
}

pub fn create_sink(format: Format, output: Output) -> Box<dyn HostSink> {
    log::debug!("[sink] create_sink: format={}", format.as_str());
    match format {
        Format::Json => Box::new(JsonSink::new(output)),
        Format::Yaml => Box::new(YamlSink::new(output)),
        Format::Table => Box::new(TableSink::new(output)),
        Format::Csv | Format::Auto => Box::new(CsvSink::new(output)),
    }
}
