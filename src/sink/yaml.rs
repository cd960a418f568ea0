use std::io::Write;

use eyre::{Result, WrapErr};

use super::{HostSink, Output};
use crate::types::Host;

/// A `---` separated YAML document per host.
pub struct YamlSink {
    output: Output,
}

impl YamlSink {
    pub fn new(output: Output) -> Self {
        Self { output }
    }
}

impl HostSink for YamlSink {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn add(&mut self, host: Host) -> Result<()> {
        let document = serde_yaml::to_string(&host).wrap_err("Failed to encode host as YAML")?;
        self.output.write_all(b"---\n")?;
        self.output.write_all(document.as_bytes())?;
        self.output.flush()?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.output.flush().wrap_err("Failed to flush YAML output")
    }
}
