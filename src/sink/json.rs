use std::io::Write;

use eyre::{Result, WrapErr};

use super::{HostSink, Output};
use crate::types::Host;

/// One compact JSON object per line.
pub struct JsonSink {
    output: Output,
}

impl JsonSink {
    pub fn new(output: Output) -> Self {
        Self { output }
    }
}

impl HostSink for JsonSink {
    fn name(&self) -> &'static str {
        "json"
    }

    fn add(&mut self, host: Host) -> Result<()> {
        serde_json::to_writer(&mut self.output, &host).wrap_err("Failed to encode host as JSON")?;
        self.output.write_all(b"\n")?;
        self.output.flush()?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.output.flush().wrap_err("Failed to flush JSON output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::tests::SharedBuffer;
    use crate::types::tests::sample_host;

    #[test]
    fn test_one_line_per_host() {
        let buffer = SharedBuffer::default();
        let mut sink = JsonSink::new(buffer.output());
        sink.add(sample_host()).unwrap();
        sink.add(sample_host()).unwrap();
        sink.finalize().unwrap();

        let contents = buffer.contents();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.ends_with('\n'));
        assert!(contents.starts_with(r#"{"reachable":true,"network":"ipv4","address":"192.0.2.10","osvendor":"Linux","osfamily":"Linux","ports":{"22":{"#));
    }

    #[test]
    fn test_scripts_are_flattened_into_port() {
        let buffer = SharedBuffer::default();
        let mut sink = JsonSink::new(buffer.output());
        sink.add(sample_host()).unwrap();

        let value: serde_json::Value = serde_json::from_str(buffer.contents().trim()).unwrap();
        assert_eq!(value["ports"]["22"]["ssh-hostkey"][0], "256 aa:bb (ED25519)");
        assert_eq!(value["ports"]["22"]["application"], "ssh");
        assert_eq!(value["ports"]["80"]["number"], 80);
    }

    #[test]
    fn test_round_trip() {
        let buffer = SharedBuffer::default();
        let mut sink = JsonSink::new(buffer.output());
        let host = sample_host();
        sink.add(host.clone()).unwrap();

        let parsed: Host = serde_json::from_str(buffer.contents().trim()).unwrap();
        assert_eq!(parsed, host);
    }
}
