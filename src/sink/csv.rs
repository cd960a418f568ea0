use std::io::Write;

use ::csv::{Terminator, WriterBuilder};
use eyre::{Result, WrapErr};

use super::{HostSink, Output};
use crate::types::Host;

/// One CSV row per (host, port), written and flushed host by host.
///
/// Rows carry a variable number of script columns, so no header is written.
pub struct CsvSink {
    output: Output,
}

impl CsvSink {
    pub fn new(output: Output) -> Self {
        Self { output }
    }
}

pub fn render_rows(host: &Host) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .flexible(true)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for row in host.rows() {
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|e| eyre::eyre!("Failed to finish CSV rows: {}", e.error()))
}

impl HostSink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn add(&mut self, host: Host) -> Result<()> {
        let rows = render_rows(&host)
            .wrap_err_with(|| format!("Failed to encode host {} as CSV", host.address))?;
        log::trace!("[sink::csv] add: address={} ports={} bytes={}", host.address, host.ports.len(), rows.len());
        self.output.write_all(&rows)?;
        self.output.flush()?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.output.flush().wrap_err("Failed to flush CSV output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::tests::SharedBuffer;
    use crate::types::tests::sample_host;
    use std::collections::BTreeMap;

    #[test]
    fn test_row_per_port() {
        let buffer = SharedBuffer::default();
        let mut sink = CsvSink::new(buffer.output());
        sink.add(sample_host()).unwrap();
        sink.finalize().unwrap();

        let contents = buffer.contents();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(
            lines,
            vec![
                "ipv4,192.0.2.10,Linux,Linux,tcp,22,ssh,OpenSSH,9.6,,256 aa:bb (ED25519)",
                "ipv4,192.0.2.10,Linux,Linux,tcp,80,http,nginx,,",
            ]
        );
    }

    #[test]
    fn test_multiline_script_is_quoted() {
        let mut host = sample_host();
        if let Some(port) = host.ports.get_mut(&22) {
            port.scripts.insert("banner".to_string(), vec!["one".to_string(), "two".to_string()]);
        }
        let rows = String::from_utf8(render_rows(&host).unwrap()).unwrap();
        assert!(rows.contains("\"one\ntwo\""));
    }

    #[test]
    fn test_host_without_ports_writes_nothing() {
        let buffer = SharedBuffer::default();
        let mut sink = CsvSink::new(buffer.output());
        let mut host = sample_host();
        host.ports = BTreeMap::new();
        sink.add(host).unwrap();
        assert_eq!(buffer.contents(), "");
    }
}
