use std::io::Write;

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use eyre::{Result, WrapErr};
use indexmap::IndexMap;

use super::{HostSink, Output};
use crate::types::Host;

struct TableRow {
    fixed: Vec<String>,
    scripts: IndexMap<String, String>,
}

/// Collects every row and renders a single table when the scan ends.
///
/// The header is taken from the first host that has ports; script columns are
/// appended in the order their ids are first seen.
pub struct TableSink {
    output: Output,
    header: Option<Vec<String>>,
    script_columns: Vec<String>,
    rows: Vec<TableRow>,
}

impl TableSink {
    pub fn new(output: Output) -> Self {
        Self {
            output,
            header: None,
            script_columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    fn columns(&self) -> Option<Vec<String>> {
        let mut columns = self.header.clone()?;
        columns.extend(self.script_columns.iter().cloned());
        Some(columns)
    }

    pub fn render(&self) -> Option<String> {
        let columns = self.columns()?;
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Disabled)
            .set_header(columns);

        for row in &self.rows {
            let mut cells = row.fixed.clone();
            cells.extend(
                self.script_columns
                    .iter()
                    .map(|id| row.scripts.get(id).cloned().unwrap_or_default()),
            );
            table.add_row(cells);
        }
        Some(table.to_string())
    }
}

impl HostSink for TableSink {
    fn name(&self) -> &'static str {
        "table"
    }

    fn add(&mut self, host: Host) -> Result<()> {
        if self.header.is_none() {
            let header = host.header();
            if !header.is_empty() {
                log::debug!("[sink::table] header_established: address={} columns={}", host.address, header.len());
                self.header = Some(header);
            }
        }

        let host_fields = host.fixed_row();
        for port in host.ports.values() {
            for id in port.scripts.keys() {
                if !self.script_columns.contains(id) {
                    self.script_columns.push(id.clone());
                }
            }

            let mut fixed = host_fields.clone();
            fixed.extend(port.fixed_row());
            let scripts = port
                .scripts
                .iter()
                .map(|(id, lines)| (id.clone(), lines.join("\n")))
                .collect();
            self.rows.push(TableRow { fixed, scripts });
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        match self.render() {
            Some(table) => {
                log::debug!("[sink::table] finalize: rows={} script_columns={}", self.rows.len(), self.script_columns.len());
                writeln!(self.output, "{}", table).wrap_err("Failed to write table")?;
            }
            None => log::debug!("[sink::table] finalize: no rows"),
        }
        self.output.flush().wrap_err("Failed to flush table output")
    }
}
