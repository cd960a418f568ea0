use std::fs::File;
use std::io::{self, BufWriter, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use eyre::{Result, WrapErr};

use crate::cli::Cli;
use crate::sink::{Format, Output};

pub const DEFAULT_REFRESH_RATE_MS: u64 = 1000;

/// Runtime configuration resolved from the command line and environment.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Concrete output format, never `Auto`
    pub format: Format,
    pub output: Option<PathBuf>,
    pub poll_interval: Duration,
    pub nmap: String,
    pub nmap_args: Vec<String>,
    pub privileged: bool,
    pub targets: Vec<String>,
}

impl ScanConfig {
    pub fn from_cli(cli: Cli, nmap_args: Vec<String>) -> Result<Self> {
        Self::resolve(cli, nmap_args, io::stdout().is_terminal())
    }

    fn resolve(cli: Cli, nmap_args: Vec<String>, stdout_is_terminal: bool) -> Result<Self> {
        if cli.refresh_rate == 0 {
            eyre::bail!("refresh rate must be greater than zero");
        }

        let format = cli.format.resolve(cli.output.is_some(), stdout_is_terminal);
        log::debug!("[config] resolved: format={} requested={} output={:?} refresh_rate={}ms",
            format.as_str(), cli.format.as_str(), cli.output, cli.refresh_rate);

        Ok(Self {
            format,
            output: cli.output,
            poll_interval: Duration::from_millis(cli.refresh_rate),
            nmap: cli.nmap,
            nmap_args,
            privileged: !cli.unprivileged,
            targets: cli.targets,
        })
    }

    /// Open the configured destination, truncating an existing file.
    pub fn open_output(&self) -> Result<Output> {
        match &self.output {
            Some(path) => {
                let file = File::create(path)
                    .wrap_err_with(|| format!("Failed to create output file {}", path.display()))?;
                Ok(Box::new(BufWriter::new(file)))
            }
            None => Ok(Box::new(io::stdout())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn cli(line: &str) -> Cli {
        Cli::parse_from(line.split_whitespace())
    }

    #[test]
    fn test_auto_format_follows_destination() {
        let config = ScanConfig::resolve(cli("nmapstream"), Vec::new(), true).unwrap();
        assert_eq!(config.format, Format::Table);

        let config = ScanConfig::resolve(cli("nmapstream"), Vec::new(), false).unwrap();
        assert_eq!(config.format, Format::Csv);

        let config = ScanConfig::resolve(cli("nmapstream -o out.txt"), Vec::new(), true).unwrap();
        assert_eq!(config.format, Format::Csv);
    }

    #[test]
    fn test_explicit_values() {
        let config = ScanConfig::resolve(
            cli("nmapstream -f yaml -r 200 --unprivileged --nmap /opt/nmap 192.0.2.1"),
            vec!["-sV".to_string()],
            true,
        )
        .unwrap();
        assert_eq!(config.format, Format::Yaml);
        assert_eq!(config.poll_interval, Duration::from_millis(200));
        assert_eq!(config.nmap, "/opt/nmap");
        assert_eq!(config.nmap_args, vec!["-sV"]);
        assert!(!config.privileged);
        assert_eq!(config.targets, vec!["192.0.2.1"]);
    }

    #[test]
    fn test_zero_refresh_rate_rejected() {
        assert!(ScanConfig::resolve(cli("nmapstream -r 0"), Vec::new(), true).is_err());
    }

    #[test]
    fn test_open_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.csv");
        let config = ScanConfig::resolve(
            cli(&format!("nmapstream -o {}", path.display())),
            Vec::new(),
            false,
        )
        .unwrap();

        let mut output = config.open_output().unwrap();
        output.write_all(b"ipv4,192.0.2.1\n").unwrap();
        output.flush().unwrap();
        drop(output);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "ipv4,192.0.2.1\n");
    }
}
