use std::path::PathBuf;

use clap::Parser;

use crate::config::DEFAULT_REFRESH_RATE_MS;
use crate::sink::Format;

/// Separates our own arguments from the ones handed to nmap untouched.
pub const PASSTHROUGH_SEPARATOR: &str = "--";

#[derive(Debug, Parser)]
#[command(name = "nmapstream")]
#[command(about = "Scan targets with nmap and stream open ports as json, yaml, csv or a table")]
#[command(after_help = "Arguments after a literal `--` are passed to nmap verbatim.")]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Auto)]
    pub format: Format,

    /// Write results to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Progress refresh rate in milliseconds
    #[arg(short, long, default_value_t = DEFAULT_REFRESH_RATE_MS)]
    pub refresh_rate: u64,

    /// nmap binary to run
    #[arg(long, env = "NMAPSTREAM_NMAP", default_value = "nmap")]
    pub nmap: String,

    /// Skip the raw socket check and do not pass --privileged to nmap
    #[arg(long)]
    pub unprivileged: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Targets to scan; `-` reads them from stdin
    #[arg(value_name = "IPADDRESS|CIDR|FQDN|FILE", default_value = "-")]
    pub targets: Vec<String>,
}

/// Split the raw argument vector at the first `--`.
///
/// Returns our arguments (program name included) and nmap's arguments.
pub fn split_passthrough<I>(args: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = String>,
{
    let mut own = Vec::new();
    let mut iter = args.into_iter();
    for arg in iter.by_ref() {
        if arg == PASSTHROUGH_SEPARATOR {
            break;
        }
        own.push(arg);
    }
    (own, iter.collect())
}

/// Parse a full argument vector, exiting with usage on bad input.
pub fn parse<I>(args: I) -> (Cli, Vec<String>)
where
    I: IntoIterator<Item = String>,
{
    let (own, nmap_args) = split_passthrough(args);
    (Cli::parse_from(own), nmap_args)
}
