use std::process;

use eyre::Result;

use nmapstream::{ProgressReporter, ScanConfig, cli, create_sink, run_scan};

#[tokio::main]
async fn main() -> Result<()> {
    let (args, nmap_args) = cli::parse(std::env::args());

    // Initialize logging first
    if let Err(e) = nmapstream::init_logging(args.verbose) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    log::info!("================================================================================");
    log::info!("NEW SCAN SESSION STARTING");
    log::info!("================================================================================");

    let config = ScanConfig::from_cli(args, nmap_args)?;
    log::info!("[main] config: format={} targets={:?} nmap={} nmap_args={:?}",
        config.format.as_str(), config.targets, config.nmap, config.nmap_args);

    let reporter = ProgressReporter::new();
    let output = match config.output {
        Some(_) => config.open_output()?,
        None => reporter.wrap_output(config.open_output()?),
    };
    let sink = create_sink(config.format, output);
    let outcome = run_scan(&config, sink, reporter, tokio::io::stdin()).await?;

    if !outcome.success() {
        eprintln!("{}", outcome.stderr.trim());
    }

    // Exit directly: a stdin read that never saw EOF would otherwise hold up runtime shutdown.
    process::exit(outcome.exit_code);
}
