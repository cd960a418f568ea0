use std::fs;
use std::io::Write;
use std::path::PathBuf;

use eyre::{Result, eyre};
use log::LevelFilter;

const APP_NAME: &str = "nmapstream";

/// Initialize logging to a per-user log file.
///
/// Logs never go to stdout or stderr, which carry scan output and progress.
pub fn init_logging(verbose: bool) -> Result<()> {
    let log_path = get_log_file_path()?;

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let log_level = resolve_level(std::env::var("RUST_LOG").ok().as_deref(), verbose);

    env_logger::Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)?,
        )))
        .try_init()?;

    log::info!("Logging initialized to: {}", log_path.display());
    log::info!("Log level: {}", log_level);

    Ok(())
}

/// `--verbose` wins, then `RUST_LOG`, then info.
fn resolve_level(env_level: Option<&str>, verbose: bool) -> LevelFilter {
    if verbose {
        return LevelFilter::Debug;
    }
    env_level
        .and_then(|level| level.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Get the system-specific log file path
pub fn get_log_file_path() -> Result<PathBuf> {
    let log_dir = if cfg!(target_os = "macos") {
        // macOS: ~/Library/Logs/nmapstream/
        dirs::home_dir()
            .ok_or_else(|| eyre!("Could not find home directory"))?
            .join("Library")
            .join("Logs")
            .join(APP_NAME)
    } else {
        dirs::data_local_dir()
            .ok_or_else(|| eyre!("Could not find local data directory"))?
            .join(APP_NAME)
            .join("logs")
    };

    Ok(log_dir.join(format!("{}.log", APP_NAME)))
}
