use std::process::Stdio;
use std::time::Instant;

use eyre::{Result, WrapErr};
use tokio::process::{Child, Command};

use crate::config::ScanConfig;

const CAPABILITY_PROBE_TARGET: &str = "0.0.0.0";
const CAPABILITY_HINT: &str =
    "run the following command to fix this problem: sudo setcap CAP_NET_RAW=ep \"$(which nmap)\"";

/// Launches nmap so that it reads targets on stdin and streams XML on stdout.
#[derive(Debug, Clone)]
pub struct NmapScanner {
    program: String,
    extra_args: Vec<String>,
    privileged: bool,
}

impl NmapScanner {
    pub fn new(program: impl Into<String>, extra_args: Vec<String>, privileged: bool) -> Self {
        let program = program.into();
        log::debug!("[scanner] new: program={} extra_args={:?} privileged={}", program, extra_args, privileged);
        Self {
            program,
            extra_args,
            privileged,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.nmap.clone(), config.nmap_args.clone(), config.privileged)
    }

    /// Arguments passed to nmap: pass-through args first, then the streaming I/O flags.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.extra_args.clone();
        if self.privileged {
            args.push("--privileged".to_string());
        }
        args.extend(["-iL", "-", "-oX", "-"].map(String::from));
        args
    }

    /// Fails early when nmap cannot open raw sockets.
    ///
    /// Skipped in unprivileged mode, where nmap falls back to connect scans.
    pub async fn check_capabilities(&self) -> Result<()> {
        if !self.privileged {
            log::debug!("[scanner] capability_check_skipped: privileged=false");
            return Ok(());
        }

        let probe_start = Instant::now();
        let output = Command::new(&self.program)
            .args(["--privileged", "-sS", CAPABILITY_PROBE_TARGET])
            .stdin(Stdio::null())
            .output()
            .await
            .wrap_err_with(|| format!("Failed to execute {}", self.program))?;

        log::debug!("[scanner] capability_check: status={} duration={}ms",
            output.status, probe_start.elapsed().as_millis());

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::error!("[scanner] capability_check_failed: status={} stderr={}", output.status, stderr.trim());
            eyre::bail!("nmap error: {}\n{}", stderr.trim(), CAPABILITY_HINT);
        }
        Ok(())
    }

    /// Spawn nmap with all three standard streams piped.
    ///
    /// The child is killed if its handle is dropped before it exits.
    pub fn spawn(&self) -> Result<Child> {
        let args = self.args();
        log::info!("[scanner] spawn: program={} args={:?}", self.program, args);
        Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .wrap_err_with(|| format!("Failed to start {}", self.program))
    }
}
