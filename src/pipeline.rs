use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Instant;

use eyre::{Result, WrapErr, eyre};
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;

use crate::config::ScanConfig;
use crate::progress::{Diagnostics, ProgressReporter, ProgressSnapshot, ProgressTracker};
use crate::report::{ParseSummary, parse_report};
use crate::scanner::NmapScanner;
use crate::sink::HostSink;
use crate::target::TargetExpander;

/// Result of a scan that ran to completion.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// nmap's exit code; 1 when it was killed by a signal
    pub exit_code: i32,
    /// nmap's stderr, only worth showing when `exit_code` is non-zero
    pub stderr: String,
    pub summary: ParseSummary,
    pub progress: ProgressSnapshot,
}

impl ScanOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run nmap over the configured targets and stream its report into `sink`.
///
/// The feeder, the report parser and the stderr drain each own one of the
/// child's pipes and close it when they finish. This task polls the child and
/// refreshes `reporter` until the scan is over. `stdin` supplies targets for
/// the `-` token; the feeder is abandoned once nmap has exited, so a reader
/// that never ends cannot hold the scan open.
pub async fn run_scan<R>(
    config: &ScanConfig,
    sink: Box<dyn HostSink>,
    reporter: ProgressReporter,
    stdin: R,
) -> Result<ScanOutcome>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let scanner = NmapScanner::from_config(config);
    scanner.check_capabilities().await?;

    let scan_start = Instant::now();
    let mut child = scanner.spawn()?;
    let progress = Arc::new(ProgressTracker::new());

    let nmap_stdin = child.stdin.take().ok_or_else(|| eyre!("nmap stdin was not captured"))?;
    let stdout = child.stdout.take().ok_or_else(|| eyre!("nmap stdout was not captured"))?;
    let mut stderr = child.stderr.take().ok_or_else(|| eyre!("nmap stderr was not captured"))?;

    let feeder: JoinHandle<()> = {
        let progress = Arc::clone(&progress);
        let targets = config.targets.clone();
        let mut diagnostics = reporter.clone();
        tokio::spawn(async move {
            let mut expander = TargetExpander::new(nmap_stdin, progress);
            match expander.expand(targets, stdin).await {
                Ok(count) => log::debug!("[pipeline] feeder_finished: targets={}", count),
                Err(e) => {
                    log::error!("[pipeline] feeder_failed: emitted={} error={:#}", expander.emitted(), e);
                    diagnostics.report(&format!("target error: {:#}", e));
                }
            }
        })
    };

    let mut parser: JoinHandle<Result<ParseSummary>> = {
        let progress = Arc::clone(&progress);
        let mut diagnostics = reporter.clone();
        let mut sink = sink;
        tokio::spawn(async move {
            parse_report(BufReader::new(stdout), sink.as_mut(), &mut diagnostics, &progress).await
        })
    };

    let stderr_drain: JoinHandle<String> = tokio::spawn(async move {
        let mut captured = Vec::new();
        if let Err(e) = stderr.read_to_end(&mut captured).await {
            log::warn!("[pipeline] stderr_read_failed: error={}", e);
        }
        String::from_utf8_lossy(&captured).into_owned()
    });

    let exited = match poll_until_done(&mut child, &progress, &parser, &reporter, config).await {
        Ok(exited) => exited,
        Err(e) => {
            reporter.finish();
            feeder.abort();
            parser.abort();
            stderr_drain.abort();
            return Err(e);
        }
    };
    reporter.update(progress.snapshot());
    reporter.finish();

    let summary = match (&mut parser).await.wrap_err("Report parser task failed")? {
        Ok(summary) => summary,
        Err(e) => {
            log::error!("[pipeline] parser_aborted: error={:#}", e);
            if let Err(kill_err) = child.kill().await {
                log::warn!("[pipeline] kill_failed: error={}", kill_err);
            }
            feeder.abort();
            return Err(e);
        }
    };

    let status = match exited {
        Some(status) => status,
        None => child.wait().await.wrap_err("Failed to wait for nmap")?,
    };

    // nmap is gone, so nothing the feeder still reads can be scanned.
    feeder.abort();
    match feeder.await {
        Err(e) if e.is_cancelled() => log::debug!("[pipeline] feeder_abandoned: nmap exited first"),
        Err(e) => log::warn!("[pipeline] feeder_join_failed: error={}", e),
        Ok(()) => {}
    }
    let stderr = stderr_drain.await.unwrap_or_default();
    let snapshot = progress.snapshot();

    log::info!("[pipeline] scan_finished: status={} duration={}ms expected={} completed={} delivered={}",
        status, scan_start.elapsed().as_millis(), snapshot.expected, snapshot.completed, summary.hosts_delivered);

    Ok(ScanOutcome {
        exit_code: status.code().unwrap_or(1),
        stderr,
        summary,
        progress: snapshot,
    })
}

/// Refresh the progress display until the scan is over.
///
/// Returns the exit status if nmap had already exited, or `None` when the
/// report stream ended first. A clean exit keeps polling until every expected
/// target has completed or the parser has drained the report.
async fn poll_until_done(
    child: &mut Child,
    progress: &ProgressTracker,
    parser: &JoinHandle<Result<ParseSummary>>,
    reporter: &ProgressReporter,
    config: &ScanConfig,
) -> Result<Option<ExitStatus>> {
    loop {
        let snapshot = progress.snapshot();
        reporter.update(snapshot);

        match child.try_wait().wrap_err("Failed to poll nmap")? {
            Some(status) if !status.success() || snapshot.is_drained() || parser.is_finished() => {
                log::debug!("[pipeline] poll_finished: status={} expected={} completed={}",
                    status, snapshot.expected, snapshot.completed);
                return Ok(Some(status));
            }
            Some(_) => {}
            None if parser.is_finished() => {
                log::debug!("[pipeline] report_closed_before_exit: completed={}", snapshot.completed);
                return Ok(None);
            }
            None => {}
        }

        tokio::select! {
            _ = tokio::time::sleep(config.poll_interval) => {}
            _ = tokio::signal::ctrl_c() => {
                log::warn!("[pipeline] interrupted: expected={} completed={}", snapshot.expected, snapshot.completed);
                child.kill().await.wrap_err("Failed to stop nmap")?;
                eyre::bail!("scan interrupted");
            }
        }
    }
}
