use std::io::{self, IsTerminal, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::sink::Output;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} [{elapsed_precise}]";
const PROGRESS_MESSAGE: &str = "Scanning...";

/// A consistent view of both counters taken under one lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub expected: u64,
    pub completed: u64,
}

impl ProgressSnapshot {
    /// Every expected target has been reported back by the scanner.
    pub fn is_drained(&self) -> bool {
        self.completed >= self.expected
    }
}

/// Work counters shared by the target feeder and the report parser.
///
/// Both counters live behind a single lock, so there is no lock ordering to
/// get wrong and a snapshot never mixes two different moments.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    counts: Mutex<ProgressSnapshot>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProgressSnapshot> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_expected(&self, count: u64) {
        self.lock().expected += count;
    }

    pub fn add_completed(&self, count: u64) {
        self.lock().completed += count;
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.lock()
    }
}

/// Where user-facing, non-fatal problems are reported.
pub trait Diagnostics: Send {
    fn report(&mut self, message: &str);
}

impl Diagnostics for Vec<String> {
    fn report(&mut self, message: &str) {
        self.push(message.to_string());
    }
}

/// Live progress display driven by periodic [`ProgressTracker`] snapshots.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Draws on stdout when it is a terminal, otherwise on stderr.
    pub fn new() -> Self {
        let target = if io::stdout().is_terminal() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::stderr()
        };
        Self::with_target(target)
    }

    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        // No length until the first target is counted, so an empty scan never shows a full bar.
        let bar = ProgressBar::with_draw_target(None, target);
        match ProgressStyle::with_template(PROGRESS_TEMPLATE) {
            Ok(style) => bar.set_style(style.progress_chars("#>-")),
            Err(e) => log::warn!("[progress] style_rejected: error={}", e),
        }
        bar.set_message(PROGRESS_MESSAGE);
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub fn update(&self, snapshot: ProgressSnapshot) {
        if snapshot.expected > 0 {
            self.bar.set_length(snapshot.expected);
        }
        self.bar.set_position(snapshot.completed);
    }

    /// Route sink output around the bar so rendered lines never share a row with it.
    pub fn wrap_output(&self, output: Output) -> Output {
        Box::new(SuspendedOutput::new(self.bar.clone(), output))
    }

    /// Removes the bar so final output starts on a clean line.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics for ProgressReporter {
    fn report(&mut self, message: &str) {
        log::warn!("[progress] diagnostic: {}", message);
        if self.bar.is_hidden() {
            eprintln!("{}", message);
        } else {
            self.bar.println(message);
        }
    }
}

/// Writer that hides the progress bar while complete lines are written.
///
/// Bytes are held until a newline arrives, so the bar is only redrawn at the
/// start of a fresh line.
struct SuspendedOutput {
    bar: ProgressBar,
    inner: Output,
    pending: Vec<u8>,
}

impl SuspendedOutput {
    fn new(bar: ProgressBar, inner: Output) -> Self {
        Self {
            bar,
            inner,
            pending: Vec::new(),
        }
    }

    fn emit(&mut self, bytes: &[u8]) -> io::Result<()> {
        let inner = &mut self.inner;
        self.bar.suspend(|| {
            inner.write_all(bytes)?;
            inner.flush()
        })
    }
}

impl Write for SuspendedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        if let Some(end) = self.pending.iter().rposition(|byte| *byte == b'\n') {
            let lines: Vec<u8> = self.pending.drain(..=end).collect();
            self.emit(&lines)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest)?;
        }
        let inner = &mut self.inner;
        self.bar.suspend(|| inner.flush())
    }
}

impl Drop for SuspendedOutput {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::warn!("[progress] output_flush_failed: error={}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::tests::SharedBuffer;
    use std::sync::Arc;

    #[test]
    fn test_counters_start_empty() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.snapshot(), ProgressSnapshot::default());
        assert!(tracker.snapshot().is_drained());
    }

    #[test]
    fn test_snapshot_reflects_updates() {
        let tracker = ProgressTracker::new();
        tracker.add_expected(4);
        tracker.add_completed(1);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot, ProgressSnapshot { expected: 4, completed: 1 });
        assert!(!snapshot.is_drained());

        tracker.add_completed(3);
        assert!(tracker.snapshot().is_drained());
    }

    #[test]
    fn test_concurrent_writers_are_consistent() {
        let tracker = Arc::new(ProgressTracker::new());
        let feeder = {
            let tracker = Arc::clone(&tracker);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    tracker.add_expected(1);
                }
            })
        };
        let parser = {
            let tracker = Arc::clone(&tracker);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    tracker.add_completed(1);
                }
            })
        };
        feeder.join().unwrap();
        parser.join().unwrap();
        assert_eq!(tracker.snapshot(), ProgressSnapshot { expected: 1000, completed: 1000 });
    }

    #[test]
    fn test_reporter_tracks_snapshot() {
        let reporter = ProgressReporter::hidden();
        reporter.update(ProgressSnapshot { expected: 10, completed: 3 });
        assert_eq!(reporter.bar.length(), Some(10));
        assert_eq!(reporter.bar.position(), 3);
        reporter.finish();
    }

    #[test]
    fn test_reporter_has_no_length_before_targets() {
        let reporter = ProgressReporter::hidden();
        assert_eq!(reporter.bar.length(), None);
        reporter.update(ProgressSnapshot::default());
        assert_eq!(reporter.bar.length(), None);
        reporter.update(ProgressSnapshot { expected: 1, completed: 0 });
        assert_eq!(reporter.bar.length(), Some(1));
    }

    #[test]
    fn test_wrapped_output_writes_whole_lines() {
        let reporter = ProgressReporter::hidden();
        let buffer = SharedBuffer::default();
        let mut output = reporter.wrap_output(buffer.output());

        output.write_all(b"{\"address\":").unwrap();
        assert_eq!(buffer.contents(), "");

        output.write_all(b"\"192.0.2.1\"}\n{\"addr").unwrap();
        assert_eq!(buffer.contents(), "{\"address\":\"192.0.2.1\"}\n");

        output.flush().unwrap();
        assert_eq!(buffer.contents(), "{\"address\":\"192.0.2.1\"}\n{\"addr");
    }

    #[test]
    fn test_wrapped_output_flushes_on_drop() {
        let reporter = ProgressReporter::hidden();
        let buffer = SharedBuffer::default();
        let mut output = reporter.wrap_output(buffer.output());
        output.write_all(b"partial").unwrap();
        drop(output);
        assert_eq!(buffer.contents(), "partial");
    }

    #[test]
    fn test_vec_collects_diagnostics() {
        let mut diagnostics: Vec<String> = Vec::new();
        diagnostics.report("unsupported xml schema version");
        assert_eq!(diagnostics, vec!["unsupported xml schema version".to_string()]);
    }
}
