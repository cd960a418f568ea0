use eyre::Result;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tokio::io::AsyncBufRead;

use super::SUPPORTED_VERSION_PREFIX;
use super::element::Element;
use crate::error::ReportError;
use crate::progress::{Diagnostics, ProgressTracker};
use crate::sink::HostSink;
use crate::types::Host;

/// What a finished parse saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseSummary {
    /// `<host>` elements read, reachable or not
    pub hosts_seen: u64,
    /// Hosts handed to the sink
    pub hosts_delivered: u64,
    /// Parsing stopped early on a version mismatch or broken XML
    pub interrupted: bool,
}

/// Streams an nmap XML report from `reader` into `sink`.
///
/// Only the `<host>` currently being read is kept in memory. An unsupported
/// schema version or malformed XML is reported to `diagnostics` and ends the
/// stream; hosts delivered before that point stand. A report that is missing a
/// mandatory element aborts with the [`ReportError`] naming it, without
/// finalizing the sink. Otherwise `sink.finalize()` runs exactly once.
pub async fn parse_report<R, S, D>(
    reader: R,
    sink: &mut S,
    diagnostics: &mut D,
    progress: &ProgressTracker,
) -> Result<ParseSummary>
where
    R: AsyncBufRead + Unpin,
    S: HostSink + ?Sized,
    D: Diagnostics + ?Sized,
{
    log::debug!("[report::parser] parse_report: sink={}", sink.name());
    let mut summary = ParseSummary::default();

    if let Err(err) = read_hosts(reader, sink, progress, &mut summary).await {
        match err.downcast_ref::<ReportError>() {
            Some(report_err) if report_err.is_recoverable() => {
                log::warn!("[report::parser] stream_stopped: hosts_seen={} error={}", summary.hosts_seen, report_err);
                diagnostics.report(&report_err.to_string());
                summary.interrupted = true;
            }
            _ => {
                log::error!("[report::parser] aborted: hosts_seen={} error={}", summary.hosts_seen, err);
                return Err(err);
            }
        }
    }

    sink.finalize()?;
    log::debug!("[report::parser] finished: hosts_seen={} hosts_delivered={} interrupted={}",
        summary.hosts_seen, summary.hosts_delivered, summary.interrupted);
    Ok(summary)
}

async fn read_hosts<R, S>(
    reader: R,
    sink: &mut S,
    progress: &ProgressTracker,
    summary: &mut ParseSummary,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    S: HostSink + ?Sized,
{
    let mut xml = Reader::from_reader(reader);
    let mut buf = Vec::new();
    // Open elements of the host being captured; empty between hosts.
    let mut open: Vec<Element> = Vec::new();
    let mut depth = 0usize;

    loop {
        let event = xml
            .read_event_into_async(&mut buf)
            .await
            .map_err(ReportError::from)?;

        match event {
            Event::Start(start) => {
                depth += 1;
                if !open.is_empty() || start.name().as_ref() == b"host" {
                    open.push(Element::from_start(&start)?);
                } else if start.name().as_ref() == b"nmaprun" {
                    check_version(&start)?;
                }
            }
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                match open.last_mut() {
                    Some(parent) => parent.push_child(element),
                    None if element.name() == "host" => {
                        complete_host(element, sink, progress, summary)?;
                    }
                    None if element.name() == "nmaprun" => check_version(&start)?,
                    None => {}
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if let Some(element) = open.pop() {
                    match open.last_mut() {
                        Some(parent) => parent.push_child(element),
                        None => complete_host(element, sink, progress, summary)?,
                    }
                }
            }
            Event::Eof => {
                if depth > 0 {
                    return Err(ReportError::Malformed(format!(
                        "unexpected end of report with {} unclosed element(s)",
                        depth
                    ))
                    .into());
                }
                return Ok(());
            }
            _ => {}
        }
        buf.clear();
    }
}

fn check_version(start: &BytesStart<'_>) -> Result<(), ReportError> {
    let root = Element::from_start(start)?;
    let version = root.attr("xmloutputversion").unwrap_or_default();
    log::debug!("[report::parser] schema_version: version={}", version);
    if version.starts_with(SUPPORTED_VERSION_PREFIX) {
        Ok(())
    } else {
        Err(ReportError::UnsupportedVersion(version.to_string()))
    }
}

fn complete_host<S>(
    element: Element,
    sink: &mut S,
    progress: &ProgressTracker,
    summary: &mut ParseSummary,
) -> Result<()>
where
    S: HostSink + ?Sized,
{
    progress.add_completed(1);
    summary.hosts_seen += 1;

    let host = Host::from_element(&element)?;
    log::trace!("[report::parser] host_completed: address={} reachable={} ports={}",
        host.address, host.reachable, host.ports.len());
    if host.reachable {
        summary.hosts_delivered += 1;
        sink.add(host)?;
    }
    Ok(())
}
