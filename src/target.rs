use std::net::IpAddr;
use std::sync::Arc;

use eyre::{Result, WrapErr};
use ipnetwork::IpNetwork;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::progress::ProgressTracker;

/// Token that stands for "read targets from standard input".
pub const STDIN_TOKEN: &str = "-";

/// How a single target token is handed to the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
    /// CIDR block, expanded into its usable host addresses
    Network(IpNetwork),
    Address(IpAddr),
    /// Hostname or anything else nmap may understand; passed through as is
    Name(String),
}

impl TargetKind {
    pub fn parse(input: &str) -> Self {
        // Only strict CIDR notation counts as a network: host bits must be zero.
        if input.contains('/') {
            if let Ok(network) = input.parse::<IpNetwork>() {
                if network.ip() == network.network() {
                    return TargetKind::Network(network);
                }
            }
        }

        if let Ok(ip) = input.parse::<IpAddr>() {
            return TargetKind::Address(ip);
        }

        TargetKind::Name(input.to_string())
    }
}

/// Usable host addresses of a network.
///
/// IPv4 excludes the network and broadcast addresses, IPv6 excludes the
/// subnet-router anycast address. Point-to-point and single-address networks
/// yield every address.
pub fn usable_hosts(network: IpNetwork) -> Box<dyn Iterator<Item = IpAddr> + Send> {
    match network {
        IpNetwork::V4(net) if net.prefix() >= 31 => Box::new(net.iter().map(IpAddr::V4)),
        IpNetwork::V4(net) => {
            let (first, last) = (net.network(), net.broadcast());
            Box::new(
                net.iter()
                    .filter(move |addr| *addr != first && *addr != last)
                    .map(IpAddr::V4),
            )
        }
        IpNetwork::V6(net) if net.prefix() >= 127 => Box::new(net.iter().map(IpAddr::V6)),
        IpNetwork::V6(net) => {
            let anycast = net.network();
            Box::new(net.iter().filter(move |addr| *addr != anycast).map(IpAddr::V6))
        }
    }
}

/// Turns target tokens into one scanner target per line on `writer`.
///
/// Every line is written as soon as it is known so the scanner can start
/// before expansion finishes, and each line bumps the expected counter.
pub struct TargetExpander<W> {
    writer: W,
    progress: Arc<ProgressTracker>,
    emitted: u64,
}

impl<W> TargetExpander<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W, progress: Arc<ProgressTracker>) -> Self {
        Self {
            writer,
            progress,
            emitted: 0,
        }
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Expand top-level tokens, then shut the writer down.
    ///
    /// `-` reads tokens from `stdin` and an existing file contributes one token
    /// per line. Tokens read that way are never treated as files or stdin again,
    /// so a literal `-` inside a target file is passed through as a name.
    pub async fn expand<I, S, R>(&mut self, tokens: I, stdin: R) -> Result<u64>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        R: AsyncRead + Unpin,
    {
        let mut stdin = BufReader::new(stdin);

        for token in tokens {
            let token = token.as_ref();
            if token.is_empty() {
                continue;
            }

            if token == STDIN_TOKEN {
                log::debug!("[target] reading_stdin");
                self.expand_lines(&mut stdin).await.wrap_err("Failed to read targets from stdin")?;
                continue;
            }

            if is_regular_file(token).await {
                log::debug!("[target] reading_file: path={}", token);
                let file = tokio::fs::File::open(token)
                    .await
                    .wrap_err_with(|| format!("Failed to open target file {}", token))?;
                self.expand_lines(BufReader::new(file))
                    .await
                    .wrap_err_with(|| format!("Failed to read target file {}", token))?;
                continue;
            }

            self.emit_token(token).await?;
        }

        self.writer.shutdown().await.wrap_err("Failed to close target stream")?;
        log::debug!("[target] expand_finished: emitted={}", self.emitted);
        Ok(self.emitted)
    }

    async fn expand_lines<R>(&mut self, reader: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let token = line.trim();
            if !token.is_empty() {
                self.emit_token(token).await?;
            }
        }
        Ok(())
    }

    async fn emit_token(&mut self, token: &str) -> Result<()> {
        match TargetKind::parse(token) {
            TargetKind::Network(network) => {
                let mut count = 0u64;
                for addr in usable_hosts(network) {
                    self.emit_line(&addr.to_string()).await?;
                    count += 1;
                }
                log::debug!("[target] cidr_expanded: network={} count={}", network, count);
            }
            TargetKind::Address(_) | TargetKind::Name(_) => {
                log::trace!("[target] target_passed: target={}", token);
                self.emit_line(token).await?;
            }
        }
        Ok(())
    }

    async fn emit_line(&mut self, target: &str) -> Result<()> {
        let line = format!("{}\n", target);
        self.writer
            .write_all(line.as_bytes())
            .await
            .wrap_err("Failed to write target to scanner")?;
        self.writer.flush().await?;
        self.progress.add_expected(1);
        self.emitted += 1;
        Ok(())
    }
}

async fn is_regular_file(path: &str) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressSnapshot;
    use std::io::Write;
    use std::net::{Ipv4Addr, Ipv6Addr};

    async fn expand_tokens(tokens: &[&str], stdin: &[u8]) -> (String, u64, ProgressSnapshot) {
        let progress = Arc::new(ProgressTracker::new());
        let mut expander = TargetExpander::new(Vec::new(), Arc::clone(&progress));
        let emitted = expander.expand(tokens.iter().copied(), stdin).await.unwrap();
        let output = String::from_utf8(expander.writer).unwrap();
        (output, emitted, progress.snapshot())
    }

    #[test]
    fn test_parse_network() {
        let kind = TargetKind::parse("192.0.2.0/30");
        assert!(matches!(kind, TargetKind::Network(IpNetwork::V4(_))));
    }

    #[test]
    fn test_parse_network_with_host_bits_is_name() {
        assert_eq!(TargetKind::parse("192.0.2.1/30"), TargetKind::Name("192.0.2.1/30".to_string()));
    }

    #[test]
    fn test_parse_ip_address() {
        assert_eq!(
            TargetKind::parse("192.168.1.1"),
            TargetKind::Address(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)))
        );
    }

    #[test]
    fn test_parse_ipv6() {
        assert_eq!(
            TargetKind::parse("2001:db8::1"),
            TargetKind::Address(IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)))
        );
    }

    #[test]
    fn test_parse_domain() {
        assert_eq!(TargetKind::parse("scanme.nmap.org"), TargetKind::Name("scanme.nmap.org".to_string()));
        assert_eq!(TargetKind::parse("10.0.0.0/40"), TargetKind::Name("10.0.0.0/40".to_string()));
    }

    #[test]
    fn test_usable_host_counts() {
        let count = |cidr: &str| usable_hosts(cidr.parse().unwrap()).count();
        assert_eq!(count("192.0.2.0/30"), 2);
        assert_eq!(count("192.0.2.0/24"), 254);
        assert_eq!(count("192.0.2.0/31"), 2);
        assert_eq!(count("192.0.2.7/32"), 1);
        assert_eq!(count("2001:db8::/126"), 3);
        assert_eq!(count("2001:db8::/127"), 2);
    }

    #[tokio::test]
    async fn test_cidr_expansion_counts_each_address() {
        let (output, emitted, snapshot) = expand_tokens(&["192.0.2.0/30"], b"").await;
        assert_eq!(output, "192.0.2.1\n192.0.2.2\n");
        assert_eq!(emitted, 2);
        assert_eq!(snapshot.expected, 2);
    }

    #[tokio::test]
    async fn test_addresses_and_names_pass_through() {
        let (output, emitted, _) = expand_tokens(&["", "192.0.2.9", "scanme.nmap.org", "2001:db8::1"], b"").await;
        assert_eq!(output, "192.0.2.9\nscanme.nmap.org\n2001:db8::1\n");
        assert_eq!(emitted, 3);
    }

    #[tokio::test]
    async fn test_stdin_token_reads_lines() {
        let stdin = b"192.0.2.0/30\n\n  scanme.nmap.org  \n-\n";
        let (output, emitted, _) = expand_tokens(&["-"], stdin).await;
        assert_eq!(output, "192.0.2.1\n192.0.2.2\nscanme.nmap.org\n-\n");
        assert_eq!(emitted, 4);
    }

    #[tokio::test]
    async fn test_file_token_expands_without_recursing() {
        let mut inner = tempfile::NamedTempFile::new().unwrap();
        writeln!(inner, "10.9.9.9").unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "192.0.2.8/30").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{}", inner.path().display()).unwrap();
        writeln!(file, "-").unwrap();

        let path = file.path().display().to_string();
        let (output, emitted, _) = expand_tokens(&[&path, "192.0.2.50"], b"ignored\n").await;

        let lines: Vec<_> = output.lines().collect();
        assert_eq!(
            lines,
            vec!["192.0.2.9", "192.0.2.10", inner.path().to_str().unwrap(), "-", "192.0.2.50"]
        );
        assert_eq!(emitted, 5);
    }

    #[tokio::test]
    async fn test_missing_file_falls_through_to_name() {
        let (output, _, _) = expand_tokens(&["/nonexistent/targets.txt"], b"").await;
        assert_eq!(output, "/nonexistent/targets.txt\n");
    }
}
