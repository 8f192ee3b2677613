use crate::probes::DialPolicy;
use crate::types::Target;
use anyhow::{bail, Context, Result};
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on simultaneous dials accepted from configuration.
pub const MAX_CONNECTIONS_LIMIT: usize = 4096;

/// Everything one probing run needs.
#[derive(Debug, Clone, Serialize)]
pub struct ConnConfig {
    pub targets: Vec<Target>,
    pub hostname: String,
    pub output_dir: PathBuf,
    #[serde(serialize_with = "as_millis")]
    pub timeout: Duration,
    #[serde(serialize_with = "as_millis")]
    pub interval: Duration,
    /// Total attempts across all targets; 0 runs until stopped.
    pub count: u64,
    pub max_connections: usize,
    pub only_summary: bool,
    pub histogram_addr: Option<String>,
    pub influx_url: Option<String>,
    #[serde(serialize_with = "as_millis")]
    pub flush_interval: Duration,
    /// Attempts per stage before folding into the summary.
    pub stage_size: u64,
    pub failed_rtt_multiplier: u32,
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl ConnConfig {
    /// Defaults matching the command line, for the given targets.
    pub fn for_targets(targets: Vec<Target>) -> Self {
        Self {
            targets,
            hostname: "localhost".to_string(),
            output_dir: PathBuf::from("."),
            timeout: Duration::from_secs(2),
            interval: Duration::from_secs(1),
            count: 0,
            max_connections: 1000,
            only_summary: false,
            histogram_addr: None,
            influx_url: None,
            flush_interval: Duration::from_secs(10),
            stage_size: 100,
            failed_rtt_multiplier: 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            bail!("no address to connect; pass at least one --address host:port");
        }
        if self.max_connections == 0 || self.max_connections > MAX_CONNECTIONS_LIMIT {
            bail!("--max-connections must be between 1 and {}", MAX_CONNECTIONS_LIMIT);
        }
        if self.timeout.is_zero() {
            bail!("--timeout-ms must be greater than 0");
        }
        if self.stage_size == 0 {
            bail!("--stage-size must be greater than 0");
        }
        if self.flush_interval.is_zero() {
            bail!("--flush-interval-secs must be greater than 0");
        }
        if self.failed_rtt_multiplier == 0 {
            bail!("--failed-rtt-multiplier must be at least 1");
        }
        if self.hostname.is_empty() || self.hostname.contains(['/', '\\']) {
            bail!("invalid hostname {:?}", self.hostname);
        }
        Ok(())
    }

    pub fn dial_policy(&self) -> DialPolicy {
        DialPolicy { timeout: self.timeout, failed_rtt_multiplier: self.failed_rtt_multiplier }
    }

    /// True once `dispatched` attempts satisfy the configured count.
    pub fn exhausted(&self, dispatched: u64) -> bool {
        self.count > 0 && dispatched >= self.count
    }
}

/// Parse `host:port` (`[v6]:port` for IPv6 literals).
pub fn parse_target(spec: &str) -> Result<Target> {
    let spec = spec.trim();
    let (host, port) = spec
        .rsplit_once(':')
        .with_context(|| format!("address {:?} is not host:port", spec))?;
    let host = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
    if host.is_empty() {
        bail!("address {:?} has an empty host", spec);
    }
    if host.contains(':') && !spec.starts_with('[') {
        bail!("IPv6 address {:?} must be written as [addr]:port", spec);
    }
    let port: u16 = port.parse().with_context(|| format!("invalid port in {:?}", spec))?;
    if port == 0 {
        bail!("port 0 in {:?} is not dialable", spec);
    }
    Ok(Target::new(host, port))
}

/// Parse every address, skipping blanks and dropping duplicates (first wins).
pub fn parse_targets<S: AsRef<str>>(specs: &[S]) -> Result<Vec<Target>> {
    let mut out: Vec<Target> = Vec::new();
    for spec in specs.iter().map(AsRef::as_ref).filter(|s| !s.trim().is_empty()) {
        let t = parse_target(spec)?;
        if !out.contains(&t) {
            out.push(t);
        }
    }
    Ok(out)
}
