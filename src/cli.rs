use crate::config::{parse_targets, ConnConfig};
use anyhow::Result;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "rustlite-ping",
    about = "Continuous TCP reachability prober (handshake RTT and loss)"
)]
pub struct Cli {
    /// Targets as host:port; repeat the flag or separate with commas
    #[arg(
        short,
        long = "address",
        value_name = "HOST:PORT",
        value_delimiter = ',',
        env = "RLP_ADDRESSES"
    )]
    pub addresses: Vec<String>,

    /// Extra targets given positionally
    #[arg(value_name = "HOST:PORT")]
    pub extra: Vec<String>,

    /// Dial timeout in milliseconds
    #[arg(short = 't', long, default_value_t = 2000, env = "RLP_TIMEOUT_MS")]
    pub timeout_ms: u64,

    /// Pause between probe rounds in milliseconds
    #[arg(short = 'i', long, default_value_t = 1000, env = "RLP_INTERVAL_MS")]
    pub interval_ms: u64,

    /// Total attempts across all targets (0 = until interrupted)
    #[arg(short = 'c', long, default_value_t = 0, env = "RLP_COUNT")]
    pub count: u64,

    /// Maximum simultaneous TCP dials
    #[arg(long, default_value_t = 1000, env = "RLP_MAX_CONNECTIONS")]
    pub max_connections: usize,

    /// Only print periodic summaries, not every sample
    #[arg(long, action = ArgAction::SetTrue)]
    pub only_summary: bool,

    /// Name of this machine, used in file names and metric tags
    #[arg(long, env = "HOSTNAME", default_value = "localhost")]
    pub hostname: String,

    /// Directory for the hourly CSV logs
    #[arg(long, value_name = "DIR", default_value = ".", env = "RLP_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// statsd agent (host:port) receiving per-sample histogram observations
    #[arg(long, value_name = "HOST:PORT", env = "RLP_HISTOGRAM_ADDR")]
    pub histogram_addr: Option<String>,

    /// Line-protocol write endpoint, e.g. http://influx:8086/write?db=statsd
    #[arg(long, value_name = "URL", env = "RLP_INFLUX_URL")]
    pub influx_url: Option<String>,

    /// Upper bound between fsyncs of the CSV log, in seconds
    #[arg(long, default_value_t = 10)]
    pub flush_interval_secs: u64,

    /// Attempts per stage before folding into the running summary
    #[arg(long, default_value_t = 100)]
    pub stage_size: u64,

    /// Refused/failed dials record timeout x this as their RTT
    #[arg(long, default_value_t = 1)]
    pub failed_rtt_multiplier: u32,
}

impl Cli {
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Build and validate the run configuration.
    pub fn to_config(&self) -> Result<ConnConfig> {
        let specs: Vec<&String> = self.addresses.iter().chain(self.extra.iter()).collect();
        let config = ConnConfig {
            targets: parse_targets(&specs)?,
            hostname: self.hostname.clone(),
            output_dir: self.output_dir.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            interval: Duration::from_millis(self.interval_ms),
            count: self.count,
            max_connections: self.max_connections,
            only_summary: self.only_summary,
            histogram_addr: self.histogram_addr.clone().filter(|s| !s.is_empty()),
            influx_url: self.influx_url.clone().filter(|s| !s.is_empty()),
            flush_interval: Duration::from_secs(self.flush_interval_secs),
            stage_size: self.stage_size,
            failed_rtt_multiplier: self.failed_rtt_multiplier,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Target;

    #[test]
    fn flags_and_positionals_combine() {
        let cli = Cli::try_parse_from([
            "rustlite-ping",
            "-a",
            "10.0.0.1:80,10.0.0.2:22",
            "-c",
            "10",
            "--only-summary",
            "--hostname",
            "edge-1",
            "10.0.0.3:443",
        ])
        .unwrap();
        let cfg = cli.to_config().unwrap();
        assert_eq!(
            cfg.targets,
            vec![
                Target::new("10.0.0.1", 80),
                Target::new("10.0.0.2", 22),
                Target::new("10.0.0.3", 443),
            ]
        );
        assert_eq!(cfg.count, 10);
        assert!(cfg.only_summary);
        assert_eq!(cfg.hostname, "edge-1");
        assert_eq!(cfg.timeout, Duration::from_secs(2));
    }

    #[test]
    fn missing_address_is_rejected() {
        let cli = Cli::try_parse_from(["rustlite-ping", "--hostname", "edge-1"]).unwrap();
        assert!(cli.to_config().is_err());
    }
}
