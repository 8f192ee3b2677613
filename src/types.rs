use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// A probe destination (`host:port`) as configured.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // bare IPv6 literals need brackets to stay parseable
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Result of one dial attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(Duration),
    TimedOut,
    Failed(String),
}

impl Outcome {
    pub fn is_loss(&self) -> bool {
        !matches!(self, Outcome::Success(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "ok",
            Outcome::TimedOut => "timeout",
            Outcome::Failed(_) => "failed",
        }
    }
}

/// One completed probe attempt. Produced by the prober, consumed once by the
/// stats/persistence consumer.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Wall-clock time the dial started.
    pub ts: DateTime<Utc>,
    /// Name of the probing machine.
    pub hostname: String,
    pub target: Target,
    pub outcome: Outcome,
    /// RTT reported for a loss so it stays comparable with real latencies.
    pub sentinel: Duration,
}

impl Sample {
    pub fn is_loss(&self) -> bool {
        self.outcome.is_loss()
    }

    /// Measured RTT on success, the sentinel otherwise.
    pub fn rtt(&self) -> Duration {
        match self.outcome {
            Outcome::Success(rtt) => rtt,
            Outcome::TimedOut | Outcome::Failed(_) => self.sentinel,
        }
    }

    pub fn rtt_ms(&self) -> f64 {
        millis(self.rtt())
    }
}

/// Fractional milliseconds, the unit every report uses.
pub fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
