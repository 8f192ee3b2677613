use crate::errors::ProbeError;
use crate::types::{Outcome, Sample, Target};
use chrono::Utc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Dial deadline plus the RTT recorded for losses.
#[derive(Debug, Clone, Copy)]
pub struct DialPolicy {
    pub timeout: Duration,
    /// Refusals and other failures record `timeout * failed_rtt_multiplier`.
    pub failed_rtt_multiplier: u32,
}

impl DialPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, failed_rtt_multiplier: 1 }
    }

    /// RTT reported for a lost attempt with this outcome.
    pub fn sentinel(&self, outcome: &Outcome) -> Duration {
        match outcome {
            Outcome::Failed(_) => self
                .timeout
                .checked_mul(self.failed_rtt_multiplier.max(1))
                .unwrap_or(Duration::MAX),
            Outcome::Success(_) | Outcome::TimedOut => self.timeout,
        }
    }
}

/// Dial `target` once and classify the result.
///
/// The deadline covers name resolution and the handshake. A successful
/// connection is closed right after measuring; failures never propagate, they
/// are folded into the returned sample.
pub async fn tcp_probe(target: &Target, hostname: &str, policy: &DialPolicy) -> Sample {
    let ts = Utc::now();
    let start = Instant::now();

    let dial = TcpStream::connect((target.host.as_str(), target.port));
    let outcome = match timeout(policy.timeout, dial).await {
        Ok(Ok(stream)) => {
            let rtt = start.elapsed();
            close(stream, target).await;
            Outcome::Success(rtt)
        }
        Ok(Err(e)) => {
            let err = ProbeError::from_io(&e, policy.timeout);
            debug!(addr = %target, error = %err, "dial failed");
            match err {
                ProbeError::Timeout(_) => Outcome::TimedOut,
                other => Outcome::Failed(other.to_string()),
            }
        }
        Err(_) => {
            let timeout_ms = policy.timeout.as_millis() as u64;
            debug!(addr = %target, timeout_ms, "dial timed out");
            Outcome::TimedOut
        }
    };

    let sentinel = policy.sentinel(&outcome);
    Sample { ts, hostname: hostname.to_string(), target: target.clone(), outcome, sentinel }
}

async fn close(mut stream: TcpStream, target: &Target) {
    // peers that hang up first make shutdown fail; that is not a probe failure
    if let Err(e) = stream.shutdown().await {
        debug!(addr = %target, error = %e, "closing probe connection failed");
    }
}
