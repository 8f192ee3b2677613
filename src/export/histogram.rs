use super::MetricsSink;
use crate::errors::ExportError;
use crate::types::Sample;
use async_trait::async_trait;
use tokio::net::UdpSocket;

pub const METRIC_NAME: &str = "tcp-monitor";

/// Pushes one histogram observation per sample as a DogStatsD datagram:
/// `tcp-monitor:<rtt_ms>|h|#host:<hostname>,address:<target>,error:<bool>`.
///
/// Losses are sent with their sentinel RTT, never omitted.
pub struct StatsdHistogram {
    socket: UdpSocket,
    metric: String,
}

impl StatsdHistogram {
    /// Bind an ephemeral local socket and connect it to the agent at `addr`.
    pub async fn connect(addr: &str) -> Result<Self, ExportError> {
        let socket = UdpSocket::bind(bind_addr_for(addr)).await?;
        socket.connect(addr).await?;
        Ok(Self { socket, metric: METRIC_NAME.to_string() })
    }

    pub fn encode(&self, sample: &Sample) -> String {
        format!(
            "{}:{:.4}|h|#host:{},address:{},error:{}",
            self.metric,
            sample.rtt_ms(),
            sample.hostname,
            sample.target,
            sample.is_loss()
        )
    }
}

fn bind_addr_for(addr: &str) -> &'static str {
    if addr.starts_with('[') {
        "[::]:0"
    } else {
        "0.0.0.0:0"
    }
}

#[async_trait]
impl MetricsSink for StatsdHistogram {
    fn name(&self) -> &'static str {
        "statsd-histogram"
    }

    async fn observe(&mut self, sample: &Sample) -> Result<(), ExportError> {
        self.socket.send(self.encode(sample).as_bytes()).await?;
        Ok(())
    }
}
