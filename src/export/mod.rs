//! Best-effort delivery of samples and aggregates to external metrics
//! backends.
//!
//! The consumer hands messages to a bounded queue with `try_send`; a separate
//! task drives the sinks. A full queue or a failing sink costs a log line,
//! never a stalled probe loop.

pub mod histogram;
pub mod influx;

use crate::errors::ExportError;
use crate::types::Sample;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use histogram::StatsdHistogram;
pub use influx::{InfluxWriter, LinePoint};

/// Queue depth between the consumer and the sink task.
pub const EXPORT_QUEUE_CAPACITY: usize = 1024;

/// How long shutdown waits for sinks to drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Rolling statistics for one scope (a window or the running total).
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatePoint {
    pub ts: DateTime<Utc>,
    pub hostname: String,
    /// e.g. `last_100`, `last_1000`, `total`
    pub scope: String,
    pub count: u64,
    pub mean_ms: Option<f64>,
    pub max_ms: Option<f64>,
    pub std_dev_ms: Option<f64>,
    pub loss_rate: f64,
}

#[async_trait]
pub trait MetricsSink: Send {
    /// Human name for logging
    fn name(&self) -> &'static str;

    /// Whether [`observe`](Self::observe) does anything; samples are not
    /// queued when no sink wants them.
    fn observes_samples(&self) -> bool {
        true
    }

    async fn observe(&mut self, _sample: &Sample) -> Result<(), ExportError> {
        Ok(())
    }

    async fn aggregate(&mut self, _points: &[AggregatePoint]) -> Result<(), ExportError> {
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ExportError> {
        Ok(())
    }
}

pub type SinkHandle = Box<dyn MetricsSink>;

enum ExportMsg {
    Sample(Sample),
    Aggregate(Vec<AggregatePoint>),
}

/// Fire-and-forget front of the sink task.
pub struct Exporter {
    tx: Option<mpsc::Sender<ExportMsg>>,
    handle: Option<JoinHandle<()>>,
    wants_samples: bool,
    dropped: u64,
}

impl Exporter {
    /// Start a task driving `sinks`. With no sinks nothing is spawned.
    pub fn spawn(sinks: Vec<SinkHandle>, capacity: usize) -> Self {
        if sinks.is_empty() {
            return Self::disabled();
        }
        let wants_samples = sinks.iter().any(|s| s.observes_samples());
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(drive(rx, sinks));
        Self { tx: Some(tx), handle: Some(handle), wants_samples, dropped: 0 }
    }

    pub fn disabled() -> Self {
        Self { tx: None, handle: None, wants_samples: false, dropped: 0 }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn sample(&mut self, sample: &Sample) {
        if !self.wants_samples {
            return;
        }
        self.offer(ExportMsg::Sample(sample.clone()));
    }

    pub fn aggregate(&mut self, points: Vec<AggregatePoint>) {
        self.offer(ExportMsg::Aggregate(points));
    }

    /// Messages discarded because the queue was full or the task was gone.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn offer(&mut self, msg: ExportMsg) {
        let Some(tx) = self.tx.as_ref() else { return };
        if let Err(e) = tx.try_send(msg) {
            self.dropped += 1;
            debug!(error = %e, dropped = self.dropped, "export queue unavailable; dropping");
        }
    }

    /// Close the queue and give the sinks a bounded grace period to flush.
    pub async fn shutdown(mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "export task failed"),
                Err(_) => warn!("export task did not finish in time; abandoning"),
            }
        }
    }
}

async fn drive(mut rx: mpsc::Receiver<ExportMsg>, mut sinks: Vec<SinkHandle>) {
    while let Some(msg) = rx.recv().await {
        for sink in sinks.iter_mut() {
            let res = match &msg {
                ExportMsg::Sample(s) => sink.observe(s).await,
                ExportMsg::Aggregate(points) => sink.aggregate(points).await,
            };
            if let Err(e) = res {
                debug!(sink = sink.name(), error = %e, "export failed");
            }
        }
    }
    for sink in sinks.iter_mut() {
        if let Err(e) = sink.flush().await {
            warn!(sink = sink.name(), error = %e, "final export flush failed");
        }
    }
}
