use super::{AggregatePoint, MetricsSink};
use crate::errors::ExportError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

pub const MEASUREMENT: &str = "tcp_monitor";

/// One point in InfluxDB line protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct LinePoint {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, f64)>,
    pub ts: DateTime<Utc>,
}

impl LinePoint {
    /// `measurement,tag=value,... field=value,... timestamp_ns`
    pub fn to_line(&self) -> String {
        let mut line = escape(&self.measurement, &[',', ' ']);
        for (k, v) in &self.tags {
            line.push(',');
            line.push_str(&escape(k, &[',', '=', ' ']));
            line.push('=');
            line.push_str(&escape(v, &[',', '=', ' ']));
        }
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", escape(k, &[',', '=', ' ']), v))
            .collect();
        line.push(' ');
        line.push_str(&fields.join(","));
        line.push(' ');
        line.push_str(&self.ts.timestamp_nanos_opt().unwrap_or_default().to_string());
        line
    }
}

impl From<&AggregatePoint> for LinePoint {
    fn from(p: &AggregatePoint) -> Self {
        let mut fields = vec![
            ("count".to_string(), p.count as f64),
            ("loss_rate".to_string(), p.loss_rate),
        ];
        let optional = [("mean_ms", p.mean_ms), ("max_ms", p.max_ms), ("stddev_ms", p.std_dev_ms)];
        for (name, value) in optional {
            if let Some(v) = value {
                fields.push((name.to_string(), v));
            }
        }
        Self {
            measurement: MEASUREMENT.to_string(),
            tags: vec![
                ("host".to_string(), p.hostname.clone()),
                ("scope".to_string(), p.scope.clone()),
            ],
            fields,
            ts: p.ts,
        }
    }
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Batches aggregate points and POSTs them to a line-protocol write endpoint
/// (e.g. `http://influx:8086/write?db=statsd`). No retries.
pub struct InfluxWriter {
    client: Client,
    url: String,
    batch: Vec<String>,
}

impl InfluxWriter {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ExportError> {
        let client = Client::builder().timeout(timeout).no_proxy().build()?;
        Ok(Self { client, url: url.into(), batch: Vec::new() })
    }

    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    async fn ship(&mut self) -> Result<(), ExportError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        // the batch is gone either way; delivery is fire-and-forget
        let body = std::mem::take(&mut self.batch).join("\n");
        let resp = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        debug!(status = status.as_u16(), "line protocol write");
        if status.is_success() {
            Ok(())
        } else {
            Err(ExportError::Status(status.as_u16()))
        }
    }
}

#[async_trait]
impl MetricsSink for InfluxWriter {
    fn name(&self) -> &'static str {
        "influx-line"
    }

    fn observes_samples(&self) -> bool {
        false
    }

    async fn aggregate(&mut self, points: &[AggregatePoint]) -> Result<(), ExportError> {
        // one batch per stage report
        self.batch.extend(points.iter().map(|p| LinePoint::from(p).to_line()));
        self.ship().await
    }

    async fn flush(&mut self) -> Result<(), ExportError> {
        self.ship().await
    }
}
