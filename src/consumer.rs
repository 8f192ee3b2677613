//! The single writer: every sample passes through here exactly once.
//!
//! The consumer owns the sliding windows, the stage/summary pair, the CSV
//! persister and the exporter front. Nothing else touches them, so none of
//! them needs a lock.

use crate::config::ConnConfig;
use crate::export::{AggregatePoint, Exporter};
use crate::persist::Persister;
use crate::stats::{Entry, StatsWindow, Summary};
use crate::types::{millis, Sample};
use chrono::Utc;
use colored::*;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub const RECENT_WINDOW: usize = 100;
pub const LONG_WINDOW: usize = 1000;

/// Consecutive persistence failures before raising an alert.
pub const PERSIST_ALERT_THRESHOLD: u32 = 5;

/// What the consumer hands back once its channel closes.
#[derive(Debug, Clone)]
pub struct ConsumerReport {
    pub recorded: u64,
    pub summary: Summary,
    pub rows_written: u64,
    pub persist_failures: u64,
    /// Alerts raised for sustained persistence failures.
    pub persist_alerts: u64,
    pub export_dropped: u64,
    pub files: Vec<PathBuf>,
}

pub struct Consumer {
    hostname: String,
    timeout: Duration,
    stage_size: u64,
    flush_interval: Duration,
    only_summary: bool,

    recent: StatsWindow,
    long: StatsWindow,
    stage: Summary,
    total: Summary,
    recorded: u64,

    persister: Persister,
    persist_streak: u32,
    persist_failures: u64,
    persist_alerts: u64,

    exporter: Exporter,
}

impl Consumer {
    pub fn new(config: &ConnConfig, persister: Persister, exporter: Exporter) -> Self {
        Self {
            hostname: config.hostname.clone(),
            timeout: config.timeout,
            stage_size: config.stage_size.max(1),
            flush_interval: config.flush_interval,
            only_summary: config.only_summary,
            recent: StatsWindow::new(RECENT_WINDOW),
            long: StatsWindow::new(LONG_WINDOW),
            stage: Summary::new(),
            total: Summary::new(),
            recorded: 0,
            persister,
            persist_streak: 0,
            persist_failures: 0,
            persist_alerts: 0,
            exporter,
        }
    }

    /// Drain `rx` until every sender is gone, then flush and report.
    ///
    /// Buffered rows go to the OS whenever the channel is momentarily empty;
    /// an fsync happens at least every `flush_interval`.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Sample>) -> ConsumerReport {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(sample) => {
                        self.record(&sample);
                        if rx.is_empty() {
                            self.flush();
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => self.sync(),
            }
        }

        self.finish().await
    }

    /// Fold one sample into every piece of state.
    pub fn record(&mut self, sample: &Sample) {
        self.recorded += 1;
        let entry = Entry::from(sample);
        self.recent.push(entry);
        self.long.push(entry);
        self.stage.record(sample);

        if !self.only_summary {
            print_sample(self.recorded, sample);
        }

        match self.persister.append(sample) {
            Ok(()) => self.persist_streak = 0,
            Err(e) => self.persist_failed("write", &e),
        }

        self.exporter.sample(sample);

        if self.recorded % self.stage_size == 0 {
            self.close_stage();
        }
    }

    fn close_stage(&mut self) {
        println!();
        println!("{} [{}]", "stage information:".bold(), self.stage);
        self.total.merge(&self.stage);
        println!("{} [{}]", "summary information:".bold(), self.total);
        self.stage = Summary::new();
        self.print_windows();
        let points = self.aggregate_points();
        self.exporter.aggregate(points);
    }

    fn print_windows(&self) {
        println!(
            "attempts so far: {}, failed: {}, mean rtt: {}",
            self.total.count,
            self.total.loss_count,
            fmt_opt_ms(self.total.mean())
        );
        for w in [&self.recent, &self.long] {
            println!(
                "  last {:>4}: {} failed, mean rtt {}, max rtt {}, stddev {}",
                w.capacity(),
                w.loss_count_over(self.timeout),
                fmt_opt_ms(w.mean()),
                fmt_opt_ms(w.max()),
                fmt_opt_ms(w.std_dev()),
            );
        }
        println!();
    }

    fn aggregate_points(&self) -> Vec<AggregatePoint> {
        let ts = Utc::now();
        let mut points: Vec<AggregatePoint> = [&self.recent, &self.long]
            .into_iter()
            .map(|w| AggregatePoint {
                ts,
                hostname: self.hostname.clone(),
                scope: format!("last_{}", w.capacity()),
                count: w.len() as u64,
                mean_ms: w.mean().map(millis),
                max_ms: w.max().map(millis),
                std_dev_ms: w.std_dev().map(millis),
                loss_rate: w.loss_rate(),
            })
            .collect();
        points.push(AggregatePoint {
            ts,
            hostname: self.hostname.clone(),
            scope: "total".to_string(),
            count: self.total.count,
            mean_ms: self.total.mean().map(millis),
            max_ms: self.total.max.map(millis),
            std_dev_ms: None,
            loss_rate: self.total.loss_rate(),
        });
        points
    }

    fn flush(&mut self) {
        if let Err(e) = self.persister.flush() {
            self.persist_failed("flush", &e);
        }
    }

    fn sync(&mut self) {
        if let Err(e) = self.persister.sync() {
            self.persist_failed("sync", &e);
        }
    }

    fn persist_failed(&mut self, op: &str, e: &crate::errors::PersistError) {
        self.persist_streak += 1;
        self.persist_failures += 1;
        if self.persist_streak % PERSIST_ALERT_THRESHOLD == 0 {
            self.persist_alerts += 1;
            error!(
                op,
                error = %e,
                consecutive = self.persist_streak,
                "sample log keeps failing; samples are only kept in memory"
            );
            eprintln!(
                "{} sample log failing ({} consecutive errors): {}",
                "ALERT:".red().bold(),
                self.persist_streak,
                e
            );
        } else {
            warn!(op, error = %e, "sample log write failed");
        }
    }

    /// Final flush, partial stage merge and closing report.
    pub async fn finish(mut self) -> ConsumerReport {
        self.sync();
        if !self.stage.is_empty() {
            self.total.merge(&self.stage);
            self.stage = Summary::new();
        }
        if self.total.count > 0 {
            println!();
            println!("{} [{}]", "final summary:".bold().underline(), self.total);
            self.print_windows();
            let points = self.aggregate_points();
            self.exporter.aggregate(points);
        }

        let export_dropped = self.exporter.dropped();
        self.exporter.shutdown().await;
        info!(
            recorded = self.recorded,
            rows = self.persister.rows_written(),
            persist_failures = self.persist_failures,
            "consumer finished"
        );

        ConsumerReport {
            recorded: self.recorded,
            summary: self.total,
            rows_written: self.persister.rows_written(),
            persist_failures: self.persist_failures,
            persist_alerts: self.persist_alerts,
            export_dropped,
            files: self.persister.files().to_vec(),
        }
    }
}

fn fmt_opt_ms(d: Option<Duration>) -> String {
    d.map(|d| format!("{:.2}ms", millis(d))).unwrap_or_else(|| "-".to_string())
}

fn print_sample(seq: u64, sample: &Sample) {
    let line = format!("tcp-ping ({}) seq={} rtt={:.2}ms", sample.target, seq, sample.rtt_ms());
    if sample.is_loss() {
        println!("{} {}", line.red(), sample.outcome.label().red());
    } else {
        println!("{}", line.green());
    }
}
