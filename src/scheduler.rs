use crate::cli::Cli;
use crate::config::ConnConfig;
use crate::consumer::{Consumer, ConsumerReport};
use crate::export::{
    Exporter, InfluxWriter, SinkHandle, StatsdHistogram, EXPORT_QUEUE_CAPACITY,
};
use crate::persist::Persister;
use crate::probes::{tcp_probe, DialPolicy};
use crate::types::{Sample, Target};
use crate::utils::ConcurrencyLimiter;
use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

/// Minimum capacity of the probe → consumer channel.
pub const SAMPLE_QUEUE_CAPACITY: usize = 1000;

/// Receiving side of the stop signal.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Triggers [`Shutdown`]. Dropping it without triggering means "never stop".
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

pub fn shutdown_pair() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop was requested.
    pub async fn triggered(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub dispatched: u64,
    pub consumer: ConsumerReport,
}

/// Drives the probe cadence: one dial per target per round, then the
/// configured pause, until the attempt budget is spent or a stop arrives.
pub struct Scheduler {
    targets: Vec<Target>,
    hostname: String,
    policy: DialPolicy,
    interval: Duration,
    config: ConnConfig,
    limiter: ConcurrencyLimiter,
}

impl Scheduler {
    pub fn new(config: &ConnConfig, limiter: ConcurrencyLimiter) -> Self {
        Self {
            targets: config.targets.clone(),
            hostname: config.hostname.clone(),
            policy: config.dial_policy(),
            interval: config.interval,
            config: config.clone(),
            limiter,
        }
    }

    /// Dispatch probes, sending each finished sample on `tx`.
    ///
    /// Every attempt reserves its place in the channel before it dials, so
    /// samples waiting for the consumer never exceed the channel capacity.
    /// Returns the number of attempts dispatched once every one of them has
    /// delivered its sample.
    pub async fn dispatch(
        &self,
        tx: mpsc::Sender<Sample>,
        mut shutdown: Shutdown,
    ) -> Result<u64> {
        let mut dispatched = 0u64;
        let mut in_flight: FuturesUnordered<JoinHandle<()>> = FuturesUnordered::new();

        'rounds: loop {
            for target in &self.targets {
                if self.config.exhausted(dispatched) || shutdown.is_triggered() {
                    break 'rounds;
                }

                // queue space first: a stalled consumer stops dispatch instead of
                // piling finished samples up behind the channel
                let permit = tokio::select! {
                    permit = tx.clone().reserve_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => {
                            warn!("sample consumer is gone; stopping dispatch");
                            break 'rounds;
                        }
                    },
                    _ = shutdown.triggered() => break 'rounds,
                };
                // take the slot before spawning so a saturated limiter paces dispatch
                let slot = tokio::select! {
                    slot = self.limiter.acquire() => slot?,
                    _ = shutdown.triggered() => break 'rounds,
                };
                dispatched += 1;

                let target = target.clone();
                let hostname = self.hostname.clone();
                let policy = self.policy;
                in_flight.push(tokio::spawn(async move {
                    let sample = tcp_probe(&target, &hostname, &policy).await;
                    slot.release();
                    permit.send(sample);
                }));
            }

            if self.config.exhausted(dispatched) {
                break;
            }

            while let Some(Some(res)) = in_flight.next().now_or_never() {
                reap(res);
            }

            let pause = tokio::time::sleep(self.interval);
            tokio::pin!(pause);
            loop {
                tokio::select! {
                    _ = &mut pause => break,
                    _ = shutdown.triggered() => break 'rounds,
                    Some(res) = in_flight.next(), if !in_flight.is_empty() => reap(res),
                }
            }
        }

        drop(tx);
        if shutdown.is_triggered() {
            info!(in_flight = in_flight.len(), "stop requested; waiting for in-flight probes");
        }
        while let Some(res) = in_flight.next().await {
            reap(res);
        }
        Ok(dispatched)
    }
}

fn reap(res: std::result::Result<(), JoinError>) {
    if let Err(e) = res {
        error!(error = %e, "probe task failed; its sample is missing");
    }
}

/// Connect the configured sinks. A sink that cannot be set up is skipped.
pub async fn build_exporter(config: &ConnConfig) -> Exporter {
    let mut sinks: Vec<SinkHandle> = Vec::new();
    if let Some(addr) = &config.histogram_addr {
        match StatsdHistogram::connect(addr).await {
            Ok(sink) => sinks.push(Box::new(sink)),
            Err(e) => warn!(addr = %addr, error = %e, "histogram sink disabled"),
        }
    }
    if let Some(url) = &config.influx_url {
        match InfluxWriter::new(url.clone(), config.timeout.max(Duration::from_secs(5))) {
            Ok(sink) => sinks.push(Box::new(sink)),
            Err(e) => warn!(url = %url, error = %e, "line protocol sink disabled"),
        }
    }
    Exporter::spawn(sinks, EXPORT_QUEUE_CAPACITY)
}

/// Run one probing session end to end: dispatch, consume, flush.
pub async fn run_with_shutdown(config: ConnConfig, shutdown: Shutdown) -> Result<RunReport> {
    config.validate()?;
    let exporter = build_exporter(&config).await;
    let persister = Persister::new(&config.output_dir, &config.hostname);
    // a queue smaller than the limiter would cap concurrency below max_connections
    let (tx, rx) = mpsc::channel(SAMPLE_QUEUE_CAPACITY.max(config.max_connections));
    let consumer = tokio::spawn(Consumer::new(&config, persister, exporter).run(rx));

    let scheduler = Scheduler::new(&config, ConcurrencyLimiter::new(config.max_connections));
    let dispatched = scheduler.dispatch(tx, shutdown).await;
    // the consumer finishes once the last probe drops its sender
    let consumer = consumer.await?;
    let dispatched = dispatched?;

    if consumer.recorded != dispatched {
        error!(
            dispatched,
            recorded = consumer.recorded,
            "dispatched and recorded attempts differ"
        );
    }
    Ok(RunReport { dispatched, consumer })
}

/// Entry point for the binary: parse, wire Ctrl-C, run.
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.to_config()?;
    info!(config = %serde_json::to_string(&config)?, "init args");

    let (handle, shutdown) = shutdown_pair();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            eprintln!("Received interrupt, shutting down gracefully...");
            handle.trigger();
        }
    });

    let report = run_with_shutdown(config, shutdown).await?;
    info!(
        dispatched = report.dispatched,
        recorded = report.consumer.recorded,
        rows = report.consumer.rows_written,
        "run complete"
    );
    Ok(())
}
