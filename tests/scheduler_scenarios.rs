// tests/scheduler_scenarios.rs
use std::path::Path;
use std::time::Duration;

use rustlite_ping::config::ConnConfig;
use rustlite_ping::scheduler::{run_with_shutdown, shutdown_pair, Scheduler};
use rustlite_ping::types::Target;
use rustlite_ping::utils::ConcurrencyLimiter;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

fn read_rows(path: &Path) -> Vec<csv::StringRecord> {
    let mut rdr = csv::Reader::from_path(path).unwrap();
    assert_eq!(
        rdr.headers().unwrap(),
        &csv::StringRecord::from(vec!["ts", "hostname", "ip", "port", "rtt_ms", "loss"])
    );
    rdr.records().map(|r| r.unwrap()).collect()
}

fn base_config(target: Target, dir: &Path) -> ConnConfig {
    ConnConfig {
        output_dir: dir.to_path_buf(),
        only_summary: true,
        hostname: "probe-host".into(),
        ..ConnConfig::for_targets(vec![target])
    }
}

/// Reserve a port and release it so nothing listens there.
async fn closed_port() -> u16 {
    let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = l.local_addr().unwrap().port();
    drop(l);
    port
}

#[tokio::test]
async fn closed_port_records_every_attempt_as_loss() {
    let dir = tempfile::tempdir().unwrap();
    let port = closed_port().await;
    let cfg = ConnConfig {
        max_connections: 1,
        count: 5,
        timeout: Duration::from_millis(500),
        interval: Duration::from_millis(10),
        ..base_config(Target::new("127.0.0.1", port), dir.path())
    };

    let (_handle, shutdown) = shutdown_pair();
    let report = run_with_shutdown(cfg, shutdown).await.unwrap();
    assert_eq!(report.dispatched, 5);
    assert_eq!(report.consumer.recorded, 5);
    assert_eq!(report.consumer.summary.loss_count, 5);

    let rows: Vec<_> = report.consumer.files.iter().flat_map(|f| read_rows(f)).collect();
    assert_eq!(rows.len(), 5);
    for row in &rows {
        assert_eq!(&row[1], "probe-host");
        assert_eq!(&row[2], "127.0.0.1");
        assert_eq!(row[3].parse::<u16>().unwrap(), port);
        assert_eq!(&row[5], "true");
        let rtt: f64 = row[4].parse().unwrap();
        assert!((rtt - 500.0).abs() < 1e-6, "loss rtt should be the timeout, got {rtt}");
    }
}

#[tokio::test]
async fn reachable_listener_records_successes() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((sock, _)) => drop(sock),
                Err(_) => break,
            }
        }
    });

    let cfg = ConnConfig {
        count: 3,
        interval: Duration::ZERO,
        ..base_config(Target::new("127.0.0.1", port), dir.path())
    };
    let (_handle, shutdown) = shutdown_pair();
    let report = run_with_shutdown(cfg, shutdown).await.unwrap();
    server.abort();

    assert_eq!(report.dispatched, 3);
    assert_eq!(report.consumer.summary.loss_count, 0);
    let rows: Vec<_> = report.consumer.files.iter().flat_map(|f| read_rows(f)).collect();
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert_eq!(&row[5], "false");
        assert!(row[4].parse::<f64>().unwrap() > 0.0);
    }
}

#[tokio::test]
async fn count_spans_all_targets() {
    let dir = tempfile::tempdir().unwrap();
    let a = closed_port().await;
    let b = closed_port().await;
    let cfg = ConnConfig {
        targets: vec![Target::new("127.0.0.1", a), Target::new("127.0.0.1", b)],
        count: 5,
        timeout: Duration::from_millis(200),
        interval: Duration::from_millis(5),
        ..base_config(Target::new("127.0.0.1", a), dir.path())
    };
    let (_handle, shutdown) = shutdown_pair();
    let report = run_with_shutdown(cfg, shutdown).await.unwrap();
    assert_eq!(report.dispatched, 5);
    assert_eq!(report.consumer.rows_written, 5);
}

#[tokio::test]
async fn stop_signal_ends_unbounded_run_and_flushes() {
    let dir = tempfile::tempdir().unwrap();
    let port = closed_port().await;
    let cfg = ConnConfig {
        count: 0,
        timeout: Duration::from_millis(200),
        interval: Duration::from_millis(20),
        ..base_config(Target::new("127.0.0.1", port), dir.path())
    };

    let (handle, shutdown) = shutdown_pair();
    let run = tokio::spawn(run_with_shutdown(cfg, shutdown));
    tokio::time::sleep(Duration::from_millis(150)).await;
    handle.trigger();

    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run should stop after the signal")
        .unwrap()
        .unwrap();
    assert!(report.dispatched >= 1);
    assert_eq!(report.consumer.recorded, report.dispatched);
    let rows: usize = report.consumer.files.iter().map(|f| read_rows(f).len()).sum();
    assert_eq!(rows as u64, report.dispatched);
}

#[tokio::test]
async fn invalid_config_is_rejected_before_dialing() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = ConnConfig {
        max_connections: 0,
        ..base_config(Target::new("127.0.0.1", 9), dir.path())
    };
    let (_handle, shutdown) = shutdown_pair();
    assert!(run_with_shutdown(cfg, shutdown).await.is_err());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn stalled_consumer_stops_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        while let Ok((sock, _)) = listener.accept().await {
            drop(sock);
        }
    });

    let cfg = ConnConfig {
        count: 0,
        interval: Duration::ZERO,
        max_connections: 2,
        ..base_config(Target::new("127.0.0.1", port), dir.path())
    };
    let scheduler = Scheduler::new(&cfg, ConcurrencyLimiter::new(2));
    // a queue of one that nobody drains
    let (tx, rx) = mpsc::channel(1);
    let (handle, shutdown) = shutdown_pair();
    let dispatch = tokio::spawn(async move { scheduler.dispatch(tx, shutdown).await });

    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.trigger();
    let dispatched = tokio::time::timeout(Duration::from_secs(5), dispatch)
        .await
        .expect("dispatch should stop after the signal")
        .unwrap()
        .unwrap();
    server.abort();

    // queue capacity plus limiter capacity bounds what can be outstanding
    assert!(dispatched <= 3, "dispatched {dispatched} attempts into a stalled queue");
    assert_eq!(rx.len(), 1);
}
