// tests/tcp_probe.rs
use std::env;
use std::time::Duration;

use rustlite_ping::probes::{tcp_probe, DialPolicy};
use rustlite_ping::types::{Outcome, Target};
use tokio::net::TcpListener;

#[tokio::test]
async fn open_port_is_success() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

    let policy = DialPolicy::new(Duration::from_secs(2));
    let sample = tcp_probe(&Target::new("127.0.0.1", port), "h", &policy).await;
    assert!(matches!(sample.outcome, Outcome::Success(_)), "got {:?}", sample.outcome);
    assert!(!sample.is_loss());
    assert!(sample.rtt() < Duration::from_secs(2));
    accept.await.unwrap().unwrap();
}

#[tokio::test]
async fn closed_port_is_failed_with_scaled_sentinel() {
    let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = l.local_addr().unwrap().port();
    drop(l);

    let policy = DialPolicy { timeout: Duration::from_millis(400), failed_rtt_multiplier: 2 };
    let sample = tcp_probe(&Target::new("127.0.0.1", port), "h", &policy).await;
    assert!(matches!(sample.outcome, Outcome::Failed(_)), "got {:?}", sample.outcome);
    assert!(sample.is_loss());
    assert_eq!(sample.rtt(), Duration::from_millis(800));
}

#[tokio::test]
async fn unroutable_address_times_out() {
    if env::var("REAL_NET_TEST").is_err() {
        eprintln!("Skipping real network dial timeout test. Set REAL_NET_TEST=1 to enable.");
        return;
    }

    let policy = DialPolicy::new(Duration::from_millis(300));
    let sample = tcp_probe(&Target::new("10.255.255.1", 80), "h", &policy).await;
    assert_eq!(sample.outcome, Outcome::TimedOut);
    assert_eq!(sample.rtt(), Duration::from_millis(300));
}
