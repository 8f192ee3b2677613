use crate::types::{millis, Sample};
use std::fmt;
use std::time::Duration;

/// Cumulative counters over a batch of attempts.
///
/// `sum`, `min` and `max` cover successful RTTs only; `count` covers every
/// attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub count: u64,
    pub loss_count: u64,
    pub sum: Duration,
    pub min: Option<Duration>,
    pub max: Option<Duration>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sample: &Sample) {
        self.count += 1;
        if sample.is_loss() {
            self.loss_count += 1;
            return;
        }
        let rtt = sample.rtt();
        self.sum += rtt;
        self.min = Some(self.min.map_or(rtt, |m| m.min(rtt)));
        self.max = Some(self.max.map_or(rtt, |m| m.max(rtt)));
    }

    /// Fold `stage` into `self`.
    pub fn merge(&mut self, stage: &Summary) {
        self.count += stage.count;
        self.loss_count += stage.loss_count;
        self.sum += stage.sum;
        self.min = tighter(self.min, stage.min, Duration::min);
        self.max = tighter(self.max, stage.max, Duration::max);
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn success_count(&self) -> u64 {
        self.count - self.loss_count
    }

    pub fn mean(&self) -> Option<Duration> {
        match self.success_count() {
            0 => None,
            n => Some(Duration::from_nanos((self.sum.as_nanos() / n as u128) as u64)),
        }
    }

    pub fn loss_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.loss_count as f64 / self.count as f64
        }
    }
}

/// Merge `stage` into `target`; free-function form of [`Summary::merge`].
pub fn merge(target: &mut Summary, stage: &Summary) {
    target.merge(stage);
}

fn tighter(
    a: Option<Duration>,
    b: Option<Duration>,
    pick: fn(Duration, Duration) -> Duration,
) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (a, None) => a,
        (None, b) => b,
    }
}

fn fmt_ms(d: Option<Duration>) -> String {
    d.map(|d| format!("{:.2}ms", millis(d))).unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "success:{}, fail:{}, max cost:{}, min cost:{}, mean cost:{}",
            self.success_count(),
            self.loss_count,
            fmt_ms(self.max),
            fmt_ms(self.min),
            fmt_ms(self.mean()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Outcome, Target};
    use chrono::Utc;

    fn sample(rtt_us: Option<u64>) -> Sample {
        Sample {
            ts: Utc::now(),
            hostname: "probe".into(),
            target: Target::new("10.0.0.1", 80),
            outcome: match rtt_us {
                Some(us) => Outcome::Success(Duration::from_micros(us)),
                None => Outcome::TimedOut,
            },
            sentinel: Duration::from_secs(2),
        }
    }

    fn samples() -> Vec<Sample> {
        (0..250u64)
            .map(|i| if i % 7 == 3 { sample(None) } else { sample(Some((i * 7919) % 40_000 + 1)) })
            .collect()
    }

    #[test]
    fn merge_of_partitions_equals_whole() {
        let all = samples();
        let mut whole = Summary::new();
        all.iter().for_each(|s| whole.record(s));

        for split in [0usize, 1, 100, 249, 250] {
            let (left, right) = all.split_at(split);
            let mut a = Summary::new();
            let mut b = Summary::new();
            left.iter().for_each(|s| a.record(s));
            right.iter().for_each(|s| b.record(s));

            let mut ab = a.clone();
            merge(&mut ab, &b);
            assert_eq!(ab, whole);

            let mut ba = b.clone();
            ba.merge(&a);
            assert_eq!(ba, whole);
        }
    }

    #[test]
    fn successive_stages_accumulate() {
        let all = samples();
        let mut total = Summary::new();
        for chunk in all.chunks(100) {
            let mut stage = Summary::new();
            chunk.iter().for_each(|s| stage.record(s));
            total.merge(&stage);
        }
        assert_eq!(total.count, 250);
        assert_eq!(total.loss_count, all.iter().filter(|s| s.is_loss()).count() as u64);
    }

    #[test]
    fn losses_only_touch_counters() {
        let mut s = Summary::new();
        s.record(&sample(None));
        assert_eq!(s.count, 1);
        assert_eq!(s.loss_count, 1);
        assert_eq!(s.min, None);
        assert_eq!(s.mean(), None);
        assert_eq!(s.loss_rate(), 1.0);

        s.record(&sample(Some(4_000)));
        s.record(&sample(Some(2_000)));
        assert_eq!(s.min, Some(Duration::from_millis(2)));
        assert_eq!(s.max, Some(Duration::from_millis(4)));
        assert_eq!(s.mean(), Some(Duration::from_millis(3)));
        assert_eq!(
            s.to_string(),
            "success:2, fail:1, max cost:4.00ms, min cost:2.00ms, mean cost:3.00ms"
        );
    }
}
