use crate::types::Sample;
use std::collections::VecDeque;
use std::time::Duration;

/// One slot of a [`StatsWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    /// Successful handshake RTT.
    Rtt(Duration),
    /// Lost attempt, carrying the sentinel RTT it was recorded with.
    Loss(Duration),
}

impl Entry {
    pub fn value(&self) -> Duration {
        match *self {
            Entry::Rtt(v) | Entry::Loss(v) => v,
        }
    }

    pub fn is_loss(&self) -> bool {
        matches!(self, Entry::Loss(_))
    }
}

impl From<&Sample> for Entry {
    fn from(sample: &Sample) -> Self {
        if sample.is_loss() {
            Entry::Loss(sample.rtt())
        } else {
            Entry::Rtt(sample.rtt())
        }
    }
}

/// Fixed-capacity sliding window over the most recent attempts.
///
/// Sum, count and max of the successful RTTs are maintained on every push;
/// losses occupy a slot but only feed the loss counter. The max is rescanned
/// only when the evicted entry was the max.
#[derive(Debug, Clone)]
pub struct StatsWindow {
    capacity: usize,
    items: VecDeque<Entry>,
    sum: Duration,
    rtt_count: usize,
    loss_count: usize,
    max: Duration,
}

impl StatsWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity + 1),
            sum: Duration::ZERO,
            rtt_count: 0,
            loss_count: 0,
            max: Duration::ZERO,
        }
    }

    /// Append `entry`; returns the oldest entry if the window was full.
    pub fn push(&mut self, entry: Entry) -> Option<Entry> {
        self.items.push_back(entry);
        match entry {
            Entry::Rtt(v) => {
                self.sum += v;
                self.rtt_count += 1;
            }
            Entry::Loss(_) => self.loss_count += 1,
        }

        let evicted = if self.items.len() > self.capacity {
            let first = self.items.pop_front();
            match first {
                Some(Entry::Rtt(v)) => {
                    self.sum -= v;
                    self.rtt_count -= 1;
                }
                Some(Entry::Loss(_)) => self.loss_count -= 1,
                None => {}
            }
            first
        } else {
            None
        };

        match (entry, evicted) {
            (Entry::Rtt(v), _) if v > self.max => self.max = v,
            (_, Some(Entry::Rtt(old))) if old >= self.max => self.rescan_max(),
            _ => {}
        }

        evicted
    }

    fn rescan_max(&mut self) {
        self.max = self
            .items
            .iter()
            .filter_map(|e| match *e {
                Entry::Rtt(v) => Some(v),
                Entry::Loss(_) => None,
            })
            .max()
            .unwrap_or(Duration::ZERO);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.items.iter()
    }

    /// Sum of the successful RTTs currently held.
    pub fn sum(&self) -> Duration {
        self.sum
    }

    pub fn success_count(&self) -> usize {
        self.rtt_count
    }

    /// Loss entries currently held.
    pub fn loss_count(&self) -> usize {
        self.loss_count
    }

    pub fn loss_rate(&self) -> f64 {
        if self.items.is_empty() {
            0.0
        } else {
            self.loss_count as f64 / self.items.len() as f64
        }
    }

    pub fn max(&self) -> Option<Duration> {
        (self.rtt_count > 0).then_some(self.max)
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.rtt_count == 0 {
            return None;
        }
        let nanos = self.sum.as_nanos() / self.rtt_count as u128;
        Some(Duration::from_nanos(nanos as u64))
    }

    /// Population standard deviation of the successful RTTs.
    ///
    /// Full pass around the current mean; meant for periodic reports, not
    /// per-push use.
    pub fn std_dev(&self) -> Option<Duration> {
        let mean = self.mean()?.as_secs_f64();
        let variance = self
            .items
            .iter()
            .filter_map(|e| match *e {
                Entry::Rtt(v) => Some((v.as_secs_f64() - mean).powi(2)),
                Entry::Loss(_) => None,
            })
            .sum::<f64>()
            / self.rtt_count as f64;
        Some(Duration::from_secs_f64(variance.sqrt()))
    }

    /// Stored values (sentinels included) at or above `threshold`.
    ///
    /// The threshold is a query parameter so losses recorded under a
    /// different dial timeout can still be counted.
    pub fn loss_count_over(&self, threshold: Duration) -> usize {
        self.items.iter().filter(|e| e.value() >= threshold).count()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.sum = Duration::ZERO;
        self.rtt_count = 0;
        self.loss_count = 0;
        self.max = Duration::ZERO;
    }
}
