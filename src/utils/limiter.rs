use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting semaphore capping how many dials are in flight at once.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    sem: Arc<Semaphore>,
    capacity: usize,
}

/// One held slot. Dropping it (on any exit path) gives the slot back.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

impl Slot {
    /// Return the slot explicitly; same as dropping it.
    pub fn release(self) {}
}

impl ConcurrencyLimiter {
    /// Create a limiter with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { sem: Arc::new(Semaphore::new(capacity)), capacity }
    }

    /// Wait until a slot is free and take it.
    pub async fn acquire(&self) -> Result<Slot> {
        let permit = self
            .sem
            .clone()
            .acquire_owned()
            .await
            .context("concurrency limiter closed")?;
        Ok(Slot { _permit: permit })
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<Slot> {
        self.sem.clone().try_acquire_owned().ok().map(|permit| Slot { _permit: permit })
    }

    /// Configured number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held
    pub fn in_flight(&self) -> usize {
        self.capacity - self.sem.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slots_come_back_on_drop() {
        let limiter = ConcurrencyLimiter::new(2);
        let a = limiter.acquire().await.unwrap();
        let b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.in_flight(), 2);
        assert!(limiter.try_acquire().is_none());

        drop(a);
        assert_eq!(limiter.in_flight(), 1);
        b.release();
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test]
    async fn zero_capacity_is_clamped() {
        let limiter = ConcurrencyLimiter::new(0);
        assert_eq!(limiter.capacity(), 1);
        assert!(limiter.try_acquire().is_some());
    }

    #[tokio::test]
    async fn slot_released_when_task_errors() {
        let limiter = ConcurrencyLimiter::new(1);
        let l = limiter.clone();
        let res = tokio::spawn(async move {
            let _slot = l.acquire().await?;
            Err::<(), anyhow::Error>(anyhow::anyhow!("dial failed"))
        })
        .await
        .unwrap();
        assert!(res.is_err());
        assert_eq!(limiter.in_flight(), 0);
    }
}
