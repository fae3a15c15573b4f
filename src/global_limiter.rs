//! Process-wide token-bucket admission.
//!
//! A single [`GlobalLimiter`] is built at startup and shared by handle with every
//! request worker. Admission debits the bucket immediately and never waits; a
//! background task credits one token every `1 / rate` seconds until the limiter
//! is taken offline.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config_validator::ConfigValidator;
use crate::error::{GateError, Result};
use crate::token_bucket::{MemoryBucket, TokenStore};

/// Construction parameters for [`GlobalLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalLimiterConfig {
    pub initial_count: u64,
    pub capacity: u64,
    /// Tokens credited per second.
    pub rate_per_second: u64,
}

pub struct GlobalLimiter {
    bucket: Arc<dyn TokenStore>,
    rate: u64,
    shutdown: CancellationToken,
}

impl GlobalLimiter {
    /// Builds an in-memory limiter and starts its refill task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: GlobalLimiterConfig) -> Result<Self> {
        ConfigValidator::validate_global_limiter(&config)?;
        let bucket = MemoryBucket::new(config.initial_count, config.capacity)?;
        Self::with_store(Arc::new(bucket), config.rate_per_second)
    }

    /// Builds a limiter over any token store and starts its refill task.
    pub fn with_store(bucket: Arc<dyn TokenStore>, rate: u64) -> Result<Self> {
        ConfigValidator::validate_refill_rate(rate)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| GateError::Internal(format!("global limiter needs a runtime: {e}")))?;

        let shutdown = CancellationToken::new();
        runtime.spawn(refill(
            Arc::clone(&bucket),
            refill_period(rate),
            shutdown.clone(),
        ));

        info!(
            capacity = bucket.cap(),
            tokens = bucket.len(),
            rate,
            "Global limiter online"
        );

        Ok(Self {
            bucket,
            rate,
            shutdown,
        })
    }

    /// Debits `cost` tokens. Returns `false` without waiting when too few remain.
    pub fn allow(&self, cost: u64) -> bool {
        self.bucket.debit(cost)
    }

    /// Stops the refill task. Admission keeps working against whatever tokens remain,
    /// but the limiter is no longer supported once offline and is never restarted.
    pub fn offline(&self) {
        self.shutdown.cancel();
        info!("Global limiter offline");
    }

    pub fn is_offline(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Tokens currently available.
    pub fn len(&self) -> u64 {
        self.bucket.len()
    }

    pub fn cap(&self) -> u64 {
        self.bucket.cap()
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }
}

impl Drop for GlobalLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn refill_period(rate: u64) -> Duration {
    Duration::from_nanos((1_000_000_000 / rate).max(1))
}

async fn refill(bucket: Arc<dyn TokenStore>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    // Periods below the timer resolution are caught up in bursts.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Global refill task stopped");
                return;
            }
            _ = ticker.tick() => bucket.add_tokens(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn config(initial_count: u64, capacity: u64, rate_per_second: u64) -> GlobalLimiterConfig {
        GlobalLimiterConfig {
            initial_count,
            capacity,
            rate_per_second,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_allow_debits_cost() {
        let limiter = GlobalLimiter::new(config(5, 5, 1)).unwrap();
        assert_eq!(limiter.rate(), 1);
        assert!(limiter.allow(3));
        assert_eq!(limiter.len(), 2);
        assert!(!limiter.allow(3));
        assert_eq!(limiter.len(), 2);
        assert!(limiter.allow(2));
        assert!(!limiter.allow(1));
    }

    #[tokio::test]
    async fn test_construction_validates_parameters() {
        assert!(matches!(
            GlobalLimiter::new(config(0, 0, 1)),
            Err(GateError::Validation(_))
        ));
        assert!(matches!(
            GlobalLimiter::new(config(11, 10, 1)),
            Err(GateError::Validation(_))
        ));
        assert!(matches!(
            GlobalLimiter::new(config(1, 10, 0)),
            Err(GateError::Validation(_))
        ));
    }

    #[test]
    fn test_construction_outside_runtime_fails() {
        assert!(matches!(
            GlobalLimiter::new(config(1, 1, 1)),
            Err(GateError::Internal(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_adds_one_token_per_period() {
        let limiter = GlobalLimiter::new(config(0, 10, 10)).unwrap();
        assert_eq!(limiter.len(), 0);

        time::sleep(Duration::from_millis(350)).await;
        assert_eq!(limiter.len(), 3);

        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(limiter.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_stops_at_capacity() {
        let limiter = GlobalLimiter::new(config(0, 2, 100)).unwrap();
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(limiter.len(), 2);
        assert_eq!(limiter.cap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_stops_refill() {
        let limiter = GlobalLimiter::new(config(0, 10, 10)).unwrap();
        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(limiter.len(), 1);

        limiter.offline();
        assert!(limiter.is_offline());

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(limiter.len(), 1);
        assert!(limiter.allow(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_allow_admits_exactly_capacity() {
        let capacity = 50;
        let limiter = Arc::new(GlobalLimiter::new(config(capacity, capacity, 1)).unwrap());

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || limiter.allow(1))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();

        assert_eq!(admitted as u64, capacity);
        assert_eq!(limiter.len(), 0);
    }
}
