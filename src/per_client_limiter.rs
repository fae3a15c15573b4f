//! Per-client sliding-window log limiter.
//!
//! Each client key owns a log of the instants of its recently admitted requests.
//! Two independent bounds apply: the number of distinct clients tracked at once,
//! and the number of requests a client may make inside the trailing window.
//! Inactive clients are reclaimed by a background sweep.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config_validator::ConfigValidator;
use crate::error::{GateError, Result};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerClientConfig {
    /// Maximum number of distinct clients tracked at once.
    pub capacity: usize,
    /// Requests admitted per client inside one window.
    pub limit: usize,
    pub window: Duration,
    /// Inactivity after which a client is forgotten. Must be at least `window`.
    pub client_ttl: Duration,
    pub sweep_interval: Duration,
}

impl PerClientConfig {
    pub fn new(capacity: usize, limit: usize, window: Duration, client_ttl: Duration) -> Self {
        Self {
            capacity,
            limit,
            window,
            client_ttl,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }
}

/// Outcome of a per-client admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// The client already used its allowance for the current window.
    RateExceeded,
    /// The client is unknown and no more clients can be tracked.
    StorageFull,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        self == Admission::Admitted
    }

    pub fn is_storage_full(self) -> bool {
        self == Admission::StorageFull
    }
}

/// Chronological log of one client's admitted requests, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ClientLog {
    stamps: VecDeque<Instant>,
}

impl ClientLog {
    /// Drops every instant whose age is `window` or more.
    pub fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.stamps.front() {
            if now.saturating_duration_since(*oldest) < window {
                break;
            }
            self.stamps.pop_front();
        }
    }

    pub fn record(&mut self, at: Instant) {
        self.stamps.push_back(at);
    }

    pub fn last_seen(&self) -> Option<Instant> {
        self.stamps.back().copied()
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

/// Storage capability behind [`PerClientLimiter`].
///
/// `admit` must evaluate and record atomically with respect to other callers.
pub trait ClientLogStore: Send + Sync {
    fn admit(&self, key: &str, now: Instant, window: Duration, limit: usize) -> Result<Admission>;
    fn remove(&self, key: &str) -> Result<()>;
    /// Forgets clients whose latest request is older than `ttl`. Returns how many.
    fn sweep(&self, now: Instant, ttl: Duration) -> Result<usize>;
    fn count(&self, key: &str) -> Result<usize>;
    fn len(&self) -> usize;
    fn cap(&self) -> usize;
}

/// Client logs held in one map behind one lock.
///
/// Unrelated clients serialize on the same lock.
#[derive(Debug)]
pub struct InMemoryClientLogStore {
    capacity: usize,
    logs: RwLock<HashMap<String, ClientLog>>,
}

impl InMemoryClientLogStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            logs: RwLock::new(HashMap::new()),
        }
    }
}

fn lock_error(kind: &str) -> GateError {
    GateError::Internal(format!("Failed to acquire {} lock on client logs", kind))
}

impl ClientLogStore for InMemoryClientLogStore {
    fn admit(&self, key: &str, now: Instant, window: Duration, limit: usize) -> Result<Admission> {
        let mut logs = self.logs.write().map_err(|_| lock_error("write"))?;

        match logs.get_mut(key) {
            Some(log) => {
                log.prune(now, window);
                if log.len() >= limit {
                    return Ok(Admission::RateExceeded);
                }
                log.record(now);
            }
            None => {
                if logs.len() >= self.capacity {
                    return Ok(Admission::StorageFull);
                }
                if limit == 0 {
                    return Ok(Admission::RateExceeded);
                }
                let mut log = ClientLog::default();
                log.record(now);
                logs.insert(key.to_owned(), log);
            }
        }

        Ok(Admission::Admitted)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut logs = self.logs.write().map_err(|_| lock_error("write"))?;
        logs.remove(key)
            .map(|_| ())
            .ok_or_else(|| GateError::NotFound(format!("client {}", key)))
    }

    fn sweep(&self, now: Instant, ttl: Duration) -> Result<usize> {
        let mut logs = self.logs.write().map_err(|_| lock_error("write"))?;
        let before = logs.len();

        logs.retain(|_, log| match log.last_seen() {
            Some(last) => now.saturating_duration_since(last) <= ttl,
            None => false,
        });

        Ok(before - logs.len())
    }

    fn count(&self, key: &str) -> Result<usize> {
        let logs = self.logs.read().map_err(|_| lock_error("read"))?;
        Ok(logs.get(key).map_or(0, ClientLog::len))
    }

    fn len(&self) -> usize {
        self.logs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn cap(&self) -> usize {
        self.capacity
    }
}

pub struct PerClientLimiter {
    store: Arc<dyn ClientLogStore>,
    limit: usize,
    window: Duration,
    client_ttl: Duration,
    shutdown: CancellationToken,
}

impl PerClientLimiter {
    /// Builds an in-memory limiter and starts its inactivity sweep.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: PerClientConfig) -> Result<Self> {
        ConfigValidator::validate_per_client(&config)?;
        Self::with_store(Arc::new(InMemoryClientLogStore::new(config.capacity)), config)
    }

    pub fn with_store(store: Arc<dyn ClientLogStore>, config: PerClientConfig) -> Result<Self> {
        ConfigValidator::validate_per_client(&config)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| GateError::Internal(format!("per-client limiter needs a runtime: {e}")))?;

        let shutdown = CancellationToken::new();
        runtime.spawn(sweep_inactive(
            Arc::clone(&store),
            config.sweep_interval,
            config.client_ttl,
            shutdown.clone(),
        ));

        info!(
            capacity = config.capacity,
            limit = config.limit,
            window = ?config.window,
            client_ttl = ?config.client_ttl,
            "Per-client limiter online"
        );

        Ok(Self {
            store,
            limit: config.limit,
            window: config.window,
            client_ttl: config.client_ttl,
            shutdown,
        })
    }

    /// Decides whether `client_key` may proceed, recording the request if so.
    pub fn allow(&self, client_key: &str) -> Result<Admission> {
        let admission = self
            .store
            .admit(client_key, Instant::now(), self.window, self.limit)?;

        if !admission.is_admitted() {
            debug!(client_key, ?admission, "Per-client admission rejected");
        }

        Ok(admission)
    }

    pub fn remove(&self, client_key: &str) -> Result<()> {
        self.store.remove(client_key)
    }

    /// Runs one inactivity sweep now. Returns the number of clients forgotten.
    pub fn sweep(&self) -> Result<usize> {
        self.store.sweep(Instant::now(), self.client_ttl)
    }

    /// Requests currently logged for `client_key`, including expired ones not yet pruned.
    pub fn count(&self, client_key: &str) -> Result<usize> {
        self.store.count(client_key)
    }

    /// Stops the inactivity sweep. Admission still works but is no longer supported.
    pub fn offline(&self) {
        self.shutdown.cancel();
        info!("Per-client limiter offline");
    }

    pub fn is_offline(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Distinct clients currently tracked.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cap(&self) -> usize {
        self.store.cap()
    }
}

impl Drop for PerClientLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn sweep_inactive(
    store: Arc<dyn ClientLogStore>,
    every: Duration,
    ttl: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Per-client sweep task stopped");
                return;
            }
            _ = ticker.tick() => match store.sweep(Instant::now(), ttl) {
                Ok(removed) => debug!(removed, remaining = store.len(), "Swept inactive clients"),
                Err(e) => warn!(error = %e, "Per-client sweep failed"),
            },
        }
    }
}
