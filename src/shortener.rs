//! Capacity and TTL bounded short-code store.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config_validator::ConfigValidator;
use crate::error::{GateError, Result};

pub const MIN_CAPACITY: usize = 10;
pub const MIN_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_CODE_LENGTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortenerConfig {
    pub capacity: usize,
    pub ttl: Duration,
    pub code_length: usize,
    pub min_capacity: usize,
    pub min_ttl: Duration,
}

impl ShortenerConfig {
    pub fn new(capacity: usize, ttl: Duration, code_length: usize) -> Self {
        Self {
            capacity,
            ttl,
            code_length,
            min_capacity: MIN_CAPACITY,
            min_ttl: MIN_TTL,
        }
    }

    /// Overrides the lower bounds enforced on capacity and TTL.
    pub fn with_minimums(mut self, min_capacity: usize, min_ttl: Duration) -> Self {
        self.min_capacity = min_capacity;
        self.min_ttl = min_ttl;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlMapping {
    pub original_url: String,
    pub created_at: Instant,
}

/// Short code storage capability.
pub trait UrlStore: Send + Sync {
    /// Stores `original` under `code`.
    ///
    /// Returns `Ok(true)` without touching the store when `code` is already taken,
    /// and [`GateError::CapacityExceeded`] when a new code does not fit.
    fn add_mapping(&self, original: &str, code: &str) -> Result<bool>;
    fn retrieve_url(&self, code: &str) -> Result<String>;
    fn remove_mapping(&self, code: &str) -> Result<()>;
    /// Evicts every mapping older than the store's TTL. Returns how many.
    fn sweep(&self) -> Result<usize>;
    /// Stops background eviction. Foreground operations remain memory safe
    /// afterwards but are no longer supported.
    fn offline(&self);
    fn is_offline(&self) -> bool;
    fn len(&self) -> usize;
    fn cap(&self) -> usize;
}

#[derive(Debug)]
struct MappingTable {
    capacity: usize,
    ttl: Duration,
    mappings: RwLock<HashMap<String, UrlMapping>>,
}

impl MappingTable {
    fn evict_expired(&self, now: Instant) -> Result<usize> {
        let mut mappings = self
            .mappings
            .write()
            .map_err(|_| GateError::Internal("Failed to acquire write lock on url map".into()))?;
        let before = mappings.len();

        mappings.retain(|_, mapping| now.saturating_duration_since(mapping.created_at) <= self.ttl);

        Ok(before - mappings.len())
    }
}

/// Mappings held in one map behind one lock, swept every `ttl / 2`.
pub struct InMemoryUrlStore {
    table: Arc<MappingTable>,
    shutdown: CancellationToken,
}

impl InMemoryUrlStore {
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ShortenerConfig) -> Result<Self> {
        ConfigValidator::validate_shortener(&config)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| GateError::Internal(format!("url store needs a runtime: {e}")))?;

        let table = Arc::new(MappingTable {
            capacity: config.capacity,
            ttl: config.ttl,
            mappings: RwLock::new(HashMap::new()),
        });
        let shutdown = CancellationToken::new();
        runtime.spawn(evict_expired(Arc::clone(&table), shutdown.clone()));

        info!(
            capacity = config.capacity,
            ttl = ?config.ttl,
            "Url store online"
        );

        Ok(Self { table, shutdown })
    }
}

impl UrlStore for InMemoryUrlStore {
    fn add_mapping(&self, original: &str, code: &str) -> Result<bool> {
        let mut mappings = self
            .table
            .mappings
            .write()
            .map_err(|_| GateError::Internal("Failed to acquire write lock on url map".into()))?;

        if mappings.contains_key(code) {
            return Ok(true);
        }
        if mappings.len() >= self.table.capacity {
            return Err(GateError::CapacityExceeded("Url map is full".into()));
        }

        mappings.insert(
            code.to_owned(),
            UrlMapping {
                original_url: original.to_owned(),
                created_at: Instant::now(),
            },
        );
        Ok(false)
    }

    fn retrieve_url(&self, code: &str) -> Result<String> {
        let mappings = self
            .table
            .mappings
            .read()
            .map_err(|_| GateError::Internal("Failed to acquire read lock on url map".into()))?;

        mappings
            .get(code)
            .map(|mapping| mapping.original_url.clone())
            .ok_or_else(|| GateError::NotFound(format!("Url not found for {}", code)))
    }

    fn remove_mapping(&self, code: &str) -> Result<()> {
        let mut mappings = self
            .table
            .mappings
            .write()
            .map_err(|_| GateError::Internal("Failed to acquire write lock on url map".into()))?;

        mappings
            .remove(code)
            .map(|_| ())
            .ok_or_else(|| GateError::NotFound(format!("Url not found for {}", code)))
    }

    fn sweep(&self) -> Result<usize> {
        self.table.evict_expired(Instant::now())
    }

    fn offline(&self) {
        self.shutdown.cancel();
        info!("Url store offline");
    }

    fn is_offline(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn len(&self) -> usize {
        self.table
            .mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn cap(&self) -> usize {
        self.table.capacity
    }
}

impl Drop for InMemoryUrlStore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn evict_expired(table: Arc<MappingTable>, shutdown: CancellationToken) {
    let every = (table.ttl / 2).max(Duration::from_millis(1));
    let mut ticker = time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Url store sweep task stopped");
                return;
            }
            _ = ticker.tick() => match table.evict_expired(Instant::now()) {
                Ok(removed) => debug!(removed, "Swept expired url mappings"),
                Err(e) => warn!(error = %e, "Url store sweep failed"),
            },
        }
    }
}
