use std::sync::{PoisonError, RwLock};

use crate::config_validator::ConfigValidator;
use crate::error::Result;

/// Bounded integer counter of available permits.
///
/// Invariant: `0 <= count <= capacity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBucket {
    count: u64,
    capacity: u64,
}

impl TokenBucket {
    pub fn new(count: u64, capacity: u64) -> Result<Self> {
        ConfigValidator::validate_token_bucket(count, capacity)?;
        Ok(Self { count, capacity })
    }

    /// Removes `cost` tokens if at least that many are available.
    pub fn debit(&mut self, cost: u64) -> bool {
        if self.count >= cost {
            self.count -= cost;
            true
        } else {
            false
        }
    }

    /// Adds `tokens`, saturating at capacity.
    pub fn credit(&mut self, tokens: u64) {
        self.count = self.count.saturating_add(tokens).min(self.capacity);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

/// Storage capability behind the global limiter.
pub trait TokenStore: Send + Sync {
    fn debit(&self, cost: u64) -> bool;
    fn add_tokens(&self, tokens: u64);
    fn len(&self) -> u64;
    fn cap(&self) -> u64;
}

/// In-process token store. Mutations take the write lock, observers the read lock.
#[derive(Debug)]
pub struct MemoryBucket {
    bucket: RwLock<TokenBucket>,
}

impl MemoryBucket {
    pub fn new(count: u64, capacity: u64) -> Result<Self> {
        Ok(Self {
            bucket: RwLock::new(TokenBucket::new(count, capacity)?),
        })
    }
}

// Every mutation leaves the bucket within bounds, so a poisoned lock still guards
// a valid counter and is safe to recover.
impl TokenStore for MemoryBucket {
    fn debit(&self, cost: u64) -> bool {
        self.bucket
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .debit(cost)
    }

    fn add_tokens(&self, tokens: u64) {
        self.bucket
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .credit(tokens)
    }

    fn len(&self) -> u64 {
        self.bucket
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .count()
    }

    fn cap(&self) -> u64 {
        self.bucket
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .capacity()
    }
}
