use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use crate::{StevedoreError, StevedoreResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A small bounded token cache with lazy expiry.
///
/// Expired entries are swept on every lookup and insert; when an insert would
/// exceed the capacity the cache is cleared first. Token churn is low enough
/// that anything smarter than this is wasted machinery.
#[derive(Debug)]
pub struct TokenCache {
    capacity: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TokenCache {
    /// Creates a cache holding at most `capacity` live entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Looks up a cached token, sweeping expired entries first.
    pub fn get(&self, key: &str) -> StevedoreResult<Option<String>> {
        let mut entries = self.entries.lock().map_err(|_| StevedoreError::LockPoisoned)?;
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at.map(|at| at > now).unwrap_or(true));
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    /// Inserts a token with an optional time to live.
    pub fn put(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) -> StevedoreResult<()> {
        let mut entries = self.entries.lock().map_err(|_| StevedoreError::LockPoisoned)?;
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at.map(|at| at > now).unwrap_or(true));
        if entries.len() >= self.capacity {
            entries.clear();
        }
        entries.insert(
            key.into(),
            CacheEntry {
                value: value.into(),
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
