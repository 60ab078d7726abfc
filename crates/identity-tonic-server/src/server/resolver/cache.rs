use crate::server::{config::CacheConfig, telemetry::increment_cache_hits};
use core::time::Duration;
use identity_tonic_core::{IdentityContext, IdentityResolver, Result, UserInfoRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::time::Instant;

struct CacheEntry {
    record: UserInfoRecord,
    expires_at: Instant,
}

/// Reuses resolved identities per bearer token for a fixed TTL.
///
/// Only successful lookups of [`IdentityContext::Bearer`] contexts are cached;
/// errors always reach the caller and the next call asks the inner resolver
/// again. Entries are keyed by the full credential, so distinct callers never
/// share a record. When full, expired entries are purged first, then the entry
/// closest to expiry is evicted.
pub struct CachingResolver<R> {
    inner: R,
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl<R> CachingResolver<R> {
    pub fn new(inner: R, config: CacheConfig) -> Self {
        Self {
            inner,
            ttl: config.ttl,
            capacity: config.capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn lookup(&self, credential: &str) -> Option<UserInfoRecord> {
        let mut entries = self.entries.lock();
        match entries.get(credential) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.record.clone()),
            Some(_) => {
                entries.remove(credential);
                None
            }
            None => None,
        }
    }

    fn store(&self, credential: &str, record: UserInfoRecord) {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if entries.len() >= self.capacity && !entries.contains_key(credential) {
            entries.retain(|_, entry| entry.expires_at > now);
        }

        if entries.len() >= self.capacity && !entries.contains_key(credential) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                entries.remove(&key);
            }
        }

        entries.insert(
            credential.to_owned(),
            CacheEntry {
                record,
                expires_at: now + self.ttl,
            },
        );
    }
}

#[tonic::async_trait]
impl<R> IdentityResolver for CachingResolver<R>
where
    R: IdentityResolver,
{
    async fn resolve(&self, context: &IdentityContext) -> Result<UserInfoRecord> {
        let Some(credential) = context.credential() else {
            return self.inner.resolve(context).await;
        };

        if let Some(record) = self.lookup(credential) {
            increment_cache_hits();
            return Ok(record);
        }

        let record = self.inner.resolve(context).await?;
        self.store(credential, record.clone());
        Ok(record)
    }
}
