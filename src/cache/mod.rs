//! TTL response cache for idempotent admin reads.
//!
//! Flow Overview:
//! 1) Routes are explicitly marked cacheable with a TTL, an invalidation
//!    group, and optional vary headers.
//! 2) The cache key combines method, path, query, caller identity and the
//!    vary header values.
//! 3) Write operations never touch the cache except to invalidate their
//!    group; expired entries are purged lazily on read and by the sweep.

use std::collections::HashMap;
use std::sync::Mutex;

/// Cache policy attached to a cacheable route.
#[derive(Clone, Copy, Debug)]
pub struct CachePolicy {
    /// Invalidation group, e.g. `users`; writes clear the whole group.
    pub group: &'static str,
    pub ttl_ms: i64,
    /// Request headers whose values become part of the key.
    pub vary: &'static [&'static str],
}

/// A stored response: payload, selected headers and status.
#[derive(Clone, Debug)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub payload: Vec<u8>,
    pub stored_at_ms: i64,
    pub ttl_ms: i64,
}

impl CachedResponse {
    /// Entry is treated as absent once `now > stored_at + ttl`.
    #[must_use]
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms <= self.stored_at_ms.saturating_add(self.ttl_ms)
    }
}

/// Storage seam for cached responses; swap in a shared backend for
/// multi-instance deployments.
pub trait CacheStore: Send + Sync {
    /// Fresh entry for `key`, purging it lazily when expired.
    fn get(&self, key: &str, now_ms: i64) -> Option<CachedResponse>;
    fn set(&self, key: String, entry: CachedResponse);
    /// Remove all entries whose key starts with `prefix`.
    fn remove_prefix(&self, prefix: &str);
    /// Drop every expired entry.
    fn sweep(&self, now_ms: i64);
}

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, CachedResponse>>,
}

impl MemoryCacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str, now_ms: i64) -> Option<CachedResponse> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some(entry) if entry.is_fresh(now_ms) => Some(entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: String, entry: CachedResponse) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, entry);
        }
    }

    fn remove_prefix(&self, prefix: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|key, _| !key.starts_with(prefix));
        }
    }

    fn sweep(&self, now_ms: i64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, entry| entry.is_fresh(now_ms));
        }
    }
}

/// The response cache proper: key construction, cacheability rules and
/// group invalidation over an injected store.
pub struct ResponseCache {
    store: Box<dyn CacheStore>,
}

impl ResponseCache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(Box::new(MemoryCacheStore::new()))
    }

    #[must_use]
    pub fn with_store(store: Box<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Build the cache key for one request.
    ///
    /// Identity is part of the key: two admins never share an entry, since
    /// responses may be shaped by who is asking.
    #[must_use]
    pub fn key(
        policy: &CachePolicy,
        method: &str,
        path: &str,
        query: Option<&str>,
        identity: &str,
        vary_values: &[(&str, &str)],
    ) -> String {
        let mut key = format!(
            "{}:{method}:{path}?{}|{identity}",
            policy.group,
            query.unwrap_or("")
        );
        for (name, value) in vary_values {
            key.push_str(&format!("|{name}={value}"));
        }
        key
    }

    #[must_use]
    pub fn get(&self, key: &str, now_ms: i64) -> Option<CachedResponse> {
        self.store.get(key, now_ms)
    }

    /// Store a response if it is cacheable: reads only, success status,
    /// and no explicit no-cache directive.
    pub fn set(
        &self,
        key: String,
        method: &str,
        status: u16,
        cache_control: Option<&str>,
        headers: Vec<(String, String)>,
        payload: Vec<u8>,
        policy: &CachePolicy,
        now_ms: i64,
    ) {
        if !Self::is_cacheable(method, status, cache_control) {
            return;
        }
        self.store.set(
            key,
            CachedResponse {
                status,
                headers,
                payload,
                stored_at_ms: now_ms,
                ttl_ms: policy.ttl_ms,
            },
        );
    }

    /// Mutating operations never populate the cache; error responses and
    /// explicit opt-outs are skipped too.
    #[must_use]
    pub fn is_cacheable(method: &str, status: u16, cache_control: Option<&str>) -> bool {
        if method != "GET" {
            return false;
        }
        if !(200..300).contains(&status) {
            return false;
        }
        !cache_control.is_some_and(|directive| {
            let directive = directive.to_ascii_lowercase();
            directive.contains("no-store") || directive.contains("no-cache")
        })
    }

    /// Invalidate a group (writes call this) or a single exact key.
    pub fn clear(&self, group_or_key: &str) {
        if group_or_key.contains(':') {
            // Looks like a full key; remove just that entry family.
            self.store.remove_prefix(group_or_key);
        } else {
            self.store.remove_prefix(&format!("{group_or_key}:"));
        }
    }

    pub fn sweep(&self, now_ms: i64) {
        self.store.sweep(now_ms);
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}
