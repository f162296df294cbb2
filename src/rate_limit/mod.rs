//! Fixed-window request throttling, keyed per client and endpoint class.
//!
//! Flow Overview:
//! 1) Each endpoint class owns an independent limiter with its own keyspace
//!    and `{window, max_requests}` configuration.
//! 2) A hit computes the current window start, resets elapsed entries, and
//!    either increments or rejects with time-to-reset.
//! 3) A periodic sweep drops fully elapsed entries to bound memory.
//!
//! The bundled store is process-local: with multiple instances the limits
//! are a per-instance approximation. The [`RateLimitStore`] trait is the
//! seam for substituting a shared backend.

use std::collections::HashMap;
use std::sync::Mutex;
use tracing::error;

/// Per-class window configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window_ms: i64,
    pub max_requests: u32,
}

/// Endpoint classes with independent limiter instances.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    /// Login and 2FA verification: strict.
    Auth,
    /// Analytics reads: lenient, dashboards poll these.
    Analytics,
    /// Report listing/export: strict.
    Reports,
    /// System/settings endpoints: strict.
    System,
    /// Everything else under the admin surface.
    Default,
}

impl EndpointClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Analytics => "analytics",
            Self::Reports => "reports",
            Self::System => "system",
            Self::Default => "default",
        }
    }

    #[must_use]
    pub const fn config(self) -> RateLimitConfig {
        match self {
            Self::Auth => RateLimitConfig {
                window_ms: 60_000,
                max_requests: 10,
            },
            Self::Analytics => RateLimitConfig {
                window_ms: 60_000,
                max_requests: 300,
            },
            Self::Reports | Self::System => RateLimitConfig {
                window_ms: 60_000,
                max_requests: 30,
            },
            Self::Default => RateLimitConfig {
                window_ms: 60_000,
                max_requests: 120,
            },
        }
    }
}

/// Outcome of one hit. Both arms carry what the response headers need.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed {
        limit: u32,
        remaining: u32,
        reset_at_ms: i64,
    },
    Limited {
        limit: u32,
        retry_after_seconds: i64,
        reset_at_ms: i64,
    },
}

/// Storage seam for window counters. `hit` must be atomic per key:
/// concurrent hits on one key may never lose an increment.
pub trait RateLimitStore: Send + Sync {
    fn hit(&self, key: &str, config: RateLimitConfig, now_ms: i64) -> RateLimitDecision;
    fn sweep(&self, now_ms: i64);
}

#[derive(Debug)]
struct WindowEntry {
    window_start_ms: i64,
    count: u32,
    window_ms: i64,
}

/// Process-local store: one mutex guards the map, so the per-key
/// read-modify-write is serialized.
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    entries: Mutex<HashMap<String, WindowEntry>>,
}

impl MemoryRateLimitStore {
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

impl RateLimitStore for MemoryRateLimitStore {
    fn hit(&self, key: &str, config: RateLimitConfig, now_ms: i64) -> RateLimitDecision {
        let window_start_ms = now_ms - now_ms.rem_euclid(config.window_ms.max(1));
        let reset_at_ms = window_start_ms + config.window_ms;

        let Ok(mut entries) = self.entries.lock() else {
            // Poisoned lock: fail closed rather than letting traffic through
            // uncounted.
            error!("rate limit store poisoned; rejecting request");
            return RateLimitDecision::Limited {
                limit: config.max_requests,
                retry_after_seconds: retry_after_seconds(reset_at_ms, now_ms),
                reset_at_ms,
            };
        };

        let entry = entries.entry(key.to_string()).or_insert(WindowEntry {
            window_start_ms,
            count: 0,
            window_ms: config.window_ms,
        });
        // Window boundary crossed: reset atomically under the same lock.
        if entry.window_start_ms != window_start_ms {
            entry.window_start_ms = window_start_ms;
            entry.count = 0;
        }
        entry.window_ms = config.window_ms;

        if entry.count >= config.max_requests {
            return RateLimitDecision::Limited {
                limit: config.max_requests,
                retry_after_seconds: retry_after_seconds(reset_at_ms, now_ms),
                reset_at_ms,
            };
        }

        entry.count += 1;
        RateLimitDecision::Allowed {
            limit: config.max_requests,
            remaining: config.max_requests - entry.count,
            reset_at_ms,
        }
    }

    fn sweep(&self, now_ms: i64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, entry| now_ms < entry.window_start_ms + entry.window_ms);
        }
    }
}

/// Store that never limits; for wiring tests and disabled environments.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRateLimitStore;

impl RateLimitStore for NoopRateLimitStore {
    fn hit(&self, _key: &str, config: RateLimitConfig, now_ms: i64) -> RateLimitDecision {
        RateLimitDecision::Allowed {
            limit: config.max_requests,
            remaining: config.max_requests,
            reset_at_ms: now_ms + config.window_ms,
        }
    }

    fn sweep(&self, _now_ms: i64) {}
}

/// One endpoint class bound to its store and configuration.
pub struct RateLimiter {
    class: EndpointClass,
    config: RateLimitConfig,
    store: Box<dyn RateLimitStore>,
}

impl RateLimiter {
    /// Limiter with the class's default config and a fresh in-memory store
    /// (independent keyspace per class).
    #[must_use]
    pub fn new(class: EndpointClass) -> Self {
        Self::with_store(class, class.config(), Box::new(MemoryRateLimitStore::new()))
    }

    #[must_use]
    pub fn with_store(
        class: EndpointClass,
        config: RateLimitConfig,
        store: Box<dyn RateLimitStore>,
    ) -> Self {
        Self {
            class,
            config,
            store,
        }
    }

    #[must_use]
    pub const fn class(&self) -> EndpointClass {
        self.class
    }

    /// Register one request for `client_key`.
    #[must_use]
    pub fn check(&self, client_key: &str, now_ms: i64) -> RateLimitDecision {
        self.store.hit(client_key, self.config, now_ms)
    }

    pub fn sweep(&self, now_ms: i64) {
        self.store.sweep(now_ms);
    }
}

/// Ceiling of the remaining window, in whole seconds; never below 1 so a
/// `Retry-After: 0` is never emitted while still limited.
fn retry_after_seconds(reset_at_ms: i64, now_ms: i64) -> i64 {
    ((reset_at_ms - now_ms).max(1) + 999) / 1000
}

#[cfg(test)]
mod tests {
    use super::{
        EndpointClass, MemoryRateLimitStore, NoopRateLimitStore, RateLimitConfig,
        RateLimitDecision, RateLimitStore, RateLimiter,
    };
    use std::sync::Arc;

    const NOW_MS: i64 = 1_700_000_000_000;

    fn config() -> RateLimitConfig {
        RateLimitConfig {
            window_ms: 60_000,
            max_requests: 5,
        }
    }

    fn limiter() -> RateLimiter {
        RateLimiter::with_store(
            EndpointClass::Auth,
            config(),
            Box::new(MemoryRateLimitStore::new()),
        )
    }

    #[test]
    fn five_requests_pass_then_sixth_is_limited() {
        let limiter = limiter();
        for expected_remaining in (0..5).rev() {
            let decision = limiter.check("1.2.3.4", NOW_MS);
            assert_eq!(
                decision,
                RateLimitDecision::Allowed {
                    limit: 5,
                    remaining: expected_remaining,
                    reset_at_ms: NOW_MS - NOW_MS % 60_000 + 60_000,
                }
            );
        }

        let decision = limiter.check("1.2.3.4", NOW_MS + 1_000);
        let RateLimitDecision::Limited {
            limit,
            retry_after_seconds,
            reset_at_ms,
        } = decision
        else {
            panic!("expected limited, got {decision:?}");
        };
        assert_eq!(limit, 5);
        assert_eq!(reset_at_ms, NOW_MS - NOW_MS % 60_000 + 60_000);
        // Retry-After must cover the remaining window time.
        assert!(retry_after_seconds >= 1);
        assert!(retry_after_seconds * 1000 >= reset_at_ms - (NOW_MS + 1_000));
        assert!(retry_after_seconds <= 60);
    }

    #[test]
    fn new_window_restarts_the_counter() {
        let limiter = limiter();
        for _ in 0..5 {
            let _ = limiter.check("1.2.3.4", NOW_MS);
        }
        assert!(matches!(
            limiter.check("1.2.3.4", NOW_MS),
            RateLimitDecision::Limited { .. }
        ));

        let next_window = NOW_MS - NOW_MS % 60_000 + 60_000;
        let decision = limiter.check("1.2.3.4", next_window);
        assert!(matches!(
            decision,
            RateLimitDecision::Allowed { remaining: 4, .. }
        ));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = limiter();
        for _ in 0..5 {
            let _ = limiter.check("1.2.3.4", NOW_MS);
        }
        assert!(matches!(
            limiter.check("1.2.3.4", NOW_MS),
            RateLimitDecision::Limited { .. }
        ));
        assert!(matches!(
            limiter.check("5.6.7.8", NOW_MS),
            RateLimitDecision::Allowed { .. }
        ));
    }

    #[test]
    fn concurrent_hits_never_lose_counts() {
        let store = Arc::new(MemoryRateLimitStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let mut allowed = 0u32;
                for _ in 0..10 {
                    if matches!(
                        store.hit("shared", config(), NOW_MS),
                        RateLimitDecision::Allowed { .. }
                    ) {
                        allowed += 1;
                    }
                }
                allowed
            }));
        }
        let total: u32 = handles.into_iter().map(|h| h.join().unwrap_or(0)).sum();
        // 80 attempts against a limit of 5: exactly 5 may pass.
        assert_eq!(total, 5);
    }

    #[test]
    fn sweep_drops_elapsed_windows_only() {
        let store = MemoryRateLimitStore::new();
        let _ = store.hit("old", config(), NOW_MS);
        let fresh_at = NOW_MS + 120_000;
        let _ = store.hit("fresh", config(), fresh_at);
        assert_eq!(store.len(), 2);

        store.sweep(fresh_at);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn classes_have_expected_strictness() {
        let auth = EndpointClass::Auth.config();
        let analytics = EndpointClass::Analytics.config();
        let reports = EndpointClass::Reports.config();
        assert!(auth.max_requests < reports.max_requests);
        assert!(reports.max_requests < analytics.max_requests);
        assert_eq!(EndpointClass::System.config(), reports);
    }

    #[test]
    fn noop_store_always_allows() {
        let store = NoopRateLimitStore;
        for _ in 0..1_000 {
            assert!(matches!(
                store.hit("any", config(), NOW_MS),
                RateLimitDecision::Allowed { .. }
            ));
        }
    }
}
