//! # Gardisto (Admin Access Control)
//!
//! `gardisto` is the access-control core in front of an admin dashboard.
//! It owns three concerns:
//!
//! 1. **Authentication:** password login against an external identity
//!    provider, an optional TOTP step-up, and signed session cookies scoped
//!    to `/admin`.
//! 2. **Authorization:** capability-style role checks (`resource.action`,
//!    optionally scoped) evaluated against the directory's current profile
//!    on every privileged request.
//! 3. **Request middleware:** fixed-window rate limiting per endpoint
//!    class, a TTL response cache with group invalidation, and an audit
//!    trail for security-relevant events.
//!
//! Admin profiles live in an external directory service and are re-fetched
//! per privileged check; nothing inside a cookie is ever trusted for
//! authorization decisions.

pub mod api;
pub mod audit;
pub mod cache;
pub mod cli;
pub mod directory;
pub mod rate_limit;
pub mod rbac;
pub mod session;
pub mod twofactor;
