//! Request middleware for the admin surface.
//!
//! Flow Overview:
//! 1) `rate_limit` runs first and throttles per client IP and endpoint
//!    class, before any credential or session work happens.
//! 2) `require_admin` resolves the session, enforces 2FA freshness, and
//!    evaluates the route's permission against the directory's current
//!    role. Denials are audited.
//! 3) `cache_response` serves marked GET routes from the TTL cache and
//!    invalidates a route's group when a write on it succeeds.
//!
//! Security boundaries:
//! - The guard never trusts the role baked into the cookie; the directory
//!   profile fetched during resolve is authoritative.
//! - Cache keys include the caller's principal id, so one admin's cached
//!   response is never served to another.

use axum::{
    body::Body,
    extract::{Extension, Request},
    http::{
        HeaderValue, Method, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, RETRY_AFTER, SET_COOKIE},
    },
    middleware::Next,
    response::Response,
};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use crate::audit::AuditEvent;
use crate::cache::{CachePolicy, CachedResponse, ResponseCache};
use crate::rate_limit::{EndpointClass, RateLimitDecision, RateLimiter};
use crate::rbac::{self, Permission};
use crate::session::{ResolvedSession, SessionError};

use super::handlers::auth::state::AuthState;
use super::handlers::{error_response, extract_client_ip, now_unix_millis, now_unix_seconds};

/// One limiter per endpoint class; keyspaces never overlap.
pub struct RateLimits {
    auth: RateLimiter,
    analytics: RateLimiter,
    reports: RateLimiter,
    system: RateLimiter,
    default_: RateLimiter,
}

impl RateLimits {
    #[must_use]
    pub fn new() -> Self {
        Self {
            auth: RateLimiter::new(EndpointClass::Auth),
            analytics: RateLimiter::new(EndpointClass::Analytics),
            reports: RateLimiter::new(EndpointClass::Reports),
            system: RateLimiter::new(EndpointClass::System),
            default_: RateLimiter::new(EndpointClass::Default),
        }
    }

    #[must_use]
    pub fn for_path(&self, path: &str) -> &RateLimiter {
        match classify_path(path) {
            EndpointClass::Auth => &self.auth,
            EndpointClass::Analytics => &self.analytics,
            EndpointClass::Reports => &self.reports,
            EndpointClass::System => &self.system,
            EndpointClass::Default => &self.default_,
        }
    }

    pub fn sweep(&self, now_ms: i64) {
        for limiter in [
            &self.auth,
            &self.analytics,
            &self.reports,
            &self.system,
            &self.default_,
        ] {
            limiter.sweep(now_ms);
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_path(path: &str) -> EndpointClass {
    if path_has_prefix(path, "/admin/login") || path_has_prefix(path, "/admin/2fa") {
        EndpointClass::Auth
    } else if path_has_prefix(path, "/admin/analytics") {
        EndpointClass::Analytics
    } else if path_has_prefix(path, "/admin/reports") {
        EndpointClass::Reports
    } else if path_has_prefix(path, "/admin/settings") || path_has_prefix(path, "/admin/system") {
        EndpointClass::System
    } else {
        EndpointClass::Default
    }
}

/// Fixed-window throttle, applied before authentication so brute force is
/// counted whether or not the credentials are any good.
pub async fn rate_limit(
    Extension(limits): Extension<Arc<RateLimits>>,
    request: Request,
    next: Next,
) -> Response {
    let client_key =
        extract_client_ip(request.headers()).unwrap_or_else(|| "unknown".to_string());
    let now_ms = now_unix_millis();
    let decision = limits.for_path(request.uri().path()).check(&client_key, now_ms);

    match decision {
        RateLimitDecision::Allowed {
            limit,
            remaining,
            reset_at_ms,
        } => {
            let mut response = next.run(request).await;
            set_rate_limit_headers(&mut response, limit, remaining, reset_at_ms);
            response
        }
        RateLimitDecision::Limited {
            limit,
            retry_after_seconds,
            reset_at_ms,
        } => {
            let mut response = error_response(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded");
            set_rate_limit_headers(&mut response, limit, 0, reset_at_ms);
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_seconds));
            response
        }
    }
}

fn set_rate_limit_headers(response: &mut Response, limit: u32, remaining: u32, reset_at_ms: i64) {
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(reset_at_ms / 1000));
}

/// Session plus permission guard for the protected admin resources.
///
/// On success the resolved session rides in the request extensions for the
/// handler and the cache key.
pub async fn require_admin(
    Extension(auth_state): Extension<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let now = now_unix_seconds();
    let resolved = match auth_state.sessions().resolve(request.headers(), now).await {
        Ok(resolved) => resolved,
        Err(SessionError::Backend(err)) => {
            error!("Session backend failure: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Session lookup failed");
        }
        Err(_) => return unauthenticated(&auth_state),
    };

    if !resolved.two_factor_satisfied {
        // The session itself is fine; only the step-up marker is stale.
        // Cookies stay so the client can re-verify without logging in again.
        return error_response(
            StatusCode::UNAUTHORIZED,
            "Two-factor verification required",
        );
    }

    let path = request.uri().path().to_string();
    let required = rbac::route_permission(&path)
        .map(|permission| effective_permission(request.method(), permission));
    let allowed =
        required.is_some_and(|permission| rbac::has_permission(resolved.principal.role, permission));
    if !allowed {
        auth_state.audit().record(
            AuditEvent::new("permission_denied")
                .with_actor(resolved.principal.id)
                .with_metadata(json!({
                    "path": path,
                    "method": request.method().as_str(),
                    "role": resolved.principal.role.as_str(),
                })),
        );
        return error_response(StatusCode::FORBIDDEN, "Forbidden");
    }

    request.extensions_mut().insert(resolved);
    next.run(request).await
}

/// Mutating methods escalate the route's mapped read permission to the
/// matching write permission on the same resource.
fn effective_permission(method: &Method, permission: Permission<'static>) -> Permission<'static> {
    if method == Method::GET || method == Method::HEAD {
        permission
    } else {
        Permission::new(permission.resource, "write")
    }
}

fn unauthenticated(auth_state: &AuthState) -> Response {
    let mut response = error_response(StatusCode::UNAUTHORIZED, "Not authenticated");
    for cookie in auth_state.sessions().clear_cookies() {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

const CACHE_POLICIES: &[(&str, CachePolicy)] = &[
    (
        "/admin/users",
        CachePolicy {
            group: "users",
            ttl_ms: 30_000,
            vary: &[],
        },
    ),
    (
        "/admin/analytics",
        CachePolicy {
            group: "analytics",
            ttl_ms: 60_000,
            vary: &["accept-language"],
        },
    ),
    (
        "/admin/reports",
        CachePolicy {
            group: "reports",
            ttl_ms: 30_000,
            vary: &[],
        },
    ),
    (
        "/admin/settings",
        CachePolicy {
            group: "settings",
            ttl_ms: 60_000,
            vary: &[],
        },
    ),
];

fn cache_policy(path: &str) -> Option<&'static CachePolicy> {
    CACHE_POLICIES
        .iter()
        .find(|(prefix, _)| path_has_prefix(path, prefix))
        .map(|(_, policy)| policy)
}

/// Prefix match on path-segment boundaries.
fn path_has_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// TTL response cache over the marked admin reads. Runs inside the guard,
/// so the resolved principal is already in the request extensions.
pub async fn cache_response(
    Extension(cache): Extension<Arc<ResponseCache>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let Some(policy) = cache_policy(&path) else {
        return next.run(request).await;
    };

    let method = request.method().clone();
    if method != Method::GET {
        let response = next.run(request).await;
        if response.status().is_success() {
            cache.clear(policy.group);
        }
        return response;
    }

    let identity = request
        .extensions()
        .get::<ResolvedSession>()
        .map_or_else(|| "anonymous".to_string(), |s| s.principal.id.to_string());
    let vary_values: Vec<(String, String)> = policy
        .vary
        .iter()
        .filter_map(|name| {
            request
                .headers()
                .get(*name)
                .and_then(|value| value.to_str().ok())
                .map(|value| ((*name).to_string(), value.to_string()))
        })
        .collect();
    let vary_refs: Vec<(&str, &str)> = vary_values
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    let query = request.uri().query().map(str::to_string);
    let key = ResponseCache::key(
        policy,
        method.as_str(),
        &path,
        query.as_deref(),
        &identity,
        &vary_refs,
    );

    let now_ms = now_unix_millis();
    if let Some(entry) = cache.get(&key, now_ms) {
        return cached_response(&entry, "HIT");
    }

    let response = next.run(request).await;
    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("Failed to buffer response for caching: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Response buffering failed");
        }
    };

    let cache_control = parts
        .headers
        .get(CACHE_CONTROL)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let stored_headers: Vec<(String, String)> = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| vec![("content-type".to_string(), value.to_string())])
        .unwrap_or_default();
    cache.set(
        key,
        method.as_str(),
        parts.status.as_u16(),
        cache_control.as_deref(),
        stored_headers,
        bytes.to_vec(),
        policy,
        now_ms,
    );

    parts
        .headers
        .insert("X-Cache", HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}

fn cached_response(entry: &CachedResponse, state: &'static str) -> Response {
    let mut response = Response::new(Body::from(entry.payload.clone()));
    *response.status_mut() =
        StatusCode::from_u16(entry.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    for (name, value) in &entry.headers {
        if let (Ok(name), Ok(value)) = (
            name.parse::<axum::http::HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
    response
        .headers_mut()
        .insert("X-Cache", HeaderValue::from_static(state));
    response
}
