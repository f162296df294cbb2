//! Session issuance, resolution and revocation for the admin surface.
//!
//! Flow Overview:
//! 1) `issue` mints a signed session value after authentication completes.
//! 2) `resolve` verifies the cookie, re-fetches the principal from the
//!    directory, and computes whether 2FA is currently satisfied.
//! 3) `clear_cookies` revokes both the session and the 2FA marker.
//!
//! Security boundaries:
//! - The role inside the cookie is never trusted for authorization; every
//!   privileged check uses the directory's current profile.
//! - A session is 2FA-satisfied iff the principal has 2FA disabled, or a
//!   verification marker for the same principal is within its freshness
//!   window (sliding from verification time, not session start).

pub mod token;

use axum::http::{
    HeaderMap, HeaderValue,
    header::{AUTHORIZATION, InvalidHeaderValue},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::directory::{AdminDirectory, AdminPrincipal};
use crate::rbac::AdminRole;
use token::TokenKey;

pub const SESSION_COOKIE_NAME: &str = "admin-session";
pub const VERIFIED_COOKIE_NAME: &str = "admin-2fa-verified";
/// Cookies are scoped to the admin path prefix; nothing outside `/admin`
/// ever sees them.
pub const ADMIN_COOKIE_PATH: &str = "/admin";

pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
pub const DEFAULT_VERIFICATION_TTL_SECONDS: i64 = 60 * 60;

const SESSION_PURPOSE: &str = "session";
const VERIFIED_PURPOSE: &str = "2fa_verified";

/// Claims inside the `admin-session` cookie.
#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    purpose: String,
    principal_id: Uuid,
    role: AdminRole,
    issued_at_unix: i64,
}

/// Claims inside the `admin-2fa-verified` marker cookie.
#[derive(Debug, Serialize, Deserialize)]
struct VerificationClaims {
    purpose: String,
    principal_id: Uuid,
    verified_at_unix: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session value was presented.
    #[error("no session")]
    Missing,
    /// Signature or format failure; the value is discarded unread.
    #[error("malformed session")]
    Malformed,
    /// The session existed but is no longer valid (age, revocation, or the
    /// directory no longer lists the principal as an active admin).
    #[error("session expired")]
    Expired,
    /// Directory connectivity failure; fatal for this request.
    #[error("session backend unavailable: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Outcome of a successful resolve: the fresh directory profile plus the
/// current 2FA status.
#[derive(Clone, Debug)]
pub struct ResolvedSession {
    pub principal: AdminPrincipal,
    pub two_factor_satisfied: bool,
    pub issued_at_unix: i64,
}

pub struct SessionManager {
    key: TokenKey,
    directory: Arc<dyn AdminDirectory>,
    session_ttl_seconds: i64,
    verification_ttl_seconds: i64,
    cookie_secure: bool,
}

impl SessionManager {
    #[must_use]
    pub fn new(key: TokenKey, directory: Arc<dyn AdminDirectory>, cookie_secure: bool) -> Self {
        Self {
            key,
            directory,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            verification_ttl_seconds: DEFAULT_VERIFICATION_TTL_SECONDS,
            cookie_secure,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verification_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn verification_ttl_seconds(&self) -> i64 {
        self.verification_ttl_seconds
    }

    /// Mint a session value for an authenticated principal.
    ///
    /// # Errors
    /// Returns an error if claim signing fails.
    pub fn issue(&self, principal: &AdminPrincipal, now_unix: i64) -> anyhow::Result<String> {
        self.key.sign(&SessionClaims {
            purpose: SESSION_PURPOSE.to_string(),
            principal_id: principal.id,
            role: principal.role,
            issued_at_unix: now_unix,
        })
    }

    /// Mint the 2FA verification marker after a successful step-up.
    ///
    /// # Errors
    /// Returns an error if claim signing fails.
    pub fn issue_verification(&self, principal_id: Uuid, now_unix: i64) -> anyhow::Result<String> {
        self.key.sign(&VerificationClaims {
            purpose: VERIFIED_PURPOSE.to_string(),
            principal_id,
            verified_at_unix: now_unix,
        })
    }

    /// Resolve the presented session into a fresh principal and 2FA status.
    ///
    /// The principal is re-fetched from the directory on every call; a
    /// session revoked or deactivated elsewhere dies here on the next
    /// privileged action, regardless of which browsing context issued it.
    ///
    /// # Errors
    /// [`SessionError`] per variant; callers treat all but `Backend` as
    /// "unauthenticated".
    pub async fn resolve(
        &self,
        headers: &HeaderMap,
        now_unix: i64,
    ) -> Result<ResolvedSession, SessionError> {
        let token = extract_session_token(headers).ok_or(SessionError::Missing)?;
        let claims: SessionClaims = self
            .key
            .verify(&token)
            .map_err(|_| SessionError::Malformed)?;
        if claims.purpose != SESSION_PURPOSE {
            return Err(SessionError::Malformed);
        }
        if now_unix > claims.issued_at_unix.saturating_add(self.session_ttl_seconds) {
            return Err(SessionError::Expired);
        }

        let principal = self
            .directory
            .get_by_id(claims.principal_id)
            .await
            .map_err(SessionError::Backend)?
            .ok_or(SessionError::Expired)?;
        if !principal.is_active {
            return Err(SessionError::Expired);
        }

        let two_factor_satisfied = self.two_factor_satisfied(&principal, headers, now_unix);
        Ok(ResolvedSession {
            principal,
            two_factor_satisfied,
            issued_at_unix: claims.issued_at_unix,
        })
    }

    /// Invariant: satisfied iff 2FA is disabled for the principal, or a
    /// matching marker is within the freshness window.
    fn two_factor_satisfied(
        &self,
        principal: &AdminPrincipal,
        headers: &HeaderMap,
        now_unix: i64,
    ) -> bool {
        if !principal.two_factor_enabled {
            return true;
        }
        let Some(marker) = extract_cookie(headers, VERIFIED_COOKIE_NAME) else {
            return false;
        };
        let Ok(claims) = self.key.verify::<VerificationClaims>(&marker) else {
            return false;
        };
        claims.purpose == VERIFIED_PURPOSE
            && claims.principal_id == principal.id
            && now_unix.saturating_sub(claims.verified_at_unix) <= self.verification_ttl_seconds
    }

    /// Set-Cookie value for a freshly issued session.
    ///
    /// # Errors
    /// Returns an error if the cookie string is not a valid header value.
    pub fn session_cookie(&self, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        build_cookie(
            SESSION_COOKIE_NAME,
            token,
            self.session_ttl_seconds,
            self.cookie_secure,
        )
    }

    /// Set-Cookie value for the 2FA verification marker.
    ///
    /// # Errors
    /// Returns an error if the cookie string is not a valid header value.
    pub fn verification_cookie(&self, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        build_cookie(
            VERIFIED_COOKIE_NAME,
            token,
            self.verification_ttl_seconds,
            self.cookie_secure,
        )
    }

    /// Set-Cookie values that delete both cookies. Idempotent: clearing an
    /// absent cookie is a no-op on the client.
    #[must_use]
    pub fn clear_cookies(&self) -> Vec<HeaderValue> {
        [SESSION_COOKIE_NAME, VERIFIED_COOKIE_NAME]
            .iter()
            .filter_map(|name| build_cookie(name, "", 0, self.cookie_secure).ok())
            .collect()
    }
}

fn build_cookie(
    name: &str,
    value: &str,
    max_age_seconds: i64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{name}={value}; Path={ADMIN_COOKIE_PATH}; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Session token from the `admin-session` cookie, or a bearer token for
/// API clients that hold the value returned by the 2FA verify endpoint.
fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    extract_cookie(headers, SESSION_COOKIE_NAME)
}

fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(axum::http::header::COOKIE) {
        let Ok(value) = header.to_str() else { continue };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let key = parts.next()?.trim();
            let val = parts.next()?.trim();
            if key == name && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        SESSION_COOKIE_NAME, SessionError, SessionManager, VERIFIED_COOKIE_NAME, token::TokenKey,
    };
    use crate::directory::memory::MemoryDirectory;
    use crate::rbac::AdminRole;
    use anyhow::Result;
    use axum::http::{HeaderMap, HeaderValue, header::COOKIE};
    use std::sync::Arc;
    use uuid::Uuid;

    const NOW: i64 = 1_700_000_000;

    fn manager(directory: Arc<MemoryDirectory>) -> Result<SessionManager> {
        Ok(SessionManager::new(TokenKey::generate()?, directory, false))
    }

    fn cookie_headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = pairs
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        headers.insert(COOKIE, HeaderValue::from_str(&value).expect("cookie"));
        headers
    }

    #[tokio::test]
    async fn issue_then_resolve_round_trips() -> Result<()> {
        let directory = Arc::new(MemoryDirectory::new());
        let id = directory.insert_admin("ana@example.com", AdminRole::Admin, false);
        let manager = manager(directory.clone())?;

        let principal = directory.snapshot(id).expect("profile");
        let token = manager.issue(&principal, NOW)?;
        let headers = cookie_headers(&[(SESSION_COOKIE_NAME, &token)]);

        let resolved = manager.resolve(&headers, NOW + 60).await?;
        assert_eq!(resolved.principal.id, id);
        assert!(resolved.two_factor_satisfied);
        assert_eq!(resolved.issued_at_unix, NOW);
        Ok(())
    }

    #[tokio::test]
    async fn missing_cookie_is_missing() -> Result<()> {
        let manager = manager(Arc::new(MemoryDirectory::new()))?;
        let result = manager.resolve(&HeaderMap::new(), NOW).await;
        assert!(matches!(result, Err(SessionError::Missing)));
        Ok(())
    }

    #[tokio::test]
    async fn tampered_cookie_is_malformed() -> Result<()> {
        let manager = manager(Arc::new(MemoryDirectory::new()))?;
        let headers = cookie_headers(&[(SESSION_COOKIE_NAME, "ZZZZ.YYYY")]);
        let result = manager.resolve(&headers, NOW).await;
        assert!(matches!(result, Err(SessionError::Malformed)));
        Ok(())
    }

    #[tokio::test]
    async fn old_session_expires_after_seven_days() -> Result<()> {
        let directory = Arc::new(MemoryDirectory::new());
        let id = directory.insert_admin("ana@example.com", AdminRole::Admin, false);
        let manager = manager(directory.clone())?;
        let token = manager.issue(&directory.snapshot(id).expect("profile"), NOW)?;
        let headers = cookie_headers(&[(SESSION_COOKIE_NAME, &token)]);

        let seven_days = 7 * 24 * 60 * 60;
        assert!(manager.resolve(&headers, NOW + seven_days).await.is_ok());
        let result = manager.resolve(&headers, NOW + seven_days + 1).await;
        assert!(matches!(result, Err(SessionError::Expired)));
        Ok(())
    }

    #[tokio::test]
    async fn deactivated_or_removed_principal_expires_session() -> Result<()> {
        let directory = Arc::new(MemoryDirectory::new());
        let id = directory.insert_admin("ana@example.com", AdminRole::Admin, false);
        let manager = manager(directory.clone())?;
        let token = manager.issue(&directory.snapshot(id).expect("profile"), NOW)?;
        let headers = cookie_headers(&[(SESSION_COOKIE_NAME, &token)]);

        directory.set_active(id, false);
        assert!(matches!(
            manager.resolve(&headers, NOW).await,
            Err(SessionError::Expired)
        ));

        directory.remove(id);
        assert!(matches!(
            manager.resolve(&headers, NOW).await,
            Err(SessionError::Expired)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn two_factor_principal_without_marker_is_unsatisfied() -> Result<()> {
        let directory = Arc::new(MemoryDirectory::new());
        let id = directory.insert_admin("ana@example.com", AdminRole::Admin, true);
        let manager = manager(directory.clone())?;
        let token = manager.issue(&directory.snapshot(id).expect("profile"), NOW)?;
        let headers = cookie_headers(&[(SESSION_COOKIE_NAME, &token)]);

        let resolved = manager.resolve(&headers, NOW).await?;
        assert!(!resolved.two_factor_satisfied);
        Ok(())
    }

    #[tokio::test]
    async fn verification_freshness_boundary_is_inclusive() -> Result<()> {
        let directory = Arc::new(MemoryDirectory::new());
        let id = directory.insert_admin("ana@example.com", AdminRole::Admin, true);
        let manager = manager(directory.clone())?;
        let session = manager.issue(&directory.snapshot(id).expect("profile"), NOW)?;
        let marker = manager.issue_verification(id, NOW)?;
        let headers = cookie_headers(&[
            (SESSION_COOKIE_NAME, &session),
            (VERIFIED_COOKIE_NAME, &marker),
        ]);

        // Exactly 3600s old: still satisfied. One second later: not.
        let resolved = manager.resolve(&headers, NOW + 3600).await?;
        assert!(resolved.two_factor_satisfied);
        let resolved = manager.resolve(&headers, NOW + 3601).await?;
        assert!(!resolved.two_factor_satisfied);
        Ok(())
    }

    #[tokio::test]
    async fn marker_for_another_principal_does_not_satisfy() -> Result<()> {
        let directory = Arc::new(MemoryDirectory::new());
        let id = directory.insert_admin("ana@example.com", AdminRole::Admin, true);
        let manager = manager(directory.clone())?;
        let session = manager.issue(&directory.snapshot(id).expect("profile"), NOW)?;
        let marker = manager.issue_verification(Uuid::new_v4(), NOW)?;
        let headers = cookie_headers(&[
            (SESSION_COOKIE_NAME, &session),
            (VERIFIED_COOKIE_NAME, &marker),
        ]);

        let resolved = manager.resolve(&headers, NOW).await?;
        assert!(!resolved.two_factor_satisfied);
        Ok(())
    }

    #[tokio::test]
    async fn challenge_style_token_is_not_a_session() -> Result<()> {
        let directory = Arc::new(MemoryDirectory::new());
        let id = directory.insert_admin("ana@example.com", AdminRole::Admin, true);
        let manager = manager(directory.clone())?;
        // A verification marker presented as the session cookie must fail
        // on purpose mismatch, not resolve.
        let marker = manager.issue_verification(id, NOW)?;
        let headers = cookie_headers(&[(SESSION_COOKIE_NAME, &marker)]);
        let result = manager.resolve(&headers, NOW).await;
        assert!(matches!(result, Err(SessionError::Malformed)));
        Ok(())
    }

    #[test]
    fn cookies_carry_admin_path_scope() -> Result<()> {
        let manager = manager(Arc::new(MemoryDirectory::new()))?;
        let cookie = manager.session_cookie("value")?;
        let cookie = cookie.to_str()?;
        assert!(cookie.contains("Path=/admin"));
        assert!(cookie.contains("HttpOnly"));
        assert!(!cookie.contains("Secure"));

        let clears = manager.clear_cookies();
        assert_eq!(clears.len(), 2);
        assert!(clears[0].to_str()?.contains("Max-Age=0"));
        Ok(())
    }
}
