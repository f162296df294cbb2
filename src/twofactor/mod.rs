//! Two-factor step-up gate.
//!
//! Flow Overview:
//! 1) After credential auth, `begin` decides between `NotRequired` (issue
//!    the session directly) and `Pending` (hand back a challenge token, no
//!    session yet).
//! 2) `verify` consumes a challenge attempt: the token must verify, the
//!    server-side challenge entry must still exist, and the TOTP code must
//!    match the principal's secret.
//! 3) Success consumes the challenge so the token cannot be replayed; the
//!    attempt ceiling destroys it and forces a fresh login.
//!
//! Security boundaries:
//! - The challenge token authorizes exactly one verification sequence for
//!   one principal; it is never accepted in place of a session.
//! - Challenge entries live server-side, so a forged or replayed token
//!   finds nothing to consume and fails closed.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::warn;
use uuid::Uuid;

use secrecy::ExposeSecret;

use crate::directory::{AdminDirectory, AdminPrincipal};
use crate::session::token::TokenKey;

pub const DEFAULT_CHALLENGE_TTL_SECONDS: i64 = 5 * 60;
pub const DEFAULT_MAX_ATTEMPTS: u8 = 5;

const CHALLENGE_PURPOSE: &str = "2fa_required";

#[derive(Debug, thiserror::Error)]
pub enum TwoFactorError {
    /// Code was well-formed-token, wrong code: the challenge stays pending.
    #[error("Invalid verification code")]
    InvalidCode,
    /// Token malformed, expired, wrong purpose, or already consumed.
    #[error("Verification token expired")]
    TokenExpired,
    /// Attempt ceiling reached; the challenge is destroyed.
    #[error("Too many verification attempts")]
    TooManyAttempts,
    /// Backend failure (directory or TOTP setup); fatal for this request.
    #[error("two-factor backend failure: {0}")]
    Internal(#[source] anyhow::Error),
}

/// Result of starting the step-up stage for an authenticated principal.
#[derive(Clone, Debug)]
pub enum ChallengeOutcome {
    /// 2FA disabled for the principal: proceed straight to session issuance.
    NotRequired,
    /// 2FA enabled: the caller gets this single-purpose token and no session.
    Pending { token: String },
}

/// Claims inside the opaque challenge token. The server-side entry keyed by
/// `jti` is what actually authorizes an attempt.
#[derive(Debug, Serialize, Deserialize)]
struct ChallengeClaims {
    purpose: String,
    principal_id: Uuid,
    jti: Uuid,
    issued_at_unix: i64,
}

#[derive(Debug)]
struct ChallengeEntry {
    principal_id: Uuid,
    issued_at_unix: i64,
    attempts: u8,
}

pub struct TwoFactorGate {
    key: TokenKey,
    challenges: Mutex<HashMap<Uuid, ChallengeEntry>>,
    challenge_ttl_seconds: i64,
    max_attempts: u8,
}

impl TwoFactorGate {
    #[must_use]
    pub fn new(key: TokenKey) -> Self {
        Self {
            key,
            challenges: Mutex::new(HashMap::new()),
            challenge_ttl_seconds: DEFAULT_CHALLENGE_TTL_SECONDS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_challenge_ttl_seconds(mut self, seconds: i64) -> Self {
        self.challenge_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u8) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Start the step-up stage for a confirmed active principal.
    ///
    /// The server-side entry is inserted before the token is returned, so a
    /// verification attempt can never race ahead of issuance.
    ///
    /// # Errors
    /// Returns an error if token signing fails.
    pub async fn begin(
        &self,
        principal: &AdminPrincipal,
        now_unix: i64,
    ) -> anyhow::Result<ChallengeOutcome> {
        if !principal.two_factor_enabled {
            return Ok(ChallengeOutcome::NotRequired);
        }

        let jti = Uuid::new_v4();
        let token = self.key.sign(&ChallengeClaims {
            purpose: CHALLENGE_PURPOSE.to_string(),
            principal_id: principal.id,
            jti,
            issued_at_unix: now_unix,
        })?;

        let mut challenges = self.challenges.lock().await;
        // Opportunistic purge keeps the map bounded by the login rate.
        let ttl = self.challenge_ttl_seconds;
        challenges.retain(|_, entry| now_unix.saturating_sub(entry.issued_at_unix) <= ttl);
        challenges.insert(
            jti,
            ChallengeEntry {
                principal_id: principal.id,
                issued_at_unix: now_unix,
                attempts: 0,
            },
        );

        Ok(ChallengeOutcome::Pending { token })
    }

    /// Consume one verification attempt against a pending challenge.
    ///
    /// On success the challenge is consumed and the fresh principal profile
    /// is returned so the caller can issue the session.
    ///
    /// # Errors
    /// [`TwoFactorError`] per the state machine: `TokenExpired` for any
    /// unusable token, `InvalidCode` for a wrong code below the ceiling,
    /// `TooManyAttempts` once the ceiling is hit.
    pub async fn verify(
        &self,
        directory: &dyn AdminDirectory,
        token: &str,
        code: &str,
        now_unix: i64,
    ) -> Result<AdminPrincipal, TwoFactorError> {
        let claims: ChallengeClaims = self
            .key
            .verify(token)
            .map_err(|_| TwoFactorError::TokenExpired)?;
        if claims.purpose != CHALLENGE_PURPOSE {
            return Err(TwoFactorError::TokenExpired);
        }
        if now_unix.saturating_sub(claims.issued_at_unix) > self.challenge_ttl_seconds {
            self.challenges.lock().await.remove(&claims.jti);
            return Err(TwoFactorError::TokenExpired);
        }

        // Fresh profile per verification cycle; never cached across requests.
        let principal = directory
            .get_by_id(claims.principal_id)
            .await
            .map_err(TwoFactorError::Internal)?
            .filter(|principal| principal.is_active && principal.two_factor_enabled)
            .ok_or(TwoFactorError::TokenExpired)?;

        let code_matches = valid_code_format(code)
            && totp_code_matches(&principal, code, now_unix).map_err(TwoFactorError::Internal)?;

        // All challenge-state decisions happen under one lock acquisition;
        // the directory call above deliberately stays outside it.
        let mut challenges = self.challenges.lock().await;
        let Some(entry) = challenges.get_mut(&claims.jti) else {
            // Unknown jti: expired, already consumed, or destroyed by the
            // attempt ceiling. All indistinguishable to the caller.
            return Err(TwoFactorError::TokenExpired);
        };
        if entry.principal_id != claims.principal_id {
            return Err(TwoFactorError::TokenExpired);
        }

        if code_matches {
            challenges.remove(&claims.jti);
            return Ok(principal);
        }

        entry.attempts = entry.attempts.saturating_add(1);
        if entry.attempts >= self.max_attempts {
            warn!(
                principal_id = %claims.principal_id,
                "two-factor challenge locked after repeated failures"
            );
            challenges.remove(&claims.jti);
            return Err(TwoFactorError::TooManyAttempts);
        }
        Err(TwoFactorError::InvalidCode)
    }

    /// Number of live challenges; used by tests and the sweep task.
    pub async fn pending_challenges(&self) -> usize {
        self.challenges.lock().await.len()
    }

    /// Drop entries whose window has fully elapsed.
    pub async fn sweep(&self, now_unix: i64) {
        let ttl = self.challenge_ttl_seconds;
        self.challenges
            .lock()
            .await
            .retain(|_, entry| now_unix.saturating_sub(entry.issued_at_unix) <= ttl);
    }
}

/// Submitted codes are exactly six digits.
fn valid_code_format(code: &str) -> bool {
    Regex::new(r"^\d{6}$").is_ok_and(|re| re.is_match(code))
}

/// Trusted library call: checks `code` against the principal's TOTP secret
/// at `now_unix`, honoring one 30s step of clock skew.
fn totp_code_matches(
    principal: &AdminPrincipal,
    code: &str,
    now_unix: i64,
) -> anyhow::Result<bool> {
    let Some(secret) = principal.two_factor_secret.as_ref() else {
        // Enabled flag without a secret: treat as non-matching, not a 500.
        warn!(principal_id = %principal.id, "two-factor enabled but no secret on profile");
        return Ok(false);
    };
    let secret_bytes = Secret::Encoded(secret.expose_secret().to_string())
        .to_bytes()
        .map_err(|err| anyhow::anyhow!("invalid TOTP secret: {err}"))?;
    let totp = TOTP::new(Algorithm::SHA1, 6, 1, 30, secret_bytes)
        .map_err(|err| anyhow::anyhow!("TOTP init error: {err}"))?;
    let timestamp = u64::try_from(now_unix).unwrap_or(0);
    Ok(totp.check(code, timestamp))
}
