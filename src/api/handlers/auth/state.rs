//! Auth configuration and shared handler state.

use std::sync::Arc;

use crate::audit::AuditSink;
use crate::directory::{AdminDirectory, IdentityProvider};
use crate::session::{
    DEFAULT_SESSION_TTL_SECONDS, DEFAULT_VERIFICATION_TTL_SECONDS, SessionManager, token::TokenKey,
};
use crate::twofactor::{DEFAULT_CHALLENGE_TTL_SECONDS, DEFAULT_MAX_ATTEMPTS, TwoFactorGate};

#[derive(Clone, Debug)]
pub struct AuthConfig {
    base_url: String,
    session_ttl_seconds: i64,
    verification_ttl_seconds: i64,
    challenge_ttl_seconds: i64,
    max_verification_attempts: u8,
}

impl AuthConfig {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            verification_ttl_seconds: DEFAULT_VERIFICATION_TTL_SECONDS,
            challenge_ttl_seconds: DEFAULT_CHALLENGE_TTL_SECONDS,
            max_verification_attempts: DEFAULT_MAX_ATTEMPTS,
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
    pub fn with_challenge_ttl_seconds(mut self, seconds: i64) -> Self {
        self.challenge_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_verification_attempts(mut self, attempts: u8) -> Self {
        self.max_verification_attempts = attempts;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn verification_ttl_seconds(&self) -> i64 {
        self.verification_ttl_seconds
    }

    #[must_use]
    pub fn challenge_ttl_seconds(&self) -> i64 {
        self.challenge_ttl_seconds
    }

    #[must_use]
    pub fn max_verification_attempts(&self) -> u8 {
        self.max_verification_attempts
    }

    /// Cookies are `Secure` whenever the public base URL is HTTPS.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

/// Everything the auth handlers and the admin guard share.
pub struct AuthState {
    config: AuthConfig,
    directory: Arc<dyn AdminDirectory>,
    identity: Arc<dyn IdentityProvider>,
    sessions: SessionManager,
    two_factor: TwoFactorGate,
    audit: Arc<dyn AuditSink>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        key: TokenKey,
        identity: Arc<dyn IdentityProvider>,
        directory: Arc<dyn AdminDirectory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let sessions = SessionManager::new(key.clone(), directory.clone(), config.cookie_secure())
            .with_session_ttl_seconds(config.session_ttl_seconds())
            .with_verification_ttl_seconds(config.verification_ttl_seconds());
        let two_factor = TwoFactorGate::new(key)
            .with_challenge_ttl_seconds(config.challenge_ttl_seconds())
            .with_max_attempts(config.max_verification_attempts());
        Self {
            config,
            directory,
            identity,
            sessions,
            two_factor,
            audit,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn directory(&self) -> &dyn AdminDirectory {
        self.directory.as_ref()
    }

    #[must_use]
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn two_factor(&self) -> &TwoFactorGate {
        &self.two_factor
    }

    #[must_use]
    pub fn audit(&self) -> &dyn AuditSink {
        self.audit.as_ref()
    }
}
