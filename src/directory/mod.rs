//! Admin directory and identity provider collaborators.
//!
//! Flow Overview:
//! 1) `IdentityProvider` verifies email+password and returns a principal id.
//! 2) `AdminDirectory` resolves a principal id to the admin profile.
//! 3) `authenticate_credentials` chains the two for the login entry point.
//!
//! Security boundaries:
//! - Profiles are loaded fresh per session-establishing operation and per
//!   privileged check; they are never cached beyond a single request.
//! - `AdminNotFound` is surfaced to callers identically to
//!   `InvalidCredentials` so admin accounts cannot be enumerated.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use secrecy::SecretString;
use uuid::Uuid;

use crate::rbac::AdminRole;

/// Admin profile as owned by the external directory.
#[derive(Clone, Debug)]
pub struct AdminPrincipal {
    pub id: Uuid,
    pub email: String,
    pub role: AdminRole,
    pub is_active: bool,
    pub two_factor_enabled: bool,
    /// Opaque TOTP secret (base32). Only ever handed to the TOTP validator.
    pub two_factor_secret: Option<SecretString>,
}

/// Login-entry failures. Transport problems ride in `Provider` and map to
/// `500`; everything else maps to `401` with a generic message.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Not an admin account")]
    AdminNotFound,
    #[error("Account deactivated")]
    AccountDeactivated,
    #[error("identity backend unavailable: {0}")]
    Provider(#[source] anyhow::Error),
}

/// Verifies email+password against the identity backend.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns the verified principal id.
    ///
    /// # Errors
    /// `InvalidCredentials` when the pair does not verify; `Provider` when
    /// the backend cannot be reached.
    async fn verify_credentials(&self, email: &str, password: &str) -> Result<Uuid, AuthError>;
}

/// Resolves principal ids to admin profiles.
#[async_trait]
pub trait AdminDirectory: Send + Sync {
    /// Returns the admin profile, or `None` for "not an admin".
    ///
    /// # Errors
    /// Returns an error only for backend connectivity failures.
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<AdminPrincipal>>;
}

/// Login entry: verify credentials, then confirm the principal is an active
/// admin. No session and no challenge exist yet when this returns an error.
///
/// # Errors
/// `InvalidCredentials` for empty fields or failed verification,
/// `AdminNotFound` when the directory has no profile, `AccountDeactivated`
/// for inactive profiles, `Provider` for backend failures.
pub async fn authenticate_credentials(
    identity: &dyn IdentityProvider,
    directory: &dyn AdminDirectory,
    email: &str,
    password: &str,
) -> Result<AdminPrincipal, AuthError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AuthError::InvalidCredentials);
    }

    let principal_id = identity.verify_credentials(email, password).await?;

    let principal = directory
        .get_by_id(principal_id)
        .await
        .map_err(AuthError::Provider)?
        .ok_or(AuthError::AdminNotFound)?;

    if !principal.is_active {
        return Err(AuthError::AccountDeactivated);
    }

    Ok(principal)
}
