//! HTTP-backed directory and identity provider clients.
//!
//! Both collaborators are plain JSON-over-HTTP services. Connectivity
//! failures are treated as fatal for the request (no retries here); retry
//! policy, if any, belongs to the caller.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::error;
use url::Url;
use uuid::Uuid;

use super::{AdminDirectory, AdminPrincipal, AuthError, IdentityProvider};
use crate::rbac::AdminRole;

#[derive(Debug, Serialize)]
struct VerifyCredentialsRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyCredentialsResponse {
    principal_id: Uuid,
}

/// Wire form of an admin profile. The secret arrives as an opaque string
/// and is wrapped before the profile leaves this module.
#[derive(Debug, Deserialize)]
struct AdminProfileResponse {
    id: Uuid,
    email: String,
    role: String,
    is_active: bool,
    two_factor_enabled: bool,
    two_factor_secret: Option<String>,
}

impl AdminProfileResponse {
    fn into_principal(self) -> Result<AdminPrincipal> {
        let role = AdminRole::from_str(&self.role)
            .ok_or_else(|| anyhow!("unknown admin role: {}", self.role))?;
        Ok(AdminPrincipal {
            id: self.id,
            email: self.email,
            role,
            is_active: self.is_active,
            two_factor_enabled: self.two_factor_enabled,
            two_factor_secret: self.two_factor_secret.map(SecretString::from),
        })
    }
}

/// Identity provider client: `POST {base}/v1/credentials/verify`.
#[derive(Clone, Debug)]
pub struct HttpIdentityProvider {
    client: Client,
    base_url: Url,
}

impl HttpIdentityProvider {
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be
    /// built.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("Invalid identity provider URL")?;
        let client = Client::builder()
            .user_agent(crate::api::APP_USER_AGENT)
            .build()
            .context("Failed to build identity provider client")?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn verify_credentials(&self, email: &str, password: &str) -> Result<Uuid, AuthError> {
        let url = self
            .base_url
            .join("v1/credentials/verify")
            .map_err(|err| AuthError::Provider(err.into()))?;

        let response = self
            .client
            .post(url)
            .json(&VerifyCredentialsRequest { email, password })
            .send()
            .await
            .map_err(|err| {
                error!("Identity provider unreachable: {err}");
                AuthError::Provider(err.into())
            })?;

        match response.status() {
            StatusCode::OK => {
                let body: VerifyCredentialsResponse = response
                    .json()
                    .await
                    .map_err(|err| AuthError::Provider(err.into()))?;
                Ok(body.principal_id)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::InvalidCredentials),
            status => {
                error!("Identity provider returned {status}");
                Err(AuthError::Provider(anyhow!(
                    "identity provider returned {status}"
                )))
            }
        }
    }
}

/// Admin directory client: `GET {base}/v1/admins/{id}`.
#[derive(Clone, Debug)]
pub struct HttpAdminDirectory {
    client: Client,
    base_url: Url,
}

impl HttpAdminDirectory {
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be
    /// built.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("Invalid admin directory URL")?;
        let client = Client::builder()
            .user_agent(crate::api::APP_USER_AGENT)
            .build()
            .context("Failed to build admin directory client")?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl AdminDirectory for HttpAdminDirectory {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<AdminPrincipal>> {
        let url = self
            .base_url
            .join(&format!("v1/admins/{id}"))
            .context("Invalid admin directory path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Admin directory unreachable")?;

        match response.status() {
            StatusCode::OK => {
                let profile: AdminProfileResponse = response
                    .json()
                    .await
                    .context("Invalid admin directory response")?;
                profile.into_principal().map(Some)
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(anyhow!("admin directory returned {status}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AdminProfileResponse, HttpAdminDirectory, HttpIdentityProvider};
    use anyhow::Result;
    use uuid::Uuid;

    #[test]
    fn clients_reject_invalid_base_urls() {
        assert!(HttpIdentityProvider::new("not a url").is_err());
        assert!(HttpAdminDirectory::new("not a url").is_err());
    }

    #[test]
    fn profile_parses_known_role() -> Result<()> {
        let profile = AdminProfileResponse {
            id: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            role: "analyst".to_string(),
            is_active: true,
            two_factor_enabled: false,
            two_factor_secret: None,
        };
        let principal = profile.into_principal()?;
        assert_eq!(principal.role, crate::rbac::AdminRole::Analyst);
        Ok(())
    }

    #[test]
    fn profile_rejects_unknown_role() {
        let profile = AdminProfileResponse {
            id: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            role: "root".to_string(),
            is_active: true,
            two_factor_enabled: false,
            two_factor_secret: None,
        };
        assert!(profile.into_principal().is_err());
    }
}
