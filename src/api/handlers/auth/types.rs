//! Request and response payloads for the auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::directory::AdminPrincipal;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTwoFactorRequest {
    pub temporary_token: String,
    pub code: String,
}

/// Public view of an authenticated admin. The role is informational for the
/// client; authorization never reads it back from a response.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdminView {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl From<&AdminPrincipal> for AdminView {
    fn from(principal: &AdminPrincipal) -> Self {
        Self {
            id: principal.id.to_string(),
            email: principal.email.clone(),
            role: principal.role.as_str().to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AdminView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_two_factor: Option<bool>,
    /// Single-use challenge token, present only when a 2FA step-up is
    /// pending. Never a session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_token: Option<String>,
}

impl LoginResponse {
    #[must_use]
    pub fn established(principal: &AdminPrincipal) -> Self {
        Self {
            success: true,
            user: Some(AdminView::from(principal)),
            requires_two_factor: None,
            temporary_token: None,
        }
    }

    #[must_use]
    pub fn challenge(token: String) -> Self {
        Self {
            success: true,
            user: None,
            requires_two_factor: Some(true),
            temporary_token: Some(token),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTwoFactorResponse {
    pub success: bool,
    pub user: AdminView,
    /// Session value for API clients; browser clients rely on the cookie.
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub authenticated: bool,
    pub user: AdminView,
    pub two_factor_satisfied: bool,
    pub issued_at: i64,
}
