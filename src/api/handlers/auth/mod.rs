//! Login, two-factor step-up, logout and session introspection.
//!
//! Flow Overview:
//! 1) `POST /admin/login` verifies credentials, then either establishes a
//!    session (2FA disabled) or returns a single-use challenge token.
//! 2) `POST /admin/2fa/verify` consumes the challenge; success mints the
//!    session plus the verification marker cookie.
//! 3) `POST /admin/logout` clears both cookies; `GET /admin/session`
//!    reports the current session without mutating it.
//!
//! Security boundaries:
//! - "Invalid credentials" and "not an admin" produce identical responses,
//!   so admin accounts cannot be enumerated through the login form.
//! - A pending challenge never carries a session; cookie issuance happens
//!   only after every required stage has passed.

pub mod state;
pub mod types;

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use crate::audit::AuditEvent;
use crate::directory::{AdminPrincipal, AuthError, authenticate_credentials};
use crate::twofactor::{ChallengeOutcome, TwoFactorError};

use super::{
    ErrorResponse, error_response, extract_client_ip, normalize_email, now_unix_seconds,
    valid_email,
};
use state::AuthState;
use types::{
    LoginRequest, LoginResponse, SessionResponse, VerifyTwoFactorRequest, VerifyTwoFactorResponse,
};

#[utoipa::path(
    post,
    path = "/admin/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session established or 2FA challenge issued", body = LoginResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Authentication failed", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Missing payload");
    };

    let email = normalize_email(&request.email);
    if email.is_empty() || request.password.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Email and password are required");
    }
    if !valid_email(&email) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid email");
    }

    let client_ip = extract_client_ip(&headers);
    let principal = match authenticate_credentials(
        auth_state.identity(),
        auth_state.directory(),
        &email,
        &request.password,
    )
    .await
    {
        Ok(principal) => principal,
        Err(err) => return login_failure(&auth_state, &err, &email, client_ip.as_deref()),
    };

    let now = now_unix_seconds();
    match auth_state.two_factor().begin(&principal, now).await {
        Ok(ChallengeOutcome::NotRequired) => {
            establish_session(&auth_state, &principal, now, client_ip.as_deref(), false)
        }
        Ok(ChallengeOutcome::Pending { token }) => {
            auth_state.audit().record(
                AuditEvent::new("two_factor_challenge")
                    .with_actor(principal.id)
                    .with_metadata(json!({ "ip": client_ip })),
            );
            (StatusCode::OK, Json(LoginResponse::challenge(token))).into_response()
        }
        Err(err) => {
            error!("Failed to start two-factor challenge: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Login failed")
        }
    }
}

fn login_failure(
    auth_state: &AuthState,
    err: &AuthError,
    email: &str,
    client_ip: Option<&str>,
) -> Response {
    let (status, message) = match err {
        // One message for both, so the login form cannot be used to probe
        // which addresses belong to admins.
        AuthError::InvalidCredentials | AuthError::AdminNotFound => {
            (StatusCode::UNAUTHORIZED, "Invalid credentials")
        }
        AuthError::AccountDeactivated => (StatusCode::UNAUTHORIZED, "Account deactivated"),
        AuthError::Provider(inner) => {
            error!("Identity backend failure during login: {inner}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Login failed")
        }
    };
    if status == StatusCode::UNAUTHORIZED {
        auth_state.audit().record(
            AuditEvent::new("login_failure")
                .with_metadata(json!({ "email": email, "ip": client_ip })),
        );
    }
    error_response(status, message)
}

fn establish_session(
    auth_state: &AuthState,
    principal: &AdminPrincipal,
    now_unix: i64,
    client_ip: Option<&str>,
    with_verification_marker: bool,
) -> Response {
    let session_token = match auth_state.sessions().issue(principal, now_unix) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue session: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Login failed");
        }
    };

    let mut cookies = Vec::new();
    match auth_state.sessions().session_cookie(&session_token) {
        Ok(cookie) => cookies.push(cookie),
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Login failed");
        }
    }
    if with_verification_marker {
        let marker = auth_state
            .sessions()
            .issue_verification(principal.id, now_unix)
            .and_then(|marker| {
                auth_state
                    .sessions()
                    .verification_cookie(&marker)
                    .map_err(anyhow::Error::from)
            });
        match marker {
            Ok(cookie) => cookies.push(cookie),
            Err(err) => {
                error!("Failed to build verification cookie: {err}");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Login failed");
            }
        }
    }

    let action = if with_verification_marker {
        "two_factor_success"
    } else {
        "login_success"
    };
    auth_state.audit().record(
        AuditEvent::new(action)
            .with_actor(principal.id)
            .with_metadata(json!({ "ip": client_ip })),
    );

    let body: Response = if with_verification_marker {
        (
            StatusCode::OK,
            Json(VerifyTwoFactorResponse {
                success: true,
                user: principal.into(),
                token: session_token,
            }),
        )
            .into_response()
    } else {
        (StatusCode::OK, Json(LoginResponse::established(principal))).into_response()
    };

    let mut response = body;
    for cookie in cookies {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

#[utoipa::path(
    post,
    path = "/admin/2fa/verify",
    request_body = VerifyTwoFactorRequest,
    responses(
        (status = 200, description = "Two-factor verified, session established", body = VerifyTwoFactorResponse),
        (status = 400, description = "Invalid code or unusable challenge token", body = ErrorResponse),
        (status = 429, description = "Too many verification attempts", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_two_factor(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyTwoFactorRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Missing payload");
    };
    let token = request.temporary_token.trim();
    let code = request.code.trim();
    if token.is_empty() || code.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Token and code are required");
    }

    let client_ip = extract_client_ip(&headers);
    let now = now_unix_seconds();
    match auth_state
        .two_factor()
        .verify(auth_state.directory(), token, code, now)
        .await
    {
        Ok(principal) => establish_session(&auth_state, &principal, now, client_ip.as_deref(), true),
        Err(TwoFactorError::InvalidCode) => {
            auth_state.audit().record(
                AuditEvent::new("two_factor_failure").with_metadata(json!({ "ip": client_ip })),
            );
            error_response(StatusCode::BAD_REQUEST, "Invalid verification code")
        }
        // Expired, consumed and forged tokens all land here: the challenge
        // is unusable, the client starts over from login.
        Err(TwoFactorError::TokenExpired) => {
            error_response(StatusCode::BAD_REQUEST, "Verification token expired")
        }
        Err(TwoFactorError::TooManyAttempts) => {
            auth_state.audit().record(
                AuditEvent::new("two_factor_locked").with_metadata(json!({ "ip": client_ip })),
            );
            error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "Too many verification attempts",
            )
        }
        Err(TwoFactorError::Internal(err)) => {
            error!("Two-factor backend failure: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Verification failed")
        }
    }
}

#[utoipa::path(
    post,
    path = "/admin/logout",
    responses(
        (status = 200, description = "Session cleared; idempotent")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let now = now_unix_seconds();
    // Best effort attribution; logout succeeds with or without a live
    // session.
    if let Ok(resolved) = auth_state.sessions().resolve(&headers, now).await {
        auth_state
            .audit()
            .record(AuditEvent::new("logout").with_actor(resolved.principal.id));
    }

    let mut response = (StatusCode::OK, Json(json!({ "success": true }))).into_response();
    for cookie in auth_state.sessions().clear_cookies() {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

#[utoipa::path(
    get,
    path = "/admin/session",
    responses(
        (status = 200, description = "Current session", body = SessionResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let now = now_unix_seconds();
    match auth_state.sessions().resolve(&headers, now).await {
        Ok(resolved) => (
            StatusCode::OK,
            Json(SessionResponse {
                authenticated: true,
                user: (&resolved.principal).into(),
                two_factor_satisfied: resolved.two_factor_satisfied,
                issued_at: resolved.issued_at_unix,
            }),
        )
            .into_response(),
        Err(crate::session::SessionError::Backend(err)) => {
            error!("Session backend failure: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Session lookup failed")
        }
        Err(_) => {
            let mut response = error_response(StatusCode::UNAUTHORIZED, "Not authenticated");
            for cookie in auth_state.sessions().clear_cookies() {
                response.headers_mut().append(SET_COOKIE, cookie);
            }
            response
        }
    }
}
