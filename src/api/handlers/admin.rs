//! Protected admin resources.
//!
//! Every handler here runs behind the admin guard, so a request that
//! reaches one carries a resolved, 2FA-satisfied session with a role that
//! maps to the route's permission. The payloads are thin; the real data
//! sources live in the services these routes front.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::session::ResolvedSession;

use super::{error_response, now_unix_seconds};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub email: String,
    pub role: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReportRequest {
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSettingsRequest {
    pub settings: serde_json::Value,
}

#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "Admin user listing"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Insufficient permissions")
    ),
    tag = "admin"
)]
pub async fn list_users(session: Extension<ResolvedSession>) -> impl IntoResponse {
    Json(json!({
        "users": [],
        "requestedBy": session.principal.id,
        "generatedAt": now_unix_seconds(),
    }))
}

#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "User created"),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Insufficient permissions")
    ),
    tag = "admin"
)]
pub async fn create_user(
    session: Extension<ResolvedSession>,
    payload: Option<Json<CreateUserRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Missing payload");
    };
    if request.email.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Email is required");
    }
    Json(json!({
        "success": true,
        "email": request.email,
        "role": request.role,
        "createdBy": session.principal.id,
    }))
    .into_response()
}

#[utoipa::path(
    get,
    path = "/admin/analytics",
    responses(
        (status = 200, description = "Dashboard analytics"),
        (status = 403, description = "Insufficient permissions")
    ),
    tag = "admin"
)]
pub async fn analytics(session: Extension<ResolvedSession>) -> impl IntoResponse {
    Json(json!({
        "viewer": session.principal.email,
        "metrics": {},
        "generatedAt": now_unix_seconds(),
    }))
}

#[utoipa::path(
    get,
    path = "/admin/reports",
    responses(
        (status = 200, description = "Report listing"),
        (status = 403, description = "Insufficient permissions")
    ),
    tag = "admin"
)]
pub async fn list_reports(session: Extension<ResolvedSession>) -> impl IntoResponse {
    Json(json!({
        "reports": [],
        "requestedBy": session.principal.id,
        "generatedAt": now_unix_seconds(),
    }))
}

#[utoipa::path(
    post,
    path = "/admin/reports",
    request_body = CreateReportRequest,
    responses(
        (status = 200, description = "Report created"),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Insufficient permissions")
    ),
    tag = "admin"
)]
pub async fn create_report(
    session: Extension<ResolvedSession>,
    payload: Option<Json<CreateReportRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Missing payload");
    };
    if request.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Name is required");
    }
    Json(json!({
        "success": true,
        "name": request.name,
        "createdBy": session.principal.id,
    }))
    .into_response()
}

#[utoipa::path(
    get,
    path = "/admin/settings",
    responses(
        (status = 200, description = "Dashboard settings"),
        (status = 403, description = "Insufficient permissions")
    ),
    tag = "admin"
)]
pub async fn settings(session: Extension<ResolvedSession>) -> impl IntoResponse {
    Json(json!({
        "settings": {},
        "requestedBy": session.principal.id,
    }))
}

#[utoipa::path(
    put,
    path = "/admin/settings",
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings updated"),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Insufficient permissions")
    ),
    tag = "admin"
)]
pub async fn update_settings(
    session: Extension<ResolvedSession>,
    payload: Option<Json<UpdateSettingsRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Missing payload");
    };
    Json(json!({
        "success": true,
        "settings": request.settings,
        "updatedBy": session.principal.id,
    }))
    .into_response()
}
