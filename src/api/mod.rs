use crate::{
    api::handlers::{admin, auth, health, root},
    audit::TracingAuditSink,
    cache::ResponseCache,
    directory::http::{HttpAdminDirectory, HttpIdentityProvider},
    session::token::TokenKey,
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware::from_fn,
    routing::{get, post},
};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;

pub mod handlers;
pub mod middleware;

use handlers::auth::state::{AuthConfig, AuthState};
use middleware::RateLimits;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Build the full application router around the given collaborators.
///
/// Layering, outermost first: rate limiting, then the admin guard, then
/// the response cache, then the handler. `/health` and `/` sit outside the
/// admin surface and skip all three.
#[must_use]
pub fn router(
    auth_state: Arc<AuthState>,
    limits: Arc<RateLimits>,
    cache: Arc<ResponseCache>,
) -> Router {
    let protected = Router::new()
        .route("/admin/users", get(admin::list_users).post(admin::create_user))
        .route("/admin/analytics", get(admin::analytics))
        .route(
            "/admin/reports",
            get(admin::list_reports).post(admin::create_report),
        )
        .route(
            "/admin/settings",
            get(admin::settings).put(admin::update_settings),
        )
        .layer(from_fn(middleware::cache_response))
        .layer(from_fn(middleware::require_admin));

    let admin_surface = Router::new()
        .route("/admin/login", post(auth::login))
        .route("/admin/2fa/verify", post(auth::verify_two_factor))
        .route("/admin/logout", post(auth::logout))
        .route("/admin/session", get(auth::session))
        .merge(protected)
        .layer(from_fn(middleware::rate_limit));

    Router::new()
        .merge(admin_surface)
        .route("/health", get(health::health))
        .route("/", get(root::root))
        .layer(Extension(auth_state))
        .layer(Extension(limits))
        .layer(Extension(cache))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    identity_url: String,
    directory_url: String,
    session_secret: SecretString,
    frontend_url: String,
    auth_config: AuthConfig,
) -> Result<()> {
    let identity = Arc::new(
        HttpIdentityProvider::new(&identity_url).context("Invalid identity provider URL")?,
    );
    let directory =
        Arc::new(HttpAdminDirectory::new(&directory_url).context("Invalid directory URL")?);
    let key = TokenKey::from_secret(&session_secret);
    let auth_state = Arc::new(AuthState::new(
        auth_config,
        key,
        identity,
        directory,
        Arc::new(TracingAuditSink),
    ));

    let limits = Arc::new(RateLimits::new());
    let cache = Arc::new(ResponseCache::new());

    spawn_sweeper(auth_state.clone(), limits.clone(), cache.clone());

    let frontend_origin = frontend_origin(&frontend_url)?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let app = router(auth_state, limits, cache).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

/// Periodic maintenance: expired challenges, elapsed rate-limit windows and
/// stale cache entries all get dropped on one timer.
fn spawn_sweeper(auth_state: Arc<AuthState>, limits: Arc<RateLimits>, cache: Arc<ResponseCache>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let now = handlers::now_unix_seconds();
            let now_ms = handlers::now_unix_millis();
            auth_state.two_factor().sweep(now).await;
            limits.sweep(now_ms);
            cache.sweep(now_ms);
        }
    });
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::frontend_origin;

    #[test]
    fn frontend_origin_strips_path_and_keeps_port() {
        let origin = frontend_origin("https://admin.example.com:8443/dashboard").expect("origin");
        assert_eq!(origin, "https://admin.example.com:8443");

        let origin = frontend_origin("http://localhost:3000").expect("origin");
        assert_eq!(origin, "http://localhost:3000");
    }

    #[test]
    fn frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
    }
}
