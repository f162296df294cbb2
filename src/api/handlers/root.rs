use axum::{http::StatusCode, response::IntoResponse};

// Root is intentionally anonymous: no version, no build info.
pub async fn root() -> impl IntoResponse {
    (StatusCode::OK, env!("CARGO_PKG_NAME"))
}

#[cfg(test)]
mod tests {
    use super::root;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn root_answers_with_name_only() {
        let response = root().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
