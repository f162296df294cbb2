use crate::api;
use crate::api::handlers::auth::state::AuthConfig;
use crate::cli::actions::Action;
use anyhow::{Context, Result};
use url::Url;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            identity_url,
            directory_url,
            session_secret,
            base_url,
            frontend_url,
        } => {
            // Fail fast on unparseable URLs, before binding the listener.
            Url::parse(&identity_url).context("Invalid identity provider URL")?;
            Url::parse(&directory_url).context("Invalid directory URL")?;
            Url::parse(&base_url).context("Invalid base URL")?;

            let auth_config = AuthConfig::new(base_url);

            api::new(
                port,
                identity_url,
                directory_url,
                session_secret,
                frontend_url,
                auth_config,
            )
            .await?;
        }
    }

    Ok(())
}
