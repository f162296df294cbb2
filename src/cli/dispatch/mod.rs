use crate::cli::actions::Action;
use anyhow::Result;
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let required = |name: &str| -> Result<String> {
        matches
            .get_one::<String>(name)
            .map(String::to_string)
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{name}"))
    };

    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        identity_url: required("identity-url")?,
        directory_url: required("directory-url")?,
        session_secret: SecretString::from(required("session-secret")?),
        base_url: required("base-url")?,
        frontend_url: required("frontend-url")?,
    })
}
