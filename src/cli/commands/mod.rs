use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("gardisto")
        .about("Admin dashboard access control")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("GARDISTO_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("identity-url")
                .long("identity-url")
                .help("Identity provider base URL, example: https://identity.tld")
                .env("GARDISTO_IDENTITY_URL")
                .required(true),
        )
        .arg(
            Arg::new("directory-url")
                .long("directory-url")
                .help("Admin directory base URL, example: https://directory.tld")
                .env("GARDISTO_DIRECTORY_URL")
                .required(true),
        )
        .arg(
            Arg::new("session-secret")
                .long("session-secret")
                .help("Secret used to sign session and challenge tokens")
                .env("GARDISTO_SESSION_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .help("Public base URL of this service; HTTPS enables Secure cookies")
                .default_value("http://localhost:8080")
                .env("GARDISTO_BASE_URL"),
        )
        .arg(
            Arg::new("frontend-url")
                .long("frontend-url")
                .help("Dashboard origin allowed by CORS")
                .default_value("http://localhost:3000")
                .env("GARDISTO_FRONTEND_URL"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("GARDISTO_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "gardisto");
        assert_eq!(
            command.get_about().unwrap().to_string(),
            "Admin dashboard access control"
        );
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_check_required_args() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "gardisto",
            "--port",
            "8080",
            "--identity-url",
            "https://identity.tld",
            "--directory-url",
            "https://directory.tld",
            "--session-secret",
            "secret",
        ]);

        assert_eq!(matches.get_one::<u16>("port").map(|s| *s), Some(8080));
        assert_eq!(
            matches
                .get_one::<String>("identity-url")
                .map(|s| s.to_string()),
            Some("https://identity.tld".to_string())
        );
        assert_eq!(
            matches
                .get_one::<String>("directory-url")
                .map(|s| s.to_string()),
            Some("https://directory.tld".to_string())
        );
        assert_eq!(
            matches
                .get_one::<String>("session-secret")
                .map(|s| s.to_string()),
            Some("secret".to_string())
        );
        assert_eq!(
            matches.get_one::<String>("base-url").map(|s| s.to_string()),
            Some("http://localhost:8080".to_string())
        );
        assert_eq!(
            matches
                .get_one::<String>("frontend-url")
                .map(|s| s.to_string()),
            Some("http://localhost:3000".to_string())
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("GARDISTO_IDENTITY_URL", Some("https://identity.tld")),
                ("GARDISTO_DIRECTORY_URL", Some("https://directory.tld")),
                ("GARDISTO_SESSION_SECRET", Some("secret")),
                ("GARDISTO_PORT", Some("443")),
                ("GARDISTO_BASE_URL", Some("https://admin.example.com")),
                ("GARDISTO_LOG_LEVEL", Some("info")),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["gardisto"]);
                assert_eq!(matches.get_one::<u16>("port").map(|s| *s), Some(443));
                assert_eq!(
                    matches
                        .get_one::<String>("identity-url")
                        .map(|s| s.to_string()),
                    Some("https://identity.tld".to_string())
                );
                assert_eq!(
                    matches.get_one::<String>("base-url").map(|s| s.to_string()),
                    Some("https://admin.example.com".to_string())
                );
                assert_eq!(matches.get_one::<u8>("verbosity").map(|s| *s), Some(2));
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars(
                [
                    ("GARDISTO_LOG_LEVEL", Some(level)),
                    ("GARDISTO_IDENTITY_URL", Some("https://identity.tld")),
                    ("GARDISTO_DIRECTORY_URL", Some("https://directory.tld")),
                    ("GARDISTO_SESSION_SECRET", Some("secret")),
                ],
                || {
                    let command = new();
                    let matches = command.get_matches_from(vec!["gardisto"]);
                    assert_eq!(
                        matches.get_one::<u8>("verbosity").map(|s| *s),
                        Some(index as u8)
                    );
                },
            );
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        // loop cover all possible value_parse
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("GARDISTO_LOG_LEVEL", None::<String>)], || {
                let mut args = vec![
                    "gardisto".to_string(),
                    "--identity-url".to_string(),
                    "https://identity.tld".to_string(),
                    "--directory-url".to_string(),
                    "https://directory.tld".to_string(),
                    "--session-secret".to_string(),
                    "secret".to_string(),
                ];

                // Add the appropriate number of "-v" flags based on the index
                if index > 0 {
                    let v = format!("-{}", "v".repeat(index));
                    args.push(v);
                }

                let command = new();

                let matches = command.get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>("verbosity").map(|s| *s),
                    Some(index as u8)
                );
            });
        }
    }
}
