pub mod server;

use secrecy::SecretString;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        identity_url: String,
        directory_url: String,
        session_secret: SecretString,
        base_url: String,
        frontend_url: String,
    },
}
