use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::shared::ValidationError;

/// Session settings applied to every connection opened against the source database.
///
/// Pinning them keeps timestamp rendering and float precision independent of the server's
/// defaults.
pub struct DefaultPgConnectionOptions;

impl DefaultPgConnectionOptions {
    /// Returns the options as key-value pairs suitable for sqlx.
    pub fn to_key_value_pairs() -> Vec<(String, String)> {
        vec![
            ("datestyle".to_string(), "ISO".to_string()),
            ("timezone".to_string(), "UTC".to_string()),
            ("extra_float_digits".to_string(), "3".to_string()),
            ("client_encoding".to_string(), "UTF8".to_string()),
        ]
    }
}

/// Connection parameters of the Postgres database holding the `content` schema.
///
/// This intentionally does not implement `Serialize` so the password cannot leak through a
/// serialized form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Name of the database to connect to.
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_username")]
    pub username: String,
    /// Password for [`PgConnectionConfig::username`], redacted in debug output.
    #[serde(default)]
    pub password: Option<SecretString>,
    /// Whether the server certificate must be verified.
    #[serde(default)]
    pub require_tls: bool,
}

impl PgConnectionConfig {
    pub const DEFAULT_HOST: &'static str = "localhost";

    pub const DEFAULT_PORT: u16 = 5432;

    pub const DEFAULT_NAME: &'static str = "db_name";

    pub const DEFAULT_USERNAME: &'static str = "user";

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::EmptyField("source.host"));
        }

        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyField("source.name"));
        }

        Ok(())
    }
}

impl Default for PgConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            name: default_name(),
            username: default_username(),
            password: None,
            require_tls: false,
        }
    }
}

fn default_host() -> String {
    PgConnectionConfig::DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    PgConnectionConfig::DEFAULT_PORT
}

fn default_name() -> String {
    PgConnectionConfig::DEFAULT_NAME.to_string()
}

fn default_username() -> String {
    PgConnectionConfig::DEFAULT_USERNAME.to_string()
}

/// Converts a connection configuration into driver specific connect options.
pub trait IntoConnectOptions<Output> {
    /// Options for the server without selecting a database.
    fn without_db(&self) -> Output;

    /// Options for the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<PgConnectOptions> for PgConnectionConfig {
    fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_tls {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };
        let mut options = PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .username(&self.username)
            .port(self.port)
            .ssl_mode(ssl_mode)
            .options(DefaultPgConnectionOptions::to_key_value_pairs());

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }

    fn with_db(&self) -> PgConnectOptions {
        let options: PgConnectOptions = self.without_db();
        options.database(&self.name)
    }
}
