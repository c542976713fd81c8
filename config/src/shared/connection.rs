use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::shared::ValidationError;

/// Session settings applied to every Postgres connection.
///
/// Pins the text rendering of dates and floats so decoded values do not depend on server defaults.
pub struct DefaultPgConnectionOptions;

impl DefaultPgConnectionOptions {
    /// Returns the options as key-value pairs suitable for sqlx.
    pub fn to_key_value_pairs() -> Vec<(String, String)> {
        vec![
            ("datestyle".to_string(), "ISO".to_string()),
            ("intervalstyle".to_string(), "postgres".to_string()),
            ("extra_float_digits".to_string(), "3".to_string()),
            ("client_encoding".to_string(), "UTF8".to_string()),
        ]
    }
}

/// Connection parameters of a Postgres database.
///
/// Used for the warehouse holding the target, staging and changelog tables, and for a Postgres
/// source.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Database name.
    pub name: String,
    pub username: String,
    /// Redacted in debug output.
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default)]
    pub tls: TlsConfig,
}

impl PgConnectionConfig {
    pub fn validate(&self, field: &str) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::invalid(
                &format!("{field}.host"),
                "must not be empty",
            ));
        }

        if self.name.trim().is_empty() {
            return Err(ValidationError::invalid(
                &format!("{field}.name"),
                "must not be empty",
            ));
        }

        self.tls.validate()
    }
}

/// Connection parameters of a MySQL source database.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MySqlConnectionConfig {
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: u16,
    /// Database name.
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default)]
    pub tls: TlsConfig,
}

impl MySqlConnectionConfig {
    pub const DEFAULT_PORT: u16 = 3306;

    pub fn validate(&self, field: &str) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::invalid(
                &format!("{field}.host"),
                "must not be empty",
            ));
        }

        if self.name.trim().is_empty() {
            return Err(ValidationError::invalid(
                &format!("{field}.name"),
                "must not be empty",
            ));
        }

        self.tls.validate()
    }
}

fn default_mysql_port() -> u16 {
    MySqlConnectionConfig::DEFAULT_PORT
}

/// TLS settings for database connections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    #[serde(default)]
    pub trusted_root_certs: String,
    #[serde(default)]
    pub enabled: bool,
}

impl TlsConfig {
    /// Returns [`ValidationError::MissingTrustedRootCerts`] if TLS is enabled but no
    /// certificates are provided.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

/// Converts a [`PgConnectionConfig`] into driver specific connect options.
pub trait IntoConnectOptions<Output> {
    /// Options for the server without selecting a database.
    fn without_db(&self) -> Output;

    /// Options for the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<PgConnectOptions> for PgConnectionConfig {
    fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.tls.enabled {
            PgSslMode::VerifyFull
        } else {
            PgSslMode::Prefer
        };
        let mut options = PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .username(&self.username)
            .port(self.port)
            .ssl_mode(ssl_mode)
            .options(DefaultPgConnectionOptions::to_key_value_pairs());

        if self.tls.enabled {
            options = options.ssl_root_cert_from_pem(self.tls.trusted_root_certs.clone().into_bytes());
        }

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

impl IntoConnectOptions<MySqlConnectOptions> for MySqlConnectionConfig {
    fn without_db(&self) -> MySqlConnectOptions {
        let ssl_mode = if self.tls.enabled {
            MySqlSslMode::VerifyIdentity
        } else {
            MySqlSslMode::Preferred
        };
        let mut options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .ssl_mode(ssl_mode)
            .charset("utf8mb4")
            .timezone(Some("+00:00".to_string()));

        if self.tls.enabled {
            options = options.ssl_ca_from_pem(self.tls.trusted_root_certs.clone().into_bytes());
        }

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }

    fn with_db(&self) -> MySqlConnectOptions {
        let options: MySqlConnectOptions = self.without_db();
        options.database(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(tls: TlsConfig) -> PgConnectionConfig {
        PgConnectionConfig {
            host: "localhost".to_string(),
            port: 5432,
            name: "warehouse".to_string(),
            username: "postgres".to_string(),
            password: Some(SecretString::new("secret".to_string())),
            tls,
        }
    }

    #[test]
    fn key_value_pairs_pin_session_settings() {
        let pairs = DefaultPgConnectionOptions::to_key_value_pairs();

        assert_eq!(pairs.len(), 4);
        assert!(pairs.contains(&("datestyle".to_string(), "ISO".to_string())));
        assert!(pairs.contains(&("extra_float_digits".to_string(), "3".to_string())));
    }

    #[test]
    fn tls_without_roots_is_rejected() {
        let config = connection(TlsConfig {
            trusted_root_certs: String::new(),
            enabled: true,
        });

        assert_eq!(
            config.validate("warehouse"),
            Err(ValidationError::MissingTrustedRootCerts)
        );
    }

    #[test]
    fn with_db_selects_database() {
        let options: PgConnectOptions = connection(TlsConfig::default()).with_db();

        assert_eq!(options.get_database(), Some("warehouse"));
        assert_eq!(options.get_host(), "localhost");
        assert_eq!(options.get_port(), 5432);
    }

    #[test]
    fn mysql_port_defaults_when_omitted() {
        let config: MySqlConnectionConfig = serde_json::from_str(
            r#"{ "host": "source", "name": "testdb", "username": "reader" }"#,
        )
        .unwrap();

        assert_eq!(config.port, MySqlConnectionConfig::DEFAULT_PORT);
        assert!(config.validate("source.connection.mysql").is_ok());
    }

    #[test]
    fn mysql_without_database_name_is_rejected() {
        let config: MySqlConnectionConfig = serde_json::from_str(
            r#"{ "host": "source", "name": " ", "username": "reader" }"#,
        )
        .unwrap();

        assert!(matches!(
            config.validate("source.connection.mysql"),
            Err(ValidationError::InvalidFieldValue { ref field, .. })
                if field == "source.connection.mysql.name"
        ));
    }

    #[test]
    fn password_is_redacted_in_debug_output() {
        let rendered = format!("{:?}", connection(TlsConfig::default()));

        assert!(!rendered.contains("secret\""));
    }
}
