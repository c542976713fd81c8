use config::shared::{IntoConnectOptions, PgConnectionConfig, TlsConfig};
use secrecy::SecretString;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use tracing::warn;
use uuid::Uuid;

/// A freshly created Postgres database, dropped with [`TestDatabase::cleanup`].
#[derive(Debug)]
pub struct TestDatabase {
    pub config: PgConnectionConfig,
    pub pool: PgPool,
}

/// Reads the connection settings of the local test server from:
/// - `TESTS_DATABASE_HOST`: server hostname (required)
/// - `TESTS_DATABASE_PORT`: server port (defaults to 5432)
/// - `TESTS_DATABASE_USERNAME`: database user (defaults to `postgres`)
/// - `TESTS_DATABASE_PASSWORD`: password (optional)
fn local_pg_connection_config() -> PgConnectionConfig {
    PgConnectionConfig {
        host: std::env::var("TESTS_DATABASE_HOST").expect("TESTS_DATABASE_HOST must be set"),
        port: std::env::var("TESTS_DATABASE_PORT")
            .ok()
            .map(|port| {
                port.parse()
                    .expect("TESTS_DATABASE_PORT must be a valid port number")
            })
            .unwrap_or(5432),
        name: Uuid::new_v4().to_string(),
        username: std::env::var("TESTS_DATABASE_USERNAME")
            .unwrap_or_else(|_| "postgres".to_string()),
        password: std::env::var("TESTS_DATABASE_PASSWORD")
            .ok()
            .map(SecretString::new),
        tls: TlsConfig::default(),
    }
}

/// Creates a uniquely named database on the local test server.
///
/// # Panics
///
/// Panics if `TESTS_DATABASE_HOST` is unset or the database cannot be created.
pub async fn spawn_database() -> TestDatabase {
    let config = local_pg_connection_config();

    let mut connection = PgConnection::connect_with(&config.without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"create database "{}";"#, config.name))
        .await
        .expect("Failed to create database");

    let pool = PgPool::connect_with(config.with_db())
        .await
        .expect("Failed to connect to the test database");

    TestDatabase { config, pool }
}

impl TestDatabase {
    /// Runs `sql` (one or more statements) against the database.
    pub async fn execute(&self, sql: &str) {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .expect("Failed to execute test statement");
    }

    /// Closes the pool and drops the database, logging instead of failing.
    pub async fn cleanup(self) {
        self.pool.close().await;

        let mut connection = match PgConnection::connect_with(&self.config.without_db()).await {
            Ok(connection) => connection,
            Err(err) => {
                warn!(error = %err, "failed to connect to Postgres for cleanup");
                return;
            }
        };

        if let Err(err) = connection
            .execute(&*format!(
                r#"drop database if exists "{}" with (force);"#,
                self.config.name
            ))
            .await
        {
            warn!(database = %self.config.name, error = %err, "failed to drop test database");
        }
    }
}
