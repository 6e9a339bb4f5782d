// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! MySQL engine over `sqlx`.
//!
//! Every operation opens a single-connection pool to the target server and
//! closes it afterwards. Statements run one at a time.

use async_trait::async_trait;
use sqlx::Connection;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlPoolOptions};
use tracing::{debug, info};

use super::traits::*;
use crate::naming::{generate_password, generate_user};

/// MySQL error number for "database exists".
const ER_DB_CREATE_EXISTS: u16 = 1007;

/// Engine for one database on one MySQL server.
pub struct MySqlEngine {
    database: String,
    target: ServerTarget,
    salt: String,
}

impl MySqlEngine {
    /// Create an engine. `database` must already be canonical.
    pub fn new(database: impl Into<String>, target: ServerTarget, salt: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            target,
            salt: salt.into(),
        }
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.target.host)
            .port(self.target.port)
            .username(&self.target.user)
            .password(&self.target.password)
    }

    /// Run `statements` in order on one connection, stopping at the first error.
    async fn execute(&self, statements: &[String]) -> Result<()> {
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect_with(self.connect_options())
            .await?;

        let mut result = Ok(());
        for sql in statements {
            if let Err(e) = sqlx::query(sql.as_str()).execute(&pool).await {
                result = Err(e);
                break;
            }
        }
        // Close even when a statement failed
        pool.close().await;
        result?;
        Ok(())
    }
}

/// Backtick-quote an identifier.
fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Single-quote a string literal.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

fn is_database_exists(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .try_downcast_ref::<MySqlDatabaseError>()
            .is_some_and(|e| e.number() == ER_DB_CREATE_EXISTS),
        _ => false,
    }
}

fn create_database_sql(database: &str) -> String {
    format!(
        "CREATE DATABASE {} DEFAULT CHARACTER SET utf8 DEFAULT COLLATE utf8_general_ci",
        quote_ident(database)
    )
}

fn create_user_sql(database: &str, user: &str, host: &str, password: &str) -> Vec<String> {
    let account = format!("{}@{}", quote_literal(user), quote_literal(host));
    vec![
        format!(
            "CREATE USER IF NOT EXISTS {account} IDENTIFIED BY {}",
            quote_literal(password)
        ),
        format!(
            "GRANT ALL PRIVILEGES ON {}.* TO {account}",
            quote_ident(database)
        ),
    ]
}

#[async_trait]
impl DatabaseEngine for MySqlEngine {
    fn database(&self) -> &str {
        &self.database
    }

    async fn create_database(&self) -> Result<()> {
        match self.execute(&[create_database_sql(&self.database)]).await {
            Err(EngineError::Sql(e)) if is_database_exists(&e) => {
                Err(EngineError::DatabaseExists(self.database.clone()))
            }
            Err(e) => Err(e),
            Ok(()) => {
                info!(database = %self.database, host = %self.target.host, "Database created");
                Ok(())
            }
        }
    }

    async fn drop_database(&self) -> Result<()> {
        self.execute(&[format!("DROP DATABASE {}", quote_ident(&self.database))])
            .await?;
        info!(database = %self.database, host = %self.target.host, "Database dropped");
        Ok(())
    }

    async fn create_user(&self, name: &str, host: Option<&str>) -> Result<(String, String)> {
        let user = generate_user(name, &self.salt);
        let password = generate_password(&user, &self.salt);
        let host = host.unwrap_or(ANY_HOST);

        self.execute(&create_user_sql(&self.database, &user, host, &password))
            .await?;
        debug!(database = %self.database, user = %user, client_host = %host, "User created");
        Ok((user, password))
    }

    async fn drop_user(&self, name: &str, host: Option<&str>) -> Result<()> {
        let user = generate_user(name, &self.salt);
        let host = host.unwrap_or(ANY_HOST);

        self.execute(&[format!(
            "DROP USER {}@{}",
            quote_literal(&user),
            quote_literal(host)
        )])
        .await?;
        debug!(database = %self.database, user = %user, client_host = %host, "User dropped");
        Ok(())
    }

    async fn is_up(&self) -> bool {
        match MySqlConnection::connect_with(&self.connect_options()).await {
            Ok(mut conn) => {
                let up = conn.ping().await.is_ok();
                let _ = conn.close().await;
                up
            }
            Err(e) => {
                debug!(host = %self.target.host, error = %e, "Server unreachable");
                false
            }
        }
    }
}

/// Builds [`MySqlEngine`]s sharing one password salt.
#[derive(Debug, Clone, Default)]
pub struct MySqlEngineFactory {
    salt: String,
}

impl MySqlEngineFactory {
    /// Create a factory using `salt` for generated passwords.
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }
}

impl EngineFactory for MySqlEngineFactory {
    fn engine(&self, database: &str, target: &ServerTarget) -> Box<dyn DatabaseEngine> {
        Box::new(MySqlEngine::new(database, target.clone(), self.salt.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_database_sql() {
        assert_eq!(
            create_database_sql("ciclops"),
            "CREATE DATABASE `ciclops` DEFAULT CHARACTER SET utf8 DEFAULT COLLATE utf8_general_ci"
        );
    }

    #[test]
    fn test_create_user_sql_grants_on_database() {
        let sql = create_user_sql("ciclops", "ciclops", "192.168.1.1", "abc123");
        assert_eq!(
            sql,
            vec![
                "CREATE USER IF NOT EXISTS 'ciclops'@'192.168.1.1' IDENTIFIED BY 'abc123'",
                "GRANT ALL PRIVILEGES ON `ciclops`.* TO 'ciclops'@'192.168.1.1'",
            ]
        );
    }

    #[test]
    fn test_quoting_escapes_delimiters() {
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
        assert_eq!(quote_literal("o'neil"), "'o''neil'");
        assert_eq!(quote_literal("a\\b"), "'a\\\\b'");
    }

    #[test]
    fn test_non_database_errors_are_not_exists() {
        assert!(!is_database_exists(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn test_factory_binds_database_name() {
        let factory = MySqlEngineFactory::new("salt");
        let engine = factory.engine(
            "ciclops",
            &ServerTarget::new("localhost", 3306, "root", ""),
        );
        assert_eq!(engine.database(), "ciclops");
    }

    #[tokio::test]
    async fn test_is_up_false_for_unreachable_server() {
        // Port 1 on localhost is never a MySQL server.
        let engine = MySqlEngine::new(
            "ciclops",
            ServerTarget::new("127.0.0.1", 1, "root", ""),
            "",
        );
        assert!(!engine.is_up().await);
    }
}
