//! Caller-facing client.
//!
//! [`SqlClient`] ties the pieces together: it materializes a statement from
//! its source and substitutions, then hands it to the [`StatementExecutor`]
//! which drives the single managed connection.
//!
//! ```ignore
//! let client = SqlClient::connect_lazy("sqlite::memory:", ExecutorConfig::default())?;
//! let rows = client
//!     .scoped(|c| Box::pin(async move { c.execute("SELECT 1 AS x", &HashMap::new()).await }))
//!     .await?;
//! ```

use crate::config::ExecutorConfig;
use crate::db::{CloseOutcome, ConnectionManager, Driver, SqlxDriver, StatementExecutor};
use crate::error::{SqlError, SqlResult};
use crate::models::{ConnectionConfig, MetadataSnapshot, ResultSet, Statement, StatementSource};
use crate::template;
use encoding_rs::{Encoding, UTF_8};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct SqlClient<D: Driver> {
    manager: ConnectionManager<D>,
    executor: StatementExecutor,
    encoding: &'static Encoding,
}

impl<D: Driver> SqlClient<D> {
    /// Create a client. No connection is opened until the first statement runs.
    pub fn new(driver: D, config: ExecutorConfig) -> SqlResult<Self> {
        Ok(Self {
            manager: ConnectionManager::new(driver),
            executor: StatementExecutor::new(config)?,
            encoding: UTF_8,
        })
    }

    /// Read template files in `encoding` instead of UTF-8.
    pub fn with_template_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn template_encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn config(&self) -> &ExecutorConfig {
        self.executor.config()
    }

    pub fn driver(&self) -> &D {
        self.manager.driver()
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// Open the connection now instead of on first use.
    pub async fn connect(&mut self) -> SqlResult<()> {
        self.manager.ensure_connection().await
    }

    /// Run inline SQL or a template file with the configured attempt budget.
    pub async fn execute(
        &mut self,
        source: &str,
        substitutions: &HashMap<String, String>,
    ) -> SqlResult<ResultSet> {
        let max_attempts = self.executor.config().max_attempts;
        self.execute_with_attempts(source, substitutions, max_attempts)
            .await
    }

    pub async fn execute_with_attempts(
        &mut self,
        source: &str,
        substitutions: &HashMap<String, String>,
        max_attempts: u32,
    ) -> SqlResult<ResultSet> {
        let source = StatementSource::detect(source);
        self.execute_source(&source, substitutions, max_attempts)
            .await
    }

    /// Materialize `source` and execute it.
    ///
    /// Substitution and template errors are returned before any database work.
    pub async fn execute_source(
        &mut self,
        source: &StatementSource,
        substitutions: &HashMap<String, String>,
        max_attempts: u32,
    ) -> SqlResult<ResultSet> {
        let statement =
            template::materialize_with_encoding(source, substitutions, self.encoding).await?;
        self.executor
            .execute_with_attempts(&mut self.manager, &statement, max_attempts)
            .await
    }

    /// Execute an already materialized statement.
    pub async fn execute_statement(&mut self, statement: &Statement) -> SqlResult<ResultSet> {
        self.executor.execute(&mut self.manager, statement).await
    }

    /// Schema snapshot of the connected database, reflected once and cached.
    pub async fn metadata_snapshot(&mut self) -> SqlResult<Arc<MetadataSnapshot>> {
        self.manager.metadata_snapshot().await
    }

    /// Close the connection. Safe to call any number of times.
    pub async fn close(&mut self) -> CloseOutcome {
        self.manager.close_connection().await
    }

    /// Run `f` with the client, then close it whatever `f` returned.
    pub async fn scoped<T, F>(mut self, f: F) -> T
    where
        F: for<'a> FnOnce(&'a mut Self) -> BoxFuture<'a, T>,
    {
        let result = f(&mut self).await;
        let outcome = self.close().await;
        debug!(outcome = ?outcome, "Scoped client released");
        result
    }
}

impl SqlClient<SqlxDriver> {
    /// Client for the database at `url`, using the sqlx driver.
    pub fn connect_lazy(url: &str, config: ExecutorConfig) -> SqlResult<Self> {
        let connection =
            ConnectionConfig::new(url).map_err(|e| SqlError::invalid_input(e.to_string()))?;
        Self::from_config(connection, config)
    }

    pub fn from_config(connection: ConnectionConfig, config: ExecutorConfig) -> SqlResult<Self> {
        Self::new(SqlxDriver::new(connection), config)
    }
}

impl<D: Driver> std::fmt::Debug for SqlClient<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlClient")
            .field("manager", &self.manager)
            .field("executor", &self.executor)
            .field("encoding", &self.encoding.name())
            .finish()
    }
}
