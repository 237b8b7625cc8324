//! Statement execution engine.
//!
//! Runs one materialized statement against the managed connection with
//! bounded retries:
//! - Programming-class failures abort immediately, with no reconnect
//! - Transient and connection-class failures tear the connection down, wait
//!   the configured backoff and reconnect before the next attempt
//! - Each attempt optionally runs inside an explicit transaction and under
//!   a time limit
//!
//! Every execution gets an `exec_` id that is attached to all of its log lines.

use crate::config::ExecutorConfig;
use crate::db::connection::ConnectionManager;
use crate::db::driver::Driver;
use crate::db::normalize::normalize;
use crate::error::{DriverError, DriverErrorKind, SqlError, SqlResult};
use crate::models::{ResultSet, Statement};
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Why a single attempt did not produce rows.
#[derive(Debug)]
enum AttemptFailure {
    /// The statement is broken; retrying cannot help.
    Fatal(DriverError),
    /// The database or the link to it failed; retry after reconnecting.
    Retryable(DriverError),
}

impl From<DriverError> for AttemptFailure {
    fn from(err: DriverError) -> Self {
        match err.kind {
            DriverErrorKind::Programming => Self::Fatal(err),
            DriverErrorKind::Transient | DriverErrorKind::Connection => Self::Retryable(err),
        }
    }
}

/// Executes statements with retry, reconnect and transaction handling.
#[derive(Debug, Clone)]
pub struct StatementExecutor {
    config: ExecutorConfig,
}

impl StatementExecutor {
    /// Create an executor after validating its configuration.
    pub fn new(config: ExecutorConfig) -> SqlResult<Self> {
        config.validate().map_err(SqlError::invalid_input)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute with the configured attempt budget.
    pub async fn execute<D: Driver>(
        &self,
        manager: &mut ConnectionManager<D>,
        statement: &Statement,
    ) -> SqlResult<ResultSet> {
        self.execute_with_attempts(manager, statement, self.config.max_attempts)
            .await
    }

    /// Execute with an explicit attempt budget.
    ///
    /// The initial connection is opened before the first attempt; if that
    /// fails the error is returned as is and no attempt is counted.
    pub async fn execute_with_attempts<D: Driver>(
        &self,
        manager: &mut ConnectionManager<D>,
        statement: &Statement,
        max_attempts: u32,
    ) -> SqlResult<ResultSet> {
        if max_attempts == 0 {
            return Err(SqlError::invalid_input("max_attempts must be at least 1"));
        }

        let execution_id = new_execution_id();
        let start = Instant::now();
        debug!(
            execution_id = %execution_id,
            sql = %statement,
            max_attempts,
            auto_commit = self.config.auto_commit,
            "Executing statement"
        );

        manager.ensure_connection().await?;

        let mut last_error: Option<DriverError> = None;
        let mut reconnect_failure: Option<DriverError> = None;
        for attempt in 1..=max_attempts {
            // a failed reconnect is charged to the next attempt without reopening
            let outcome = match reconnect_failure.take() {
                Some(err) => Err(AttemptFailure::Retryable(err)),
                None => self.attempt(manager, statement).await,
            };
            match outcome {
                Ok(rows) => {
                    info!(
                        execution_id = %execution_id,
                        attempt,
                        rows = rows.len(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Statement succeeded"
                    );
                    return Ok(rows);
                }
                Err(AttemptFailure::Fatal(err)) => {
                    warn!(
                        execution_id = %execution_id,
                        attempt,
                        error = %err,
                        sql_state = ?err.sql_state,
                        "Statement failed with a non-retryable error"
                    );
                    return Err(SqlError::fatal_statement(err));
                }
                Err(AttemptFailure::Retryable(err)) => {
                    warn!(
                        execution_id = %execution_id,
                        attempt,
                        max_attempts,
                        error = %err,
                        "Attempt failed, reconnecting"
                    );
                    last_error = Some(err);
                    reconnect_failure = self
                        .recover(manager, &execution_id, attempt < max_attempts)
                        .await;
                }
            }
        }

        let last_error =
            last_error.unwrap_or_else(|| DriverError::transient("no attempt was made"));
        error!(
            execution_id = %execution_id,
            attempts = max_attempts,
            error = %last_error,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Retries exhausted"
        );

        match last_error.kind {
            DriverErrorKind::Connection => Err(SqlError::from_connection_failure(&last_error)),
            _ => Err(SqlError::RetriesExhausted {
                attempts: max_attempts,
                last_error,
            }),
        }
    }

    /// One attempt: optional BEGIN, execute, normalize, optional COMMIT.
    /// Any failure after BEGIN rolls the transaction back.
    async fn attempt<D: Driver>(
        &self,
        manager: &mut ConnectionManager<D>,
        statement: &Statement,
    ) -> Result<ResultSet, AttemptFailure> {
        let (driver, conn) = manager
            .session()
            .await
            .map_err(|e| AttemptFailure::Retryable(connection_lost(e)))?;

        let explicit = !self.config.auto_commit;
        if explicit {
            driver.begin(conn).await?;
        }

        let failure = match self.run(driver, conn, statement.as_str()).await {
            Ok(cursor) => {
                let rows = normalize(driver, cursor);
                if !explicit {
                    return Ok(rows);
                }
                match driver.commit(conn).await {
                    Ok(()) => return Ok(rows),
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        if explicit {
            rollback_quietly(driver, conn).await;
        }
        Err(failure.into())
    }

    async fn run<D: Driver>(
        &self,
        driver: &D,
        conn: &mut D::Connection,
        sql: &str,
    ) -> Result<D::Cursor, DriverError> {
        match self.config.attempt_timeout {
            Some(limit) => timeout(limit, driver.execute(conn, sql))
                .await
                .unwrap_or_else(|_| Err(timeout_error(limit))),
            None => driver.execute(conn, sql).await,
        }
    }

    /// Tear down the connection, wait, and reconnect. This is the only place
    /// a connection is reopened between attempts; a failed reconnect is
    /// returned so the next attempt can report it.
    async fn recover<D: Driver>(
        &self,
        manager: &mut ConnectionManager<D>,
        execution_id: &str,
        wait: bool,
    ) -> Option<DriverError> {
        let outcome = manager.close_connection().await;
        debug!(execution_id = %execution_id, outcome = ?outcome, "Connection torn down");

        if wait && !self.config.backoff.is_zero() {
            info!(
                execution_id = %execution_id,
                backoff_ms = self.config.backoff.as_millis() as u64,
                "Waiting before reconnecting"
            );
            sleep(self.config.backoff).await;
        }

        match manager.ensure_connection().await {
            Ok(()) => None,
            Err(e) => {
                warn!(execution_id = %execution_id, error = %e, "Reconnect failed");
                Some(connection_lost(e))
            }
        }
    }
}

fn connection_lost(err: SqlError) -> DriverError {
    match err {
        SqlError::Connection { message, .. } => DriverError::connection(message),
        other => DriverError::connection(other.to_string()),
    }
}

async fn rollback_quietly<D: Driver>(driver: &D, conn: &mut D::Connection) {
    if let Err(e) = driver.rollback(conn).await {
        warn!(error = %e, "Rollback failed (ignored)");
    }
}

fn timeout_error(limit: Duration) -> DriverError {
    DriverError::transient(format!(
        "Statement exceeded the attempt timeout of {}ms",
        limit.as_millis()
    ))
}

fn new_execution_id() -> String {
    format!("exec_{}", Uuid::new_v4().simple())
}
