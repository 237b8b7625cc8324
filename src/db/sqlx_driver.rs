//! sqlx-backed [`Driver`] for PostgreSQL, MySQL and SQLite.
//!
//! Database-specific pools (MySqlPool, PgPool, SqlitePool) are used instead of
//! `AnyPool` to keep full type support. The pool is the engine: it is created
//! lazily on the first `open`, holds at most one connection, and is torn down
//! again by `dispose`, so the next `open` starts from a fresh engine.

use crate::db::driver::{Driver, NoResultSet};
use crate::db::schema;
use crate::db::types::RowToJson;
use crate::error::{DriverError, classify_sqlx_error};
use crate::models::{ConnectionConfig, DatabaseType, MetadataSnapshot, Row};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, MySql, MySqlPool, PgPool, Postgres, Sqlite, SqlitePool};
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }
}

/// A connection checked out of a [`DbPool`].
pub enum DbConnection {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

impl DbConnection {
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbConnection::MySql(_) => DatabaseType::MySQL,
            DbConnection::Postgres(_) => DatabaseType::PostgreSQL,
            DbConnection::SQLite(_) => DatabaseType::SQLite,
        }
    }
}

/// Rows returned by one executed statement.
pub enum DbCursor {
    MySql(Vec<MySqlRow>),
    Postgres(Vec<PgRow>),
    SQLite(Vec<SqliteRow>),
}

impl DbCursor {
    pub fn is_empty(&self) -> bool {
        match self {
            DbCursor::MySql(rows) => rows.is_empty(),
            DbCursor::Postgres(rows) => rows.is_empty(),
            DbCursor::SQLite(rows) => rows.is_empty(),
        }
    }
}

#[derive(Debug)]
pub struct SqlxDriver {
    config: ConnectionConfig,
    pool: Mutex<Option<DbPool>>,
}

impl SqlxDriver {
    /// Create a driver; nothing is connected until the first `open`.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            pool: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn db_type(&self) -> DatabaseType {
        self.config.db_type
    }

    /// The current pool, created on first use.
    async fn pool(&self) -> Result<DbPool, DriverError> {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }

        info!(
            db_type = %self.config.db_type,
            url = %self.config.masked_connection_string(),
            "Creating database engine"
        );
        let pool = create_pool(&self.config).await?;
        *guard = Some(pool.clone());
        Ok(pool)
    }

    async fn control(&self, conn: &mut DbConnection, sql: &str) -> Result<(), DriverError> {
        let db_type = conn.db_type();
        let result = match conn {
            DbConnection::MySql(c) => (&mut **c).execute(sql).await.map(|_| ()),
            DbConnection::Postgres(c) => (&mut **c).execute(sql).await.map(|_| ()),
            DbConnection::SQLite(c) => (&mut **c).execute(sql).await.map(|_| ()),
        };
        result.map_err(|e| classify_sqlx_error(e, db_type))
    }
}

#[async_trait]
impl Driver for SqlxDriver {
    type Connection = DbConnection;
    type Cursor = DbCursor;

    async fn open(&self) -> Result<DbConnection, DriverError> {
        let pool = self.pool().await?;
        let conn = match &pool {
            DbPool::MySql(p) => p.acquire().await.map(DbConnection::MySql),
            DbPool::Postgres(p) => p.acquire().await.map(DbConnection::Postgres),
            DbPool::SQLite(p) => p.acquire().await.map(DbConnection::SQLite),
        };
        conn.map_err(|e| DriverError::connection(format!("Failed to acquire connection: {}", e)))
    }

    async fn execute(&self, conn: &mut DbConnection, sql: &str) -> Result<DbCursor, DriverError> {
        let db_type = conn.db_type();
        let result = match conn {
            DbConnection::MySql(c) => (&mut **c).fetch_all(sql).await.map(DbCursor::MySql),
            DbConnection::Postgres(c) => (&mut **c).fetch_all(sql).await.map(DbCursor::Postgres),
            DbConnection::SQLite(c) => (&mut **c).fetch_all(sql).await.map(DbCursor::SQLite),
        };
        result.map_err(|e| classify_sqlx_error(e, db_type))
    }

    fn fetch_rows(&self, cursor: DbCursor) -> Result<Vec<Row>, NoResultSet> {
        // sqlx does not distinguish "no result set" from "zero rows"
        if cursor.is_empty() {
            return Err(NoResultSet);
        }
        Ok(match cursor {
            DbCursor::MySql(rows) => rows.iter().map(RowToJson::to_json_map).collect(),
            DbCursor::Postgres(rows) => rows.iter().map(RowToJson::to_json_map).collect(),
            DbCursor::SQLite(rows) => rows.iter().map(RowToJson::to_json_map).collect(),
        })
    }

    async fn begin(&self, conn: &mut DbConnection) -> Result<(), DriverError> {
        self.control(conn, "BEGIN").await
    }

    async fn commit(&self, conn: &mut DbConnection) -> Result<(), DriverError> {
        self.control(conn, "COMMIT").await
    }

    async fn rollback(&self, conn: &mut DbConnection) -> Result<(), DriverError> {
        self.control(conn, "ROLLBACK").await
    }

    async fn close(&self, conn: DbConnection) -> Result<(), DriverError> {
        let db_type = conn.db_type();
        let result = match conn {
            DbConnection::MySql(c) => c.close().await,
            DbConnection::Postgres(c) => c.close().await,
            DbConnection::SQLite(c) => c.close().await,
        };
        result.map_err(|e| classify_sqlx_error(e, db_type))
    }

    async fn dispose(&self) -> Result<(), DriverError> {
        let pool = self.pool.lock().await.take();
        if let Some(pool) = pool {
            debug!(db_type = %pool.db_type(), "Disposing database engine");
            pool.close().await;
        }
        Ok(())
    }

    async fn reflect(&self, conn: &mut DbConnection) -> Result<MetadataSnapshot, DriverError> {
        schema::reflect(conn).await
    }
}

/// Create the single-connection pool for the given configuration.
async fn create_pool(config: &ConnectionConfig) -> Result<DbPool, DriverError> {
    let acquire_timeout = config.acquire_timeout();

    match config.db_type {
        DatabaseType::MySQL => {
            let url = config.connection_string.replacen("mariadb://", "mysql://", 1);
            let options = MySqlConnectOptions::from_str(&url)
                .map_err(|e| {
                    DriverError::connection(format!("Invalid MySQL connection string: {}", e))
                })?
                .charset("utf8mb4");

            let pool = MySqlPoolOptions::new()
                .min_connections(0)
                .max_connections(1)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
                .map_err(connect_error)?;
            Ok(DbPool::MySql(pool))
        }
        DatabaseType::PostgreSQL => {
            let pool = PgPoolOptions::new()
                .min_connections(0)
                .max_connections(1)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(&config.connection_string)
                .await
                .map_err(connect_error)?;
            Ok(DbPool::Postgres(pool))
        }
        DatabaseType::SQLite => {
            let options = SqliteConnectOptions::from_str(&config.connection_string)
                .map_err(|e| {
                    DriverError::connection(format!("Invalid SQLite connection string: {}", e))
                })?
                .create_if_missing(true);

            // in-memory databases live exactly as long as their one connection
            let pool = SqlitePoolOptions::new()
                .min_connections(0)
                .max_connections(1)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
                .map_err(connect_error)?;
            Ok(DbPool::SQLite(pool))
        }
    }
}

fn connect_error(e: sqlx::Error) -> DriverError {
    DriverError::connection(format!("Failed to connect: {}", e))
}
