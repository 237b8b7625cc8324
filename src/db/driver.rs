//! Driver port: the capabilities the core needs from a database engine.
//!
//! Drivers are responsible for:
//! - Opening and closing the single managed connection
//! - Running statement text and handing back a cursor
//! - Turning a cursor into rows
//! - Transaction control on a connection
//! - Classifying every failure into a [`DriverErrorKind`](crate::error::DriverErrorKind)

use crate::error::DriverError;
use crate::models::{MetadataSnapshot, Row};
use async_trait::async_trait;

/// The executed statement produced nothing that can be fetched (DDL, plain DML).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoResultSet;

#[async_trait]
pub trait Driver: Send + Sync {
    /// A live session with the database.
    type Connection: Send;
    /// The raw outcome of one `execute` call, consumed by `fetch_rows`.
    type Cursor: Send;

    /// Open a new connection.
    async fn open(&self) -> Result<Self::Connection, DriverError>;

    /// Run a statement on the connection.
    async fn execute(
        &self,
        conn: &mut Self::Connection,
        sql: &str,
    ) -> Result<Self::Cursor, DriverError>;

    /// Materialize a cursor into rows.
    fn fetch_rows(&self, cursor: Self::Cursor) -> Result<Vec<Row>, NoResultSet>;

    async fn begin(&self, conn: &mut Self::Connection) -> Result<(), DriverError>;

    async fn commit(&self, conn: &mut Self::Connection) -> Result<(), DriverError>;

    async fn rollback(&self, conn: &mut Self::Connection) -> Result<(), DriverError>;

    /// Close a connection.
    async fn close(&self, conn: Self::Connection) -> Result<(), DriverError>;

    /// Release engine-level resources held beyond the connection itself.
    async fn dispose(&self) -> Result<(), DriverError>;

    /// Reflect the current schema through the connection.
    async fn reflect(&self, conn: &mut Self::Connection) -> Result<MetadataSnapshot, DriverError>;
}
