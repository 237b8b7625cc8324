//! resilient-sql library
//!
//! Runs templated SQL statements against PostgreSQL, MySQL or SQLite over a
//! single managed connection, retrying transient failures with reconnect and
//! returning rows as JSON maps.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod template;

pub use client::SqlClient;
pub use config::{Config, ExecutorConfig};
pub use error::{DriverError, DriverErrorKind, SqlError, SqlResult};
pub use models::{ResultSet, Row, Statement, StatementSource};
