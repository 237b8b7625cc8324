//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - The driver port and its sqlx implementation
//! - Single-connection lifecycle management
//! - Statement execution with retry and reconnect
//! - Result normalization and type mappings
//! - Schema reflection

pub mod connection;
pub mod driver;
pub mod executor;
pub mod normalize;
pub mod schema;
pub mod sqlx_driver;
pub mod types;

pub use crate::models::DatabaseType;
pub use connection::{CloseOutcome, ConnectionManager};
pub use driver::{Driver, NoResultSet};
pub use executor::StatementExecutor;
pub use normalize::normalize;
pub use sqlx_driver::{DbConnection, DbCursor, DbPool, SqlxDriver};
