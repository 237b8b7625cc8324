//! Result normalization.

use crate::db::driver::{Driver, NoResultSet};
use crate::models::ResultSet;
use tracing::debug;

/// Turn a driver cursor into rows. A statement without a fetchable result
/// (DDL, DML without `RETURNING`) yields an empty result, not an error.
pub fn normalize<D: Driver + ?Sized>(driver: &D, cursor: D::Cursor) -> ResultSet {
    match driver.fetch_rows(cursor) {
        Ok(rows) => rows,
        Err(NoResultSet) => {
            debug!("Statement produced no result set");
            Vec::new()
        }
    }
}
