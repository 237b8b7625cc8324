//! Connection lifecycle management.
//!
//! The [`ConnectionManager`] owns at most one live connection to a [`Driver`].
//! Connections are opened lazily and torn down explicitly; closing never fails,
//! it reports what went wrong through [`CloseOutcome`] instead.

use crate::db::driver::Driver;
use crate::error::{DriverError, DriverErrorKind, SqlError, SqlResult};
use crate::models::MetadataSnapshot;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of [`ConnectionManager::close_connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// There was no live connection; nothing was done.
    NotConnected,
    /// The connection was closed and engine resources released cleanly.
    Closed,
    /// The connection state was cleared, but closing or disposing failed.
    /// These errors were logged and are not propagated.
    Suppressed(Vec<DriverError>),
}

impl CloseOutcome {
    /// Whether a live connection existed before the call.
    pub fn was_connected(&self) -> bool {
        !matches!(self, Self::NotConnected)
    }
}

pub struct ConnectionManager<D: Driver> {
    driver: D,
    connection: Option<D::Connection>,
    metadata: Option<Arc<MetadataSnapshot>>,
}

impl<D: Driver> ConnectionManager<D> {
    /// Create a manager; no connection is opened until first use.
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            connection: None,
            metadata: None,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Open a connection if there is none. No-op when already connected.
    pub async fn ensure_connection(&mut self) -> SqlResult<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        debug!("Opening database connection");
        let conn = self.driver.open().await.map_err(|e| {
            warn!(error = %e, "Failed to open database connection");
            SqlError::from_connection_failure(&e)
        })?;
        self.connection = Some(conn);
        info!("Database connection established");
        Ok(())
    }

    /// Ensure a connection and lend it together with the driver.
    pub async fn session(&mut self) -> SqlResult<(&D, &mut D::Connection)> {
        self.ensure_connection().await?;
        match self.connection.as_mut() {
            Some(conn) => Ok((&self.driver, conn)),
            None => Err(SqlError::connection(
                "Connection unavailable after open",
                "Retry the operation",
            )),
        }
    }

    /// Close the live connection (if any) and release engine-level resources.
    pub async fn close_connection(&mut self) -> CloseOutcome {
        let Some(conn) = self.connection.take() else {
            return CloseOutcome::NotConnected;
        };

        let mut suppressed = Vec::new();
        if let Err(e) = self.driver.close(conn).await {
            warn!(error = %e, "Error while closing connection (ignored)");
            suppressed.push(e);
        }
        if let Err(e) = self.driver.dispose().await {
            warn!(error = %e, "Error while disposing engine resources (ignored)");
            suppressed.push(e);
        }

        if suppressed.is_empty() {
            info!("Database connection closed");
            CloseOutcome::Closed
        } else {
            CloseOutcome::Suppressed(suppressed)
        }
    }

    /// Schema reflection, taken once and cached for the manager's lifetime.
    pub async fn metadata_snapshot(&mut self) -> SqlResult<Arc<MetadataSnapshot>> {
        if let Some(snapshot) = &self.metadata {
            return Ok(Arc::clone(snapshot));
        }

        let (driver, conn) = self.session().await?;
        let snapshot = driver.reflect(conn).await.map_err(|e| match e.kind {
            DriverErrorKind::Programming => SqlError::fatal_statement(e),
            _ => SqlError::from_connection_failure(&e),
        })?;
        debug!(tables = snapshot.tables.len(), "Reflected database schema");

        let snapshot = Arc::new(snapshot);
        self.metadata = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

impl<D: Driver> Drop for ConnectionManager<D> {
    fn drop(&mut self) {
        if self.connection.is_some() {
            warn!("Connection manager dropped with a live connection - call close_connection()");
        }
    }
}

impl<D: Driver> std::fmt::Debug for ConnectionManager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connected", &self.connection.is_some())
            .field("has_metadata", &self.metadata.is_some())
            .finish_non_exhaustive()
    }
}
