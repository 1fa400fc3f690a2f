//! Connection Management
//!
//! Tracks which centrals are currently connected. A handle is present iff a
//! connect event for it has been seen and no matching disconnect since.

use heapless::index_set::FnvIndexSet;

use crate::config::MAX_CONNECTIONS;

/// Stack-assigned connection handle of a central.
pub type ConnHandle = u16;

/// Connection management errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionError {
    ConnectionNotFound,
    ConnectionSetFull,
}

/// Set of connected centrals.
pub struct ConnectionManager {
    connections: FnvIndexSet<ConnHandle, MAX_CONNECTIONS>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: FnvIndexSet::new(),
        }
    }

    /// Record a new connection. Re-adding a known handle is a no-op.
    pub fn add_connection(&mut self, handle: ConnHandle) -> Result<(), ConnectionError> {
        match self.connections.insert(handle) {
            Ok(true) => {
                debug!("CONNECTION: Added connection {}", handle);
                Ok(())
            }
            Ok(false) => {
                warn!("CONNECTION: Connection {} already tracked", handle);
                Ok(())
            }
            Err(_) => {
                error!("CONNECTION: Failed to add connection {} - set full", handle);
                Err(ConnectionError::ConnectionSetFull)
            }
        }
    }

    /// Forget a connection.
    pub fn remove_connection(&mut self, handle: ConnHandle) -> Result<(), ConnectionError> {
        if self.connections.remove(&handle) {
            debug!("CONNECTION: Removed connection {}", handle);
            Ok(())
        } else {
            warn!("CONNECTION: Attempted to remove unknown connection {}", handle);
            Err(ConnectionError::ConnectionNotFound)
        }
    }

    /// Check if a connection exists
    pub fn is_connected(&self, handle: ConnHandle) -> bool {
        self.connections.contains(&handle)
    }

    /// Get the number of active connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Get all active connection handles. No ordering is promised.
    pub fn active_handles(&self) -> impl Iterator<Item = ConnHandle> + '_ {
        self.connections.iter().copied()
    }

    /// Drop every connection (shutdown).
    pub fn clear(&mut self) {
        if !self.connections.is_empty() {
            debug!("CONNECTION: Clearing {} connections", self.connections.len());
        }
        self.connections.clear();
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
