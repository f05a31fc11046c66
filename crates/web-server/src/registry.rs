// In crates/web-server/src/registry.rs

use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;

#[derive(Debug)]
struct Connection {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

/// Maps client ids to their live push connection.
///
/// A client reconnecting replaces its previous mapping; the old socket task
/// only removes the entry if it still owns it.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    connections: RwLock<HashMap<String, Connection>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and returns its id for later unregistration.
    pub fn register(&self, client_id: &str, tx: mpsc::UnboundedSender<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut connections = self.connections.write().unwrap_or_else(PoisonError::into_inner);
        if connections
            .insert(client_id.to_string(), Connection { id, tx })
            .is_some()
        {
            tracing::info!(client_id, "Client reconnected. Replacing previous connection.");
        }
        id
    }

    /// Removes the mapping if `connection_id` still owns it.
    pub fn unregister(&self, client_id: &str, connection_id: u64) -> bool {
        let mut connections = self.connections.write().unwrap_or_else(PoisonError::into_inner);
        match connections.get(client_id) {
            Some(conn) if conn.id == connection_id => {
                connections.remove(client_id);
                true
            }
            _ => false,
        }
    }

    /// Hands `text` to the client's socket task.
    pub fn deliver(&self, client_id: &str, text: String) -> Result<()> {
        let closed = {
            let connections = self.connections.read().unwrap_or_else(PoisonError::into_inner);
            let conn = connections
                .get(client_id)
                .ok_or_else(|| Error::NoConsumer(client_id.to_string()))?;
            match conn.tx.send(text) {
                Ok(()) => return Ok(()),
                Err(_) => conn.id,
            }
        };
        self.unregister(client_id, closed);
        Err(Error::ConnectionClosed(client_id.to_string()))
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        let connections = self.connections.read().unwrap_or_else(PoisonError::into_inner);
        connections.contains_key(client_id)
    }

    pub fn len(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deliver_reaches_registered_client() {
        let registry = ClientRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("2", tx);

        registry.deliver("2", "hello".to_string()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "hello");
        assert!(matches!(
            registry.deliver("3", "x".to_string()),
            Err(Error::NoConsumer(_))
        ));
    }

    #[test]
    fn test_closed_connection_is_dropped() {
        let registry = ClientRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register("2", tx);
        drop(rx);

        assert!(matches!(
            registry.deliver("2", "x".to_string()),
            Err(Error::ConnectionClosed(_))
        ));
        assert!(!registry.is_connected("2"));
    }

    #[test]
    fn test_stale_unregister_keeps_newer_connection() {
        let registry = ClientRegistry::new();
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let (new_tx, _new_rx) = mpsc::unbounded_channel();
        let old = registry.register("2", old_tx);
        let new = registry.register("2", new_tx);

        assert!(!registry.unregister("2", old));
        assert!(registry.is_connected("2"));
        assert!(registry.unregister("2", new));
        assert!(registry.is_empty());
    }
}
