//! Connection registry: the set of live provider connections for one turn.
//!
//! A [`ConnectionSet`] is created by [`open_all`] at the start of a turn and
//! consumed by [`ConnectionSet::close_all`] at the end. Nothing is shared
//! across turns.

use futures::future::join_all;
use tracing::{debug, error, warn};

use super::{
    config::ProviderMap,
    connector::{Connection, Connector},
};
use crate::inventory::ToolCatalog;

/// Connect to every configured provider concurrently.
///
/// Providers that fail to connect are logged and left out. An empty config
/// yields an empty set.
pub async fn open_all(connector: &dyn Connector, configs: &ProviderMap) -> ConnectionSet {
    let attempts = configs.iter().map(|(name, config)| async move {
        match connector.connect(name, config).await {
            Ok(connection) => Some(connection),
            Err(e) => {
                error!(provider = %name, error = %e, "Failed to connect to MCP server");
                None
            }
        }
    });

    let connected = join_all(attempts).await.into_iter().flatten();
    let set = ConnectionSet::from_connections(connected).await;
    debug!(
        configured = configs.len(),
        connected = set.len(),
        "Opened MCP connections"
    );
    set
}

/// Live connections owned by one turn, at most one per provider name.
#[derive(Debug, Default)]
pub struct ConnectionSet {
    connections: Vec<Connection>,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set keeping the first connection per provider name. Later
    /// duplicates are closed before this returns.
    pub async fn from_connections(connections: impl IntoIterator<Item = Connection>) -> Self {
        let mut set = Self::new();
        let mut duplicates = Vec::new();
        for connection in connections {
            if let Err(duplicate) = set.insert(connection) {
                warn!(provider = %duplicate.name(), "Duplicate MCP connection, closing it");
                duplicates.push(duplicate);
            }
        }
        ConnectionSet {
            connections: duplicates,
        }
        .close_all()
        .await;
        set
    }

    /// Add a connection. A connection for an already-present provider replaces
    /// nothing and is returned to the caller.
    pub fn insert(&mut self, connection: Connection) -> Result<(), Connection> {
        if self.get(connection.name()).is_some() {
            return Err(connection);
        }
        self.connections.push(connection);
        Ok(())
    }

    pub fn get(&self, provider: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.name() == provider)
    }

    pub fn names(&self) -> Vec<String> {
        self.connections.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    /// Flatten every connection's tools under `provider__tool` names.
    pub fn merge_catalog(&self) -> ToolCatalog {
        self.connections
            .iter()
            .flat_map(Connection::catalog_entries)
            .map(|entry| (entry.namespaced_name(), entry))
            .collect()
    }

    /// Close every connection, returning the names of all connections released.
    ///
    /// Every connection is attempted. Close failures are logged and do not
    /// stop the remaining closes.
    pub async fn close_all(self) -> Vec<String> {
        let closes = self.connections.into_iter().map(|connection| async move {
            let name = connection.name().to_string();
            if let Err(e) = connection.close().await {
                warn!(provider = %name, error = %e, "Failed to close MCP connection");
            }
            name
        });
        let closed = join_all(closes).await;
        debug!(count = closed.len(), "Closed MCP connections");
        closed
    }
}
