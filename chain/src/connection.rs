// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Connections and requests exchanged along a chain

use ordermap::OrderMap;
use std::fmt::Display;

/// Identifier of a logical connection.
///
/// Supplied by the chain framework, stable from the first `request` to the final `close`, and the
/// only key used to track per-connection state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(String);

impl ConnId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ConnId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for ConnId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A connection, as returned by a successful request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    id: ConnId,
    network_service: String,
    labels: OrderMap<String, String>,
}

impl Connection {
    #[must_use]
    pub fn new(id: impl Into<ConnId>, network_service: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            network_service: network_service.into(),
            labels: OrderMap::new(),
        }
    }
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
    #[must_use]
    pub fn id(&self) -> &ConnId {
        &self.id
    }
    #[must_use]
    pub fn network_service(&self) -> &str {
        &self.network_service
    }
    #[must_use]
    pub fn labels(&self) -> &OrderMap<String, String> {
        &self.labels
    }
}

impl Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.id, self.network_service)
    }
}

/// A request to establish (or refresh) a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    connection: Connection,
}

impl Request {
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
    #[must_use]
    pub fn into_connection(self) -> Connection {
        self.connection
    }
}

impl From<Connection> for Request {
    fn from(connection: Connection) -> Self {
        Self::new(connection)
    }
}
