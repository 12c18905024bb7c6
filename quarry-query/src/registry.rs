//! Per-name cache of activated connections.
//!
//! A [`Registry`] owns one [`Connection`] per (logical name, role)
//! pair, building each lazily from a [`ConfigProvider`] on first use
//! and handing back the cached handle afterwards.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::client::Connector;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::options::Options;

/// Supplies configuration for logical database names.
///
/// `master` resolves the writable endpoint, `replica` a read-only one.
/// A provider without replicas can route both to the same options.
pub trait ConfigProvider: Send + Sync {
    /// Configuration for the writable endpoint of `name`.
    fn master(&self, name: &str) -> Result<(Options, Arc<dyn Connector>)>;

    /// Configuration for a read endpoint of `name`.
    fn replica(&self, name: &str) -> Result<(Options, Arc<dyn Connector>)>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Role {
    Master,
    Replica,
}

/// Cache of activated connections keyed by logical name and role.
pub struct Registry<P> {
    provider: P,
    connections: IndexMap<(String, Role), Connection>,
}

impl<P: ConfigProvider> Registry<P> {
    /// Empty registry over the given provider.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            connections: IndexMap::new(),
        }
    }

    /// Fetch the connection for `name`, building and activating it on
    /// first use. `master` selects the writable endpoint.
    pub fn db(&mut self, name: &str, master: bool) -> Result<&mut Connection> {
        if name.trim().is_empty() {
            return Err(Error::config("empty database name"));
        }
        let role = if master { Role::Master } else { Role::Replica };
        let key = (name.to_string(), role);

        if !self.connections.contains_key(&key) {
            let (options, connector) = if master {
                self.provider.master(name)?
            } else {
                self.provider.replica(name)?
            };
            options.validate()?;
            let mut connection = Connection::new(options, connector);
            connection.activate()?;
            debug!(name, ?role, "registered connection");
            self.connections.insert(key.clone(), connection);
        }

        self.connections
            .get_mut(&key)
            .ok_or(Error::NotActivated)
    }

    /// The writable connection for `name`.
    pub fn master(&mut self, name: &str) -> Result<&mut Connection> {
        self.db(name, true)
    }

    /// A read connection for `name`.
    pub fn replica(&mut self, name: &str) -> Result<&mut Connection> {
        self.db(name, false)
    }

    /// Drop both cached connections for `name`; open transactions roll
    /// back as the handles drop.
    pub fn close(&mut self, name: &str) {
        self.connections
            .shift_remove(&(name.to_string(), Role::Master));
        self.connections
            .shift_remove(&(name.to_string(), Role::Replica));
    }

    /// Drop every cached connection.
    pub fn close_all(&mut self) {
        self.connections.clear();
    }

    /// Number of cached connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
