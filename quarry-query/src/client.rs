//! The native client primitive: the seam between this crate and a
//! concrete database driver.
//!
//! Backend crates implement [`NativeClient`] for a live connection and
//! [`Connector`] for establishing one. The executor talks to backends
//! only through these traits; everything above them is dialect logic.

use indexmap::IndexMap;

use crate::error::ErrorInfo;
use crate::options::Options;
use crate::value::{ParamMap, Value};

/// One fetched row: column name to value, in select-list order.
pub type Row = IndexMap<String, Value>;

/// Introspection data reported by a live connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    /// Server description, when available.
    pub server: Option<String>,
    /// Driver name.
    pub driver: Option<String>,
    /// Server or library version.
    pub version: Option<String>,
}

/// A live prepared-statement connection to one database.
///
/// Implementations report failures as [`ErrorInfo`] with a meaningful
/// SQLSTATE; the executor's retry policy is driven by it.
pub trait NativeClient: Send {
    /// Prepare, bind and run a row-returning statement.
    fn query(&mut self, sql: &str, params: &ParamMap) -> Result<Vec<Row>, ErrorInfo>;

    /// Prepare, bind and run a statement, returning affected rows.
    fn execute(&mut self, sql: &str, params: &ParamMap) -> Result<u64, ErrorInfo>;

    /// Begin a transaction.
    fn begin(&mut self) -> Result<(), ErrorInfo>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<(), ErrorInfo>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> Result<(), ErrorInfo>;

    /// Whether a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Row id of the last insert, when the backend tracks one.
    fn last_insert_id(&mut self) -> Option<i64>;

    /// Connection introspection data.
    fn info(&self) -> ClientInfo {
        ClientInfo::default()
    }
}

/// Establishes [`NativeClient`] connections from validated options.
pub trait Connector: Send + Sync {
    /// Open a connection for `options`, whose DSN is already built.
    fn connect(&self, options: &Options, dsn: &str) -> Result<Box<dyn NativeClient>, ErrorInfo>;
}

/// Build a [`Row`] from parallel column/value slices, a convenience for
/// backend implementations.
pub fn row_from_pairs(pairs: impl IntoIterator<Item = (String, Value)>) -> Row {
    pairs.into_iter().collect()
}
