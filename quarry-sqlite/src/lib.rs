//! SQLite backend for the Quarry database layer.
//!
//! This crate wires `rusqlite` into the [`quarry_query`] executor: the
//! [`SqliteConnector`] opens connections from the DSN the dialect builds,
//! and [`SqliteClient`] runs prepared statements with named-parameter
//! binding. SQLite result codes are mapped onto SQLSTATE classes so the
//! executor's retry policy works unchanged.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use quarry_query::{data, Connection, Dialect, Options};
//! use quarry_sqlite::SqliteConnector;
//!
//! # fn main() -> quarry_query::Result<()> {
//! let options = Options::new(Dialect::Sqlite).dbname(":memory:");
//! let mut db = Connection::new(options, Arc::new(SqliteConnector::new()));
//!
//! db.exec("CREATE TABLE user (id INTEGER PRIMARY KEY, name TEXT)", &[])?;
//! let id = db.table("user").insert(data! { "name" => "ada" })?;
//! assert_eq!(id, Some(1));
//!
//! let name = db.table("user").field("name").and_where("id", 1).get(false)?;
//! # let _ = name;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod types;

pub use client::{SqliteClient, SqliteConnector};
pub use error::map_error;
pub use types::{from_sqlite, to_sqlite};
