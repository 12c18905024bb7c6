//! # quarry-query
//!
//! Lightweight database access layer: a fluent query builder, a
//! multi-dialect SQL compiler with typed bound parameters, and a
//! resilient statement executor.
//!
//! The crate splits into three layers:
//! - the expression compiler ([`SqlCompiler`]) turns condition maps,
//!   field lists, joins and raw fragments into SQL text plus a
//!   [`ParamMap`] of generated placeholders;
//! - the executor ([`Driver`]) prepares and runs statements over a
//!   pluggable [`NativeClient`], classifying failures by SQLSTATE and
//!   retrying lost connections;
//! - the facade ([`Connection`]) accumulates clause state fluently and
//!   delegates terminal operations to the driver.
//!
//! ## Conditions
//!
//! Filters are ordered maps whose keys carry an optional bracketed
//! operator:
//!
//! ```rust
//! use quarry_query::{cond, Dialect, ParamMap, SqlCompiler, WhereClause};
//!
//! let clause = WhereClause::from(cond! {
//!     "age[>]" => 21,
//!     "city" => vec!["berlin", "paris"],
//! });
//!
//! let mut compiler = SqlCompiler::new(Dialect::Mysql, "");
//! let mut map = ParamMap::new();
//! let sql = compiler.where_clause(&clause, &mut map)?;
//! assert_eq!(
//!     compiler.generate(&format!("SELECT * FROM `user`{sql}"), &map),
//!     "SELECT * FROM `user` WHERE `age` > 21 AND `city` IN ('berlin', 'paris')"
//! );
//! # Ok::<(), quarry_query::Error>(())
//! ```
//!
//! ## Raw fragments
//!
//! `<name>` markers inside a [`Raw`] fragment quote identifiers with
//! the active dialect's rules, and `:name` placeholders bind values:
//!
//! ```rust
//! use quarry_query::{raw, Value};
//!
//! let fragment = raw("COALESCE(<score>, :fallback)").bind(":fallback", Value::Int(0));
//! assert_eq!(fragment.text(), "COALESCE(<score>, :fallback)");
//! ```
//!
//! ## Values
//!
//! Bound values convert from plain Rust types:
//!
//! ```rust
//! use quarry_query::Value;
//!
//! let v: Value = 42.into();
//! assert!(matches!(v, Value::Int(42)));
//! let v: Value = "hello".into();
//! assert!(matches!(v, Value::Str(_)));
//! ```
//!
//! ## Errors
//!
//! Backend diagnostics keep their SQLSTATE, and the classifier drives
//! the retry policy:
//!
//! ```rust
//! use quarry_query::ErrorState;
//!
//! assert_eq!(ErrorState::classify("08006"), ErrorState::Reconnect);
//! assert_eq!(ErrorState::classify("23505"), ErrorState::Error);
//! ```

pub mod client;
pub mod compiler;
pub mod connection;
mod decode;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod logging;
#[macro_use]
pub mod macros;
mod operations;
pub mod options;
pub mod raw;
pub mod registry;
pub mod sqlstate;
mod transaction;
pub mod types;
pub mod value;

pub use client::{row_from_pairs, ClientInfo, Connector, NativeClient, Row};
pub use compiler::{ColumnEntry, ColumnMap, SqlCompiler};
pub use connection::{BuildState, Connection};
pub use dialect::Dialect;
pub use driver::{Driver, ServerInfo, LOG_CAPACITY, MAX_RETRIES, RETRY_BACKOFF};
pub use error::{Error, ErrorInfo, Result};
pub use options::{ErrorMode, Options};
pub use raw::{Raw, raw};
pub use registry::{ConfigProvider, Registry};
pub use sqlstate::ErrorState;

// Re-export the clause building blocks
pub use types::{
    Aggregate, ColumnDef, ColumnType, CondMap, CondValue, DataMap, Field, Fields, GroupBy, Having,
    JoinMap, JoinRelation, Limit, MatchAgainst, MatchMode, OrderBy, OrderDir, OrderItem,
    ReplacePairs, SetValue, TableOptions, WhereClause,
};

// Re-export the parameter model
pub use value::{Param, ParamKind, ParamMap, Value};
