//! Per-connection configuration.
//!
//! [`Options`] is a plain value: build it in code with the fluent
//! setters, or deserialize it from any serde format. Validation is
//! explicit via [`Options::validate`] and is always run before a
//! connection is activated.
//!
//! ```rust
//! use quarry_query::{Dialect, Options};
//!
//! let options = Options::new(Dialect::Mysql)
//!     .host("127.0.0.1")
//!     .port(3306)
//!     .dbname("app")
//!     .username("app")
//!     .password("secret")
//!     .prefix("t_");
//! assert!(options.validate().is_ok());
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::value::Value;

/// How backend errors should be reported.
///
/// Retained for configuration compatibility; all operations in this
/// crate report failures through `Result` regardless of the mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Record the error and return it without extra reporting.
    #[default]
    Silent,
    /// Additionally emit a `tracing` warning for each backend error.
    Warning,
    /// Treated the same as `Warning`; errors are already values here.
    Exception,
}

/// Immutable per-connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Backend dialect. Always required.
    pub driver: Dialect,
    /// Raw DSN; overrides host/port/dbname when present.
    #[serde(default)]
    pub dsn: Option<String>,
    /// Server host, when no DSN is given.
    #[serde(default)]
    pub host: Option<String>,
    /// Server port, when no DSN is given.
    #[serde(default)]
    pub port: Option<u16>,
    /// Database name, or file path for SQLite.
    #[serde(default)]
    pub dbname: Option<String>,
    /// Login user.
    #[serde(default)]
    pub username: Option<String>,
    /// Login password.
    #[serde(default)]
    pub password: Option<String>,
    /// Connection character set.
    #[serde(default = "default_charset")]
    pub charset: String,
    /// Prefix prepended to every table name the compiler quotes.
    #[serde(default)]
    pub prefix: String,
    /// Error reporting mode.
    #[serde(default)]
    pub error: ErrorMode,
    /// Backend specific connection attributes, passed to the connector.
    #[serde(default)]
    pub option: IndexMap<String, Value>,
    /// Statements executed once right after connecting.
    #[serde(default)]
    pub command: Vec<String>,
    /// Debug mode: render SQL instead of executing it.
    #[serde(default)]
    pub debug: bool,
}

fn default_charset() -> String {
    "utf8".to_string()
}

impl Options {
    /// Start a configuration for the given backend.
    pub fn new(driver: Dialect) -> Self {
        Self {
            driver,
            dsn: None,
            host: None,
            port: None,
            dbname: None,
            username: None,
            password: None,
            charset: default_charset(),
            prefix: String::new(),
            error: ErrorMode::default(),
            option: IndexMap::new(),
            command: Vec::new(),
            debug: false,
        }
    }

    /// Set a raw DSN, overriding host/port/dbname.
    pub fn dsn(mut self, dsn: impl Into<String>) -> Self {
        self.dsn = Some(dsn.into());
        self
    }

    /// Set the server host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the server port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the database name (file path for SQLite).
    pub fn dbname(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = Some(dbname.into());
        self
    }

    /// Set the login user.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the login password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the connection character set.
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    /// Set the table name prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the error reporting mode.
    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.error = mode;
        self
    }

    /// Add a backend specific connection attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.option.insert(key.into(), value.into());
        self
    }

    /// Add a statement to run right after connecting.
    pub fn command(mut self, statement: impl Into<String>) -> Self {
        self.command.push(statement.into());
        self
    }

    /// Enable debug mode.
    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// Check that the configuration can produce a DSN.
    ///
    /// Without an explicit DSN, network backends need host, port and
    /// dbname; SQLite only needs dbname; ODBC is DSN-only.
    pub fn validate(&self) -> Result<()> {
        if self.dsn.is_some() {
            return Ok(());
        }
        match self.driver {
            Dialect::Sqlite => {
                if self.dbname.is_none() {
                    return Err(Error::config("sqlite requires dbname or dsn"));
                }
            }
            Dialect::Odbc => {
                return Err(Error::config("odbc requires an explicit dsn"));
            }
            Dialect::Mysql | Dialect::Pgsql => {
                if self.host.is_none() || self.port.is_none() || self.dbname.is_none() {
                    return Err(Error::config(
                        "host, port and dbname are all required when no dsn is given",
                    ));
                }
            }
        }
        Ok(())
    }
}
