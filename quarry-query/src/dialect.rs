//! Per-backend SQL rules: identifier quoting, string literals, DSN shape.
//!
//! Everything dialect specific in the compiler funnels through this enum
//! so the rest of the crate stays backend agnostic. The rules captured
//! here are deliberately small: quote characters, string escaping, the
//! random-order function, which backends support `FOR UPDATE` and
//! full-text `MATCH`, and how a connection DSN is assembled from
//! [`Options`](crate::options::Options).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::options::Options;

/// A supported database backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// MySQL and MariaDB.
    #[serde(alias = "mariadb")]
    Mysql,
    /// PostgreSQL.
    #[serde(alias = "postgres", alias = "postgresql")]
    Pgsql,
    /// SQLite.
    Sqlite,
    /// Generic ODBC bridge; always configured via a raw DSN.
    Odbc,
}

impl Dialect {
    /// Canonical lowercase name, also the DSN scheme.
    pub fn name(self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Pgsql => "pgsql",
            Self::Sqlite => "sqlite",
            Self::Odbc => "odbc",
        }
    }

    /// Identifier quote character.
    pub fn ident_quote(self) -> char {
        match self {
            Self::Mysql => '`',
            _ => '"',
        }
    }

    /// Quote an already validated identifier.
    pub fn quote_ident(self, name: &str) -> String {
        let q = self.ident_quote();
        format!("{q}{name}{q}")
    }

    /// Render a string as a SQL literal.
    ///
    /// MySQL escapes with backslashes; everybody else doubles the single
    /// quote. Only used for debug rendering and a few inline spots; real
    /// values travel as bound parameters.
    pub fn quote_string(self, value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('\'');
        match self {
            Self::Mysql => {
                for c in value.chars() {
                    if matches!(c, '\'' | '"' | '\\') {
                        out.push('\\');
                    }
                    out.push(c);
                }
            }
            _ => {
                for c in value.chars() {
                    if c == '\'' {
                        out.push('\'');
                    }
                    out.push(c);
                }
            }
        }
        out.push('\'');
        out
    }

    /// SQL expression producing a random sort key.
    pub fn random_fn(self) -> &'static str {
        match self {
            Self::Mysql => "RAND()",
            _ => "RANDOM()",
        }
    }

    /// Whether `SELECT ... FOR UPDATE` row locking is available.
    pub fn supports_row_lock(self) -> bool {
        matches!(self, Self::Mysql | Self::Pgsql)
    }

    /// Whether `MATCH ... AGAINST` full-text search is available.
    pub fn supports_match(self) -> bool {
        matches!(self, Self::Mysql)
    }

    /// Assemble the connection DSN for a validated [`Options`].
    ///
    /// An explicit `dsn` always wins; otherwise the DSN is built from
    /// host, port and dbname (plus charset for MySQL). SQLite only needs
    /// the database path.
    pub fn dsn(self, options: &Options) -> Result<String, Error> {
        if let Some(dsn) = &options.dsn {
            return Ok(dsn.clone());
        }
        match self {
            Self::Mysql => Ok(format!(
                "mysql:host={};port={};dbname={};charset={}",
                options.host.as_deref().unwrap_or_default(),
                options.port.unwrap_or_default(),
                options.dbname.as_deref().unwrap_or_default(),
                options.charset,
            )),
            Self::Pgsql => Ok(format!(
                "pgsql:host={};port={};dbname={}",
                options.host.as_deref().unwrap_or_default(),
                options.port.unwrap_or_default(),
                options.dbname.as_deref().unwrap_or_default(),
            )),
            Self::Sqlite => Ok(format!(
                "sqlite:{}",
                options.dbname.as_deref().unwrap_or_default()
            )),
            Self::Odbc => Err(Error::config("odbc connections require an explicit dsn")),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::Mysql),
            "pgsql" | "postgres" | "postgresql" => Ok(Self::Pgsql),
            "sqlite" => Ok(Self::Sqlite),
            "odbc" => Ok(Self::Odbc),
            other => Err(Error::config(format!("unknown driver '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_quoting() {
        assert_eq!(Dialect::Mysql.quote_ident("account"), "`account`");
        assert_eq!(Dialect::Pgsql.quote_ident("account"), "\"account\"");
        assert_eq!(Dialect::Sqlite.quote_ident("account"), "\"account\"");
    }

    #[test]
    fn string_quoting_mysql_backslashes() {
        assert_eq!(Dialect::Mysql.quote_string("it's"), "'it\\'s'");
        assert_eq!(Dialect::Mysql.quote_string("a\\b"), "'a\\\\b'");
    }

    #[test]
    fn string_quoting_ansi_doubles() {
        assert_eq!(Dialect::Sqlite.quote_string("it's"), "'it''s'");
        assert_eq!(Dialect::Pgsql.quote_string("plain"), "'plain'");
    }

    #[test]
    fn parse_aliases() {
        assert_eq!("mariadb".parse::<Dialect>().unwrap(), Dialect::Mysql);
        assert_eq!("postgresql".parse::<Dialect>().unwrap(), Dialect::Pgsql);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn sqlite_dsn_from_dbname() {
        let options = Options::new(Dialect::Sqlite).dbname(":memory:");
        assert_eq!(Dialect::Sqlite.dsn(&options).unwrap(), "sqlite::memory:");
    }

    #[test]
    fn explicit_dsn_wins() {
        let options = Options::new(Dialect::Mysql)
            .dsn("mysql:host=db;dbname=app")
            .host("ignored")
            .port(3306)
            .dbname("ignored");
        assert_eq!(Dialect::Mysql.dsn(&options).unwrap(), "mysql:host=db;dbname=app");
    }

    #[test]
    fn odbc_requires_dsn() {
        let options = Options::new(Dialect::Odbc);
        assert!(Dialect::Odbc.dsn(&options).is_err());
    }
}
