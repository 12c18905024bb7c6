//! SQLite backend built on rusqlite.
//!
//! [`SqliteConnector`] opens connections from a `sqlite:{path}` DSN
//! (`sqlite::memory:` for an in-memory database) and [`SqliteClient`]
//! drives prepared statements with named-parameter binding.

use rusqlite::types::Value as SqliteValue;
use rusqlite::ToSql;
use tracing::debug;

use quarry_query::{
    row_from_pairs, ClientInfo, Connector, ErrorInfo, NativeClient, Options, ParamMap, Row,
};

use crate::error::map_error;
use crate::types::{from_sqlite, to_sqlite};

/// Opens [`SqliteClient`] connections for the executor.
#[derive(Debug, Default, Clone)]
pub struct SqliteConnector;

impl SqliteConnector {
    /// New connector; it carries no state.
    pub fn new() -> Self {
        Self
    }
}

impl Connector for SqliteConnector {
    fn connect(
        &self,
        options: &Options,
        dsn: &str,
    ) -> Result<Box<dyn NativeClient>, ErrorInfo> {
        let path = dsn.strip_prefix("sqlite:").unwrap_or(dsn);
        let conn = if path == ":memory:" || path.is_empty() {
            rusqlite::Connection::open_in_memory().map_err(map_error)?
        } else {
            rusqlite::Connection::open(path).map_err(map_error)?
        };
        debug!(target: "quarry_sqlite", path, debug = options.debug, "opened database");
        Ok(Box::new(SqliteClient { conn }))
    }
}

/// One live SQLite connection.
pub struct SqliteClient {
    conn: rusqlite::Connection,
}

impl SqliteClient {
    fn bound_params(params: &ParamMap) -> Vec<(String, SqliteValue)> {
        params
            .iter()
            .map(|(name, param)| (name.clone(), to_sqlite(&param.value)))
            .collect()
    }
}

impl NativeClient for SqliteClient {
    fn query(&mut self, sql: &str, params: &ParamMap) -> Result<Vec<Row>, ErrorInfo> {
        let mut stmt = self.conn.prepare(sql).map_err(map_error)?;
        let names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let bound = Self::bound_params(params);
        let refs: Vec<(&str, &dyn ToSql)> = bound
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();
        let mut rows = stmt.query(refs.as_slice()).map_err(map_error)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_error)? {
            let mut pairs = Vec::with_capacity(names.len());
            for (index, name) in names.iter().enumerate() {
                let cell = row.get_ref(index).map_err(map_error)?;
                pairs.push((name.clone(), from_sqlite(cell)));
            }
            out.push(row_from_pairs(pairs));
        }
        Ok(out)
    }

    fn execute(&mut self, sql: &str, params: &ParamMap) -> Result<u64, ErrorInfo> {
        let mut stmt = self.conn.prepare(sql).map_err(map_error)?;
        let bound = Self::bound_params(params);
        let refs: Vec<(&str, &dyn ToSql)> = bound
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();
        let affected = stmt.execute(refs.as_slice()).map_err(map_error)?;
        Ok(affected as u64)
    }

    fn begin(&mut self) -> Result<(), ErrorInfo> {
        self.conn.execute_batch("BEGIN").map_err(map_error)
    }

    fn commit(&mut self) -> Result<(), ErrorInfo> {
        self.conn.execute_batch("COMMIT").map_err(map_error)
    }

    fn rollback(&mut self) -> Result<(), ErrorInfo> {
        self.conn.execute_batch("ROLLBACK").map_err(map_error)
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn last_insert_id(&mut self) -> Option<i64> {
        Some(self.conn.last_insert_rowid())
    }

    fn info(&self) -> ClientInfo {
        ClientInfo {
            server: None,
            driver: Some("sqlite".to_string()),
            version: Some(rusqlite::version().to_string()),
        }
    }
}
