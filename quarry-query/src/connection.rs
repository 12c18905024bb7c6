//! Fluent query facade over a [`Driver`].
//!
//! A [`Connection`] holds per-statement build state (table, joins,
//! fields, conditions, trailing clauses) that clause methods
//! accumulate and each terminal operation consumes. After a terminal
//! operation the build state resets to defaults, keeping only the
//! table:
//!
//! ```
//! use quarry_query::{Connection, Options, Dialect};
//! # use quarry_query::{Connector, NativeClient, ErrorInfo};
//! # use std::sync::Arc;
//! # struct Offline;
//! # impl Connector for Offline {
//! #     fn connect(&self, _: &Options, _: &str) -> Result<Box<dyn NativeClient>, ErrorInfo> {
//! #         Err(ErrorInfo::new("08001", None, "offline"))
//! #     }
//! # }
//! let options = Options::new(Dialect::Sqlite).dbname(":memory:").debug();
//! let mut db = Connection::new(options, Arc::new(Offline));
//! db.table("user")
//!     .field("name,email")
//!     .and_where("age[>]", 21)
//!     .order("age DESC")
//!     .limit(10u64)
//!     .select()?;
//! # Ok::<(), quarry_query::Error>(())
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::client::{Connector, Row};
use crate::driver::{Driver, ServerInfo};
use crate::error::{Error, ErrorInfo, Result};
use crate::options::Options;
use crate::types::{
    Aggregate, CondMap, CondValue, DataMap, Field, Fields, GroupBy, Having, JoinMap, JoinRelation,
    Limit, OrderBy, ReplacePairs, WhereClause,
};
use crate::value::Value;

/// Accumulated build state, snapshot-able via [`Connection::params`].
#[derive(Debug, Clone, Default)]
pub struct BuildState {
    /// Target table, the only part a terminal operation keeps.
    pub table: Option<String>,
    /// Joined tables.
    pub join: JoinMap,
    /// Column selection.
    pub field: Fields,
    /// Filter conditions.
    pub conditions: CondMap,
    /// `ORDER BY`.
    pub order: Option<OrderBy>,
    /// `LIMIT`.
    pub limit: Option<Limit>,
    /// An unparseable limit argument, surfaced by the next operation
    /// that consumes the clause.
    pub limit_error: Option<String>,
    /// `GROUP BY`.
    pub group: Option<GroupBy>,
    /// `HAVING`.
    pub having: Option<Having>,
}

/// A lazily activated database handle with fluent statement building.
pub struct Connection {
    options: Options,
    connector: Arc<dyn Connector>,
    driver: Option<Driver>,
    state: BuildState,
}

impl Connection {
    /// Create an inactive connection; no backend contact happens until
    /// [`activate`](Self::activate) or the first terminal operation.
    pub fn new(options: Options, connector: Arc<dyn Connector>) -> Self {
        Self {
            options,
            connector,
            driver: None,
            state: BuildState::default(),
        }
    }

    /// Construct the underlying [`Driver`], connecting eagerly unless
    /// debug mode is set. Idempotent.
    pub fn activate(&mut self) -> Result<()> {
        if self.driver.is_none() {
            self.options.validate()?;
            self.driver = Some(Driver::new(
                self.options.clone(),
                Arc::clone(&self.connector),
            )?);
            debug!(driver = %self.options.driver, "connection activated");
        }
        Ok(())
    }

    /// Whether a live driver exists.
    pub fn is_activated(&self) -> bool {
        self.driver.is_some()
    }

    /// The underlying driver, activating on first use.
    pub fn driver(&mut self) -> Result<&mut Driver> {
        self.activate()?;
        self.driver.as_mut().ok_or(Error::NotActivated)
    }

    // ---- clause accumulators ------------------------------------------

    /// Set the target table. Alias for [`from`](Self::from).
    pub fn table(&mut self, table: impl Into<String>) -> &mut Self {
        self.from(table)
    }

    /// Set the target table.
    pub fn from(&mut self, table: impl Into<String>) -> &mut Self {
        self.state.table = Some(table.into());
        self
    }

    /// Add one join; the key carries the direction and table, as in
    /// `"[>]account(a)"`.
    pub fn join(&mut self, key: impl Into<String>, relation: JoinRelation) -> &mut Self {
        self.state.join.insert(key.into(), relation);
        self
    }

    /// Set or extend the column selection. Comma-separated strings
    /// split into lists; two lists merge, anything else replaces.
    pub fn field(&mut self, field: impl Into<Fields>) -> &mut Self {
        let incoming = field.into();
        match (&mut self.state.field, incoming) {
            (Fields::List(current), Fields::List(mut more)) => current.append(&mut more),
            (Fields::List(current), Fields::Col(col)) => current.push(Field::Col(col)),
            (slot, other) => *slot = other,
        }
        self
    }

    /// Add one condition, ANDed with the rest.
    pub fn and_where(
        &mut self,
        key: impl Into<String>,
        value: impl Into<CondValue>,
    ) -> &mut Self {
        self.state.conditions.insert(key.into(), value.into());
        self
    }

    /// Merge a whole condition map; later keys win.
    pub fn where_map(&mut self, conditions: CondMap) -> &mut Self {
        self.state.conditions.extend(conditions);
        self
    }

    /// Set or extend the ordering; two lists concatenate.
    pub fn order(&mut self, order: impl Into<OrderBy>) -> &mut Self {
        let incoming = order.into();
        match (&mut self.state.order, incoming) {
            (Some(OrderBy::List(current)), OrderBy::List(mut more)) => current.append(&mut more),
            (slot, other) => *slot = Some(other),
        }
        self
    }

    /// Set the row limit; accepts a count, an `(offset, count)` pair,
    /// or an `"offset,count"` string. An unparseable string fails the
    /// next clause-consuming operation.
    pub fn limit<L>(&mut self, limit: L) -> &mut Self
    where
        L: TryInto<Limit>,
        L::Error: Into<Error>,
    {
        match limit.try_into() {
            Ok(limit) => self.state.limit = Some(limit),
            Err(err) => {
                let message = match err.into() {
                    Error::InvalidArgument(message) => message,
                    other => other.to_string(),
                };
                self.state.limit = None;
                self.state.limit_error = Some(message);
            }
        }
        self
    }

    /// Set the grouping.
    pub fn group(&mut self, group: impl Into<GroupBy>) -> &mut Self {
        self.state.group = Some(group.into());
        self
    }

    /// Set the `HAVING` clause.
    pub fn having(&mut self, having: impl Into<Having>) -> &mut Self {
        self.state.having = Some(having.into());
        self
    }

    /// Snapshot the current build state.
    pub fn params(&self) -> BuildState {
        self.state.clone()
    }

    /// Restore a snapshot; empty parts of the snapshot leave the
    /// current state untouched.
    pub fn set_params(&mut self, params: BuildState) {
        if params.table.is_some() {
            self.state.table = params.table;
        }
        if !params.join.is_empty() {
            self.state.join = params.join;
        }
        if params.field != Fields::All {
            self.state.field = params.field;
        }
        if !params.conditions.is_empty() {
            self.state.conditions = params.conditions;
        }
        if params.order.is_some() {
            self.state.order = params.order;
        }
        if params.limit.is_some() {
            self.state.limit = params.limit;
        }
        if params.limit_error.is_some() {
            self.state.limit_error = params.limit_error;
        }
        if params.group.is_some() {
            self.state.group = params.group;
        }
        if params.having.is_some() {
            self.state.having = params.having;
        }
    }

    /// Reset build state to defaults, keeping the table.
    pub fn cleanup(&mut self) {
        let table = self.state.table.take();
        self.state = BuildState {
            table,
            ..BuildState::default()
        };
    }

    fn require_table(&self) -> Result<String> {
        self.state
            .table
            .clone()
            .ok_or_else(|| Error::config("no table selected"))
    }

    fn take_clause(&mut self, lock: bool) -> Result<WhereClause> {
        if let Some(message) = self.state.limit_error.take() {
            self.cleanup();
            return Err(Error::InvalidArgument(message));
        }
        Ok(WhereClause {
            conditions: std::mem::take(&mut self.state.conditions),
            match_against: None,
            group: self.state.group.take(),
            having: self.state.having.take(),
            order: self.state.order.take(),
            limit: self.state.limit.take(),
            for_update: lock,
        })
    }

    // ---- terminal operations ------------------------------------------

    /// Fetch all matching rows.
    pub fn select(&mut self) -> Result<Option<JsonValue>> {
        let table = self.require_table()?;
        let join = std::mem::take(&mut self.state.join);
        let fields = std::mem::take(&mut self.state.field);
        let clause = self.take_clause(false)?;
        let res = self.driver()?.select(&table, &join, &fields, &clause);
        self.cleanup();
        res
    }

    /// Fetch one record, optionally locking the row (`FOR UPDATE` on
    /// dialects that support it).
    pub fn get(&mut self, lock: bool) -> Result<Option<JsonValue>> {
        let table = self.require_table()?;
        let join = std::mem::take(&mut self.state.join);
        let fields = std::mem::take(&mut self.state.field);
        let clause = self.take_clause(lock)?;
        let res = self.driver()?.get(&table, &join, &fields, &clause);
        self.cleanup();
        res
    }

    /// Alias for [`get`](Self::get).
    pub fn find(&mut self, lock: bool) -> Result<Option<JsonValue>> {
        self.get(lock)
    }

    /// Fetch matching rows in random order.
    pub fn rand(&mut self) -> Result<Option<JsonValue>> {
        let table = self.require_table()?;
        let join = std::mem::take(&mut self.state.join);
        let fields = std::mem::take(&mut self.state.field);
        let clause = self.take_clause(false)?;
        let res = self.driver()?.rand(&table, &join, &fields, &clause);
        self.cleanup();
        res
    }

    /// Whether any row matches the accumulated conditions.
    pub fn has(&mut self) -> Result<Option<bool>> {
        let table = self.require_table()?;
        let join = std::mem::take(&mut self.state.join);
        self.state.field = Fields::All;
        let clause = self.take_clause(false)?;
        let res = self.driver()?.has(&table, &join, &clause);
        self.cleanup();
        res
    }

    fn run_aggregate(&mut self, agg: Aggregate) -> Result<Option<Value>> {
        let table = self.require_table()?;
        let join = std::mem::take(&mut self.state.join);
        let fields = std::mem::take(&mut self.state.field);
        let clause = self.take_clause(false)?;
        let res = self
            .driver()?
            .aggregate(&table, &join, &agg, &fields, &clause);
        self.cleanup();
        res
    }

    /// Count matching rows; `COUNT(*)` unless a field was selected.
    pub fn count(&mut self) -> Result<Option<i64>> {
        Ok(self
            .run_aggregate(Aggregate::Count)?
            .and_then(|v| v.as_i64()))
    }

    /// Maximum of the selected field.
    pub fn max(&mut self) -> Result<Option<Value>> {
        self.run_aggregate(Aggregate::Max)
    }

    /// Minimum of the selected field.
    pub fn min(&mut self) -> Result<Option<Value>> {
        self.run_aggregate(Aggregate::Min)
    }

    /// Average of the selected field.
    pub fn avg(&mut self) -> Result<Option<f64>> {
        Ok(self.run_aggregate(Aggregate::Avg)?.and_then(|v| v.as_f64()))
    }

    /// Sum of the selected field.
    pub fn sum(&mut self) -> Result<Option<f64>> {
        Ok(self.run_aggregate(Aggregate::Sum)?.and_then(|v| v.as_f64()))
    }

    /// Run [`sum`](Self::sum) once per selected column, preserving the
    /// other clauses for every pass. Requires a plain column list.
    pub fn sum_group(&mut self) -> Result<IndexMap<String, Option<f64>>> {
        let names: Vec<String> = match &self.state.field {
            Fields::Col(col) => vec![col.clone()],
            Fields::List(list) => list
                .iter()
                .map(|field| match field {
                    Field::Col(col) => Ok(col.clone()),
                    _ => Err(Error::invalid("sum_group requires plain column names")),
                })
                .collect::<Result<_>>()?,
            _ => return Err(Error::invalid("sum_group requires an explicit column list")),
        };

        let saved = self.params();
        let mut out = IndexMap::new();
        for name in names {
            self.set_params(saved.clone());
            self.state.field = Fields::Col(name.clone());
            out.insert(name, self.sum()?);
        }
        Ok(out)
    }

    /// Insert one row and return the backend's new row id, when the
    /// backend reports one.
    pub fn insert(&mut self, data: DataMap) -> Result<Option<i64>> {
        let table = self.require_table()?;
        let driver = self.driver()?;
        let res = match driver.insert(&table, &[data]) {
            Ok(Some(_)) => driver.id(),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        self.cleanup();
        res
    }

    /// Insert several rows at once; returns the affected row count.
    pub fn insert_many(&mut self, rows: &[DataMap]) -> Result<Option<u64>> {
        let table = self.require_table()?;
        let res = self.driver()?.insert(&table, rows);
        self.cleanup();
        res
    }

    /// Update matching rows; returns the affected row count.
    pub fn update(&mut self, data: DataMap) -> Result<Option<u64>> {
        let table = self.require_table()?;
        let clause = self.take_clause(false)?;
        let res = self.driver()?.update(&table, &data, &clause);
        self.cleanup();
        res
    }

    /// Delete matching rows; returns the affected row count.
    pub fn delete(&mut self) -> Result<Option<u64>> {
        let table = self.require_table()?;
        let clause = self.take_clause(false)?;
        let res = self.driver()?.delete(&table, &clause);
        self.cleanup();
        res
    }

    /// Substring substitution update on matching rows.
    pub fn replace(&mut self, pairs: ReplacePairs) -> Result<Option<u64>> {
        let table = self.require_table()?;
        let clause = self.take_clause(false)?;
        let res = self.driver()?.replace(&table, &pairs, &clause);
        self.cleanup();
        res
    }

    // ---- raw statements and transactions ------------------------------

    /// Run a raw fetching statement; `<name>` markers quote
    /// identifiers and `:name` placeholders bind values.
    pub fn query(&mut self, statement: &str, params: &[(&str, Value)]) -> Result<Option<Vec<Row>>> {
        self.driver()?.query(statement, params)
    }

    /// Run a raw non-returning statement.
    pub fn exec(&mut self, statement: &str, params: &[(&str, Value)]) -> Result<Option<u64>> {
        self.driver()?.statement(statement, params)
    }

    /// Open a transaction, optionally bounded by a time to live.
    pub fn begin(&mut self, ttl: Option<Duration>) -> Result<()> {
        self.driver()?.begin(ttl)
    }

    /// Commit the open transaction.
    pub fn commit(&mut self) -> Result<()> {
        self.driver()?.commit()
    }

    /// Roll back the open transaction.
    pub fn rollback(&mut self) -> Result<()> {
        self.driver()?.rollback()
    }

    /// Run a closure inside a transaction, committing on `Ok` and
    /// rolling back on `Err`.
    pub fn action<T>(&mut self, f: impl FnOnce(&mut Driver) -> Result<T>) -> Result<T> {
        self.driver()?.action(f)
    }

    // ---- diagnostics ---------------------------------------------------

    /// Server and client version details.
    pub fn info(&mut self) -> Result<ServerInfo> {
        self.driver()?.info()
    }

    /// The most recent backend diagnostic, if any.
    pub fn error(&self) -> Option<&ErrorInfo> {
        self.driver.as_ref().and_then(Driver::error)
    }

    /// The most recent statement, rendered with parameters.
    pub fn last(&self) -> Option<String> {
        self.driver.as_ref().and_then(Driver::last)
    }

    /// All logged statements, oldest first.
    pub fn log(&self) -> Vec<String> {
        self.driver.as_ref().map(Driver::log).unwrap_or_default()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("options", &self.options)
            .field("activated", &self.driver.is_some())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::NativeClient;
    use crate::dialect::Dialect;
    use crate::types::SetValue;
    use pretty_assertions::assert_eq;

    struct NeverConnect;

    impl Connector for NeverConnect {
        fn connect(
            &self,
            _options: &Options,
            _dsn: &str,
        ) -> std::result::Result<Box<dyn NativeClient>, ErrorInfo> {
            Err(ErrorInfo::new("08001", None, "no backend in debug tests"))
        }
    }

    fn debug_connection(dialect: Dialect) -> Connection {
        let options = match dialect {
            Dialect::Sqlite => Options::new(dialect).dbname(":memory:"),
            _ => Options::new(dialect).host("h").port(1).dbname("app"),
        }
        .debug();
        Connection::new(options, Arc::new(NeverConnect))
    }

    fn last_rendered(db: &mut Connection) -> String {
        db.driver()
            .unwrap()
            .query_string()
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn fluent_select_renders_all_clauses() {
        let mut db = debug_connection(Dialect::Sqlite);
        db.table("user")
            .field("name,age")
            .and_where("age[>]", 21)
            .order("age DESC")
            .limit((20u64, 10u64))
            .group("city")
            .select()
            .unwrap();
        assert_eq!(
            last_rendered(&mut db),
            "SELECT \"name\",\"age\" FROM \"user\" WHERE \"age\" > 21 \
             GROUP BY \"city\" ORDER BY \"age\" DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn cleanup_resets_everything_but_table() {
        let mut db = debug_connection(Dialect::Sqlite);
        db.table("user").and_where("id", 1).limit(5u64);
        db.select().unwrap();
        db.select().unwrap();
        assert_eq!(last_rendered(&mut db), "SELECT * FROM \"user\"");
    }

    #[test]
    fn limit_accepts_offset_count_string() {
        let mut db = debug_connection(Dialect::Sqlite);
        db.table("user").limit("20,100").select().unwrap();
        assert_eq!(
            last_rendered(&mut db),
            "SELECT * FROM \"user\" LIMIT 100 OFFSET 20"
        );
        db.table("user").limit("5").select().unwrap();
        assert_eq!(last_rendered(&mut db), "SELECT * FROM \"user\" LIMIT 5");
    }

    #[test]
    fn unparseable_limit_fails_the_next_operation() {
        let mut db = debug_connection(Dialect::Sqlite);
        db.table("user").limit("lots");
        assert!(matches!(db.select(), Err(Error::InvalidArgument(_))));
        // The failed build was discarded; the connection is usable again.
        db.table("user").select().unwrap();
        assert_eq!(last_rendered(&mut db), "SELECT * FROM \"user\"");
    }

    #[test]
    fn select_without_table_is_a_config_error() {
        let mut db = debug_connection(Dialect::Sqlite);
        assert!(matches!(db.select(), Err(Error::Config(_))));
    }

    #[test]
    fn field_lists_merge() {
        let mut db = debug_connection(Dialect::Sqlite);
        db.table("user").field("name,email").field("age");
        db.select().unwrap();
        assert_eq!(
            last_rendered(&mut db),
            "SELECT \"name\",\"email\",\"age\" FROM \"user\""
        );
    }

    #[test]
    fn get_with_lock_appends_for_update_where_supported() {
        let mut db = debug_connection(Dialect::Mysql);
        db.table("job").and_where("state", "queued");
        db.get(true).unwrap();
        assert_eq!(
            last_rendered(&mut db),
            "SELECT * FROM `job` WHERE `state` = 'queued' LIMIT 1 FOR UPDATE"
        );
    }

    #[test]
    fn lock_is_ignored_on_sqlite() {
        let mut db = debug_connection(Dialect::Sqlite);
        db.table("job");
        db.get(true).unwrap();
        assert_eq!(last_rendered(&mut db), "SELECT * FROM \"job\" LIMIT 1");
    }

    #[test]
    fn count_compiles_count_star_by_default() {
        let mut db = debug_connection(Dialect::Sqlite);
        db.table("user");
        let n = db.count().unwrap();
        assert_eq!(n, None);
        assert_eq!(last_rendered(&mut db), "SELECT COUNT(*) FROM \"user\"");
    }

    #[test]
    fn sum_group_runs_one_sum_per_column() {
        let mut db = debug_connection(Dialect::Sqlite);
        db.table("ledger")
            .field(vec!["debit", "credit"])
            .and_where("year", 2024);
        let sums = db.sum_group().unwrap();
        assert_eq!(sums.len(), 2);
        assert!(sums.keys().eq(["debit", "credit"]));
        assert_eq!(
            last_rendered(&mut db),
            "SELECT SUM(\"credit\") FROM \"ledger\" WHERE \"year\" = 2024"
        );
    }

    #[test]
    fn params_snapshot_restores_state() {
        let mut db = debug_connection(Dialect::Sqlite);
        db.table("user").and_where("id", 1).limit(3u64);
        let saved = db.params();
        db.select().unwrap();
        db.set_params(saved);
        db.select().unwrap();
        assert_eq!(
            last_rendered(&mut db),
            "SELECT * FROM \"user\" WHERE \"id\" = 1 LIMIT 3"
        );
    }

    #[test]
    fn insert_in_debug_mode_skips_id_lookup() {
        let mut db = debug_connection(Dialect::Sqlite);
        let mut row = DataMap::new();
        row.insert("name".to_string(), SetValue::from("ada"));
        let id = db.table("user").insert(row).unwrap();
        assert_eq!(id, None);
        assert_eq!(
            last_rendered(&mut db),
            "INSERT INTO \"user\" (\"name\") VALUES ('ada')"
        );
    }
}
