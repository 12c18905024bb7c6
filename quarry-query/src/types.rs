//! Structured, dialect-agnostic descriptions of query clauses.
//!
//! These types are what the fluent builder accumulates and what the
//! compiler consumes. The string mini-languages mirror the map-based
//! query description this layer implements:
//!
//! - condition keys carry operators in brackets: `"age[>]"`, `"name[~]"`
//! - column specs carry aliases and casts: `"account.nickname(name)[String]"`
//! - join keys carry the join kind and alias: `"[>]post(p)"`
//! - a leading `@` on the first column requests `DISTINCT`

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::raw::Raw;
use crate::value::Value;

/// Cast applied to a column when decoding result rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Plain text (the default).
    Str,
    /// Decode as a boolean.
    Bool,
    /// Decode as an integer.
    Int,
    /// Decode as a floating point number.
    Number,
    /// Deserialize the stored text as structured data.
    Object,
    /// Deserialize the stored text as JSON.
    Json,
}

impl ColumnType {
    /// Parse a bracketed type tag, e.g. the `Int` in `"age[Int]"`.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "String" => Some(Self::Str),
            "Bool" => Some(Self::Bool),
            "Int" => Some(Self::Int),
            "Number" => Some(Self::Number),
            "Object" => Some(Self::Object),
            "JSON" => Some(Self::Json),
            _ => None,
        }
    }
}

/// One entry in a column selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// A column spec string: `"table.column(alias)[Type]"`.
    Col(String),
    /// A raw expression selected under `name` (which may carry a type
    /// tag, e.g. `"total[Int]"`).
    Raw {
        /// Output name, with optional type tag.
        name: String,
        /// The expression to select.
        raw: Raw,
    },
    /// A named group of fields, decoded as a nested object.
    Group {
        /// Key of the nested object in each decoded row.
        name: String,
        /// Fields inside the group.
        fields: Vec<Field>,
    },
}

/// The column selection of a read operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Fields {
    /// `SELECT *`.
    #[default]
    All,
    /// A single column; `select` flattens rows to its bare values.
    Col(String),
    /// An explicit list of fields.
    List(Vec<Field>),
    /// A raw select list, spliced verbatim.
    Raw(Raw),
}

impl Fields {
    /// Whether this selection names exactly one plain column.
    pub fn is_single(&self) -> bool {
        matches!(self, Self::Col(c) if c != "*")
    }
}

impl From<&str> for Fields {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if s == "*" {
            Self::All
        } else if s.contains(',') {
            Self::List(
                s.split(',')
                    .map(|c| Field::Col(c.trim().to_string()))
                    .collect(),
            )
        } else {
            Self::Col(s.to_string())
        }
    }
}

impl From<String> for Fields {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Vec<&str>> for Fields {
    fn from(columns: Vec<&str>) -> Self {
        Self::List(columns.into_iter().map(|c| Field::Col(c.to_string())).collect())
    }
}

impl From<Vec<String>> for Fields {
    fn from(columns: Vec<String>) -> Self {
        Self::List(columns.into_iter().map(Field::Col).collect())
    }
}

impl From<Vec<Field>> for Fields {
    fn from(fields: Vec<Field>) -> Self {
        Self::List(fields)
    }
}

impl From<Raw> for Fields {
    fn from(raw: Raw) -> Self {
        Self::Raw(raw)
    }
}

/// Value side of one condition entry.
#[derive(Debug, Clone, PartialEq)]
pub enum CondValue {
    /// A scalar operand.
    Value(Value),
    /// A list operand, for `IN`, `BETWEEN` and multi-pattern `LIKE`.
    List(Vec<Value>),
    /// Two raw endpoints, only meaningful under `[<>]`/`[><]`.
    RawRange(Box<Raw>, Box<Raw>),
    /// A raw right-hand side, spliced verbatim.
    Raw(Raw),
    /// A nested condition map (under `AND`/`OR` keys), or an explicit
    /// connective for multi-pattern `LIKE`.
    Sub(CondMap),
}

/// Ordered condition map; keys are column specs with optional bracketed
/// operators, or `AND`/`OR` connectives for nested groups.
pub type CondMap = IndexMap<String, CondValue>;

impl From<Value> for CondValue {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<bool> for CondValue {
    fn from(v: bool) -> Self {
        Self::Value(Value::Bool(v))
    }
}

impl From<i32> for CondValue {
    fn from(v: i32) -> Self {
        Self::Value(Value::Int(i64::from(v)))
    }
}

impl From<i64> for CondValue {
    fn from(v: i64) -> Self {
        Self::Value(Value::Int(v))
    }
}

impl From<f64> for CondValue {
    fn from(v: f64) -> Self {
        Self::Value(Value::Float(v))
    }
}

impl From<&str> for CondValue {
    fn from(v: &str) -> Self {
        Self::Value(Value::Str(v.to_string()))
    }
}

impl From<String> for CondValue {
    fn from(v: String) -> Self {
        Self::Value(Value::Str(v))
    }
}

impl From<JsonValue> for CondValue {
    fn from(v: JsonValue) -> Self {
        Self::Value(Value::Json(v))
    }
}

impl<T: Into<Value>> From<Vec<T>> for CondValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<Raw> for CondValue {
    fn from(v: Raw) -> Self {
        Self::Raw(v)
    }
}

impl From<CondMap> for CondValue {
    fn from(v: CondMap) -> Self {
        Self::Sub(v)
    }
}

impl From<Option<Value>> for CondValue {
    fn from(v: Option<Value>) -> Self {
        Self::Value(v.unwrap_or(Value::Null))
    }
}

/// Full-text search clause (`MATCH ... AGAINST`, MySQL only).
#[derive(Debug, Clone, PartialEq)]
pub struct MatchAgainst {
    /// Columns covered by the full-text index.
    pub columns: Vec<String>,
    /// The search keyword.
    pub keyword: String,
    /// Optional search mode.
    pub mode: Option<MatchMode>,
}

/// Full-text search mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Natural language mode.
    Natural,
    /// Natural language mode with query expansion.
    NaturalQuery,
    /// Boolean mode.
    Boolean,
    /// Query expansion.
    Query,
}

impl MatchMode {
    /// The SQL suffix for this mode.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Natural => " IN NATURAL LANGUAGE MODE",
            Self::NaturalQuery => " IN NATURAL LANGUAGE MODE WITH QUERY EXPANSION",
            Self::Boolean => " IN BOOLEAN MODE",
            Self::Query => " WITH QUERY EXPANSION",
        }
    }
}

/// `GROUP BY` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupBy {
    /// A single column.
    Column(String),
    /// Multiple columns.
    Columns(Vec<String>),
    /// A raw expression.
    Raw(Raw),
}

impl From<&str> for GroupBy {
    fn from(s: &str) -> Self {
        Self::Column(s.to_string())
    }
}

impl From<Vec<&str>> for GroupBy {
    fn from(columns: Vec<&str>) -> Self {
        Self::Columns(columns.into_iter().map(str::to_string).collect())
    }
}

impl From<Raw> for GroupBy {
    fn from(raw: Raw) -> Self {
        Self::Raw(raw)
    }
}

/// `HAVING` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Having {
    /// A condition map, compiled like `WHERE`.
    Map(CondMap),
    /// A raw expression.
    Raw(Raw),
}

impl From<CondMap> for Having {
    fn from(map: CondMap) -> Self {
        Self::Map(map)
    }
}

impl From<Raw> for Having {
    fn from(raw: Raw) -> Self {
        Self::Raw(raw)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDir {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl OrderDir {
    /// SQL keyword.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One entry of an `ORDER BY` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderItem {
    /// A column with an optional explicit direction.
    Column {
        /// Column spec.
        column: String,
        /// Direction, or backend default when absent.
        dir: Option<OrderDir>,
    },
    /// Custom ordering by value list: `FIELD(column, v1, v2, ...)`.
    Field {
        /// Column spec.
        column: String,
        /// Values in the desired order.
        values: Vec<Value>,
    },
}

/// `ORDER BY` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderBy {
    /// One or more ordering entries.
    List(Vec<OrderItem>),
    /// A raw expression.
    Raw(Raw),
}

impl From<&str> for OrderBy {
    /// A bare column, optionally suffixed with ` ASC`/` DESC`.
    fn from(s: &str) -> Self {
        let trimmed = s.trim();
        let (column, dir) = match trimmed.rsplit_once(char::is_whitespace) {
            Some((column, tail)) if tail.eq_ignore_ascii_case("asc") => {
                (column.trim_end(), Some(OrderDir::Asc))
            }
            Some((column, tail)) if tail.eq_ignore_ascii_case("desc") => {
                (column.trim_end(), Some(OrderDir::Desc))
            }
            _ => (trimmed, None),
        };
        Self::List(vec![OrderItem::Column {
            column: column.to_string(),
            dir,
        }])
    }
}

impl From<Vec<OrderItem>> for OrderBy {
    fn from(items: Vec<OrderItem>) -> Self {
        Self::List(items)
    }
}

impl From<Raw> for OrderBy {
    fn from(raw: Raw) -> Self {
        Self::Raw(raw)
    }
}

/// `LIMIT` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// Row count only.
    Count(u64),
    /// Offset and row count.
    OffsetCount(u64, u64),
}

impl Limit {
    /// Parse `"100"` or `"20, 100"`.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.splitn(2, ',');
        let first = parts
            .next()
            .map(str::trim)
            .unwrap_or_default()
            .parse::<u64>()
            .map_err(|_| Error::invalid(format!("cannot parse limit '{s}'")))?;
        match parts.next() {
            None => Ok(Self::Count(first)),
            Some(second) => {
                let count = second
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| Error::invalid(format!("cannot parse limit '{s}'")))?;
                Ok(Self::OffsetCount(first, count))
            }
        }
    }
}

impl From<u64> for Limit {
    fn from(count: u64) -> Self {
        Self::Count(count)
    }
}

impl From<(u64, u64)> for Limit {
    fn from((offset, count): (u64, u64)) -> Self {
        Self::OffsetCount(offset, count)
    }
}

impl TryFrom<&str> for Limit {
    type Error = crate::error::Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Limit {
    type Error = crate::error::Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

/// The full filter side of a read or write operation: conditions plus
/// the trailing clauses that ride along with them.
///
/// Clause order in generated SQL is fixed: `WHERE`, `MATCH`, `GROUP BY`,
/// `HAVING`, `ORDER BY`, `LIMIT`, `FOR UPDATE`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    /// The condition map compiled into `WHERE`.
    pub conditions: CondMap,
    /// Optional full-text search clause.
    pub match_against: Option<MatchAgainst>,
    /// Optional `GROUP BY`.
    pub group: Option<GroupBy>,
    /// Optional `HAVING`.
    pub having: Option<Having>,
    /// Optional `ORDER BY`.
    pub order: Option<OrderBy>,
    /// Optional `LIMIT`.
    pub limit: Option<Limit>,
    /// Append `FOR UPDATE` on dialects that support row locks.
    pub for_update: bool,
}

impl WhereClause {
    /// Empty clause set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one condition entry.
    pub fn and(mut self, key: impl Into<String>, value: impl Into<CondValue>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    /// Set the full-text search clause.
    pub fn match_against(mut self, clause: MatchAgainst) -> Self {
        self.match_against = Some(clause);
        self
    }

    /// Set `GROUP BY`.
    pub fn group(mut self, group: impl Into<GroupBy>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Set `HAVING`.
    pub fn having(mut self, having: impl Into<Having>) -> Self {
        self.having = Some(having.into());
        self
    }

    /// Set `ORDER BY`.
    pub fn order(mut self, order: impl Into<OrderBy>) -> Self {
        self.order = Some(order.into());
        self
    }

    /// Set `LIMIT`.
    pub fn limit(mut self, limit: impl Into<Limit>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    /// Request `FOR UPDATE` row locking.
    pub fn lock(mut self) -> Self {
        self.for_update = true;
        self
    }

    /// Whether nothing at all was set.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
            && self.match_against.is_none()
            && self.group.is_none()
            && self.having.is_none()
            && self.order.is_none()
            && self.limit.is_none()
            && !self.for_update
    }
}

impl From<CondMap> for WhereClause {
    fn from(conditions: CondMap) -> Self {
        Self {
            conditions,
            ..Self::default()
        }
    }
}

/// Relation description of one join, keyed by `"[>]table(alias)"`.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinRelation {
    /// `USING (column)`.
    Column(String),
    /// `USING (c1, c2, ...)`.
    Columns(Vec<String>),
    /// `ON` equality pairs: local column (or `table.column`) to joined
    /// table column.
    On(IndexMap<String, String>),
    /// `ON` pairs plus extra conditions ANDed in.
    OnWith {
        /// Equality pairs as in [`JoinRelation::On`].
        pairs: IndexMap<String, String>,
        /// Additional conditions, compiled like `WHERE`.
        and: CondMap,
    },
    /// A raw `ON` expression.
    Raw(Raw),
}

/// Ordered join set, keyed by `"[>]table(alias)"` join specs.
pub type JoinMap = IndexMap<String, JoinRelation>;

/// Value side of one write (insert/update) entry.
#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    /// A bound scalar.
    Value(Value),
    /// A raw expression, spliced verbatim.
    Raw(Raw),
}

/// Ordered write map; keys are column names with optional bracketed
/// tags: `"visits[+]"` for arithmetic, `"profile[JSON]"` for
/// serialization.
pub type DataMap = IndexMap<String, SetValue>;

/// Substitution pairs for string replacement updates: each column maps
/// to a list of `(search, replacement)` swaps.
pub type ReplacePairs = IndexMap<String, Vec<(Value, Value)>>;

impl From<Value> for SetValue {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<bool> for SetValue {
    fn from(v: bool) -> Self {
        Self::Value(Value::Bool(v))
    }
}

impl From<i32> for SetValue {
    fn from(v: i32) -> Self {
        Self::Value(Value::Int(i64::from(v)))
    }
}

impl From<i64> for SetValue {
    fn from(v: i64) -> Self {
        Self::Value(Value::Int(v))
    }
}

impl From<f64> for SetValue {
    fn from(v: f64) -> Self {
        Self::Value(Value::Float(v))
    }
}

impl From<&str> for SetValue {
    fn from(v: &str) -> Self {
        Self::Value(Value::Str(v.to_string()))
    }
}

impl From<String> for SetValue {
    fn from(v: String) -> Self {
        Self::Value(Value::Str(v))
    }
}

impl From<JsonValue> for SetValue {
    fn from(v: JsonValue) -> Self {
        Self::Value(Value::Json(v))
    }
}

impl From<Raw> for SetValue {
    fn from(v: Raw) -> Self {
        Self::Raw(v)
    }
}

/// Select-list function applied by aggregate operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    /// `COUNT(...)`.
    Count,
    /// `AVG(...)`.
    Avg,
    /// `MAX(...)`.
    Max,
    /// `MIN(...)`.
    Min,
    /// `SUM(...)`.
    Sum,
    /// Existence probe; the select list collapses to `1`.
    Exists,
    /// A raw select list expression.
    Raw(Raw),
}

impl Aggregate {
    /// SQL function name, for the variants that wrap the column list.
    pub fn function(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Avg => "AVG",
            Self::Max => "MAX",
            Self::Min => "MIN",
            Self::Sum => "SUM",
            Self::Exists => "EXISTS",
            Self::Raw(_) => "",
        }
    }
}

/// One column in a `CREATE TABLE` definition.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDef {
    /// A full definition line, spliced verbatim with `<name>` markers
    /// rewritten to quoted identifiers.
    Inline(String),
    /// A named column with its definition parts.
    Def {
        /// Column name.
        name: String,
        /// Definition parts, joined with spaces (`["INT", "NOT NULL"]`).
        parts: Vec<String>,
    },
}

impl ColumnDef {
    /// Shorthand for [`ColumnDef::Def`].
    pub fn new(name: impl Into<String>, parts: &[&str]) -> Self {
        Self::Def {
            name: name.into(),
            parts: parts.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Trailing options of a `CREATE TABLE` statement.
#[derive(Debug, Clone, PartialEq)]
pub enum TableOptions {
    /// Key/value pairs rendered as `KEY = value`.
    Pairs(Vec<(String, String)>),
    /// A raw trailing clause.
    Raw(String),
}
