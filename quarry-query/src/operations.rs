//! Table-level operations on a [`Driver`]: reads that decode into JSON,
//! writes built from [`DataMap`]s, and schema statements.
//!
//! Every operation compiles to a parameterized statement, runs it
//! through the retrying executor, and returns `Ok(None)` in debug mode
//! (the rendered statement is available via
//! [`Driver::query_string`]).

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::compiler::ColumnMap;
use crate::decode::decode_rows;
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::raw::Raw;
use crate::types::{
    Aggregate, ColumnDef, DataMap, Fields, JoinMap, Limit, OrderBy, ReplacePairs, SetValue,
    TableOptions, WhereClause,
};
use crate::value::{ParamMap, Value};

/// Tag suffix on a write-map key: `"profile[JSON]"`, `"visits[+]"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteTag {
    Plain,
    Json,
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl WriteTag {
    fn operator(self) -> Option<char> {
        match self {
            Self::Add => Some('+'),
            Self::Subtract => Some('-'),
            Self::Multiply => Some('*'),
            Self::Divide => Some('/'),
            _ => None,
        }
    }
}

fn parse_write_key(key: &str) -> Result<(&str, WriteTag)> {
    let Some(open) = key.find('[') else {
        return Ok((key, WriteTag::Plain));
    };
    if !key.ends_with(']') {
        return Err(Error::invalid(format!("malformed column key '{key}'")));
    }
    let name = &key[..open];
    let tag = match &key[open..] {
        "[JSON]" => WriteTag::Json,
        "[+]" => WriteTag::Add,
        "[-]" => WriteTag::Subtract,
        "[*]" => WriteTag::Multiply,
        "[/]" => WriteTag::Divide,
        other => {
            return Err(Error::invalid(format!(
                "unknown column key tag '{other}' in '{key}'"
            )));
        }
    };
    Ok((name, tag))
}

fn serialize_json(name: &str, value: &Value) -> Result<Value> {
    let text = serde_json::to_string(&value.clone().into_json())
        .map_err(|e| Error::invalid(format!("cannot serialize '{name}' as JSON: {e}")))?;
    Ok(Value::Str(text))
}

impl Driver {
    /// Fetch rows, decoded according to the selection shape.
    pub fn select(
        &mut self,
        table: &str,
        join: &JoinMap,
        fields: &Fields,
        clause: &WhereClause,
    ) -> Result<Option<JsonValue>> {
        let mut map = ParamMap::new();
        let mut cmap = ColumnMap::new();
        let sql = self
            .compiler
            .select_context(table, join, fields, clause, None, &mut map, &mut cmap)?;
        match self.exec_query(&sql, &map)? {
            Some(rows) => decode_rows(rows, fields, &cmap).map(Some),
            None => Ok(None),
        }
    }

    /// Fetch a single record; the selection shape's first entry.
    pub fn get(
        &mut self,
        table: &str,
        join: &JoinMap,
        fields: &Fields,
        clause: &WhereClause,
    ) -> Result<Option<JsonValue>> {
        let mut clause = clause.clone();
        clause.limit = Some(Limit::Count(1));
        Ok(self.select(table, join, fields, &clause)?.and_then(|v| {
            match v {
                JsonValue::Array(items) => items.into_iter().next(),
                JsonValue::Object(entries) => entries.into_iter().next().map(|(_, v)| v),
                other => Some(other),
            }
        }))
    }

    /// Whether any row matches; `SELECT EXISTS(...)` probe.
    pub fn has(&mut self, table: &str, join: &JoinMap, clause: &WhereClause) -> Result<Option<bool>> {
        let mut map = ParamMap::new();
        let mut cmap = ColumnMap::new();
        let inner = self.compiler.select_context(
            table,
            join,
            &Fields::All,
            clause,
            Some(&Aggregate::Exists),
            &mut map,
            &mut cmap,
        )?;
        let sql = format!("SELECT EXISTS({inner})");
        Ok(self.exec_query(&sql, &map)?.map(|rows| {
            rows.first()
                .and_then(|row| row.values().next())
                .and_then(Value::as_bool)
                .unwrap_or(false)
        }))
    }

    /// Fetch rows in random order.
    pub fn rand(
        &mut self,
        table: &str,
        join: &JoinMap,
        fields: &Fields,
        clause: &WhereClause,
    ) -> Result<Option<JsonValue>> {
        let mut clause = clause.clone();
        clause.order = Some(OrderBy::Raw(Raw::new(self.dialect().random_fn())));
        self.select(table, join, fields, &clause)
    }

    /// Run an aggregate over the selection; the first column of the
    /// first row.
    pub fn aggregate(
        &mut self,
        table: &str,
        join: &JoinMap,
        agg: &Aggregate,
        fields: &Fields,
        clause: &WhereClause,
    ) -> Result<Option<Value>> {
        let mut map = ParamMap::new();
        let mut cmap = ColumnMap::new();
        let sql = self
            .compiler
            .select_context(table, join, fields, clause, Some(agg), &mut map, &mut cmap)?;
        Ok(self.exec_query(&sql, &map)?.and_then(|rows| {
            rows.into_iter()
                .next()
                .and_then(|row| row.into_iter().next().map(|(_, value)| value))
        }))
    }

    /// Insert one or more rows. The column list is the union of keys
    /// across all rows, in first-seen order; missing values bind NULL.
    pub fn insert(&mut self, table: &str, data: &[DataMap]) -> Result<Option<u64>> {
        if data.is_empty() {
            return Err(Error::invalid("insert requires at least one row"));
        }

        let mut keys: Vec<&str> = Vec::new();
        for row in data {
            for key in row.keys() {
                if !keys.contains(&key.as_str()) {
                    keys.push(key.as_str());
                }
            }
        }

        let mut map = ParamMap::new();
        let mut columns = Vec::with_capacity(keys.len());
        for key in &keys {
            let (name, tag) = parse_write_key(key)?;
            if tag.operator().is_some() {
                return Err(Error::invalid(format!(
                    "arithmetic tag is not valid in an insert key: '{key}'"
                )));
            }
            columns.push(self.compiler.column_quote(name)?);
        }

        let mut tuples = Vec::with_capacity(data.len());
        for row in data {
            let mut values = Vec::with_capacity(keys.len());
            for key in &keys {
                let (name, tag) = parse_write_key(key)?;
                match row.get(*key) {
                    None | Some(SetValue::Value(Value::Null)) => {
                        let mk = self.compiler.map_key();
                        map.bind(mk.clone(), Value::Null);
                        values.push(mk);
                    }
                    Some(SetValue::Raw(raw)) => values.push(self.compiler.build_raw(raw, &mut map)?),
                    Some(SetValue::Value(value)) => {
                        let bound = if tag == WriteTag::Json {
                            serialize_json(name, value)?
                        } else {
                            value.clone()
                        };
                        let mk = self.compiler.map_key();
                        map.bind(mk.clone(), bound);
                        values.push(mk);
                    }
                }
            }
            tuples.push(format!("({})", values.join(", ")));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.compiler.table_quote(table)?,
            columns.join(", "),
            tuples.join(", ")
        );
        debug!(table, rows = data.len(), "insert");
        self.exec(&sql, &map)
    }

    /// Update matching rows. Arithmetic tags (`[+]` `[-]` `[*]` `[/]`)
    /// compile to `col = col <op> n` and require a numeric value.
    pub fn update(
        &mut self,
        table: &str,
        data: &DataMap,
        clause: &WhereClause,
    ) -> Result<Option<u64>> {
        if data.is_empty() {
            return Err(Error::invalid("update requires at least one assignment"));
        }

        let mut map = ParamMap::new();
        let mut fields = Vec::with_capacity(data.len());
        for (key, value) in data {
            let (name, tag) = parse_write_key(key)?;
            let column = self.compiler.column_quote(name)?;
            if let Some(op) = tag.operator() {
                let SetValue::Value(value) = value else {
                    return Err(Error::invalid(format!(
                        "arithmetic tag on '{key}' requires a numeric value"
                    )));
                };
                match value {
                    Value::Int(n) => fields.push(format!("{column} = {column} {op} {n}")),
                    Value::Float(n) => fields.push(format!("{column} = {column} {op} {n}")),
                    _ => {
                        return Err(Error::invalid(format!(
                            "arithmetic tag on '{key}' requires a numeric value"
                        )));
                    }
                }
                continue;
            }
            match value {
                SetValue::Raw(raw) => {
                    let expr = self.compiler.build_raw(raw, &mut map)?;
                    fields.push(format!("{column} = {expr}"));
                }
                SetValue::Value(value) => {
                    let bound = if tag == WriteTag::Json {
                        serialize_json(name, value)?
                    } else {
                        value.clone()
                    };
                    let mk = self.compiler.map_key();
                    map.bind(mk.clone(), bound);
                    fields.push(format!("{column} = {mk}"));
                }
            }
        }

        let where_sql = self.compiler.where_clause(clause, &mut map)?;
        let sql = format!(
            "UPDATE {} SET {}{}",
            self.compiler.table_quote(table)?,
            fields.join(", "),
            where_sql
        );
        self.exec(&sql, &map)
    }

    /// Delete matching rows.
    pub fn delete(&mut self, table: &str, clause: &WhereClause) -> Result<Option<u64>> {
        let mut map = ParamMap::new();
        let where_sql = self.compiler.where_clause(clause, &mut map)?;
        let sql = format!(
            "DELETE FROM {}{}",
            self.compiler.table_quote(table)?,
            where_sql
        );
        self.exec(&sql, &map)
    }

    /// Substring substitution update: each pair compiles to
    /// `col = REPLACE(col, search, replacement)`.
    pub fn replace(
        &mut self,
        table: &str,
        pairs: &ReplacePairs,
        clause: &WhereClause,
    ) -> Result<Option<u64>> {
        let mut map = ParamMap::new();
        let mut fields = Vec::new();
        for (column, swaps) in pairs {
            let quoted = self.compiler.column_quote(column)?;
            for (search, replacement) in swaps {
                let base = self.compiler.map_key();
                let key_a = format!("{base}a");
                let key_b = format!("{base}b");
                map.bind(key_a.clone(), search.clone());
                map.bind(key_b.clone(), replacement.clone());
                fields.push(format!("{quoted} = REPLACE({quoted}, {key_a}, {key_b})"));
            }
        }
        if fields.is_empty() {
            return Err(Error::invalid("replace requires at least one pair"));
        }

        let where_sql = self.compiler.where_clause(clause, &mut map)?;
        let sql = format!(
            "UPDATE {} SET {}{}",
            self.compiler.table_quote(table)?,
            fields.join(", "),
            where_sql
        );
        self.exec(&sql, &map)
    }

    /// Create a table if it does not exist. Inline definitions may use
    /// `<name>` markers for quoted identifiers.
    pub fn create(
        &mut self,
        table: &str,
        columns: &[ColumnDef],
        options: Option<&TableOptions>,
    ) -> Result<Option<u64>> {
        if columns.is_empty() {
            return Err(Error::invalid("create requires at least one column"));
        }

        let mut map = ParamMap::new();
        let mut defs = Vec::with_capacity(columns.len());
        for column in columns {
            match column {
                ColumnDef::Inline(text) => {
                    defs.push(self.compiler.build_raw(&Raw::new(text.clone()), &mut map)?);
                }
                ColumnDef::Def { name, parts } => {
                    defs.push(format!(
                        "{} {}",
                        self.compiler.column_quote(name)?,
                        parts.join(" ")
                    ));
                }
            }
        }

        let trailer = match options {
            None => String::new(),
            Some(TableOptions::Raw(text)) => format!(" {text}"),
            Some(TableOptions::Pairs(pairs)) => {
                let rendered: Vec<String> =
                    pairs.iter().map(|(k, v)| format!("{k} = {v}")).collect();
                format!(" {}", rendered.join(", "))
            }
        };

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({}){}",
            self.compiler.table_quote(table)?,
            defs.join(", "),
            trailer
        );
        self.exec(&sql, &map)
    }

    /// Drop a table if it exists.
    pub fn drop_table(&mut self, table: &str) -> Result<Option<u64>> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.compiler.table_quote(table)?);
        self.exec(&sql, &ParamMap::new())
    }
}
