//! The expression compiler: structured clause descriptions in,
//! dialect-correct SQL text plus a bound parameter map out.
//!
//! [`SqlCompiler`] is owned by a `Driver` and carries the three pieces
//! of state compilation needs: the dialect rules, the table prefix, and
//! a monotonically increasing counter that names generated placeholders
//! (`:qx0x`, `:qx1x`, ...). The counter is never reset, so placeholder
//! names stay unique across every statement a driver compiles.
//!
//! Submodules split the work the way the clauses do: `conditions` for
//! the recursive WHERE compiler, `columns` for select lists and the
//! decode map, `joins` for the join mini-language.

mod columns;
mod conditions;
mod joins;

pub use columns::{ColumnEntry, ColumnMap};

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::raw::{Raw, splice_markers};
use crate::types::{
    Aggregate, ColumnType, Fields, GroupBy, Having, JoinMap, Limit, OrderBy, OrderItem,
    WhereClause,
};
use crate::value::{Param, ParamKind, ParamMap, Value};

/// Compiles structured clause descriptions into SQL for one dialect.
#[derive(Debug, Clone)]
pub struct SqlCompiler {
    dialect: Dialect,
    prefix: String,
    guid: u64,
}

impl SqlCompiler {
    /// Create a compiler for a dialect with a table prefix.
    pub fn new(dialect: Dialect, prefix: impl Into<String>) -> Self {
        Self {
            dialect,
            prefix: prefix.into(),
            guid: 0,
        }
    }

    /// The dialect this compiler targets.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Allocate the next generated placeholder name.
    pub(crate) fn map_key(&mut self) -> String {
        let key = format!(":qx{}x", self.guid);
        self.guid += 1;
        key
    }

    /// Quote a table name, applying the configured prefix.
    pub fn table_quote(&self, table: &str) -> Result<String> {
        if !valid_segment(table) {
            return Err(Error::invalid(format!("incorrect table name: {table}")));
        }
        Ok(self
            .dialect
            .quote_ident(&format!("{}{}", self.prefix, table)))
    }

    /// Quote a column reference, which may be `table.column`.
    ///
    /// The prefix applies to the table part only; a bare column is
    /// quoted as-is.
    pub fn column_quote(&self, column: &str) -> Result<String> {
        match column.split_once('.') {
            None => {
                if !valid_segment(column) {
                    return Err(Error::invalid(format!("incorrect column name: {column}")));
                }
                Ok(self.dialect.quote_ident(column))
            }
            Some((table, col)) => {
                if !valid_segment(table) || !valid_segment(col) {
                    return Err(Error::invalid(format!("incorrect column name: {column}")));
                }
                Ok(format!(
                    "{}.{}",
                    self.dialect.quote_ident(&format!("{}{}", self.prefix, table)),
                    self.dialect.quote_ident(col)
                ))
            }
        }
    }

    /// Splice a raw fragment: rewrite `<ident>` markers and merge the
    /// fragment's named parameters into `map`.
    pub fn build_raw(&self, raw: &Raw, map: &mut ParamMap) -> Result<String> {
        let text = splice_markers(raw.text(), |ident, is_table| {
            if is_table {
                self.table_quote(ident)
            } else {
                self.column_quote(ident)
            }
        })?;
        for (key, value) in raw.params() {
            map.bind_user(key, value.clone())?;
        }
        Ok(text)
    }

    /// Compile the full filter side of a statement.
    ///
    /// Emits clauses in fixed order: `WHERE`, `MATCH`, `GROUP BY`,
    /// `HAVING`, `ORDER BY`, `LIMIT`, `FOR UPDATE`. The result starts
    /// with a space, or is empty when nothing was set.
    pub fn where_clause(&mut self, clause: &WhereClause, map: &mut ParamMap) -> Result<String> {
        let mut sql = String::new();

        if !clause.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.cond_map(&clause.conditions, "AND", map)?);
        }

        if let Some(against) = &clause.match_against {
            if self.dialect.supports_match() {
                let columns = against
                    .columns
                    .iter()
                    .map(|c| self.column_quote(c))
                    .collect::<Result<Vec<_>>>()?
                    .join(", ");
                let key = self.map_key();
                map.bind(key.clone(), Value::Str(against.keyword.clone()));
                let mode = against.mode.map(|m| m.as_sql()).unwrap_or_default();
                if sql.is_empty() {
                    sql.push_str(" WHERE");
                } else {
                    sql.push_str(" AND");
                }
                sql.push_str(&format!(" MATCH ({columns}) AGAINST ({key}{mode})"));
            }
        }

        if let Some(group) = &clause.group {
            sql.push_str(" GROUP BY ");
            match group {
                GroupBy::Column(column) => sql.push_str(&self.column_quote(column)?),
                GroupBy::Columns(columns) => {
                    let quoted = columns
                        .iter()
                        .map(|c| self.column_quote(c))
                        .collect::<Result<Vec<_>>>()?;
                    sql.push_str(&quoted.join(","));
                }
                GroupBy::Raw(raw) => sql.push_str(&self.build_raw(raw, map)?),
            }
        }

        if let Some(having) = &clause.having {
            sql.push_str(" HAVING ");
            match having {
                Having::Map(conditions) => {
                    sql.push_str(&self.cond_map(conditions, "AND", map)?);
                }
                Having::Raw(raw) => sql.push_str(&self.build_raw(raw, map)?),
            }
        }

        if let Some(order) = &clause.order {
            sql.push_str(" ORDER BY ");
            match order {
                OrderBy::List(items) => {
                    let mut parts = Vec::with_capacity(items.len());
                    for item in items {
                        parts.push(self.order_item(item)?);
                    }
                    sql.push_str(&parts.join(","));
                }
                OrderBy::Raw(raw) => sql.push_str(&self.build_raw(raw, map)?),
            }
        }

        if let Some(limit) = &clause.limit {
            match limit {
                Limit::Count(count) => sql.push_str(&format!(" LIMIT {count}")),
                Limit::OffsetCount(offset, count) => {
                    sql.push_str(&format!(" LIMIT {count} OFFSET {offset}"));
                }
            }
        }

        if clause.for_update && self.dialect.supports_row_lock() {
            sql.push_str(" FOR UPDATE");
        }

        Ok(sql)
    }

    fn order_item(&self, item: &OrderItem) -> Result<String> {
        match item {
            OrderItem::Column { column, dir } => {
                let quoted = self.column_quote(column)?;
                Ok(match dir {
                    Some(dir) => format!("{quoted} {}", dir.as_sql()),
                    None => quoted,
                })
            }
            OrderItem::Field { column, values } => {
                // Values are rendered inline: FIELD() defines a fixed
                // ranking, integers stay bare and text gets quoted.
                let rendered = values
                    .iter()
                    .map(|v| match v {
                        Value::Int(i) => i.to_string(),
                        other => self.dialect.quote_string(&other.to_plain_string()),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                Ok(format!("FIELD({}, {rendered})", self.column_quote(column)?))
            }
        }
    }

    /// Compile a full `SELECT` statement.
    ///
    /// `table` may carry an alias as `"name(alias)"`. When `aggregate`
    /// is set the select list becomes the aggregate expression; plain
    /// selections also record their decode entries into `column_map`.
    pub fn select_context(
        &mut self,
        table: &str,
        join: &JoinMap,
        fields: &Fields,
        clause: &WhereClause,
        aggregate: Option<&Aggregate>,
        map: &mut ParamMap,
        column_map: &mut ColumnMap,
    ) -> Result<String> {
        let (table_query, parent) = self.table_query(table)?;
        let is_join = !join.is_empty();
        let table_query = if is_join {
            format!("{table_query} {}", self.build_join(&parent, join, map)?)
        } else {
            table_query
        };

        let select_list = match aggregate {
            Some(Aggregate::Exists) => "1".to_string(),
            Some(Aggregate::Raw(raw)) => self.build_raw(raw, map)?,
            Some(agg) => {
                let inner = self.column_push(fields, map, true, is_join, column_map)?;
                format!("{}({inner})", agg.function())
            }
            None => self.column_push(fields, map, true, is_join, column_map)?,
        };

        Ok(format!(
            "SELECT {select_list} FROM {table_query}{}",
            self.where_clause(clause, map)?
        ))
    }

    /// Quote `"name"` or `"name(alias)"` into a FROM clause fragment,
    /// returning the fragment and the quoted name joins should refer to.
    fn table_query(&self, table: &str) -> Result<(String, String)> {
        match split_alias(table) {
            Some((name, alias)) => {
                let quoted = self.table_quote(name)?;
                let alias = self.table_quote(alias)?;
                Ok((format!("{quoted} AS {alias}"), alias))
            }
            None => {
                let quoted = self.table_quote(table.trim())?;
                Ok((quoted.clone(), quoted))
            }
        }
    }

    /// Render an executable statement with parameters substituted in.
    ///
    /// Used for debug mode and the execution log; bound text is quoted
    /// with the dialect's string rules, blobs become `{LOB_DATA}`.
    pub fn generate(&self, statement: &str, map: &ParamMap) -> String {
        let mut keys: Vec<&String> = map.iter().map(|(k, _)| k).collect();
        // Longer keys first so a key that prefixes another never
        // clobbers it.
        keys.sort_by_key(|k| std::cmp::Reverse(k.len()));

        let mut out = statement.to_string();
        for key in keys {
            let Some(param) = map.get(key) else { continue };
            let rendered = self.render_param(param);
            out = out.replace(key.as_str(), &rendered);
        }
        out
    }

    fn render_param(&self, param: &Param) -> String {
        match param.kind {
            ParamKind::Null => "NULL".to_string(),
            ParamKind::Lob => "{LOB_DATA}".to_string(),
            ParamKind::Str => self.dialect.quote_string(&param.value.to_plain_string()),
            ParamKind::Int | ParamKind::Bool => param.value.to_plain_string(),
        }
    }
}

/// Validate one identifier segment: a letter or underscore, then
/// letters, digits or `@ $ # - _`.
pub(crate) fn valid_segment(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '@' | '$' | '#' | '-' | '_'))
}

/// Split `"name(alias)"` into its parts, tolerating whitespace.
pub(crate) fn split_alias(spec: &str) -> Option<(&str, &str)> {
    let open = spec.find('(')?;
    let close = spec.rfind(')')?;
    if close <= open {
        return None;
    }
    Some((spec[..open].trim(), spec[open + 1..close].trim()))
}

/// Parsed pieces of a column spec string like
/// `"@account.name(nickname)[String]"`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColumnSpec<'a> {
    pub distinct: bool,
    pub column: &'a str,
    pub alias: Option<&'a str>,
    pub ty: Option<ColumnType>,
}

impl ColumnSpec<'_> {
    /// The decode key this column lands under: the alias when present,
    /// otherwise the column name without its table part.
    pub fn output_key(&self) -> &str {
        match self.alias {
            Some(alias) => alias,
            None => self
                .column
                .split_once('.')
                .map(|(_, col)| col)
                .unwrap_or(self.column),
        }
    }
}

/// Parse a column spec string: optional leading `@` (distinct), the
/// column, an optional `(alias)` and an optional `[Type]` tag.
pub(crate) fn parse_column_spec(spec: &str) -> Result<ColumnSpec<'_>> {
    let mut rest = spec.trim();
    let distinct = rest.starts_with('@');
    if distinct {
        rest = rest[1..].trim_start();
    }

    let mut ty = None;
    if let Some(open) = rest.find('[') {
        let close = rest
            .rfind(']')
            .ok_or_else(|| Error::invalid(format!("unterminated type tag in '{spec}'")))?;
        let tag = &rest[open + 1..close];
        ty = Some(
            ColumnType::parse(tag)
                .ok_or_else(|| Error::invalid(format!("unknown column type '{tag}'")))?,
        );
        rest = rest[..open].trim_end();
    }

    let (column, alias) = match split_alias(rest) {
        Some((column, alias)) => (column, Some(alias)),
        None => (rest.trim(), None),
    };

    if column.is_empty() {
        return Err(Error::invalid(format!("empty column in spec '{spec}'")));
    }

    Ok(ColumnSpec {
        distinct,
        column,
        alias,
        ty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiler() -> SqlCompiler {
        SqlCompiler::new(Dialect::Sqlite, "")
    }

    #[test]
    fn map_keys_are_sequential_and_reserved() {
        let mut c = compiler();
        assert_eq!(c.map_key(), ":qx0x");
        assert_eq!(c.map_key(), ":qx1x");
        assert_eq!(c.map_key(), ":qx2x");
    }

    #[test]
    fn table_quote_applies_prefix() {
        let c = SqlCompiler::new(Dialect::Mysql, "t_");
        assert_eq!(c.table_quote("account").unwrap(), "`t_account`");
        assert!(c.table_quote("bad name").is_err());
        assert!(c.table_quote("1st").is_err());
    }

    #[test]
    fn column_quote_prefixes_table_part_only() {
        let c = SqlCompiler::new(Dialect::Mysql, "t_");
        assert_eq!(c.column_quote("name").unwrap(), "`name`");
        assert_eq!(c.column_quote("account.name").unwrap(), "`t_account`.`name`");
        assert!(c.column_quote("a.b.c").is_err());
    }

    #[test]
    fn parse_column_spec_full_form() {
        let spec = parse_column_spec("@account.nickname (name) [String]").unwrap();
        assert!(spec.distinct);
        assert_eq!(spec.column, "account.nickname");
        assert_eq!(spec.alias, Some("name"));
        assert_eq!(spec.ty, Some(ColumnType::Str));
        assert_eq!(spec.output_key(), "name");
    }

    #[test]
    fn parse_column_spec_bare() {
        let spec = parse_column_spec("age").unwrap();
        assert!(!spec.distinct);
        assert_eq!(spec.column, "age");
        assert_eq!(spec.alias, None);
        assert_eq!(spec.ty, None);
        assert_eq!(spec.output_key(), "age");
    }

    #[test]
    fn parse_column_spec_rejects_unknown_type() {
        assert!(parse_column_spec("age[Decimal]").is_err());
    }

    #[test]
    fn generate_substitutes_typed_literals() {
        let mut c = compiler();
        let mut map = ParamMap::new();
        let k0 = c.map_key();
        let k1 = c.map_key();
        let k2 = c.map_key();
        map.bind(k0.clone(), Value::Int(18));
        map.bind(k1.clone(), Value::Str("o'brien".to_string()));
        map.bind(k2.clone(), Value::Null);
        let sql = format!("SELECT * FROM \"t\" WHERE \"a\" > {k0} AND \"n\" = {k1} AND \"x\" IS {k2}");
        assert_eq!(
            c.generate(&sql, &map),
            "SELECT * FROM \"t\" WHERE \"a\" > 18 AND \"n\" = 'o''brien' AND \"x\" IS NULL"
        );
    }

    #[test]
    fn generate_prefix_keys_do_not_clobber() {
        let c = compiler();
        let mut map = ParamMap::new();
        map.bind(":qx1x".to_string(), Value::Int(1));
        map.bind(":qx1xa".to_string(), Value::Int(2));
        assert_eq!(c.generate("(:qx1x, :qx1xa)", &map), "(1, 2)");
    }

    #[test]
    fn where_clause_emits_fixed_order() {
        let mut c = compiler();
        let mut map = ParamMap::new();
        let clause = WhereClause::new()
            .and("type", "vip")
            .group("city")
            .order("age DESC")
            .limit((20u64, 10u64));
        let sql = c.where_clause(&clause, &mut map).unwrap();
        assert_eq!(
            sql,
            " WHERE \"type\" = :qx0x GROUP BY \"city\" ORDER BY \"age\" DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn for_update_only_on_locking_dialects() {
        let mut map = ParamMap::new();
        let clause = WhereClause::new().lock();
        let mut sqlite = SqlCompiler::new(Dialect::Sqlite, "");
        assert_eq!(sqlite.where_clause(&clause, &mut map).unwrap(), "");
        let mut mysql = SqlCompiler::new(Dialect::Mysql, "");
        assert_eq!(mysql.where_clause(&clause, &mut map).unwrap(), " FOR UPDATE");
    }

    #[test]
    fn order_by_field_ranking() {
        let mut c = SqlCompiler::new(Dialect::Mysql, "");
        let mut map = ParamMap::new();
        let clause = WhereClause::new().order(OrderBy::List(vec![OrderItem::Field {
            column: "state".to_string(),
            values: vec![Value::Str("new".to_string()), Value::Int(2)],
        }]));
        assert_eq!(
            c.where_clause(&clause, &mut map).unwrap(),
            " ORDER BY FIELD(`state`, 'new',2)"
        );
    }

    #[test]
    fn raw_where_merges_user_params() {
        let c = compiler();
        let mut map = ParamMap::new();
        let fragment = crate::raw::raw("<age> >= :min").bind(":min", 21);
        assert_eq!(c.build_raw(&fragment, &mut map).unwrap(), "\"age\" >= :min");
        assert_eq!(map.get(":min").map(|p| &p.value), Some(&Value::Int(21)));
    }
}
