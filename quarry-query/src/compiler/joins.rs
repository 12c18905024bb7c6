//! Join compilation.
//!
//! Join specs are keyed by a mini-language: `"[>]post(p)"` is a LEFT
//! JOIN of table `post` aliased `p`. Tokens map `>` LEFT, `<` RIGHT,
//! `<>` FULL, `><` INNER.

use super::{SqlCompiler, split_alias};
use crate::error::{Error, Result};
use crate::types::{JoinMap, JoinRelation};
use crate::value::ParamMap;

/// Parsed pieces of a join key.
#[derive(Debug, PartialEq, Eq)]
struct JoinSpec<'a> {
    kind: &'static str,
    table: &'a str,
    alias: Option<&'a str>,
}

fn parse_join_key(key: &str) -> Result<JoinSpec<'_>> {
    let rest = key
        .trim()
        .strip_prefix('[')
        .ok_or_else(|| Error::invalid(format!("join key '{key}' must start with a join token")))?;
    let close = rest
        .find(']')
        .ok_or_else(|| Error::invalid(format!("unterminated join token in '{key}'")))?;
    let kind = match &rest[..close] {
        ">" => "LEFT",
        "<" => "RIGHT",
        "<>" => "FULL",
        "><" => "INNER",
        other => {
            return Err(Error::invalid(format!("unknown join token '[{other}]'")));
        }
    };
    let table_part = rest[close + 1..].trim();
    let (table, alias) = match split_alias(table_part) {
        Some((table, alias)) => (table, Some(alias)),
        None => (table_part, None),
    };
    if table.is_empty() {
        return Err(Error::invalid(format!("missing table in join key '{key}'")));
    }
    Ok(JoinSpec { kind, table, alias })
}

impl SqlCompiler {
    /// Compile a join set. `parent` is the already-quoted name (or
    /// alias) of the table being joined from; unqualified columns on the
    /// left side of `ON` pairs resolve against it.
    pub(crate) fn build_join(
        &mut self,
        parent: &str,
        joins: &JoinMap,
        map: &mut ParamMap,
    ) -> Result<String> {
        let mut parts = Vec::with_capacity(joins.len());

        for (key, relation) in joins {
            let spec = parse_join_key(key)?;
            let joined = self.table_quote(spec.alias.unwrap_or(spec.table))?;

            let relation_sql = match relation {
                JoinRelation::Column(column) => {
                    format!("USING ({})", self.column_quote(column)?)
                }
                JoinRelation::Columns(columns) => {
                    let quoted = columns
                        .iter()
                        .map(|c| self.column_quote(c))
                        .collect::<Result<Vec<_>>>()?;
                    format!("USING ({})", quoted.join(", "))
                }
                JoinRelation::On(pairs) => format!("ON {}", self.on_pairs(parent, &joined, pairs)?),
                JoinRelation::OnWith { pairs, and } => {
                    let mut on = self.on_pairs(parent, &joined, pairs)?;
                    if !and.is_empty() {
                        on.push_str(" AND ");
                        on.push_str(&self.cond_map(and, "AND", map)?);
                    }
                    format!("ON {on}")
                }
                JoinRelation::Raw(raw) => self.build_raw(raw, map)?,
            };

            let mut table_sql = self.table_quote(spec.table)?;
            if let Some(alias) = spec.alias {
                table_sql = format!("{table_sql} AS {}", self.table_quote(alias)?);
            }
            parts.push(format!("{} JOIN {table_sql} {relation_sql}", spec.kind));
        }

        Ok(parts.join(" "))
    }

    fn on_pairs(
        &self,
        parent: &str,
        joined: &str,
        pairs: &indexmap::IndexMap<String, String>,
    ) -> Result<String> {
        let mut out = Vec::with_capacity(pairs.len());
        for (left, right) in pairs {
            let left_sql = if left.contains('.') {
                self.column_quote(left)?
            } else {
                format!("{parent}.{}", self.column_quote(left)?)
            };
            out.push(format!("{left_sql} = {joined}.{}", self.column_quote(right)?));
        }
        Ok(out.join(" AND "))
    }
}
