//! The recursive condition compiler.
//!
//! A condition map entry is `"column[op]" => operand`. Supported
//! operators: `[>] [>=] [<] [<=]` comparisons, `[!]` negation, `[~]` /
//! `[!~]` LIKE, `[<>]` / `[><]` BETWEEN, `[REGEXP]`. `AND`/`OR` keys
//! hold nested maps and may carry a `#comment` suffix so one map can
//! contain several groups. Entries under integer-like keys compare two
//! columns instead of binding a value.

use smallvec::SmallVec;

use super::SqlCompiler;
use crate::error::{Error, Result};
use crate::types::{CondMap, CondValue};
use crate::value::{ParamMap, Value};

/// Bracketed condition operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CondOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Not,
    Like,
    NotLike,
    Between,
    NotBetween,
    Regexp,
}

impl CondOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Gte),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Lte),
            "!" => Some(Self::Not),
            "~" => Some(Self::Like),
            "!~" => Some(Self::NotLike),
            "<>" => Some(Self::Between),
            "><" => Some(Self::NotBetween),
            "REGEXP" => Some(Self::Regexp),
            _ => None,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            _ => "",
        }
    }
}

/// `AND`/`OR` key, optionally suffixed with whitespace and `#comment`.
fn parse_connective(key: &str) -> Option<&'static str> {
    let (word, rest) = match key.find(char::is_whitespace) {
        Some(at) => (&key[..at], key[at..].trim_start()),
        None => (key, ""),
    };
    if !rest.is_empty() && !rest.starts_with('#') {
        return None;
    }
    match word {
        "AND" => Some("AND"),
        "OR" => Some("OR"),
        _ => None,
    }
}

/// Split a condition key into its column and optional operator.
fn parse_cond_key(key: &str) -> Result<(&str, Option<CondOp>)> {
    let key = key.trim();
    match key.find('[') {
        None => Ok((key, None)),
        Some(open) => {
            let close = key[open..]
                .find(']')
                .map(|i| i + open)
                .ok_or_else(|| Error::invalid(format!("unterminated operator in '{key}'")))?;
            let op = &key[open + 1..close];
            let op = CondOp::parse(op)
                .ok_or_else(|| Error::invalid(format!("unknown operator '[{op}]' in '{key}'")))?;
            Ok((key[..open].trim_end(), Some(op)))
        }
    }
}

/// Whether a LIKE operand already contains pattern syntax. Bare text
/// gets auto-wrapped in `%...%`; anything with an unescaped wildcard
/// or a bracket class is taken literally. Escaped wildcards do not
/// count, so `50\%` still wraps.
fn has_like_pattern(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    let mut escaped = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if escaped {
            escaped = false;
            i += 1;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' => {
                // A bracket class needs an unescaped closer with
                // content between.
                let mut j = i + 1;
                let mut inner_escaped = false;
                while j < chars.len() {
                    if inner_escaped {
                        inner_escaped = false;
                    } else if chars[j] == '\\' {
                        inner_escaped = true;
                    } else if chars[j] == ']' && j > i + 1 {
                        return true;
                    }
                    j += 1;
                }
            }
            '*' | '?' | '!' | '%' | '-' | '#' | '^' | '_' => return true,
            _ => {}
        }
        i += 1;
    }
    false
}

impl SqlCompiler {
    /// Compile a condition map joined by `conjunctor` (`AND` or `OR`).
    pub(crate) fn cond_map(
        &mut self,
        data: &CondMap,
        conjunctor: &str,
        map: &mut ParamMap,
    ) -> Result<String> {
        // Most condition maps hold a handful of entries; keep the
        // fragment stack inline.
        let mut stack: SmallVec<[String; 8]> = SmallVec::new();

        for (key, value) in data {
            if let (Some(conn), CondValue::Sub(sub)) = (parse_connective(key), value) {
                stack.push(format!("({})", self.cond_map(sub, conn, map)?));
                continue;
            }

            if key.trim().parse::<u64>().is_ok() {
                stack.push(self.column_compare(key, value)?);
                continue;
            }

            let (column, op) = parse_cond_key(key)?;
            let column = self.column_quote(column)?;

            match op {
                None => stack.push(self.equality(&column, value, map)?),
                Some(op @ (CondOp::Gt | CondOp::Gte | CondOp::Lt | CondOp::Lte)) => {
                    stack.push(self.comparison(&column, op, value, map)?);
                }
                Some(CondOp::Not) => stack.push(self.negation(&column, value, map)?),
                Some(op @ (CondOp::Like | CondOp::NotLike)) => {
                    stack.push(self.like(&column, op == CondOp::NotLike, value, map)?);
                }
                Some(op @ (CondOp::Between | CondOp::NotBetween)) => {
                    stack.push(self.between(&column, op == CondOp::NotBetween, value, map)?);
                }
                Some(CondOp::Regexp) => match value {
                    CondValue::Value(v) => {
                        let key = self.map_key();
                        stack.push(format!("{column} REGEXP {key}"));
                        map.bind(key, v.clone());
                    }
                    _ => return Err(Error::invalid("REGEXP expects a scalar pattern")),
                },
            }
        }

        Ok(stack.join(&format!(" {conjunctor} ")))
    }

    /// Compile an integer-keyed entry: `"colA[op]colB"` compares two
    /// columns without binding anything.
    fn column_compare(&self, key: &str, value: &CondValue) -> Result<String> {
        let CondValue::Value(Value::Str(expr)) = value else {
            return Err(Error::invalid(format!(
                "column comparison under key '{key}' expects a string operand"
            )));
        };
        let open = expr
            .find('[')
            .ok_or_else(|| Error::invalid(format!("missing operator in comparison '{expr}'")))?;
        let close = expr[open..]
            .find(']')
            .map(|i| i + open)
            .ok_or_else(|| Error::invalid(format!("unterminated operator in '{expr}'")))?;
        let op = &expr[open + 1..close];
        if !matches!(op, ">" | ">=" | "<" | "<=" | "=" | "!=") {
            return Err(Error::invalid(format!(
                "operator '[{op}]' cannot compare two columns"
            )));
        }
        let left = self.column_quote(expr[..open].trim())?;
        let right = self.column_quote(expr[close + 1..].trim())?;
        Ok(format!("{left} {op} {right}"))
    }

    fn equality(&mut self, column: &str, value: &CondValue, map: &mut ParamMap) -> Result<String> {
        match value {
            CondValue::Value(Value::Null) => Ok(format!("{column} IS NULL")),
            CondValue::Value(v) => {
                let key = self.map_key();
                map.bind(key.clone(), v.clone());
                Ok(format!("{column} = {key}"))
            }
            CondValue::List(items) => Ok(format!("{column} IN ({})", self.in_list(items, map))),
            CondValue::Raw(raw) => Ok(format!("{column} = {}", self.build_raw(raw, map)?)),
            CondValue::Sub(_) => Err(Error::invalid(
                "nested condition maps must be keyed 'AND' or 'OR'",
            )),
            CondValue::RawRange(..) => {
                Err(Error::invalid("raw ranges are only valid under [<>]/[><]"))
            }
        }
    }

    fn comparison(
        &mut self,
        column: &str,
        op: CondOp,
        value: &CondValue,
        map: &mut ParamMap,
    ) -> Result<String> {
        let symbol = op.symbol();
        match value {
            CondValue::Value(v) => {
                let key = self.map_key();
                map.bind(key.clone(), v.clone());
                Ok(format!("{column} {symbol} {key}"))
            }
            CondValue::Raw(raw) => Ok(format!("{column} {symbol} {}", self.build_raw(raw, map)?)),
            _ => Err(Error::invalid(format!(
                "'{symbol}' expects a scalar or raw operand"
            ))),
        }
    }

    fn negation(&mut self, column: &str, value: &CondValue, map: &mut ParamMap) -> Result<String> {
        match value {
            CondValue::Value(Value::Null) => Ok(format!("{column} IS NOT NULL")),
            CondValue::Value(v) => {
                let key = self.map_key();
                map.bind(key.clone(), v.clone());
                Ok(format!("{column} != {key}"))
            }
            CondValue::List(items) => {
                Ok(format!("{column} NOT IN ({})", self.in_list(items, map)))
            }
            CondValue::Raw(raw) => Ok(format!("{column} != {}", self.build_raw(raw, map)?)),
            _ => Err(Error::invalid("'[!]' expects a scalar, list or raw operand")),
        }
    }

    /// Bind an IN list. An empty list binds nothing and renders as
    /// `(NULL)`, which matches no row instead of producing a syntax
    /// error.
    fn in_list(&mut self, items: &[Value], map: &mut ParamMap) -> String {
        if items.is_empty() {
            return "NULL".to_string();
        }
        let base = self.map_key();
        let mut placeholders = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let key = format!("{base}i{index}");
            map.bind(key.clone(), item.clone());
            placeholders.push(key);
        }
        placeholders.join(", ")
    }

    fn like(
        &mut self,
        column: &str,
        negated: bool,
        value: &CondValue,
        map: &mut ParamMap,
    ) -> Result<String> {
        let (connective, patterns): (&str, Vec<String>) = match value {
            CondValue::Value(v) => ("OR", vec![v.to_plain_string()]),
            CondValue::List(items) => {
                ("OR", items.iter().map(Value::to_plain_string).collect())
            }
            CondValue::Sub(sub) if sub.len() == 1 => {
                let (key, inner) = match sub.first() {
                    Some(entry) => entry,
                    None => return Err(Error::invalid("empty LIKE connective map")),
                };
                let conn = match key.as_str() {
                    "AND" => "AND",
                    "OR" => "OR",
                    other => {
                        return Err(Error::invalid(format!(
                            "LIKE connective must be 'AND' or 'OR', got '{other}'"
                        )));
                    }
                };
                match inner {
                    CondValue::List(items) => {
                        (conn, items.iter().map(Value::to_plain_string).collect())
                    }
                    CondValue::Value(v) => (conn, vec![v.to_plain_string()]),
                    _ => return Err(Error::invalid("LIKE connective expects a pattern list")),
                }
            }
            _ => return Err(Error::invalid("'[~]' expects a pattern or pattern list")),
        };

        let not = if negated { " NOT" } else { "" };
        let base = self.map_key();
        let mut clauses = Vec::with_capacity(patterns.len());
        for (index, pattern) in patterns.into_iter().enumerate() {
            let pattern = if has_like_pattern(&pattern) {
                pattern
            } else {
                format!("%{pattern}%")
            };
            let key = format!("{base}l{index}");
            map.bind(key.clone(), Value::Str(pattern));
            clauses.push(format!("{column}{not} LIKE {key}"));
        }
        Ok(format!("({})", clauses.join(&format!(" {connective} "))))
    }

    fn between(
        &mut self,
        column: &str,
        negated: bool,
        value: &CondValue,
        map: &mut ParamMap,
    ) -> Result<String> {
        let not = if negated { " NOT" } else { "" };
        match value {
            CondValue::List(items) if items.len() == 2 => {
                let base = self.map_key();
                let low = format!("{base}a");
                let high = format!("{base}b");
                map.bind(low.clone(), items[0].clone());
                map.bind(high.clone(), items[1].clone());
                Ok(format!("({column}{not} BETWEEN {low} AND {high})"))
            }
            CondValue::RawRange(low, high) => Ok(format!(
                "({column}{not} BETWEEN {} AND {})",
                self.build_raw(low, map)?,
                self.build_raw(high, map)?
            )),
            _ => Err(Error::invalid(
                "'[<>]'/'[><]' expects exactly two endpoints",
            )),
        }
    }
}
