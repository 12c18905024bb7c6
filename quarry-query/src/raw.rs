//! Raw SQL fragments with identifier markers and named parameters.
//!
//! A [`Raw`] fragment is spliced verbatim into generated SQL, except
//! that `<identifier>` markers are rewritten with dialect-correct
//! quoting. A marker directly preceded by `FROM`, `TABLE`, `INTO`,
//! `UPDATE` or `JOIN` is treated as a table name and receives the
//! configured table prefix; any other marker is a column reference.
//! Markers inside string literals are left untouched.
//!
//! ```rust
//! use quarry_query::raw;
//!
//! let fragment = raw("SELECT * FROM <account> WHERE <account.balance> >= :floor")
//!     .bind(":floor", 100);
//! ```

use indexmap::IndexMap;

use crate::error::Result;
use crate::value::Value;

/// A verbatim SQL fragment with optional named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Raw {
    text: String,
    params: IndexMap<String, Value>,
}

impl Raw {
    /// Wrap a fragment of SQL text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: IndexMap::new(),
        }
    }

    /// Attach a named parameter. Names must start with `:` and stay out
    /// of the reserved `:qx{n}x` namespace; this is enforced when the
    /// fragment is compiled.
    pub fn bind(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// The fragment text, markers included.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The attached parameters in insertion order.
    pub fn params(&self) -> &IndexMap<String, Value> {
        &self.params
    }
}

/// Shorthand for [`Raw::new`].
pub fn raw(text: impl Into<String>) -> Raw {
    Raw::new(text)
}

/// Rewrite `<identifier>` markers in `text` through `replace`.
///
/// `replace` receives the marker's identifier and whether it appeared in
/// table position (directly after a table-introducing keyword). Quoted
/// regions are copied untouched, and a `<` that does not open a valid
/// marker is kept literally.
pub(crate) fn splice_markers<F>(text: &str, mut replace: F) -> Result<String>
where
    F: FnMut(&str, bool) -> Result<String>,
{
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '`' | '"' => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            '<' => match scan_marker(&chars, i + 1) {
                Some((ident, close)) => {
                    let is_table = in_table_position(&out);
                    out.push_str(&replace(&ident, is_table)?);
                    i = close + 1;
                }
                None => {
                    out.push('<');
                    i += 1;
                }
            },
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Parse an identifier marker starting right after `<`. Returns the
/// identifier and the index of the closing `>`.
fn scan_marker(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut ident = String::new();
    let mut i = start;
    let mut dotted = false;

    loop {
        let first = *chars.get(i)?;
        if !(first.is_alphabetic() || first == '_') {
            return None;
        }
        ident.push(first);
        i += 1;
        while let Some(&c) = chars.get(i) {
            if c.is_alphanumeric() || matches!(c, '_' | '@' | '$' | '#' | '-') {
                ident.push(c);
                i += 1;
            } else {
                break;
            }
        }
        match chars.get(i) {
            Some('>') => return Some((ident, i)),
            Some('.') if !dotted => {
                dotted = true;
                ident.push('.');
                i += 1;
            }
            _ => return None,
        }
    }
}

/// Whether the emitted text so far ends with a table-introducing keyword.
fn in_table_position(out: &str) -> bool {
    let trimmed = out.trim_end();
    for keyword in ["FROM", "TABLE", "INTO", "UPDATE", "JOIN"] {
        if trimmed.len() >= keyword.len() {
            let (head, tail) = trimmed.split_at(trimmed.len() - keyword.len());
            if tail.eq_ignore_ascii_case(keyword)
                && head
                    .chars()
                    .next_back()
                    .is_none_or(|c| !c.is_alphanumeric() && c != '_')
            {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splice(text: &str) -> String {
        splice_markers(text, |ident, is_table| {
            Ok(if is_table {
                format!("\"t_{ident}\"")
            } else {
                format!("\"{ident}\"")
            })
        })
        .unwrap()
    }

    #[test]
    fn table_markers_get_prefixed() {
        assert_eq!(
            splice("SELECT <id> FROM <account>"),
            "SELECT \"id\" FROM \"t_account\""
        );
    }

    #[test]
    fn join_and_update_are_table_positions() {
        assert_eq!(splice("UPDATE <account>"), "UPDATE \"t_account\"");
        assert_eq!(
            splice("LEFT JOIN <post> ON <post.author>"),
            "LEFT JOIN \"t_post\" ON \"post.author\""
        );
    }

    #[test]
    fn markers_inside_string_literals_survive() {
        assert_eq!(
            splice("SELECT '<id>' FROM <log>"),
            "SELECT '<id>' FROM \"t_log\""
        );
    }

    #[test]
    fn comparison_operators_are_not_markers() {
        assert_eq!(splice("WHERE a < b AND b > c"), "WHERE a < b AND b > c");
        assert_eq!(splice("WHERE a <> b"), "WHERE a <> b");
        assert_eq!(splice("WHERE a < 5"), "WHERE a < 5");
    }

    #[test]
    fn dotted_marker_is_single_identifier() {
        assert_eq!(splice("<account.balance>"), "\"account.balance\"");
    }

    #[test]
    fn keyword_requires_word_boundary() {
        // "PERFORM" ends in FORM, not FROM; "REFROM" must not count either.
        assert_eq!(splice("REFROM <x>"), "REFROM \"x\"");
    }

    #[test]
    fn raw_builder_collects_params() {
        let r = raw("WHERE id = :id").bind(":id", 7);
        assert_eq!(r.text(), "WHERE id = :id");
        assert_eq!(r.params().get(":id"), Some(&Value::Int(7)));
    }
}
