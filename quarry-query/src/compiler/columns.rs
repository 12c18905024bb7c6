//! Select-list compilation and the column decode map.
//!
//! Compiling a selection produces two things at once: the SQL select
//! list, and a [`ColumnMap`] recording, for every spec string, which
//! result-row key it lands under and which [`ColumnType`] cast applies
//! when rows are decoded.

use indexmap::IndexMap;

use super::{SqlCompiler, parse_column_spec};
use crate::error::{Error, Result};
use crate::types::{ColumnType, Field, Fields};
use crate::value::ParamMap;

/// Decode information for one selected column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnEntry {
    /// Key the value lands under in a decoded row: the alias when one
    /// was given, otherwise the column name without its table part.
    pub key: String,
    /// Cast applied while decoding, when a type tag was given.
    pub ty: Option<ColumnType>,
}

/// Map from column spec string to its decode entry.
pub type ColumnMap = IndexMap<String, ColumnEntry>;

impl SqlCompiler {
    /// Compile a selection into a SQL select list, recording decode
    /// entries into `column_map`.
    pub(crate) fn column_push(
        &mut self,
        fields: &Fields,
        map: &mut ParamMap,
        root: bool,
        is_join: bool,
        column_map: &mut ColumnMap,
    ) -> Result<String> {
        match fields {
            Fields::All => Ok("*".to_string()),
            Fields::Raw(raw) => self.build_raw(raw, map),
            Fields::Col(spec) => {
                let single = [Field::Col(spec.clone())];
                self.push_fields(&single, map, root, is_join, column_map)
            }
            Fields::List(list) => self.push_fields(list, map, root, is_join, column_map),
        }
    }

    fn push_fields(
        &mut self,
        fields: &[Field],
        map: &mut ParamMap,
        root: bool,
        is_join: bool,
        column_map: &mut ColumnMap,
    ) -> Result<String> {
        // A single named group at the root selects its index column too
        // and re-keys the result set by that column's values.
        if root && fields.len() == 1 {
            if let Field::Group { name, fields: sub } = &fields[0] {
                let spec = parse_column_spec(name)?;
                let mut stack = vec![self.column_quote(spec.column)?];
                column_map.insert(
                    name.clone(),
                    ColumnEntry {
                        key: spec.output_key().to_string(),
                        ty: None,
                    },
                );
                stack.push(self.push_fields(sub, map, false, is_join, column_map)?);
                return Ok(stack.join(","));
            }
        }

        let mut stack: Vec<String> = Vec::with_capacity(fields.len());
        let mut has_distinct = false;

        for field in fields {
            match field {
                Field::Col(spec_str) => {
                    if is_join && spec_str.contains('*') {
                        return Err(Error::invalid(
                            "cannot use table.* to select all columns while joining",
                        ));
                    }
                    let spec = parse_column_spec(spec_str)?;
                    let mut sql = self.column_quote(spec.column)?;
                    if let Some(alias) = spec.alias {
                        sql = format!("{sql} AS {}", self.column_quote(alias)?);
                    }
                    column_map.insert(
                        spec_str.clone(),
                        ColumnEntry {
                            key: spec.output_key().to_string(),
                            ty: spec.ty,
                        },
                    );
                    if !has_distinct && spec.distinct {
                        has_distinct = true;
                        stack.insert(0, format!("DISTINCT {sql}"));
                        continue;
                    }
                    stack.push(sql);
                }
                Field::Raw { name, raw } => {
                    let spec = parse_column_spec(name)?;
                    let rendered = self.build_raw(raw, map)?;
                    stack.push(format!("{rendered} AS {}", self.column_quote(spec.column)?));
                    column_map.insert(
                        name.clone(),
                        ColumnEntry {
                            key: spec.output_key().to_string(),
                            ty: spec.ty,
                        },
                    );
                }
                Field::Group { fields: sub, .. } => {
                    stack.push(self.push_fields(sub, map, false, is_join, column_map)?);
                }
            }
        }

        Ok(stack.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::raw::raw;

    fn push(fields: &Fields, is_join: bool) -> (String, ColumnMap) {
        let mut c = SqlCompiler::new(Dialect::Sqlite, "");
        let mut map = ParamMap::new();
        let mut column_map = ColumnMap::new();
        let sql = c
            .column_push(fields, &mut map, true, is_join, &mut column_map)
            .unwrap();
        (sql, column_map)
    }

    #[test]
    fn star_passes_through() {
        let (sql, cmap) = push(&Fields::All, false);
        assert_eq!(sql, "*");
        assert!(cmap.is_empty());
    }

    #[test]
    fn aliases_and_types_are_recorded() {
        let fields = Fields::List(vec![
            Field::Col("account.nickname(name)".to_string()),
            Field::Col("age[Int]".to_string()),
        ]);
        let (sql, cmap) = push(&fields, false);
        assert_eq!(sql, "\"account\".\"nickname\" AS \"name\",\"age\"");
        assert_eq!(cmap["account.nickname(name)"].key, "name");
        assert_eq!(cmap["age[Int]"].key, "age");
        assert_eq!(cmap["age[Int]"].ty, Some(ColumnType::Int));
    }

    #[test]
    fn distinct_moves_to_front_once() {
        let fields = Fields::List(vec![
            Field::Col("name".to_string()),
            Field::Col("@city".to_string()),
            Field::Col("@age".to_string()),
        ]);
        let (sql, _) = push(&fields, false);
        assert_eq!(sql, "DISTINCT \"city\",\"name\",\"age\"");
    }

    #[test]
    fn raw_fields_select_expressions() {
        let fields = Fields::List(vec![Field::Raw {
            name: "total[Int]".to_string(),
            raw: raw("SUM(<amount>)"),
        }]);
        let (sql, cmap) = push(&fields, false);
        assert_eq!(sql, "SUM(\"amount\") AS \"total\"");
        assert_eq!(cmap["total[Int]"].ty, Some(ColumnType::Int));
    }

    #[test]
    fn root_group_selects_index_column_first() {
        let fields = Fields::List(vec![Field::Group {
            name: "user_id".to_string(),
            fields: vec![
                Field::Col("name".to_string()),
                Field::Col("email".to_string()),
            ],
        }]);
        let (sql, cmap) = push(&fields, false);
        assert_eq!(sql, "\"user_id\",\"name\",\"email\"");
        assert_eq!(cmap["user_id"].key, "user_id");
    }

    #[test]
    fn wildcard_rejected_in_joins() {
        let fields = Fields::List(vec![Field::Col("account.*".to_string())]);
        let mut c = SqlCompiler::new(Dialect::Sqlite, "");
        let mut map = ParamMap::new();
        let mut cmap = ColumnMap::new();
        assert!(c.column_push(&fields, &mut map, true, true, &mut cmap).is_err());
    }
}
