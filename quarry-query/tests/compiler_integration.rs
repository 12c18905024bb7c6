//! End-to-end compiler tests: condition maps, joins, column specs and
//! raw fragments rendered through `generate` with each dialect's
//! quoting rules.

use indexmap::IndexMap;
use pretty_assertions::assert_eq;

use quarry_query::{
    cond, raw, ColumnMap, CondValue, Dialect, Fields, JoinMap, JoinRelation, ParamMap, SqlCompiler,
    Value, WhereClause,
};

fn rendered(dialect: Dialect, clause: &WhereClause) -> String {
    let mut compiler = SqlCompiler::new(dialect, "");
    let mut map = ParamMap::new();
    let sql = compiler.where_clause(clause, &mut map).unwrap();
    compiler.generate(sql.trim_start(), &map)
}

fn select(dialect: Dialect, prefix: &str, table: &str, join: JoinMap, fields: Fields, clause: WhereClause) -> String {
    let mut compiler = SqlCompiler::new(dialect, prefix);
    let mut map = ParamMap::new();
    let mut cmap = ColumnMap::new();
    let sql = compiler
        .select_context(table, &join, &fields, &clause, None, &mut map, &mut cmap)
        .unwrap();
    compiler.generate(&sql, &map)
}

#[test]
fn bracketed_operators_compile_per_dialect() {
    let clause = WhereClause::from(cond! { "age[>]" => 18 });
    assert_eq!(rendered(Dialect::Sqlite, &clause), "WHERE \"age\" > 18");
    assert_eq!(rendered(Dialect::Mysql, &clause), "WHERE `age` > 18");
    assert_eq!(rendered(Dialect::Pgsql, &clause), "WHERE \"age\" > 18");
}

#[test]
fn nested_connectives_group_with_parentheses() {
    let clause = WhereClause::from(cond! {
        "OR" => cond! {
            "vip" => true,
            "AND #seniors" => cond! {
                "age[>=]" => 65,
                "retired" => true,
            },
        },
    });
    assert_eq!(
        rendered(Dialect::Sqlite, &clause),
        "WHERE (\"vip\" = 1 OR (\"age\" >= 65 AND \"retired\" = 1))"
    );
}

#[test]
fn between_and_like_shapes() {
    let clause = WhereClause::from(cond! { "age[<>]" => vec![200, 500] });
    assert_eq!(
        rendered(Dialect::Sqlite, &clause),
        "WHERE (\"age\" BETWEEN 200 AND 500)"
    );

    let clause = WhereClause::from(cond! { "age[><]" => vec![200, 500] });
    assert_eq!(
        rendered(Dialect::Sqlite, &clause),
        "WHERE (\"age\" NOT BETWEEN 200 AND 500)"
    );

    let clause = WhereClause::from(cond! { "city[~]" => "lon" });
    assert_eq!(
        rendered(Dialect::Sqlite, &clause),
        "WHERE (\"city\" LIKE '%lon%')"
    );

    // An unescaped pattern-class character disables the auto-wrap.
    let clause = WhereClause::from(cond! { "city[~]" => "some_where" });
    assert_eq!(
        rendered(Dialect::Sqlite, &clause),
        "WHERE (\"city\" LIKE 'some_where')"
    );
}

#[test]
fn column_to_column_comparisons_use_integer_keys() {
    let mut conditions = quarry_query::CondMap::new();
    conditions.insert("0".to_string(), CondValue::from("updated_at[>]created_at"));
    let clause = WhereClause::from(conditions);
    assert_eq!(
        rendered(Dialect::Sqlite, &clause),
        "WHERE \"updated_at\" > \"created_at\""
    );
}

#[test]
fn raw_endpoints_splice_into_conditions() {
    let clause = WhereClause::from(cond! {
        "created_at[>]" => raw("datetime('now', '-1 day')"),
    });
    assert_eq!(
        rendered(Dialect::Sqlite, &clause),
        "WHERE \"created_at\" > datetime('now', '-1 day')"
    );
}

#[test]
fn joins_compile_with_aliases_and_using() {
    let mut join = JoinMap::new();
    join.insert(
        "[>]account(a)".to_string(),
        JoinRelation::Column("user_id".to_string()),
    );
    let mut on = IndexMap::new();
    on.insert("a.plan_id".to_string(), "id".to_string());
    join.insert("[><]plan".to_string(), JoinRelation::On(on));

    let sql = select(
        Dialect::Sqlite,
        "",
        "user",
        join,
        Fields::All,
        WhereClause::new(),
    );
    assert_eq!(
        sql,
        "SELECT * FROM \"user\" LEFT JOIN \"account\" AS \"a\" USING (\"user_id\") \
         INNER JOIN \"plan\" ON \"a\".\"plan_id\" = \"plan\".\"id\""
    );
}

#[test]
fn column_specs_apply_alias_and_distinct() {
    let fields = Fields::from(vec!["@user.name(who)", "age[Int]"]);
    let sql = select(
        Dialect::Sqlite,
        "",
        "user",
        JoinMap::new(),
        fields,
        WhereClause::new(),
    );
    assert_eq!(
        sql,
        "SELECT DISTINCT \"user\".\"name\" AS \"who\",\"age\" FROM \"user\""
    );
}

#[test]
fn table_prefix_applies_to_tables_not_bare_columns() {
    let clause = WhereClause::from(cond! { "user.age[>]" => 18 });
    let sql = select(
        Dialect::Mysql,
        "app_",
        "user",
        JoinMap::new(),
        Fields::All,
        clause,
    );
    assert_eq!(
        sql,
        "SELECT * FROM `app_user` WHERE `app_user`.`age` > 18"
    );
}

#[test]
fn raw_markers_know_table_positions() {
    let mut compiler = SqlCompiler::new(Dialect::Mysql, "app_");
    let mut map = ParamMap::new();
    let sql = compiler
        .build_raw(
            &raw("SELECT <score> FROM <match> WHERE <score> > :floor")
                .bind(":floor", Value::Int(10)),
            &mut map,
        )
        .unwrap();
    assert_eq!(
        compiler.generate(&sql, &map),
        "SELECT `score` FROM `app_match` WHERE `score` > 10"
    );
}

#[test]
fn raw_values_regenerate_as_literal_sql() {
    use quarry_query::{data, Connector, Driver, ErrorInfo, NativeClient, Options, SetValue};
    use std::sync::Arc;

    struct Offline;
    impl Connector for Offline {
        fn connect(
            &self,
            _options: &Options,
            _dsn: &str,
        ) -> Result<Box<dyn NativeClient>, ErrorInfo> {
            Err(ErrorInfo::new("08001", None, "offline"))
        }
    }

    let options = Options::new(Dialect::Mysql)
        .host("h")
        .port(3306)
        .dbname("demo")
        .debug();
    let mut driver = Driver::new(options, Arc::new(Offline)).unwrap();

    let mut row = data! { "user_name" => "ada" };
    row.insert("uuid".to_string(), SetValue::Raw(raw("UUID()")));
    driver.insert("demo", &[row]).unwrap();
    assert_eq!(
        driver.query_string(),
        Some("INSERT INTO `demo` (`user_name`, `uuid`) VALUES ('ada', UUID())")
    );
}

#[test]
fn user_raw_params_may_not_use_the_generated_namespace() {
    let mut compiler = SqlCompiler::new(Dialect::Sqlite, "");
    let mut map = ParamMap::new();
    let err = compiler.build_raw(&raw("x = :qx1x").bind(":qx1x", Value::Int(1)), &mut map);
    assert!(err.is_err());
}

#[test]
fn duplicate_literals_bind_distinct_placeholders() {
    let clause = WhereClause::from(cond! {
        "first" => "same",
        "second" => "same",
    });
    let mut compiler = SqlCompiler::new(Dialect::Sqlite, "");
    let mut map = ParamMap::new();
    let sql = compiler.where_clause(&clause, &mut map).unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(
        compiler.generate(sql.trim_start(), &map),
        "WHERE \"first\" = 'same' AND \"second\" = 'same'"
    );
}

#[test]
fn string_quoting_follows_the_dialect() {
    let clause = WhereClause::from(cond! { "name" => "O'Brien" });
    assert_eq!(
        rendered(Dialect::Sqlite, &clause),
        "WHERE \"name\" = 'O''Brien'"
    );
    assert_eq!(
        rendered(Dialect::Mysql, &clause),
        "WHERE `name` = 'O\\'Brien'"
    );
}
