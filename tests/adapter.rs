use sisma::SismaError;
use sisma::adapter::{Adapter, Bindings};
use sisma::query::{ComparisonOperator, Indexing, Operand, Query};
use sisma::settings::ConnectionOptions;

fn connected() -> Adapter {
    let adapter = Adapter::new();
    adapter.connect(&ConnectionOptions::in_memory()).expect("connect");
    adapter
        .execute_batch(
            "create table fruit (id integer primary key, name text not null, weight integer);
             insert into fruit (name, weight) values ('apple', 120), ('pear', 180), ('plum', 40);",
        )
        .expect("seed");
    adapter
}

#[test]
fn no_connection_means_soft_sentinels() {
    let adapter = Adapter::new();
    assert!(!adapter.is_connected());
    assert!(adapter.select("select 1", &Bindings::new()).unwrap().is_none());
    assert!(!adapter.execute("delete from fruit", &Bindings::new()).unwrap());
    assert!(!adapter.begin_transaction().unwrap());
    assert!(!adapter.commit_transaction().unwrap());
    assert!(!adapter.rollback_transaction().unwrap());
    assert_eq!(adapter.last_insert_id(), -1);
}

#[test]
fn closed_adapter_stays_closed() {
    let adapter = connected();
    adapter.close().unwrap();
    assert!(adapter.select("select * from fruit", &Bindings::new()).unwrap().is_none());
    assert_eq!(adapter.last_insert_id(), -1);
    assert!(adapter.connect(&ConnectionOptions::in_memory()).is_err());
    // closing twice is harmless
    adapter.close().unwrap();
}

#[test]
fn connect_is_idempotent() {
    let adapter = connected();
    adapter.connect(&ConnectionOptions::in_memory()).unwrap();
    // still the seeded database
    let rows = adapter
        .select("select * from fruit", &Bindings::new())
        .unwrap()
        .unwrap();
    assert_eq!(rows.num_rows(), 3);
}

#[test]
fn unsupported_charset_is_a_configuration_error() {
    let adapter = Adapter::new();
    let options = ConnectionOptions {
        charset: "latin1".into(),
        ..ConnectionOptions::in_memory()
    };
    assert!(matches!(adapter.connect(&options), Err(SismaError::Config(_))));
    assert!(!adapter.is_connected());
}

#[test]
fn driver_failures_carry_the_command() {
    let adapter = connected();
    let err = adapter
        .execute("insert into fruit (name) values (null)", &Bindings::new())
        .unwrap_err();
    match err {
        SismaError::Adapter { command, code, .. } => {
            assert_eq!(command, "insert into fruit (name) values (null)");
            assert!(code.contains("ConstraintViolation"), "{}", code);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn positional_bindings_from_zero() {
    let adapter = connected();
    let mut bindings = Bindings::new();
    bindings.push("pear").push(100);
    let mut rows = adapter
        .select("select name from fruit where name = ? and weight > ?", &bindings)
        .unwrap()
        .unwrap();
    assert_eq!(rows.num_rows(), 1);
    let record = rows.fetch().unwrap();
    assert_eq!(
        record.get("name"),
        Some(&rusqlite::types::Value::Text("pear".into()))
    );
}

#[test]
fn named_bindings_with_or_without_prefix() {
    let adapter = connected();
    let mut bindings = Bindings::new();
    bindings.named("light", 100).named(":heavy", 150);
    let rows = adapter
        .select(
            "select name from fruit where weight < :light or weight > :heavy order by id",
            &bindings,
        )
        .unwrap()
        .unwrap();
    let names: Vec<String> = rows
        .map(|r| match r.get("name") {
            Some(rusqlite::types::Value::Text(name)) => name.clone(),
            other => panic!("{:?}", other),
        })
        .collect();
    assert_eq!(names, vec!["pear", "plum"]);
}

#[test]
fn result_set_seeks_and_releases() {
    let adapter = connected();
    let mut rows = adapter
        .select("select * from fruit order by id", &Bindings::new())
        .unwrap()
        .unwrap();
    assert_eq!(rows.max_record(), 2);
    rows.seek(2).unwrap();
    assert_eq!(rows.key(), 2);
    assert!(rows.fetch().is_some());
    assert!(rows.fetch().is_none());
    assert!(matches!(rows.seek(3), Err(SismaError::InvalidArgument(_))));
    rows.rewind();
    assert!(rows.valid());
    rows.release();
    rows.release();
    assert!(rows.is_released());
    assert!(rows.fetch().is_none());
    assert_eq!(rows.num_rows(), 0);
}

#[test]
fn transactions_do_not_nest() {
    let adapter = connected();
    assert!(adapter.begin_transaction().unwrap());
    assert!(adapter.in_transaction());
    assert!(!adapter.begin_transaction().unwrap());
    adapter
        .execute("delete from fruit", &Bindings::new())
        .unwrap();
    assert!(adapter.rollback_transaction().unwrap());
    assert!(!adapter.in_transaction());
    let rows = adapter
        .select("select * from fruit", &Bindings::new())
        .unwrap()
        .unwrap();
    assert_eq!(rows.num_rows(), 3);
}

#[test]
fn last_insert_id_follows_inserts() {
    let adapter = connected();
    let mut bindings = Bindings::new();
    bindings.push("fig").push(50);
    adapter
        .execute("insert into fruit (name, weight) values (?, ?)", &bindings)
        .unwrap();
    assert_eq!(adapter.last_insert_id(), 4);
}

#[test]
fn escaping() {
    let adapter = Adapter::new();
    assert_eq!(adapter.escape_identifier("post"), "\"post\"");
    assert_eq!(adapter.escape_identifier("blog.post"), "\"blog\".\"post\"");
    assert_eq!(adapter.escape_identifier("we\"ird"), "\"we\"\"ird\"");
    assert_eq!(adapter.escape_identifier("*"), "*");
    assert_eq!(adapter.escape_identifier("42"), "42");

    let eq = ComparisonOperator::Equal;
    assert_eq!(adapter.escape_value("O'Brien", eq), "'O''Brien'");
    assert_eq!(adapter.escape_value("two\0 words", eq), "'two words'");
    assert_eq!(adapter.escape_value("42", eq), "'42'");
    // NUL bytes go before the placeholder check
    assert_eq!(adapter.escape_value(":ti\0tle", eq), ":title");
    for placeholder in ["?", "?3", ":title", "@title", "$title", "title"] {
        assert_eq!(adapter.escape_value(placeholder, eq), placeholder);
    }
    assert_eq!(
        adapter.escape_value("(1, 2)", ComparisonOperator::In),
        "(1, 2)"
    );
    assert_eq!(adapter.escape_value("", ComparisonOperator::IsNull), "");
}

#[test]
fn query_rendering() {
    let adapter = Adapter::new();
    let query = Query::select("post")
        .where_condition("author", ComparisonOperator::Equal, Operand::Placeholder)
        .where_any(&[
            ("title", ComparisonOperator::Like, Operand::Placeholder),
            ("body", ComparisonOperator::Like, Operand::Named("search".into())),
        ])
        .where_condition("reviewer", ComparisonOperator::IsNull, Operand::None)
        .order_by("id", Indexing::Desc)
        .limit(10)
        .offset(20);
    assert_eq!(
        query.command(&adapter),
        "SELECT * FROM \"post\" WHERE \"author\" = ? AND (\"title\" LIKE ? OR \"body\" LIKE :search) \
         AND \"reviewer\" IS NULL ORDER BY \"id\" DESC LIMIT 10 OFFSET 20"
    );
    let count = Query::count("post").where_condition(
        "status",
        ComparisonOperator::Equal,
        Operand::Literal("it's".into()),
    );
    assert_eq!(
        count.command(&adapter),
        "SELECT COUNT(*) AS _numrows FROM \"post\" WHERE \"status\" = 'it''s'"
    );
    let delete = Query::delete("post").where_condition(
        "id",
        ComparisonOperator::In,
        Operand::Placeholders(3),
    );
    assert_eq!(
        delete.command(&adapter),
        "DELETE FROM \"post\" WHERE \"id\" IN (?, ?, ?)"
    );
}
