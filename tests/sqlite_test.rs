//! End-to-end tests against real SQLite databases.

use resilient_sql::config::ExecutorConfig;
use resilient_sql::error::SqlError;
use resilient_sql::{SqlClient, StatementSource};
use serde_json::json;
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

fn config() -> ExecutorConfig {
    ExecutorConfig::default()
        .with_max_attempts(2)
        .with_backoff(Duration::ZERO)
}

async fn memory_client() -> SqlClient<resilient_sql::db::SqlxDriver> {
    SqlClient::connect_lazy("sqlite::memory:", config()).unwrap()
}

#[tokio::test]
async fn test_select_literal() {
    let mut client = memory_client().await;

    let rows = client.execute("SELECT 1 AS x", &HashMap::new()).await.unwrap();

    assert_eq!(serde_json::to_value(&rows).unwrap(), json!([{"x": 1}]));
    client.close().await;
}

#[tokio::test]
async fn test_ddl_and_dml_return_empty_rows() {
    let mut client = memory_client().await;
    let none = HashMap::new();

    let rows = client
        .execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)", &none)
        .await
        .unwrap();
    assert!(rows.is_empty());

    let rows = client
        .execute("INSERT INTO users (name) VALUES ('alice'), ('bob')", &none)
        .await
        .unwrap();
    assert!(rows.is_empty());

    let rows = client
        .execute("SELECT id, name FROM users ORDER BY id", &none)
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(&rows).unwrap(),
        json!([{"id": 1, "name": "alice"}, {"id": 2, "name": "bob"}])
    );
    client.close().await;
}

#[tokio::test]
async fn test_value_types() {
    let mut client = memory_client().await;

    let rows = client
        .execute(
            "SELECT 1.5 AS f, 'héllo' AS s, NULL AS n, x'DEADBEEF' AS b, x'6869' AS t",
            &HashMap::new(),
        )
        .await
        .unwrap();

    let row = &rows[0];
    assert_eq!(row["f"], json!(1.5));
    assert_eq!(row["s"], json!("héllo"));
    assert_eq!(row["n"], json!(null));
    assert_eq!(row["b"], json!("3q2+7w=="));
    assert_eq!(row["t"], json!("hi"));
    client.close().await;
}

#[tokio::test]
async fn test_syntax_error_is_fatal() {
    let mut client = memory_client().await;

    let err = client.execute("SELEC 1", &HashMap::new()).await.unwrap_err();

    assert!(matches!(err, SqlError::FatalStatement { .. }));
    assert!(!err.is_retryable());
    client.close().await;
}

#[tokio::test]
async fn test_missing_table_is_fatal() {
    let mut client = memory_client().await;

    let err = client
        .execute("SELECT * FROM $table", &[("table".to_string(), "nope".to_string())].into())
        .await
        .unwrap_err();

    match err {
        SqlError::FatalStatement { message, .. } => assert!(message.contains("nope")),
        other => panic!("unexpected error: {other:?}"),
    }
    client.close().await;
}

#[tokio::test]
async fn test_constraint_violation_is_fatal_and_rolled_back() {
    let mut client = SqlClient::connect_lazy(
        "sqlite::memory:",
        config().with_auto_commit(false),
    )
    .unwrap();
    let none = HashMap::new();

    client
        .execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", &none)
        .await
        .unwrap();
    client.execute("INSERT INTO t VALUES (1)", &none).await.unwrap();

    let err = client
        .execute("INSERT INTO t VALUES (1)", &none)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlError::FatalStatement { .. }));

    // the failed transaction was rolled back; the connection is still usable
    let rows = client.execute("SELECT count(*) AS n FROM t", &none).await.unwrap();
    assert_eq!(rows[0]["n"], json!(1));
    client.close().await;
}

#[tokio::test]
async fn test_metadata_snapshot() {
    let mut client = memory_client().await;
    client
        .execute(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, total REAL, note TEXT NOT NULL)",
            &HashMap::new(),
        )
        .await
        .unwrap();

    let snapshot = client.metadata_snapshot().await.unwrap();

    assert_eq!(snapshot.table_names(), vec!["orders"]);
    let orders = snapshot.table("orders").unwrap();
    assert!(orders.schema.is_none());
    assert_eq!(orders.primary_key(), vec!["id"]);
    assert_eq!(orders.column("total").unwrap().data_type, "REAL");
    assert!(orders.column("total").unwrap().nullable);
    assert!(!orders.column("note").unwrap().nullable);
    client.close().await;
}

#[tokio::test]
async fn test_file_database_and_template() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("app.db");
    let url = format!("sqlite://{}", db_path.display());

    let mut template = tempfile::NamedTempFile::new().unwrap();
    write!(template, "SELECT name FROM $table WHERE id = $id").unwrap();

    let mut client = SqlClient::connect_lazy(&url, config()).unwrap();
    let none = HashMap::new();
    client
        .execute("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT)", &none)
        .await
        .unwrap();
    client
        .execute("INSERT INTO people VALUES (7, 'grace')", &none)
        .await
        .unwrap();

    let subs: HashMap<String, String> = [
        ("table".to_string(), "people".to_string()),
        ("id".to_string(), "7".to_string()),
    ]
    .into();
    let rows = client
        .execute_source(&StatementSource::file(template.path()), &subs, 1)
        .await
        .unwrap();
    assert_eq!(serde_json::to_value(&rows).unwrap(), json!([{"name": "grace"}]));
    client.close().await;

    // data survives a full close and reopen
    let rows = client
        .execute("SELECT count(*) AS n FROM people", &none)
        .await
        .unwrap();
    assert_eq!(rows[0]["n"], json!(1));
    client.close().await;
}

#[tokio::test]
async fn test_scoped_sqlite_session() {
    let client = memory_client().await;

    let rows = client
        .scoped(|c| {
            Box::pin(async move {
                let none = HashMap::new();
                c.execute("CREATE TABLE kv (k TEXT, v INTEGER)", &none).await?;
                c.execute("INSERT INTO kv VALUES ('a', 1)", &none).await?;
                c.execute("SELECT k, v FROM kv", &none).await
            })
        })
        .await
        .unwrap();

    assert_eq!(serde_json::to_value(&rows).unwrap(), json!([{"k": "a", "v": 1}]));
}
