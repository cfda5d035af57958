//! File-backed SQLite behavior through the public connection boundary.

use storable_core::{ConnectionConfig, Engine, Params, SqlConnection, SqlValue};
use storable_sqlx::SqliteConnection;
use tempfile::TempDir;

fn file_config(dir: &TempDir) -> ConnectionConfig {
    let path = dir.path().join("app.db");
    ConnectionConfig::new(Engine::Sqlite, format!("sqlite://{}", path.display()))
}

#[test]
fn creates_the_file_and_survives_reconnect() {
    let dir = TempDir::new().unwrap();
    let conn = SqliteConnection::new(file_config(&dir)).unwrap();

    conn.execute("CREATE TABLE \"user\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, \"email\" VARCHAR(191))")
        .unwrap();
    conn.insert(
        "user",
        &[("email".to_string(), SqlValue::Text("a@b.c".into()))],
    )
    .unwrap();
    assert_eq!(conn.last_insert_id(), Some(1));

    conn.disconnect().unwrap();
    assert!(dir.path().join("app.db").exists());

    let email = conn
        .fetch_one(
            "SELECT `email` FROM `user` WHERE `id` = {id}",
            &Params::new().with("id", 1),
        )
        .unwrap();
    assert_eq!(email, Some(SqlValue::Text("a@b.c".into())));
}

#[test]
fn update_and_delete_report_affected_rows() {
    let dir = TempDir::new().unwrap();
    let conn = storable_sqlx::connect(&file_config(&dir)).unwrap();
    conn.execute("CREATE TABLE item (id INTEGER PRIMARY KEY, label TEXT)")
        .unwrap();
    for label in ["a", "b", "c"] {
        conn.insert("item", &[("label".to_string(), SqlValue::Text(label.into()))])
            .unwrap();
    }

    let updated = conn
        .update(
            "item",
            &[("label".to_string(), SqlValue::Text("z".into()))],
            "id > {0} || label = {1}",
            &Params::positional([SqlValue::Int(1), SqlValue::Text("a".into())]),
        )
        .unwrap();
    assert_eq!(updated, 3);

    let deleted = conn
        .delete("item", "label = {0}", &Params::positional(["z"]))
        .unwrap();
    assert_eq!(deleted, 3);
    assert!(conn
        .fetch_assoc("SELECT * FROM item", &Params::new(), None)
        .unwrap()
        .is_empty());
}
