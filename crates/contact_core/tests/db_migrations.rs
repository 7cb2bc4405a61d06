use contact_core::db::migrations::latest_version;
use contact_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "contacts");
    for index in [
        "idx_contacts_email",
        "idx_contacts_phone_number",
        "idx_contacts_linked_id",
    ] {
        assert_index_exists(&conn, index);
    }
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contacts.db");

    let conn_first = open_db(&path).unwrap();
    conn_first
        .execute(
            "INSERT INTO contacts (email, link_precedence) VALUES ('a@x.com', 'primary');",
            [],
        )
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let count: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM contacts;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn schema_rejects_contact_without_identifiers() {
    let conn = open_db_in_memory().unwrap();
    let result = conn.execute(
        "INSERT INTO contacts (email, phone_number, link_precedence) VALUES (NULL, NULL, 'primary');",
        [],
    );
    assert!(result.is_err());
}

#[test]
fn schema_rejects_link_that_disagrees_with_precedence() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO contacts (email, link_precedence) VALUES ('a@x.com', 'primary');",
        [],
    )
    .unwrap();
    let primary_id = conn.last_insert_rowid();

    let unlinked_secondary = conn.execute(
        "INSERT INTO contacts (email, link_precedence) VALUES ('b@x.com', 'secondary');",
        [],
    );
    assert!(unlinked_secondary.is_err());

    let linked_primary = conn.execute(
        "INSERT INTO contacts (email, link_precedence, linked_id) VALUES ('c@x.com', 'primary', ?1);",
        [primary_id],
    );
    assert!(linked_primary.is_err());

    let dangling_link = conn.execute(
        "INSERT INTO contacts (email, link_precedence, linked_id) VALUES ('d@x.com', 'secondary', 9999);",
        [],
    );
    assert!(dangling_link.is_err());
}

#[test]
fn created_at_defaults_to_epoch_milliseconds() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO contacts (phone_number, link_precedence) VALUES ('123', 'primary');",
        [],
    )
    .unwrap();

    let (created_at, updated_at): (i64, i64) = conn
        .query_row(
            "SELECT created_at, updated_at FROM contacts LIMIT 1;",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    // 2020-01-01T00:00:00Z in milliseconds.
    assert!(created_at > 1_577_836_800_000);
    assert_eq!(created_at, updated_at);
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table: &str) {
    assert!(sqlite_object_exists(conn, "table", table), "missing table `{table}`");
}

fn assert_index_exists(conn: &Connection, index: &str) {
    assert!(sqlite_object_exists(conn, "index", index), "missing index `{index}`");
}

fn sqlite_object_exists(conn: &Connection, kind: &str, name: &str) -> bool {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2);",
            [kind, name],
            |row| row.get(0),
        )
        .unwrap();
    exists == 1
}
