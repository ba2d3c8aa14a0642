#![allow(dead_code)]

use modkit_actions::{ActionSpec, EntityConfig, ModelBuilder, ModelInterface, Record};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use serde_json::Value;

/// One shared in-memory database; a single connection keeps it alive and
/// lets `ATTACH` stick.
pub async fn sqlite() -> DatabaseConnection {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1).min_connections(1).sqlx_logging(false);
    Database::connect(opts).await.expect("connect sqlite")
}

pub async fn exec(conn: &DatabaseConnection, sql: &str) {
    conn.execute_unprepared(sql).await.expect(sql);
}

pub fn rec(v: Value) -> Record {
    v.as_object().cloned().expect("object literal")
}

/// `person(id, email unique, name, isDeleted)`.
pub async fn person_table(conn: &DatabaseConnection) {
    exec(
        conn,
        "CREATE TABLE person (id INTEGER PRIMARY KEY, email TEXT NOT NULL UNIQUE, name VARCHAR(40), \
         isDeleted BOOLEAN NOT NULL DEFAULT 0)",
    )
    .await;
}

pub async fn seed_people(conn: &DatabaseConnection, n: u32) {
    for i in 1..=n {
        exec(
            conn,
            &format!("INSERT INTO person (id, email, name) VALUES ({i}, 'p{i}@example.com', 'Person {i}')"),
        )
        .await;
    }
}

pub fn person_config() -> EntityConfig {
    EntityConfig {
        create_columns: vec!["id".to_owned(), "email".to_owned(), "name".to_owned()],
        update_columns: vec!["email".to_owned(), "name".to_owned()],
        unique_columns: vec![modkit_actions::UniqueColumns::Single("email".to_owned())],
        orderable: vec!["name".to_owned(), "email".to_owned()],
        ..EntityConfig::new("person")
    }
}

pub async fn person_model(conn: &DatabaseConnection, actions: Vec<ActionSpec>) -> ModelInterface {
    ModelBuilder::introspected(person_config(), conn.clone())
        .await
        .expect("introspect person")
        .actions(actions)
        .build()
        .expect("build person model")
}

/// SQLite hands booleans back as integers.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() != Some(0),
        _ => false,
    }
}
