#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{person_config, person_model, person_table, rec, sqlite};
use modkit_actions::{ActionError, ActionSpec, BulkKind, ModelBuilder, ModelMeta};
use serde_json::{Value, json};

#[tokio::test]
async fn actions_register_under_bare_and_full_names() -> anyhow::Result<()> {
    let conn = sqlite().await;
    person_table(&conn).await;
    let mut actions = ActionSpec::crud();
    actions.push(ActionSpec::Bulk(BulkKind::Put));
    let model = person_model(&conn, actions).await;

    assert_eq!(
        model.action_names(),
        ["getPerson", "listPerson", "createPerson", "updatePerson", "removePerson", "bulkPutPerson"]
    );
    assert_eq!(model.action("get").unwrap().name(), "get");
    assert_eq!(model.action("bulkPutPerson").unwrap().name(), "bulkPut");
    assert!(model.action("merge").is_none());

    let err = model.invoke("mergePerson", rec(json!({"id": 1})), None).await.unwrap_err();
    assert!(matches!(err, ActionError::UnprocessableEntity(ref msg) if msg == "Unknown action mergePerson"));
    Ok(())
}

#[tokio::test]
async fn meta_serializes_with_reserved_names() -> anyhow::Result<()> {
    let conn = sqlite().await;
    person_table(&conn).await;
    let model = person_model(&conn, vec![ActionSpec::Get, ActionSpec::List]).await;

    let meta = serde_json::to_value(model.meta())?;
    assert_eq!(meta["_entityName"], "person");
    assert_eq!(meta["_pascalName"], "Person");
    assert_eq!(meta["_keys"], json!(["id"]));
    assert_eq!(meta["_selectArgs"][0], "person.id AS id");
    assert_eq!(meta["_listArgs"], json!(["page", "limit", "orderBy", "orderDir"]));
    assert_eq!(meta["_uniqueColumns"], json!([["email"]]));
    assert_eq!(meta["_actions"], json!(["getPerson", "listPerson"]));

    let back: ModelMeta = serde_json::from_value(meta)?;
    assert_eq!(&back, model.meta());
    Ok(())
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let conn = sqlite().await;
    person_table(&conn).await;
    let err = ModelBuilder::introspected(person_config(), conn.clone())
        .await
        .unwrap()
        .actions([ActionSpec::Get, ActionSpec::Get])
        .build()
        .unwrap_err();
    assert!(matches!(err, ActionError::InvalidDescriptor(_)), "{err:?}");
}

#[tokio::test]
async fn action_specs_read_from_config_strings() -> anyhow::Result<()> {
    let specs: Vec<ActionSpec> = serde_json::from_value(json!(["get", "softRemove", "bulkMerge"]))?;
    assert_eq!(specs, [ActionSpec::Get, ActionSpec::SoftRemove, ActionSpec::Bulk(BulkKind::Merge)]);
    assert!(serde_json::from_value::<ActionSpec>(json!("explode")).is_err());
    Ok(())
}

#[tokio::test]
async fn validate_reports_every_violation() -> anyhow::Result<()> {
    let conn = sqlite().await;
    person_table(&conn).await;
    let model = person_model(&conn, vec![ActionSpec::Validate(vec!["email".to_owned(), "name".to_owned()])]).await;

    let ok = model.invoke("validatePerson", rec(json!({"email": "a@b.c", "name": "Ada"})), None).await?;
    assert_eq!(ok, Value::Bool(true));

    let long_name = "x".repeat(41);
    let err = model
        .invoke("validatePerson", rec(json!({"name": long_name, "isDeleted": "not checked"})), None)
        .await
        .unwrap_err();
    let ActionError::BadRequest { violations, .. } = err else {
        panic!("expected BadRequest, got {err:?}");
    };
    let codes: Vec<_> = violations.iter().map(|v| (v.field.as_str(), v.code.as_deref())).collect();
    assert_eq!(codes, [("email", Some("required")), ("name", Some("max_length"))]);
    assert_eq!(violations[0].message, "Email is required");
    Ok(())
}

#[tokio::test]
async fn validate_needs_column_metadata() {
    let conn = sqlite().await;
    let descriptor = modkit_actions::EntityDescriptor::build(person_config(), None).unwrap();
    let err = ModelBuilder::new(descriptor, conn)
        .action(ActionSpec::Validate(Vec::new()))
        .build()
        .unwrap_err();
    assert!(matches!(err, ActionError::InvalidDescriptor(_)), "{err:?}");
}

#[tokio::test]
async fn introspect_describes_used_columns() -> anyhow::Result<()> {
    let conn = sqlite().await;
    person_table(&conn).await;
    let model = person_model(&conn, vec![ActionSpec::Introspect]).await;

    let info = model.invoke("introspectPerson", rec(json!({})), None).await?;
    assert_eq!(info["entityName"], "person");
    assert_eq!(info["usesJoins"], false);
    assert_eq!(info["keys"], json!(["id"]));

    let columns = info["columns"].as_array().unwrap();
    let name = columns.iter().find(|c| c["name"] == "name").unwrap();
    assert_eq!(name["kind"], "string");
    assert_eq!(name["maxLength"], 40);
    assert_eq!(name["nullable"], true);
    let id = columns.iter().find(|c| c["name"] == "id").unwrap();
    assert_eq!(id["primaryKey"], true);
    Ok(())
}
