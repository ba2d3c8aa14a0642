#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use common::{exec, rec, sqlite};
use futures::FutureExt;
use modkit_actions::{
    ActionContext, ActionError, EntityConfig, EntityDescriptor, ModelBuilder, ModelInterface, Ownership, Record,
    RecordFetcher, ScopedAuthorizer,
};
use modkit_security::{OwnershipScope, ScopedPermission, SecurityContext, Subject};
use sea_orm::DatabaseConnection;
use serde_json::json;

async fn account_table(conn: &DatabaseConnection) {
    exec(conn, "CREATE TABLE account (id INTEGER PRIMARY KEY, ownerId INTEGER, name TEXT)").await;
    exec(conn, "INSERT INTO account (id, ownerId, name) VALUES (1, 7, 'mine'), (2, 7, 'also mine'), (3, 8, 'theirs')")
        .await;
}

fn account_ctx(conn: &DatabaseConnection) -> ActionContext {
    let config = EntityConfig {
        columns: vec!["id".to_owned(), "ownerId".to_owned(), "name".to_owned()],
        ..EntityConfig::new("account")
    };
    ActionContext::new(Arc::new(EntityDescriptor::build(config, None).unwrap()), conn.clone())
}

fn caller(id: &str, grants: &[(&str, OwnershipScope)]) -> SecurityContext {
    SecurityContext::builder()
        .subject(Subject::new(id))
        .permissions(grants.iter().map(|(action, scope)| ScopedPermission::scoped(action, *scope, "account")))
        .build()
}

#[tokio::test]
async fn admins_pass_without_grants() -> anyhow::Result<()> {
    let conn = sqlite().await;
    account_table(&conn).await;
    let auth = ScopedAuthorizer::scoped(account_ctx(&conn), "update", Ownership::Column("ownerId".to_owned()));
    let admin = SecurityContext::builder().admin(true).build();

    // no lookup happens, so a missing record does not matter
    assert!(auth.can_access(&admin, &rec(json!({"id": 99})), None).await?);
    Ok(())
}

#[tokio::test]
async fn own_grant_covers_owned_records_only() -> anyhow::Result<()> {
    let conn = sqlite().await;
    account_table(&conn).await;
    let auth = ScopedAuthorizer::scoped(account_ctx(&conn), "update", Ownership::Column("ownerId".to_owned()));
    let owner = caller("7", &[("update", OwnershipScope::Own)]);

    assert!(auth.can_access(&owner, &rec(json!({"id": 1})), None).await?);
    assert!(!auth.can_access(&owner, &rec(json!({"id": 3})), None).await?);

    let anyone = caller("9", &[("update", OwnershipScope::Any)]);
    assert!(auth.can_access(&anyone, &rec(json!({"id": 3})), None).await?);
    Ok(())
}

#[tokio::test]
async fn missing_target_is_forbidden() {
    let conn = sqlite().await;
    account_table(&conn).await;
    let auth = ScopedAuthorizer::scoped(account_ctx(&conn), "remove", Ownership::Column("ownerId".to_owned()));
    let owner = caller("7", &[("remove", OwnershipScope::Any)]);

    let err = auth.can_access(&owner, &rec(json!({"id": 42})), None).await.unwrap_err();
    assert!(matches!(err, ActionError::Forbidden(_)), "{err:?}");
}

#[tokio::test]
async fn bulk_needs_any_once_one_target_is_foreign() -> anyhow::Result<()> {
    let conn = sqlite().await;
    account_table(&conn).await;
    let auth = ScopedAuthorizer::scoped(account_ctx(&conn), "bulkUpdate", Ownership::Column("ownerId".to_owned()));
    let owner = caller("7", &[("bulkUpdate", OwnershipScope::Own)]);

    let owned = rec(json!({"accountList": [{"id": 1}, {"id": 2}, {"id": 1}]}));
    assert!(auth.can_access(&owner, &owned, None).await?);

    let mixed = rec(json!({"accountList": [{"id": 1}, {"id": 3}]}));
    assert!(!auth.can_access(&owner, &mixed, None).await?);

    let partly_missing = rec(json!({"accountList": [{"id": 1}, {"id": 77}]}));
    let err = auth.can_access(&owner, &partly_missing, None).await.unwrap_err();
    assert!(matches!(err, ActionError::Forbidden(_)), "{err:?}");

    assert!(!auth.can_access(&owner, &rec(json!({"accountList": []})), None).await?);
    Ok(())
}

#[tokio::test]
async fn arg_ownership_checks_top_level_and_records() -> anyhow::Result<()> {
    let conn = sqlite().await;
    let auth = ScopedAuthorizer::scoped(account_ctx(&conn), "bulkCreate", Ownership::Arg("ownerId".to_owned()));
    let owner = caller("7", &[("bulkCreate", OwnershipScope::Own)]);

    let owned = rec(json!({"ownerId": 7, "accountList": [{"ownerId": 7}, {"ownerId": "7"}]}));
    assert!(auth.can_access(&owner, &owned, None).await?);

    let foreign_record = rec(json!({"ownerId": 7, "accountList": [{"ownerId": 7}, {"ownerId": 8}]}));
    assert!(!auth.can_access(&owner, &foreign_record, None).await?);

    let single = ScopedAuthorizer::scoped(account_ctx(&conn), "create", Ownership::Arg("ownerId".to_owned()));
    let creator = caller("7", &[("create", OwnershipScope::Own)]);
    assert!(single.can_access(&creator, &rec(json!({"ownerId": 7})), None).await?);
    assert!(!single.can_access(&creator, &rec(json!({"ownerId": 8})), None).await?);
    Ok(())
}

#[tokio::test]
async fn unscoped_and_unresolved_checks() -> anyhow::Result<()> {
    let conn = sqlite().await;
    let flat = ScopedAuthorizer::unscoped(account_ctx(&conn), "list");
    let lister = SecurityContext::builder()
        .subject(Subject::new("7"))
        .permission(ScopedPermission::unscoped("list", "account"))
        .build();
    assert!(flat.can_access(&lister, &rec(json!({})), None).await?);
    assert!(!flat.can_access(&SecurityContext::anonymous(), &rec(json!({})), None).await?);

    let unresolved = ScopedAuthorizer::scoped(account_ctx(&conn), "merge", Ownership::Unresolved);
    let own_only = caller("7", &[("merge", OwnershipScope::Own)]);
    assert!(!unresolved.can_access(&own_only, &rec(json!({"id": 1})), None).await?);
    let any = caller("7", &[("merge", OwnershipScope::Any)]);
    assert!(unresolved.can_access(&any, &rec(json!({"id": 1})), None).await?);
    Ok(())
}

async fn account_model(conn: &DatabaseConnection) -> ModelInterface {
    let fetcher: RecordFetcher = Arc::new(|args: Record| {
        async move { Ok::<_, ActionError>(vec![rec(json!({"id": args["id"].clone(), "ownerId": 8}))]) }.boxed()
    });
    ModelBuilder::introspected(EntityConfig::new("account"), conn.clone())
        .await
        .unwrap()
        .authorize("update", Some(Ownership::Column("ownerId".to_owned())))
        .authorize("list", None)
        .authorize_with_fetcher("remove", "ownerId", fetcher)
        .build()
        .unwrap()
}

#[tokio::test]
async fn dynamic_invoke_reads_reserved_args() -> anyhow::Result<()> {
    let conn = sqlite().await;
    account_table(&conn).await;
    let model = account_model(&conn).await;
    assert!(model.action("canUpdateAccount").is_some());

    let allowed = model
        .invoke(
            "canUpdateAccount",
            rec(json!({"id": 2, "_subject": 7, "_subjectPermissions": ["can update own account"]})),
            None,
        )
        .await?;
    assert_eq!(allowed, json!(true));

    let denied = model
        .invoke("canList", rec(json!({"_subject": "7", "_subjectPermissions": {"can update any account": true}})), None)
        .await?;
    assert_eq!(denied, json!(false));

    let admin = model.invoke("canListAccount", rec(json!({"_subjectIsAdmin": true})), None).await?;
    assert_eq!(admin, json!(true));
    Ok(())
}

#[tokio::test]
async fn custom_fetcher_replaces_the_lookup() -> anyhow::Result<()> {
    let conn = sqlite().await;
    account_table(&conn).await;
    let model = account_model(&conn).await;

    // the fetcher reports every account as owned by 8
    let mine = model
        .invoke(
            "canRemoveAccount",
            rec(json!({"id": 1, "_subject": 7, "_subjectPermissions": ["can remove own account"]})),
            None,
        )
        .await?;
    assert_eq!(mine, json!(false));

    let theirs = model
        .invoke(
            "canRemoveAccount",
            rec(json!({"id": 1, "_subject": 8, "_subjectPermissions": ["can remove own account"]})),
            None,
        )
        .await?;
    assert_eq!(theirs, json!(true));
    Ok(())
}
