//! Scoped Authorizer: decides `can <action> [own|any] <entity>` for one
//! (entity, action) pair.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use modkit_security::{OwnershipScope, ScopedPermission, SecurityContext, Subject};
use sea_orm::DatabaseTransaction;
use serde_json::Value;

use crate::actions::getter::Getter;
use crate::actions::{ActionContext, EntityAction};
use crate::error::ActionError;
use crate::query::{ColumnStyle, assemble, bulk_where};
use crate::record::{Record, aggregate_keys};

/// Loads the persisted record(s) an ownership check reads, given the request args.
pub type RecordFetcher = Arc<dyn Fn(Record) -> BoxFuture<'static, Result<Vec<Record>, ActionError>> + Send + Sync>;

/// Where ownership of the target is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// Scoped, but ownership is never established: only `any` grants pass.
    Unresolved,
    /// An argument of the request holds the owner id.
    Arg(String),
    /// A column of the persisted record holds the owner id.
    Column(String),
}

#[derive(Clone)]
pub struct ScopedAuthorizer {
    ctx: ActionContext,
    action: String,
    scope: Option<Ownership>,
    fetcher: Option<RecordFetcher>,
}

impl fmt::Debug for ScopedAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedAuthorizer")
            .field("entity", &self.ctx.descriptor.entity_name())
            .field("action", &self.action)
            .field("scope", &self.scope)
            .field("fetcher", &self.fetcher.is_some())
            .finish_non_exhaustive()
    }
}

/// Security context carried in dynamic args under `_subject`,
/// `_subjectIsAdmin` and `_subjectPermissions`.
///
/// Permissions may be a list of strings or an object keyed by them.
/// Strings that do not parse are ignored.
#[must_use]
pub fn security_from_args(args: &Record) -> SecurityContext {
    let mut builder = SecurityContext::builder()
        .admin(args.get("_subjectIsAdmin").and_then(Value::as_bool).unwrap_or(false));
    match args.get("_subject") {
        Some(Value::String(id)) => builder = builder.subject(Subject::new(id.as_str())),
        Some(Value::Number(id)) => builder = builder.subject(Subject::new(id.to_string())),
        _ => {}
    }
    let names: Vec<&str> = match args.get("_subjectPermissions") {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        Some(Value::Object(map)) => map.keys().map(String::as_str).collect(),
        _ => Vec::new(),
    };
    let parsed = names.into_iter().filter_map(|name| match name.parse::<ScopedPermission>() {
        Ok(p) => Some(p),
        Err(err) => {
            tracing::debug!(permission = name, error = %err, "ignoring malformed permission");
            None
        }
    });
    builder.permissions(parsed).build()
}

fn is_owner(security: &SecurityContext, owner: Option<&Value>) -> bool {
    match (security.subject(), owner) {
        (Some(subject), Some(owner)) => subject.is_owner(owner),
        _ => false,
    }
}

impl ScopedAuthorizer {
    /// Authorizer checking the flat `can <action> <entity>` permission.
    #[must_use]
    pub fn unscoped(ctx: ActionContext, action: &str) -> Self {
        Self {
            ctx,
            action: action.to_owned(),
            scope: None,
            fetcher: None,
        }
    }

    /// Authorizer resolving `own` or `any` through `ownership`.
    #[must_use]
    pub fn scoped(ctx: ActionContext, action: &str, ownership: Ownership) -> Self {
        Self {
            scope: Some(ownership),
            ..Self::unscoped(ctx, action)
        }
    }

    /// Replace the default record lookup of column-based checks.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: RecordFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    fn is_bulk(&self) -> bool {
        self.action.starts_with("bulk")
    }

    fn permission(&self, scope: OwnershipScope) -> ScopedPermission {
        ScopedPermission::scoped(&self.action, scope, self.ctx.descriptor.entity_name())
    }

    fn forbidden(&self) -> ActionError {
        ActionError::Forbidden(format!(
            "You do not have permission to {} this {}",
            self.action,
            self.ctx.descriptor.noun()
        ))
    }

    fn decide(&self, security: &SecurityContext, owned: bool) -> bool {
        let scope = if owned { OwnershipScope::Own } else { OwnershipScope::Any };
        security.allows(&self.permission(scope))
    }

    fn bulk_records(&self, args: &Record) -> Vec<Record> {
        match args.get(self.ctx.descriptor.records_key()) {
            Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_object().cloned()).collect(),
            _ => Vec::new(),
        }
    }

    async fn fetch(&self, args: &Record, tx: Option<&DatabaseTransaction>) -> Result<Vec<Record>, ActionError> {
        if let Some(fetcher) = &self.fetcher {
            return fetcher(args.clone()).await;
        }
        let runner = self.ctx.runner(tx);
        if !self.is_bulk() {
            let row = Getter::new(self.ctx.clone()).fetch(runner, args).await?;
            return Ok(row.into_iter().collect());
        }
        let d = &self.ctx.descriptor;
        let records = self.bulk_records(args);
        let filter = bulk_where(&records, d.keys(), ColumnStyle::Qualified(d.aliases(), d.entity_name()), false);
        Ok(runner.fetch_all(&assemble(d, filter)).await?)
    }

    /// Number of distinct targets a bulk request names.
    fn target_count(&self, args: &Record) -> usize {
        let keys = self.ctx.descriptor.keys();
        self.bulk_records(args)
            .iter()
            .map(|r| aggregate_keys(r, keys, "\u{1f}"))
            .collect::<HashSet<_>>()
            .len()
    }

    async fn owned_by_column(
        &self,
        security: &SecurityContext,
        column: &str,
        args: &Record,
        tx: Option<&DatabaseTransaction>,
    ) -> Result<bool, ActionError> {
        let rows = self.fetch(args, tx).await?;
        let expected = if self.is_bulk() { self.target_count(args) } else { 1 };
        if rows.is_empty() || rows.len() < expected {
            return Err(self.forbidden());
        }
        Ok(rows.iter().all(|row| is_owner(security, row.get(column))))
    }

    fn owned_by_arg(&self, security: &SecurityContext, arg: &str, args: &Record) -> bool {
        if !self.is_bulk() {
            return is_owner(security, args.get(arg));
        }
        let top_level = args.get(arg).is_none_or(|owner| is_owner(security, Some(owner)));
        top_level
            && self
                .bulk_records(args)
                .iter()
                .all(|record| is_owner(security, record.get(arg)))
    }

    /// Whether `security` may perform the action on the target of `args`.
    ///
    /// Administrators always pass. An `any` grant covers owned targets too.
    /// Bulk requests need `any` as soon as one target is not owned, and an
    /// empty bulk list is denied.
    ///
    /// # Errors
    /// `Forbidden` when a column-based check cannot find every target record;
    /// store failures while fetching them.
    #[tracing::instrument(
        name = "can_access",
        skip_all,
        fields(entity = %self.ctx.descriptor.entity_name(), action = %self.action)
    )]
    pub async fn can_access(
        &self,
        security: &SecurityContext,
        args: &Record,
        tx: Option<&DatabaseTransaction>,
    ) -> Result<bool, ActionError> {
        if security.is_admin() {
            return Ok(true);
        }
        let Some(ownership) = &self.scope else {
            let flat = ScopedPermission::unscoped(&self.action, self.ctx.descriptor.entity_name());
            return Ok(security.allows(&flat));
        };
        if self.is_bulk() && self.bulk_records(args).is_empty() {
            tracing::debug!("empty bulk list denied");
            return Ok(false);
        }
        let owned = match ownership {
            Ownership::Unresolved => false,
            Ownership::Arg(arg) => self.owned_by_arg(security, arg, args),
            Ownership::Column(column) => self.owned_by_column(security, column, args, tx).await?,
        };
        let allowed = self.decide(security, owned);
        tracing::debug!(owned, allowed, "access decided");
        Ok(allowed)
    }
}

#[async_trait]
impl EntityAction for ScopedAuthorizer {
    fn name(&self) -> &str {
        "canAccess"
    }

    async fn invoke(&self, args: Record, tx: Option<&DatabaseTransaction>) -> Result<Value, ActionError> {
        let security = security_from_args(&args);
        Ok(Value::Bool(self.can_access(&security, &args, tx).await?))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn security_is_read_from_reserved_args() {
        let sec = security_from_args(&rec(json!({
            "_subject": 7,
            "_subjectIsAdmin": false,
            "_subjectPermissions": ["can update own person", "not a permission"],
        })));
        assert_eq!(sec.subject().map(Subject::id), Some("7"));
        assert!(!sec.is_admin());
        assert_eq!(sec.permissions().len(), 1);
        assert!(sec.allows(&ScopedPermission::scoped("update", OwnershipScope::Own, "person")));
    }

    #[test]
    fn permissions_may_be_an_object_map() {
        let sec = security_from_args(&rec(json!({
            "_subject": "u1",
            "_subjectPermissions": {"can list person": true},
        })));
        assert!(sec.allows(&ScopedPermission::unscoped("list", "person")));
    }

    #[test]
    fn missing_subject_owns_nothing() {
        let sec = security_from_args(&Record::new());
        assert!(!is_owner(&sec, Some(&json!(1))));
    }
}
