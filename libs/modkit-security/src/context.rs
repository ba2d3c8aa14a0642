use std::collections::HashSet;

use crate::permission::{OwnershipScope, ScopedPermission};
use crate::subject::Subject;

/// `SecurityContext` carries who is calling and what they were granted.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SecurityContext {
    subject: Option<Subject>,
    is_admin: bool,
    permissions: HashSet<ScopedPermission>,
}

impl SecurityContext {
    #[must_use]
    pub fn builder() -> SecurityContextBuilder {
        SecurityContextBuilder::default()
    }

    /// No subject, no grants.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    #[must_use]
    pub fn permissions(&self) -> &HashSet<ScopedPermission> {
        &self.permissions
    }

    /// Exact grant lookup.
    #[must_use]
    pub fn has(&self, permission: &ScopedPermission) -> bool {
        self.permissions.contains(permission)
    }

    /// Grant lookup honoring scope subsumption: an `any` grant also covers `own`.
    #[must_use]
    pub fn allows(&self, permission: &ScopedPermission) -> bool {
        match permission.scope() {
            Some(OwnershipScope::Own) => {
                self.has(permission) || self.has(&permission.with_scope(OwnershipScope::Any))
            }
            Some(OwnershipScope::Any) | None => self.has(permission),
        }
    }
}

#[derive(Default)]
pub struct SecurityContextBuilder {
    subject: Option<Subject>,
    is_admin: bool,
    permissions: HashSet<ScopedPermission>,
}

impl SecurityContextBuilder {
    #[must_use]
    pub fn subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    #[must_use]
    pub fn admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    #[must_use]
    pub fn permission(mut self, permission: ScopedPermission) -> Self {
        self.permissions.insert(permission);
        self
    }

    #[must_use]
    pub fn permissions(mut self, permissions: impl IntoIterator<Item = ScopedPermission>) -> Self {
        self.permissions.extend(permissions);
        self
    }

    #[must_use]
    pub fn build(self) -> SecurityContext {
        SecurityContext {
            subject: self.subject,
            is_admin: self.is_admin,
            permissions: self.permissions,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn perm(s: &str) -> ScopedPermission {
        s.parse().unwrap()
    }

    #[test]
    fn any_grant_subsumes_own() {
        let ctx = SecurityContext::builder()
            .subject(Subject::new("7"))
            .permission(perm("can update any person"))
            .build();

        assert!(ctx.allows(&perm("can update own person")));
        assert!(ctx.allows(&perm("can update any person")));
        assert!(!ctx.allows(&perm("can update person")));
    }

    #[test]
    fn own_grant_does_not_cover_any() {
        let ctx = SecurityContext::builder()
            .permission(perm("can update own person"))
            .build();

        assert!(ctx.allows(&perm("can update own person")));
        assert!(!ctx.allows(&perm("can update any person")));
    }

    #[test]
    fn anonymous_has_nothing() {
        let ctx = SecurityContext::anonymous();
        assert!(ctx.subject().is_none());
        assert!(!ctx.is_admin());
        assert!(!ctx.allows(&perm("can list person")));
    }

    #[test]
    fn deserializes_from_string_grants() {
        let ctx: SecurityContext = serde_json::from_value(serde_json::json!({
            "subject": { "id": "3" },
            "is_admin": false,
            "permissions": ["can remove own person"]
        }))
        .unwrap();
        assert_eq!(ctx.subject().map(Subject::id), Some("3"));
        assert!(ctx.allows(&perm("can remove own person")));
    }
}
