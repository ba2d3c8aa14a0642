use std::fmt;
use std::str::FromStr;

/// Ownership scope of a permission grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnershipScope {
    /// Records the subject owns.
    Own,
    /// Any record, owned or not.
    Any,
}

impl OwnershipScope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Own => "own",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for OwnershipScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionParseError {
    #[error("permission must read 'can <action> [own|any] <entity>', got: {0}")]
    Shape(String),
    #[error("permission token must be alphanumeric or '_', got: {0}")]
    Token(String),
}

/// A permission string of the form `can <action> [own|any] <entity>`.
///
/// Serializes to and from that string form. Examples:
///  - `can update person`
///  - `can update own person`
///  - `can bulkRemove any accountSetting`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopedPermission {
    action: String,
    scope: Option<OwnershipScope>,
    entity: String,
}

fn valid_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ScopedPermission {
    #[must_use]
    pub fn builder() -> ScopedPermissionBuilder {
        ScopedPermissionBuilder::default()
    }

    /// Flat permission without an ownership scope.
    #[must_use]
    pub fn unscoped(action: &str, entity: &str) -> Self {
        Self {
            action: action.to_owned(),
            scope: None,
            entity: entity.to_owned(),
        }
    }

    #[must_use]
    pub fn scoped(action: &str, scope: OwnershipScope, entity: &str) -> Self {
        Self {
            action: action.to_owned(),
            scope: Some(scope),
            entity: entity.to_owned(),
        }
    }

    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    #[must_use]
    pub fn scope(&self) -> Option<OwnershipScope> {
        self.scope
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The same permission at a different scope.
    #[must_use]
    pub fn with_scope(&self, scope: OwnershipScope) -> Self {
        Self {
            scope: Some(scope),
            ..self.clone()
        }
    }
}

impl fmt::Display for ScopedPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            Some(scope) => write!(f, "can {} {scope} {}", self.action, self.entity),
            None => write!(f, "can {} {}", self.action, self.entity),
        }
    }
}

impl FromStr for ScopedPermission {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split_whitespace().collect();
        let (action, scope, entity) = match tokens.as_slice() {
            ["can", action, "own", entity] => (*action, Some(OwnershipScope::Own), *entity),
            ["can", action, "any", entity] => (*action, Some(OwnershipScope::Any), *entity),
            ["can", action, entity] => (*action, None, *entity),
            _ => return Err(PermissionParseError::Shape(s.to_owned())),
        };
        for token in [action, entity] {
            if !valid_token(token) {
                return Err(PermissionParseError::Token(token.to_owned()));
            }
        }
        Ok(Self {
            action: action.to_owned(),
            scope,
            entity: entity.to_owned(),
        })
    }
}

impl serde::Serialize for ScopedPermission {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ScopedPermission {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Default)]
pub struct ScopedPermissionBuilder {
    action: Option<String>,
    scope: Option<OwnershipScope>,
    entity: Option<String>,
}

impl ScopedPermissionBuilder {
    #[must_use]
    pub fn action(mut self, action: &str) -> Self {
        self.action = Some(action.to_owned());
        self
    }

    #[must_use]
    pub fn scope(mut self, scope: OwnershipScope) -> Self {
        self.scope = Some(scope);
        self
    }

    #[must_use]
    pub fn entity(mut self, entity: &str) -> Self {
        self.entity = Some(entity.to_owned());
        self
    }

    /// Build the permission
    ///
    /// # Errors
    ///
    /// Returns an error if `action` or `entity` is missing or contains
    /// characters other than ASCII alphanumerics and underscores.
    pub fn build(self) -> anyhow::Result<ScopedPermission> {
        let action = self
            .action
            .ok_or_else(|| anyhow::anyhow!("action is required"))?;
        let entity = self
            .entity
            .ok_or_else(|| anyhow::anyhow!("entity is required"))?;
        for token in [&action, &entity] {
            if !valid_token(token) {
                return Err(PermissionParseError::Token(token.clone()).into());
            }
        }
        Ok(ScopedPermission {
            action,
            scope: self.scope,
            entity,
        })
    }
}
