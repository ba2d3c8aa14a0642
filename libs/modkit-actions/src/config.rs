//! Engine-wide tunables, loaded with figment.
//!
//! ```yaml
//! actions:
//!   list:
//!     default_limit: 25
//!     max_limit: 500
//!     local_page_window: 7
//!   iterate:
//!     page_limit: 200
//!     max_iterations: 5000
//!     timeout: 10m
//! ```
//!
//! Environment overrides use the `ACTIONS__` prefix with `__` as the path
//! separator, e.g. `ACTIONS__LIST__DEFAULT_LIMIT=50`.

use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::error::ActionError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    pub list: ListConfig,
    pub iterate: IterateConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListConfig {
    /// Page size when the caller sends none and the entity sets none.
    pub default_limit: u64,
    /// Upper bound for any requested page size.
    pub max_limit: u64,
    /// Width of the `localPages` window.
    pub local_page_window: u64,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 1000,
            local_page_window: 10,
        }
    }
}

impl ListConfig {
    /// Effective page size for a request.
    #[must_use]
    pub fn clamp_limit(&self, requested: Option<u64>, entity_default: Option<u64>) -> u64 {
        let limit = requested
            .filter(|l| *l > 0)
            .or(entity_default)
            .unwrap_or(self.default_limit);
        limit.clamp(1, self.max_limit.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterateConfig {
    pub page_limit: u64,
    pub max_iterations: u64,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for IterateConfig {
    fn default() -> Self {
        Self {
            page_limit: 100,
            max_iterations: 10_000,
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl ActionsConfig {
    /// Extract the `actions` section of an application figment, defaults filling gaps.
    ///
    /// # Errors
    /// Returns `Config` when the section is present but malformed.
    pub fn from_figment(figment: &Figment) -> Result<Self, ActionError> {
        let cfg = Figment::from(Serialized::defaults(Self::default()))
            .merge(figment.focus("actions"))
            .extract()?;
        Ok(cfg)
    }

    /// Load from an optional YAML file plus `ACTIONS__*` environment overrides.
    ///
    /// # Errors
    /// Returns `Config` when a provider fails or a value has the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self, ActionError> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let figment = figment.merge(
            Env::prefixed("ACTIONS__")
                .split("__")
                .map(|key| format!("actions.{key}").into()),
        );
        Self::from_figment(&figment)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_section() {
        let cfg = ActionsConfig::from_figment(&Figment::new()).unwrap();
        assert_eq!(cfg, ActionsConfig::default());
        assert_eq!(cfg.list.default_limit, 10);
        assert_eq!(cfg.iterate.timeout, Duration::from_secs(1800));
    }

    #[test]
    fn yaml_overrides_merge_with_defaults() {
        let figment = Figment::new().merge(Yaml::string(
            "actions:\n  list:\n    default_limit: 25\n  iterate:\n    timeout: 90s\n",
        ));
        let cfg = ActionsConfig::from_figment(&figment).unwrap();
        assert_eq!(cfg.list.default_limit, 25);
        assert_eq!(cfg.list.max_limit, 1000);
        assert_eq!(cfg.iterate.timeout, Duration::from_secs(90));
        assert_eq!(cfg.iterate.page_limit, 100);
    }

    #[test]
    fn malformed_values_are_config_errors() {
        let figment = Figment::new().merge(Yaml::string("actions:\n  list:\n    default_limit: many\n"));
        assert!(matches!(
            ActionsConfig::from_figment(&figment),
            Err(ActionError::Config(_))
        ));
    }

    #[test]
    fn clamp_limit_prefers_request_then_entity_then_default() {
        let list = ListConfig {
            default_limit: 10,
            max_limit: 50,
            local_page_window: 10,
        };
        assert_eq!(list.clamp_limit(Some(20), Some(5)), 20);
        assert_eq!(list.clamp_limit(None, Some(5)), 5);
        assert_eq!(list.clamp_limit(Some(0), None), 10);
        assert_eq!(list.clamp_limit(Some(500), None), 50);
    }
}
