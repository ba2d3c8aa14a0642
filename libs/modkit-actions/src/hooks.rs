//! Extension points, injected explicitly into every action.
//!
//! Transform slots hold ordered `(value, args) -> value` functions applied in
//! registration order. They must be pure: their only effect is the returned value.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sea_orm::sea_query::Condition;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::alias::AliasMap;
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookSlot {
    OnWillCreate,
    OnCreateResult,
    OnWillUpdate,
    OnUpdateResult,
    OnWillRemove,
    OnRemoveResult,
    OnWillBulkCreate,
    OnWillBulkUpdate,
    OnWillBulkMerge,
    OnListResult,
    OnGetResult,
}

/// Pure transform over a slot's value; the second argument is the caller's original args.
pub type Transform = Arc<dyn Fn(Value, &Record) -> Value + Send + Sync>;

/// Extra list predicate built from the request args.
pub type ListWhereFn = Arc<dyn Fn(&Record, &AliasMap) -> Condition + Send + Sync>;

/// Maps a listed row to a suggestion.
pub type SuggestFn = Arc<dyn Fn(&Record) -> SuggestTuple + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestTuple {
    pub value: Value,
    pub label: Value,
}

#[derive(Clone, Default)]
pub struct HookRegistry {
    transforms: HashMap<HookSlot, Vec<Transform>>,
    list_where: Vec<ListWhereFn>,
    suggest: Option<SuggestFn>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut slots: Vec<(HookSlot, usize)> =
            self.transforms.iter().map(|(slot, fns)| (*slot, fns.len())).collect();
        slots.sort_by_key(|(slot, _)| format!("{slot:?}"));
        f.debug_struct("HookRegistry")
            .field("transforms", &slots)
            .field("list_where", &self.list_where.len())
            .field("suggest", &self.suggest.is_some())
            .finish()
    }
}

impl HookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transform to `slot`.
    #[must_use]
    pub fn on<F>(mut self, slot: HookSlot, f: F) -> Self
    where
        F: Fn(Value, &Record) -> Value + Send + Sync + 'static,
    {
        self.transforms.entry(slot).or_default().push(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_build_list_where<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record, &AliasMap) -> Condition + Send + Sync + 'static,
    {
        self.list_where.push(Arc::new(f));
        self
    }

    /// Replace the default suggestion mapping.
    #[must_use]
    pub fn on_suggest_tuple<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record) -> SuggestTuple + Send + Sync + 'static,
    {
        self.suggest = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn has(&self, slot: HookSlot) -> bool {
        self.transforms.get(&slot).is_some_and(|fns| !fns.is_empty())
    }

    /// Run `value` through every transform of `slot`, in order.
    #[must_use]
    pub fn apply(&self, slot: HookSlot, value: Value, args: &Record) -> Value {
        match self.transforms.get(&slot) {
            Some(fns) => fns.iter().fold(value, |acc, f| f(acc, args)),
            None => value,
        }
    }

    pub(crate) fn list_where(&self) -> &[ListWhereFn] {
        &self.list_where
    }

    pub(crate) fn suggest(&self) -> Option<&SuggestFn> {
        self.suggest.as_ref()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transforms_run_in_registration_order() {
        let hooks = HookRegistry::new()
            .on(HookSlot::OnWillCreate, |mut v, _| {
                v["trail"] = json!(format!("{}a", v["trail"].as_str().unwrap_or_default()));
                v
            })
            .on(HookSlot::OnWillCreate, |mut v, _| {
                v["trail"] = json!(format!("{}b", v["trail"].as_str().unwrap_or_default()));
                v
            });

        let out = hooks.apply(HookSlot::OnWillCreate, json!({"trail": ""}), &Record::new());
        assert_eq!(out["trail"], "ab");
    }

    #[test]
    fn empty_slot_is_identity() {
        let hooks = HookRegistry::new();
        assert!(!hooks.has(HookSlot::OnGetResult));
        assert_eq!(hooks.apply(HookSlot::OnGetResult, json!(null), &Record::new()), json!(null));
    }

    #[test]
    fn transforms_see_original_args() {
        let hooks = HookRegistry::new().on(HookSlot::OnCreateResult, |mut v, args| {
            v["requestedBy"] = args.get("_subject").cloned().unwrap_or_default();
            v
        });
        let args = json!({"_subject": "7"}).as_object().cloned().unwrap();
        let out = hooks.apply(HookSlot::OnCreateResult, json!({"id": 1}), &args);
        assert_eq!(out, json!({"id": 1, "requestedBy": "7"}));
    }
}
