use serde_json::Value;

/// The caller on whose behalf an action runs.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Subject {
    pub(crate) id: String,
}

impl Subject {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Loose ownership comparison against a stored owner value.
    ///
    /// Owner columns are usually integers while subject ids travel as strings,
    /// so `12` and `"12"` are the same owner. Null, booleans and containers never match.
    #[must_use]
    pub fn is_owner(&self, owner: &Value) -> bool {
        match owner {
            Value::String(s) => *s == self.id,
            Value::Number(n) => n.to_string() == self.id,
            Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => false,
        }
    }
}

impl From<&str> for Subject {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn owner_match_is_loose_across_numbers_and_strings() {
        let subject = Subject::new("12");
        assert!(subject.is_owner(&json!(12)));
        assert!(subject.is_owner(&json!("12")));
        assert!(!subject.is_owner(&json!(13)));
        assert!(!subject.is_owner(&Value::Null));
        assert!(!subject.is_owner(&json!(true)));
    }
}
