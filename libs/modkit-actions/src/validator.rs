//! Argument validation derived from introspected column metadata.

use async_trait::async_trait;
use heck::ToTitleCase;
use modkit_errors::ValidationViolation;
use sea_orm::DatabaseTransaction;
use serde_json::Value;

use crate::actions::EntityAction;
use crate::error::ActionError;
use crate::introspect::{ColumnInfo, ColumnKind, TableInfo};
use crate::record::Record;

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldRule {
    field: String,
    label: String,
    kind: ColumnKind,
    required: bool,
    max_length: Option<u64>,
}

impl FieldRule {
    fn from_column(column: &ColumnInfo) -> Self {
        Self {
            field: column.name.clone(),
            label: column.name.to_title_case(),
            kind: column.kind,
            required: !column.nullable && !column.has_default,
            max_length: column.max_length,
        }
    }

    fn violation(&self, code: &str, message: String) -> ValidationViolation {
        ValidationViolation::new(self.field.clone(), message).with_code(code)
    }

    fn check(&self, value: Option<&Value>) -> Option<ValidationViolation> {
        let value = match value {
            None | Some(Value::Null) if self.required => {
                return Some(self.violation("required", format!("{} is required", self.label)));
            }
            None | Some(Value::Null) => return None,
            Some(v) => v,
        };
        let type_ok = match self.kind {
            ColumnKind::String | ColumnKind::Date => value.is_string(),
            ColumnKind::Int => value.is_i64() || value.is_u64(),
            ColumnKind::Number => value.is_number(),
            ColumnKind::Boolean => value.is_boolean(),
            ColumnKind::Json | ColumnKind::Other => true,
        };
        if !type_ok {
            let expected = match self.kind {
                ColumnKind::String => "a string",
                ColumnKind::Date => "a date string",
                ColumnKind::Int => "an integer",
                ColumnKind::Number => "a number",
                ColumnKind::Boolean => "true or false",
                ColumnKind::Json | ColumnKind::Other => "valid",
            };
            return Some(self.violation("type", format!("{} must be {expected}", self.label)));
        }
        let too_long = match (self.max_length, value.as_str()) {
            (Some(max), Some(s)) => s.chars().count() as u64 > max,
            _ => false,
        };
        if too_long {
            let max = self.max_length.unwrap_or_default();
            return Some(self.violation("max_length", format!("{} must be at most {max} characters", self.label)));
        }
        None
    }
}

/// `validate`: checks a chosen set of fields and reports every violation at once.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    rules: Vec<FieldRule>,
}

impl Validator {
    /// Rules for `fields` of `table`; every column when `fields` is empty.
    /// Fields the table does not have are ignored.
    #[must_use]
    pub fn from_table(table: &TableInfo, fields: &[String]) -> Self {
        let rules = table
            .columns
            .iter()
            .filter(|c| fields.is_empty() || fields.contains(&c.name))
            .map(FieldRule::from_column)
            .collect();
        Self { rules }
    }

    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.field.as_str()).collect()
    }

    /// Every violation in `args`, in field order.
    #[must_use]
    pub fn violations(&self, args: &Record) -> Vec<ValidationViolation> {
        self.rules.iter().filter_map(|rule| rule.check(args.get(&rule.field))).collect()
    }

    /// # Errors
    /// `BadRequest` carrying all violations when any field fails.
    pub fn validate(&self, args: &Record) -> Result<(), ActionError> {
        let violations = self.violations(args);
        if violations.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = violations.len(), "validation failed");
        Err(ActionError::BadRequest {
            message: "Invalid arguments".to_owned(),
            violations,
        })
    }
}

#[async_trait]
impl EntityAction for Validator {
    fn name(&self) -> &str {
        "validate"
    }

    async fn invoke(&self, args: Record, _tx: Option<&DatabaseTransaction>) -> Result<Value, ActionError> {
        self.validate(&args)?;
        Ok(Value::Bool(true))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn column(name: &str, kind: ColumnKind, nullable: bool, max_length: Option<u64>) -> ColumnInfo {
        ColumnInfo {
            name: name.to_owned(),
            data_type: String::new(),
            kind,
            nullable,
            has_default: false,
            max_length,
            primary_key: false,
        }
    }

    fn person_table() -> TableInfo {
        let mut id = column("id", ColumnKind::Int, false, None);
        id.has_default = true;
        id.primary_key = true;
        TableInfo {
            schema: None,
            table: "person".to_owned(),
            columns: vec![
                id,
                column("firstName", ColumnKind::String, false, Some(5)),
                column("age", ColumnKind::Int, true, None),
                column("active", ColumnKind::Boolean, true, None),
            ],
        }
    }

    #[test]
    fn collects_every_violation() {
        let v = Validator::from_table(&person_table(), &[]);
        let args = json!({"age": 1.5, "active": "yes"}).as_object().cloned().unwrap();
        let violations = v.violations(&args);
        let fields: Vec<_> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, ["firstName", "age", "active"]);
        assert_eq!(violations[0].message, "First Name is required");
        assert_eq!(violations[0].code.as_deref(), Some("required"));
    }

    #[test]
    fn enforces_max_length_in_characters() {
        let v = Validator::from_table(&person_table(), &["firstName".to_owned()]);
        assert!(v.validate(&json!({"firstName": "Ada"}).as_object().cloned().unwrap()).is_ok());
        let err = v
            .validate(&json!({"firstName": "Adelaide"}).as_object().cloned().unwrap())
            .unwrap_err();
        let ActionError::BadRequest { violations, .. } = err else {
            panic!("expected BadRequest");
        };
        assert_eq!(violations[0].code.as_deref(), Some("max_length"));
    }

    #[test]
    fn auto_assigned_keys_are_optional() {
        let v = Validator::from_table(&person_table(), &["id".to_owned()]);
        assert_eq!(v.fields(), ["id"]);
        assert!(v.validate(&Record::new()).is_ok());
    }
}
