//! Dynamic records and their translation into SQL values.

use sea_orm::sea_query::{Keyword, SimpleExpr, Value as SqlValue};
use serde_json::Value;

/// A row or an argument bag, keyed by logical column name.
pub type Record = serde_json::Map<String, Value>;

/// Keep only `keys`, falling back to `defaults` for keys absent from `src`.
pub(crate) fn sub_record(src: &Record, keys: &[String], defaults: &Record) -> Record {
    let mut out = Record::new();
    for key in keys {
        if let Some(v) = src.get(key).or_else(|| defaults.get(key)) {
            out.insert(key.clone(), v.clone());
        }
    }
    out
}

/// Every key present with a non-null value.
pub(crate) fn has_all(src: &Record, keys: &[String]) -> bool {
    keys.iter()
        .all(|k| src.get(k).is_some_and(|v| !v.is_null()))
}

pub(crate) fn sql_value(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::String(None),
        Value::Bool(b) => SqlValue::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::from(i)
            } else if let Some(u) = n.as_u64() {
                SqlValue::from(u)
            } else {
                SqlValue::from(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => SqlValue::from(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::from(v.clone()),
    }
}

/// Value expression for INSERT/UPDATE; JSON null becomes an untyped `NULL`.
pub(crate) fn sql_expr(v: &Value) -> SimpleExpr {
    if v.is_null() {
        SimpleExpr::Keyword(Keyword::Null)
    } else {
        SimpleExpr::Value(sql_value(v))
    }
}

/// Integer argument given as a number or a numeric string.
pub(crate) fn as_u64(v: Option<&Value>) -> Option<u64> {
    match v? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Copy of `record` with sensitive columns masked, for logging.
pub(crate) fn redacted(record: &Record, columns: &[String]) -> Record {
    let mut out = record.clone();
    for col in columns {
        if let Some(v) = out.get_mut(col) {
            *v = Value::String("[REDACTED]".to_owned());
        }
    }
    out
}

/// Join the values of `keys` with `glue`; missing keys contribute an empty string.
pub(crate) fn aggregate_keys(record: &Record, keys: &[String], glue: &str) -> String {
    keys.iter()
        .map(|k| match record.get(k) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(glue)
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
    fn sub_record_prefers_args_over_defaults() {
        let src = rec(json!({"name": "Ada", "age": 36, "ignored": true}));
        let defaults = rec(json!({"age": 1, "active": true}));
        let keys = vec!["name".to_owned(), "age".to_owned(), "active".to_owned(), "missing".to_owned()];
        assert_eq!(
            Value::Object(sub_record(&src, &keys, &defaults)),
            json!({"name": "Ada", "age": 36, "active": true})
        );
    }

    #[test]
    fn has_all_rejects_nulls() {
        let src = rec(json!({"id": 1, "tenantId": null}));
        assert!(has_all(&src, &["id".to_owned()]));
        assert!(!has_all(&src, &["id".to_owned(), "tenantId".to_owned()]));
    }

    #[test]
    fn numeric_strings_parse() {
        assert_eq!(as_u64(Some(&json!("12"))), Some(12));
        assert_eq!(as_u64(Some(&json!(3))), Some(3));
        assert_eq!(as_u64(Some(&json!("x"))), None);
        assert_eq!(as_u64(Some(&json!(-1))), None);
        assert_eq!(as_u64(None), None);
    }

    #[test]
    fn aggregates_composite_keys() {
        let r = rec(json!({"personId": 4, "key": "theme"}));
        let keys = vec!["personId".to_owned(), "key".to_owned(), "gone".to_owned()];
        assert_eq!(aggregate_keys(&r, &keys, ":"), "4:theme:");
    }

    #[test]
    fn redaction_masks_listed_columns() {
        let r = rec(json!({"email": "a@b.c", "password": "hunter2"}));
        let masked = redacted(&r, &["password".to_owned()]);
        assert_eq!(masked["password"], json!("[REDACTED]"));
        assert_eq!(masked["email"], json!("a@b.c"));
    }
}
