//! Value tree: the recursive string-keyed mapping behind every spec,
//! override, and result record.
//!
//! Values are `serde_json::Value`; a `Spec` is a JSON object at the root.
//! Dotted paths (`main.args`, `dat.my_key1`) address nested mappings.

use serde_json::{Map, Value};

use crate::error::{DatError, Result};

/// A mapping at the root of every spec and result.
pub type Spec = Map<String, Value>;


/// Split a dotted path into its segments. An empty path has no segments.
pub fn segments(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    }
}

/// Look up a dotted path inside a spec.
///
/// Returns `None` when any segment is absent, when an intermediate value is
/// not a mapping, or when the value found is `null`.
pub fn get_path<'a>(spec: &'a Spec, path: &str) -> Option<&'a Value> {
    let parts = segments(path);
    let (first, rest) = parts.split_first()?;
    let mut current = spec.get(*first)?;
    for part in rest {
        current = current.as_object()?.get(*part)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Index into a value by already-split segments.
pub fn lookup<'a>(value: &'a Value, parts: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for part in parts {
        current = current.as_object()?.get(*part)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Set a value at a dotted path, creating intermediate mappings as needed.
pub fn set_path(spec: &mut Spec, path: &str, value: Value) -> Result<()> {
    let parts = segments(path);
    let Some((last, parents)) = parts.split_last() else {
        return Err(DatError::InvalidArgument("set requires at least one key".into()));
    };
    let mut current = spec;
    for part in parents {
        let slot = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(m) => m,
            other => {
                return Err(DatError::InvalidArgument(format!(
                    "expected a mapping at '{}' in '{}', found {}",
                    part,
                    path,
                    describe(other)
                )))
            }
        };
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Remove the value at a dotted path, pruning parent mappings left empty.
pub fn remove_path(spec: &mut Spec, path: &str) -> Option<Value> {
    let parts = segments(path);
    remove_in(spec, &parts)
}

fn remove_in(map: &mut Spec, parts: &[&str]) -> Option<Value> {
    let (first, rest) = parts.split_first()?;
    if rest.is_empty() {
        return map.remove(*first);
    }
    let child = map.get_mut(*first)?.as_object_mut()?;
    let removed = remove_in(child, rest);
    if removed.is_some() && child.is_empty() {
        map.remove(*first);
    }
    removed
}

/// Apply `key.sub=value` assignments to a spec.
///
/// Whitespace around the key and value is trimmed. Values parse as an
/// integer, then a float, and otherwise stay strings.
pub fn apply_assignments<S: AsRef<str>>(spec: &mut Spec, assignments: &[S]) -> Result<()> {
    for assignment in assignments {
        let assignment = assignment.as_ref();
        let (key, raw) = assignment.split_once('=').ok_or_else(|| {
            DatError::InvalidArgument(format!("assignment '{}' has no '='", assignment))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(DatError::InvalidArgument(format!(
                "assignment '{}' has an empty key",
                assignment
            )));
        }
        set_path(spec, key, parse_scalar(raw.trim()))?;
    }
    Ok(())
}

/// Parse a command-line scalar: integer, then float, else string.
pub fn parse_scalar(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = text.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(text.to_string())
}

/// Falsy values never override during a merge: null, false, zero, and empty
/// strings, lists, or mappings.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

/// Short type name used in error messages.
pub fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// Require a value to be a mapping at the root.
pub fn into_spec(value: Value, name: &str) -> Result<Spec> {
    match value {
        Value::Object(m) => Ok(m),
        other => Err(DatError::TypeMismatch {
            name: name.to_string(),
            expected: "a mapping".into(),
            found: describe(&other).into(),
        }),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(v: Value) -> Spec {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn get_nested_value() {
        let s = spec(json!({"dat": {"my_key1": "my_val1"}}));
        assert_eq!(get_path(&s, "dat.my_key1"), Some(&json!("my_val1")));
        assert_eq!(get_path(&s, "dat.nope"), None);
        assert_eq!(get_path(&s, "dat.my_key1.deeper"), None);
    }

    #[test]
    fn get_treats_null_as_absent() {
        let s = spec(json!({"a": null, "b": 0}));
        assert_eq!(get_path(&s, "a"), None);
        assert_eq!(get_path(&s, "b"), Some(&json!(0)));
    }

    #[test]
    fn get_empty_path_is_none() {
        let s = spec(json!({"a": 1}));
        assert_eq!(get_path(&s, ""), None);
    }

    #[test]
    fn set_creates_intermediate_maps() {
        let mut s = Spec::new();
        set_path(&mut s, "main.args", json!([1, 2])).unwrap();
        assert_eq!(Value::Object(s), json!({"main": {"args": [1, 2]}}));
    }

    #[test]
    fn set_replaces_null_parent() {
        let mut s = spec(json!({"main": null}));
        set_path(&mut s, "main.do", json!("x.y")).unwrap();
        assert_eq!(get_path(&s, "main.do"), Some(&json!("x.y")));
    }

    #[test]
    fn set_through_scalar_fails() {
        let mut s = spec(json!({"main": 3}));
        let err = set_path(&mut s, "main.do", json!("x")).unwrap_err();
        assert!(err.to_string().contains("expected a mapping at 'main'"));
    }

    #[test]
    fn remove_prunes_empty_parents() {
        let mut s = spec(json!({"main": {"base": "p"}, "title": "t"}));
        assert_eq!(remove_path(&mut s, "main.base"), Some(json!("p")));
        assert_eq!(Value::Object(s), json!({"title": "t"}));
    }

    #[test]
    fn remove_keeps_non_empty_parents() {
        let mut s = spec(json!({"main": {"base": "p", "do": "f"}}));
        remove_path(&mut s, "main.base");
        assert_eq!(Value::Object(s), json!({"main": {"do": "f"}}));
    }

    #[test]
    fn assignments_parse_numbers_then_strings() {
        let mut s = Spec::new();
        apply_assignments(&mut s, &["main.title = Quickie", "start=100", "ratio=0.5"]).unwrap();
        assert_eq!(
            Value::Object(s),
            json!({"main": {"title": "Quickie"}, "start": 100, "ratio": 0.5})
        );
    }

    #[test]
    fn assignment_without_equals_fails() {
        let mut s = Spec::new();
        assert!(apply_assignments(&mut s, &["nope"]).is_err());
        assert!(apply_assignments(&mut s, &[" =3"]).is_err());
    }

    #[test]
    fn truthiness() {
        for v in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!is_truthy(&v), "{} should be falsy", v);
        }
        for v in [json!(true), json!(1), json!(-2.5), json!("x"), json!([0]), json!({"a": null})] {
            assert!(is_truthy(&v), "{} should be truthy", v);
        }
    }

    #[test]
    fn into_spec_rejects_scalars() {
        assert!(into_spec(json!({"a": 1}), "x").is_ok());
        match into_spec(json!([1]), "x") {
            Err(DatError::TypeMismatch { found, .. }) => assert_eq!(found, "a list"),
            other => panic!("expected TypeMismatch, got {:?}", other),
        }
    }
}
