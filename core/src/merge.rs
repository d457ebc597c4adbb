use serde_json::Value;

use crate::value::{is_truthy, Spec};

/// Deep-merge `overlay` over `base`, returning a new mapping.
///
/// For each key of the overlay: two mappings merge recursively; otherwise a
/// truthy overlay value replaces the base value, and a falsy one (null, false,
/// 0, "", [], {}) leaves a present base value in place. Keys the base lacks
/// take the overlay value as-is, falsy or not: `{"a": 0}` over `{}` gives
/// `{"a": 0}`, not `{"a": null}`. Neither input is modified.
pub fn merge_specs(base: &Spec, overlay: &Spec) -> Spec {
    let mut merged = base.clone();
    for (key, over) in overlay {
        let next = match merged.get(key) {
            Some(existing) => merge_values(existing, over),
            None => over.clone(),
        };
        merged.insert(key.clone(), next);
    }
    merged
}

/// Merge a single overlay value over a base value.
pub fn merge_values(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(b), Value::Object(o)) => Value::Object(merge_specs(b, o)),
        (_, o) if is_truthy(o) => o.clone(),
        (Value::Null, o) => o.clone(),
        (b, _) => b.clone(),
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
    fn overlay_wins_for_scalars() {
        let merged = merge_specs(&spec(json!({"title": "p", "extra": 1})), &spec(json!({"title": "child"})));
        assert_eq!(Value::Object(merged), json!({"title": "child", "extra": 1}));
    }

    #[test]
    fn nested_mappings_merge_recursively() {
        let base = spec(json!({"main": {"do": "a.run", "args": [1]}, "x": {"y": {"z": 1, "w": 2}}}));
        let over = spec(json!({"main": {"args": [2]}, "x": {"y": {"z": 9}}}));
        let merged = merge_specs(&base, &over);
        assert_eq!(
            Value::Object(merged),
            json!({"main": {"do": "a.run", "args": [2]}, "x": {"y": {"z": 9, "w": 2}}})
        );
    }

    #[test]
    fn falsy_overlay_keeps_base() {
        let base = spec(json!({"a": 5, "b": "keep", "c": true, "d": [1], "e": {"k": 1}}));
        let over = spec(json!({"a": 0, "b": "", "c": false, "d": [], "e": null}));
        assert_eq!(merge_specs(&base, &over), base);
    }

    #[test]
    fn falsy_overlay_on_absent_key_is_inserted() {
        let merged = merge_specs(&Spec::new(), &spec(json!({"a": 0, "b": null})));
        assert_eq!(Value::Object(merged), json!({"a": 0, "b": null}));
    }

    #[test]
    fn mapping_replaces_scalar() {
        let merged = merge_specs(&spec(json!({"a": 1})), &spec(json!({"a": {"b": 2}})));
        assert_eq!(Value::Object(merged), json!({"a": {"b": 2}}));
    }

    #[test]
    fn scalar_replaces_mapping() {
        let merged = merge_specs(&spec(json!({"a": {"b": 2}})), &spec(json!({"a": "flat"})));
        assert_eq!(Value::Object(merged), json!({"a": "flat"}));
    }

    #[test]
    fn inputs_are_untouched() {
        let base = spec(json!({"a": {"b": 1}}));
        let over = spec(json!({"a": {"c": 2}}));
        let _ = merge_specs(&base, &over);
        assert_eq!(Value::Object(base), json!({"a": {"b": 1}}));
        assert_eq!(Value::Object(over), json!({"a": {"c": 2}}));
    }

    #[test]
    fn repeated_overlay_is_idempotent() {
        let base = spec(json!({"a": {"b": 1, "c": [1, 2]}, "d": "x", "e": 3}));
        let over = spec(json!({"a": {"b": 2, "n": null}, "d": "", "f": {"g": 0}}));
        let once = merge_specs(&base, &over);
        let twice = merge_specs(&once, &over);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_overlay_is_identity() {
        let base = spec(json!({"a": {"b": 1}}));
        assert_eq!(merge_specs(&base, &Spec::new()), base);
    }
}
