//! Spec expansion: resolve a spec's `base` chain into one flat mapping.
//!
//! A spec names its parent under a reserved key (`main.base` by default).
//! The parent is expanded first, then the child is deep-merged over it.

use serde_json::Value;
use tracing::debug;

use crate::error::{DatError, Result};
use crate::merge::merge_specs;
use crate::namespace::Kind;
use crate::resolver::Resolver;
use crate::value::{describe, get_path, is_truthy, remove_path, Spec};


/// Names of the reserved spec keys, all under one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecKeys {
    section: String,
}

impl Default for SpecKeys {
    fn default() -> Self {
        SpecKeys::new("main")
    }
}

impl SpecKeys {
    /// An empty section places the reserved keys at the root of the spec.
    pub fn new(section: &str) -> Self {
        SpecKeys {
            section: section.to_string(),
        }
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn key(&self, name: &str) -> String {
        if self.section.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.section, name)
        }
    }

    pub fn base(&self) -> String {
        self.key("base")
    }

    /// The entry point to call.
    pub fn entry(&self) -> String {
        self.key("do")
    }

    pub fn args(&self) -> String {
        self.key("args")
    }

    pub fn kwargs(&self) -> String {
        self.key("kwargs")
    }

    pub fn path(&self) -> String {
        self.key("path")
    }

    pub fn class(&self) -> String {
        self.key("class")
    }

    pub fn kind(&self) -> String {
        self.key("kind")
    }
}


/// A spec given by dotted name or inline.
#[derive(Debug, Clone)]
pub enum SpecSource {
    Name(String),
    Inline(Spec),
}

impl From<&str> for SpecSource {
    fn from(name: &str) -> Self {
        SpecSource::Name(name.to_string())
    }
}

impl From<String> for SpecSource {
    fn from(name: String) -> Self {
        SpecSource::Name(name)
    }
}

impl From<Spec> for SpecSource {
    fn from(spec: Spec) -> Self {
        SpecSource::Inline(spec)
    }
}


/// Expand a spec and every base it inherits from.
///
/// The consumed base key is removed from the result, and a section left
/// empty by that removal is dropped. A spec without a base comes back
/// unchanged.
pub fn expand(resolver: &mut Resolver, keys: &SpecKeys, source: impl Into<SpecSource>) -> Result<Spec> {
    let mut chain = Vec::new();
    match source.into() {
        SpecSource::Name(name) => expand_named(resolver, keys, &name, &mut chain),
        SpecSource::Inline(spec) => expand_spec(resolver, keys, spec, &mut chain),
    }
}

fn expand_named(
    resolver: &mut Resolver,
    keys: &SpecKeys,
    name: &str,
    chain: &mut Vec<String>,
) -> Result<Spec> {
    if chain.iter().any(|n| n == name) {
        let mut cycle = chain.clone();
        cycle.push(name.to_string());
        return Err(DatError::CyclicBase { chain: cycle });
    }
    chain.push(name.to_string());
    let spec = resolver.load_spec(name)?;
    let expanded = expand_spec(resolver, keys, spec, chain)?;
    chain.pop();
    Ok(expanded)
}

fn expand_spec(
    resolver: &mut Resolver,
    keys: &SpecKeys,
    spec: Spec,
    chain: &mut Vec<String>,
) -> Result<Spec> {
    let base_key = keys.base();
    let base = match get_path(&spec, &base_key) {
        Some(b) if is_truthy(b) => b.clone(),
        _ => return Ok(spec),
    };
    let expanded_base = match base {
        Value::String(name) => {
            debug!(base = %name, "expanding base");
            expand_named(resolver, keys, &name, chain)?
        }
        Value::Object(inline) => expand_spec(resolver, keys, inline, chain)?,
        other => {
            return Err(DatError::TypeMismatch {
                name: base_key,
                expected: format!("a dotted name or {}", Kind::Mapping),
                found: describe(&other).into(),
            })
        }
    };
    let mut merged = merge_specs(&expanded_base, &spec);
    remove_path(&mut merged, &base_key);
    Ok(merged)
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(v: Value) -> Spec {
        v.as_object().cloned().unwrap()
    }

    fn resolver_with(values: &[(&str, Value)]) -> Resolver {
        let mut r = Resolver::new();
        for (name, v) in values {
            r.mount_value(name, v.clone());
        }
        r
    }

    #[test]
    fn spec_without_base_is_unchanged() {
        let mut r = Resolver::new();
        let s = spec(json!({"main": {"do": "a.b"}, "x": [1, 2], "y": {"z": null}}));
        assert_eq!(expand(&mut r, &SpecKeys::default(), s.clone()).unwrap(), s);
    }

    #[test]
    fn root_level_base_inherits() {
        let mut r = resolver_with(&[("parent", json!({"title": "p", "extra": 1}))]);
        let s = spec(json!({"base": "parent", "title": "child"}));
        let out = expand(&mut r, &SpecKeys::new(""), s).unwrap();
        assert_eq!(Value::Object(out), json!({"title": "child", "extra": 1}));
    }

    #[test]
    fn sectioned_base_chain() {
        let mut r = resolver_with(&[
            ("grand", json!({"main": {"do": "hello.run", "args": [1]}, "n": 1, "deep": {"a": 1}})),
            ("parent", json!({"main": {"base": "grand"}, "n": 2, "deep": {"b": 2}})),
        ]);
        let s = spec(json!({"main": {"base": "parent"}, "deep": {"c": 3}}));
        let out = expand(&mut r, &SpecKeys::default(), s).unwrap();
        assert_eq!(
            Value::Object(out),
            json!({"main": {"do": "hello.run", "args": [1]}, "n": 2, "deep": {"a": 1, "b": 2, "c": 3}})
        );
    }

    #[test]
    fn empty_section_is_pruned() {
        let mut r = resolver_with(&[("p", json!({"v": 1}))]);
        let out = expand(&mut r, &SpecKeys::default(), spec(json!({"main": {"base": "p"}}))).unwrap();
        assert_eq!(Value::Object(out), json!({"v": 1}));
    }

    #[test]
    fn inline_mapping_base() {
        let mut r = resolver_with(&[("root", json!({"a": 1, "b": 1}))]);
        let s = spec(json!({"base": {"base": "root", "b": 2}, "c": 3}));
        let out = expand(&mut r, &SpecKeys::new(""), s).unwrap();
        assert_eq!(Value::Object(out), json!({"a": 1, "b": 2, "c": 3}));
    }

    #[test]
    fn named_source_is_loaded_first() {
        let mut r = resolver_with(&[
            ("parent", json!({"title": "p"})),
            ("child", json!({"base": "parent", "extra": true})),
        ]);
        let out = expand(&mut r, &SpecKeys::new(""), "child").unwrap();
        assert_eq!(Value::Object(out), json!({"title": "p", "extra": true}));
    }

    #[test]
    fn cycle_is_detected() {
        let mut r = resolver_with(&[
            ("a", json!({"base": "b"})),
            ("b", json!({"base": "a"})),
        ]);
        match expand(&mut r, &SpecKeys::new(""), "a") {
            Err(DatError::CyclicBase { chain }) => assert_eq!(chain, vec!["a", "b", "a"]),
            other => panic!("expected CyclicBase, got {:?}", other),
        }
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let mut r = resolver_with(&[("me", json!({"base": "me"}))]);
        assert!(matches!(
            expand(&mut r, &SpecKeys::new(""), spec(json!({"base": "me"}))),
            Err(DatError::CyclicBase { .. })
        ));
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let mut r = resolver_with(&[
            ("common", json!({"c": 1})),
            ("left", json!({"base": "common", "l": 1})),
        ]);
        let s = spec(json!({"base": {"base": "left", "r": {"base": "common"}}}));
        let out = expand(&mut r, &SpecKeys::new(""), s).unwrap();
        assert_eq!(out.get("l"), Some(&json!(1)));
    }

    #[test]
    fn missing_base_propagates() {
        let mut r = Resolver::new();
        assert!(matches!(
            expand(&mut r, &SpecKeys::new(""), spec(json!({"base": "ghost"}))),
            Err(DatError::NotFound { .. })
        ));
    }

    #[test]
    fn non_mapping_base_is_type_mismatch() {
        let mut r = resolver_with(&[("n", json!(5))]);
        assert!(matches!(
            expand(&mut r, &SpecKeys::new(""), spec(json!({"base": "n"}))),
            Err(DatError::TypeMismatch { .. })
        ));
        assert!(matches!(
            expand(&mut r, &SpecKeys::new(""), spec(json!({"base": 7}))),
            Err(DatError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn key_names() {
        let k = SpecKeys::default();
        assert_eq!(k.base(), "main.base");
        assert_eq!(k.entry(), "main.do");
        assert_eq!(SpecKeys::new("").kwargs(), "kwargs");
    }
}
