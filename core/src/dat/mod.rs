//! Artifacts ("dats"): filesystem folders holding a spec and a result.
//!
//! A `Dat` is shared as a `DatHandle` so that every load of the same folder
//! within one process sees the same instance. The `DatManager` owns path
//! allocation and the handle cache.

pub mod manager;
pub mod path;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::Value;

use crate::error::{DatError, Result};
use crate::value::{get_path, Spec};

pub use manager::DatManager;

/// Spec file name; JSON is checked before YAML.
pub const SPEC_JSON: &str = "_spec_.json";
pub const SPEC_YAML: &str = "_spec_.yaml";
/// Result file name, always JSON.
pub const RESULT_JSON: &str = "_result_.json";

pub type DatHandle = Rc<RefCell<Dat>>;


// ---------------------------------------------------------------------------
// Lifecycle and classes
// ---------------------------------------------------------------------------

/// Whether a handle still refers to its folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    Deleted,
    Moved { to: PathBuf },
}

/// Per-variant state of an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatClass {
    Plain,
    Container(ContainerState),
}

/// Lazily discovered members of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerState {
    pub(crate) dat_paths: Option<Vec<PathBuf>>,
}

type ClassCtor = fn() -> DatClass;

/// Closed table from class selector to variant constructor.
#[derive(Debug, Clone)]
pub struct ClassRegistry {
    ctors: BTreeMap<String, ClassCtor>,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        let mut reg = ClassRegistry {
            ctors: BTreeMap::new(),
        };
        reg.register("Dat", || DatClass::Plain);
        reg.register("DatContainer", || DatClass::Container(ContainerState::default()));
        reg
    }
}

impl ClassRegistry {
    /// Add an alias for one of the variants, e.g. a project-specific kind.
    pub fn register(&mut self, name: &str, ctor: ClassCtor) {
        self.ctors.insert(name.to_string(), ctor);
    }

    pub fn instantiate(&self, name: &str) -> Result<DatClass> {
        self.ctors
            .get(name)
            .map(|ctor| ctor())
            .ok_or_else(|| DatError::UnknownDatClass {
                class: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.ctors.keys().map(|k| k.as_str()).collect()
    }
}


// ---------------------------------------------------------------------------
// Dat
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Dat {
    path: PathBuf,
    name: String,
    spec: Spec,
    result: Spec,
    class_name: String,
    kind: String,
    class: DatClass,
    lifecycle: Lifecycle,
}

impl Dat {
    pub(crate) fn new(path: PathBuf, name: String, spec: Spec, class_name: String, kind: Option<String>, class: DatClass) -> Self {
        let kind = kind.unwrap_or_else(|| class_name.clone());
        Dat {
            path,
            name,
            spec,
            result: Spec::new(),
            class_name,
            kind,
            class,
            lifecycle: Lifecycle::Active,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    pub fn result(&self) -> &Spec {
        &self.result
    }

    pub fn result_mut(&mut self) -> &mut Spec {
        &mut self.result
    }

    /// Dotted lookup into the spec.
    pub fn get(&self, dotted: &str) -> Option<&Value> {
        get_path(&self.spec, dotted)
    }

    /// Path relative to the sync folder when inside it, else the full path.
    pub fn path_name(&self) -> &str {
        &self.name
    }

    /// Last component of the path.
    pub fn path_tail(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The spec's kind, defaulting to the class name.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn class(&self) -> &DatClass {
        &self.class
    }

    pub fn is_container(&self) -> bool {
        matches!(self.class, DatClass::Container(_))
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    pub(crate) fn set_result(&mut self, result: Spec) {
        self.result = result;
    }

    pub(crate) fn retire(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }

    pub(crate) fn container_mut(&mut self) -> Option<&mut ContainerState> {
        match &mut self.class {
            DatClass::Container(state) => Some(state),
            DatClass::Plain => None,
        }
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(DatError::Retired {
                path: self.path.clone(),
            })
        }
    }
}

impl fmt::Display for Dat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}: {}>", self.kind, self.name)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(kind: Option<&str>) -> Dat {
        let spec = json!({"main": {"do": "hello.run"}}).as_object().cloned().unwrap();
        Dat::new(
            PathBuf::from("/data/runs/exp_2"),
            "runs/exp_2".into(),
            spec,
            "Dat".into(),
            kind.map(String::from),
            DatClass::Plain,
        )
    }

    #[test]
    fn display_uses_kind_then_class() {
        assert_eq!(sample(None).to_string(), "<Dat: runs/exp_2>");
        assert_eq!(sample(Some("Game")).to_string(), "<Game: runs/exp_2>");
    }

    #[test]
    fn accessors() {
        let mut dat = sample(None);
        assert_eq!(dat.path_tail(), "exp_2");
        assert_eq!(dat.get("main.do"), Some(&json!("hello.run")));
        assert!(dat.result().is_empty());
        dat.result_mut().insert("score".into(), json!(1));
        assert_eq!(dat.result().get("score"), Some(&json!(1)));
        assert!(!dat.is_container());
    }

    #[test]
    fn retired_handle_refuses_work() {
        let mut dat = sample(None);
        assert!(dat.ensure_active().is_ok());
        dat.retire(Lifecycle::Deleted);
        assert!(matches!(dat.ensure_active(), Err(DatError::Retired { .. })));
    }

    #[test]
    fn class_registry_defaults() {
        let mut reg = ClassRegistry::default();
        assert_eq!(reg.instantiate("Dat").unwrap(), DatClass::Plain);
        assert!(matches!(reg.instantiate("DatContainer").unwrap(), DatClass::Container(_)));
        assert!(matches!(reg.instantiate("Nope"), Err(DatError::UnknownDatClass { .. })));
        reg.register("GameSet", || DatClass::Container(ContainerState::default()));
        assert_eq!(reg.names(), vec!["Dat", "DatContainer", "GameSet"]);
    }
}
