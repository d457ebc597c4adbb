//! Resolver: turns dotted names into values, functions, or modules.
//!
//! The first registered prefix of a dotted name is its base. The base is
//! materialized once through the namespace index and cached; remaining
//! segments index into it. Exact-name overrides registered with
//! `mount_value` take precedence over everything else.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::{DatError, Result};
use crate::files::read_value;
use crate::namespace::{Kind, Loadable, LoadableEntry, Module, NamespaceIndex, PluginRegistry};
use crate::value::{describe, into_spec, lookup, Spec};


/// Where a cached base came from, for error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    File(PathBuf),
    InMemory,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::File(p) => write!(f, "{}", p.display()),
            Origin::InMemory => f.write_str("in-memory"),
        }
    }
}


#[derive(Debug, Default)]
pub struct Resolver {
    index: NamespaceIndex,
    plugins: PluginRegistry,
    /// Materialized bases, loaded at most once each.
    objects: HashMap<String, (Loadable, Origin)>,
    /// Values registered at exact dotted names.
    overrides: HashMap<String, Loadable>,
}

impl Resolver {
    pub fn new() -> Self {
        Resolver::default()
    }

    pub fn with_index(index: NamespaceIndex) -> Self {
        Resolver {
            index,
            ..Resolver::default()
        }
    }

    pub fn index(&self) -> &NamespaceIndex {
        &self.index
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    // -------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------

    /// Scan a folder into the index. Bases that became conflicts are evicted.
    pub fn scan(&mut self, root: &Path) {
        self.index.scan(root);
        let index = &self.index;
        self.objects
            .retain(|base, _| !index.get(base).map(LoadableEntry::is_conflict).unwrap_or(false));
    }

    /// Make a compiled module available to back scanned `<name>.rs` files.
    pub fn register_plugin(&mut self, name: &str, module: Module) {
        self.plugins.register(name, module);
        self.objects.remove(name);
    }

    /// Insert or replace the entry for a base name.
    pub fn mount(&mut self, base: &str, entry: LoadableEntry) {
        self.objects.remove(base);
        match &entry {
            LoadableEntry::InMemoryValue(l) => {
                self.objects.insert(base.to_string(), (l.clone(), Origin::InMemory));
            }
            LoadableEntry::InMemoryModule(m) => {
                self.objects
                    .insert(base.to_string(), (Loadable::Module(m.clone()), Origin::InMemory));
            }
            _ => {}
        }
        debug!(base, entry = %entry, "mounted");
        self.index.mount(base, entry);
    }

    /// Mount a single JSON, YAML, or module file at a base name.
    pub fn mount_file(&mut self, base: &str, path: &Path) -> Result<()> {
        let entry = LoadableEntry::from_file(path, &Default::default()).ok_or_else(|| {
            DatError::InvalidArgument(format!("unsupported loadable file {}", path.display()))
        })?;
        self.mount(base, entry);
        Ok(())
    }

    /// Mount every loadable file under a folder, prefixed by `at`.
    pub fn mount_folder(&mut self, folder: &Path, at: &str) -> Vec<String> {
        let names = self.index.mount_folder(folder, at);
        for name in &names {
            self.objects.remove(name);
        }
        names
    }

    /// Bind an already-built module to a base name.
    ///
    /// Fails when the base is already defined, unless `allow_redefine`.
    pub fn reg_module(&mut self, base: &str, module: Module, allow_redefine: bool) -> Result<()> {
        if !allow_redefine && self.index.contains(base) {
            return Err(DatError::InvalidArgument(format!("base '{}' is already defined", base)));
        }
        self.mount(base, LoadableEntry::InMemoryModule(Rc::new(module)));
        Ok(())
    }

    /// Register the value `load` returns for this exact dotted name.
    pub fn mount_value(&mut self, dotted: &str, value: impl Into<Loadable>) {
        self.overrides.insert(dotted.to_string(), value.into());
    }

    // -------------------------------------------------------------------
    // Loading
    // -------------------------------------------------------------------

    pub fn load(&mut self, name: &str) -> Result<Loadable> {
        self.load_opts(name, None, None)
    }

    /// Load, returning `default` when the name or value is missing.
    pub fn load_or(&mut self, name: &str, default: impl Into<Loadable>) -> Result<Loadable> {
        self.load_opts(name, Some(default.into()), None)
    }

    /// Load and require a particular kind of result.
    pub fn load_kind(&mut self, name: &str, kind: Kind) -> Result<Loadable> {
        self.load_opts(name, None, Some(kind))
    }

    /// Load a mapping.
    pub fn load_spec(&mut self, name: &str) -> Result<Spec> {
        match self.load_kind(name, Kind::Mapping)? {
            Loadable::Value(v) => into_spec(v, name),
            other => Err(DatError::TypeMismatch {
                name: name.to_string(),
                expected: Kind::Mapping.to_string(),
                found: other.kind_name().into(),
            }),
        }
    }

    /// Full form of `load`.
    ///
    /// A default replaces only `NotFound` and `MissingValue`; ambiguous or
    /// unreadable bases always fail. The default is returned unchecked.
    pub fn load_opts(
        &mut self,
        name: &str,
        default: Option<Loadable>,
        kind: Option<Kind>,
    ) -> Result<Loadable> {
        let found = match self.overrides.get(name) {
            Some(value) => Ok(value.clone()),
            None => self.find(name),
        };
        let found = match (found, default) {
            (Ok(v), _) => v,
            (Err(e), Some(d)) if e.is_missing() => return Ok(d),
            (Err(e), _) => return Err(e),
        };
        if let Some(kind) = kind {
            if !kind.matches(&found) {
                return Err(DatError::TypeMismatch {
                    name: name.to_string(),
                    expected: kind.to_string(),
                    found: found.kind_name().into(),
                });
            }
        }
        Ok(found)
    }

    /// True when the base of `base` has been materialized.
    pub fn is_cached(&self, base: &str) -> bool {
        self.objects.contains_key(base)
    }

    /// Origin of a materialized base.
    pub fn origin(&self, base: &str) -> Option<&Origin> {
        self.objects.get(base).map(|(_, o)| o)
    }

    // -------------------------------------------------------------------
    // Internal
    // -------------------------------------------------------------------

    fn find(&mut self, name: &str) -> Result<Loadable> {
        let Some((base, rest)) = self.index.split_base(name) else {
            return Err(DatError::NotFound { name: name.to_string() });
        };
        let (object, origin) = self.base_object(&base)?;
        let missing = || DatError::MissingValue {
            name: name.to_string(),
            origin: origin.to_string(),
        };
        match object {
            Loadable::Module(module) => {
                let attr = rest
                    .first()
                    .copied()
                    .unwrap_or_else(|| base.rsplit('.').next().unwrap_or(&base));
                match (module.attr(attr), rest.len() > 1) {
                    (Some(found), false) => Ok(found.clone()),
                    (Some(Loadable::Value(v)), true) => {
                        lookup(v, &rest[1..]).cloned().map(Loadable::Value).ok_or_else(missing)
                    }
                    _ => Err(missing()),
                }
            }
            Loadable::Value(v) if rest.is_empty() => {
                if v.is_null() {
                    Err(missing())
                } else {
                    Ok(Loadable::Value(v.clone()))
                }
            }
            Loadable::Value(v) => lookup(v, &rest).cloned().map(Loadable::Value).ok_or_else(missing),
            Loadable::Function(f) if rest.is_empty() => Ok(Loadable::Function(f.clone())),
            Loadable::Function(_) => Err(missing()),
        }
    }

    fn base_object(&mut self, base: &str) -> Result<&(Loadable, Origin)> {
        if self.objects.contains_key(base) {
            trace!(base, "base cache hit");
        } else {
            let entry = self
                .index
                .get(base)
                .cloned()
                .ok_or_else(|| DatError::NotFound { name: base.to_string() })?;
            let loaded = self.materialize(base, entry)?;
            self.objects.insert(base.to_string(), loaded);
        }
        self.objects
            .get(base)
            .ok_or_else(|| DatError::NotFound { name: base.to_string() })
    }

    fn materialize(&self, base: &str, entry: LoadableEntry) -> Result<(Loadable, Origin)> {
        match entry {
            LoadableEntry::FileData { path, format } => {
                debug!(base, path = %path.display(), "loading data file");
                let value = read_value(&path, format)?;
                Ok((Loadable::Value(value), Origin::File(path)))
            }
            LoadableEntry::FileModule(path) => {
                let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(base);
                let module = self
                    .plugins
                    .get(stem)
                    .or_else(|| self.plugins.get(base))
                    .ok_or_else(|| DatError::NotFound {
                        name: format!("{} (no plugin registered for {})", base, path.display()),
                    })?;
                debug!(base, path = %path.display(), "bound module file to plugin");
                Ok((Loadable::Module(module), Origin::File(path)))
            }
            LoadableEntry::InMemoryValue(l) => Ok((l, Origin::InMemory)),
            LoadableEntry::InMemoryModule(m) => Ok((Loadable::Module(m), Origin::InMemory)),
            LoadableEntry::Conflict(locations) => Err(DatError::AmbiguousName {
                name: base.to_string(),
                locations,
            }),
        }
    }
}

/// Human summary of a loadable for listings.
pub fn summarize(loadable: &Loadable) -> String {
    match loadable {
        Loadable::Value(v) => describe(v).to_string(),
        Loadable::Function(f) => format!("fn {}", f.name()),
        Loadable::Module(m) => format!("module {}", m.name()),
    }
}
