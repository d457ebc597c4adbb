//! Context: the resolver and artifact manager for one process.
//!
//! Built once at startup, usually from a discovered `.datconfig`, and
//! passed by `&mut` to everything that resolves names or touches artifacts,
//! including the entry points it calls.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::{MountCommand, RootConfig};
use crate::dat::{DatHandle, DatManager};
use crate::error::{DatError, Result};
use crate::expand::{expand, SpecKeys, SpecSource};
use crate::namespace::{Call, EntryPoint, Kind, Loadable, Module};
use crate::resolver::Resolver;
use crate::tools;
use crate::value::{describe, get_path, set_path, Spec};


/// Something `invoke` can call.
#[derive(Debug, Clone)]
pub enum Invocable {
    /// A dotted name, loaded first.
    Name(String),
    /// A spec naming its entry point under the reserved `do` key.
    Spec(Spec),
    Function(EntryPoint),
}

impl From<&str> for Invocable {
    fn from(name: &str) -> Self {
        Invocable::Name(name.to_string())
    }
}

impl From<String> for Invocable {
    fn from(name: String) -> Self {
        Invocable::Name(name)
    }
}

impl From<Spec> for Invocable {
    fn from(spec: Spec) -> Self {
        Invocable::Spec(spec)
    }
}

impl From<EntryPoint> for Invocable {
    fn from(f: EntryPoint) -> Self {
        Invocable::Function(f)
    }
}


pub struct Context {
    resolver: Resolver,
    dats: DatManager,
    keys: SpecKeys,
    config: Option<RootConfig>,
}

impl Context {
    /// Assemble a context from parts. The `dt` tools are registered.
    pub fn new(mut resolver: Resolver, dats: DatManager) -> Self {
        tools::install(&mut resolver);
        let keys = dats.keys().clone();
        Context {
            resolver,
            dats,
            keys,
            config: None,
        }
    }

    /// Build a context from resolved configuration: scan the do folder,
    /// then apply the configured mounts in order.
    pub fn from_config(config: RootConfig) -> Result<Context> {
        let keys = SpecKeys::new(&config.spec_section);
        let mut resolver = Resolver::new();
        if let Some(folder) = &config.do_folder {
            resolver.scan(folder);
        }
        for mount in &config.mounts {
            apply_mount(&mut resolver, &config, mount);
        }
        let dats = DatManager::new(config.dat_data_folder.clone(), config.cwd.clone())
            .with_roots(config.dat_roots.clone())
            .with_keys(keys);
        let mut ctx = Context::new(resolver, dats);
        ctx.config = Some(config);
        Ok(ctx)
    }

    /// Discover `.datconfig` upward from `start` and build from it.
    pub fn discover(start: &Path) -> Result<Context> {
        Context::from_config(RootConfig::discover(start)?)
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut Resolver {
        &mut self.resolver
    }

    pub fn dats(&self) -> &DatManager {
        &self.dats
    }

    pub fn dats_mut(&mut self) -> &mut DatManager {
        &mut self.dats
    }

    pub fn keys(&self) -> &SpecKeys {
        &self.keys
    }

    pub fn config(&self) -> Option<&RootConfig> {
        self.config.as_ref()
    }

    /// Back scanned `<name>.rs` files with a compiled module.
    pub fn register_plugin(&mut self, name: &str, module: Module) {
        self.resolver.register_plugin(name, module);
    }

    pub fn load(&mut self, name: &str) -> Result<Loadable> {
        self.resolver.load(name)
    }

    pub fn expand(&mut self, source: impl Into<SpecSource>) -> Result<Spec> {
        expand(&mut self.resolver, &self.keys, source)
    }

    // -------------------------------------------------------------------
    // Invocation
    // -------------------------------------------------------------------

    /// Call a function, a named loadable, or a spec.
    ///
    /// A spec is expanded and its entry point is called with the expanded
    /// spec first, then the spec's own args, then the caller's args. Caller
    /// kwargs override the spec's kwargs.
    pub fn invoke(&mut self, target: impl Into<Invocable>, call: Call) -> Result<Value> {
        match target.into() {
            Invocable::Function(f) => f.call(self, call),
            Invocable::Spec(spec) => self.invoke_spec(spec, call),
            Invocable::Name(name) => match self.resolver.load(&name)? {
                Loadable::Function(f) => f.call(self, call),
                Loadable::Value(Value::Object(spec)) => self.invoke_spec(spec, call),
                other => Err(DatError::TypeMismatch {
                    name,
                    expected: "a function or a spec".into(),
                    found: other.kind_name().into(),
                }),
            },
        }
    }

    fn invoke_spec(&mut self, spec: Spec, call: Call) -> Result<Value> {
        let expanded = self.expand(spec)?;
        let entry = self.entry_point(&expanded)?;
        let mut args = vec![Value::Object(expanded.clone())];
        args.extend(self.spec_args(&expanded)?);
        args.extend(call.args);
        let mut kwargs = self.spec_kwargs(&expanded)?;
        kwargs.extend(call.kwargs);
        debug!(entry = entry.name(), "invoking spec");
        entry.call(
            self,
            Call {
                args,
                kwargs,
                dat: call.dat,
            },
        )
    }

    // -------------------------------------------------------------------
    // Templated artifacts
    // -------------------------------------------------------------------

    /// Create an artifact from a template spec.
    ///
    /// Non-empty caller args and kwargs are stored under the reserved
    /// `args`/`kwargs` keys before expansion. The path template comes from
    /// `path`, else from the expanded spec's `path` key, else the default.
    pub fn dat_from_template(
        &mut self,
        spec: impl Into<SpecSource>,
        path: Option<&str>,
        call: Call,
    ) -> Result<DatHandle> {
        let mut spec = match spec.into() {
            SpecSource::Name(name) => self.resolver.load_spec(&name)?,
            SpecSource::Inline(spec) => spec,
        };
        if !call.args.is_empty() {
            set_path(&mut spec, &self.keys.args(), Value::Array(call.args))?;
        }
        if !call.kwargs.is_empty() {
            set_path(&mut spec, &self.keys.kwargs(), Value::Object(call.kwargs))?;
        }
        let spec = self.expand(spec)?;
        let template = match path {
            Some(p) => Some(p.to_string()),
            None => get_path(&spec, &self.keys.path())
                .and_then(Value::as_str)
                .map(String::from),
        };
        self.dats.create(template.as_deref(), spec, false)
    }

    /// Call an artifact's entry point with its spec, then its stored args
    /// and kwargs. The handle travels in `Call::dat`.
    pub fn run_dat(&mut self, dat: &DatHandle) -> Result<Value> {
        let spec = {
            let d = dat.borrow();
            d.ensure_active()?;
            d.spec().clone()
        };
        let entry = self.entry_point(&spec)?;
        let mut args = vec![Value::Object(spec.clone())];
        args.extend(self.spec_args(&spec)?);
        let kwargs = self.spec_kwargs(&spec)?;
        debug!(entry = entry.name(), dat = %dat.borrow(), "running dat");
        entry.call(
            self,
            Call {
                args,
                kwargs,
                dat: Some(dat.clone()),
            },
        )
    }

    /// `dat_from_template` followed by `run_dat`.
    pub fn run(&mut self, spec: impl Into<SpecSource>, call: Call) -> Result<Value> {
        let dat = self.dat_from_template(spec, None, call)?;
        self.run_dat(&dat)
    }

    // -------------------------------------------------------------------
    // Internal
    // -------------------------------------------------------------------

    fn entry_point(&mut self, spec: &Spec) -> Result<EntryPoint> {
        let key = self.keys.entry();
        let name = match get_path(spec, &key) {
            Some(Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(DatError::TypeMismatch {
                    name: key,
                    expected: "a dotted function name".into(),
                    found: describe(other).into(),
                })
            }
            None => {
                return Err(DatError::MissingValue {
                    name: key,
                    origin: "the spec".into(),
                })
            }
        };
        match self.resolver.load_kind(&name, Kind::Function)? {
            Loadable::Function(f) => Ok(f),
            other => Err(DatError::TypeMismatch {
                name,
                expected: Kind::Function.to_string(),
                found: other.kind_name().into(),
            }),
        }
    }

    fn spec_args(&self, spec: &Spec) -> Result<Vec<Value>> {
        let key = self.keys.args();
        match get_path(spec, &key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(other) => Err(DatError::TypeMismatch {
                name: key,
                expected: "a list".into(),
                found: describe(other).into(),
            }),
        }
    }

    fn spec_kwargs(&self, spec: &Spec) -> Result<Map<String, Value>> {
        let key = self.keys.kwargs();
        match get_path(spec, &key) {
            None => Ok(Map::new()),
            Some(Value::Object(kwargs)) => Ok(kwargs.clone()),
            Some(other) => Err(DatError::TypeMismatch {
                name: key,
                expected: "a mapping".into(),
                found: describe(other).into(),
            }),
        }
    }
}


/// Apply one configured mount. Unusable mounts are logged and skipped.
fn apply_mount(resolver: &mut Resolver, config: &RootConfig, mount: &MountCommand) {
    match mount {
        MountCommand::File { at, file } => {
            let path = config.resolve_path(file);
            if !path.is_file() {
                warn!(at = %at, path = %path.display(), "ignoring mount of missing file");
                return;
            }
            if let Err(e) = resolver.mount_file(at, &path) {
                warn!(at = %at, error = %e, "ignoring mount");
            }
        }
        MountCommand::Folder { at, folder } => {
            let path = config.resolve_path(folder);
            if !path.is_dir() {
                warn!(at = %at, path = %path.display(), "ignoring mount of missing folder");
                return;
            }
            resolver.mount_folder(&path, at);
        }
        MountCommand::Value { at, value } => resolver.mount_value(at, value.clone()),
    }
}
