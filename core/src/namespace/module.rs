//! Plugin modules: compiled attribute tables standing in for loadable
//! source files.
//!
//! A `Module` maps attribute names to values or entry points. Modules are
//! registered at startup in a `PluginRegistry`; a scanned module file
//! resolves to the plugin registered under its file stem.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::context::Context;
use crate::dat::DatHandle;
use crate::error::Result;
use crate::value::describe;


// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Arguments handed to an entry point.
#[derive(Debug, Clone, Default)]
pub struct Call {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    /// The artifact being run, when invoked through `Context::run_dat`.
    pub dat: Option<DatHandle>,
}

impl Call {
    pub fn new() -> Self {
        Call::default()
    }

    pub fn with_args(args: Vec<Value>) -> Self {
        Call {
            args,
            ..Call::default()
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.to_string(), value.into());
        self
    }

    /// Positional argument `i` as a string, if present.
    pub fn str_arg(&self, i: usize) -> Option<&str> {
        self.args.get(i).and_then(|v| v.as_str())
    }
}

type EntryFn = dyn Fn(&mut Context, Call) -> Result<Value>;

/// A named, shareable callable.
#[derive(Clone)]
pub struct EntryPoint {
    name: String,
    func: Rc<EntryFn>,
}

impl EntryPoint {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&mut Context, Call) -> Result<Value> + 'static,
    {
        EntryPoint {
            name: name.to_string(),
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, ctx: &mut Context, call: Call) -> Result<Value> {
        (self.func)(ctx, call)
    }

    /// Two handles to the same underlying closure.
    pub fn same_as(&self, other: &EntryPoint) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.name)
    }
}


// ---------------------------------------------------------------------------
// Loadables
// ---------------------------------------------------------------------------

/// Anything `load` can hand back.
#[derive(Debug, Clone)]
pub enum Loadable {
    Value(Value),
    Function(EntryPoint),
    Module(Rc<Module>),
}

impl Loadable {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Loadable::Value(v) => describe(v),
            Loadable::Function(_) => "a function",
            Loadable::Module(_) => "a module",
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Loadable::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Loadable::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&EntryPoint> {
        match self {
            Loadable::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, Loadable::Value(Value::Object(_)))
    }
}

impl From<Value> for Loadable {
    fn from(v: Value) -> Self {
        Loadable::Value(v)
    }
}

impl From<EntryPoint> for Loadable {
    fn from(f: EntryPoint) -> Self {
        Loadable::Function(f)
    }
}

impl From<Module> for Loadable {
    fn from(m: Module) -> Self {
        Loadable::Module(Rc::new(m))
    }
}

/// Expected-kind check for `Resolver::load_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Mapping,
    List,
    String,
    Number,
    Bool,
    Function,
    Module,
}

impl Kind {
    pub fn matches(&self, loadable: &Loadable) -> bool {
        match (self, loadable) {
            (Kind::Mapping, Loadable::Value(v)) => v.is_object(),
            (Kind::List, Loadable::Value(v)) => v.is_array(),
            (Kind::String, Loadable::Value(v)) => v.is_string(),
            (Kind::Number, Loadable::Value(v)) => v.is_number(),
            (Kind::Bool, Loadable::Value(v)) => v.is_boolean(),
            (Kind::Function, Loadable::Function(_)) => true,
            (Kind::Module, Loadable::Module(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Mapping => "a mapping",
            Kind::List => "a list",
            Kind::String => "a string",
            Kind::Number => "a number",
            Kind::Bool => "a boolean",
            Kind::Function => "a function",
            Kind::Module => "a module",
        };
        f.write_str(s)
    }
}


// ---------------------------------------------------------------------------
// Modules
// ---------------------------------------------------------------------------

/// An attribute-addressable namespace of values and functions.
#[derive(Debug, Clone, Default)]
pub struct Module {
    name: String,
    attrs: BTreeMap<String, Loadable>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Module {
            name: name.to_string(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_fn<F>(mut self, attr: &str, func: F) -> Self
    where
        F: Fn(&mut Context, Call) -> Result<Value> + 'static,
    {
        let qualified = format!("{}.{}", self.name, attr);
        self.attrs
            .insert(attr.to_string(), Loadable::Function(EntryPoint::new(&qualified, func)));
        self
    }

    pub fn with_value(mut self, attr: &str, value: Value) -> Self {
        self.attrs.insert(attr.to_string(), Loadable::Value(value));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, attr: &str) -> Option<&Loadable> {
        self.attrs.get(attr)
    }

    pub fn attr_names(&self) -> Vec<&str> {
        self.attrs.keys().map(|k| k.as_str()).collect()
    }
}


/// Compiled modules available to back scanned module files.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    modules: BTreeMap<String, Rc<Module>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        PluginRegistry::default()
    }

    /// Register a module under a name; replaces any earlier registration.
    pub fn register(&mut self, name: &str, module: Module) {
        self.modules.insert(name.to_string(), Rc::new(module));
    }

    pub fn get(&self, name: &str) -> Option<Rc<Module>> {
        self.modules.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(|k| k.as_str()).collect()
    }
}
