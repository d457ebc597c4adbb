//! Built-in `dt` tools, mounted into every context.

use std::rc::Rc;

use serde_json::{json, Value};

use crate::context::Context;
use crate::error::{DatError, Result};
use crate::namespace::{Call, LoadableEntry, Module};
use crate::resolver::Resolver;


const USAGE: &str = "\
dt list [FRAGMENT]   base names containing FRAGMENT, with their locations
dt info DAT          path, base, class, do, and kind of a dat";


pub fn module() -> Module {
    Module::new("dt")
        .with_fn("list", list)
        .with_fn("info", info)
        .with_value("usage", json!(USAGE))
}

/// Mount `dt` unless something else already owns the name.
pub fn install(resolver: &mut Resolver) {
    if !resolver.index().contains("dt") {
        resolver.mount("dt", LoadableEntry::InMemoryModule(Rc::new(module())));
    }
}


/// `dt.list [fragment]`
fn list(ctx: &mut Context, call: Call) -> Result<Value> {
    let fragment = call
        .str_arg(0)
        .or_else(|| call.kwargs.get("prefix").and_then(Value::as_str))
        .unwrap_or("");
    let index = ctx.resolver().index();
    let mut lines = vec![format!("Base names matching: '{}'", fragment)];
    for name in index.names_matching(fragment) {
        if let Some(entry) = index.get(name) {
            lines.push(format!("  {:25} -->  {}", name, entry));
        }
    }
    for (name, paths) in index.conflicts() {
        if name.contains(fragment) {
            for path in paths {
                lines.push(format!("  {:25} !!  {}", name, path.display()));
            }
        }
    }
    Ok(Value::String(lines.join("\n")))
}

/// `dt.info dat`, or the running dat when no name is given.
fn info(ctx: &mut Context, call: Call) -> Result<Value> {
    let dat = match (call.str_arg(0), call.dat.clone()) {
        (Some(name), _) => ctx.dats_mut().load(name, None)?,
        (None, Some(dat)) => dat,
        (None, None) => return Err(DatError::InvalidArgument("usage: dt info DAT".into())),
    };
    let keys = ctx.keys().clone();
    let d = dat.borrow();
    let field = |key: String| d.get(&key).map(|v| v.to_string()).unwrap_or_else(|| "-".into());
    let lines = [
        format!("dat:   {}", d),
        format!("path:  {}", d.path().display()),
        format!("base:  {}", field(keys.base())),
        format!("class: {}", d.class_name()),
        format!("do:    {}", field(keys.entry())),
        format!("kind:  {}", d.kind()),
    ];
    Ok(Value::String(lines.join("\n")))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RootConfig;
    use crate::namespace::Kind;
    use crate::value::Spec;
    use tempfile::TempDir;

    fn context() -> (TempDir, Context) {
        let dir = TempDir::new().unwrap();
        let ctx = Context::from_config(RootConfig::defaults(dir.path())).unwrap();
        (dir, ctx)
    }

    fn text(v: Value) -> String {
        v.as_str().map(String::from).unwrap_or_default()
    }

    #[test]
    fn dt_is_mounted() {
        let (_d, mut ctx) = context();
        assert!(ctx.resolver_mut().load_kind("dt.list", Kind::Function).is_ok());
        assert!(ctx.resolver_mut().load_kind("dt.usage", Kind::String).is_ok());
    }

    #[test]
    fn list_filters_by_fragment() {
        let (_d, mut ctx) = context();
        ctx.resolver_mut().mount("hello_world", LoadableEntry::InMemoryValue(json!({}).into()));
        ctx.resolver_mut().mount("letters", LoadableEntry::InMemoryValue(json!({}).into()));
        let out = text(ctx.invoke("dt.list", Call::new().arg("hello")).unwrap());
        assert!(out.contains("hello_world"));
        assert!(!out.contains("letters"));
        let all = text(ctx.invoke("dt.list", Call::new()).unwrap());
        assert!(all.contains("letters"));
        assert!(all.contains("dt"));
    }

    #[test]
    fn info_describes_dat() {
        let (_d, mut ctx) = context();
        let spec: Spec = json!({"main": {"do": "x.y", "kind": "Game"}}).as_object().cloned().unwrap();
        let dat = ctx.dats_mut().create(Some("games/g1"), spec, false).unwrap();
        let out = text(ctx.invoke("dt.info", Call::new().arg("games/g1")).unwrap());
        assert!(out.contains("<Game: games/g1>"));
        assert!(out.contains("do:    \"x.y\""));
        assert!(out.contains("class: Dat"));

        let mut call = Call::new();
        call.dat = Some(dat);
        assert!(text(ctx.invoke("dt.info", call).unwrap()).contains("games/g1"));
        assert!(ctx.invoke("dt.info", Call::new()).is_err());
    }
}
