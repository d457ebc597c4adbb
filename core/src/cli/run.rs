//! Command-line runner: `dat CMD [ARGS...] [--flags] [--set K V]...`

use serde_json::Value;
use tracing::debug;

use super::parse::{parse_argv, ParsedArgs};
use crate::context::Context;
use crate::error::{DatError, Result};
use crate::merge::merge_specs;
use crate::namespace::{Call, Loadable};
use crate::resolver::summarize;
use crate::value::{get_path, Spec};


pub const USAGE: &str = "\
Usage: dat CMD [ARGS...] [--FLAG VALUE]... [--set KEY VALUE] [--sets K=V,...] [--json KEY JSON]

  CMD          dotted name of a function or a spec to run
  --set        assign a string at a dotted key of the spec
  --sets       assign several comma-separated KEY=VALUE pairs
  --json       assign a JSON value at a dotted key of the spec
  --print      show the call without running it
  --usage      show usage for CMD
  --info       show the discovered configuration

  dat dt.list [FRAGMENT]   list loadable names";


/// Run one command line (without the program name).
///
/// Returns the text to print, if any. A spec command is expanded, the
/// overrides merged over it, and run as a new dat; a function is called
/// with the remaining args; any other value is printed.
pub fn run_argv<S: AsRef<str>>(ctx: &mut Context, argv: &[S]) -> Result<Option<String>> {
    let ParsedArgs {
        overrides,
        args,
        mut kwargs,
    } = parse_argv(argv)?;

    let Some((name, rest)) = args.split_first() else {
        if kwargs.is_empty() || kwargs.contains_key("usage") {
            return Ok(Some(USAGE.to_string()));
        }
        return Err(DatError::InvalidArgument("no do-command specified".into()));
    };

    let cmd = ctx.load(name)?;
    let spec = match &cmd {
        Loadable::Value(Value::Object(m)) => Some(merge_specs(&ctx.expand(m.clone())?, &overrides)),
        _ => None,
    };

    if kwargs.contains_key("usage") {
        return command_usage(ctx, name, spec.as_ref()).map(Some);
    }
    if kwargs.remove("print").is_some() {
        return Ok(Some(format_call(&args, &kwargs)));
    }

    let rest: Vec<Value> = rest.iter().map(|a| Value::String(a.clone())).collect();
    let result = match (cmd, spec) {
        (_, Some(spec)) => {
            let keys = ctx.keys().clone();
            let mut call_args = match get_path(&spec, &keys.args()) {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            call_args.extend(rest);
            let mut call_kwargs = match get_path(&spec, &keys.kwargs()) {
                Some(Value::Object(m)) => m.clone(),
                _ => Default::default(),
            };
            call_kwargs.extend(kwargs);
            debug!(command = %name, "running spec command");
            ctx.run(
                spec,
                Call {
                    args: call_args,
                    kwargs: call_kwargs,
                    dat: None,
                },
            )?
        }
        (Loadable::Function(f), None) => {
            if !overrides.is_empty() {
                return Err(DatError::InvalidArgument(format!(
                    "--set, --sets, and --json need a spec command, but '{}' is a function",
                    name
                )));
            }
            debug!(command = %name, "calling function command");
            ctx.invoke(
                f,
                Call {
                    args: rest,
                    kwargs,
                    dat: None,
                },
            )?
        }
        (other, None) => return Ok(Some(render(&other))),
    };
    Ok(match result {
        Value::Null => None,
        other => Some(render(&Loadable::Value(other))),
    })
}

/// `CMD.usage` from the command's base, else the spec's `usage` key, else
/// the general usage text.
fn command_usage(ctx: &mut Context, name: &str, spec: Option<&Spec>) -> Result<String> {
    let base = name.split('.').next().unwrap_or(name);
    let declared = ctx
        .resolver_mut()
        .load_or(&format!("{}.usage", base), Value::Null)?;
    if let Some(Value::String(usage)) = declared.as_value() {
        return Ok(usage.clone());
    }
    if let Some(Value::String(usage)) = spec.and_then(|s| s.get("usage")) {
        return Ok(usage.clone());
    }
    Ok(USAGE.to_string())
}

fn format_call(args: &[String], kwargs: &serde_json::Map<String, Value>) -> String {
    let mut parts: Vec<String> = args.iter().map(|a| Value::String(a.clone()).to_string()).collect();
    parts.extend(kwargs.iter().map(|(k, v)| format!("{}={}", k, v)));
    format!("  do({})", parts.join(", "))
}

fn render(loadable: &Loadable) -> String {
    match loadable {
        Loadable::Value(Value::String(s)) => s.clone(),
        Loadable::Value(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
        other => summarize(other),
    }
}
