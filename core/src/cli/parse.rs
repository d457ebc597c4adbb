use serde_json::{Map, Value};

use crate::error::{DatError, Result};
use crate::value::{apply_assignments, set_path, Spec};


/// Tokenized command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArgs {
    /// Dotted-path assignments from `--set`, `--sets`, and `--json`.
    pub overrides: Spec,
    pub args: Vec<String>,
    pub kwargs: Map<String, Value>,
}


/// Split process arguments (without the program name) into overrides,
/// positional args, and flag kwargs.
///
/// - `--` ends flag parsing; everything after it is positional.
/// - `--set KEY VALUE` assigns a string; `--json KEY JSON` a parsed value.
/// - `--sets "a=1,b=x"` assigns several, numbers parsed.
/// - `--flag VALUE` or `-f VALUE` sets a kwarg; a flag followed by another
///   flag, or by nothing, is `true`. Dashes in flag names become underscores.
pub fn parse_argv<S: AsRef<str>>(argv: &[S]) -> Result<ParsedArgs> {
    let argv: Vec<&str> = argv.iter().map(|s| s.as_ref()).collect();
    let mut parsed = ParsedArgs::default();
    let mut i = 0;
    while i < argv.len() {
        let arg = argv[i];
        match arg {
            "--" => {
                parsed.args.extend(argv[i + 1..].iter().map(|s| s.to_string()));
                break;
            }
            "--json" => {
                let (key, text) = operands(&argv, i, arg)?;
                let value: Value = serde_json::from_str(text)
                    .map_err(|e| DatError::InvalidArgument(format!("illegal JSON for {}: {}", key, e)))?;
                set_path(&mut parsed.overrides, key, value)?;
                i += 3;
            }
            "--set" => {
                let (key, text) = operands(&argv, i, arg)?;
                set_path(&mut parsed.overrides, key, Value::String(text.to_string()))?;
                i += 3;
            }
            "--sets" => {
                let list = argv.get(i + 1).ok_or_else(|| missing_operand(arg))?;
                let assignments: Vec<&str> = list.split(',').filter(|a| !a.trim().is_empty()).collect();
                apply_assignments(&mut parsed.overrides, &assignments)?;
                i += 2;
            }
            _ => match flag_name(arg) {
                None => {
                    parsed.args.push(arg.to_string());
                    i += 1;
                }
                Some(flag) => match argv.get(i + 1) {
                    Some(next) if flag_name(next).is_none() => {
                        parsed.kwargs.insert(flag, Value::String(next.to_string()));
                        i += 2;
                    }
                    _ => {
                        parsed.kwargs.insert(flag, Value::Bool(true));
                        i += 1;
                    }
                },
            },
        }
    }
    Ok(parsed)
}

/// `--name` or `-n`; anything with characters other than alphanumerics and
/// dashes is positional.
fn flag_name(arg: &str) -> Option<String> {
    if !arg.chars().all(|c| c.is_alphanumeric() || c == '-') {
        return None;
    }
    if let Some(long) = arg.strip_prefix("--") {
        if long.is_empty() {
            return None;
        }
        return Some(long.replace('-', "_"));
    }
    let short = arg.strip_prefix('-')?;
    if short.chars().count() == 1 {
        Some(short.to_string())
    } else {
        None
    }
}

fn operands<'a>(argv: &[&'a str], i: usize, flag: &str) -> Result<(&'a str, &'a str)> {
    match (argv.get(i + 1), argv.get(i + 2)) {
        (Some(key), Some(value)) => Ok((*key, *value)),
        _ => Err(missing_operand(flag)),
    }
}

fn missing_operand(flag: &str) -> DatError {
    DatError::InvalidArgument(format!("{} is missing its operands", flag))
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(args: &[&str]) -> ParsedArgs {
        parse_argv(args).unwrap()
    }

    #[test]
    fn positional_and_flags() {
        let p = parse(&["my_letters", "extra", "--title", "Hi", "-v", "--dry-run"]);
        assert_eq!(p.args, vec!["my_letters", "extra"]);
        assert_eq!(p.kwargs.get("title"), Some(&json!("Hi")));
        assert_eq!(p.kwargs.get("v"), Some(&json!(true)));
        assert_eq!(p.kwargs.get("dry_run"), Some(&json!(true)));
    }

    #[test]
    fn flag_followed_by_flag_is_boolean() {
        let p = parse(&["cmd", "--print", "--usage"]);
        assert_eq!(p.kwargs.get("print"), Some(&json!(true)));
        assert_eq!(p.kwargs.get("usage"), Some(&json!(true)));
    }

    #[test]
    fn set_and_json_overrides() {
        let p = parse(&[
            "my_letters",
            "--set", "main.title", "Re-configured",
            "--json", "rules", r#"[[2, "my_letters.triple_it"]]"#,
        ]);
        assert_eq!(p.args, vec!["my_letters"]);
        assert_eq!(
            serde_json::Value::Object(p.overrides),
            json!({"main": {"title": "Re-configured"}, "rules": [[2, "my_letters.triple_it"]]})
        );
    }

    #[test]
    fn set_keeps_strings() {
        let p = parse(&["--set", "n", "5"]);
        assert_eq!(p.overrides.get("n"), Some(&json!("5")));
    }

    #[test]
    fn sets_parses_numbers() {
        let p = parse(&["my_letters", "--sets", "main.title=QuickChart, start=100,end=1.5"]);
        assert_eq!(
            serde_json::Value::Object(p.overrides),
            json!({"main": {"title": "QuickChart"}, "start": 100, "end": 1.5})
        );
    }

    #[test]
    fn double_dash_ends_flags() {
        let p = parse(&["cmd", "--", "--not-a-flag", "-x"]);
        assert_eq!(p.args, vec!["cmd", "--not-a-flag", "-x"]);
        assert!(p.kwargs.is_empty());
    }

    #[test]
    fn dotted_and_odd_tokens_are_positional() {
        let p = parse(&["dt.list", "-", "-ab", "a/b"]);
        assert_eq!(p.args, vec!["dt.list", "-", "-ab", "a/b"]);
    }

    #[test]
    fn bad_input_is_an_error() {
        assert!(matches!(parse_argv(&["--json", "k", "{bad"]), Err(DatError::InvalidArgument(_))));
        assert!(matches!(parse_argv(&["--set", "k"]), Err(DatError::InvalidArgument(_))));
        assert!(matches!(parse_argv(&["--sets"]), Err(DatError::InvalidArgument(_))));
        assert!(matches!(parse_argv(&["--sets", "novalue"]), Err(DatError::InvalidArgument(_))));
    }

    #[test]
    fn empty_argv() {
        assert_eq!(parse(&[]), ParsedArgs::default());
    }
}
