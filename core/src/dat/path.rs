//! Artifact path templates.
//!
//! Placeholders: `{YYYY} {YY} {MM} {DD} {HH} {mm} {SS}` from the time the
//! expansion starts, `{cwd}`, `{unique}`, plus any caller-supplied variables.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::debug;

use crate::error::{DatError, Result};

/// Used when no template is given.
pub const DEFAULT_TEMPLATE: &str = "anonymous/Dat{unique}";

const UNIQUE: &str = "{unique}";
const MAX_UNIQUE: usize = 100_000;


/// Variables available to every template.
pub fn standard_vars(now: &DateTime<Local>, cwd: &Path) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    let year = now.format("%Y").to_string();
    vars.insert("YY".to_string(), year.chars().skip(2).collect());
    vars.insert("YYYY".to_string(), year);
    vars.insert("MM".to_string(), now.format("%m").to_string());
    vars.insert("DD".to_string(), now.format("%d").to_string());
    vars.insert("HH".to_string(), now.format("%H").to_string());
    vars.insert("mm".to_string(), now.format("%M").to_string());
    vars.insert("SS".to_string(), now.format("%S").to_string());
    vars.insert("cwd".to_string(), cwd.display().to_string());
    vars
}

/// Replace every `{name}` in `template`. Unknown names and unbalanced
/// braces are errors.
pub fn substitute(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            DatError::InvalidArgument(format!("unclosed placeholder in path template '{}'", template))
        })?;
        let name = &after[..close];
        let value = vars.get(name).ok_or_else(|| {
            DatError::InvalidArgument(format!("unknown placeholder {{{}}} in path template '{}'", name, template))
        })?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// True when the template has no placeholders at all.
pub fn is_literal(template: &str) -> bool {
    !template.contains('{')
}


/// Expand a template into a path that does not exist yet.
///
/// Relative results are placed under `root`. A template with placeholders
/// but no `{unique}` gets one appended; the first candidate uses an empty
/// unique value and later ones `_2`, `_3`, and so on. A literal template
/// (no `{` at all, e.g. `runs/p`) is not given a `{unique}` suffix: it names
/// exactly one path, so an existing target is a `PathCollision` rather than
/// a fresh `runs/p_2`. Callers wanting numbered variants must write
/// `{unique}` or another placeholder. With `overwrite`, the first candidate
/// is cleared and reused instead.
pub fn expand_template(
    root: &Path,
    template: Option<&str>,
    extra: &BTreeMap<String, String>,
    cwd: &Path,
    overwrite: bool,
) -> Result<PathBuf> {
    let template = template.filter(|t| !t.is_empty()).unwrap_or(DEFAULT_TEMPLATE);
    let literal = is_literal(template);
    let template = if literal || template.contains(UNIQUE) {
        template.to_string()
    } else {
        format!("{}{}", template, UNIQUE)
    };

    let mut vars = standard_vars(&Local::now(), cwd);
    vars.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));

    for count in 1..=MAX_UNIQUE {
        let unique = if count == 1 { String::new() } else { format!("_{}", count) };
        vars.insert("unique".to_string(), unique);
        let candidate = root.join(substitute(&template, &vars)?);
        if !candidate.exists() {
            debug!(path = %candidate.display(), "allocated dat path");
            return Ok(candidate);
        }
        if overwrite {
            clear(&candidate)?;
            debug!(path = %candidate.display(), "overwriting dat path");
            return Ok(candidate);
        }
        if literal {
            return Err(DatError::PathCollision { path: candidate });
        }
    }
    Err(DatError::PathCollision {
        path: root.join(template),
    })
}

fn clear(path: &Path) -> Result<()> {
    let removed = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|e| DatError::io(path, e))
}
