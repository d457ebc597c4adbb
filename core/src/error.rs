use std::path::{Path, PathBuf};

use thiserror::Error;

// ---------------------------------------------------------------------------
// Dat errors
// ---------------------------------------------------------------------------

/// Every failure surfaced by the resolver, expander, and artifact manager.
///
/// Each variant carries the dotted name or path that triggered it.
#[derive(Debug, Error)]
pub enum DatError {
    /// No loadable is registered for the base of a dotted name.
    #[error("name not found: '{name}'")]
    NotFound { name: String },

    /// Two or more files produced the same base name.
    #[error("name '{name}' is defined multiple times: {}", join_paths(.locations))]
    AmbiguousName { name: String, locations: Vec<PathBuf> },

    /// The base resolved, but the requested value is missing from it.
    #[error("value '{name}' is missing from {origin}")]
    MissingValue { name: String, origin: String },

    /// A `base` chain revisits a spec that is still being expanded.
    #[error("cyclic base chain: {}", .chain.join(" -> "))]
    CyclicBase { chain: Vec<String> },

    /// An artifact path template cannot produce a free path.
    #[error("path already exists: {}", .path.display())]
    PathCollision { path: PathBuf },

    /// No artifact folder exists for the given name or path.
    #[error("dat not found: '{name}'")]
    ArtifactNotFound { name: String },

    /// A spec, result, or config file exists but cannot be read as a mapping.
    #[error("cannot read {}: {reason}", .path.display())]
    CorruptSpec { path: PathBuf, reason: String },

    /// A loaded value is not of the expected kind.
    #[error("expected '{name}' to be {expected} but found {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    /// The class selector of a spec names no registered artifact variant.
    #[error("class '{class}' is not a registered dat class")]
    UnknownDatClass { class: String },

    /// The artifact handle was deleted or moved away.
    #[error("dat at {} is no longer active", .path.display())]
    Retired { path: PathBuf },

    /// Malformed input such as a bad assignment or template placeholder.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Filesystem I/O error.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, DatError>;

impl DatError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        DatError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn corrupt(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        DatError::CorruptSpec {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// True for the "nothing there" errors a caller may replace with a default.
    pub fn is_missing(&self) -> bool {
        matches!(self, DatError::NotFound { .. } | DatError::MissingValue { .. })
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_lists_every_location() {
        let err = DatError::AmbiguousName {
            name: "foo".into(),
            locations: vec![PathBuf::from("/a/foo.json"), PathBuf::from("/b/foo.yaml")],
        };
        assert_eq!(
            err.to_string(),
            "name 'foo' is defined multiple times: /a/foo.json, /b/foo.yaml"
        );
    }

    #[test]
    fn cyclic_chain_format() {
        let err = DatError::CyclicBase {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic base chain: a -> b -> a");
    }

    #[test]
    fn io_keeps_path_and_source() {
        let err = DatError::io("/tmp/x", std::io::Error::other("boom"));
        assert_eq!(err.to_string(), "I/O error on /tmp/x: boom");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn missing_errors_are_defaultable() {
        assert!(DatError::NotFound { name: "x".into() }.is_missing());
        assert!(DatError::MissingValue { name: "x.y".into(), origin: "in-memory".into() }
            .is_missing());
        assert!(!DatError::CyclicBase { chain: vec![] }.is_missing());
    }
}
