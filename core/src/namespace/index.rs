use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::module::{Loadable, Module};

// ---------------------------------------------------------------------------
// Entry classification
// ---------------------------------------------------------------------------

/// Serialization format of a data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Json,
    Yaml,
}

/// How a base name is materialized.
#[derive(Debug, Clone)]
pub enum LoadableEntry {
    /// A source file backed by a compiled plugin of the same stem.
    FileModule(PathBuf),
    /// A JSON or YAML document.
    FileData { path: PathBuf, format: DataFormat },
    /// A value or function mounted directly.
    InMemoryValue(Loadable),
    /// A module mounted directly.
    InMemoryModule(std::rc::Rc<Module>),
    /// Several files produced this base name; resolving it must fail.
    Conflict(Vec<PathBuf>),
}

impl LoadableEntry {
    /// Classify a file by extension. Returns `None` for files the index ignores.
    pub fn from_file(path: &Path, options: &ScanOptions) -> Option<LoadableEntry> {
        let ext = path.extension()?.to_str()?;
        if options.module_extensions.iter().any(|e| e == ext) {
            return Some(LoadableEntry::FileModule(path.to_path_buf()));
        }
        let format = match ext {
            "json" => DataFormat::Json,
            "yaml" | "yml" => DataFormat::Yaml,
            _ => return None,
        };
        if !options.data_extensions.iter().any(|e| e == ext) {
            return None;
        }
        Some(LoadableEntry::FileData {
            path: path.to_path_buf(),
            format,
        })
    }

    pub fn file_path(&self) -> Option<&Path> {
        match self {
            LoadableEntry::FileModule(p) => Some(p),
            LoadableEntry::FileData { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LoadableEntry::Conflict(_))
    }
}

impl fmt::Display for LoadableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadableEntry::FileModule(p) => write!(f, "{}", p.display()),
            LoadableEntry::FileData { path, .. } => write!(f, "{}", path.display()),
            LoadableEntry::InMemoryValue(l) => write!(f, "<in-memory {}>", l.kind_name()),
            LoadableEntry::InMemoryModule(m) => write!(f, "<in-memory module {}>", m.name()),
            LoadableEntry::Conflict(paths) => write!(f, "<conflict: {} files>", paths.len()),
        }
    }
}


/// Which files a scan registers.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub data_extensions: Vec<String>,
    pub module_extensions: Vec<String>,
    /// File stems that never become base names (package init markers).
    pub reserved_stems: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            data_extensions: vec!["json".into(), "yaml".into(), "yml".into()],
            module_extensions: vec!["rs".into()],
            reserved_stems: vec!["mod".into(), "lib".into(), "__init__".into()],
        }
    }
}


// ---------------------------------------------------------------------------
// NamespaceIndex
// ---------------------------------------------------------------------------

/// Maps base names to the entries that materialize them.
#[derive(Debug, Default)]
pub struct NamespaceIndex {
    entries: BTreeMap<String, LoadableEntry>,
    /// Names set by an explicit mount; scans never touch them.
    mounted: BTreeSet<String>,
    roots: Vec<PathBuf>,
    options: ScanOptions,
}

impl NamespaceIndex {
    pub fn new() -> Self {
        NamespaceIndex::default()
    }

    pub fn with_options(options: ScanOptions) -> Self {
        NamespaceIndex {
            options,
            ..NamespaceIndex::default()
        }
    }

    /// Walk a folder once, registering every loadable file by its stem.
    ///
    /// A stem already registered at a different location becomes a
    /// `Conflict`; the conflict is logged and only fails when resolved.
    /// A missing folder registers nothing.
    pub fn scan(&mut self, root: &Path) {
        if !root.is_dir() {
            debug!(root = %root.display(), "scan skipped, folder missing");
            return;
        }
        let mut added = 0usize;
        for (stem, entry) in self.discover(root) {
            if self.mounted.contains(&stem) {
                debug!(name = %stem, "scan skipped mounted name");
                continue;
            }
            if self.register_scanned(stem, entry) {
                added += 1;
            }
        }
        self.roots.push(root.to_path_buf());
        debug!(root = %root.display(), added, "namespace scan complete");
    }

    /// Insert or replace a base name regardless of scan results.
    pub fn mount(&mut self, base: &str, entry: LoadableEntry) {
        self.entries.insert(base.to_string(), entry);
        self.mounted.insert(base.to_string());
    }

    /// Mount every loadable file under `folder`, named by its relative path
    /// (slashes become dots, extension dropped) prefixed with `at`.
    ///
    /// Returns the names that were mounted.
    pub fn mount_folder(&mut self, folder: &Path, at: &str) -> Vec<String> {
        let mut names = Vec::new();
        for path in self.loadable_files(folder) {
            let Ok(rel) = path.strip_prefix(folder) else { continue };
            let Some(entry) = LoadableEntry::from_file(&path, &self.options) else { continue };
            let mut parts: Vec<String> = rel
                .parent()
                .map(|p| p.iter().map(|s| s.to_string_lossy().into_owned()).collect())
                .unwrap_or_default();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            parts.push(stem.to_string());
            let local = parts.join(".");
            let name = if at.is_empty() { local } else { format!("{}.{}", at, local) };
            self.mount(&name, entry);
            names.push(name);
        }
        debug!(folder = %folder.display(), at, count = names.len(), "folder mounted");
        names
    }

    /// Forget a mounted or scanned name.
    pub fn unmount(&mut self, base: &str) -> Option<LoadableEntry> {
        self.mounted.remove(base);
        self.entries.remove(base)
    }

    pub fn get(&self, base: &str) -> Option<&LoadableEntry> {
        self.entries.get(base)
    }

    pub fn contains(&self, base: &str) -> bool {
        self.entries.contains_key(base)
    }

    /// Longest registered prefix of a dotted name, as `(base, remaining segments)`.
    pub fn split_base<'a>(&self, dotted: &'a str) -> Option<(String, Vec<&'a str>)> {
        let parts: Vec<&str> = dotted.split('.').collect();
        for take in (1..=parts.len()).rev() {
            let candidate = parts[..take].join(".");
            if self.entries.contains_key(&candidate) {
                return Some((candidate, parts[take..].to_vec()));
            }
        }
        None
    }

    /// All entries sorted by base name.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &LoadableEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Base names containing `fragment`, sorted.
    pub fn names_matching(&self, fragment: &str) -> Vec<&str> {
        self.entries
            .keys()
            .filter(|k| k.contains(fragment))
            .map(|k| k.as_str())
            .collect()
    }

    /// Every conflicting base with all of its locations.
    pub fn conflicts(&self) -> Vec<(&str, &[PathBuf])> {
        self.entries
            .iter()
            .filter_map(|(k, v)| match v {
                LoadableEntry::Conflict(paths) => Some((k.as_str(), paths.as_slice())),
                _ => None,
            })
            .collect()
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // -------------------------------------------------------------------
    // Internal
    // -------------------------------------------------------------------

    fn loadable_files(&self, root: &Path) -> Vec<PathBuf> {
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| !self.options.reserved_stems.iter().any(|r| r == s))
                    .unwrap_or(false)
            })
            .collect()
    }

    fn discover(&self, root: &Path) -> Vec<(String, LoadableEntry)> {
        let mut found = Vec::new();
        for path in self.loadable_files(root) {
            let Some(entry) = LoadableEntry::from_file(&path, &self.options) else { continue };
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                found.push((stem.to_string(), entry));
            }
        }
        found
    }

    /// Returns true when a new base name was added.
    fn register_scanned(&mut self, stem: String, entry: LoadableEntry) -> bool {
        let Some(new_path) = entry.file_path().map(Path::to_path_buf) else { return false };
        match self.entries.get_mut(&stem) {
            None => {
                self.entries.insert(stem, entry);
                true
            }
            Some(LoadableEntry::Conflict(paths)) => {
                if !paths.contains(&new_path) {
                    warn!(name = %stem, path = %new_path.display(), "loadable conflicts with earlier definitions");
                    paths.push(new_path);
                }
                false
            }
            Some(existing) => {
                let existing_path = existing.file_path().map(Path::to_path_buf);
                if existing_path.as_deref() == Some(new_path.as_path()) {
                    return false;
                }
                warn!(
                    name = %stem,
                    first = %existing,
                    second = %new_path.display(),
                    "loadable conflicts with an existing definition"
                );
                let mut paths: Vec<PathBuf> = existing_path.into_iter().collect();
                paths.push(new_path);
                *existing = LoadableEntry::Conflict(paths);
                false
            }
        }
    }
}
