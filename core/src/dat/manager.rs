//! DatManager: allocates artifact folders and keeps one live handle per
//! folder.
//!
//! The cache is keyed by canonical path and holds `Weak` references, so a
//! handle lives exactly as long as some caller keeps it. Delete and move
//! evict explicitly.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::{debug, trace};
use walkdir::WalkDir;

use super::path::expand_template;
use super::{ClassRegistry, Dat, DatClass, DatHandle, Lifecycle, RESULT_JSON, SPEC_JSON, SPEC_YAML};
use crate::error::{DatError, Result};
use crate::expand::SpecKeys;
use crate::files::{format_of, read_value, write_json};
use crate::value::{describe, get_path, Spec};


#[derive(Debug)]
pub struct DatManager {
    /// Primary artifact root; relative templates expand under it.
    sync_folder: PathBuf,
    /// Extra search roots, after the sync folder.
    roots: Vec<PathBuf>,
    cwd: PathBuf,
    keys: SpecKeys,
    classes: ClassRegistry,
    cache: HashMap<PathBuf, Weak<RefCell<Dat>>>,
}

impl DatManager {
    pub fn new(sync_folder: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        DatManager {
            sync_folder: sync_folder.into(),
            roots: Vec::new(),
            cwd: cwd.into(),
            keys: SpecKeys::default(),
            classes: ClassRegistry::default(),
            cache: HashMap::new(),
        }
    }

    pub fn with_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.roots = roots;
        self
    }

    pub fn with_keys(mut self, keys: SpecKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn sync_folder(&self) -> &Path {
        &self.sync_folder
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn keys(&self) -> &SpecKeys {
        &self.keys
    }

    pub fn classes_mut(&mut self) -> &mut ClassRegistry {
        &mut self.classes
    }

    // -------------------------------------------------------------------
    // Paths
    // -------------------------------------------------------------------

    pub fn expand_path_template(&self, template: Option<&str>, overwrite: bool) -> Result<PathBuf> {
        self.expand_path_template_with(template, &BTreeMap::new(), overwrite)
    }

    /// Like `expand_path_template`, with extra `{name}` variables.
    pub fn expand_path_template_with(
        &self,
        template: Option<&str>,
        vars: &BTreeMap<String, String>,
        overwrite: bool,
    ) -> Result<PathBuf> {
        expand_template(&self.sync_folder, template, vars, &self.cwd, overwrite)
    }

    /// Path relative to the sync folder when inside it.
    pub fn path_name(&self, path: &Path) -> String {
        match path.strip_prefix(&self.sync_folder) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.display().to_string(),
            _ => path.display().to_string(),
        }
    }

    /// True when a spec file exists for the name.
    pub fn exists(&self, name: &str) -> bool {
        self.locate(name, None).map(|p| has_spec_file(&p)).unwrap_or(false)
    }

    // -------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------

    /// Allocate a folder from `template`, write the spec, and cache the handle.
    pub fn create(&mut self, template: Option<&str>, spec: Spec, overwrite: bool) -> Result<DatHandle> {
        let (class_name, class) = self.class_for(&spec)?;
        let path = self.expand_path_template(template, overwrite)?;
        fs::create_dir_all(&path).map_err(|e| DatError::io(&path, e))?;
        write_json(&path.join(SPEC_JSON), &Value::Object(spec.clone()))?;
        debug!(path = %path.display(), class = %class_name, "created dat");
        Ok(self.register(path, spec, class_name, class))
    }

    /// Load a dat by absolute path, path relative to `cwd`, or name under
    /// one of the artifact roots. Returns the cached handle when live.
    pub fn load(&mut self, name: &str, cwd: Option<&Path>) -> Result<DatHandle> {
        let path = self.locate(name, cwd).ok_or_else(|| DatError::ArtifactNotFound {
            name: name.to_string(),
        })?;
        self.load_at(path)
    }

    /// Write the result mapping, replacing any earlier result file.
    pub fn save(&self, dat: &DatHandle) -> Result<()> {
        let d = dat.borrow();
        d.ensure_active()?;
        let path = d.path().join(RESULT_JSON);
        write_json(&path, &Value::Object(d.result().clone()))?;
        debug!(path = %path.display(), "saved dat result");
        Ok(())
    }

    /// Remove the folder, then evict and retire the handle.
    ///
    /// A missing folder, or a handle already deleted, fails when
    /// `must_exist`, else returns `false`. A moved handle no longer owns its
    /// old path and is refused.
    pub fn delete(&mut self, dat: &DatHandle, must_exist: bool) -> Result<bool> {
        let (path, lifecycle) = {
            let d = dat.borrow();
            (d.path().to_path_buf(), d.lifecycle().clone())
        };
        let gone = match lifecycle {
            Lifecycle::Active => !path.is_dir(),
            Lifecycle::Deleted => true,
            Lifecycle::Moved { .. } => return Err(DatError::Retired { path }),
        };
        if gone {
            if must_exist {
                return Err(DatError::ArtifactNotFound {
                    name: path.display().to_string(),
                });
            }
            return Ok(false);
        }
        fs::remove_dir_all(&path).map_err(|e| DatError::io(&path, e))?;
        self.evict_handle(dat);
        dat.borrow_mut().retire(Lifecycle::Deleted);
        debug!(path = %path.display(), "deleted dat");
        Ok(true)
    }

    /// Copy the folder to a new location and load the copy.
    pub fn copy(&mut self, dat: &DatHandle, new_path: &str) -> Result<DatHandle> {
        let src = active_path(dat)?;
        let dest = self.destination(new_path)?;
        copy_tree(&src, &dest)?;
        debug!(from = %src.display(), to = %dest.display(), "copied dat");
        self.load_at(dest)
    }

    /// Move the folder, retire the old handle, and load the moved dat.
    pub fn move_to(&mut self, dat: &DatHandle, new_path: &str) -> Result<DatHandle> {
        let src = active_path(dat)?;
        let dest = self.destination(new_path)?;
        if fs::rename(&src, &dest).is_err() {
            copy_tree(&src, &dest)?;
            fs::remove_dir_all(&src).map_err(|e| DatError::io(&src, e))?;
        }
        self.evict_handle(dat);
        dat.borrow_mut().retire(Lifecycle::Moved { to: dest.clone() });
        debug!(from = %src.display(), to = %dest.display(), "moved dat");
        self.load_at(dest)
    }

    // -------------------------------------------------------------------
    // Cache
    // -------------------------------------------------------------------

    /// The live handle for a folder, if any caller still holds one.
    pub fn cached(&self, path: &Path) -> Option<DatHandle> {
        self.cache.get(&cache_key(path)).and_then(Weak::upgrade)
    }

    /// Drop the cache entry for a folder. Returns true if one was present.
    pub fn evict(&mut self, path: &Path) -> bool {
        self.cache.remove(&cache_key(path)).is_some()
    }

    /// Number of handles still alive.
    pub fn live_count(&self) -> usize {
        self.cache.values().filter(|w| w.strong_count() > 0).count()
    }

    // -------------------------------------------------------------------
    // Containers
    // -------------------------------------------------------------------

    /// Folders beneath a container that hold a spec, sorted, excluding the
    /// container itself. Computed once per handle.
    pub fn contained_paths(&self, dat: &DatHandle) -> Result<Vec<PathBuf>> {
        let mut d = dat.borrow_mut();
        d.ensure_active()?;
        let root = d.path().to_path_buf();
        let name = d.path_name().to_string();
        let class_name = d.class_name().to_string();
        let state = d.container_mut().ok_or_else(|| DatError::TypeMismatch {
            name,
            expected: "a DatContainer".into(),
            found: class_name,
        })?;
        Ok(state.dat_paths.get_or_insert_with(|| find_dats_under(&root)).clone())
    }

    /// Load every contained dat.
    pub fn contained_dats(&mut self, dat: &DatHandle) -> Result<Vec<DatHandle>> {
        self.contained_paths(dat)?
            .into_iter()
            .map(|p| self.load_at(p))
            .collect()
    }

    // -------------------------------------------------------------------
    // Internal
    // -------------------------------------------------------------------

    fn locate(&self, name: &str, cwd: Option<&Path>) -> Option<PathBuf> {
        let path = Path::new(name);
        if path.is_absolute() {
            return Some(path.to_path_buf());
        }
        let local = cwd.unwrap_or(&self.cwd).join(path);
        if local.exists() {
            return Some(local);
        }
        std::iter::once(&self.sync_folder)
            .chain(self.roots.iter())
            .map(|root| root.join(path))
            .find(|candidate| has_spec_file(candidate))
    }

    fn load_at(&mut self, path: PathBuf) -> Result<DatHandle> {
        if let Some(handle) = self.cached(&path) {
            trace!(path = %path.display(), "dat cache hit");
            return Ok(handle);
        }
        let spec = read_spec(&path)?;
        let (class_name, class) = self.class_for(&spec)?;
        let result = read_result(&path)?;
        debug!(path = %path.display(), class = %class_name, "loaded dat");
        let handle = self.register(path, spec, class_name, class);
        handle.borrow_mut().set_result(result);
        Ok(handle)
    }

    fn class_for(&self, spec: &Spec) -> Result<(String, DatClass)> {
        let class_key = self.keys.class();
        let class_name = match get_path(spec, &class_key) {
            None => "Dat".to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(DatError::TypeMismatch {
                    name: class_key,
                    expected: "a string".into(),
                    found: describe(other).into(),
                })
            }
        };
        let class = self.classes.instantiate(&class_name)?;
        Ok((class_name, class))
    }

    fn register(&mut self, path: PathBuf, spec: Spec, class_name: String, class: DatClass) -> DatHandle {
        let key = cache_key(&path);
        if let Some(old) = self.cache.get(&key).and_then(Weak::upgrade) {
            if let Ok(mut old) = old.try_borrow_mut() {
                old.retire(Lifecycle::Deleted);
            }
        }
        self.cache.retain(|_, w| w.strong_count() > 0);

        let kind = get_path(&spec, &self.keys.kind())
            .and_then(Value::as_str)
            .map(String::from);
        let name = self.path_name(&path);
        let handle = Rc::new(RefCell::new(Dat::new(path, name, spec, class_name, kind, class)));
        self.cache.insert(key, Rc::downgrade(&handle));
        handle
    }

    fn evict_handle(&mut self, dat: &DatHandle) {
        let target = Rc::as_ptr(dat);
        self.cache.retain(|_, w| !std::ptr::eq(w.as_ptr(), target));
    }

    fn destination(&self, new_path: &str) -> Result<PathBuf> {
        let dest = self.sync_folder.join(new_path);
        if dest.exists() {
            return Err(DatError::PathCollision { path: dest });
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| DatError::io(parent, e))?;
        }
        Ok(dest)
    }
}


fn cache_key(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn has_spec_file(folder: &Path) -> bool {
    folder.join(SPEC_JSON).is_file() || folder.join(SPEC_YAML).is_file()
}

fn active_path(dat: &DatHandle) -> Result<PathBuf> {
    let d = dat.borrow();
    d.ensure_active()?;
    Ok(d.path().to_path_buf())
}

/// A missing folder is `ArtifactNotFound`; a folder whose spec is absent or
/// unreadable is `CorruptSpec`.
fn read_spec(folder: &Path) -> Result<Spec> {
    if !folder.is_dir() {
        return Err(DatError::ArtifactNotFound {
            name: folder.display().to_string(),
        });
    }
    let file = [SPEC_JSON, SPEC_YAML]
        .iter()
        .map(|n| folder.join(n))
        .find(|p| p.is_file())
        .ok_or_else(|| DatError::corrupt(folder, "folder has no spec file"))?;
    match read_value(&file, format_of(&file))? {
        Value::Object(spec) => Ok(spec),
        Value::Null => Ok(Spec::new()),
        other => Err(DatError::corrupt(&file, format!("spec root is {}", describe(&other)))),
    }
}

fn read_result(folder: &Path) -> Result<Spec> {
    let file = folder.join(RESULT_JSON);
    if !file.is_file() {
        return Ok(Spec::new());
    }
    match read_value(&file, format_of(&file))? {
        Value::Object(result) => Ok(result),
        other => Err(DatError::corrupt(&file, format!("result root is {}", describe(&other)))),
    }
}

fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| src.to_path_buf());
            DatError::io(&path, e.into())
        })?;
        let Ok(rel) = entry.path().strip_prefix(src) else { continue };
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| DatError::io(&target, e))?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| DatError::io(&target, e))?;
        }
    }
    Ok(())
}

fn find_dats_under(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name();
            name == SPEC_JSON || name == SPEC_YAML
        })
        .filter_map(|e| e.path().parent().map(Path::to_path_buf))
        .filter(|folder| folder != root)
        .collect();
    found.sort();
    found.dedup();
    found
}
