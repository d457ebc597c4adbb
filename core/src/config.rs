//! Root configuration: the `.datconfig` file marking a project root.
//!
//! Discovery walks upward from a starting folder. The file names the folder
//! scanned for loadables, the artifact roots, the reserved-key section, and
//! mounts applied at startup.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{DatError, Result};


/// File names checked in each folder, in order.
pub const CONFIG_NAMES: [&str; 3] = [".datconfig", ".datconfig.json", ".datconfig.yaml"];


/// The config file as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Folder scanned into the namespace index. Defaults to `do` if present.
    #[serde(default)]
    pub do_folder: Option<String>,

    /// Primary artifact root.
    #[serde(default = "default_dat_data_folder")]
    pub dat_data_folder: String,

    /// Extra artifact roots, searched after the primary one.
    #[serde(default)]
    pub dat_roots: Vec<String>,

    /// Section holding the reserved spec keys; empty means the root.
    #[serde(default = "default_spec_section")]
    pub spec_section: String,

    #[serde(default)]
    pub mounts: Vec<MountCommand>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        ConfigFile {
            do_folder: None,
            dat_data_folder: default_dat_data_folder(),
            dat_roots: Vec::new(),
            spec_section: default_spec_section(),
            mounts: Vec::new(),
        }
    }
}

fn default_dat_data_folder() -> String {
    "dat_data".into()
}

fn default_spec_section() -> String {
    "main".into()
}


/// A startup mount. Paths are relative to the config file's folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MountCommand {
    File { at: String, file: String },
    Folder { at: String, folder: String },
    Value { at: String, value: Value },
}

impl fmt::Display for MountCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountCommand::File { at, file } => write!(f, "{} <- file {}", at, file),
            MountCommand::Folder { at, folder } => write!(f, "{} <- folder {}", at, folder),
            MountCommand::Value { at, value } => write!(f, "{} <- value {}", at, value),
        }
    }
}


/// Parse config text. A bare `.datconfig` is tried as JSON, then YAML.
pub fn parse(text: &str, path: &Path) -> Result<ConfigFile> {
    if text.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    let ext = path.extension().and_then(|e| e.to_str());
    let parsed = match ext {
        Some("yaml") | Some("yml") => serde_yaml::from_str(text).map_err(|e| e.to_string()),
        Some("json") => serde_json::from_str(text).map_err(|e| e.to_string()),
        _ => serde_json::from_str(text)
            .or_else(|json_err| serde_yaml::from_str(text).map_err(|_| json_err))
            .map_err(|e| e.to_string()),
    };
    parsed.map_err(|reason| DatError::corrupt(path, reason))
}

/// First config file found walking upward from `start`.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        CONFIG_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}


/// Configuration with every path resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RootConfig {
    /// The file read, if one was found.
    pub config_file: Option<PathBuf>,
    /// Folder holding the config file, or the start folder.
    pub root: PathBuf,
    /// Where discovery started; relative dat names resolve against it.
    pub cwd: PathBuf,
    pub do_folder: Option<PathBuf>,
    pub dat_data_folder: PathBuf,
    pub dat_roots: Vec<PathBuf>,
    pub spec_section: String,
    pub mounts: Vec<MountCommand>,
}

impl RootConfig {
    /// Walk upward from `start`; fall back to defaults rooted at `start`.
    pub fn discover(start: &Path) -> Result<RootConfig> {
        match find_config(start) {
            Some(path) => {
                debug!(path = %path.display(), "found root config");
                let text = fs::read_to_string(&path).map_err(|e| DatError::io(&path, e))?;
                let file = parse(&text, &path)?;
                let root = path.parent().unwrap_or(start).to_path_buf();
                Ok(RootConfig::resolve(file, &root, start, Some(path)))
            }
            None => {
                debug!(start = %start.display(), "no root config, using defaults");
                Ok(RootConfig::resolve(ConfigFile::default(), start, start, None))
            }
        }
    }

    pub fn resolve(file: ConfigFile, root: &Path, cwd: &Path, config_file: Option<PathBuf>) -> RootConfig {
        let do_folder = match file.do_folder {
            Some(rel) => Some(root.join(rel)),
            None => Some(root.join("do")).filter(|p| p.is_dir()),
        };
        RootConfig {
            config_file,
            root: root.to_path_buf(),
            cwd: cwd.to_path_buf(),
            do_folder,
            dat_data_folder: root.join(&file.dat_data_folder),
            dat_roots: file.dat_roots.iter().map(|r| root.join(r)).collect(),
            spec_section: file.spec_section,
            mounts: file.mounts,
        }
    }

    /// Defaults for a folder with no config file.
    pub fn defaults(root: &Path) -> RootConfig {
        RootConfig::resolve(ConfigFile::default(), root, root, None)
    }

    /// A path from the config, relative to the config's folder.
    pub fn resolve_path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }
}

impl fmt::Display for RootConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let none = "(none)".to_string();
        let config = self.config_file.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| none.clone());
        let do_folder = self.do_folder.as_ref().map(|p| p.display().to_string()).unwrap_or(none);
        writeln!(f, "config file:     {}", config)?;
        writeln!(f, "do folder:       {}", do_folder)?;
        writeln!(f, "dat data folder: {}", self.dat_data_folder.display())?;
        for root in &self.dat_roots {
            writeln!(f, "dat root:        {}", root.display())?;
        }
        writeln!(f, "spec section:    {}", if self.spec_section.is_empty() { "(root)" } else { self.spec_section.as_str() })?;
        for mount in &self.mounts {
            writeln!(f, "mount:           {}", mount)?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn parse_full_json_config() {
        let text = r#"{
            "do_folder": "src/do",
            "dat_data_folder": "data",
            "dat_roots": ["/shared/dats"],
            "spec_section": "",
            "mounts": [
                {"at": "cfg", "file": "conf/cfg.yaml"},
                {"at": "tools", "folder": "tools"},
                {"at": "answer.value", "value": {"n": 42}}
            ]
        }"#;
        let cfg = parse(text, Path::new(".datconfig")).unwrap();
        assert_eq!(cfg.do_folder.as_deref(), Some("src/do"));
        assert_eq!(cfg.dat_data_folder, "data");
        assert_eq!(cfg.spec_section, "");
        assert_eq!(
            cfg.mounts,
            vec![
                MountCommand::File { at: "cfg".into(), file: "conf/cfg.yaml".into() },
                MountCommand::Folder { at: "tools".into(), folder: "tools".into() },
                MountCommand::Value { at: "answer.value".into(), value: json!({"n": 42}) },
            ]
        );
    }

    #[test]
    fn parse_minimal_config() {
        let cfg = parse("{}", Path::new(".datconfig")).unwrap();
        assert_eq!(cfg, ConfigFile::default());
        assert_eq!(cfg.dat_data_folder, "dat_data");
        assert_eq!(cfg.spec_section, "main");
        assert_eq!(parse("  \n", Path::new(".datconfig")).unwrap(), ConfigFile::default());
    }

    #[test]
    fn bare_config_falls_back_to_yaml() {
        let cfg = parse("do_folder: scripts\n", Path::new(".datconfig")).unwrap();
        assert_eq!(cfg.do_folder.as_deref(), Some("scripts"));
    }

    #[test]
    fn malformed_config_is_corrupt() {
        match parse("{\"mounts\": [{\"at\": \"x\"}]}", Path::new("/p/.datconfig.json")) {
            Err(DatError::CorruptSpec { path, .. }) => assert_eq!(path, PathBuf::from("/p/.datconfig.json")),
            other => panic!("expected CorruptSpec, got {:?}", other),
        }
        assert!(parse("do_folder: [unclosed\n", Path::new(".datconfig.yaml")).is_err());
    }

    #[test]
    fn discovery_walks_upward() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".datconfig"), r#"{"dat_data_folder": "store"}"#).unwrap();
        fs::create_dir_all(dir.path().join("do")).unwrap();
        let deep = dir.path().join("a/b/c");
        fs::create_dir_all(&deep).unwrap();

        let cfg = RootConfig::discover(&deep).unwrap();
        assert_eq!(cfg.config_file, Some(dir.path().join(".datconfig")));
        assert_eq!(cfg.root, dir.path());
        assert_eq!(cfg.cwd, deep);
        assert_eq!(cfg.dat_data_folder, dir.path().join("store"));
        assert_eq!(cfg.do_folder, Some(dir.path().join("do")));
    }

    #[test]
    fn yaml_config_name() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".datconfig.yaml"), "dat_roots: [more]\n").unwrap();
        let cfg = RootConfig::discover(dir.path()).unwrap();
        assert_eq!(cfg.dat_roots, vec![dir.path().join("more")]);
        assert_eq!(cfg.do_folder, None);
    }

    #[test]
    fn defaults_without_config() {
        let dir = TempDir::new().unwrap();
        let cfg = RootConfig::defaults(dir.path());
        assert_eq!(cfg.dat_data_folder, dir.path().join("dat_data"));
        assert_eq!(cfg.config_file, None);
        assert!(cfg.to_string().contains("config file:     (none)"));
    }
}
