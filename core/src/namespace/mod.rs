//! Namespace: the base-name index and the plugin modules behind it.
//!
//! Scanned folders contribute files by stem, explicit mounts override or
//! extend them, and compiled `Module`s back scanned module files.

pub mod index;
pub mod module;

pub use index::{DataFormat, LoadableEntry, NamespaceIndex, ScanOptions};
pub use module::{Call, EntryPoint, Kind, Loadable, Module, PluginRegistry};
