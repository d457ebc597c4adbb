//! dat-core: dotted-name resolution over a scanned folder, spec
//! inheritance through `base` chains, and persisted data artifacts.
//!
//! ```text
//! .datconfig  ->  RootConfig  ->  Context { Resolver, DatManager }
//!                                   |            |
//!                      load("a.b.c")|            |create / load / save
//!                                   v            v
//!                           NamespaceIndex   dat_data/<path>/_spec_.json
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod dat;
pub mod error;
pub mod expand;
pub mod files;
pub mod merge;
pub mod namespace;
pub mod resolver;
pub mod tools;
pub mod value;

pub use config::RootConfig;
pub use context::{Context, Invocable};
pub use dat::{Dat, DatHandle, DatManager, Lifecycle};
pub use error::{DatError, Result};
pub use expand::{SpecKeys, SpecSource};
pub use namespace::{Call, EntryPoint, Kind, Loadable, Module};
pub use resolver::Resolver;
pub use value::Spec;
