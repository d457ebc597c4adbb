//! Command-line support shared with the `dat` binary.

pub mod parse;
pub mod run;

pub use parse::{parse_argv, ParsedArgs};
pub use run::{run_argv, USAGE};
