//! Command-line interface for the fulltext worker.

mod commands;

pub use commands::{is_verbose, run};
