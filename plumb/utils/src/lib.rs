//! Shared utilities for the plumb router.
mod errors;
mod out_file;

pub use errors::{Error, PlumbResult};
pub use out_file::OutputFile;
