//! Command-line front end for `contact_core`.
//!
//! Owns the outer concerns the core leaves to its callers: argument and
//! environment configuration, request-body validation, logging bootstrap and
//! the mapping of core errors onto exit codes.

pub mod cli;
pub mod commands;
pub mod validate;

pub use cli::Cli;
pub use commands::{execute, init_cli_logging, run, CommandOutput};
