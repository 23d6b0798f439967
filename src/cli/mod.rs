//! Command-line front end: argument parsing and command implementations.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
