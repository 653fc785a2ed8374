//! Command-line interface for synthflow
//!
//! ## Module Structure
//!
//! - `args`: CLI argument definitions (clap)
//! - `run`: entry point, configuration discovery and command dispatch

pub mod args;
mod run;

pub use args::{Cli, Commands};
pub use run::run;
