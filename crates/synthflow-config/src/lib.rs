//! Configuration management for synthflow
//!
//! Hierarchical configuration with precedence CLI > environment > file >
//! defaults. The file is TOML with `[server]`, `[storage]`, `[gateway]` and
//! `[pipeline]` sections.

mod config;

pub use config::*;
pub use synthflow_utils::error;
pub use synthflow_utils::types;
