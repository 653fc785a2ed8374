use std::path::PathBuf;

/// CLI values that participate in configuration precedence.
///
/// Every field is optional; `None` falls through to environment, file and
/// defaults in that order.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub bind: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub storage: Option<String>,
}
