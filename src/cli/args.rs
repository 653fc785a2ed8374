//! CLI argument definitions and parsing structures

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use synthflow_config::CliArgs;

/// synthflow - research synthesis pipeline coordinator
#[derive(Parser, Debug)]
#[command(name = "synthflow")]
#[command(about = "Coordinates a six-stage research synthesis pipeline behind a JSON control API")]
#[command(long_about = r#"
synthflow sequences six research stages (refinement, retrieval, analysis,
gap finding, synthesis, solution) against an external workflow service,
persists every result, and exposes a JSON control API.

EXAMPLES:
  # Serve the control API with file-backed sessions
  synthflow serve --bind 127.0.0.1:8080 --data-dir ./sessions

  # Serve with in-memory sessions
  synthflow serve --storage memory --verbose

  # Check every configured workflow endpoint
  synthflow probe

CONFIGURATION:
  Precedence: CLI flags > environment > config file > defaults
  The config file is ./synthflow.toml or the path in SYNTHFLOW_CONFIG
  Endpoints can also be set per call, e.g. SYNTHFLOW_STAGE1_URL
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the control API
    Serve {
        /// Socket address to listen on
        #[arg(long)]
        bind: Option<String>,

        /// Directory for session files
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Session storage backend (file or memory)
        #[arg(long)]
        storage: Option<String>,
    },

    /// Probe every configured workflow endpoint and report reachability
    Probe {
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// The values that take part in configuration precedence.
    #[must_use]
    pub fn config_args(&self) -> CliArgs {
        let mut args = CliArgs {
            config_path: self.config.clone(),
            ..CliArgs::default()
        };
        if let Commands::Serve {
            bind,
            data_dir,
            storage,
        } = &self.command
        {
            args.bind.clone_from(bind);
            args.data_dir.clone_from(data_dir);
            args.storage.clone_from(storage);
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_flags_feed_config_args() {
        let cli = Cli::try_parse_from([
            "synthflow",
            "serve",
            "--bind",
            "0.0.0.0:9000",
            "--storage",
            "memory",
            "--config",
            "custom.toml",
        ])
        .unwrap();

        let args = cli.config_args();
        assert_eq!(args.bind.as_deref(), Some("0.0.0.0:9000"));
        assert_eq!(args.storage.as_deref(), Some("memory"));
        assert_eq!(args.config_path, Some(PathBuf::from("custom.toml")));
        assert!(args.data_dir.is_none());
    }

    #[test]
    fn test_probe_ignores_serve_flags() {
        let cli = Cli::try_parse_from(["synthflow", "probe", "--json", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Probe { json: true }));
        assert!(cli.config_args().bind.is_none());
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["synthflow"]).is_err());
    }
}
