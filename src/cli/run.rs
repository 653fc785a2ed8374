//! CLI entry point and dispatch logic
//!
//! `run()` parses arguments, initializes tracing, discovers configuration,
//! builds the tokio runtime and dispatches. It owns all error output; the
//! binary only maps the returned code to the process exit status.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use synthflow_config::Config;
use synthflow_orchestrator::OrchestratorHandle;
use synthflow_utils::error::{ConfigError, SynthError, UserFriendlyError};
use synthflow_utils::logging::{init_tracing, redact_error_message};

use super::args::{Cli, Commands};
use crate::exit_codes::ExitCode;

pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("✗ Failed to initialize logging: {e}");
    }

    let config = match Config::discover(&cli.config_args()) {
        Ok(config) => config,
        Err(err) => {
            match err.downcast_ref::<ConfigError>() {
                Some(config_err) => print_report(config_err),
                None => eprintln!("✗ {err:#}"),
            }
            return Err(ExitCode::CONFIG);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            Commands::Serve { .. } => serve(&config).await.map(|()| ExitCode::SUCCESS),
            Commands::Probe { json } => probe(&config, json).await,
        }
    });

    match result {
        Ok(code) if code == ExitCode::SUCCESS => Ok(()),
        Ok(code) => Err(code),
        Err(err) => Err(report_failure(&err)),
    }
}

async fn serve(config: &Config) -> Result<()> {
    for (key, (value, source)) in config.effective_config() {
        debug!(key = %key, value = %value, source = %source, "Effective configuration");
    }
    for call in config.missing_endpoints() {
        warn!(
            call = call.config_key(),
            env = %call.env_var(),
            "Workflow endpoint not configured; stages using it will fail"
        );
    }

    let handle = OrchestratorHandle::from_config(config)?;
    let interrupted = handle.interrupted_sessions().await?;
    if !interrupted.is_empty() {
        info!(
            count = interrupted.len(),
            "Found sessions interrupted by a previous run"
        );
    }

    let addr = config.bind_addr().map_err(SynthError::from)?;
    crate::api::serve(handle, addr)
        .await
        .context("control API stopped")
}

async fn probe(config: &Config, json: bool) -> Result<ExitCode> {
    let handle = OrchestratorHandle::from_config(config)?;
    let reports = handle.probe_endpoints().await;

    if json {
        let rendered =
            serde_json::to_string_pretty(&reports).context("failed to serialize probe report")?;
        println!("{rendered}");
    } else {
        for report in &reports {
            let mark = if report.reachable { "✓" } else { "✗" };
            let detail = match (&report.status, &report.error) {
                (Some(status), _) => format!("HTTP {status}"),
                (None, Some(error)) => redact_error_message(error),
                (None, None) => String::new(),
            };
            println!("{mark} {:<22} {detail}", report.call.label());
        }
    }

    if reports.iter().all(|r| r.reachable) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::UNREACHABLE)
    }
}

/// Print the most specific report available and pick the exit code.
fn report_failure(err: &anyhow::Error) -> ExitCode {
    let Some(synth) = err.downcast_ref::<SynthError>() else {
        eprintln!("✗ {}", redact_error_message(&format!("{err:#}")));
        return ExitCode::INTERNAL;
    };
    match synth {
        SynthError::Config(e) => print_report(e),
        SynthError::Gateway(e) => print_report(e),
        SynthError::Control(e) => print_report(e),
        other => eprintln!("✗ {}", redact_error_message(&other.to_string())),
    }
    ExitCode::from(synth)
}

fn print_report(err: &dyn UserFriendlyError) {
    eprintln!("✗ {}: {}", err.category(), err.user_message());
    if let Some(context) = err.context() {
        eprintln!("  {context}");
    }
    for suggestion in err.suggestions() {
        eprintln!("  → {suggestion}");
    }
}
