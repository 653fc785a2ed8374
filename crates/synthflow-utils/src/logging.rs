//! Logging and observability for synthflow
//!
//! Structured logging via `tracing`, with span and event helpers that carry
//! the session id and stage number on every record.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{Level, error, info, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::types::StageId;

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise verbose mode logs synthflow crates at
/// debug, and the default logs them at info.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("synthflow=debug,info")
            } else {
                EnvFilter::try_new("synthflow=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span wrapping one stage attempt.
pub fn stage_span(session_id: &str, stage: StageId, epoch: u64) -> tracing::Span {
    span!(
        Level::INFO,
        "stage_execution",
        session_id = %session_id,
        stage = stage.number(),
        epoch = epoch,
    )
}

pub fn log_stage_start(session_id: &str, stage: StageId) {
    info!(
        session_id = %session_id,
        stage = stage.number(),
        "Starting stage execution"
    );
}

pub fn log_stage_complete(session_id: &str, stage: StageId, duration_ms: u128) {
    info!(
        session_id = %session_id,
        stage = stage.number(),
        duration_ms = %duration_ms,
        "Stage execution completed"
    );
}

/// Log a stage failure. The message is redacted first.
pub fn log_stage_error(session_id: &str, stage: StageId, message: &str, duration_ms: u128) {
    error!(
        session_id = %session_id,
        stage = stage.number(),
        duration_ms = %duration_ms,
        error = %redact_error_message(message),
        "Stage execution failed"
    );
}

static URL_WITH_CREDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(https?://)[^:@\s/]+:[^@\s/]+@").expect("credential pattern is valid")
});

static POTENTIAL_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9_-]{40,}\b").expect("key pattern is valid")
});

/// Strip URL credentials and long key-like tokens from a message.
///
/// Endpoint URLs often carry webhook secrets, and transport errors echo the
/// URL back, so every error bound for logs or stage records passes here.
#[must_use]
pub fn redact_error_message(message: &str) -> String {
    let redacted = URL_WITH_CREDS.replace_all(message, "$1[REDACTED]@");
    POTENTIAL_KEY
        .replace_all(&redacted, "[REDACTED_KEY]")
        .into_owned()
}
