//! synthflow - six-stage research synthesis pipeline coordinator
//!
//! synthflow sequences a research session through refinement, retrieval,
//! analysis, gap finding, literature synthesis and solution generation.
//! An external workflow service does the work of each stage; synthflow
//! dispatches the calls, fans out the parallel ones, persists every result,
//! heals inconsistent state on read, and exposes a JSON control API.
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Point every stage at the workflow service
//! export SYNTHFLOW_STAGE1_URL=http://localhost:5678/webhook/refine
//!
//! # Serve the control API
//! synthflow serve --bind 127.0.0.1:8080 --data-dir ./sessions
//!
//! # Check endpoint reachability
//! synthflow probe
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use synthflow::{Config, OrchestratorHandle};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::builder().memory_storage().build()?;
//!     let handle = OrchestratorHandle::from_config(&config)?;
//!     synthflow::api::serve(handle, config.bind_addr()?).await
//! }
//! ```
//!
//! # Crates
//!
//! - `synthflow-utils`: error taxonomy, tracing, stage identifiers
//! - `synthflow-config`: layered configuration
//! - `synthflow-gateway`: outbound workflow calls and response normalization
//! - `synthflow-session`: session model, artifacts, stores, validator
//! - `synthflow-orchestrator`: stage coordination and client operations

pub mod api;
pub mod cli;
pub mod exit_codes;
pub mod report;

pub use exit_codes::ExitCode;
pub use synthflow_config::{Config, ConfigBuilder};
pub use synthflow_orchestrator::OrchestratorHandle;
pub use synthflow_utils::error::{ControlError, SynthError};
pub use synthflow_utils::types::{SessionStatus, StageId, StageStatus};
