//! Orchestrator for six-stage research sessions
//!
//! This crate drives a session from problem refinement through retrieval,
//! analysis, gap finding and literature synthesis, then waits for the
//! client's expected outcome before generating the solution.
//!
//! # Architecture
//!
//! - **`OrchestratorHandle`**: stable facade for the HTTP API, CLI and tests
//! - **`Engine`** (`coordinator.rs`): background stage loop, result
//!   persistence and epoch guarding
//! - **`control.rs`**: initiate, retry, stop and expected-outcome operations
//! - **`fanout.rs`**: chunking and concurrent dispatch with partial-failure
//!   aggregation
//! - **`views.rs`**: read models for status, details and reconcile
//!
//! # Integration Rule
//!
//! **Outside this crate, use `OrchestratorHandle`.** The engine is internal.
//!
//! # Concurrency
//!
//! Client operations return as soon as the session is transitioned in the
//! store; stage work runs on spawned tokio tasks. Every write goes through
//! `SessionStore::update`, so concurrent sub-task completions, stops and
//! retries never overwrite one another.

mod control;
mod coordinator;
pub mod fanout;
mod handle;
pub mod views;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use control::{Initiated, OutcomeAccepted, RetryAccepted, Stopped};
pub use handle::OrchestratorHandle;
pub use views::{ReconcileReport, SessionDetails, StageDetail, StageSummary, StatusSummary, SubTaskView};

pub use synthflow_gateway::ProbeReport;
