//! Orchestrator façade for external consumers.
//!
//! The HTTP layer, the CLI and integration tests talk to the pipeline only
//! through [`OrchestratorHandle`]. Reads reconcile the session before
//! answering; writes validate, transition and return immediately, leaving
//! the external calls to background tasks.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use synthflow_config::{CliArgs, Config};
//! use synthflow_orchestrator::OrchestratorHandle;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::discover(&CliArgs::default())?;
//!     let handle = OrchestratorHandle::from_config(&config)?;
//!     let started = handle
//!         .initiate("a problem statement of at least thirty words ...", serde_json::Value::Null)
//!         .await?;
//!     println!("session {}", started.session_id);
//!     Ok(())
//! }
//! ```

use camino::Utf8PathBuf;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use synthflow_config::{Config, PipelineConfig, StorageBackend};
use synthflow_gateway::{Gateway, ProbeReport};
use synthflow_session::validator::{inspect, reconcile};
use synthflow_session::{Correction, JsonFileStore, MemoryStore, Session, SessionStore, mutate};
use synthflow_utils::error::{ConfigError, ControlError, SynthError};
use synthflow_utils::types::{StageId, StageStatus};

use crate::control::{Initiated, OutcomeAccepted, RetryAccepted, Stopped};
use crate::coordinator::Engine;
use crate::views::{ReconcileReport, SessionDetails, StatusSummary};

/// The public API of the research pipeline.
///
/// Cloning is cheap; clones share the same store and gateway.
#[derive(Clone)]
pub struct OrchestratorHandle {
    engine: Engine,
}

impl OrchestratorHandle {
    /// Build the store and HTTP gateway described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory is unusable or the HTTP
    /// client cannot be constructed.
    pub fn from_config(config: &Config) -> Result<Self, SynthError> {
        let gateway = Gateway::from_config(config)?;
        let store: Arc<dyn SessionStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::File => {
                let dir = Utf8PathBuf::from_path_buf(config.storage.data_dir.clone()).map_err(
                    |path| ConfigError::InvalidValue {
                        key: "storage.data_dir".to_string(),
                        value: format!("{} is not valid UTF-8", path.display()),
                    },
                )?;
                Arc::new(JsonFileStore::open(dir)?)
            }
        };
        Ok(Self::with_parts(store, gateway, config.pipeline.clone()))
    }

    /// Assemble from explicit parts (custom store or transport).
    #[must_use]
    pub fn with_parts(
        store: Arc<dyn SessionStore>,
        gateway: Gateway,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            engine: Engine::new(store, gateway, pipeline),
        }
    }

    /// Validate the problem statement, create the session and dispatch
    /// stage 1.
    pub async fn initiate(
        &self,
        problem_statement: &str,
        metadata: Value,
    ) -> Result<Initiated, ControlError> {
        self.engine.initiate(problem_statement, metadata).await
    }

    pub async fn status(&self, session_id: &str) -> Result<StatusSummary, ControlError> {
        let (session, corrections) = self.load_reconciled(session_id).await?;
        Ok(StatusSummary::new(&session, corrections))
    }

    pub async fn details(&self, session_id: &str) -> Result<SessionDetails, ControlError> {
        let (session, corrections) = self.load_reconciled(session_id).await?;
        Ok(SessionDetails::new(session, corrections))
    }

    /// Run the status validator and persist its corrections.
    pub async fn reconcile(&self, session_id: &str) -> Result<ReconcileReport, ControlError> {
        let (session, corrections) = self.load_reconciled(session_id).await?;
        Ok(ReconcileReport::new(&session, corrections))
    }

    pub async fn retry(
        &self,
        session_id: &str,
        stage: StageId,
        delete_existing: bool,
    ) -> Result<RetryAccepted, ControlError> {
        self.engine.retry(session_id, stage, delete_existing).await
    }

    pub async fn stop(&self, session_id: &str, stage: StageId) -> Result<Stopped, ControlError> {
        self.engine.stop(session_id, stage).await
    }

    /// Store the expected outcome and dispatch stage 6.
    pub async fn submit_outcome(
        &self,
        session_id: &str,
        expected_outcome: &str,
    ) -> Result<OutcomeAccepted, ControlError> {
        self.engine.submit_outcome(session_id, expected_outcome).await
    }

    /// Store the expected outcome only.
    pub async fn update_outcome(
        &self,
        session_id: &str,
        expected_outcome: &str,
    ) -> Result<OutcomeAccepted, ControlError> {
        self.engine.update_outcome(session_id, expected_outcome).await
    }

    pub async fn delete(&self, session_id: &str) -> Result<(), ControlError> {
        self.engine.store().delete(session_id).await?;
        info!(session_id = %session_id, "Research session deleted");
        Ok(())
    }

    /// The reconciled session, if its solution stage has completed.
    pub async fn report_source(&self, session_id: &str) -> Result<Session, ControlError> {
        let (session, _) = self.load_reconciled(session_id).await?;
        if !session.stage(StageId::Solution).is(StageStatus::Completed) {
            return Err(ControlError::ReportUnavailable);
        }
        Ok(session)
    }

    /// The stored session as-is, without reconciling.
    pub async fn session(&self, session_id: &str) -> Result<Session, ControlError> {
        Ok(self.engine.store().get(session_id).await?)
    }

    /// Probe every configured gateway endpoint.
    pub async fn probe_endpoints(&self) -> Vec<ProbeReport> {
        self.engine.inner.gateway.probe_all().await
    }

    /// Sessions left with a processing stage by a previous run.
    ///
    /// They are reported, not touched: recovery is a client retry, which
    /// fails the stuck stage as interrupted before re-dispatching it.
    pub async fn interrupted_sessions(&self) -> Result<Vec<(String, Vec<StageId>)>, ControlError> {
        let store = self.engine.store();
        let mut interrupted = Vec::new();
        for id in store.list_ids().await? {
            let session = match store.get(&id).await {
                Ok(session) => session,
                Err(e) => {
                    warn!(session_id = %id, error = %e, "Skipping unreadable session");
                    continue;
                }
            };
            let stages = session.processing_stages();
            if !stages.is_empty() {
                warn!(
                    session_id = %id,
                    stages = ?stages.iter().map(StageId::number).collect::<Vec<_>>(),
                    "Session has stages left processing; retry to resume"
                );
                interrupted.push((id, stages));
            }
        }
        Ok(interrupted)
    }

    /// Load a session and persist any validator corrections before
    /// returning it.
    async fn load_reconciled(
        &self,
        session_id: &str,
    ) -> Result<(Session, Vec<Correction>), ControlError> {
        let store = self.engine.store();
        let session = store.get(session_id).await?;
        if inspect(&session).is_empty() {
            return Ok((session, Vec::new()));
        }

        let (session, corrections) =
            mutate::<_, ControlError, _>(store, session_id, |s| Ok(reconcile(s))).await?;
        for correction in &corrections {
            warn!(
                session_id = %session_id,
                stage = correction.stage.number(),
                message = %correction.message,
                "Auto-fixed inconsistent stage"
            );
        }
        Ok((session, corrections))
    }
}
