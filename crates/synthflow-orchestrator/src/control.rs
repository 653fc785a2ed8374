//! Client-driven operations: initiate, retry, stop, and the expected
//! outcome that gates stage 6.
//!
//! Every operation validates and transitions the session in a single store
//! update, then hands any dispatched stage to a background task. Nothing
//! here waits on the external service.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use synthflow_session::{INITIAL_PROGRESS, INTERRUPTED_ERROR, Session, mutate};
use synthflow_utils::error::ControlError;
use synthflow_utils::types::{SessionStatus, StageId, StageStatus, word_count};

use crate::coordinator::Engine;

/// Answer to a successful initiate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Initiated {
    pub session_id: String,
    pub status: SessionStatus,
    pub stage: StageId,
    pub progress: u8,
}

/// Answer to an accepted retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryAccepted {
    pub session_id: String,
    pub stage: StageId,
    pub delete_existing: bool,
    pub status: StageStatus,
}

/// Answer to a stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stopped {
    pub session_id: String,
    pub stage: StageId,
    pub status: StageStatus,
}

/// Answer to an outcome submission or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeAccepted {
    pub session_id: String,
    pub word_count: usize,
    /// True when stage 6 was dispatched.
    pub triggered: bool,
}

impl Engine {
    pub(crate) async fn initiate(
        &self,
        problem_statement: &str,
        metadata: Value,
    ) -> Result<Initiated, ControlError> {
        let min = self.inner.pipeline.min_input_words;
        let count = word_count(problem_statement);
        if count < min {
            return Err(ControlError::InputTooShort { count, min });
        }

        let mut session = Session::new(problem_statement.trim(), metadata);
        let epoch = Self::begin_attempt(&mut session, StageId::Refine);
        session.raise_progress(INITIAL_PROGRESS);
        self.store().insert(&session).await?;

        info!(session_id = %session.id, words = count, "Research session initiated");
        self.spawn_drive(session.id.clone(), StageId::Refine, epoch);

        Ok(Initiated {
            session_id: session.id,
            status: session.status,
            stage: StageId::Refine,
            progress: session.progress,
        })
    }

    /// Re-run `stage`.
    ///
    /// A stage stuck in processing is failed as interrupted first. With
    /// `delete_existing` the stage's artifacts are wiped and its record
    /// reset before dispatch; otherwise the new result is merged into what
    /// is already there.
    pub(crate) async fn retry(
        &self,
        session_id: &str,
        stage: StageId,
        delete_existing: bool,
    ) -> Result<RetryAccepted, ControlError> {
        let (_, epoch) = mutate::<_, ControlError, _>(self.store(), session_id, |session| {
            let status = session.stage(stage).status;
            if !status.has_started() && !session.predecessor_completed(stage) {
                return Err(ControlError::PredecessorIncomplete { stage });
            }
            if stage == StageId::Solution && session.expected_outcome.is_none() {
                return Err(ControlError::OutcomeMissing);
            }

            if status == StageStatus::Processing {
                session.stage_mut(stage).fail(INTERRUPTED_ERROR);
            }
            if delete_existing {
                session.artifacts.clear(stage);
                session.stage_mut(stage).reset();
            }
            Ok(Self::begin_attempt(session, stage))
        })
        .await?;

        info!(
            session_id = %session_id,
            stage = stage.number(),
            delete_existing,
            epoch,
            "Retry dispatched"
        );
        self.spawn_drive(session_id.to_string(), stage, epoch);

        Ok(RetryAccepted {
            session_id: session_id.to_string(),
            stage,
            delete_existing,
            status: StageStatus::Processing,
        })
    }

    /// Logical stop. The in-flight call is left to finish; its result is
    /// discarded because the epoch moves on.
    pub(crate) async fn stop(&self, session_id: &str, stage: StageId) -> Result<Stopped, ControlError> {
        mutate::<_, ControlError, _>(self.store(), session_id, |session| {
            let status = session.stage(stage).status;
            if status != StageStatus::Processing {
                return Err(ControlError::NotProcessing { stage, status });
            }
            session.stage_mut(stage).halt();
            // idle until the client retries
            if session.processing_stages().is_empty() {
                session.status = SessionStatus::Initialized;
            }
            Ok(())
        })
        .await?;

        info!(session_id = %session_id, stage = stage.number(), "Stage stopped");
        Ok(Stopped {
            session_id: session_id.to_string(),
            stage,
            status: StageStatus::Pending,
        })
    }

    /// Store the expected outcome and dispatch stage 6.
    ///
    /// A solution that is already in place is kept: the outcome is stored
    /// and nothing is dispatched. Use a stage 6 retry to regenerate it.
    pub(crate) async fn submit_outcome(
        &self,
        session_id: &str,
        expected_outcome: &str,
    ) -> Result<OutcomeAccepted, ControlError> {
        let count = self.check_outcome(expected_outcome)?;
        let text = expected_outcome.trim().to_string();

        let (_, epoch) = mutate::<_, ControlError, _>(self.store(), session_id, |session| {
            if !session.stage(StageId::Synthesis).is(StageStatus::Completed) {
                return Err(ControlError::OutcomeGateClosed);
            }
            if session.stage(StageId::Solution).is(StageStatus::Processing) {
                return Err(ControlError::AlreadyProcessing {
                    stage: StageId::Solution,
                });
            }
            session.expected_outcome = Some(text);
            if session.is_satisfied(StageId::Solution) {
                return Ok(None);
            }
            Ok(Some(Self::begin_attempt(session, StageId::Solution)))
        })
        .await?;

        let Some(epoch) = epoch else {
            info!(
                session_id = %session_id,
                words = count,
                "Expected outcome stored; solution already generated"
            );
            return Ok(OutcomeAccepted {
                session_id: session_id.to_string(),
                word_count: count,
                triggered: false,
            });
        };

        info!(session_id = %session_id, words = count, "Expected outcome submitted");
        self.spawn_drive(session_id.to_string(), StageId::Solution, epoch);

        Ok(OutcomeAccepted {
            session_id: session_id.to_string(),
            word_count: count,
            triggered: true,
        })
    }

    /// Store the expected outcome without dispatching anything.
    pub(crate) async fn update_outcome(
        &self,
        session_id: &str,
        expected_outcome: &str,
    ) -> Result<OutcomeAccepted, ControlError> {
        let count = self.check_outcome(expected_outcome)?;
        let text = expected_outcome.trim().to_string();

        mutate::<_, ControlError, _>(self.store(), session_id, |session| {
            session.expected_outcome = Some(text);
            Ok(())
        })
        .await?;

        Ok(OutcomeAccepted {
            session_id: session_id.to_string(),
            word_count: count,
            triggered: false,
        })
    }

    fn check_outcome(&self, text: &str) -> Result<usize, ControlError> {
        let count = word_count(text);
        let max = self.inner.pipeline.max_outcome_words;
        if count == 0 {
            return Err(ControlError::OutcomeEmpty);
        }
        if count > max {
            return Err(ControlError::OutcomeTooLong { count, max });
        }
        Ok(count)
    }
}
