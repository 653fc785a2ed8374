//! Stage coordinator.
//!
//! Drives a session through stages 1 to 6. Every trigger runs on its own
//! tokio task as a loop: execute the stage, persist its result, then begin
//! the next incomplete stage and go around again. The loop stops after a
//! failure, after stage 5 (stage 6 waits for the client's expected
//! outcome), or when a result turns out to be stale.
//!
//! Each dispatch carries the stage's epoch. A result is only written if
//! the stored record is still processing under that same epoch, so a stop
//! or retry that happened while a call was in flight turns the late result
//! into a no-op.

use chrono::Utc;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, info, warn};

use synthflow_config::PipelineConfig;
use synthflow_gateway::Gateway;
use synthflow_session::{
    Analysis, GapAnalysis, Retrieval, Session, SessionStore, Solution, StageOutput, SubTaskRecord,
    mutate, progress_after,
};
use synthflow_utils::error::{GatewayError, StoreError};
use synthflow_utils::logging::{log_stage_complete, log_stage_error, log_stage_start, stage_span};
use synthflow_utils::types::{GatewayCall, SessionStatus, StageId, StageStatus};

use crate::fanout::{chunk_asymmetric, chunk_fixed, fan_out};

/// Why a write for an attempt was refused.
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// The record moved on (stopped, retried, or re-triggered).
    Stale { current_epoch: u64, status: StageStatus },
    Store(StoreError),
}

impl From<StoreError> for AttemptError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// How a stage attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StageOutcome {
    Completed,
    Failed,
    Discarded,
}

pub(crate) struct EngineInner {
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) gateway: Gateway,
    pub(crate) pipeline: PipelineConfig,
}

/// Shared engine state; cheap to clone into spawned tasks.
#[derive(Clone)]
pub(crate) struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

impl Engine {
    pub(crate) fn new(store: Arc<dyn SessionStore>, gateway: Gateway, pipeline: PipelineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                gateway,
                pipeline,
            }),
        }
    }

    pub(crate) fn store(&self) -> &dyn SessionStore {
        self.inner.store.as_ref()
    }

    /// Mark `stage` processing for a fresh attempt. Callers check
    /// preconditions first.
    pub(crate) fn begin_attempt(session: &mut Session, stage: StageId) -> u64 {
        let epoch = session.stage_mut(stage).begin(Utc::now());
        session.current_stage = stage;
        session.status = SessionStatus::Processing;
        epoch
    }

    /// Run the pipeline from an already-begun attempt on a background task.
    pub(crate) fn spawn_drive(&self, session_id: String, stage: StageId, epoch: u64) {
        let engine = self.clone();
        tokio::spawn(async move {
            engine.drive(session_id, stage, epoch).await;
        });
    }

    async fn drive(self, session_id: String, mut stage: StageId, mut epoch: u64) {
        loop {
            let span = stage_span(&session_id, stage, epoch);
            let outcome = self
                .execute(&session_id, stage, epoch)
                .instrument(span)
                .await;
            if outcome != StageOutcome::Completed {
                return;
            }
            match self.advance(&session_id, stage).await {
                Some((next, next_epoch)) => {
                    stage = next;
                    epoch = next_epoch;
                }
                None => return,
            }
        }
    }

    /// Begin the first stage after `completed` that is not already
    /// satisfied. Stage 6 is never entered automatically.
    async fn advance(&self, session_id: &str, completed: StageId) -> Option<(StageId, u64)> {
        let result = mutate::<_, StoreError, _>(self.store(), session_id, |session| {
            let mut candidate = completed.next();
            while let Some(stage) = candidate {
                if stage == StageId::Solution {
                    return Ok(None);
                }
                if session.is_satisfied(stage) {
                    debug!(
                        session_id = %session.id,
                        stage = stage.number(),
                        "Stage already completed, skipping"
                    );
                    candidate = stage.next();
                    continue;
                }
                if !session.predecessor_completed(stage) {
                    return Ok(None);
                }
                return Ok(Some((stage, Self::begin_attempt(session, stage))));
            }
            Ok(None)
        })
        .await;

        match result {
            Ok((_, next)) => next,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Could not advance session");
                None
            }
        }
    }

    /// Run one attempt of `stage` and persist its result.
    async fn execute(&self, session_id: &str, stage: StageId, epoch: u64) -> StageOutcome {
        let started = Instant::now();
        log_stage_start(session_id, stage);

        let session = match self.store().get(session_id).await {
            Ok(session) => session,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Session vanished before stage ran");
                return StageOutcome::Discarded;
            }
        };

        let result = match stage {
            StageId::Refine => {
                let mut fields = Map::new();
                fields.insert("originalInput".into(), Value::String(session.original_input.clone()));
                self.single(session_id, GatewayCall::Refine, fields)
                    .await
                    .map(|record| StageOutput::refinement(&record))
            }
            StageId::Retrieval => self.retrieval(&session, epoch).await,
            StageId::Analysis => self.analysis(&session, epoch).await,
            StageId::GapFinder => self
                .single(session_id, GatewayCall::GapFinder, problem_fields(&session))
                .await
                .map(|record| StageOutput::GapAnalysis(GapAnalysis::from_value(&record))),
            StageId::Synthesis => self
                .single(session_id, GatewayCall::Synthesis, problem_fields(&session))
                .await
                .map(StageOutput::Synthesis),
            StageId::Solution => {
                let mut fields = problem_fields(&session);
                fields.insert(
                    "expectedOutcome".into(),
                    Value::String(session.expected_outcome.clone().unwrap_or_default()),
                );
                self.single(session_id, GatewayCall::Solution, fields)
                    .await
                    .map(|record| StageOutput::Solution(Solution::from_value(&record)))
            }
        };

        let outcome = self.record_result(session_id, stage, epoch, result).await;
        let elapsed = started.elapsed().as_millis();
        match outcome {
            Ok(StageOutcome::Completed) => log_stage_complete(session_id, stage, elapsed),
            Ok(StageOutcome::Failed) => {
                let error = self
                    .store()
                    .get(session_id)
                    .await
                    .ok()
                    .and_then(|s| s.stage(stage).error.clone())
                    .unwrap_or_default();
                log_stage_error(session_id, stage, &error, elapsed);
            }
            Ok(StageOutcome::Discarded) | Err(_) => {}
        }
        outcome.unwrap_or(StageOutcome::Discarded)
    }

    async fn single(
        &self,
        session_id: &str,
        call: GatewayCall,
        fields: Map<String, Value>,
    ) -> Result<Value, String> {
        self.inner
            .gateway
            .call(call, session_id, fields)
            .await
            .map_err(|e| e.to_string())
    }

    /// Persist a stage result if the attempt is still current.
    ///
    /// A result whose required output is missing fails the stage with a
    /// validation message instead of completing it.
    pub(crate) async fn record_result(
        &self,
        session_id: &str,
        stage: StageId,
        epoch: u64,
        result: Result<StageOutput, String>,
    ) -> Result<StageOutcome, StoreError> {
        let outcome = mutate::<_, AttemptError, _>(self.store(), session_id, move |session| {
            ensure_current(session, stage, epoch)?;
            let output = match result {
                Ok(output) => output,
                Err(message) => {
                    session.stage_mut(stage).fail(message);
                    session.status = SessionStatus::Failed;
                    return Ok(StageOutcome::Failed);
                }
            };
            if let Some(what) = output.missing() {
                let message = GatewayError::Validation(format!("{stage} returned without {what}"));
                session.stage_mut(stage).fail(message.to_string());
                session.status = SessionStatus::Failed;
                return Ok(StageOutcome::Failed);
            }

            session.artifacts.apply(output);
            session.stage_mut(stage).complete(Utc::now());
            session.raise_progress(progress_after(stage));
            if stage == StageId::Solution {
                session.status = SessionStatus::Completed;
            }
            Ok(StageOutcome::Completed)
        })
        .await;

        match outcome {
            Ok((_, outcome)) => Ok(outcome),
            Err(AttemptError::Stale {
                current_epoch,
                status,
            }) => {
                warn!(
                    session_id = %session_id,
                    stage = stage.number(),
                    epoch,
                    current_epoch,
                    status = %status,
                    "Discarding result from superseded attempt"
                );
                Ok(StageOutcome::Discarded)
            }
            Err(AttemptError::Store(e)) => {
                warn!(session_id = %session_id, error = %e, "Could not persist stage result");
                Err(e)
            }
        }
    }

    /// Register sub-tasks as dispatched so status reads show them in flight.
    async fn register_subtasks(
        &self,
        session_id: &str,
        stage: StageId,
        epoch: u64,
        subtasks: &[(GatewayCall, usize)],
    ) -> bool {
        let subtasks = subtasks.to_vec();
        let result = mutate::<_, AttemptError, _>(self.store(), session_id, move |session| {
            ensure_current(session, stage, epoch)?;
            let record = session.stage_mut(stage);
            for (call, chunks) in subtasks {
                record.subtasks.insert(call, SubTaskRecord::dispatched(chunks));
            }
            Ok(())
        })
        .await;
        result.is_ok()
    }

    /// Persist one resolved sub-task.
    async fn resolve_subtask(
        &self,
        session_id: &str,
        stage: StageId,
        epoch: u64,
        call: GatewayCall,
        record: SubTaskRecord,
    ) {
        let failed_chunks = record.chunks_failed.len();
        let result = mutate::<_, AttemptError, _>(self.store(), session_id, move |session| {
            ensure_current(session, stage, epoch)?;
            session.stage_mut(stage).subtasks.insert(call, record);
            Ok(())
        })
        .await;
        match result {
            Ok(_) => info!(
                session_id = %session_id,
                call = call.config_key(),
                failed_chunks,
                "Sub-task resolved"
            ),
            Err(AttemptError::Stale { .. }) => debug!(
                session_id = %session_id,
                call = call.config_key(),
                "Sub-task result from superseded attempt dropped"
            ),
            Err(AttemptError::Store(e)) => {
                warn!(session_id = %session_id, error = %e, "Could not persist sub-task");
            }
        }
    }

    /// Stage 2: papers, applications and repositories in parallel, one
    /// call each.
    async fn retrieval(&self, session: &Session, epoch: u64) -> Result<StageOutput, String> {
        const CALLS: [GatewayCall; 3] = [
            GatewayCall::Papers,
            GatewayCall::Applications,
            GatewayCall::Repositories,
        ];
        let stage = StageId::Retrieval;
        let id = session.id.as_str();
        let registration: Vec<_> = CALLS.iter().map(|c| (*c, 1)).collect();
        if !self.register_subtasks(id, stage, epoch, &registration).await {
            return Err("Retrieval attempt was superseded before dispatch".to_string());
        }

        let topics = serde_json::to_value(&session.artifacts.topics).unwrap_or(Value::Null);
        let results = futures::future::join_all(CALLS.iter().map(|&call| {
            let mut fields = problem_fields(session);
            if call == GatewayCall::Papers {
                fields.insert("subtopics".into(), topics.clone());
            }
            async move {
                let result = fan_out(vec![fields], |_, _, fields| {
                    self.inner.gateway.call(call, id, fields)
                })
                .await;
                let record = result.into_record();
                self.resolve_subtask(id, stage, epoch, call, record.clone())
                    .await;
                (call, record)
            }
        }))
        .await;

        assemble(&results, |payloads| {
            StageOutput::Retrieval(Retrieval::from_payloads(
                payloads(GatewayCall::Papers),
                payloads(GatewayCall::Applications),
                payloads(GatewayCall::Repositories),
            ))
        })
    }

    /// Stage 3: paper and repository analysis, each chunked and fanned out.
    async fn analysis(&self, session: &Session, epoch: u64) -> Result<StageOutput, String> {
        let stage = StageId::Analysis;
        let id = session.id.as_str();
        let pipeline = &self.inner.pipeline;

        let papers: Vec<Value> = session
            .artifacts
            .linked_papers()
            .into_iter()
            .filter_map(|p| serde_json::to_value(p).ok())
            .collect();
        let paper_chunks = chunk_fixed(&papers, pipeline.paper_chunk_size);
        let repo_chunks = chunk_asymmetric(
            &session.artifacts.repositories,
            pipeline.repository_first_chunk,
            pipeline.repository_chunk_size,
        );

        let plan = [
            (GatewayCall::PaperAnalysis, "papers", paper_chunks),
            (GatewayCall::RepositoryAnalysis, "repositories", repo_chunks),
        ];
        let registration: Vec<_> = plan.iter().map(|(c, _, chunks)| (*c, chunks.len())).collect();
        if !self.register_subtasks(id, stage, epoch, &registration).await {
            return Err("Analysis attempt was superseded before dispatch".to_string());
        }
        debug!(
            session_id = %id,
            paper_chunks = registration[0].1,
            repository_chunks = registration[1].1,
            "Dispatching analysis chunks"
        );

        let base = problem_fields(session);
        let results = futures::future::join_all(plan.into_iter().map(|(call, key, chunks)| {
            let base = base.clone();
            async move {
                let result = fan_out(chunks, |number, total, chunk| {
                    let mut fields = base.clone();
                    fields.insert(key.into(), Value::Array(chunk));
                    fields.insert("chunkNumber".into(), json!(number));
                    fields.insert("totalChunks".into(), json!(total));
                    self.inner.gateway.call(call, id, fields)
                })
                .await;
                let record = result.into_record();
                self.resolve_subtask(id, stage, epoch, call, record.clone())
                    .await;
                (call, record)
            }
        }))
        .await;

        assemble(&results, |payloads| {
            StageOutput::Analysis(Analysis::from_payloads(
                payloads(GatewayCall::PaperAnalysis),
                payloads(GatewayCall::RepositoryAnalysis),
            ))
        })
    }
}

/// Refuse writes for an attempt that is no longer the current one.
fn ensure_current(session: &Session, stage: StageId, epoch: u64) -> Result<(), AttemptError> {
    let record = session.stage(stage);
    if record.epoch != epoch || record.status != StageStatus::Processing {
        return Err(AttemptError::Stale {
            current_epoch: record.epoch,
            status: record.status,
        });
    }
    Ok(())
}

/// `refinedProblem`, falling back to the raw input if stage 1 left none.
fn problem_fields(session: &Session) -> Map<String, Value> {
    let problem = session
        .artifacts
        .refined_problem
        .clone()
        .unwrap_or_else(|| session.original_input.clone());
    let mut fields = Map::new();
    fields.insert("refinedProblem".into(), Value::String(problem));
    fields
}

/// Build a multi-sub-task stage's output once every sub-task resolved.
/// If no sub-task produced anything, the stage fails with their errors.
fn assemble<'a>(
    results: &'a [(GatewayCall, SubTaskRecord)],
    build: impl FnOnce(&dyn Fn(GatewayCall) -> Option<&'a Value>) -> StageOutput,
) -> Result<StageOutput, String> {
    if results.iter().all(|(_, r)| r.payload.is_none()) {
        return Err(results
            .iter()
            .map(|(call, r)| {
                format!(
                    "{}: {}",
                    call.label(),
                    r.error.as_deref().unwrap_or("no result")
                )
            })
            .collect::<Vec<_>>()
            .join("; "));
    }
    let payloads = |call: GatewayCall| {
        results
            .iter()
            .find(|(c, _)| *c == call)
            .and_then(|(_, r)| r.payload.as_ref())
    };
    Ok(build(&payloads))
}
