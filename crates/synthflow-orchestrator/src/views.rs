//! Read models returned by the status, details and reconcile operations.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use synthflow_session::{Artifacts, Correction, Session, StageRecord, SubTaskRecord};
use synthflow_utils::types::{GatewayCall, SessionStatus, StageId, StageStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSummary {
    pub stage: StageId,
    pub status: StageStatus,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StageSummary {
    fn new(stage: StageId, record: &StageRecord) -> Self {
        Self {
            stage,
            status: record.status,
            error: record.error.clone(),
            started_at: record.started_at,
            completed_at: record.completed_at,
        }
    }

    fn all(session: &Session) -> Vec<Self> {
        session
            .stage_records()
            .map(|(stage, record)| Self::new(stage, record))
            .collect()
    }
}

/// Compact status for polling clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub session_id: String,
    pub status: SessionStatus,
    pub progress: u8,
    pub current_stage: StageId,
    pub stages: Vec<StageSummary>,
    pub refined_problem: Option<String>,
    pub topic_count: usize,
    pub paper_count: usize,
    pub linked_paper_count: usize,
    pub application_count: usize,
    pub repository_count: usize,
    pub has_expected_outcome: bool,
    pub solution_ready: bool,
    pub auto_fixed: bool,
    pub corrections: Vec<Correction>,
}

impl StatusSummary {
    #[must_use]
    pub fn new(session: &Session, corrections: Vec<Correction>) -> Self {
        let artifacts = &session.artifacts;
        Self {
            session_id: session.id.clone(),
            status: session.status,
            progress: session.progress,
            current_stage: session.current_stage,
            stages: StageSummary::all(session),
            refined_problem: artifacts.refined_problem.clone(),
            topic_count: artifacts.topics.len(),
            paper_count: artifacts.papers.len(),
            linked_paper_count: artifacts.linked_papers().len(),
            application_count: artifacts.applications.len(),
            repository_count: artifacts.repositories.len(),
            has_expected_outcome: session.expected_outcome.is_some(),
            solution_ready: session.is_satisfied(StageId::Solution),
            auto_fixed: !corrections.is_empty(),
            corrections,
        }
    }
}

/// Sub-task bookkeeping without the raw partial payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTaskView {
    pub dispatched: bool,
    pub completed: bool,
    pub error: Option<String>,
    pub chunks_total: usize,
    pub chunks_failed: Vec<usize>,
}

impl From<&SubTaskRecord> for SubTaskView {
    fn from(record: &SubTaskRecord) -> Self {
        Self {
            dispatched: record.dispatched,
            completed: record.completed,
            error: record.error.clone(),
            chunks_total: record.chunks_total,
            chunks_failed: record.chunks_failed.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDetail {
    #[serde(flatten)]
    pub summary: StageSummary,
    pub epoch: u64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub subtasks: BTreeMap<GatewayCall, SubTaskView>,
}

/// Full session for the details view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetails {
    pub session_id: String,
    pub original_input: String,
    pub metadata: Value,
    pub status: SessionStatus,
    pub progress: u8,
    pub current_stage: StageId,
    pub expected_outcome: Option<String>,
    pub artifacts: Artifacts,
    pub stages: Vec<StageDetail>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub auto_fixed: bool,
    pub corrections: Vec<Correction>,
}

impl SessionDetails {
    #[must_use]
    pub fn new(session: Session, corrections: Vec<Correction>) -> Self {
        let stages = session
            .stage_records()
            .map(|(stage, record)| StageDetail {
                summary: StageSummary::new(stage, record),
                epoch: record.epoch,
                subtasks: record
                    .subtasks
                    .iter()
                    .map(|(call, task)| (*call, SubTaskView::from(task)))
                    .collect(),
            })
            .collect();
        Self {
            session_id: session.id,
            original_input: session.original_input,
            metadata: session.metadata,
            status: session.status,
            progress: session.progress,
            current_stage: session.current_stage,
            expected_outcome: session.expected_outcome,
            artifacts: session.artifacts,
            stages,
            created_at: session.created_at,
            updated_at: session.updated_at,
            auto_fixed: !corrections.is_empty(),
            corrections,
        }
    }
}

/// Result of an explicit reconcile.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub session_id: String,
    pub auto_fixed: bool,
    pub corrections: Vec<Correction>,
    pub stages: Vec<StageSummary>,
}

impl ReconcileReport {
    #[must_use]
    pub fn new(session: &Session, corrections: Vec<Correction>) -> Self {
        Self {
            session_id: session.id.clone(),
            auto_fixed: !corrections.is_empty(),
            corrections,
            stages: StageSummary::all(session),
        }
    }
}
