//! Research session record.
//!
//! A [`Session`] carries the raw problem statement, every artifact the
//! pipeline has produced so far, and one [`StageRecord`] per stage. It is
//! persisted whole on every transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use synthflow_utils::types::{GatewayCall, SessionStatus, StageId, StageStatus};

use crate::artifacts::Artifacts;

/// Progress reported as soon as a session is initiated.
pub const INITIAL_PROGRESS: u8 = 10;

/// Progress once `stage` has completed.
#[must_use]
pub const fn progress_after(stage: StageId) -> u8 {
    match stage {
        StageId::Refine => 15,
        StageId::Retrieval => 45,
        StageId::Analysis => 70,
        StageId::GapFinder => 80,
        StageId::Synthesis => 90,
        StageId::Solution => 100,
    }
}

/// Error stored on a stage that was stuck in processing when retried.
pub const INTERRUPTED_ERROR: &str = "Process was interrupted or timed out";

/// Bookkeeping for one fan-out sub-task of stage 2 or 3.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTaskRecord {
    pub dispatched: bool,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub chunks_total: usize,
    /// 1-based numbers of the chunks that failed.
    #[serde(default)]
    pub chunks_failed: Vec<usize>,
    /// Aggregated partial result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl SubTaskRecord {
    #[must_use]
    pub fn dispatched(chunks_total: usize) -> Self {
        Self {
            dispatched: true,
            chunks_total,
            ..Self::default()
        }
    }
}

/// Lifecycle of one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub status: StageStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    /// Attempt counter. Bumped on every dispatch and every stop; results
    /// carrying an older epoch are discarded.
    #[serde(default)]
    pub epoch: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subtasks: BTreeMap<GatewayCall, SubTaskRecord>,
}

impl StageRecord {
    /// Enter processing for a fresh attempt and return its epoch.
    pub fn begin(&mut self, now: DateTime<Utc>) -> u64 {
        self.epoch += 1;
        self.status = StageStatus::Processing;
        self.started_at = Some(now);
        self.completed_at = None;
        self.error = None;
        self.subtasks.clear();
        self.epoch
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = StageStatus::Completed;
        self.completed_at = Some(now);
        self.error = None;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = StageStatus::Failed;
        self.completed_at = None;
        self.error = Some(message.into());
    }

    /// Back to pending with nothing recorded. The epoch survives so that
    /// results from earlier attempts stay stale.
    pub fn reset(&mut self) {
        *self = Self {
            epoch: self.epoch,
            ..Self::default()
        };
    }

    /// Logical stop: back to pending and invalidate the in-flight attempt.
    pub fn halt(&mut self) {
        self.status = StageStatus::Pending;
        self.error = None;
        self.completed_at = None;
        self.epoch += 1;
    }

    #[must_use]
    pub fn is(&self, status: StageStatus) -> bool {
        self.status == status
    }

    /// True once every registered sub-task has resolved.
    #[must_use]
    pub fn subtasks_resolved(&self) -> bool {
        !self.subtasks.is_empty() && self.subtasks.values().all(|t| t.completed)
    }
}

/// One research session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub original_input: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub artifacts: Artifacts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_outcome: Option<String>,
    pub status: SessionStatus,
    pub progress: u8,
    pub current_stage: StageId,
    pub stages: [StageRecord; 6],
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// New session with a random v4 id and every stage pending.
    #[must_use]
    pub fn new(original_input: impl Into<String>, metadata: Value) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), original_input, metadata)
    }

    #[must_use]
    pub fn with_id(id: impl Into<String>, original_input: impl Into<String>, metadata: Value) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            original_input: original_input.into(),
            metadata,
            artifacts: Artifacts::default(),
            expected_outcome: None,
            status: SessionStatus::Initialized,
            progress: 0,
            current_stage: StageId::Refine,
            stages: Default::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn stage(&self, stage: StageId) -> &StageRecord {
        &self.stages[stage_index(stage)]
    }

    pub fn stage_mut(&mut self, stage: StageId) -> &mut StageRecord {
        &mut self.stages[stage_index(stage)]
    }

    pub fn stage_records(&self) -> impl Iterator<Item = (StageId, &StageRecord)> {
        StageId::ALL.into_iter().zip(self.stages.iter())
    }

    /// Raise progress; never lowers it.
    pub fn raise_progress(&mut self, value: u8) {
        self.progress = self.progress.max(value.min(100));
    }

    /// Stages currently marked processing.
    #[must_use]
    pub fn processing_stages(&self) -> Vec<StageId> {
        self.stage_records()
            .filter(|(_, r)| r.is(StageStatus::Processing))
            .map(|(s, _)| s)
            .collect()
    }

    /// True if `stage` is completed and its required output is present.
    #[must_use]
    pub fn is_satisfied(&self, stage: StageId) -> bool {
        self.stage(stage).is(StageStatus::Completed) && self.artifacts.missing(stage).is_none()
    }

    /// Whether `stage` may be dispatched: stage 1 always, later stages only
    /// after their predecessor completed.
    #[must_use]
    pub fn predecessor_completed(&self, stage: StageId) -> bool {
        stage
            .previous()
            .is_none_or(|prev| self.stage(prev).is(StageStatus::Completed))
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

const fn stage_index(stage: StageId) -> usize {
    stage.number() as usize - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_session_is_pristine() {
        let session = Session::new("problem", json!({"source": "test"}));
        assert!(Uuid::parse_str(&session.id).is_ok());
        assert_eq!(session.status, SessionStatus::Initialized);
        assert_eq!(session.current_stage, StageId::Refine);
        assert!(session.stage_records().all(|(_, r)| r == &StageRecord::default()));
    }

    #[test]
    fn test_begin_bumps_epoch_and_clears_previous_attempt() {
        let mut record = StageRecord::default();
        record.fail("boom");
        record
            .subtasks
            .insert(GatewayCall::Papers, SubTaskRecord::dispatched(1));

        let epoch = record.begin(Utc::now());
        assert_eq!(epoch, 1);
        assert_eq!(record.status, StageStatus::Processing);
        assert!(record.error.is_none());
        assert!(record.subtasks.is_empty());
        assert_eq!(record.begin(Utc::now()), 2);
    }

    #[test]
    fn test_reset_preserves_epoch() {
        let mut record = StageRecord::default();
        record.begin(Utc::now());
        record.complete(Utc::now());
        record.reset();
        assert_eq!(record.status, StageStatus::Pending);
        assert!(record.completed_at.is_none());
        assert_eq!(record.epoch, 1);
    }

    #[test]
    fn test_halt_invalidates_attempt() {
        let mut record = StageRecord::default();
        let epoch = record.begin(Utc::now());
        record.halt();
        assert_eq!(record.status, StageStatus::Pending);
        assert_ne!(record.epoch, epoch);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut session = Session::new("p", Value::Null);
        session.raise_progress(progress_after(StageId::Analysis));
        session.raise_progress(progress_after(StageId::Refine));
        assert_eq!(session.progress, 70);

        let mut last = INITIAL_PROGRESS;
        for stage in StageId::ALL {
            assert!(progress_after(stage) > last);
            last = progress_after(stage);
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn test_predecessor_gate() {
        let mut session = Session::new("p", Value::Null);
        assert!(session.predecessor_completed(StageId::Refine));
        assert!(!session.predecessor_completed(StageId::Retrieval));
        session.stage_mut(StageId::Refine).complete(Utc::now());
        assert!(session.predecessor_completed(StageId::Retrieval));
    }

    #[test]
    fn test_session_json_shape() {
        let mut session = Session::with_id("abc", "p", Value::Null);
        session
            .stage_mut(StageId::Retrieval)
            .subtasks
            .insert(GatewayCall::Repositories, SubTaskRecord::dispatched(1));

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["currentStage"], 1);
        assert_eq!(value["stages"].as_array().unwrap().len(), 6);
        assert_eq!(value["stages"][1]["subtasks"]["repositories"]["chunksTotal"], 1);

        let back: Session = serde_json::from_value(value).unwrap();
        assert_eq!(back, session);
    }
}
