//! Status validator.
//!
//! A stage marked completed must actually hold its required output. Reads
//! run [`reconcile`] before answering, so a session whose artifacts went
//! missing (partial writes, manual edits, older data) is demoted to failed
//! with a message telling the client which stage to retry. The validator
//! only ever demotes; it never advances a stage or progress.

use serde::Serialize;

use synthflow_utils::types::{SessionStatus, StageId, StageStatus};

use crate::model::Session;

/// One demotion the validator applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub stage: StageId,
    pub message: String,
}

#[must_use]
pub fn correction_message(stage: StageId, what: &str) -> String {
    format!("{stage} was completed but {what} is missing. Please retry {stage}.")
}

/// Completed stages whose required output is absent.
#[must_use]
pub fn inspect(session: &Session) -> Vec<Correction> {
    session
        .stage_records()
        .filter(|(_, record)| record.is(StageStatus::Completed))
        .filter_map(|(stage, _)| {
            session.artifacts.missing(stage).map(|what| Correction {
                stage,
                message: correction_message(stage, what),
            })
        })
        .collect()
}

/// Demote every inconsistent stage and return what changed. An empty
/// result means the session was already consistent and was not touched.
pub fn reconcile(session: &mut Session) -> Vec<Correction> {
    let corrections = inspect(session);
    for correction in &corrections {
        session
            .stage_mut(correction.stage)
            .fail(correction.message.clone());
    }
    if !corrections.is_empty() && session.status == SessionStatus::Completed {
        session.status = SessionStatus::Failed;
    }
    corrections
}
