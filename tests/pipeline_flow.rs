//! End-to-end pipeline behavior against a scripted workflow service.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use synthflow_orchestrator::OrchestratorHandle;
use synthflow_orchestrator::test_support::{
    PROBLEM_STATEMENT, ScriptedTransport, scripted_handle, wait_until,
};
use synthflow_session::{Commit, MemoryStore, Session, SessionStore};
use synthflow_utils::error::{ControlError, GatewayError};
use synthflow_utils::types::{GatewayCall, SessionStatus, StageId, StageStatus};

const WAIT: Duration = Duration::from_secs(5);

async fn wait_for(
    handle: &OrchestratorHandle,
    id: &str,
    stage: StageId,
    status: StageStatus,
) -> Session {
    wait_until(WAIT, move || async move {
        handle
            .session(id)
            .await
            .ok()
            .filter(|s| s.stage(stage).is(status))
    })
    .await
    .unwrap_or_else(|| panic!("{stage} never reached {status}"))
}

/// Wait for a completed attempt of `stage` newer than `after_epoch`.
async fn wait_for_rerun(
    handle: &OrchestratorHandle,
    id: &str,
    stage: StageId,
    after_epoch: u64,
) -> Session {
    wait_until(WAIT, move || async move {
        handle.session(id).await.ok().filter(|s| {
            let record = s.stage(stage);
            record.epoch > after_epoch && record.is(StageStatus::Completed)
        })
    })
    .await
    .unwrap_or_else(|| panic!("{stage} was not re-run"))
}

/// Initiate and wait until stage 5 completed.
async fn run_to_synthesis(handle: &OrchestratorHandle) -> String {
    let started = handle
        .initiate(PROBLEM_STATEMENT, json!({"source": "test"}))
        .await
        .unwrap();
    wait_for(handle, &started.session_id, StageId::Synthesis, StageStatus::Completed).await;
    started.session_id
}

#[tokio::test]
async fn test_full_pipeline_runs_all_six_stages() {
    let transport = Arc::new(ScriptedTransport::happy_path());
    let (handle, _) = scripted_handle(transport.clone());

    let started = handle.initiate(PROBLEM_STATEMENT, json!(null)).await.unwrap();
    assert_eq!(started.status, SessionStatus::Processing);
    assert_eq!(started.stage, StageId::Refine);
    assert_eq!(started.progress, 10);
    let id = started.session_id;

    let session = wait_for(&handle, &id, StageId::Synthesis, StageStatus::Completed).await;
    assert_eq!(session.progress, 90);
    assert!(session.stage(StageId::Solution).is(StageStatus::Pending));
    assert_eq!(session.artifacts.topics.len(), 2);
    assert_eq!(session.artifacts.papers.len(), 4);
    assert_eq!(session.artifacts.paper_analyses.len(), 3);
    assert_eq!(session.artifacts.repository_analyses.len(), 5);
    assert!(session.artifacts.gap_analysis.is_some());

    // paper retrieval carries the refined topics
    let papers = transport.requests_for(GatewayCall::Papers);
    assert_eq!(papers[0].body["subtopics"].as_array().unwrap().len(), 2);
    assert_eq!(
        papers[0].body["refinedProblem"],
        "Automate urgency triage of patient messages for small clinics"
    );

    // three linked papers fit one chunk; five repositories split 4 + 1
    assert_eq!(transport.requests_for(GatewayCall::PaperAnalysis).len(), 1);
    let mut repo_chunks: Vec<usize> = transport
        .requests_for(GatewayCall::RepositoryAnalysis)
        .iter()
        .map(|r| r.body["repositories"].as_array().unwrap().len())
        .collect();
    repo_chunks.sort_unstable();
    assert_eq!(repo_chunks, vec![1, 4]);

    let accepted = handle
        .submit_outcome(&id, "A pilot that flags urgent messages within a minute")
        .await
        .unwrap();
    assert!(accepted.triggered);

    let session = wait_for(&handle, &id, StageId::Solution, StageStatus::Completed).await;
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.progress, 100);
    let solution = session.artifacts.solution.unwrap();
    assert_eq!(
        solution.proposed_solution,
        "A lightweight triage assistant with nurse review"
    );
    assert_eq!(
        transport.requests_for(GatewayCall::Solution)[0].body["expectedOutcome"],
        "A pilot that flags urgent messages within a minute"
    );
    assert!(handle.report_source(&id).await.is_ok());
}

#[tokio::test]
async fn test_problem_statement_word_minimum() {
    let (handle, store) = scripted_handle(Arc::new(ScriptedTransport::happy_path()));
    let words: Vec<&str> = PROBLEM_STATEMENT.split_whitespace().collect();
    let short = words[..29].join(" ");

    let err = handle.initiate(&short, json!(null)).await.unwrap_err();
    assert!(matches!(err, ControlError::InputTooShort { count: 29, min: 30 }));
    assert!(store.list_ids().await.unwrap().is_empty());

    let exact = words[..30].join(" ");
    assert_eq!(synthflow_utils::types::word_count(&exact), 30);
    assert!(handle.initiate(&exact, json!(null)).await.is_ok());
    assert_eq!(store.list_ids().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_stage_six_waits_for_expected_outcome() {
    let transport = Arc::new(ScriptedTransport::happy_path());
    let gate = transport.gate(GatewayCall::Synthesis);
    let (handle, _) = scripted_handle(transport.clone());

    let id = handle
        .initiate(PROBLEM_STATEMENT, json!(null))
        .await
        .unwrap()
        .session_id;
    wait_for(&handle, &id, StageId::Synthesis, StageStatus::Processing).await;

    let err = handle
        .submit_outcome(&id, "An outcome before synthesis")
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::OutcomeGateClosed));

    // storing without triggering is allowed at any point
    let updated = handle
        .update_outcome(&id, "An outcome before synthesis")
        .await
        .unwrap();
    assert!(!updated.triggered);

    gate.add_permits(1);
    wait_for(&handle, &id, StageId::Synthesis, StageStatus::Completed).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let session = handle.session(&id).await.unwrap();
    assert!(session.stage(StageId::Solution).is(StageStatus::Pending));
    assert!(transport.requests_for(GatewayCall::Solution).is_empty());
    assert!(matches!(
        handle.report_source(&id).await,
        Err(ControlError::ReportUnavailable)
    ));
}

#[tokio::test]
async fn test_repeated_outcome_submit_does_not_regenerate_solution() {
    let transport = Arc::new(ScriptedTransport::happy_path());
    let gate = transport.gate(GatewayCall::Solution);
    let (handle, _) = scripted_handle(transport.clone());
    let id = run_to_synthesis(&handle).await;

    let first = handle
        .submit_outcome(&id, "Urgent messages reach a nurse within minutes")
        .await
        .unwrap();
    assert!(first.triggered);
    wait_for(&handle, &id, StageId::Solution, StageStatus::Processing).await;

    assert!(matches!(
        handle.submit_outcome(&id, "A second outcome while running").await,
        Err(ControlError::AlreadyProcessing {
            stage: StageId::Solution
        })
    ));

    gate.add_permits(1);
    let done = wait_for(&handle, &id, StageId::Solution, StageStatus::Completed).await;
    let epoch = done.stage(StageId::Solution).epoch;

    let again = handle
        .submit_outcome(&id, "A revised outcome after the solution exists")
        .await
        .unwrap();
    assert!(!again.triggered);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let session = handle.session(&id).await.unwrap();
    assert_eq!(transport.requests_for(GatewayCall::Solution).len(), 1);
    assert_eq!(session.stage(StageId::Solution).epoch, epoch);
    assert!(session.stage(StageId::Solution).is(StageStatus::Completed));
    assert_eq!(
        session.expected_outcome.as_deref(),
        Some("A revised outcome after the solution exists")
    );
    assert!(session.artifacts.solution.is_some());
}

#[tokio::test]
async fn test_outcome_word_limits() {
    let (handle, _) = scripted_handle(Arc::new(ScriptedTransport::happy_path()));
    let id = run_to_synthesis(&handle).await;

    let too_long = vec!["word"; 201].join(" ");
    assert!(matches!(
        handle.submit_outcome(&id, &too_long).await,
        Err(ControlError::OutcomeTooLong { count: 201, max: 200 })
    ));
    assert!(matches!(
        handle.update_outcome(&id, &too_long).await,
        Err(ControlError::OutcomeTooLong { .. })
    ));
    assert!(matches!(
        handle.submit_outcome(&id, "   ").await,
        Err(ControlError::OutcomeEmpty)
    ));

    let exact = vec!["word"; 200].join(" ");
    assert_eq!(handle.update_outcome(&id, &exact).await.unwrap().word_count, 200);
}

#[tokio::test]
async fn test_merge_retry_unions_and_delete_retry_replaces() {
    let transport = Arc::new(ScriptedTransport::happy_path());
    let (handle, _) = scripted_handle(transport.clone());
    let id = run_to_synthesis(&handle).await;
    let first_epoch = handle.session(&id).await.unwrap().stage(StageId::Retrieval).epoch;

    transport.reply(
        GatewayCall::Papers,
        json!([
            {"title": "Triage with transformers", "pdf_url": "https://papers.test/1.pdf"},
            {"title": "A new triage benchmark", "pdf_url": "https://papers.test/9.pdf"}
        ]),
    );

    handle.retry(&id, StageId::Retrieval, false).await.unwrap();
    let merged = wait_for_rerun(&handle, &id, StageId::Retrieval, first_epoch).await;
    let titles: Vec<&str> = merged.artifacts.papers.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles.len(), 5);
    assert_eq!(titles.iter().filter(|t| **t == "Triage with transformers").count(), 1);
    assert!(titles.contains(&"A new triage benchmark"));
    // later stages were already satisfied and are not re-run
    assert_eq!(transport.requests_for(GatewayCall::GapFinder).len(), 1);

    let merged_epoch = merged.stage(StageId::Retrieval).epoch;
    handle.retry(&id, StageId::Retrieval, true).await.unwrap();
    let replaced = wait_for_rerun(&handle, &id, StageId::Retrieval, merged_epoch).await;
    let titles: Vec<&str> = replaced.artifacts.papers.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["Triage with transformers", "A new triage benchmark"]);
    assert_eq!(replaced.artifacts.repositories.len(), 5);
}

#[tokio::test]
async fn test_stop_discards_late_result() {
    let transport = Arc::new(ScriptedTransport::happy_path());
    let gate = transport.gate(GatewayCall::Refine);
    let (handle, _) = scripted_handle(transport.clone());

    let id = handle
        .initiate(PROBLEM_STATEMENT, json!(null))
        .await
        .unwrap()
        .session_id;
    let seen = transport.as_ref();
    wait_until(WAIT, move || async move {
        (!seen.requests_for(GatewayCall::Refine).is_empty()).then_some(())
    })
    .await
    .unwrap();

    let stopped = handle.stop(&id, StageId::Refine).await.unwrap();
    assert_eq!(stopped.status, StageStatus::Pending);

    gate.add_permits(1);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let session = handle.session(&id).await.unwrap();
    assert!(session.stage(StageId::Refine).is(StageStatus::Pending));
    assert_eq!(session.status, SessionStatus::Initialized);
    assert!(session.artifacts.refined_problem.is_none());
    assert!(transport.requests_for(GatewayCall::Papers).is_empty());

    assert!(matches!(
        handle.stop(&id, StageId::Refine).await,
        Err(ControlError::NotProcessing {
            stage: StageId::Refine,
            status: StageStatus::Pending
        })
    ));
}

#[tokio::test]
async fn test_retry_of_processing_stage_supersedes_in_flight_call() {
    let transport = Arc::new(ScriptedTransport::happy_path());
    let gate = transport.gate(GatewayCall::GapFinder);
    let (handle, _) = scripted_handle(transport.clone());

    let id = handle
        .initiate(PROBLEM_STATEMENT, json!(null))
        .await
        .unwrap()
        .session_id;
    let session = wait_for(&handle, &id, StageId::GapFinder, StageStatus::Processing).await;
    let stuck_epoch = session.stage(StageId::GapFinder).epoch;

    handle.retry(&id, StageId::GapFinder, true).await.unwrap();
    gate.add_permits(2);

    let session = wait_for(&handle, &id, StageId::Synthesis, StageStatus::Completed).await;
    assert!(session.stage(StageId::GapFinder).epoch > stuck_epoch);
    // the superseded attempt never advanced the pipeline a second time
    assert_eq!(transport.requests_for(GatewayCall::Synthesis).len(), 1);
}

#[tokio::test]
async fn test_retry_preconditions() {
    let transport = Arc::new(ScriptedTransport::happy_path());
    let gate = transport.gate(GatewayCall::Refine);
    let (handle, _) = scripted_handle(transport);

    let id = handle
        .initiate(PROBLEM_STATEMENT, json!(null))
        .await
        .unwrap()
        .session_id;
    assert!(matches!(
        handle.retry(&id, StageId::GapFinder, false).await,
        Err(ControlError::PredecessorIncomplete {
            stage: StageId::GapFinder
        })
    ));
    assert!(matches!(
        handle.retry("missing", StageId::Refine, false).await,
        Err(ControlError::SessionNotFound { .. })
    ));
    gate.add_permits(1);

    wait_for(&handle, &id, StageId::Synthesis, StageStatus::Completed).await;
    assert!(matches!(
        handle.retry(&id, StageId::Solution, false).await,
        Err(ControlError::OutcomeMissing)
    ));
}

#[tokio::test]
async fn test_retrieval_completes_when_two_of_three_subtasks_fail() {
    let transport = Arc::new(ScriptedTransport::happy_path());
    transport
        .fail(
            GatewayCall::Applications,
            GatewayError::HttpStatus {
                call: "Stage 2 application retrieval".into(),
                status: 502,
                body: "Bad Gateway".into(),
            },
        )
        .fail(
            GatewayCall::Repositories,
            GatewayError::NoResponse {
                call: "Stage 2 repository retrieval".into(),
            },
        );
    let (handle, _) = scripted_handle(transport.clone());

    let id = handle
        .initiate(PROBLEM_STATEMENT, json!(null))
        .await
        .unwrap()
        .session_id;
    let session = wait_for(&handle, &id, StageId::Analysis, StageStatus::Completed).await;

    let retrieval = session.stage(StageId::Retrieval);
    assert!(retrieval.is(StageStatus::Completed));
    let apps = &retrieval.subtasks[&GatewayCall::Applications];
    assert!(apps.completed);
    assert!(apps.error.as_deref().unwrap().contains("status 502"));
    assert!(session.artifacts.repositories.is_empty());
    assert_eq!(session.artifacts.papers.len(), 4);

    // no repositories means no repository chunks at all
    assert!(transport.requests_for(GatewayCall::RepositoryAnalysis).is_empty());
    assert_eq!(session.artifacts.paper_analyses.len(), 3);
}

#[tokio::test]
async fn test_retrieval_fails_when_every_subtask_fails() {
    let transport = Arc::new(ScriptedTransport::happy_path());
    for call in [
        GatewayCall::Papers,
        GatewayCall::Applications,
        GatewayCall::Repositories,
    ] {
        transport.fail(
            call,
            GatewayError::Timeout {
                call: call.label().to_string(),
                duration: Duration::from_secs(180),
            },
        );
    }
    let (handle, _) = scripted_handle(transport);

    let id = handle
        .initiate(PROBLEM_STATEMENT, json!(null))
        .await
        .unwrap()
        .session_id;
    let session = wait_for(&handle, &id, StageId::Retrieval, StageStatus::Failed).await;

    assert_eq!(session.status, SessionStatus::Failed);
    let error = session.stage(StageId::Retrieval).error.clone().unwrap();
    assert!(error.starts_with("Stage 2 paper retrieval: Chunk 1: Stage 2 paper retrieval request timed out"));
    assert!(error.contains("Stage 2 repository retrieval:"));
    assert!(session.stage(StageId::Analysis).is(StageStatus::Pending));
    assert_eq!(session.progress, 15);
}

#[tokio::test]
async fn test_unrecognized_response_fails_stage_with_validation_error() {
    let transport = Arc::new(ScriptedTransport::happy_path());
    transport.reply(GatewayCall::Synthesis, json!({}));
    let (handle, _) = scripted_handle(transport);

    let id = handle
        .initiate(PROBLEM_STATEMENT, json!(null))
        .await
        .unwrap()
        .session_id;
    let session = wait_for(&handle, &id, StageId::Synthesis, StageStatus::Failed).await;
    let error = session.stage(StageId::Synthesis).error.clone().unwrap();
    assert!(error.starts_with("Validation failed:"), "{error}");
}

#[tokio::test]
async fn test_refinement_without_topics_fails_validation() {
    let transport = Arc::new(ScriptedTransport::happy_path());
    transport.reply(GatewayCall::Refine, json!({"refine_problem": "p"}));
    let (handle, _) = scripted_handle(transport);

    let id = handle
        .initiate(PROBLEM_STATEMENT, json!(null))
        .await
        .unwrap()
        .session_id;
    let session = wait_for(&handle, &id, StageId::Refine, StageStatus::Failed).await;
    assert_eq!(
        session.stage(StageId::Refine).error.as_deref(),
        Some("Validation failed: Stage 1 returned without the refined problem or topic list")
    );
}

#[tokio::test]
async fn test_status_read_auto_fixes_missing_artifacts() {
    let (handle, store) = scripted_handle(Arc::new(ScriptedTransport::happy_path()));
    let id = run_to_synthesis(&handle).await;

    corrupt(&store, &id, |s| s.artifacts.gap_analysis = None).await;

    let status = handle.status(&id).await.unwrap();
    assert!(status.auto_fixed);
    assert_eq!(status.corrections.len(), 1);
    assert_eq!(status.corrections[0].stage, StageId::GapFinder);
    assert_eq!(
        status.corrections[0].message,
        "Stage 4 was completed but gap analysis output is missing. Please retry Stage 4."
    );
    assert_eq!(status.stages[3].status, StageStatus::Failed);

    // the correction was persisted, so the next read is clean
    let again = handle.status(&id).await.unwrap();
    assert!(!again.auto_fixed);
    assert_eq!(again.stages[3].status, StageStatus::Failed);

    let report = handle.reconcile(&id).await.unwrap();
    assert!(!report.auto_fixed);
}

#[tokio::test]
async fn test_delete_removes_session() {
    let (handle, _) = scripted_handle(Arc::new(ScriptedTransport::happy_path()));
    let id = run_to_synthesis(&handle).await;

    handle.delete(&id).await.unwrap();
    assert!(matches!(
        handle.status(&id).await,
        Err(ControlError::SessionNotFound { .. })
    ));
    assert!(matches!(
        handle.delete(&id).await,
        Err(ControlError::SessionNotFound { .. })
    ));
}

#[tokio::test]
async fn test_interrupted_sessions_are_reported_not_touched() {
    let transport = Arc::new(ScriptedTransport::happy_path());
    let _gate = transport.gate(GatewayCall::Refine);
    let (handle, _) = scripted_handle(transport);

    let id = handle
        .initiate(PROBLEM_STATEMENT, json!(null))
        .await
        .unwrap()
        .session_id;
    let interrupted = handle.interrupted_sessions().await.unwrap();
    assert_eq!(interrupted, vec![(id.clone(), vec![StageId::Refine])]);

    let session = handle.session(&id).await.unwrap();
    assert!(session.stage(StageId::Refine).is(StageStatus::Processing));
}

async fn corrupt(store: &MemoryStore, id: &str, edit: impl FnOnce(&mut Session) + Send) {
    store
        .update(
            id,
            Box::new(|s: &mut Session| {
                edit(s);
                Commit::Write
            }),
        )
        .await
        .unwrap();
}
