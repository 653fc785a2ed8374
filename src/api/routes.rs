//! Control API handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use synthflow_orchestrator::OrchestratorHandle;
use synthflow_utils::types::StageId;

use super::error::ApiError;
use crate::report::{render_markdown, report_file_name};

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    pub problem_statement: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    pub stage: u8,
    #[serde(default)]
    pub delete_existing: bool,
}

#[derive(Debug, Deserialize)]
pub struct StopRequest {
    pub stage: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRequest {
    pub expected_outcome: String,
}

/// Unwrap a JSON body, turning axum's rejection into a 400.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn stage(number: u8) -> ApiResult<StageId> {
    StageId::from_number(number)
        .ok_or_else(|| ApiError::BadRequest(format!("Stage must be between 1 and 6, got {number}")))
}

pub async fn initiate(
    State(handle): State<OrchestratorHandle>,
    payload: Result<Json<InitiateRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let request = body(payload)?;
    let started = handle
        .initiate(&request.problem_statement, request.metadata)
        .await?;
    Ok((StatusCode::CREATED, Json(started)).into_response())
}

pub async fn status(
    State(handle): State<OrchestratorHandle>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    Ok(Json(handle.status(&id).await?).into_response())
}

pub async fn details(
    State(handle): State<OrchestratorHandle>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    Ok(Json(handle.details(&id).await?).into_response())
}

pub async fn retry(
    State(handle): State<OrchestratorHandle>,
    Path(id): Path<String>,
    payload: Result<Json<RetryRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let request = body(payload)?;
    let accepted = handle
        .retry(&id, stage(request.stage)?, request.delete_existing)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)).into_response())
}

pub async fn stop(
    State(handle): State<OrchestratorHandle>,
    Path(id): Path<String>,
    payload: Result<Json<StopRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let request = body(payload)?;
    Ok(Json(handle.stop(&id, stage(request.stage)?).await?).into_response())
}

pub async fn submit_outcome(
    State(handle): State<OrchestratorHandle>,
    Path(id): Path<String>,
    payload: Result<Json<OutcomeRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let request = body(payload)?;
    let accepted = handle.submit_outcome(&id, &request.expected_outcome).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)).into_response())
}

pub async fn update_outcome(
    State(handle): State<OrchestratorHandle>,
    Path(id): Path<String>,
    payload: Result<Json<OutcomeRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let request = body(payload)?;
    Ok(Json(handle.update_outcome(&id, &request.expected_outcome).await?).into_response())
}

pub async fn reconcile(
    State(handle): State<OrchestratorHandle>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    Ok(Json(handle.reconcile(&id).await?).into_response())
}

pub async fn delete(
    State(handle): State<OrchestratorHandle>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    handle.delete(&id).await?;
    Ok(Json(json!({ "sessionId": id, "deleted": true })).into_response())
}

pub async fn report(
    State(handle): State<OrchestratorHandle>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let session = handle.report_source(&id).await?;
    let disposition = format!("attachment; filename=\"{}\"", report_file_name(&session.id));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        render_markdown(&session),
    )
        .into_response())
}

pub async fn health(State(handle): State<OrchestratorHandle>) -> Response {
    let endpoints = handle.probe_endpoints().await;
    Json(json!({ "status": "ok", "endpoints": endpoints })).into_response()
}
