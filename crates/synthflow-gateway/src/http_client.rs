//! Shared HTTP client for the external workflow service
//!
//! One `reqwest::Client` is built per process and reused for every stage
//! call, so connections stay pooled and kept alive across the long-running
//! analysis calls.

use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use synthflow_utils::error::GatewayError;
use synthflow_utils::logging::redact_error_message;

/// Idle pooled connections are dropped after this long.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// TCP keepalive probe interval for in-flight calls.
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// Longest error body kept on a stage record.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Keep-alive HTTP client with the gateway error taxonomy.
///
/// Unlike a retrying client, every failure is returned to the caller on the
/// first attempt; retries are an explicit client operation.
#[derive(Clone)]
pub(crate) struct HttpClient {
    client: Arc<Client>,
}

impl HttpClient {
    /// Build the shared client.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Misconfiguration` if the client cannot be constructed
    pub fn new(connect_timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(10)
            .tcp_keepalive(TCP_KEEPALIVE)
            .build()
            .map_err(|e| {
                GatewayError::Misconfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// POST a JSON body and parse the JSON response.
    ///
    /// Errors map onto the gateway taxonomy:
    /// - elapsed timeout → `Timeout`
    /// - reset/aborted connection → `ConnectionReset`
    /// - non-2xx status → `HttpStatus` with the (truncated) body
    /// - refused connection or empty body → `NoResponse`
    /// - non-JSON body → `Validation`
    pub async fn post_json(
        &self,
        endpoint: &str,
        body: &Value,
        timeout: Duration,
        label: &str,
    ) -> Result<Value, GatewayError> {
        debug!(
            call = label,
            timeout_secs = timeout.as_secs(),
            "Executing gateway request"
        );

        let response = self
            .client
            .post(endpoint)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, label, timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e, label, timeout))?;

        if !status.is_success() {
            return Err(status_error(status, &text, label));
        }

        if text.trim().is_empty() {
            return Err(GatewayError::NoResponse {
                call: label.to_string(),
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            GatewayError::Validation(format!("{label} returned a body that is not JSON: {e}"))
        })
    }

    /// Reachability check: any HTTP answer counts as reachable.
    pub async fn probe(
        &self,
        endpoint: &str,
        timeout: Duration,
        label: &str,
    ) -> Result<u16, GatewayError> {
        let response = self
            .client
            .get(endpoint)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, label, timeout))?;
        Ok(response.status().as_u16())
    }
}

fn status_error(status: StatusCode, body: &str, label: &str) -> GatewayError {
    let trimmed = body.trim();
    let detail = if trimmed.is_empty() {
        status.canonical_reason().unwrap_or("no body").to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
    };
    GatewayError::HttpStatus {
        call: label.to_string(),
        status: status.as_u16(),
        body: redact_error_message(&detail),
    }
}

fn classify_transport_error(err: &reqwest::Error, label: &str, timeout: Duration) -> GatewayError {
    let call = label.to_string();
    if err.is_timeout() {
        return GatewayError::Timeout {
            call,
            duration: timeout,
        };
    }
    if is_connection_reset(err) {
        return GatewayError::ConnectionReset { call };
    }
    if err.is_builder() {
        return GatewayError::Misconfiguration(format!(
            "{label} endpoint is invalid: {}",
            redact_error_message(&err.to_string())
        ));
    }
    GatewayError::NoResponse { call }
}

/// Walk the source chain looking for a dropped connection.
fn is_connection_reset(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("connection reset") || text.contains("connection closed before message completed") {
            return true;
        }
        source = cause.source();
    }
    false
}
