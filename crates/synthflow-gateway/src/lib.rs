//! External Workflow Gateway
//!
//! Uniform outbound-call abstraction to the external analysis service.
//!
//! # Architecture
//!
//! - **`Gateway`**: resolves the endpoint and timeout for a [`GatewayCall`],
//!   wraps the stage fields in the request envelope
//!   (`sessionId`, `action`, `timestamp`), and normalizes the response.
//! - **`WorkflowTransport`**: the seam that actually moves bytes. The
//!   production implementation is [`HttpTransport`]; tests substitute
//!   scripted transports.
//! - **`normalize`**: the response shape adapter.
//!
//! Missing endpoint configuration fails the call immediately with
//! `GatewayError::Misconfiguration`, before anything is sent.

mod http_client;
pub mod normalize;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use synthflow_config::Config;
use synthflow_utils::error::GatewayError;
use synthflow_utils::types::{GatewayCall, StageId};

use crate::http_client::HttpClient;

pub use normalize::{Shape, normalize, shape_for};

/// Timeout for reachability probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A fully resolved outbound call.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub call: GatewayCall,
    pub endpoint: String,
    pub timeout: Duration,
    pub body: Value,
}

/// Moves one request to the external service and returns its raw JSON body.
#[async_trait]
pub trait WorkflowTransport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<Value, GatewayError>;

    /// Check that `endpoint` answers at all. Returns the HTTP status seen.
    async fn probe(&self, call: GatewayCall, endpoint: &str) -> Result<u16, GatewayError>;
}

/// Production transport over a shared keep-alive HTTP client.
#[derive(Clone)]
pub struct HttpTransport {
    client: HttpClient,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Result<Self, GatewayError> {
        Ok(Self {
            client: HttpClient::new(connect_timeout)?,
        })
    }
}

#[async_trait]
impl WorkflowTransport for HttpTransport {
    async fn send(&self, request: OutboundRequest) -> Result<Value, GatewayError> {
        self.client
            .post_json(
                &request.endpoint,
                &request.body,
                request.timeout,
                request.call.label(),
            )
            .await
    }

    async fn probe(&self, call: GatewayCall, endpoint: &str) -> Result<u16, GatewayError> {
        self.client.probe(endpoint, PROBE_TIMEOUT, call.label()).await
    }
}

/// Outcome of probing one configured endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub call: GatewayCall,
    pub configured: bool,
    pub reachable: bool,
    pub status: Option<u16>,
    pub error: Option<String>,
}

/// Per-stage gateway over a pluggable transport.
#[derive(Clone)]
pub struct Gateway {
    transport: Arc<dyn WorkflowTransport>,
    endpoints: HashMap<GatewayCall, String>,
    timeouts: HashMap<StageId, Duration>,
}

impl Gateway {
    /// Gateway over the production HTTP transport.
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        let transport = HttpTransport::new(config.connect_timeout())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Gateway over an arbitrary transport, reading endpoints and timeouts
    /// from `config`.
    pub fn with_transport(config: &Config, transport: Arc<dyn WorkflowTransport>) -> Self {
        let endpoints = GatewayCall::ALL
            .into_iter()
            .filter_map(|call| config.endpoint_for(call).map(|url| (call, url.to_string())))
            .collect();
        let timeouts = StageId::ALL
            .into_iter()
            .map(|stage| (stage, config.timeout_for(stage)))
            .collect();
        Self {
            transport,
            endpoints,
            timeouts,
        }
    }

    fn endpoint(&self, call: GatewayCall) -> Result<&str, GatewayError> {
        self.endpoints.get(&call).map(String::as_str).ok_or_else(|| {
            GatewayError::Misconfiguration(format!(
                "{} endpoint is not configured (set {} or [gateway.endpoints].{})",
                call.label(),
                call.env_var(),
                call.config_key()
            ))
        })
    }

    fn timeout(&self, stage: StageId) -> Duration {
        self.timeouts
            .get(&stage)
            .copied()
            .unwrap_or(Duration::from_secs(180))
    }

    /// Issue one stage call and return its normalized result.
    ///
    /// `fields` holds the stage-specific input; the envelope keys are added
    /// here and win over any same-named field.
    pub async fn call(
        &self,
        call: GatewayCall,
        session_id: &str,
        fields: Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        let endpoint = self.endpoint(call)?.to_string();
        let request = OutboundRequest {
            call,
            endpoint,
            timeout: self.timeout(call.stage()),
            body: envelope(call, session_id, fields),
        };

        debug!(
            session_id = %session_id,
            call = call.config_key(),
            "Dispatching gateway call"
        );
        let raw = self.transport.send(request).await?;
        normalize(call, raw)
    }

    /// Probe every gateway call. Unconfigured calls are reported, not sent.
    pub async fn probe_all(&self) -> Vec<ProbeReport> {
        let mut reports = Vec::with_capacity(GatewayCall::ALL.len());
        for call in GatewayCall::ALL {
            let report = match self.endpoints.get(&call) {
                None => ProbeReport {
                    call,
                    configured: false,
                    reachable: false,
                    status: None,
                    error: Some(format!("{} is not set", call.env_var())),
                },
                Some(endpoint) => match self.transport.probe(call, endpoint).await {
                    Ok(status) => ProbeReport {
                        call,
                        configured: true,
                        reachable: true,
                        status: Some(status),
                        error: None,
                    },
                    Err(e) => {
                        warn!(call = call.config_key(), error = %e, "Endpoint probe failed");
                        ProbeReport {
                            call,
                            configured: true,
                            reachable: false,
                            status: None,
                            error: Some(e.to_string()),
                        }
                    }
                },
            };
            reports.push(report);
        }
        reports
    }
}

/// Build the request body: stage fields plus `sessionId`, `action`, `timestamp`.
#[must_use]
pub fn envelope(call: GatewayCall, session_id: &str, mut fields: Map<String, Value>) -> Value {
    fields.insert("sessionId".to_string(), Value::String(session_id.to_string()));
    fields.insert("action".to_string(), Value::String(call.action().to_string()));
    fields.insert("stage".to_string(), Value::from(call.stage().number()));
    fields.insert("timestamp".to_string(), Value::String(Utc::now().to_rfc3339()));
    Value::Object(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records requests and replies with a fixed body.
    struct RecordingTransport {
        reply: Value,
        seen: Mutex<Vec<OutboundRequest>>,
    }

    #[async_trait]
    impl WorkflowTransport for RecordingTransport {
        async fn send(&self, request: OutboundRequest) -> Result<Value, GatewayError> {
            self.seen.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }

        async fn probe(&self, _call: GatewayCall, _endpoint: &str) -> Result<u16, GatewayError> {
            Ok(405)
        }
    }

    fn gateway_with(reply: Value) -> (Gateway, Arc<RecordingTransport>) {
        let config = Config::builder()
            .endpoint(GatewayCall::Refine, "http://localhost:5678/refine")
            .endpoint(GatewayCall::Papers, "http://localhost:5678/papers")
            .build()
            .unwrap();
        let transport = Arc::new(RecordingTransport {
            reply,
            seen: Mutex::new(Vec::new()),
        });
        (Gateway::with_transport(&config, transport.clone()), transport)
    }

    #[tokio::test]
    async fn test_call_wraps_envelope_and_uses_stage_timeout() {
        let (gateway, transport) = gateway_with(json!([{"refine_problem": "p"}]));
        let mut fields = Map::new();
        fields.insert("originalInput".to_string(), json!("raw text"));

        let out = gateway.call(GatewayCall::Refine, "s-1", fields).await.unwrap();
        assert_eq!(out, json!({"refine_problem": "p"}));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let req = &seen[0];
        assert_eq!(req.endpoint, "http://localhost:5678/refine");
        assert_eq!(req.timeout, Duration::from_secs(150));
        assert_eq!(req.body["sessionId"], "s-1");
        assert_eq!(req.body["action"], "enhance_prompt");
        assert_eq!(req.body["stage"], 1);
        assert_eq!(req.body["originalInput"], "raw text");
        assert!(req.body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_missing_endpoint_fails_before_sending() {
        let (gateway, transport) = gateway_with(json!({}));
        let err = gateway
            .call(GatewayCall::GapFinder, "s-1", Map::new())
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(err.to_string().contains("SYNTHFLOW_STAGE4_URL"));
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_shape_fails_closed() {
        let (gateway, _) = gateway_with(json!("just text"));
        let err = gateway
            .call(GatewayCall::Papers, "s-1", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn test_probe_reports_unconfigured_calls() {
        let (gateway, _) = gateway_with(json!({}));
        let reports = gateway.probe_all().await;

        assert_eq!(reports.len(), GatewayCall::ALL.len());
        let refine = reports.iter().find(|r| r.call == GatewayCall::Refine).unwrap();
        assert!(refine.reachable);
        assert_eq!(refine.status, Some(405));
        let solution = reports.iter().find(|r| r.call == GatewayCall::Solution).unwrap();
        assert!(!solution.configured);
        assert!(!solution.reachable);
    }
}
