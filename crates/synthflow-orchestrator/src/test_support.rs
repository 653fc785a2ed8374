//! Scripted gateway transport and canned workflow responses.
//!
//! Lets the whole pipeline run in-process: every [`GatewayCall`] is answered
//! by a responder closure, optionally after a delay or behind a gate the
//! test releases by hand. Every request is recorded for later inspection.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;

use synthflow_config::Config;
use synthflow_gateway::{Gateway, OutboundRequest, WorkflowTransport};
use synthflow_session::{MemoryStore, SessionStore};
use synthflow_utils::error::GatewayError;
use synthflow_utils::types::GatewayCall;

use crate::OrchestratorHandle;

type Responder = Arc<dyn Fn(&OutboundRequest) -> Result<Value, GatewayError> + Send + Sync>;

/// Thirty words, exactly the minimum problem statement length.
pub const PROBLEM_STATEMENT: &str = "Small clinics struggle to triage incoming patient messages \
     because staff must read every message by hand, which delays urgent cases and burns \
     time that nurses should spend on patient care";

#[derive(Default)]
struct Script {
    responders: HashMap<GatewayCall, Responder>,
    delays: HashMap<GatewayCall, Duration>,
    gates: HashMap<GatewayCall, Arc<Semaphore>>,
}

/// In-process [`WorkflowTransport`] driven by per-call responders.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedTransport {
    /// A transport with no responders; every call fails with no response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport answering every call with the happy-path fixture.
    #[must_use]
    pub fn happy_path() -> Self {
        let transport = Self::new();
        for call in GatewayCall::ALL {
            transport.respond_with(call, move |request| Ok(fixtures::response(call, request)));
        }
        transport
    }

    pub fn respond_with<F>(&self, call: GatewayCall, responder: F) -> &Self
    where
        F: Fn(&OutboundRequest) -> Result<Value, GatewayError> + Send + Sync + 'static,
    {
        self.script().responders.insert(call, Arc::new(responder));
        self
    }

    /// Answer `call` with a fixed body.
    pub fn reply(&self, call: GatewayCall, body: Value) -> &Self {
        self.respond_with(call, move |_| Ok(body.clone()))
    }

    /// Fail every request for `call` with `error`.
    pub fn fail(&self, call: GatewayCall, error: GatewayError) -> &Self {
        self.respond_with(call, move |_| Err(error.clone()))
    }

    pub fn delay(&self, call: GatewayCall, delay: Duration) -> &Self {
        self.script().delays.insert(call, delay);
        self
    }

    /// Hold requests for `call` until the returned semaphore gets permits.
    /// Each permit releases one request.
    pub fn gate(&self, call: GatewayCall) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.script().gates.insert(call, gate.clone());
        gate
    }

    /// Every request received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn requests_for(&self, call: GatewayCall) -> Vec<OutboundRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.call == call)
            .collect()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl WorkflowTransport for ScriptedTransport {
    async fn send(&self, request: OutboundRequest) -> Result<Value, GatewayError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let (responder, delay, gate) = {
            let script = self.script();
            (
                script.responders.get(&request.call).cloned(),
                script.delays.get(&request.call).copied(),
                script.gates.get(&request.call).cloned(),
            )
        };
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match responder {
            Some(responder) => responder(&request),
            None => Err(GatewayError::NoResponse {
                call: request.call.label().to_string(),
            }),
        }
    }

    async fn probe(&self, _call: GatewayCall, _endpoint: &str) -> Result<u16, GatewayError> {
        Ok(200)
    }
}

/// Memory-backed config with an endpoint for every call.
#[must_use]
pub fn test_config() -> Config {
    let mut config = Config::minimal_for_testing();
    for call in GatewayCall::ALL {
        config.gateway.endpoints.insert(
            call.config_key().to_string(),
            format!("http://workflow.test/{}", call.config_key()),
        );
    }
    config
}

/// A handle over a fresh memory store and `transport`.
#[must_use]
pub fn scripted_handle(transport: Arc<ScriptedTransport>) -> (OrchestratorHandle, Arc<MemoryStore>) {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    let gateway = Gateway::with_transport(&config, transport);
    let handle = OrchestratorHandle::with_parts(
        store.clone() as Arc<dyn SessionStore>,
        gateway,
        config.pipeline,
    );
    (handle, store)
}

/// Poll `check` every 10ms until it yields `Some`, or give up after
/// `timeout`.
pub async fn wait_until<T, F, Fut>(timeout: Duration, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(value) = check().await {
            return Some(value);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Canned workflow responses, shaped the way the external service sends
/// them (arrays and envelopes included).
pub mod fixtures {
    use super::*;

    pub fn response(call: GatewayCall, request: &OutboundRequest) -> Value {
        match call {
            GatewayCall::Refine => refine(),
            GatewayCall::Papers => papers(),
            GatewayCall::Applications => applications(),
            GatewayCall::Repositories => repositories(),
            GatewayCall::PaperAnalysis => chunk_analysis(request, "papers"),
            GatewayCall::RepositoryAnalysis => chunk_analysis(request, "repositories"),
            GatewayCall::GapFinder => gaps(),
            GatewayCall::Synthesis => synthesis(),
            GatewayCall::Solution => solution(),
        }
    }

    pub fn refine() -> Value {
        json!([{
            "refine_problem": "Automate urgency triage of patient messages for small clinics",
            "subtopics": [
                {"subtopic_id": 1, "title": "Clinical text classification", "keywords": ["nlp", "triage"]},
                "Human-in-the-loop review"
            ]
        }])
    }

    /// Four papers, three with a PDF link.
    pub fn papers() -> Value {
        json!([
            {"title": "Triage with transformers", "authors": "A. Lee, B. Chen", "pdf_url": "https://papers.test/1.pdf", "semantic_score": 0.91},
            {"title": "Message routing in primary care", "authors": ["C. Diaz"], "pdf_url": "https://papers.test/2.pdf"},
            {"title": "Alert fatigue revisited", "pdf_url": "https://papers.test/3.pdf"},
            {"title": "An unlinked survey", "abstract": "No PDF available."}
        ])
    }

    pub fn applications() -> Value {
        json!({
            "solutions": [{
                "title": "TriageBot",
                "summary": "Commercial inbox triage",
                "features": ["priority flags"],
                "official_website": "https://apps.test/triagebot"
            }],
            "notes": "Few tools target small clinics."
        })
    }

    /// Five repositories: one chunk of four, one of one.
    pub fn repositories() -> Value {
        json!({"data": [
            {"full_name": "org/triage-nlp", "html_url": "https://git.test/org/triage-nlp"},
            {"full_name": "org/inbox-router", "html_url": "https://git.test/org/inbox-router"},
            {"full_name": "org/med-bert", "html_url": "https://git.test/org/med-bert"},
            {"full_name": "org/fhir-hooks", "html_url": "https://git.test/org/fhir-hooks"},
            {"full_name": "org/alerting", "html_url": "https://git.test/org/alerting"}
        ]})
    }

    /// One analysis entry per item in the chunk, titled by the item.
    pub fn chunk_analysis(request: &OutboundRequest, key: &str) -> Value {
        let chunk = request.body["chunkNumber"].clone();
        let entries: Vec<Value> = request.body[key]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|item| {
                let name = item
                    .get("title")
                    .or_else(|| item.get("full_name"))
                    .cloned()
                    .unwrap_or(Value::Null);
                json!({"title": format!("Analysis of {}", name.as_str().unwrap_or("item")), "chunk": chunk})
            })
            .collect();
        Value::Array(entries)
    }

    pub fn gaps() -> Value {
        json!([{
            "evidence_based_gaps": [{"gap": "No evaluation on small clinic data"}],
            "ai_predicted_possible_gaps": [{"gap": "Multilingual messages"}],
            "confidence_level": "HIGH"
        }])
    }

    pub fn synthesis() -> Value {
        json!({"literature_review": "Transformer classifiers dominate recent triage work."})
    }

    pub fn solution() -> Value {
        json!([{"structuredOutput": {
            "proposed_solution": "A lightweight triage assistant with nurse review",
            "Problem Understanding": "Clinics need faster routing of urgent messages.",
            "Solution Architecture & Approach": ["Classifier service", "Review queue"],
            "Implementation Workflow": [
                {"phase_title": "Pilot", "steps": ["Label 500 messages", "Fine-tune"]}
            ],
            "Recommended Tech Stack": [{"title": "Backend", "items": ["Rust", "PostgreSQL"]}],
            "Scoring by Factors": [{"title": "Feasibility", "rating": 8, "description": "Proven models"}],
            "Limitations & Open Questions": ["Liability for missed urgent cases"]
        }}])
    }
}
