//! Test doubles for the completion service and the graph service.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::messages::ToolCallRequest;
use crate::error::UpstreamError;
use crate::graph_service::{GraphRequest, GraphService};
use crate::models::{CompletionRequest, CompletionResponse, LanguageModel};

static CALL_IDS: AtomicUsize = AtomicUsize::new(1);

pub fn tool_calls(calls: &[(&str, &str)]) -> CompletionResponse {
    let tool_calls = calls
        .iter()
        .map(|(name, args)| ToolCallRequest::new(format!("call_{}", CALL_IDS.fetch_add(1, Ordering::Relaxed)), *name, *args))
        .collect();
    CompletionResponse { content: None, tool_calls, finish_reason: Some("tool_calls".into()), model: "scripted".into() }
}

pub fn text(content: &str) -> CompletionResponse {
    CompletionResponse { content: Some(content.into()), tool_calls: Vec::new(), finish_reason: Some("stop".into()), model: "scripted".into() }
}

enum Step {
    Reply(CompletionResponse),
    Delayed(Duration, CompletionResponse),
    Fail(String),
}

/// Replays queued responses in order; once the queue is empty it repeats the
/// fallback, or fails when there is none.
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Step>>,
    fallback: Option<CompletionResponse>,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self { Self::default() }

    fn push(self, step: Step) -> Self {
        self.script.lock().unwrap().push_back(step);
        self
    }

    pub fn then(self, resp: CompletionResponse) -> Self {
        self.push(Step::Reply(resp))
    }

    /// Answer only after `delay`; lets a test drop or race an in-flight turn.
    pub fn then_after(self, delay: Duration, resp: CompletionResponse) -> Self {
        self.push(Step::Delayed(delay, resp))
    }

    pub fn then_fail(self, message: &str) -> Self {
        self.push(Step::Fail(message.to_string()))
    }

    pub fn repeating(mut self, resp: CompletionResponse) -> Self {
        self.fallback = Some(resp);
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<CompletionResponse> {
        self.seen.lock().unwrap().push(req);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Step::Reply(resp)) => Ok(resp),
            Some(Step::Delayed(delay, resp)) => {
                tokio::time::sleep(delay).await;
                Ok(resp)
            }
            Some(Step::Fail(message)) => Err(anyhow::anyhow!(message)),
            None => match &self.fallback {
                Some(resp) => {
                    // fresh ids so repeated calls stay distinguishable
                    let mut resp = resp.clone();
                    for call in &mut resp.tool_calls {
                        call.id = format!("call_{}", CALL_IDS.fetch_add(1, Ordering::Relaxed));
                    }
                    Ok(resp)
                }
                None => Err(anyhow::anyhow!("script exhausted")),
            },
        }
    }
}

/// Graph service double: canned responses keyed by path, every request recorded.
#[derive(Default)]
pub struct RecordingGraph {
    responses: HashMap<String, Value>,
    failures: HashMap<String, UpstreamError>,
    offline: bool,
    requests: Mutex<Vec<GraphRequest>>,
}

impl RecordingGraph {
    pub fn respond(mut self, path: &str, value: Value) -> Self {
        self.responses.insert(path.to_string(), value);
        self
    }

    pub fn fail(mut self, path: &str, err: UpstreamError) -> Self {
        self.failures.insert(path.to_string(), err);
        self
    }

    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn requests(&self) -> Vec<GraphRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphService for RecordingGraph {
    async fn send(&self, req: GraphRequest) -> Result<Value, UpstreamError> {
        let path = req.path();
        self.requests.lock().unwrap().push(req);
        if self.offline {
            return Err(UpstreamError::Unreachable { base: "http://graph.test".into() });
        }
        if let Some(err) = self.failures.get(&path) {
            return Err(err.clone());
        }
        Ok(self.responses.get(&path).cloned().unwrap_or_else(|| json!({"success": true})))
    }
}
