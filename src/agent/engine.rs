use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::Span;

use super::context::ContextBuilder;
use super::messages::{AgentContext, Message, ToolCallRequest};
use super::prompts;
use super::tools::ToolRegistry;
use crate::error::{AssistantError, ToolError};
use crate::models::{CompletionRequest, LanguageModel, ToolChoice};
use crate::settings::EffectiveSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Done,
    MaxIterations,
    Error,
}

impl TurnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnOutcome::Done => "done",
            TurnOutcome::MaxIterations => "max_iterations",
            TurnOutcome::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnResult {
    pub response: String,
    pub context: AgentContext,
    /// One entry per tool call attempted this turn, in call order.
    pub actions: Vec<String>,
    pub outcome: TurnOutcome,
}

/// The tool-calling loop: model call, sequential tool execution, repeat until
/// the model answers in plain text or the iteration cap is hit.
pub struct ResearchAssistant {
    model: Arc<dyn LanguageModel>,
    registry: Arc<ToolRegistry>,
    context: ContextBuilder,
    span: Span,
}

impl ResearchAssistant {
    pub fn new(model: Arc<dyn LanguageModel>, registry: Arc<ToolRegistry>, parent: &Span) -> Self {
        let span = tracing::info_span!(parent: parent, "assistant");
        let context = ContextBuilder::new(registry.clone(), &span);
        Self { model, registry, context, span }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn start_conversation(&self, use_context: bool) -> AgentContext {
        let prompt = if use_context {
            self.context.build_initial_prompt().await
        } else {
            self.context.base_prompt().to_string()
        };
        AgentContext::seeded(prompt)
    }

    /// Re-render the seed prompt from live graph state, keeping the history.
    pub async fn refresh_context(&self, ctx: &mut AgentContext) {
        let prompt = self.context.refresh().await;
        ctx.replace_seed(prompt);
    }

    pub async fn process_message(&self, user_text: &str, context: AgentContext, settings: &EffectiveSettings) -> TurnResult {
        let mut ctx = context;
        if ctx.messages.is_empty() {
            ctx.messages.push(Message::system(self.context.base_prompt()));
        }
        ctx.messages.push(Message::user(user_text));
        ctx.current_iteration = 0;

        let mut actions = Vec::new();
        let max = settings.max_iterations;

        while ctx.current_iteration < max {
            tracing::debug!(parent: &self.span, iteration = ctx.current_iteration + 1, max, "calling model");
            let req = CompletionRequest {
                model: settings.model.clone(),
                messages: ctx.messages.clone(),
                tools: self.registry.specs().to_vec(),
                tool_choice: if self.registry.is_empty() { ToolChoice::None } else { ToolChoice::Auto },
                temperature: settings.model_params.temperature,
                max_tokens: settings.model_params.max_tokens,
                top_p: settings.model_params.top_p,
            };
            metrics::counter!("assistant_model_calls_total").increment(1);
            let resp = match self.model.complete(req).await {
                Ok(r) => r,
                Err(e) => {
                    let err = AssistantError::Model(e);
                    tracing::error!(parent: &self.span, error = %err, iteration = ctx.current_iteration, "model call failed");
                    return self.finish(prompts::turn_error(&err), ctx, actions, TurnOutcome::Error);
                }
            };

            if resp.tool_calls.is_empty() {
                let text = resp
                    .content
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| prompts::EMPTY_RESPONSE_MESSAGE.to_string());
                ctx.messages.push(Message::assistant(text.clone()));
                return self.finish(text, ctx, actions, TurnOutcome::Done);
            }

            let calls = resp.tool_calls;
            ctx.messages.push(Message::assistant_tool_calls(resp.content.unwrap_or_default(), calls.clone()));
            for call in &calls {
                actions.push(prompts::audit_entry(&call.tool_name, &call.arguments));
                let outcome = self.execute(call).await;
                ctx.messages.push(Message::tool_result(call.id.clone(), outcome));
            }
            ctx.last_tool_calls = calls;
            ctx.current_iteration += 1;
        }

        tracing::warn!(parent: &self.span, max, actions = actions.len(), "iteration cap reached");
        self.finish(prompts::MAX_ITERATIONS_MESSAGE.to_string(), ctx, actions, TurnOutcome::MaxIterations)
    }

    /// Run one requested call. Every failure becomes text the model can read.
    async fn execute(&self, call: &ToolCallRequest) -> String {
        let result = match parse_arguments(call) {
            Ok(args) => self.registry.run(&call.tool_name, args).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(v) => prompts::tool_result(&call.tool_name, &v),
            Err(e) => prompts::tool_error(&call.tool_name, e),
        }
    }

    fn finish(&self, response: String, context: AgentContext, actions: Vec<String>, outcome: TurnOutcome) -> TurnResult {
        metrics::counter!("assistant_turns_total", "outcome" => outcome.as_str()).increment(1);
        tracing::info!(parent: &self.span, outcome = outcome.as_str(), iterations = context.current_iteration, actions = actions.len(), "turn finished");
        TurnResult { response, context, actions, outcome }
    }
}

/// Blank arguments mean "no arguments".
fn parse_arguments(call: &ToolCallRequest) -> Result<Value, ToolError> {
    if call.arguments.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(&call.arguments)
        .map_err(|e| ToolError::InvalidArguments { tool: call.tool_name.clone(), reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::messages::Role;
    use crate::testing::{text, tool_calls, RecordingGraph, ScriptedModel};
    use serde_json::json;

    fn assistant(model: ScriptedModel, graph: RecordingGraph) -> (ResearchAssistant, Arc<ScriptedModel>, Arc<RecordingGraph>) {
        let model = Arc::new(model);
        let graph = Arc::new(graph);
        let registry = ToolRegistry::with_graph_tools(graph.clone(), &Span::none()).unwrap();
        (ResearchAssistant::new(model.clone(), Arc::new(registry), &Span::none()), model, graph)
    }

    fn settings(max_iterations: u32) -> EffectiveSettings {
        EffectiveSettings { max_iterations, ..EffectiveSettings::default() }
    }

    #[tokio::test]
    async fn list_experiments_scenario() {
        let model = ScriptedModel::new().then(tool_calls(&[("get_graph_overview", "{}")])).then(text("You have 2 experiments"));
        let graph = RecordingGraph::default().respond("/graph/overview", json!({"nodes": [{"id": 1}, {"id": 2}], "edges": []}));
        let (a, model, graph) = assistant(model, graph);

        let ctx = a.start_conversation(false).await;
        let turn = a.process_message("List my experiments", ctx, &settings(10)).await;

        assert_eq!(turn.outcome, TurnOutcome::Done);
        assert_eq!(turn.response, "You have 2 experiments");
        assert_eq!(turn.actions, vec!["Called get_graph_overview with args: {}".to_string()]);
        assert_eq!(turn.context.current_iteration, 1);
        assert_eq!(graph.requests().len(), 1);

        let roles: Vec<Role> = turn.context.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        let call_id = &turn.context.messages[2].tool_calls[0].id;
        assert_eq!(turn.context.messages[3].tool_call_id.as_ref(), Some(call_id));
        assert!(turn.context.messages[3].content.starts_with("Tool get_graph_overview result: {"));

        let reqs = model.requests();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].tools.len(), 14);
        assert_eq!(reqs[0].tool_choice, ToolChoice::Auto);
    }

    #[tokio::test]
    async fn stops_at_the_iteration_cap() {
        let model = ScriptedModel::new().repeating(tool_calls(&[("get_context_keywords", "{}")]));
        let (a, model, _) = assistant(model, RecordingGraph::default());
        let turn = a.process_message("loop forever", AgentContext::default(), &settings(3)).await;
        assert_eq!(turn.outcome, TurnOutcome::MaxIterations);
        assert_eq!(turn.response, prompts::MAX_ITERATIONS_MESSAGE);
        assert_eq!(turn.context.current_iteration, 3);
        assert_eq!(turn.actions.len(), 3);
        assert_eq!(model.requests().len(), 3);
    }

    #[tokio::test]
    async fn tool_failures_are_folded_back_and_the_loop_continues() {
        let model = ScriptedModel::new()
            .then(tool_calls(&[("get_node_info", "{\"node_id\": 99}"), ("create_node", "{not json"), ("get_all_nodes", "{}")]))
            .then(text("Node 99 does not exist."));
        let graph = RecordingGraph::default().fail("/nodes/99", crate::error::UpstreamError::Rejected { status: 404, detail: "Node not found".into() });
        let (a, model, graph) = assistant(model, graph);

        let turn = a.process_message("show node 99", AgentContext::default(), &settings(5)).await;
        assert_eq!(turn.outcome, TurnOutcome::Done);
        assert_eq!(turn.response, "Node 99 does not exist.");

        let results: Vec<&str> = turn.context.messages.iter().filter(|m| m.role == Role::Tool).map(|m| m.content.as_str()).collect();
        assert_eq!(results[0], "Tool get_node_info error: API Error 404: Node not found");
        assert!(results[1].starts_with("Tool create_node error: could not parse arguments"));
        assert_eq!(results[2], "Tool get_all_nodes error: Tool get_all_nodes not found");
        // the unparseable call never reached the graph service
        assert_eq!(graph.requests().len(), 1);
        assert_eq!(model.requests().len(), 2);
    }

    #[tokio::test]
    async fn actions_preserve_call_order() {
        let calls = [
            ("create_node", r#"{"title":"A"}"#),
            ("create_node", r#"{"title":"B"}"#),
            ("create_edge", r#"{"from_experiment_id":1,"to_experiment_id":2,"relationship_type":"leads_to"}"#),
        ];
        let model = ScriptedModel::new().then(tool_calls(&calls)).then(text("done"));
        let (a, _, graph) = assistant(model, RecordingGraph::default());
        let turn = a.process_message("plan", AgentContext::default(), &settings(5)).await;

        let expected: Vec<String> = calls.iter().map(|(n, args)| format!("Called {n} with args: {args}")).collect();
        assert_eq!(turn.actions, expected);
        let paths: Vec<String> = graph.requests().iter().map(|r| r.path()).collect();
        assert_eq!(paths, vec!["/nodes", "/nodes", "/edges"]);
    }

    #[tokio::test]
    async fn model_failure_aborts_without_half_applied_iteration() {
        let model = ScriptedModel::new().then(tool_calls(&[("get_graph_overview", "{}")])).then_fail("rate limited");
        let (a, _, _) = assistant(model, RecordingGraph::default());
        let turn = a.process_message("hi", AgentContext::seeded("sys"), &settings(5)).await;
        assert_eq!(turn.outcome, TurnOutcome::Error);
        assert_eq!(turn.response, "I encountered an error: rate limited");
        assert_eq!(turn.context.current_iteration, 1);
        // system, user, one completed iteration; nothing from the failed call
        assert_eq!(turn.context.messages.len(), 4);
        assert_eq!(turn.context.messages.last().map(|m| m.role), Some(Role::Tool));
    }

    #[tokio::test]
    async fn empty_answer_gets_the_apology() {
        let (a, _, _) = assistant(ScriptedModel::new().then(text("  ")), RecordingGraph::default());
        let turn = a.process_message("hi", AgentContext::default(), &settings(5)).await;
        assert_eq!(turn.response, prompts::EMPTY_RESPONSE_MESSAGE);
        assert_eq!(turn.context.messages[0].role, Role::System);
    }

    #[tokio::test]
    async fn iteration_counter_restarts_each_turn() {
        let model = ScriptedModel::new()
            .then(tool_calls(&[("get_graph_overview", "")]))
            .then(text("first"))
            .then(text("second"));
        let (a, _, _) = assistant(model, RecordingGraph::default());
        let first = a.process_message("one", AgentContext::default(), &settings(2)).await;
        assert_eq!(first.context.current_iteration, 1);
        let second = a.process_message("two", first.context, &settings(2)).await;
        assert_eq!(second.context.current_iteration, 0);
        assert_eq!(second.response, "second");
        assert_eq!(second.context.last_tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn start_with_context_survives_graph_outage() {
        let (a, _, _) = assistant(ScriptedModel::new(), RecordingGraph::default().offline());
        let ctx = a.start_conversation(true).await;
        assert_eq!(ctx.seed_prompt(), Some(prompts::SYSTEM_PROMPT));
        assert_eq!(ctx.current_iteration, 0);
        assert_eq!(ctx.messages.len(), 1);
    }
}
