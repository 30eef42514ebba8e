use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::agent::prompts::HELP_MESSAGE;
use crate::conversation::ConversationService;
use crate::session::ConversationContext;
use crate::settings::RequestOverrides;

fn describe_context(ctx: &ConversationContext) -> String {
    let mut out = format!("\nCurrent Context:\n  Iterations: {}\n  Messages: {}", ctx.current_iteration, ctx.message_count);
    if !ctx.last_tool_calls.is_empty() {
        out.push_str("\n  Last tool calls:");
        for (i, call) in ctx.last_tool_calls.iter().enumerate() {
            out.push_str(&format!("\n    {}. {}", i + 1, call.tool_name));
        }
    }
    out.push('\n');
    out
}

/// Line-oriented chat against an in-process conversation.
pub async fn run<R, W>(conversations: Arc<ConversationService>, use_context: bool, input: R, mut output: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let started = conversations.start_conversation(None, use_context, None).await;
    let id = started.session_id;
    output.write_all(format!("Assistant: {}\n(type 'help' for commands)\n", started.message).as_bytes()).await?;

    let mut lines = input.lines();
    loop {
        output.write_all(b"\n> ").await?;
        output.flush().await?;
        let Some(line) = lines.next_line().await? else { break };
        let line = line.trim();
        match line.to_lowercase().as_str() {
            "" => continue,
            "exit" | "quit" => break,
            "help" => output.write_all(HELP_MESSAGE.as_bytes()).await?,
            "context" => {
                let history = conversations.history(id).await?;
                output.write_all(describe_context(&history.context).as_bytes()).await?;
            }
            "clear" => {
                conversations.clear(id).await?;
                conversations.start_conversation(Some(id), use_context, None).await;
                output.write_all(b"Context cleared. Starting fresh conversation.\n").await?;
            }
            _ => {
                let reply = conversations.send_message(id, line, &[], &RequestOverrides::default()).await?;
                if !reply.actions.is_empty() {
                    output.write_all(b"\nActions taken:\n").await?;
                    for (i, action) in reply.actions.iter().enumerate() {
                        output.write_all(format!("  {}. {}\n", i + 1, action).as_bytes()).await?;
                    }
                }
                output.write_all(format!("\nAssistant: {}\n", reply.response).as_bytes()).await?;
            }
        }
    }
    output.write_all(b"\nGoodbye!\n").await?;
    output.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tools::ToolRegistry;
    use crate::agent::ResearchAssistant;
    use crate::session::SessionStore;
    use crate::settings::GlobalConfigDefaults;
    use crate::testing::{text, tool_calls, RecordingGraph, ScriptedModel};
    use tracing::Span;

    fn conversations(model: ScriptedModel) -> Arc<ConversationService> {
        let registry = ToolRegistry::with_graph_tools(Arc::new(RecordingGraph::default()), &Span::none()).unwrap();
        let assistant = ResearchAssistant::new(Arc::new(model), Arc::new(registry), &Span::none());
        Arc::new(ConversationService::new(
            Arc::new(assistant),
            Arc::new(SessionStore::new(&Span::none())),
            GlobalConfigDefaults::default(),
            &Span::none(),
        ))
    }

    #[tokio::test]
    async fn chat_prints_actions_and_context() {
        let model = ScriptedModel::new().then(tool_calls(&[("get_context_keywords", "{}")])).then(text("No keywords yet."));
        let input: &[u8] = b"what keywords do we track?\ncontext\nexit\nnever read\n";
        let mut out = Vec::new();
        run(conversations(model), false, input, &mut out).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("  1. Called get_context_keywords with args: {}"));
        assert!(out.contains("Assistant: No keywords yet."));
        assert!(out.contains("Iterations: 1"));
        assert!(out.contains("    1. get_context_keywords"));
        assert!(out.ends_with("Goodbye!\n"));
    }

    #[tokio::test]
    async fn clear_and_help_do_not_call_the_model() {
        let input: &[u8] = b"help\n\nclear\ncontext\n";
        let mut out = Vec::new();
        run(conversations(ScriptedModel::new()), false, input, &mut out).await.unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Available commands:"));
        assert!(out.contains("Context cleared."));
        assert!(out.contains("Messages: 1"));
    }
}
