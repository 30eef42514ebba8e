pub mod context;
pub mod engine;
pub mod messages;
pub mod prompts;
pub mod tools;

pub use engine::{ResearchAssistant, TurnOutcome, TurnResult};
pub use messages::AgentContext;
