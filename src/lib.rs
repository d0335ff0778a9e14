//! An LLM agent that answers questions about cloud infrastructure.
//!
//! The crate provides:
//! - A language model abstraction (`LanguageModel`) with an Ollama client.
//! - A tool interface (`Tool` and `ToolRegistry`) whose definitions are translated into
//!   the function-calling schema chat models expect.
//! - An `Agent` that loops between the model and the tools until the model answers,
//!   within a step and time budget.
//! - Toolkits for AWS Cloud Control, Steampipe and DNS, plus the shared CLI used by the
//!   binaries.

mod agent;
mod error;
mod llm;
mod memory;
mod message;
mod schema;
mod tool;

pub mod cli;
pub mod config;
pub mod prompts;
pub mod telemetry;
pub mod tools;

pub use agent::{tool_failure_message, Agent, DEFAULT_MAX_STEPS};
pub use config::{AgentConfig, AppConfig, ModelConfig, SteampipeConfig};
pub use error::{Result, ScoutError, ToolError};
pub use llm::{ChatRequest, LanguageModel, ModelCompletion, OllamaClient, StubModel};
pub use memory::ConversationMemory;
pub use message::{Message, Role, ToolArguments, ToolCall};
pub use schema::{translate, FunctionSchema, ParametersSchema, PropertySchema, ToolSchema};
pub use tool::{ParameterDefinition, ParameterType, Tool, ToolRegistry};
