use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{AgentConfig, DEFAULT_MODEL};
use crate::error::{Result, ScoutError};
use crate::llm::{ChatRequest, LanguageModel};
use crate::memory::ConversationMemory;
use crate::message::{Role, ToolCall};
use crate::tool::ToolRegistry;

pub const DEFAULT_MAX_STEPS: usize = 16;

/// Where one exchange currently is.
#[derive(Debug)]
enum LoopState {
    AwaitingCompletion,
    ExecutingTools(Vec<ToolCall>),
    Done(String),
}

/// Runs a dialogue between a language model and a set of tools.
///
/// Each call to [`Agent::chat`] loops between the model and the tools it asks for
/// until the model replies without requesting any, or a budget runs out.
pub struct Agent<M: LanguageModel> {
    model: Arc<M>,
    model_name: String,
    system_prompt: String,
    tools: Arc<ToolRegistry>,
    memory: ConversationMemory,
    max_steps: usize,
    time_budget: Option<Duration>,
}

impl<M: LanguageModel> Agent<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self {
            model,
            model_name: DEFAULT_MODEL.to_string(),
            system_prompt: String::new(),
            tools: Arc::new(ToolRegistry::new()),
            memory: ConversationMemory::default(),
            max_steps: DEFAULT_MAX_STEPS,
            time_budget: None,
        }
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Sets the system prompt and starts the conversation over with it.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self.memory.reset(&self.system_prompt);
        self
    }

    pub fn with_tools(mut self, tools: impl Into<Arc<ToolRegistry>>) -> Self {
        self.tools = tools.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.time_budget = budget;
        self
    }

    pub fn with_config(self, cfg: &AgentConfig) -> Self {
        self.with_max_steps(cfg.max_steps)
            .with_time_budget(cfg.time_budget_secs.map(Duration::from_secs))
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Builds the tool schemas up front so a malformed tool fails at startup.
    pub fn validate_tools(&self) -> Result<()> {
        self.tools.schemas().map(|_| ())
    }

    /// Returns the conversation to how it was right after construction.
    pub fn reset(&mut self) {
        self.memory.reset(&self.system_prompt);
    }

    /// Runs one exchange and returns the model's final answer.
    ///
    /// The prompt is recorded before anything else, so it stays in the conversation
    /// when the exchange fails and a retry does not need to resend it.
    pub async fn chat(
        &mut self,
        prompt: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.memory.append(Role::User, prompt)?;

        // A budget too large to represent as an instant never expires.
        let deadline = self
            .time_budget
            .and_then(|budget| Instant::now().checked_add(budget));
        let mut steps = 0;
        let mut state = LoopState::AwaitingCompletion;
        loop {
            state = match state {
                LoopState::AwaitingCompletion => {
                    steps += 1;

                    let message = self.request_completion(steps, cancel, deadline).await?.into_message();
                    if message.has_tool_calls() {
                        if steps >= self.max_steps {
                            // The results could never be shown to the model, so the
                            // batch is neither run nor recorded.
                            warn!(steps, "model kept requesting tools past the step limit");
                            return Err(ScoutError::StepLimitExceeded { steps });
                        }
                        debug!(calls = message.tool_calls.len(), "model requested tool calls");
                        let calls = message.tool_calls.clone();
                        self.memory.append_raw(message)?;
                        LoopState::ExecutingTools(calls)
                    } else {
                        debug!("model returned no tool calls, exchange complete");
                        let content = message.content.clone();
                        self.memory.append_raw(message)?;
                        LoopState::Done(content)
                    }
                }
                LoopState::ExecutingTools(calls) => {
                    for (index, call) in calls.iter().enumerate() {
                        let content = self.run_tool(index, call, cancel, deadline).await?;
                        self.memory.append(Role::Tool, content)?;
                    }
                    LoopState::AwaitingCompletion
                }
                LoopState::Done(content) => return Ok(content),
            };
        }
    }

    async fn request_completion(
        &self,
        step: usize,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<crate::llm::ModelCompletion> {
        let request = ChatRequest {
            model: &self.model_name,
            messages: self.memory.snapshot(),
            tools: self.tools.schemas()?,
        };
        debug!(step, messages = request.messages.len(), "requesting completion");

        self.guard(self.model.complete_chat(request), cancel, deadline)
            .await
    }

    /// Invokes one requested tool. Tool failures become the message content so the
    /// model can correct itself; only cancellation and the deadline are returned.
    async fn run_tool(
        &self,
        index: usize,
        call: &ToolCall,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<String> {
        debug!(tool = %call.name, tool_call_index = index, arguments = ?call.arguments, "invoking tool");

        let outcome = self
            .guard(self.tools.invoke(&call.name, &call.arguments), cancel, deadline)
            .await;
        match outcome {
            Ok(output) => {
                debug!(tool = %call.name, call_result = %output, "tool call complete");
                Ok(output)
            }
            Err(err @ (ScoutError::Cancelled | ScoutError::DeadlineExceeded(_))) => Err(err),
            Err(err) => {
                warn!(tool = %call.name, error = %err, "tool call failed");
                Ok(tool_failure_message(&call.name, &err))
            }
        }
    }

    /// Races `operation` against cancellation and the exchange deadline.
    async fn guard<T>(
        &self,
        operation: impl Future<Output = Result<T>>,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<T> {
        let expired = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ScoutError::Cancelled),
            _ = expired => Err(ScoutError::DeadlineExceeded(self.time_budget.unwrap_or_default())),
            result = operation => result,
        }
    }
}

/// The tool message recorded when a call fails.
pub fn tool_failure_message(name: &str, err: &ScoutError) -> String {
    let detail = match err {
        ScoutError::ToolNotFound(_) => "tool not found".to_string(),
        ScoutError::ToolExecution { source, .. } => source.to_string(),
        other => other.to_string(),
    };
    format!("Error calling tool \"{name}\": {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::error::ToolError;
    use crate::llm::ModelCompletion;
    use crate::message::{Message, ToolArguments};
    use crate::tool::Tool;
    use crate::StubModel;

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Never finishes"
        }

        async fn call(&self, _arguments: &ToolArguments) -> std::result::Result<String, ToolError> {
            std::future::pending().await
        }
    }

    struct Counting {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for Counting {
        fn name(&self) -> &str {
            "count"
        }

        fn description(&self) -> &str {
            "Counts its invocations"
        }

        async fn call(&self, _arguments: &ToolArguments) -> std::result::Result<String, ToolError> {
            let runs = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(runs.to_string())
        }
    }

    struct Hanging;

    #[async_trait]
    impl LanguageModel for Hanging {
        async fn complete_chat(&self, _request: ChatRequest<'_>) -> Result<ModelCompletion> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn returns_llm_response_without_tools() {
        let model = StubModel::new(vec![r#"{"action":"respond","content":"Hello!"}"#.into()]);
        let mut agent = Agent::new(model).with_system_prompt("be nice");

        let reply = agent.chat("hi", &CancellationToken::new()).await.unwrap();

        assert_eq!(reply, "Hello!");
        assert_eq!(
            agent.memory().snapshot(),
            &[
                Message::system("be nice"),
                Message::user("hi"),
                Message::assistant("Hello!")
            ]
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_fed_back_to_the_model() {
        let model = StubModel::new(vec![
            r#"{"action":"call_tool","name":"nope","arguments":{}}"#.into(),
            r#"{"action":"respond","content":"sorry"}"#.into(),
        ]);
        let mut agent = Agent::new(model);

        let reply = agent.chat("go", &CancellationToken::new()).await.unwrap();

        assert_eq!(reply, "sorry");
        let tool_message = &agent.memory().snapshot()[2];
        assert_eq!(tool_message.role, Role::Tool);
        assert_eq!(tool_message.content, "Error calling tool \"nope\": tool not found");
    }

    #[tokio::test]
    async fn stops_at_the_step_limit() {
        let call = r#"{"action":"call_tool","name":"nope","arguments":{}}"#.to_string();
        let model = StubModel::new(vec![call.clone(), call.clone(), call]);
        let mut agent = Agent::new(model.clone()).with_max_steps(2);

        let err = agent.chat("loop forever", &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, ScoutError::StepLimitExceeded { steps: 2 }));
        assert_eq!(model.requests().len(), 2);
        let last = agent.memory().last().unwrap();
        assert_eq!(last.role, Role::Tool);
    }

    #[tokio::test]
    async fn last_step_tool_calls_are_not_run() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut tools = ToolRegistry::new();
        tools.register(Counting { runs: runs.clone() });
        let call = r#"{"action":"call_tool","name":"count","arguments":{}}"#.to_string();
        let model = StubModel::new(vec![call.clone(), call]);
        let mut agent = Agent::new(model).with_tools(tools).with_max_steps(2);

        let err = agent.chat("count", &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, ScoutError::StepLimitExceeded { steps: 2 }));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let tool_messages = agent.memory().iter().filter(|m| m.role == Role::Tool).count();
        assert_eq!(tool_messages, 1);
        assert_eq!(agent.memory().last().map(|m| m.role), Some(Role::Tool));
    }

    #[tokio::test]
    async fn huge_time_budget_means_no_deadline() {
        let model = StubModel::new(vec![r#"{"action":"respond","content":"still here"}"#.into()]);
        let cfg = AgentConfig {
            time_budget_secs: Some(u64::MAX),
            ..AgentConfig::default()
        };
        let mut agent = Agent::new(model).with_config(&cfg);

        let reply = agent.chat("hi", &CancellationToken::new()).await.unwrap();

        assert_eq!(reply, "still here");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_a_hanging_model() {
        let mut agent = Agent::new(Arc::new(Hanging)).with_time_budget(Some(Duration::from_secs(5)));

        let err = agent.chat("hello?", &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, ScoutError::DeadlineExceeded(budget) if budget == Duration::from_secs(5)));
        assert_eq!(agent.memory().snapshot(), &[Message::user("hello?")]);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_a_hanging_tool() {
        let model = StubModel::new(vec![r#"{"action":"call_tool","name":"slow","arguments":{}}"#.into()]);
        let mut tools = ToolRegistry::new();
        tools.register(Slow);
        let mut agent = Agent::new(model)
            .with_tools(tools)
            .with_time_budget(Some(Duration::from_secs(1)));

        let err = agent.chat("wait", &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, ScoutError::DeadlineExceeded(_)));
        let last = agent.memory().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.has_tool_calls());
    }

    #[test]
    fn failure_message_uses_the_tool_error_text() {
        let err = ScoutError::ToolExecution {
            name: "query".into(),
            source: ToolError::Failed("no rows returned".into()),
        };
        assert_eq!(
            tool_failure_message("query", &err),
            "Error calling tool \"query\": no rows returned"
        );
    }
}
