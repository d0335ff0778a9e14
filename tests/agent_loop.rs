use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cloudscout::cli::run_interactive;
use cloudscout::{
    Agent, ChatRequest, LanguageModel, Message, ModelCompletion, ParameterDefinition, Role,
    ScoutError, StubModel, Tool, ToolArguments, ToolError, ToolRegistry,
};
use tokio_util::sync::CancellationToken;

struct Echo {
    msg: ParameterDefinition,
}

impl Echo {
    fn new() -> Self {
        Self {
            msg: ParameterDefinition::string("msg", "Text to echo back").required(),
        }
    }
}

#[async_trait]
impl Tool for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes its input"
    }

    fn parameters(&self) -> Vec<ParameterDefinition> {
        vec![self.msg.clone()]
    }

    async fn call(&self, arguments: &ToolArguments) -> Result<String, ToolError> {
        Ok(self.msg.string_argument(arguments)?.to_string())
    }
}

/// Records the order it is called in and never returns rows.
struct Query {
    calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Tool for Query {
    fn name(&self) -> &str {
        "query"
    }

    fn description(&self) -> &str {
        "Runs a query"
    }

    async fn call(&self, _arguments: &ToolArguments) -> Result<String, ToolError> {
        self.calls.lock().unwrap().push("query".into());
        Err(ToolError::Failed("no rows returned".into()))
    }
}

fn registry() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(Echo::new());
    tools
}

#[tokio::test]
async fn tool_result_is_sent_back_before_the_final_answer() {
    let model = StubModel::new(vec![
        r#"{"action":"call_tool","name":"echo","arguments":{"msg":"hi"}}"#.into(),
        r#"{"action":"respond","content":"The tool said hi"}"#.into(),
    ]);
    let mut agent = Agent::new(model.clone())
        .with_system_prompt("You are terse.")
        .with_tools(registry());

    let reply = agent
        .chat("say hi via the tool", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reply, "The tool said hi");

    let roles: Vec<Role> = agent.memory().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].len(), 2);
    assert_eq!(requests[1].last(), Some(&Message::tool("hi")));
    assert_eq!(requests[1][2].tool_calls[0].name, "echo");
}

#[tokio::test]
async fn tool_errors_become_tool_messages() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut tools = ToolRegistry::new();
    tools.register(Query {
        calls: calls.clone(),
    });

    let model = StubModel::new(vec![
        r#"{"action":"call_tool","name":"query","arguments":{"sql":"select 1"}}"#.into(),
        "Nothing matched.".into(),
    ]);
    let mut agent = Agent::new(model.clone()).with_tools(tools);

    let reply = agent.chat("count things", &CancellationToken::new()).await.unwrap();

    assert_eq!(reply, "Nothing matched.");
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(
        model.requests()[1].last(),
        Some(&Message::tool("Error calling tool \"query\": no rows returned"))
    );
}

#[tokio::test]
async fn multiple_calls_run_in_order() {
    let model = StubModel::new(vec![
        r#"{"action":"call_tools","calls":[
            {"name":"echo","arguments":{"msg":"first"}},
            {"name":"missing","arguments":{}},
            {"name":"echo","arguments":{"msg":"third"}}
        ]}"#
        .into(),
        r#"{"action":"respond","content":"done"}"#.into(),
    ]);
    let mut agent = Agent::new(model).with_tools(registry());

    agent.chat("go", &CancellationToken::new()).await.unwrap();

    let tool_messages: Vec<&str> = agent
        .memory()
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(
        tool_messages,
        vec![
            "first",
            "Error calling tool \"missing\": tool not found",
            "third"
        ]
    );
}

#[tokio::test]
async fn missing_required_argument_is_reported_to_the_model() {
    let model = StubModel::new(vec![
        r#"{"action":"call_tool","name":"echo","arguments":{}}"#.into(),
        r#"{"action":"respond","content":"oops"}"#.into(),
    ]);
    let mut agent = Agent::new(model).with_tools(registry());

    agent.chat("go", &CancellationToken::new()).await.unwrap();

    assert_eq!(
        agent.memory().snapshot()[2].content,
        "Error calling tool \"echo\": msg is required"
    );
}

#[tokio::test]
async fn transport_failure_keeps_the_user_message() {
    let model = StubModel::new(Vec::new());
    let mut agent = Agent::new(model).with_system_prompt("sys");

    let err = agent.chat("hello", &CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, ScoutError::Transport(_)));
    assert_eq!(
        agent.memory().snapshot(),
        &[Message::system("sys"), Message::user("hello")]
    );
}

#[tokio::test]
async fn reset_and_exit_never_reach_the_model() {
    let model = StubModel::new(Vec::new());
    let mut agent = Agent::new(model.clone())
        .with_system_prompt("sys")
        .with_tools(registry());
    let mut output = Vec::new();

    run_interactive(&mut agent, &b"\nreset\nEXIT\nnever asked\n"[..], &mut output)
        .await
        .unwrap();

    assert!(model.requests().is_empty());
    assert_eq!(agent.memory().snapshot(), &[Message::system("sys")]);
    assert_eq!(String::from_utf8(output).unwrap(), "> > > ");
}

#[tokio::test]
async fn interactive_session_prints_answers_and_survives_errors() {
    let model = StubModel::new(vec![r#"{"action":"respond","content":"42"}"#.into()]);
    let mut agent = Agent::new(model.clone()).with_system_prompt("sys");
    let mut output = Vec::new();

    run_interactive(&mut agent, &b"what is it?\nand now?\n"[..], &mut output)
        .await
        .unwrap();

    // The second question fails because the script is exhausted; the loop then
    // reaches end of input and exits cleanly.
    assert_eq!(String::from_utf8(output).unwrap(), "> 42\n> > ");
    assert_eq!(model.requests().len(), 2);
    assert_eq!(
        agent.memory().last(),
        Some(&Message::user("and now?"))
    );
}

/// Cancels the exchange from inside the model call, as Ctrl-C would mid-request.
struct CancelsMidRequest {
    cancel: CancellationToken,
}

#[async_trait]
impl LanguageModel for CancelsMidRequest {
    async fn complete_chat(&self, _request: ChatRequest<'_>) -> cloudscout::Result<ModelCompletion> {
        self.cancel.cancel();
        std::future::pending().await
    }
}

#[tokio::test]
async fn cancellation_leaves_no_partial_assistant_message() {
    let cancel = CancellationToken::new();
    let model = Arc::new(CancelsMidRequest {
        cancel: cancel.clone(),
    });
    let mut agent = Agent::new(model).with_system_prompt("sys");

    let err = agent.chat("slow question", &cancel).await.unwrap_err();

    assert!(matches!(err, ScoutError::Cancelled));
    assert_eq!(
        agent.memory().snapshot(),
        &[Message::system("sys"), Message::user("slow question")]
    );
}

/// Cancels the exchange while it runs, as Ctrl-C would mid-tool.
struct CancelsMidTool {
    cancel: CancellationToken,
}

#[async_trait]
impl Tool for CancelsMidTool {
    fn name(&self) -> &str {
        "slow_scan"
    }

    fn description(&self) -> &str {
        "Scans for a long time"
    }

    async fn call(&self, _arguments: &ToolArguments) -> Result<String, ToolError> {
        self.cancel.cancel();
        std::future::pending().await
    }
}

#[tokio::test]
async fn cancellation_during_a_tool_records_no_tool_message() {
    let cancel = CancellationToken::new();
    let mut tools = ToolRegistry::new();
    tools.register(CancelsMidTool {
        cancel: cancel.clone(),
    });
    let model = StubModel::new(vec![
        r#"{"action":"call_tool","name":"slow_scan","arguments":{}}"#.into(),
    ]);
    let mut agent = Agent::new(model.clone()).with_tools(tools);

    let err = agent.chat("scan everything", &cancel).await.unwrap_err();

    assert!(matches!(err, ScoutError::Cancelled));
    assert_eq!(model.requests().len(), 1);
    assert!(agent.memory().iter().all(|m| m.role != Role::Tool));
    let last = agent.memory().last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.tool_calls[0].name, "slow_scan");
}
