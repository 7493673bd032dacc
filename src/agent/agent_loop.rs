//! The step-bounded orchestration loop.
//!
//! Each step gates on the shared rate limiter, streams one model turn, feeds
//! tool-call fragments to the accumulator, then dispatches the finalized
//! invocations in index order. Everything the caller sees is a [`StreamEvent`].

use std::path::PathBuf;
use std::sync::Arc;

use futures::{Stream, StreamExt};

use super::events::StreamEvent;
use super::tool::{self, CodeRunner, RUN_CODE_TOOL};
use crate::artifact::ArtifactCollector;
use crate::config::Config;
use crate::dataset::Dataset;
use crate::error::{DataChatError, Result};
use crate::id::generate_conversation_id;
use crate::llm::{ChatRequest, LlmClient, Message, Role, ToolCallAccumulator, ToolInvocation};
use crate::ratelimit::RateLimiter;
use crate::sandbox::{
    Binding, Bindings, CodeValidator, ExecutionResult, SandboxExecutor, SandboxPolicy,
};

pub const MAX_STEPS_MESSAGE: &str = "Max steps reached without final answer.";

/// Name the dataset is bound under inside the sandbox.
pub const DATASET_BINDING: &str = "df";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Requesting,
    Streaming,
    Dispatching,
    Done,
    Failed,
}

/// Collaborators an agent loop needs.
#[derive(Clone)]
pub struct AgentDeps {
    pub client: Arc<dyn LlmClient>,
    pub limiter: Arc<RateLimiter>,
    pub executor: SandboxExecutor,
    pub collector: ArtifactCollector,
}

/// One conversation's orchestrator. Owns its message history exclusively.
pub struct AgentLoop {
    model: String,
    max_steps: u32,
    scope_id: String,
    client: Arc<dyn LlmClient>,
    limiter: Arc<RateLimiter>,
    collector: ArtifactCollector,
    runner: CodeRunner,
    bindings: Bindings,
    messages: Vec<Message>,
    state: LoopState,
}

impl AgentLoop {
    pub fn new(config: &Config, deps: AgentDeps) -> Self {
        let validator = CodeValidator::new(SandboxPolicy::from_config(&config.sandbox));
        Self {
            model: config.llm.model.clone(),
            max_steps: config.agent.max_steps,
            scope_id: generate_conversation_id(),
            client: deps.client,
            limiter: deps.limiter,
            collector: deps.collector,
            runner: CodeRunner::new(validator, deps.executor),
            bindings: Vec::new(),
            messages: Vec::new(),
            state: LoopState::Idle,
        }
    }

    /// Namespace stored artifacts under `scope_id` instead of a generated id.
    pub fn with_scope(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = scope_id.into();
        self
    }

    /// Bind `dataset` as `df` and open the history with a system prompt naming its columns.
    pub fn with_dataset(mut self, dataset: Arc<Dataset>) -> Self {
        let prompt = super::prompts::format_system_prompt(dataset.columns());
        self.messages.insert(0, Message::system(prompt));
        self.bind(DATASET_BINDING, Binding::Frame(dataset));
        self
    }

    /// Make `binding` available to every execution under `name`.
    pub fn bind(&mut self, name: impl Into<String>, binding: Binding) {
        let name = name.into();
        self.bindings.retain(|(n, _)| *n != name);
        self.bindings.push((name, binding));
    }

    /// Append a system, user or assistant message. Tool results carry a call
    /// id and go through [`AgentLoop::add_tool_result`].
    pub fn add_message(&mut self, role: Role, content: impl Into<String>) -> Result<()> {
        let content = content.into();
        let message = match role {
            Role::System => Message::system(content),
            Role::User => Message::user(content),
            Role::Assistant => Message::assistant(Some(content), Vec::new()),
            Role::Tool => {
                return Err(DataChatError::InvalidMessage(
                    "tool messages need a call id, use add_tool_result".to_string(),
                ));
            }
        };
        self.messages.push(message);
        Ok(())
    }

    /// Append the output of tool call `call_id`.
    pub fn add_tool_result(&mut self, call_id: impl Into<String>, content: impl Into<String>) {
        self.messages.push(Message::tool(call_id, RUN_CODE_TOOL, content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    /// Drive the loop. The stream ends when the run is `Done` or `Failed`.
    pub fn run(&mut self) -> impl Stream<Item = StreamEvent> + Send + '_ {
        let this = self;
        async_stream::stream! {
            this.state = LoopState::Idle;
            let mut steps: u32 = 0;

            loop {
                if steps >= this.max_steps {
                    tracing::info!(steps, "Step bound reached");
                    this.state = LoopState::Done;
                    yield StreamEvent::Status(MAX_STEPS_MESSAGE.to_string());
                    return;
                }

                this.state = LoopState::Requesting;
                if let Err(e) = this.limiter.acquire() {
                    log::warn!("Rate limit exceeded");
                    this.state = LoopState::Failed;
                    yield StreamEvent::Error(e.to_string());
                    return;
                }

                tracing::info!(step = steps + 1, messages = this.messages.len(), "Calling model");
                let request = ChatRequest::new(
                    this.model.clone(),
                    this.messages.clone(),
                    vec![tool::definition()],
                );
                let mut chunks = match this.client.stream_chat(request).await {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        log::error!("Model request failed: {}", e);
                        this.state = LoopState::Failed;
                        yield StreamEvent::Error(format!("Error calling LLM: {}", e));
                        return;
                    }
                };

                this.state = LoopState::Streaming;
                let mut content = String::new();
                let mut accumulator = ToolCallAccumulator::new();
                let mut broken = None;
                while let Some(item) = chunks.next().await {
                    match item {
                        Ok(chunk) => {
                            if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                                content.push_str(&text);
                                yield StreamEvent::Delta(text);
                            }
                            for fragment in chunk.tool_calls {
                                accumulator.ingest(fragment);
                            }
                        }
                        Err(e) => {
                            broken = Some(e);
                            break;
                        }
                    }
                }
                if let Some(e) = broken {
                    log::error!("Model stream failed: {}", e);
                    this.state = LoopState::Failed;
                    yield StreamEvent::Error(format!("Error calling LLM: {}", e));
                    return;
                }
                steps += 1;

                let invocations = accumulator.snapshot();
                let text = (!content.is_empty()).then_some(content);
                if text.is_some() || !invocations.is_empty() {
                    this.messages.push(Message::assistant(text.clone(), invocations.clone()));
                }

                if invocations.is_empty() {
                    if text.is_some() {
                        this.state = LoopState::Done;
                        return;
                    }
                    log::debug!("Model produced an empty turn");
                    continue;
                }

                this.state = LoopState::Dispatching;
                for invocation in invocations {
                    for event in this.dispatch(&invocation).await {
                        yield event;
                    }
                }
            }
        }
    }

    /// Run one invocation and fold its result into history.
    async fn dispatch(&mut self, invocation: &ToolInvocation) -> Vec<StreamEvent> {
        log::info!(
            "Tool call {}: {} args={}",
            invocation.id,
            invocation.name(),
            invocation.arguments()
        );

        if invocation.name() != RUN_CODE_TOOL {
            let message = format!("Error: unknown tool '{}'", invocation.name());
            return vec![self.tool_error(invocation, message)];
        }
        let code = match tool::parse_arguments(invocation.arguments()) {
            Ok(code) => code,
            Err(message) => return vec![self.tool_error(invocation, message)],
        };

        let mut events = vec![StreamEvent::ToolCode(code.clone())];

        let runner = self.runner.clone();
        let bindings = self.bindings.clone();
        let joined = tokio::task::spawn_blocking(move || runner.run(&code, &bindings)).await;
        let output = match joined {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                events.push(self.tool_error(invocation, e.to_string()));
                return events;
            }
            Err(e) => {
                events.push(self.tool_error(invocation, format!("Sandbox task failed: {}", e)));
                return events;
            }
        };

        let mut result = output.result;
        if let Some(error) = result.error.clone() {
            log::debug!("Tool {} failed: {}", invocation.id, error);
            self.push_tool_result(invocation, &result);
            events.push(StreamEvent::ToolOutput(error));
            return events;
        }

        let collected = self.collector.persist(&result.artifact_paths, &self.scope_id).await;
        drop(output.scratch);

        let file_names = collected.file_names();
        result.stdout = collected.augment_stdout(&result.stdout);
        result.artifact_paths = file_names.iter().map(PathBuf::from).collect();
        self.push_tool_result(invocation, &result);

        events.extend(collected.rendered().map(|a| StreamEvent::Artifact(a.render())));
        let mut output_text = result.stdout;
        if !file_names.is_empty() {
            if !output_text.is_empty() && !output_text.ends_with('\n') {
                output_text.push('\n');
            }
            output_text.push_str(&format!("Generated files: {}", file_names.join(", ")));
        }
        events.push(StreamEvent::ToolOutput(output_text));
        events
    }

    fn push_tool_result(&mut self, invocation: &ToolInvocation, result: &ExecutionResult) {
        let content = serde_json::to_string(result)
            .unwrap_or_else(|e| format!("Error serializing result: {}", e));
        self.messages
            .push(Message::tool(invocation.id.clone(), invocation.name(), content));
    }

    fn tool_error(&mut self, invocation: &ToolInvocation, message: String) -> StreamEvent {
        log::warn!("Tool {} error: {}", invocation.id, message);
        self.messages
            .push(Message::tool(invocation.id.clone(), invocation.name(), message.clone()));
        StreamEvent::ToolOutput(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, ModelChunk, ScriptedTurn, ToolCallFragment};
    use crate::storage::MemoryStore;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        _scratch: TempDir,
        client: Arc<MockLlmClient>,
        store: Arc<MemoryStore>,
        agent: AgentLoop,
    }

    fn harness(turns: Vec<ScriptedTurn>, max_steps: u32, capacity: u32) -> Harness {
        let scratch = tempfile::tempdir().unwrap();
        let client = Arc::new(MockLlmClient::new(turns));
        let store = Arc::new(MemoryStore::new());
        let mut config = Config::default();
        config.agent.max_steps = max_steps;
        let deps = AgentDeps {
            client: client.clone(),
            limiter: Arc::new(RateLimiter::new(capacity, Duration::from_secs(60))),
            executor: SandboxExecutor::new(scratch.path(), 1_000_000),
            collector: ArtifactCollector::new(store.clone(), "/api/artifacts", 2000),
        };
        let mut agent = AgentLoop::new(&config, deps).with_scope("conv-test");
        agent.add_message(Role::User, "question").unwrap();
        Harness {
            _scratch: scratch,
            client,
            store,
            agent,
        }
    }

    fn tool_turn(id: &str, code: &str) -> ScriptedTurn {
        let args = serde_json::json!({ "code": code }).to_string();
        let (a, b) = args.split_at(args.len() / 2);
        ScriptedTurn::Chunks(vec![
            ModelChunk::fragments(vec![ToolCallFragment::start(0, id, RUN_CODE_TOOL)]),
            ModelChunk::fragments(vec![ToolCallFragment::piece(0, a)]),
            ModelChunk::fragments(vec![ToolCallFragment::piece(0, b)]),
        ])
    }

    async fn collect(agent: &mut AgentLoop) -> Vec<StreamEvent> {
        agent.run().collect().await
    }

    #[test]
    fn test_tool_messages_require_call_id() {
        let mut h = harness(Vec::new(), 3, 10);
        let err = h.agent.add_message(Role::Tool, "42").unwrap_err();
        assert!(matches!(err, DataChatError::InvalidMessage(_)));

        h.agent.add_tool_result("call_7", "42");
        let last = h.agent.messages().last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("call_7"));
        assert_eq!(last.name.as_deref(), Some(RUN_CODE_TOOL));
    }

    #[tokio::test]
    async fn test_content_only_turn_is_done() {
        let mut h = harness(
            vec![ScriptedTurn::Chunks(vec![
                ModelChunk::text("The answer "),
                ModelChunk::text("is 4."),
            ])],
            6,
            10,
        );
        let events = collect(&mut h.agent).await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Delta("The answer ".to_string()),
                StreamEvent::Delta("is 4.".to_string())
            ]
        );
        assert_eq!(h.agent.state(), LoopState::Done);
        let last = h.agent.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content.as_deref(), Some("The answer is 4."));
        assert_eq!(h.client.request_count(), 1);
    }

    #[tokio::test]
    async fn test_tool_turn_then_answer() {
        let mut h = harness(
            vec![
                tool_turn("call_1", "a = 1 + 1\nprint(a)"),
                ScriptedTurn::Chunks(vec![ModelChunk::text("It is 2.")]),
            ],
            6,
            10,
        );
        let events = collect(&mut h.agent).await;

        assert_eq!(
            events,
            vec![
                StreamEvent::ToolCode("a = 1 + 1\nprint(a)".to_string()),
                StreamEvent::ToolOutput("2\n".to_string()),
                StreamEvent::Delta("It is 2.".to_string()),
            ]
        );
        let tool_message = &h.agent.messages()[2];
        assert_eq!(tool_message.role, Role::Tool);
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
        let result: ExecutionResult =
            serde_json::from_str(tool_message.content.as_deref().unwrap()).unwrap();
        assert_eq!(result.bindings.get("a").map(String::as_str), Some("2"));

        // Second request carried the tool result back to the model.
        let second = &h.client.requests()[1];
        assert_eq!(second.messages.len(), 3);
        assert_eq!(
            second.messages[1].tool_calls.as_ref().unwrap()[0].arguments(),
            r#"{"code":"a = 1 + 1\nprint(a)"}"#
        );
    }

    #[tokio::test]
    async fn test_content_and_tool_calls_share_one_message() {
        let mut chunks = vec![ModelChunk::text("Let me check.")];
        if let ScriptedTurn::Chunks(rest) = tool_turn("call_1", "print(3)") {
            chunks.extend(rest);
        }
        let mut h = harness(
            vec![ScriptedTurn::Chunks(chunks), ScriptedTurn::Chunks(vec![ModelChunk::text("3")])],
            6,
            10,
        );
        collect(&mut h.agent).await;

        let assistants: Vec<&Message> = h
            .agent
            .messages()
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .collect();
        assert_eq!(assistants.len(), 2);
        assert_eq!(assistants[0].content.as_deref(), Some("Let me check."));
        assert_eq!(assistants[0].tool_calls.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_step_bound_stops_after_one_cycle() {
        let mut h = harness(vec![tool_turn("loop", "print('again')")], 1, 10);
        let events = collect(&mut h.agent).await;

        assert!(matches!(events[0], StreamEvent::ToolCode(_)));
        assert!(matches!(events[1], StreamEvent::ToolOutput(_)));
        assert_eq!(events.last(), Some(&StreamEvent::Status(MAX_STEPS_MESSAGE.to_string())));
        assert_eq!(events.len(), 3);
        assert_eq!(h.client.request_count(), 1);
        assert_eq!(h.agent.state(), LoopState::Done);
    }

    #[tokio::test]
    async fn test_rate_limit_rejection_fails_run() {
        let mut h = harness(vec![tool_turn("c1", "x = 1"), tool_turn("c2", "y = 2")], 6, 1);
        let events = collect(&mut h.agent).await;

        assert_eq!(
            events.last(),
            Some(&StreamEvent::Error("Rate limit exceeded. Please try again later.".to_string()))
        );
        assert_eq!(h.client.request_count(), 1);
        assert_eq!(h.agent.state(), LoopState::Failed);
    }

    #[tokio::test]
    async fn test_request_failure_fails_run() {
        let mut h = harness(vec![ScriptedTurn::Fail("upstream down".to_string())], 6, 10);
        let events = collect(&mut h.agent).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Error(msg) if msg.contains("upstream down")));
        assert_eq!(h.agent.state(), LoopState::Failed);
    }

    #[tokio::test]
    async fn test_broken_stream_fails_run() {
        let mut h = harness(
            vec![ScriptedTurn::BrokenStream(vec![ModelChunk::text("par")], "reset".to_string())],
            6,
            10,
        );
        let events = collect(&mut h.agent).await;

        assert_eq!(events[0], StreamEvent::Delta("par".to_string()));
        assert!(matches!(&events[1], StreamEvent::Error(msg) if msg.contains("reset")));
        assert_eq!(h.agent.state(), LoopState::Failed);
    }

    #[tokio::test]
    async fn test_empty_turn_is_silent_noop() {
        let mut h = harness(
            vec![
                ScriptedTurn::Chunks(Vec::new()),
                ScriptedTurn::Chunks(vec![ModelChunk::text("done")]),
            ],
            6,
            10,
        );
        let events = collect(&mut h.agent).await;

        assert_eq!(events, vec![StreamEvent::Delta("done".to_string())]);
        assert_eq!(h.client.request_count(), 2);
        assert_eq!(h.agent.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_code_is_tool_error() {
        let mut h = harness(
            vec![
                tool_turn("c1", "import os\nprint(os.getcwd())"),
                ScriptedTurn::Chunks(vec![ModelChunk::text("Cannot do that.")]),
            ],
            6,
            10,
        );
        let events = collect(&mut h.agent).await;

        assert!(matches!(
            &events[1],
            StreamEvent::ToolOutput(msg) if msg.contains("Import of 'os' is not allowed")
        ));
        assert_eq!(h.agent.state(), LoopState::Done);
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_tool_error() {
        let turn = ScriptedTurn::Chunks(vec![ModelChunk::fragments(vec![
            ToolCallFragment::start(0, "c1", RUN_CODE_TOOL),
            ToolCallFragment::piece(0, "{\"code\": "),
        ])]);
        let mut h = harness(vec![turn, ScriptedTurn::Chunks(vec![ModelChunk::text("ok")])], 6, 10);
        let events = collect(&mut h.agent).await;

        assert!(matches!(
            &events[0],
            StreamEvent::ToolOutput(msg) if msg.starts_with("Invalid arguments")
        ));
        assert_eq!(events[1], StreamEvent::Delta("ok".to_string()));
        let tool_message = h.agent.messages().iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_tool_error() {
        let turn = ScriptedTurn::Chunks(vec![ModelChunk::fragments(vec![
            ToolCallFragment::start(0, "c1", "delete_everything"),
            ToolCallFragment::piece(0, "{}"),
        ])]);
        let mut h = harness(vec![turn, ScriptedTurn::Chunks(vec![ModelChunk::text("ok")])], 6, 10);
        let events = collect(&mut h.agent).await;

        assert_eq!(
            events[0],
            StreamEvent::ToolOutput("Error: unknown tool 'delete_everything'".to_string())
        );
    }

    #[tokio::test]
    async fn test_invocations_dispatch_in_index_order() {
        let turn = ScriptedTurn::Chunks(vec![
            ModelChunk::fragments(vec![
                ToolCallFragment::start(1, "second", RUN_CODE_TOOL),
                ToolCallFragment::start(0, "first", RUN_CODE_TOOL),
            ]),
            ModelChunk::fragments(vec![
                ToolCallFragment::piece(1, r#"{"code": "print(x + 1)"}"#),
                ToolCallFragment::piece(0, r#"{"code": "x = 41"}"#),
            ]),
        ]);
        let mut h = harness(vec![turn, ScriptedTurn::Chunks(vec![ModelChunk::text("42")])], 6, 10);
        let events = collect(&mut h.agent).await;

        assert_eq!(events[0], StreamEvent::ToolCode("x = 41".to_string()));
        assert_eq!(events[2], StreamEvent::ToolCode("print(x + 1)".to_string()));
        // Each execution starts from a fresh namespace.
        assert!(matches!(&events[3], StreamEvent::ToolOutput(msg) if msg.contains("NameError")));
    }

    #[tokio::test]
    async fn test_dataset_binding_and_prompt() {
        let dataset = Arc::new(Dataset::from_csv_reader("a,b\n1,2\n3,4\n".as_bytes()).unwrap());
        let mut h = harness(
            vec![
                tool_turn("c1", "print(df['a'].sum())"),
                ScriptedTurn::Chunks(vec![ModelChunk::text("4")]),
            ],
            6,
            10,
        );
        h.agent = h.agent.with_dataset(dataset);
        let events = collect(&mut h.agent).await;

        assert_eq!(events[1], StreamEvent::ToolOutput("4\n".to_string()));
        let first = &h.client.requests()[0].messages[0];
        assert_eq!(first.role, Role::System);
        assert!(first.content.as_deref().unwrap().contains("Column names: a, b"));
    }

    #[tokio::test]
    async fn test_json_report_summary_in_output() {
        let code = "import pandas as pd\n\
                    from ydata_profiling import ProfileReport\n\
                    d = pd.DataFrame({'x': [1, 1, 1]})\n\
                    ProfileReport(d).to_file(output_dir + '/report.json')\n\
                    print('Computed stuff.')";
        let mut h = harness(
            vec![tool_turn("c1", code), ScriptedTurn::Chunks(vec![ModelChunk::text("done")])],
            6,
            10,
        );
        let events = collect(&mut h.agent).await;

        assert!(!events.iter().any(|e| matches!(e, StreamEvent::Artifact(_))));
        let output = events
            .iter()
            .find_map(|e| match e {
                StreamEvent::ToolOutput(s) => Some(s.clone()),
                _ => None,
            })
            .unwrap();
        assert!(output.starts_with("Computed stuff.\n"));
        assert!(output.contains("[report.json] Report summary"));
        assert!(output.ends_with("Generated files: report.json"));
        assert_eq!(h.store.len(), 1);
    }
}
