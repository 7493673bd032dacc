//! Agent loop integration tests
//!
//! Drives a full conversation with a scripted model client, a real sandbox
//! scratch root and a filesystem object store.

use std::sync::Arc;
use std::time::Duration;

use datachat::agent::{AgentDeps, AgentLoop, LoopState, RUN_CODE_TOOL, StreamEvent};
use datachat::artifact::ArtifactCollector;
use datachat::config::Config;
use datachat::dataset::Dataset;
use datachat::llm::{MockLlmClient, ModelChunk, Role, ScriptedTurn, ToolCallFragment};
use datachat::ratelimit::RateLimiter;
use datachat::sandbox::{ExecutionResult, SandboxExecutor};
use datachat::storage::{FsStore, MemoryStore, ObjectStore};
use futures::StreamExt;
use tempfile::TempDir;

const SALES_CSV: &str = "region,units,price\nnorth,10,2.5\nsouth,4,3.0\nnorth,6,2.5\neast,3,\n";

fn code_turn(id: &str, code: &str) -> ScriptedTurn {
    let args = serde_json::json!({ "code": code }).to_string();
    let pieces: Vec<ToolCallFragment> = args
        .as_bytes()
        .chunks(7)
        .map(|c| ToolCallFragment::piece(0, String::from_utf8_lossy(c).to_string()))
        .collect();
    let start = ToolCallFragment::start(0, id, RUN_CODE_TOOL);
    let mut chunks = vec![ModelChunk::fragments(vec![start])];
    chunks.extend(pieces.into_iter().map(|p| ModelChunk::fragments(vec![p])));
    ScriptedTurn::Chunks(chunks)
}

fn answer(text: &str) -> ScriptedTurn {
    ScriptedTurn::Chunks(vec![ModelChunk::text(text)])
}

struct Setup {
    scratch: TempDir,
    storage: TempDir,
    client: Arc<MockLlmClient>,
    deps: AgentDeps,
}

fn setup(turns: Vec<ScriptedTurn>, limiter: Arc<RateLimiter>) -> Setup {
    let scratch = TempDir::new().unwrap();
    let storage = TempDir::new().unwrap();
    let client = Arc::new(MockLlmClient::new(turns));
    let store: Arc<dyn ObjectStore> = Arc::new(FsStore::new(storage.path()).unwrap());
    let deps = AgentDeps {
        client: client.clone(),
        limiter,
        executor: SandboxExecutor::new(scratch.path(), 5_000_000),
        collector: ArtifactCollector::new(store, "/api/artifacts", 2000),
    };
    Setup {
        scratch,
        storage,
        client,
        deps,
    }
}

fn sales() -> Arc<Dataset> {
    Arc::new(Dataset::from_csv_reader(SALES_CSV.as_bytes()).unwrap())
}

/// Integration test: a plotted answer is stored and referenced, scratch is drained
#[tokio::test]
async fn test_plot_is_persisted_and_rendered() {
    let code = "import matplotlib.pyplot as plt\n\
                print(df[df['region'] == 'north']['units'].sum())\n\
                plt.plot([1, 2, 3], [4, 5, 6])\n\
                plt.title('Units')\n\
                plt.savefig(output_dir + '/units.png')\n";
    let s = setup(
        vec![code_turn("call_plot", code), answer("North sold 16 units.")],
        Arc::new(RateLimiter::new(10, Duration::from_secs(60))),
    );
    let mut agent = AgentLoop::new(&Config::default(), s.deps.clone())
        .with_scope("conv-int")
        .with_dataset(sales());
    agent.add_message(Role::User, "Which region sold the most units?").unwrap();

    let events: Vec<StreamEvent> = agent.run().collect().await;

    let kinds: Vec<&str> = events.iter().map(StreamEvent::kind).collect();
    assert_eq!(kinds, vec!["tool_code", "artifact", "tool_output", "delta"]);

    let StreamEvent::Artifact(reference) = &events[1] else {
        panic!("expected artifact event");
    };
    assert!(reference.starts_with("![units.png](/api/artifacts/artifacts/conv-int/"));
    assert!(reference.ends_with("_units.png)"));

    let StreamEvent::ToolOutput(output) = &events[2] else {
        panic!("expected tool output");
    };
    assert!(output.starts_with("16\n"));
    assert!(output.ends_with("Generated files: units.png"));

    let stored: Vec<_> = std::fs::read_dir(s.storage.path().join("artifacts").join("conv-int"))
        .unwrap()
        .collect();
    assert_eq!(stored.len(), 1);
    assert_eq!(std::fs::read_dir(s.scratch.path()).unwrap().count(), 0);
    assert_eq!(agent.state(), LoopState::Done);
}

/// Integration test: the tool message carries the serialized execution result
#[tokio::test]
async fn test_tool_message_history() {
    let s = setup(
        vec![code_turn("call_1", "n = len(df)\nprint(n)"), answer("There are 4 rows.")],
        Arc::new(RateLimiter::new(10, Duration::from_secs(60))),
    );
    let mut agent = AgentLoop::new(&Config::default(), s.deps.clone()).with_dataset(sales());
    agent.add_message(Role::User, "How many rows?").unwrap();
    let _: Vec<StreamEvent> = agent.run().collect().await;

    let roles: Vec<Role> = agent.messages().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    let tool = &agent.messages()[3];
    let result: ExecutionResult = serde_json::from_str(tool.content.as_deref().unwrap()).unwrap();
    assert_eq!(result.stdout, "4\n");
    assert_eq!(result.bindings.get("n").map(String::as_str), Some("4"));
    assert!(result.error.is_none());
    assert_eq!(s.client.request_count(), 2);
}

/// Integration test: a failing snippet is reported to the model, not the caller
#[tokio::test]
async fn test_execution_fault_is_folded_into_history() {
    let s = setup(
        vec![code_turn("call_1", "print('before')\nx = 1 / 0"), answer("Division failed.")],
        Arc::new(RateLimiter::new(10, Duration::from_secs(60))),
    );
    let mut agent = AgentLoop::new(&Config::default(), s.deps.clone());
    agent.add_message(Role::User, "divide").unwrap();
    let events: Vec<StreamEvent> = agent.run().collect().await;

    assert!(matches!(
        &events[1],
        StreamEvent::ToolOutput(msg) if msg.starts_with("ZeroDivisionError")
    ));
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::Error(_))));
    let tool = agent.messages().iter().find(|m| m.role == Role::Tool).unwrap();
    let result: ExecutionResult = serde_json::from_str(tool.content.as_deref().unwrap()).unwrap();
    assert_eq!(result.stdout, "before\n");
    assert!(result.bindings.is_empty());
    assert_eq!(std::fs::read_dir(s.scratch.path()).unwrap().count(), 0);
    assert_eq!(agent.state(), LoopState::Done);
}

/// Integration test: a failed upload surfaces in stdout while siblings are kept
#[tokio::test]
async fn test_upload_failure_reported_in_output() {
    let scratch = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::failing_on(["bad.csv"]));
    let deps = AgentDeps {
        client: Arc::new(MockLlmClient::new(vec![
            code_turn(
                "c1",
                "df.to_csv(output_dir + '/bad.csv')\n\
                 df.to_html(output_dir + '/table.html')\n\
                 print('saved')",
            ),
            answer("ok"),
        ])),
        limiter: Arc::new(RateLimiter::new(10, Duration::from_secs(60))),
        executor: SandboxExecutor::new(scratch.path(), 5_000_000),
        collector: ArtifactCollector::new(store.clone(), "/files", 2000),
    };
    let mut agent = AgentLoop::new(&Config::default(), deps).with_dataset(sales());
    agent.add_message(Role::User, "save").unwrap();
    let events: Vec<StreamEvent> = agent.run().collect().await;

    let artifacts: Vec<&StreamEvent> = events.iter().filter(|e| e.kind() == "artifact").collect();
    assert_eq!(artifacts.len(), 1);
    assert!(artifacts[0].content().starts_with("<iframe src=\"/files/artifacts/"));
    let output = events.iter().find(|e| e.kind() == "tool_output").unwrap().content();
    assert!(output.contains("Failed to save artifact bad.csv"));
    assert!(output.ends_with("Generated files: table.html"));
    assert_eq!(store.len(), 1);
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

/// Integration test: concurrent conversations share one rate budget
#[tokio::test]
async fn test_shared_limiter_across_conversations() {
    let limiter = Arc::new(RateLimiter::new(3, Duration::from_secs(3600)));
    let mut handles = Vec::new();
    for i in 0..5 {
        let s = setup(vec![answer("hi")], limiter.clone());
        handles.push(tokio::spawn(async move {
            let mut agent = AgentLoop::new(&Config::default(), s.deps.clone())
                .with_scope(format!("conv-{}", i));
            agent.add_message(Role::User, "hello").unwrap();
            let events: Vec<StreamEvent> = agent.run().collect().await;
            drop(s);
            events
        }));
    }

    let mut answered = 0;
    let mut limited = 0;
    for handle in handles {
        let events = handle.await.unwrap();
        match &events[0] {
            StreamEvent::Delta(_) => answered += 1,
            StreamEvent::Error(msg) if msg == "Rate limit exceeded. Please try again later." => {
                limited += 1
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(answered, 3);
    assert_eq!(limited, 2);
    assert_eq!(limiter.state().remaining_tokens, 0);
}

/// Integration test: follow-up turns reuse the conversation history
#[tokio::test]
async fn test_follow_up_turn_sees_history() {
    let s = setup(
        vec![answer("First."), answer("Second.")],
        Arc::new(RateLimiter::new(10, Duration::from_secs(60))),
    );
    let mut agent = AgentLoop::new(&Config::default(), s.deps.clone()).with_dataset(sales());

    agent.add_message(Role::User, "one").unwrap();
    let _: Vec<StreamEvent> = agent.run().collect().await;
    agent.add_message(Role::User, "two").unwrap();
    let events: Vec<StreamEvent> = agent.run().collect().await;

    assert_eq!(events, vec![StreamEvent::Delta("Second.".to_string())]);
    let second = &s.client.requests()[1];
    assert_eq!(second.messages.len(), 4);
    assert_eq!(second.messages[2].content.as_deref(), Some("First."));
}
