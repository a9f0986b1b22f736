//! End-to-end runs of the agent loop: model, approval gate, tools and checkpoints together.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use devgate::agent::{Agent, StepOutput};
use devgate::approval::{ApprovalGate, ApprovalMode, ApprovalRequest, Approver, Decision, Preview};
use devgate::checkpoint::{CheckpointStore, FileCheckpointStore};
use devgate::errors::{AgentResult, ERROR_MARKER};
use devgate::models::message::Message;
use devgate::models::role::Role;
use devgate::models::tool::{Tool, ToolCall};
use devgate::policy::SafetyPolicy;
use devgate::prompt_template::Preamble;
use devgate::providers::base::{Provider, Usage};
use devgate::registry::ToolRegistry;
use devgate::reporter::{drain, Reporter};
use devgate::state::{Phase, ThreadState};
use devgate::tools::default_registry;

/// Hands out scripted assistant messages and remembers what it was asked
struct ScriptedProvider {
    replies: Mutex<Vec<Message>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(
        &self,
        _system: &str,
        messages: &[Message],
        _tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            anyhow::bail!("script exhausted");
        }
        Ok((replies.remove(0), Usage::default()))
    }
}

/// Answers approval requests from a queue of decisions
struct QueuedApprover {
    decisions: Vec<Decision>,
    requests: Vec<ApprovalRequest>,
}

impl QueuedApprover {
    fn new(decisions: Vec<Decision>) -> Self {
        Self {
            decisions,
            requests: Vec::new(),
        }
    }
}

#[async_trait]
impl Approver for QueuedApprover {
    async fn decide(&mut self, request: &ApprovalRequest) -> Result<Decision> {
        self.requests.push(request.clone());
        if self.decisions.is_empty() {
            anyhow::bail!("no decision queued");
        }
        Ok(self.decisions.remove(0))
    }
}

#[derive(Default)]
struct CollectingReporter {
    outputs: Vec<StepOutput>,
}

impl Reporter for CollectingReporter {
    fn report(&mut self, output: &StepOutput) {
        self.outputs.push(output.clone());
    }
}

struct Harness {
    project: TempDir,
    threads: TempDir,
    provider: Arc<ScriptedProvider>,
    registry: Arc<ToolRegistry>,
    agent: Agent,
    gate: ApprovalGate,
}

impl Harness {
    fn new(replies: Vec<Message>) -> Self {
        let project = tempfile::tempdir().unwrap();
        let threads = tempfile::tempdir().unwrap();
        Self::with_dirs(project, threads, replies)
    }

    fn with_dirs(project: TempDir, threads: TempDir, replies: Vec<Message>) -> Self {
        let root = project.path().to_path_buf();
        let policy = Arc::new(SafetyPolicy::default());
        let registry = Arc::new(default_registry(root.clone(), policy.clone(), None).unwrap());
        let provider = ScriptedProvider::new(replies);
        let agent = Agent::new(
            provider.clone(),
            registry.clone(),
            Arc::new(FileCheckpointStore::new(threads.path())),
            Preamble::new(root.clone()).with_home(None),
        );
        let gate = ApprovalGate::new(registry.clone(), policy, root, ApprovalMode::Always);
        Self {
            project,
            threads,
            provider,
            registry,
            agent,
            gate,
        }
    }

    fn path(&self, relative: &str) -> std::path::PathBuf {
        self.project.path().join(relative)
    }

    /// Drive one human turn to completion the way an interactive driver would
    async fn turn(
        &self,
        state: &mut ThreadState,
        input: &str,
        approver: &mut QueuedApprover,
        reporter: &mut CollectingReporter,
    ) -> AgentResult<()> {
        self.agent.submit(state, input).await?;
        self.resume(state, approver, reporter).await
    }

    async fn resume(
        &self,
        state: &mut ThreadState,
        approver: &mut QueuedApprover,
        reporter: &mut CollectingReporter,
    ) -> AgentResult<()> {
        let mut decision = None;
        loop {
            drain(self.agent.stream(state, decision.take()), reporter).await?;
            match state.pending_tool_call().cloned() {
                Some(call) => {
                    let verdict = self
                        .gate
                        .review(&call, approver)
                        .await
                        .expect("approver answered");
                    decision = Some(verdict);
                }
                None => return Ok(()),
            }
        }
    }
}

fn call(id: &str, name: &str, arguments: Value) -> Message {
    Message::assistant().with_tool_call(ToolCall::new(id, name, arguments))
}

fn answer(text: &str) -> Message {
    Message::assistant().with_text(text)
}

fn tool_texts(outputs: &[StepOutput]) -> Vec<String> {
    outputs
        .iter()
        .filter_map(|output| match output {
            StepOutput::Tools(message) => message.text().map(str::to_string),
            _ => None,
        })
        .collect()
}

fn seed_project(root: &Path) {
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::create_dir_all(root.join("node_modules/left-pad")).unwrap();
    std::fs::write(root.join("src/index.ts"), "export {}\n").unwrap();
    std::fs::write(root.join("package.json"), r#"{"name": "demo"}"#).unwrap();
}

#[tokio::test]
async fn test_list_files_turn_pauses_then_completes() -> Result<()> {
    let h = Harness::new(vec![
        call("c1", "list_files", json!({"dirPath": ".", "depth": 1})),
        answer("The project has a src directory and a package.json."),
    ]);
    seed_project(h.project.path());

    let mut state = h.agent.load_thread("t1").await?;
    h.agent.submit(&mut state, "list files").await?;

    // First stop: the call waits at the gate and nothing has run
    let mut reporter = CollectingReporter::default();
    drain(h.agent.stream(&mut state, None), &mut reporter).await?;
    assert_eq!(state.phase(), Phase::AwaitingApproval);
    assert_eq!(reporter.outputs.len(), 1);
    assert_eq!(state.pending_tool_call().map(|c| c.name.as_str()), Some("list_files"));

    let mut approver = QueuedApprover::new(vec![Decision::Allow]);
    h.resume(&mut state, &mut approver, &mut reporter).await?;

    assert_eq!(approver.requests.len(), 1);
    assert_eq!(
        tool_texts(&reporter.outputs),
        vec!["|-- package.json\n|-- src\n  |-- index.ts".to_string()]
    );
    assert_eq!(state.phase(), Phase::Idle);
    let roles: Vec<Role> = state.history().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    Ok(())
}

#[tokio::test]
async fn test_destructive_command_is_blocked_even_when_approved() -> Result<()> {
    let h = Harness::new(vec![
        call("c1", "terminal", json!({"command": "rm -rf important"})),
        answer("I could not delete it."),
    ]);
    std::fs::create_dir(h.path("important"))?;

    let mut state = h.agent.load_thread("t1").await?;
    let mut approver = QueuedApprover::new(vec![Decision::Allow]);
    let mut reporter = CollectingReporter::default();
    h.turn(&mut state, "clean up", &mut approver, &mut reporter).await?;

    let outputs = tool_texts(&reporter.outputs);
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].starts_with(ERROR_MARKER));
    assert!(outputs[0].contains("rm -rf"));
    assert!(h.path("important").exists());
    // The model saw the refusal and answered
    assert_eq!(h.provider.request_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_resume_after_restart_re_presents_the_pending_call() -> Result<()> {
    let project = tempfile::tempdir()?;
    let threads = tempfile::tempdir()?;
    let threads_path = threads.path().to_path_buf();

    let first = Harness::with_dirs(
        project,
        threads,
        vec![call(
            "c1",
            "write_file",
            json!({"filePath": "hello.txt", "content": "hi\n"}),
        )],
    );
    let mut state = first.agent.load_thread("dev-session").await?;
    first.agent.submit(&mut state, "create hello.txt").await?;
    drain(first.agent.stream(&mut state, None), &mut CollectingReporter::default()).await?;
    assert_eq!(state.phase(), Phase::AwaitingApproval);

    // A new process: fresh agent and store over the same directories
    let Harness {
        project, threads, ..
    } = first;
    let second = Harness::with_dirs(project, threads, vec![answer("Created hello.txt.")]);
    assert_eq!(second.threads.path(), threads_path.as_path());

    let mut resumed = second.agent.load_thread("dev-session").await?;
    assert_eq!(resumed, state);
    assert_eq!(resumed.phase(), Phase::AwaitingApproval);
    assert!(!second.path("hello.txt").exists());

    let mut approver = QueuedApprover::new(vec![Decision::Allow]);
    let mut reporter = CollectingReporter::default();
    second.resume(&mut resumed, &mut approver, &mut reporter).await?;

    // The gate was asked again with a new-file preview; approval was never assumed
    assert_eq!(approver.requests.len(), 1);
    assert!(matches!(
        approver.requests[0].preview,
        Preview::NewFile { ref path, .. } if path == "hello.txt"
    ));
    assert_eq!(std::fs::read_to_string(second.path("hello.txt"))?, "hi\n");
    assert_eq!(resumed.phase(), Phase::Idle);
    Ok(())
}

#[tokio::test]
async fn test_denied_call_never_runs_and_has_no_result() -> Result<()> {
    let h = Harness::new(vec![call(
        "c1",
        "write_file",
        json!({"filePath": "notes.md", "content": "overwritten\n"}),
    )]);
    std::fs::write(h.path("notes.md"), "original\n")?;

    let mut state = h.agent.load_thread("t1").await?;
    let mut approver = QueuedApprover::new(vec![Decision::Deny]);
    let mut reporter = CollectingReporter::default();
    h.turn(&mut state, "rewrite notes", &mut approver, &mut reporter).await?;

    assert_eq!(std::fs::read_to_string(h.path("notes.md"))?, "original\n");
    assert!(matches!(
        approver.requests[0].preview,
        Preview::Diff { ref diff, .. } if diff.unified.contains("-original")
    ));
    assert!(matches!(reporter.outputs.last(), Some(StepOutput::Denied(_))));
    assert!(state.history().iter().all(|m| !m.is_tool_result()));
    assert_eq!(state.phase(), Phase::Idle);
    assert_eq!(h.provider.request_count(), 1);

    // The thread accepts new input after a denial
    h.agent.submit(&mut state, "ok, leave it").await?;
    assert_eq!(state.phase(), Phase::Agent);
    Ok(())
}

#[tokio::test]
async fn test_oversized_read_is_answered_with_chunk_guidance() -> Result<()> {
    let h = Harness::new(vec![
        call(
            "c1",
            "read_file",
            json!({"filePath": "big.log", "startLine": 1, "endLine": 500}),
        ),
        call(
            "c2",
            "read_file",
            json!({"filePath": "big.log", "startLine": 1, "endLine": 300}),
        ),
        answer("Read the first chunk."),
    ]);
    let content: String = (1..=500).map(|i| format!("entry {i}\n")).collect();
    std::fs::write(h.path("big.log"), content)?;

    let mut state = h.agent.load_thread("t1").await?;
    let mut approver = QueuedApprover::new(vec![Decision::Allow, Decision::Allow]);
    let mut reporter = CollectingReporter::default();
    h.turn(&mut state, "read big.log", &mut approver, &mut reporter).await?;

    let outputs = tool_texts(&reporter.outputs);
    assert!(outputs[0].starts_with(ERROR_MARKER));
    assert!(outputs[0].contains("300"));
    assert!(outputs[0].contains("startLine: 1, endLine: 300"));
    assert_eq!(outputs[1].lines().count(), 300);
    assert!(outputs[1].ends_with("300: entry 300"));
    Ok(())
}

#[tokio::test]
async fn test_writing_env_file_is_rejected() -> Result<()> {
    let h = Harness::new(vec![
        call(
            "c1",
            "write_file",
            json!({"filePath": ".env", "content": "API_KEY=leaked\n"}),
        ),
        answer("That file is off limits."),
    ]);

    let mut state = h.agent.load_thread("t1").await?;
    let mut approver = QueuedApprover::new(vec![Decision::Allow]);
    let mut reporter = CollectingReporter::default();
    h.turn(&mut state, "store the key", &mut approver, &mut reporter).await?;

    assert!(matches!(approver.requests[0].preview, Preview::Withheld { .. }));
    let outputs = tool_texts(&reporter.outputs);
    assert!(outputs[0].starts_with(ERROR_MARKER));
    assert!(outputs[0].contains("restricted"));
    assert!(!h.path(".env").exists());
    Ok(())
}

#[tokio::test]
async fn test_history_only_grows() -> Result<()> {
    let h = Harness::new(vec![
        call("c1", "list_files", json!({})),
        call("c2", "terminal", json!({"command": "echo hi"})),
        answer("Done."),
        call("c3", "terminal", json!({"command": "echo again"})),
    ]);
    let mut state = h.agent.load_thread("t1").await?;
    let mut approver = QueuedApprover::new(vec![Decision::Allow, Decision::Allow, Decision::Deny]);

    let mut snapshots: Vec<Vec<Message>> = Vec::new();
    for input in ["look around", "and again"] {
        let mut reporter = CollectingReporter::default();
        h.turn(&mut state, input, &mut approver, &mut reporter).await?;
        snapshots.push(state.history().to_vec());
    }

    let (earlier, later) = (&snapshots[0], &snapshots[1]);
    assert!(later.len() > earlier.len());
    assert_eq!(&later[..earlier.len()], earlier.as_slice());

    // Every executed call has exactly one result, and results follow their calls
    let persisted = FileCheckpointStore::new(h.threads.path())
        .load("t1")
        .await?
        .expect("thread persisted");
    assert_eq!(persisted.history(), state.history());
    for id in ["c1", "c2"] {
        let results = persisted
            .history()
            .iter()
            .filter(|m| m.is_tool_result() && m.responds_to(id))
            .count();
        assert_eq!(results, 1, "{id}");
    }
    assert!(!persisted.history().iter().any(|m| m.is_tool_result() && m.responds_to("c3")));
    assert_eq!(h.registry.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_threads_are_isolated() -> Result<()> {
    let h = Harness::new(vec![answer("one"), answer("two")]);
    let mut approver = QueuedApprover::new(vec![]);

    let mut a = h.agent.load_thread("thread-a").await?;
    h.turn(&mut a, "first", &mut approver, &mut CollectingReporter::default())
        .await?;
    let mut b = h.agent.load_thread("thread-b").await?;
    h.turn(&mut b, "second", &mut approver, &mut CollectingReporter::default())
        .await?;

    let summaries = h.agent.store().list().await?;
    assert_eq!(summaries.len(), 2);
    assert_eq!(h.agent.load_thread("thread-a").await?.history().len(), 2);
    assert_eq!(h.agent.load_thread("thread-b").await?.history().len(), 2);
    Ok(())
}
