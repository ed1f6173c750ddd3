//! End-to-end: session + engine + real dispatcher against a scripted backend.

use accord_core::audit::{AuditKind, AuditLog};
use accord_core::config::{Prompts, Settings};
use accord_core::executor::Dispatcher;
use accord_core::llm::{BackendError, ReasoningBackend};
use accord_core::memory::Memory;
use accord_core::negotiation::{Engine, EngineOptions};
use accord_core::session::SessionController;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct ScriptedBackend {
    scripts: Mutex<HashMap<String, VecDeque<String>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedBackend {
    fn script(&self, agent: &str, replies: &[&str]) {
        self.scripts
            .lock()
            .entry(agent.to_string())
            .or_default()
            .extend(replies.iter().map(|r| r.to_string()));
    }

    fn calls_to(&self, agent: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(a, _)| a == agent)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    async fn infer(&self, agent: &str, prompt: &str) -> Result<String, BackendError> {
        self.calls.lock().push((agent.to_string(), prompt.to_string()));
        let next = self.scripts.lock().get_mut(agent).and_then(VecDeque::pop_front);
        match next {
            Some(reply) => Ok(reply),
            // exhausted: keep the conversation going slowly on a non-command
            None => {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok("waiting".to_string())
            }
        }
    }
}

struct Stack {
    backend: Arc<ScriptedBackend>,
    session: Arc<SessionController>,
    audit: Arc<AuditLog>,
    cancel: CancellationToken,
    engine_task: tokio::task::JoinHandle<()>,
}

impl Stack {
    fn start(base: &Path, backend: Arc<ScriptedBackend>) -> Self {
        let settings = Settings::rooted_at(base);
        settings.paths.ensure_dirs().unwrap();
        let memory = Memory::open(
            &settings.paths.database,
            &settings.paths.memory_dir,
            &settings.paths.script_dir,
        )
        .unwrap();
        let dispatcher = Dispatcher::new(Arc::new(memory), &settings.paths, Duration::from_secs(5));

        let audit = Arc::new(AuditLog::new(settings.paths.audit_log()));
        let prompts = Prompts {
            initial: "You are the proposer.".to_string(),
            review_prefix: "You are the reviewer.".to_string(),
        };
        let session = Arc::new(SessionController::new(
            backend.clone(),
            audit.clone(),
            prompts.initial.clone(),
        ));
        let engine = Arc::new(Engine::new(
            backend.clone(),
            Arc::new(dispatcher),
            session.clone(),
            audit.clone(),
            &prompts,
            EngineOptions {
                max_attempts: 5,
                idle_wait: Duration::from_millis(10),
            },
        ));

        let cancel = CancellationToken::new();
        let engine_task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { engine.run(cancel).await })
        };

        Self {
            backend,
            session,
            audit,
            cancel,
            engine_task,
        }
    }

    /// Poll until `done` holds or a second passes.
    async fn wait_for(&self, done: impl Fn(&Self) -> bool) -> bool {
        for _ in 0..100 {
            if done(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        done(self)
    }

    async fn stop(self) {
        self.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), self.engine_task)
            .await
            .unwrap()
            .unwrap();
    }
}

const HELLO: &str = "{{#filewrite#}script|hello.py|print(1)[END_CMD]";

#[tokio::test]
async fn agreed_filewrite_lands_in_script_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::default());
    backend.script("right", &[&format!("Sure. {}", HELLO), "All done."]);
    backend.script("left", &[HELLO]);

    let stack = Stack::start(dir.path(), backend);
    stack.session.resume().unwrap().await.unwrap();

    let script = dir.path().join("scripts/hello.py");
    assert!(stack.wait_for(|_| script.exists()).await);
    assert_eq!(std::fs::read_to_string(&script).unwrap(), "print(1)\n");
    assert!(!dir.path().join("memory/hello.py").exists());

    // the result is reported back to the proposer
    assert!(
        stack
            .wait_for(|s| s.backend.calls_to("right").len() >= 2)
            .await
    );
    let report = &stack.backend.calls_to("right")[1];
    assert!(report.starts_with("Command executed: {{#filewrite#}script|hello.py|print(1)[END_CMD]. Result: Wrote to "));

    let audit_file = std::fs::read_to_string(dir.path().join("logs/agent.log")).unwrap();
    assert!(audit_file.contains("[EXECUTION] filewrite | script|hello.py|print(1) -> Wrote to"));
    stack.stop().await;
}

#[tokio::test]
async fn disagreement_escalates_once_and_executes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::default());
    backend.script("right", &[HELLO, "Let me think about it."]);
    backend.script(
        "left",
        &[
            "{{#filewrite#}memory|hello.py|print(1)[END_CMD]",
            "no",
            "no",
            "{{#filewrite#}script|hello.py|print(2)[END_CMD]",
            "still no",
        ],
    );

    let stack = Stack::start(dir.path(), backend);
    stack.session.resume().unwrap().await.unwrap();

    assert!(
        stack
            .wait_for(|s| s.backend.calls_to("right").len() >= 2)
            .await
    );
    let to_right = stack.backend.calls_to("right");
    assert_eq!(
        to_right[1],
        "No agreement from left agent. Response: still no. Refactor command."
    );
    assert_eq!(stack.backend.calls_to("left").len(), 5);
    assert!(!dir.path().join("scripts/hello.py").exists());
    assert!(!dir.path().join("memory/hello.py").exists());

    let escalations = stack
        .audit
        .recent(1000)
        .into_iter()
        .filter(|e| e.kind == AuditKind::Verdict && e.message.contains("escalating"))
        .count();
    assert_eq!(escalations, 1);

    // the reply to the escalation carries no proposal, so it gets a correction
    assert!(
        stack
            .wait_for(|s| s.backend.calls_to("right").len() >= 3)
            .await
    );
    assert!(stack.backend.calls_to("right")[2].starts_with("Bad command received."));
    assert_eq!(stack.backend.calls_to("left").len(), 5);
    assert!(!stack
        .audit
        .recent(1000)
        .iter()
        .any(|e| e.kind == AuditKind::Execution));
    stack.stop().await;
}

#[tokio::test]
async fn malformed_proposal_is_corrected_then_agreed() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::default());
    backend.script(
        "right",
        &[
            "I would like to note something down.",
            "{{#writeflatfile#}todo.txt|buy milk|false[END_CMD]",
        ],
    );
    backend.script("left", &["{{#writeflatfile#}todo.txt|buy milk|false[END_CMD]"]);

    let stack = Stack::start(dir.path(), backend);
    stack.session.resume().unwrap().await.unwrap();

    let todo = dir.path().join("memory/todo.txt");
    assert!(stack.wait_for(|_| todo.exists()).await);
    assert!(stack.backend.calls_to("right")[1].starts_with("Bad command received."));
    stack.stop().await;
}

#[tokio::test]
async fn initial_prompt_is_sent_once_across_toggles() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::default());
    let stack = Stack::start(dir.path(), backend);

    stack.session.resume().unwrap().await.unwrap();
    stack.session.pause();
    assert!(stack.session.resume().is_none());
    stack.session.pause();
    assert!(stack.session.resume().is_none());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let initial = stack
        .backend
        .calls_to("right")
        .into_iter()
        .filter(|p| p == "You are the proposer.")
        .count();
    assert_eq!(initial, 1);
    stack.stop().await;
}

#[tokio::test]
async fn pause_parks_the_engine_until_resumed() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::default());
    backend.script("right", &[HELLO]);
    backend.script("left", &[HELLO]);

    let stack = Stack::start(dir.path(), backend);
    stack.session.resume().unwrap().await.unwrap();
    stack.session.pause();
    let left_calls = stack.backend.calls_to("left").len();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(stack.backend.calls_to("left").len(), left_calls);

    // manual input is an inspection channel: answered, never executed
    let reply = stack.session.send_manual("what next?").await.unwrap();
    assert_eq!(reply, "waiting");

    assert!(stack.session.resume().is_none());
    let script = dir.path().join("scripts/hello.py");
    assert!(stack.wait_for(|_| script.exists()).await);
    stack.stop().await;
}

#[tokio::test]
async fn memory_entries_are_searchable_by_agents() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::default());
    let create = "{{#creatememoryentry#}facts|the kettle is blue[END_CMD]";
    let search = "{{#searchmemory#}ALL|kettle[END_CMD]";
    backend.script("right", &[create, search]);
    backend.script("left", &[create, search]);

    let stack = Stack::start(dir.path(), backend);
    stack.session.resume().unwrap().await.unwrap();

    assert!(
        stack
            .wait_for(|s| s.backend.calls_to("right").len() >= 3)
            .await
    );
    let to_right = stack.backend.calls_to("right");
    let created = to_right[1]
        .split("Result: Memory entry created: ")
        .nth(1)
        .unwrap()
        .to_string();
    assert!(to_right[2].ends_with(&format!("Result: {}: the kettle is blue", created)));
    stack.stop().await;
}
