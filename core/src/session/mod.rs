//! Session controller
//!
//! Owns the run/pause gate the negotiation engine obeys, fires the initial
//! exchange on the first resume only, and carries the manual input channel
//! that is open while paused.

pub mod mailbox;

pub use mailbox::Mailbox;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::audit::{AuditKind, AuditLog};
use crate::error::{AccordError, Result};
use crate::llm::{AgentRole, ReasoningBackend};
use crate::protocol::Proposal;

/// Point-in-time copy of the session flags
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub running: bool,
    /// Set once the initial response is in the mailbox
    pub awaiting_proposal: bool,
    pub initial_exchange_sent: bool,
    pub last_command_time: Option<DateTime<Local>>,
    /// Most recently parsed proposer output, `None` when it did not parse
    pub last_proposal: Option<Proposal>,
}

pub struct SessionController {
    state: Mutex<SessionState>,
    changed: Notify,
    mailbox: Mailbox<String>,
    backend: Arc<dyn ReasoningBackend>,
    audit: Arc<AuditLog>,
    initial_prompt: String,
}

impl SessionController {
    /// A paused session that has not yet talked to anyone.
    pub fn new(backend: Arc<dyn ReasoningBackend>, audit: Arc<AuditLog>, initial_prompt: String) -> Self {
        Self {
            state: Mutex::new(SessionState::default()),
            changed: Notify::new(),
            mailbox: Mailbox::new(),
            backend,
            audit,
            initial_prompt,
        }
    }

    pub fn mailbox(&self) -> &Mailbox<String> {
        &self.mailbox
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Running and past the initial exchange: the engine may consume responses.
    pub fn is_active(&self) -> bool {
        let state = self.state.lock();
        state.running && state.awaiting_proposal
    }

    /// Resolves on the next resume, pause or initial-exchange completion.
    pub async fn changed(&self) {
        self.changed.notified().await
    }

    /// Paused → Running. The first call also starts the initial exchange,
    /// whose task handle is returned; later calls never repeat it.
    pub fn resume(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let first = {
            let mut state = self.state.lock();
            if state.running {
                return None;
            }
            state.running = true;
            state.last_command_time = Some(Local::now());
            let first = !state.initial_exchange_sent;
            state.initial_exchange_sent = true;
            first
        };

        self.audit.record(AuditKind::Session, "running");
        self.changed.notify_waiters();

        first.then(|| {
            let session = Arc::clone(self);
            tokio::spawn(async move { session.initial_exchange().await })
        })
    }

    /// Running → Paused. Returns whether the state changed.
    pub fn pause(&self) -> bool {
        {
            let mut state = self.state.lock();
            if !state.running {
                return false;
            }
            state.running = false;
        }
        self.audit.record(AuditKind::Session, "paused");
        self.changed.notify_waiters();
        true
    }

    async fn initial_exchange(&self) {
        tracing::info!("Sending initial prompt to {}", AgentRole::Proposer);
        let response = self.ask_proposer(&self.initial_prompt).await;
        self.deliver(response);

        self.state.lock().awaiting_proposal = true;
        self.changed.notify_waiters();
    }

    /// Hand a proposer response to the engine.
    pub fn deliver(&self, response: String) {
        if let Some(stale) = self.mailbox.put(response) {
            self.audit.record(
                AuditKind::Session,
                format!("unconsumed response replaced: {}", stale),
            );
        }
    }

    /// Send operator text to the proposer while paused. The reply is audited
    /// and returned, never parsed or executed.
    pub async fn send_manual(&self, text: &str) -> Result<String> {
        if self.is_running() {
            return Err(AccordError::ManualInputWhileRunning);
        }
        self.audit.record(AuditKind::Session, "manual input");
        Ok(self.ask_proposer(text).await)
    }

    /// [`send_manual`](Self::send_manual) on its own task, so the caller keeps
    /// serving input while the proposer answers. The reply reaches the
    /// operator through the audit mirror.
    pub fn spawn_manual(self: &Arc<Self>, text: String) -> Result<JoinHandle<String>> {
        if self.is_running() {
            return Err(AccordError::ManualInputWhileRunning);
        }
        self.audit.record(AuditKind::Session, "manual input");
        let session = Arc::clone(self);
        Ok(tokio::spawn(async move { session.ask_proposer(&text).await }))
    }

    async fn ask_proposer(&self, prompt: &str) -> String {
        let role = AgentRole::Proposer;
        self.audit.prompt(role, prompt);
        let response = match self.backend.infer(role.key(), prompt).await {
            Ok(text) => text,
            Err(e) => {
                self.audit.record(AuditKind::Error, format!("{}: {}", role, e));
                format!("Error: {}", e)
            }
        };
        self.audit.response(role, &response);
        response
    }

    pub fn record_proposal(&self, proposal: Option<Proposal>) {
        self.state.lock().last_proposal = proposal;
    }

    pub fn mark_command_time(&self) {
        self.state.lock().last_command_time = Some(Local::now());
    }
}
