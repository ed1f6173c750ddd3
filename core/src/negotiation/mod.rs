//! Negotiation engine
//!
//! The engine takes each proposer response from the session mailbox, parses
//! it, asks the reviewer to restate the proposal up to `max_attempts` times,
//! and dispatches the action only when the reviewer's proposal is identical.
//! Every reply the proposer sends back (after a correction, an escalation or
//! an execution) goes through the mailbox again as the next candidate.
//!
//! ```text
//! Idle → AwaitingInitial → AwaitingProposal ⇄ Negotiating → Executing
//!                                  ↑___________________________|
//! ```

pub mod prompts;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::audit::{AuditKind, AuditLog};
use crate::config::Prompts;
use crate::executor::{ActionExecutor, ExecutionResult};
use crate::llm::{AgentRole, ReasoningBackend};
use crate::protocol::{self, Proposal};
use crate::session::SessionController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Session never resumed
    Idle,
    /// Initial prompt sent, response pending
    AwaitingInitial,
    AwaitingProposal,
    Negotiating,
    Executing,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EngineState::Idle => "idle",
            EngineState::AwaitingInitial => "awaiting initial response",
            EngineState::AwaitingProposal => "awaiting proposal",
            EngineState::Negotiating => "negotiating",
            EngineState::Executing => "executing",
        };
        f.write_str(label)
    }
}

/// One reviewer query while seeking agreement
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiationRound {
    pub attempt: u32,
    pub proposal: Proposal,
    pub counter_response: String,
    pub agreed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoundOutcome {
    /// No proposal in the response; a correction was sent
    Malformed,
    Agreed {
        rounds: Vec<NegotiationRound>,
        result: ExecutionResult,
    },
    /// Attempts exhausted; the proposer was asked to refactor
    Escalated { rounds: Vec<NegotiationRound> },
}

/// Engine tunables
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub max_attempts: u32,
    pub idle_wait: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            idle_wait: Duration::from_millis(50),
        }
    }
}

pub struct Engine {
    backend: Arc<dyn ReasoningBackend>,
    executor: Arc<dyn ActionExecutor>,
    session: Arc<SessionController>,
    audit: Arc<AuditLog>,
    review_prefix: String,
    options: EngineOptions,
    state: Mutex<EngineState>,
}

impl Engine {
    pub fn new(
        backend: Arc<dyn ReasoningBackend>,
        executor: Arc<dyn ActionExecutor>,
        session: Arc<SessionController>,
        audit: Arc<AuditLog>,
        prompts: &Prompts,
        options: EngineOptions,
    ) -> Self {
        Self {
            backend,
            executor,
            session,
            audit,
            review_prefix: prompts.review_prefix.clone(),
            options: EngineOptions {
                max_attempts: options.max_attempts.max(1),
                ..options
            },
            state: Mutex::new(EngineState::Idle),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    fn set_state(&self, state: EngineState) {
        let mut current = self.state.lock();
        if *current != state {
            tracing::debug!("Engine state: {} -> {}", *current, state);
            *current = state;
        }
    }

    /// Consume responses until cancelled. Waits are bounded by `idle_wait`
    /// and cut short by mailbox deliveries and session changes.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!("Negotiation engine started");
        loop {
            if cancel.is_cancelled() {
                break;
            }

            if self.session.is_active() {
                if let Some(response) = self.session.mailbox().take() {
                    let (outcome, next) = self.negotiate(&response).await;
                    tracing::debug!("Round finished: {}", outcome_label(&outcome));
                    self.session.deliver(next);
                    tokio::task::yield_now().await;
                    continue;
                }
                self.set_state(EngineState::AwaitingProposal);
            } else {
                let snapshot = self.session.snapshot();
                if !snapshot.initial_exchange_sent {
                    self.set_state(EngineState::Idle);
                } else if !snapshot.awaiting_proposal {
                    self.set_state(EngineState::AwaitingInitial);
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.session.changed() => {}
                _ = self.session.mailbox().ready() => {}
                _ = tokio::time::sleep(self.options.idle_wait) => {}
            }
        }
        tracing::info!("Negotiation engine stopped");
    }

    /// Run one full cycle on a proposer response. Returns what happened and
    /// the proposer's reply, which is the next candidate.
    pub async fn negotiate(&self, response: &str) -> (RoundOutcome, String) {
        self.set_state(EngineState::AwaitingProposal);

        let parsed = protocol::parse(response);
        self.audit.proposal(AgentRole::Proposer, parsed.as_ref());
        self.session.record_proposal(parsed.clone());

        let Some(proposal) = parsed else {
            self.audit
                .record(AuditKind::Verdict, "no valid proposal, sending correction");
            let reply = self.ask(AgentRole::Proposer, &prompts::correction()).await;
            return (RoundOutcome::Malformed, reply);
        };

        self.set_state(EngineState::Negotiating);
        let rounds = self.seek_agreement(&proposal).await;

        if !rounds.last().is_some_and(|round| round.agreed) {
            self.audit.record(
                AuditKind::Verdict,
                format!("no agreement after {} rounds, escalating", rounds.len()),
            );
            let last_response = rounds
                .last()
                .map(|round| round.counter_response.as_str())
                .unwrap_or_default();
            let reply = self
                .ask(AgentRole::Proposer, &prompts::escalation(last_response))
                .await;
            self.note_reply(&reply);
            self.set_state(EngineState::AwaitingProposal);
            return (RoundOutcome::Escalated { rounds }, reply);
        }

        self.set_state(EngineState::Executing);
        let result = self.executor.execute(&proposal).await;
        self.audit.record(
            AuditKind::Execution,
            format!("{} -> {}", proposal, result.outcome),
        );
        self.session.mark_command_time();

        let reply = self
            .ask(
                AgentRole::Proposer,
                &prompts::execution_result(&proposal, &result.outcome),
            )
            .await;
        self.note_reply(&reply);
        self.set_state(EngineState::AwaitingProposal);
        (RoundOutcome::Agreed { rounds, result }, reply)
    }

    /// Query the reviewer until it restates `proposal` exactly or the attempts
    /// run out. Every retry carries the original proposal, never the
    /// reviewer's counter-proposal.
    async fn seek_agreement(&self, proposal: &Proposal) -> Vec<NegotiationRound> {
        let mut rounds = Vec::new();
        let mut prompt = prompts::review(&self.review_prefix, proposal);

        for attempt in 1..=self.options.max_attempts {
            let counter_response = self.ask(AgentRole::Reviewer, &prompt).await;
            let counter = protocol::parse(&counter_response);
            self.audit.proposal(AgentRole::Reviewer, counter.as_ref());

            let agreed = counter.as_ref() == Some(proposal);
            self.audit.record(
                AuditKind::Verdict,
                if agreed {
                    format!("agreement on {}", proposal)
                } else {
                    format!("no agreement, round {}/{}", attempt, self.options.max_attempts)
                },
            );

            rounds.push(NegotiationRound {
                attempt,
                proposal: proposal.clone(),
                counter_response,
                agreed,
            });
            if agreed {
                break;
            }
            prompt = prompts::retry(&self.review_prefix, proposal);
        }
        rounds
    }

    /// Backend failures become the response text so the conversation goes on.
    async fn ask(&self, role: AgentRole, prompt: &str) -> String {
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

    fn note_reply(&self, reply: &str) {
        if protocol::parse(reply).is_some() {
            self.session.mark_command_time();
        }
    }
}

fn outcome_label(outcome: &RoundOutcome) -> &'static str {
    match outcome {
        RoundOutcome::Malformed => "malformed",
        RoundOutcome::Agreed { .. } => "agreed",
        RoundOutcome::Escalated { .. } => "escalated",
    }
}
