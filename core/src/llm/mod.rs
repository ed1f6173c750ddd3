//! Reasoning backend adapter
//!
//! A backend answers one prompt for one named agent. The negotiation engine
//! only sees the [`ReasoningBackend`] trait; [`HttpBackend`] is the production
//! implementation speaking the completion and chat wire shapes.

pub mod client;

pub use client::HttpBackend;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// The two negotiating roles and their agreement-config keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    /// Proposes actions; receives the initial prompt, corrections, escalations
    /// and execution results.
    Proposer,
    /// Independently restates the proposal to signal agreement.
    Reviewer,
}

impl AgentRole {
    pub const ALL: [AgentRole; 2] = [AgentRole::Proposer, AgentRole::Reviewer];

    pub fn key(&self) -> &'static str {
        match self {
            AgentRole::Proposer => "right",
            AgentRole::Reviewer => "left",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Failure talking to a reasoning backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("no agent configured under '{0}'")]
    UnknownAgent(String),

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Synchronous request/response access to the agents.
///
/// Implementations enforce their own request timeout; callers add none.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    async fn infer(&self, agent: &str, prompt: &str) -> Result<String, BackendError>;
}

/// Per-agent outcome of the startup connectivity check
#[derive(Debug, Default)]
pub struct PreflightReport {
    pub results: Vec<(String, Result<(), BackendError>)>,
}

impl PreflightReport {
    pub fn failures(&self) -> impl Iterator<Item = (&str, &BackendError)> {
        self.results
            .iter()
            .filter_map(|(agent, result)| result.as_ref().err().map(|e| (agent.as_str(), e)))
    }

    pub fn is_ok(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Send `prompt` to every listed agent and collect which ones answered.
pub async fn preflight<'a>(
    backend: &dyn ReasoningBackend,
    agents: impl IntoIterator<Item = &'a str>,
    prompt: &str,
) -> PreflightReport {
    let mut report = PreflightReport::default();
    for agent in agents {
        let result = backend.infer(agent, prompt).await.map(|_| ());
        match &result {
            Ok(()) => tracing::info!("Agent '{}' connection OK", agent),
            Err(e) => tracing::warn!("Agent '{}' connection failed: {}", agent, e),
        }
        report.results.push((agent.to_string(), result));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyBackend;

    #[async_trait]
    impl ReasoningBackend for FlakyBackend {
        async fn infer(&self, agent: &str, _prompt: &str) -> Result<String, BackendError> {
            if agent == "left" {
                Err(BackendError::Http {
                    status: 503,
                    body: "down".to_string(),
                })
            } else {
                Ok("pong".to_string())
            }
        }
    }

    #[test]
    fn test_role_keys() {
        assert_eq!(AgentRole::Proposer.key(), "right");
        assert_eq!(AgentRole::Reviewer.to_string(), "left");
    }

    #[tokio::test]
    async fn test_preflight_reports_each_agent() {
        let report = preflight(&FlakyBackend, ["left", "right", "extra"], "ping").await;
        assert_eq!(report.results.len(), 3);
        assert!(!report.is_ok());
        let failed: Vec<_> = report.failures().map(|(agent, _)| agent).collect();
        assert_eq!(failed, vec!["left"]);
    }

    #[tokio::test]
    async fn test_preflight_passes_when_all_answer() {
        let report = preflight(&FlakyBackend, ["right"], "ping").await;
        assert!(report.is_ok());
    }
}
