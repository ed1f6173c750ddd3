//! Structured error types for accord
//!
//! Configuration problems are fatal at startup. Everything that can go wrong
//! while the negotiation is running is either folded into conversational text
//! (backend failures) or into capability outcomes, so only the startup path
//! and the memory layer surface `AccordError` to callers.

use std::path::PathBuf;
use thiserror::Error;

use crate::llm::BackendError;
use crate::memory::MemoryError;

/// Primary error type for accord operations
#[derive(Error, Debug)]
pub enum AccordError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// A required file (agreement config, prompt file) does not exist
    #[error("required file not found: {path}")]
    MissingFile { path: PathBuf },

    /// A configuration file exists but could not be understood
    #[error("invalid configuration in {path}: {message}")]
    InvalidConfig { path: PathBuf, message: String },

    /// The agreement config lacks one of the two negotiating roles
    #[error("agreement config has no agent for role '{role}'")]
    MissingAgent { role: String },

    // =========================================================================
    // Backend Errors
    // =========================================================================
    /// One or more agents failed the pre-flight connectivity check
    #[error("{failed} of {total} agent(s) failed the connectivity check")]
    PreflightFailed { failed: usize, total: usize },

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// Manual input is only routed to the proposer while paused
    #[error("manual input is only accepted while the session is paused")]
    ManualInputWhileRunning,

    // =========================================================================
    // Storage Errors
    // =========================================================================
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    // =========================================================================
    // External Error Wrappers
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AccordError {
    /// Whether the process should exit instead of continuing.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingFile { .. }
                | Self::InvalidConfig { .. }
                | Self::MissingAgent { .. }
                | Self::PreflightFailed { .. }
        )
    }

    /// Operator-facing message for fatal startup errors
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingFile { path } => {
                format!("Required file {} was not found. Create it and restart.", path.display())
            }
            Self::InvalidConfig { path, message } => {
                format!("{} could not be parsed: {}", path.display(), message)
            }
            Self::MissingAgent { role } => {
                format!("The agreement config must define an agent named '{}'.", role)
            }
            Self::PreflightFailed { .. } => {
                "Please check the agreement config and network connectivity.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Result type alias using AccordError
pub type Result<T> = std::result::Result<T, AccordError>;
