//! Append-only audit trail of the negotiation.
//!
//! Every prompt, response, parsed proposal, verdict and execution result is
//! written as one timestamped line to the audit file, kept in a bounded ring
//! buffer for the `/log` view, and broadcast to live subscribers.

use chrono::Local;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::broadcast;

use crate::llm::AgentRole;
use crate::protocol::Proposal;

const DEFAULT_RING_SIZE: usize = 1000;
const MIRROR_CAPACITY: usize = 256;

/// What an audit line records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    Prompt,
    Response,
    Proposal,
    Verdict,
    Execution,
    Session,
    Error,
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AuditKind::Prompt => "PROMPT",
            AuditKind::Response => "RESPONSE",
            AuditKind::Proposal => "PROPOSAL",
            AuditKind::Verdict => "VERDICT",
            AuditKind::Execution => "EXECUTION",
            AuditKind::Session => "SESSION",
            AuditKind::Error => "ERROR",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub timestamp: String,
    pub kind: AuditKind,
    pub message: String,
}

impl std::fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] [{}] {}", self.timestamp, self.kind, self.message)
    }
}

struct AuditInner {
    ring_buffer: VecDeque<AuditEntry>,
    max_entries: usize,
    file_path: Option<PathBuf>,
}

pub struct AuditLog {
    inner: Mutex<AuditInner>,
    mirror: broadcast::Sender<AuditEntry>,
}

impl AuditLog {
    /// Log that appends to `path`, creating its directory when needed.
    pub fn new(path: PathBuf) -> Self {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Cannot create audit log directory {}: {}", parent.display(), e);
            }
        }
        Self::build(Some(path), DEFAULT_RING_SIZE)
    }

    /// Log kept only in memory.
    pub fn in_memory() -> Self {
        Self::build(None, DEFAULT_RING_SIZE)
    }

    fn build(file_path: Option<PathBuf>, max_entries: usize) -> Self {
        let (mirror, _) = broadcast::channel(MIRROR_CAPACITY);
        Self {
            inner: Mutex::new(AuditInner {
                ring_buffer: VecDeque::with_capacity(max_entries.min(64)),
                max_entries,
                file_path,
            }),
            mirror,
        }
    }

    /// Receive every entry recorded from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEntry> {
        self.mirror.subscribe()
    }

    pub fn record(&self, kind: AuditKind, message: impl Into<String>) {
        let entry = AuditEntry {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            kind,
            message: message.into(),
        };
        tracing::debug!(target: "accord::audit", "{}", entry);

        {
            let mut inner = self.inner.lock();
            if let Some(path) = &inner.file_path {
                let written = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .and_then(|mut file| writeln!(file, "{}", entry));
                if let Err(e) = written {
                    tracing::warn!("Audit write to {} failed: {}", path.display(), e);
                }
            }

            if inner.ring_buffer.len() >= inner.max_entries {
                inner.ring_buffer.pop_front();
            }
            inner.ring_buffer.push_back(entry.clone());
        }

        // No subscribers is fine.
        let _ = self.mirror.send(entry);
    }

    pub fn prompt(&self, role: AgentRole, prompt: &str) {
        self.record(AuditKind::Prompt, format!("to {}: {}", role, prompt));
    }

    pub fn response(&self, role: AgentRole, response: &str) {
        self.record(AuditKind::Response, format!("from {}: {}", role, response));
    }

    pub fn proposal(&self, role: AgentRole, proposal: Option<&Proposal>) {
        let message = match proposal {
            Some(p) => format!("{} proposed {}", role, p),
            None => format!("{} sent no valid proposal", role),
        };
        self.record(AuditKind::Proposal, message);
    }

    /// The last `n` entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<AuditEntry> {
        self.inner.lock().ring_buffer.iter().rev().take(n).cloned().collect()
    }
}
