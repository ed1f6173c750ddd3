//! Capability dispatcher
//!
//! An agreed [`Proposal`] is decoded into a closed [`Action`] and run against
//! the memory namespaces, the record store, the mail relay or a subprocess.
//! Every failure comes back as outcome text starting with [`ERROR_MARKER`];
//! nothing here returns an error to the negotiation engine.

pub mod mail;
pub mod process;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::Paths;
use crate::memory::{Memory, MemoryError, Namespace, SearchResult, SearchScope};
use crate::protocol::Proposal;
use mail::{Mailer, OutgoingMail};

/// Prefix of every failed outcome
pub const ERROR_MARKER: &str = "Error:";

pub const UNKNOWN_COMMAND: &str = "Unknown command";
pub const NO_MATCHES: &str = "No matches found";

/// Failure inside a capability, rendered into outcome text
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("invalid file scope '{0}' (expected script or memory)")]
    InvalidScope(String),

    #[error("invalid path alias '{0}' (expected '.', scripts or tools)")]
    InvalidAlias(String),

    #[error("{command} expects arguments {usage}")]
    MalformedArguments {
        command: &'static str,
        usage: &'static str,
    },

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("email is not configured")]
    MailUnavailable,

    #[error("email failed: {0}")]
    Mail(String),

    #[error("could not launch {program}: {reason}")]
    Launch { program: String, reason: String },

    #[error("command timed out after {0:?}")]
    Timeout(Duration),
}

/// Target directory of `filewrite`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Script,
    Memory,
}

impl std::str::FromStr for Scope {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "script" => Ok(Scope::Script),
            "memory" => Ok(Scope::Memory),
            other => Err(CapabilityError::InvalidScope(other.to_string())),
        }
    }
}

/// Whitelisted launch locations of `runcommand`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathAlias {
    /// `.`: the base directory
    Base,
    Scripts,
    Tools,
}

impl std::str::FromStr for PathAlias {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "." => Ok(PathAlias::Base),
            "scripts" => Ok(PathAlias::Scripts),
            "tools" => Ok(PathAlias::Tools),
            other => Err(CapabilityError::InvalidAlias(other.to_string())),
        }
    }
}

/// Every capability the dispatcher knows, with its decoded arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    FileWrite {
        scope: Scope,
        filename: String,
        content: String,
    },
    CreateMemoryEntry {
        category: String,
        content: String,
    },
    WriteFlatFile {
        filename: String,
        content: String,
        append: bool,
    },
    GetFileContent {
        filename: String,
    },
    ListMemoryFiles,
    SearchMemory {
        scope: SearchScope,
        term: String,
    },
    SendEmail(OutgoingMail),
    RunCommand {
        alias: PathAlias,
        executable: String,
        args: Vec<String>,
    },
    BrowseWeb {
        url: String,
    },
    Unknown {
        command: String,
    },
}

impl Action {
    /// Decode a proposal. Argument sub-fields are `|`-separated; the last
    /// field of each command keeps any remaining separators.
    pub fn from_proposal(proposal: &Proposal) -> Result<Self, CapabilityError> {
        let args = proposal.arguments.as_str();
        let action = match proposal.command.as_str() {
            "filewrite" => {
                let [scope, filename, content] =
                    fields::<3>(args, "filewrite", "scope|filename|content")?;
                Action::FileWrite {
                    scope: scope.parse()?,
                    filename: filename.to_string(),
                    content: content.to_string(),
                }
            }
            "creatememoryentry" => {
                let [category, content] = fields::<2>(args, "creatememoryentry", "category|content")?;
                Action::CreateMemoryEntry {
                    category: category.to_string(),
                    content: content.to_string(),
                }
            }
            "writeflatfile" => {
                const USAGE: &str = "filename|content|append";
                let malformed = || CapabilityError::MalformedArguments {
                    command: "writeflatfile",
                    usage: USAGE,
                };
                let (filename, rest) = args.split_once('|').ok_or_else(malformed)?;
                let (content, append) = rest.rsplit_once('|').ok_or_else(malformed)?;
                Action::WriteFlatFile {
                    filename: filename.to_string(),
                    content: content.to_string(),
                    append: append.trim().eq_ignore_ascii_case("true"),
                }
            }
            "getfilecontent" => Action::GetFileContent {
                filename: args.to_string(),
            },
            "listmemoryfiles" => Action::ListMemoryFiles,
            "searchmemory" => {
                let [scope, term] = fields::<2>(args, "searchmemory", "filename|searchTerm")?;
                Action::SearchMemory {
                    scope: SearchScope::parse(scope),
                    term: term.to_string(),
                }
            }
            "sendemail" => {
                let [from, to, subject, body] = fields::<4>(args, "sendemail", "from|to|subject|body")?;
                Action::SendEmail(OutgoingMail {
                    from: from.to_string(),
                    to: to.to_string(),
                    subject: subject.to_string(),
                    body: body.to_string(),
                })
            }
            "runcommand" => {
                let [alias, executable, cmd_args] =
                    fields::<3>(args, "runcommand", "pathAlias|executable|cmdArgs")?;
                Action::RunCommand {
                    alias: alias.parse()?,
                    executable: executable.to_string(),
                    args: cmd_args.split_whitespace().map(str::to_string).collect(),
                }
            }
            "browseweb" => Action::BrowseWeb {
                url: args.to_string(),
            },
            other => Action::Unknown {
                command: other.to_string(),
            },
        };
        Ok(action)
    }
}

/// Split `args` into exactly `N` fields on the first `N - 1` separators.
fn fields<'a, const N: usize>(
    args: &'a str,
    command: &'static str,
    usage: &'static str,
) -> Result<[&'a str; N], CapabilityError> {
    let parts: Vec<&str> = args.splitn(N, '|').collect();
    parts
        .try_into()
        .map_err(|_| CapabilityError::MalformedArguments { command, usage })
}

/// What one dispatched proposal produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub command: String,
    pub arguments: String,
    pub outcome: String,
}

impl ExecutionResult {
    pub fn is_error(&self) -> bool {
        self.outcome.starts_with(ERROR_MARKER)
    }
}

/// Runs an agreed proposal; the engine's only view of the capabilities.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, proposal: &Proposal) -> ExecutionResult;
}

pub struct Dispatcher {
    memory: Arc<Memory>,
    base_dir: PathBuf,
    tools_dir: PathBuf,
    mailer: Option<Arc<dyn Mailer>>,
    command_timeout: Duration,
}

impl Dispatcher {
    pub fn new(memory: Arc<Memory>, paths: &Paths, command_timeout: Duration) -> Self {
        Self {
            memory,
            base_dir: paths.base_dir.clone(),
            tools_dir: paths.tools_dir.clone(),
            mailer: None,
            command_timeout,
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Decode and run a proposal, folding any failure into the outcome text.
    pub async fn dispatch(&self, proposal: &Proposal) -> String {
        let result = match Action::from_proposal(proposal) {
            Ok(action) => self.run(action).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Capability {} failed: {}", proposal.command, e);
                format!("{} {}", ERROR_MARKER, e)
            }
        }
    }

    pub async fn run(&self, action: Action) -> Result<String, CapabilityError> {
        match action {
            Action::FileWrite {
                scope,
                filename,
                content,
            } => {
                let namespace = match scope {
                    Scope::Script => &self.memory.script_files,
                    Scope::Memory => &self.memory.memory_files,
                };
                let path = namespace.write(&filename, &content, false)?;
                Ok(format!("Wrote to {}", path.display()))
            }
            Action::CreateMemoryEntry { category, content } => {
                let record = self.memory.records.create(&category, &content)?;
                Ok(format!("Memory entry created: {}", record.id))
            }
            Action::WriteFlatFile {
                filename,
                content,
                append,
            } => {
                let path = self.memory.memory_files.write(&filename, &content, append)?;
                Ok(format!("Wrote to {}", path.display()))
            }
            Action::GetFileContent { filename } => Ok(self
                .memory
                .memory_files
                .read(&filename)?
                .unwrap_or_else(|| format!("File {} not found", filename))),
            Action::ListMemoryFiles => Ok(self.memory.memory_files.list()?.join("\n")),
            Action::SearchMemory { scope, term } => Ok(match self.memory.search(&scope, &term)? {
                SearchResult::Records(records) => records
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n"),
                SearchResult::File(content) => content,
                SearchResult::FileNotFound(name) => format!("File {} not found", name),
                SearchResult::NoMatches => NO_MATCHES.to_string(),
            }),
            Action::SendEmail(mail) => {
                let mailer = self.mailer.as_ref().ok_or(CapabilityError::MailUnavailable)?;
                mailer.send(&mail).await?;
                Ok("Email sent successfully".to_string())
            }
            Action::RunCommand {
                alias,
                executable,
                args,
            } => {
                let root = match alias {
                    PathAlias::Base => self.base_dir.as_path(),
                    PathAlias::Scripts => self.memory.script_files.root(),
                    PathAlias::Tools => self.tools_dir.as_path(),
                };
                let program = Namespace::new(root).resolve(&executable)?;
                let output = process::launch(&program, &args, root, self.command_timeout).await?;
                let combined = output.combined_output();
                if combined.is_empty() {
                    Ok(match output.exit_code {
                        Some(code) => format!("Command exited with status {}", code),
                        None => "Command terminated by signal".to_string(),
                    })
                } else {
                    Ok(combined)
                }
            }
            Action::BrowseWeb { url } => Ok(format!(
                "Browse web not supported in API mode. (URL: {})",
                url
            )),
            Action::Unknown { command } => {
                tracing::debug!("Unknown command '{}'", command);
                Ok(UNKNOWN_COMMAND.to_string())
            }
        }
    }
}

#[async_trait]
impl ActionExecutor for Dispatcher {
    async fn execute(&self, proposal: &Proposal) -> ExecutionResult {
        ExecutionResult {
            command: proposal.command.clone(),
            arguments: proposal.arguments.clone(),
            outcome: self.dispatch(proposal).await,
        }
    }
}
