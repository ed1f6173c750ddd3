//! Configuration management
//!
//! `Settings` is built once at startup from an optional `accord.toml` and
//! handed to every component that needs it. The agreement config, prompt files
//! and mail credentials live next to the data they describe and are loaded
//! through it.

pub mod mail;
pub mod types;

pub use mail::MailConfig;
pub use types::{AgentConfig, AgreementConfig, ApiShape, Provider};

use crate::error::{AccordError, Result};
use crate::llm::AgentRole;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the optional settings file
pub const SETTINGS_FILE: &str = "accord.toml";

/// `[paths]` section. Unset entries derive from `base_dir`; relative entries
/// are resolved against it.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PathsSection {
    pub base_dir: Option<PathBuf>,
    pub memory_dir: Option<PathBuf>,
    pub script_dir: Option<PathBuf>,
    pub tools_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub agreement_file: Option<PathBuf>,
    pub initial_prompt: Option<PathBuf>,
    pub review_prompt: Option<PathBuf>,
    pub mail_credentials: Option<PathBuf>,
}

/// `[negotiation]` section
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct NegotiationSettings {
    /// Reviewing-agent rounds before escalating back to the proposer
    pub max_attempts: u32,
    /// Upper bound on how long the engine parks before re-checking its gate
    pub idle_wait_ms: u64,
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            idle_wait_ms: 50,
        }
    }
}

impl NegotiationSettings {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

/// `[backend]` section
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BackendSettings {
    pub request_timeout_secs: u64,
    pub preflight_prompt: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            preflight_prompt: "ping".to_string(),
        }
    }
}

/// `[commands]` section
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CommandSettings {
    pub timeout_secs: u64,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

/// On-disk shape of `accord.toml`
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SettingsFile {
    pub paths: PathsSection,
    pub negotiation: NegotiationSettings,
    pub backend: BackendSettings,
    pub commands: CommandSettings,
}

/// Fully resolved locations
#[derive(Debug, Clone, PartialEq)]
pub struct Paths {
    pub base_dir: PathBuf,
    pub memory_dir: PathBuf,
    pub script_dir: PathBuf,
    pub tools_dir: PathBuf,
    pub log_dir: PathBuf,
    pub database: PathBuf,
    pub agreement_file: PathBuf,
    pub initial_prompt: PathBuf,
    pub review_prompt: PathBuf,
    pub mail_credentials: PathBuf,
}

impl Paths {
    pub fn resolve(section: &PathsSection, base_override: Option<PathBuf>) -> Self {
        let base_dir = base_override
            .or_else(|| section.base_dir.clone())
            .unwrap_or_else(default_base_dir);
        // subprocesses run with the alias root as cwd, so relative roots break launches
        let base_dir = std::path::absolute(&base_dir).unwrap_or(base_dir);
        let pick = |value: &Option<PathBuf>, fallback: PathBuf| match value {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => base_dir.join(p),
            None => fallback,
        };

        let memory_dir = pick(&section.memory_dir, base_dir.join("memory"));
        Self {
            script_dir: pick(&section.script_dir, base_dir.join("scripts")),
            tools_dir: pick(&section.tools_dir, base_dir.join("tools")),
            log_dir: pick(&section.log_dir, base_dir.join("logs")),
            database: pick(&section.database, base_dir.join("memory.db")),
            agreement_file: pick(&section.agreement_file, base_dir.join("hemisphere_api.json")),
            initial_prompt: pick(&section.initial_prompt, memory_dir.join("agent_init.txt")),
            review_prompt: pick(&section.review_prompt, memory_dir.join("agent2.txt")),
            mail_credentials: pick(&section.mail_credentials, memory_dir.join("EmailCred.txt")),
            memory_dir,
            base_dir,
        }
    }

    /// Create every working directory that does not exist yet.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.memory_dir, &self.script_dir, &self.tools_dir, &self.log_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn audit_log(&self) -> PathBuf {
        self.log_dir.join("agent.log")
    }
}

/// The two role prompts loaded at startup
#[derive(Debug, Clone, PartialEq)]
pub struct Prompts {
    /// Sent once to the proposing agent on first activation
    pub initial: String,
    /// Context prefix for every review request to the reviewing agent
    pub review_prefix: String,
}

/// Resolved application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub paths: Paths,
    pub negotiation: NegotiationSettings,
    pub backend: BackendSettings,
    pub commands: CommandSettings,
}

impl Settings {
    /// Load settings from `config_path`, or from the first `accord.toml` found
    /// in the standard locations, or fall back to defaults.
    pub fn load(config_path: Option<&Path>, base_override: Option<PathBuf>) -> Result<Self> {
        let file = match config_path.map(Path::to_path_buf).or_else(find_config_file) {
            Some(path) => {
                let content = read_required(&path)?;
                toml::from_str(&content).map_err(|e| AccordError::InvalidConfig {
                    path: path.clone(),
                    message: e.to_string(),
                })?
            }
            None => SettingsFile::default(),
        };
        Ok(Self::from_file(file, base_override))
    }

    pub fn from_file(file: SettingsFile, base_override: Option<PathBuf>) -> Self {
        Self {
            paths: Paths::resolve(&file.paths, base_override),
            negotiation: file.negotiation,
            backend: file.backend,
            commands: file.commands,
        }
    }

    /// Defaults rooted at `base_dir`; used by tests and tooling.
    pub fn rooted_at(base_dir: impl Into<PathBuf>) -> Self {
        Self::from_file(SettingsFile::default(), Some(base_dir.into()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.commands.timeout_secs)
    }

    /// Load and validate the role → agent mapping.
    pub fn load_agreement(&self) -> Result<AgreementConfig> {
        let path = &self.paths.agreement_file;
        let content = read_required(path)?;
        let invalid = |message: String| AccordError::InvalidConfig {
            path: path.clone(),
            message,
        };

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config: AgreementConfig = if is_yaml {
            serde_yml::from_str(&content).map_err(|e| invalid(e.to_string()))?
        } else {
            serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?
        };

        for role in AgentRole::ALL {
            if config.get(role.key()).is_none() {
                return Err(AccordError::MissingAgent {
                    role: role.key().to_string(),
                });
            }
        }
        if let Some((name, _)) = config.agents.iter().find(|(_, a)| a.endpoint.trim().is_empty()) {
            return Err(invalid(format!("agent '{}' has an empty endpoint", name)));
        }

        Ok(config)
    }

    pub fn load_prompts(&self) -> Result<Prompts> {
        Ok(Prompts {
            initial: read_required(&self.paths.initial_prompt)?,
            review_prefix: read_required(&self.paths.review_prompt)?,
        })
    }

    /// Mail relay settings, or `None` when mail is unavailable.
    pub fn load_mail(&self) -> Option<MailConfig> {
        MailConfig::load(&self.paths.mail_credentials)
    }
}

fn read_required(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AccordError::MissingFile {
            path: path.to_path_buf(),
        },
        _ => AccordError::Io(e),
    })
}

fn default_base_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("accord")
}

/// Find the settings file in standard locations
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        let path = cwd.join(SETTINGS_FILE);
        if path.exists() {
            return Some(path);
        }
    }

    let path = get_config_dir()?.join(SETTINGS_FILE);
    path.exists().then_some(path)
}

/// Get the configuration directory path
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("accord"))
}
