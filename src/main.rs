//! `accord` - run two reasoning backends that must agree before acting
//!
//! Startup loads the settings and the agreement config, checks that every
//! configured agent answers, then hands the terminal to the control surface
//! while the negotiation engine runs in the background.

use anyhow::{Context, Result};
use clap::Parser;
use console::Style;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, MemoryCommand};
use crate::control::ControlSurface;
use accord_core::audit::{AuditKind, AuditLog};
use accord_core::executor::mail::SmtpMailer;
use accord_core::llm::{self, HttpBackend, ReasoningBackend};
use accord_core::memory::{Memory, SearchScope};
use accord_core::negotiation::{Engine, EngineOptions};
use accord_core::output::OutputFormatter;
use accord_core::{AccordError, Dispatcher, SessionController, Settings};

mod cli;
mod control;

/// How long the engine gets to finish after `/quit`
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.version {
        let blue = Style::new().blue();
        println!(
            "{} v{} ({})",
            blue.apply_to("accord"),
            env!("CARGO_PKG_VERSION"),
            env!("GIT_HASH")
        );
        return ExitCode::SUCCESS;
    }

    let formatter = OutputFormatter::new();
    match run(cli, &formatter).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            formatter.print_error(&format!("Error: {:#}", e));
            if let Some(accord) = e.chain().find_map(|c| c.downcast_ref::<AccordError>()) {
                if accord.is_fatal() {
                    formatter.print_error(&accord.user_message());
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli, formatter: &OutputFormatter) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref(), cli.base_dir.clone())
        .context("Failed to load settings")?;
    settings
        .paths
        .ensure_dirs()
        .context("Failed to create working directories")?;
    tracing::debug!("Base directory: {}", settings.paths.base_dir.display());

    match cli.command.unwrap_or(Commands::Run { start: false }) {
        Commands::Run { start } => run_session(&settings, start, formatter).await,
        Commands::Check => {
            let backend = connect(&settings)?;
            check_agents(&backend, &settings, formatter).await
        }
        Commands::Memory { cmd } => handle_memory(&settings, cmd, formatter),
    }
}

fn connect(settings: &Settings) -> accord_core::Result<HttpBackend> {
    let agreement = settings.load_agreement()?;
    Ok(HttpBackend::new(agreement, settings.request_timeout())?)
}

fn open_memory(settings: &Settings) -> accord_core::Result<Memory> {
    let paths = &settings.paths;
    Ok(Memory::open(&paths.database, &paths.memory_dir, &paths.script_dir)?)
}

/// Every configured agent must answer the preflight prompt.
async fn check_agents(backend: &HttpBackend, settings: &Settings, formatter: &OutputFormatter) -> Result<()> {
    let report = llm::preflight(
        backend,
        backend.agents().roles(),
        &settings.backend.preflight_prompt,
    )
    .await;
    formatter.print_preflight(&report);

    let failed = report.failures().count();
    if failed > 0 {
        return Err(AccordError::PreflightFailed {
            failed,
            total: report.results.len(),
        }
        .into());
    }
    Ok(())
}

async fn run_session(settings: &Settings, start: bool, formatter: &OutputFormatter) -> Result<()> {
    let backend = connect(settings)?;
    let prompts = settings.load_prompts()?;
    check_agents(&backend, settings, formatter).await?;
    let backend: Arc<dyn ReasoningBackend> = Arc::new(backend);

    let audit = Arc::new(AuditLog::new(settings.paths.audit_log()));
    let memory = open_memory(settings).context("Failed to open the memory store")?;

    let mut dispatcher = Dispatcher::new(Arc::new(memory), &settings.paths, settings.command_timeout());
    match settings.load_mail() {
        Some(mail) => dispatcher = dispatcher.with_mailer(Arc::new(SmtpMailer::new(mail))),
        None => formatter.print_warning("Email credentials not available; sendemail is disabled."),
    }

    let session = Arc::new(SessionController::new(
        backend.clone(),
        audit.clone(),
        prompts.initial.clone(),
    ));
    let engine = Arc::new(Engine::new(
        backend,
        Arc::new(dispatcher),
        session.clone(),
        audit.clone(),
        &prompts,
        EngineOptions {
            max_attempts: settings.negotiation.max_attempts,
            idle_wait: settings.negotiation.idle_wait(),
        },
    ));

    let cancel = CancellationToken::new();
    let engine_task = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.run(cancel).await })
    };

    audit.record(AuditKind::Session, "started, paused");
    let surface = ControlSurface::new(session.clone(), engine, audit.clone());
    if start {
        let _ = session.resume();
    }
    let served = surface.run(cancel.clone()).await;

    cancel.cancel();
    if tokio::time::timeout(SHUTDOWN_GRACE, engine_task).await.is_err() {
        tracing::warn!("Negotiation engine still busy at shutdown; abandoning in-flight call");
    }
    audit.record(AuditKind::Session, "stopped");
    served
}

fn handle_memory(settings: &Settings, cmd: MemoryCommand, formatter: &OutputFormatter) -> Result<()> {
    let memory = open_memory(settings).context("Failed to open the memory store")?;

    match cmd {
        MemoryCommand::List => formatter.print_memory_files(&memory.memory_files.list()?),
        MemoryCommand::Search { term, file } => {
            let result = memory.search(&SearchScope::parse(&file), &term)?;
            formatter.print_search(&result);
        }
    }
    Ok(())
}
