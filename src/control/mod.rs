//! Interactive control surface
//!
//! Reads operator lines from stdin and prints audit entries as they happen.
//! Slash commands steer the session; any other line goes to the proposer as
//! manual input, which is only accepted while paused.

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use accord_core::output::OutputFormatter;
use accord_core::{AccordError, AuditLog, Engine, SessionController};

const DEFAULT_LOG_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Run,
    Pause,
    Status,
    Log(usize),
    Help,
    Quit,
    Manual(String),
    Empty,
}

pub fn parse_line(line: &str) -> Result<ControlCommand, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ControlCommand::Empty);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(ControlCommand::Manual(line.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let command = match parts.next().unwrap_or_default() {
        "run" | "resume" => ControlCommand::Run,
        "pause" => ControlCommand::Pause,
        "status" => ControlCommand::Status,
        "log" => match parts.next() {
            None => ControlCommand::Log(DEFAULT_LOG_LINES),
            Some(n) => ControlCommand::Log(
                n.parse()
                    .map_err(|_| format!("'{}' is not a number of lines", n))?,
            ),
        },
        "help" => ControlCommand::Help,
        "quit" | "exit" => ControlCommand::Quit,
        other => return Err(format!("Unknown command '/{}'. Type /help.", other)),
    };
    Ok(command)
}

pub struct ControlSurface {
    session: Arc<SessionController>,
    engine: Arc<Engine>,
    audit: Arc<AuditLog>,
    formatter: OutputFormatter,
}

impl ControlSurface {
    pub fn new(session: Arc<SessionController>, engine: Arc<Engine>, audit: Arc<AuditLog>) -> Self {
        Self {
            session,
            engine,
            audit,
            formatter: OutputFormatter::new(),
        }
    }

    /// Serve stdin until `/quit`, end of input, Ctrl-C or cancellation.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let printer = self.spawn_printer(cancel.clone());
        self.print_help();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::signal::ctrl_c() => {
                    println!("\nShutting down...");
                    break;
                }
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    match parse_line(&line) {
                        Ok(ControlCommand::Quit) => break,
                        Ok(command) => self.handle(command),
                        Err(message) => self.formatter.print_warning(&message),
                    }
                }
            }
        }

        cancel.cancel();
        printer.abort();
        Ok(())
    }

    fn handle(&self, command: ControlCommand) {
        match command {
            ControlCommand::Run => {
                if self.session.is_running() {
                    self.formatter.print_warning("Already running.");
                } else {
                    // the initial exchange runs on its own task
                    let _ = self.session.resume();
                }
            }
            ControlCommand::Pause => {
                if !self.session.pause() {
                    self.formatter.print_warning("Already paused.");
                }
            }
            ControlCommand::Status => self
                .formatter
                .print_status(&self.session.snapshot(), self.engine.state()),
            ControlCommand::Log(n) => self.formatter.print_history(&self.audit.recent(n)),
            ControlCommand::Help => self.print_help(),
            // the reply arrives through the audit printer
            ControlCommand::Manual(text) => match self.session.spawn_manual(text) {
                Ok(_) => {}
                Err(AccordError::ManualInputWhileRunning) => self
                    .formatter
                    .print_warning("Manual input is disabled while running. Use /pause first."),
                Err(e) => self.formatter.print_error(&e.to_string()),
            },
            ControlCommand::Quit | ControlCommand::Empty => {}
        }
    }

    fn spawn_printer(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let mut entries = self.audit.subscribe();
        tokio::spawn(async move {
            let formatter = OutputFormatter::new();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    entry = entries.recv() => match entry {
                        Ok(entry) => formatter.print_entry(&entry),
                        Err(RecvError::Lagged(skipped)) => formatter
                            .print_warning(&format!("... {} log entries skipped, see /log", skipped)),
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        })
    }

    fn print_help(&self) {
        println!("Commands: /run  /pause  /status  /log [n]  /help  /quit");
        println!("Other input is sent to the proposer while paused.");
    }
}
