//! Output formatting module
//!
//! Colored console rendering of the session status, audit entries, the
//! connectivity check and memory lookups.

use console::Style;

use crate::audit::{AuditEntry, AuditKind};
use crate::llm::PreflightReport;
use crate::memory::{MemoryRecord, SearchResult};
use crate::negotiation::EngineState;
use crate::session::SessionState;

/// Output formatter for the operator console
pub struct OutputFormatter {
    // Styles
    blue: Style,
    green: Style,
    yellow: Style,
    red: Style,
    dim: Style,
    bold: Style,
}

impl Default for OutputFormatter {
    fn default() -> Self {
        Self {
            blue: Style::new().blue(),
            green: Style::new().green(),
            yellow: Style::new().yellow(),
            red: Style::new().red(),
            dim: Style::new().dim(),
            bold: Style::new().bold(),
        }
    }
}

impl OutputFormatter {
    /// Create a new formatter
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print_preflight(&self, report: &PreflightReport) {
        println!("{}", self.bold.apply_to("Checking agent connections:"));
        for (agent, result) in &report.results {
            match result {
                Ok(()) => println!("  {}: {}", agent, self.green.apply_to("OK")),
                Err(e) => println!("  {}: {}", agent, self.red.apply_to(e)),
            }
        }
    }

    pub fn print_status(&self, state: &SessionState, engine: EngineState) {
        println!();
        println!("{}", self.bold.apply_to("Session:"));
        let mode = if state.running {
            self.green.apply_to("Running")
        } else {
            self.yellow.apply_to("Paused")
        };
        println!("- Mode: {}", mode);
        println!("- Engine: {}", self.blue.apply_to(engine));
        println!(
            "- Initial prompt sent: {}",
            if state.initial_exchange_sent { "yes" } else { "no" }
        );
        println!(
            "- Last command time: {}",
            state
                .last_command_time
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string())
        );
        match &state.last_proposal {
            Some(p) => println!(
                "- Last command: {} | Args: {}",
                self.green.apply_to(&p.command),
                p.arguments
            ),
            None => println!("- Last command: {}", self.dim.apply_to("None")),
        }
    }

    /// One audit line, colored by kind
    pub fn format_entry(&self, entry: &AuditEntry) -> String {
        let style = match entry.kind {
            AuditKind::Prompt => &self.blue,
            AuditKind::Response => &self.dim,
            AuditKind::Proposal | AuditKind::Verdict => &self.yellow,
            AuditKind::Execution => &self.green,
            AuditKind::Session => &self.bold,
            AuditKind::Error => &self.red,
        };
        format!(
            "{} {}",
            self.dim.apply_to(format!("[{}]", entry.timestamp)),
            style.apply_to(format!("[{}] {}", entry.kind, entry.message))
        )
    }

    pub fn print_entry(&self, entry: &AuditEntry) {
        println!("{}", self.format_entry(entry));
    }

    /// Entries given newest first are printed oldest first.
    pub fn print_history(&self, entries: &[AuditEntry]) {
        if entries.is_empty() {
            println!("{}", self.dim.apply_to("(audit log is empty)"));
            return;
        }
        for entry in entries.iter().rev() {
            self.print_entry(entry);
        }
    }

    pub fn print_memory_files(&self, files: &[String]) {
        if files.is_empty() {
            println!("{}", self.dim.apply_to("No memory files."));
        }
        for name in files {
            println!("{}", name);
        }
    }

    pub fn print_search(&self, result: &SearchResult) {
        match result {
            SearchResult::Records(records) => {
                for record in records {
                    println!("{}", self.format_record(record));
                }
            }
            SearchResult::File(content) => print!("{}", content),
            SearchResult::FileNotFound(name) => {
                println!("{}", self.yellow.apply_to(format!("File {} not found", name)))
            }
            SearchResult::NoMatches => println!("{}", self.dim.apply_to("No matches found")),
        }
    }

    fn format_record(&self, record: &MemoryRecord) -> String {
        format!(
            "{} {} {}",
            self.green.apply_to(&record.id),
            self.dim.apply_to(format!("[{}]", record.category)),
            record.content
        )
    }

    pub fn print_warning(&self, message: &str) {
        eprintln!("{}", self.yellow.apply_to(message));
    }

    pub fn print_error(&self, message: &str) {
        eprintln!("{}", self.red.apply_to(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_entry_keeps_audit_layout() {
        console::set_colors_enabled(false);
        let formatter = OutputFormatter::new();
        let entry = AuditEntry {
            timestamp: "2024-01-01 10:00:00".to_string(),
            kind: AuditKind::Execution,
            message: "listmemoryfiles |  -> a.txt".to_string(),
        };
        assert_eq!(formatter.format_entry(&entry), entry.to_string());
    }

    #[test]
    fn test_format_record() {
        console::set_colors_enabled(false);
        let record = MemoryRecord {
            id: "20240101T100000.000000Z-000000-abcdef012345".to_string(),
            category: "facts".to_string(),
            content: "water is wet".to_string(),
            timestamp: "2024-01-01T10:00:00.000000Z".to_string(),
        };
        assert_eq!(
            OutputFormatter::new().format_record(&record),
            "20240101T100000.000000Z-000000-abcdef012345 [facts] water is wet"
        );
    }
}
