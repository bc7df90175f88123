use crate::progress::CliReporter;
use batch_renamer_core::rename::{ConflictInfo, ConflictPrompt, FileInfo, PromptResponse};
use batch_renamer_core::ConflictDecision;
use colored::*;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::error;

/// Asks on stdin how to handle each name conflict. Lowercase answers apply
/// once, uppercase answers apply to the rest of the batch.
pub struct TerminalPrompt {
    reporter: Arc<CliReporter>,
}

impl TerminalPrompt {
    pub fn new(reporter: Arc<CliReporter>) -> Self {
        Self { reporter }
    }
}

impl ConflictPrompt for TerminalPrompt {
    fn prompt(&mut self, conflict: &ConflictInfo) -> PromptResponse {
        self.reporter.suspend(|| match ask(conflict) {
            Ok(response) => response,
            Err(e) => {
                error!("Could not read conflict answer: {}", e);
                PromptResponse::once(ConflictDecision::Cancel)
            }
        })
    }
}

fn describe(info: Option<FileInfo>) -> String {
    match info {
        Some(info) => {
            let modified = format_mtime(info.modified);
            format!("{} bytes, modified {}", info.size, modified)
        }
        None => "unreadable".to_string(),
    }
}

/// Seconds since the epoch is enough to compare two files at a glance.
fn format_mtime(nanos: i64) -> String {
    format!("@{}", nanos / 1_000_000_000)
}

fn ask(conflict: &ConflictInfo) -> io::Result<PromptResponse> {
    let stdin = io::stdin();
    let mut input = String::new();
    loop {
        input.clear();
        eprintln!();
        eprintln!(
            "{} {} already exists",
            "Conflict:".yellow().bold(),
            conflict.target.display()
        );
        eprintln!("  existing: {}", describe(conflict.target_info));
        eprintln!(
            "  incoming: {} ({})",
            conflict.source.display(),
            describe(conflict.source_info)
        );
        eprint!("[s]kip, [o]verwrite, [r]ename with suffix, skip [a]ll, [c]ancel (S/O/R = for all): ");
        io::stderr().flush()?;

        if stdin.lock().read_line(&mut input)? == 0 {
            return Ok(PromptResponse::once(ConflictDecision::Cancel));
        }
        if let Some(response) = parse_answer(input.trim()) {
            return Ok(response);
        }
    }
}

pub fn parse_answer(answer: &str) -> Option<PromptResponse> {
    let response = match answer {
        "s" => PromptResponse::once(ConflictDecision::Skip),
        "S" => PromptResponse::for_all(ConflictDecision::Skip),
        "o" => PromptResponse::once(ConflictDecision::Overwrite),
        "O" => PromptResponse::for_all(ConflictDecision::Overwrite),
        "r" => PromptResponse::once(ConflictDecision::RenameWithSuffix),
        "R" => PromptResponse::for_all(ConflictDecision::RenameWithSuffix),
        "a" | "A" => PromptResponse::once(ConflictDecision::SkipAll),
        "c" | "C" => PromptResponse::once(ConflictDecision::Cancel),
        _ => return None,
    };
    Some(response)
}

pub fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(default.unwrap_or(false));
        }

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert_eq!(
            parse_answer("o"),
            Some(PromptResponse::once(ConflictDecision::Overwrite))
        );
        assert_eq!(
            parse_answer("R"),
            Some(PromptResponse::for_all(ConflictDecision::RenameWithSuffix))
        );
        assert_eq!(
            parse_answer("a").map(|r| r.decision),
            Some(ConflictDecision::SkipAll)
        );
        assert_eq!(parse_answer("x"), None);
        assert_eq!(parse_answer(""), None);
    }
}
