//! Plain-text status file written after each scenario.

#![allow(missing_docs)]

use std::error::Error as _;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::errors::{FlickerError, Result};
use crate::results::assertion::AssertionResult;
use crate::results::metrics::ExecutionStatus;

pub const STATUS_FILE: &str = "flicker_status.txt";

const WRAP_WIDTH: usize = 100;

#[derive(Debug, Default)]
pub struct StatusReport<'a> {
    pub scenario: String,
    pub artifact: Option<PathBuf>,
    pub execution_errors: &'a [FlickerError],
    pub results: &'a [AssertionResult],
}

impl StatusReport<'_> {
    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        if self.execution_errors.is_empty() {
            ExecutionStatus::Ok
        } else {
            ExecutionStatus::ExecutionError
        }
    }

    #[must_use]
    pub fn has_contract_violation(&self) -> bool {
        self.execution_errors
            .iter()
            .any(FlickerError::is_contract_violation)
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "scenario: {}", self.scenario);
        let _ = writeln!(out, "status: {}", self.status());
        if let Some(artifact) = &self.artifact {
            let _ = writeln!(out, "artifact: {}", artifact.display());
        }
        if self.has_contract_violation() {
            let _ = writeln!(out, "contract_violation: true");
        }

        if !self.execution_errors.is_empty() {
            let _ = writeln!(out, "execution errors:");
            for err in self.execution_errors {
                push_wrapped(&mut out, "  ", &err.to_string());
                let mut source = err.source();
                while let Some(cause) = source {
                    push_wrapped(&mut out, "    caused by: ", &cause.to_string());
                    source = cause.source();
                }
            }
        }

        let _ = writeln!(out, "assertions: {}", self.results.len());
        for result in self.results {
            let _ = writeln!(
                out,
                "  {} [{}] {}",
                result.name(),
                result.group(),
                result.status()
            );
            for error in result.errors() {
                let line = match error.timestamp_ns {
                    Some(ts) => format!("{} (at {ts}ns)", error.message),
                    None => error.message.clone(),
                };
                push_wrapped(&mut out, "    - ", &line);
            }
        }
        out
    }

    /// Write the report to `<dir>/flicker_status.txt`.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).map_err(|e| FlickerError::io(dir, e))?;
        let path = dir.join(STATUS_FILE);
        fs::write(&path, self.render()).map_err(|e| FlickerError::io(&path, e))?;
        Ok(path)
    }
}

/// Word-wrap `text` at `WRAP_WIDTH`, indenting continuation lines to the
/// width of `lead`.
fn push_wrapped(out: &mut String, lead: &str, text: &str) {
    let indent = " ".repeat(lead.chars().count());
    let mut line = String::from(lead);
    let mut line_has_word = false;
    for word in text.split_whitespace() {
        if line_has_word && line.chars().count() + 1 + word.chars().count() > WRAP_WIDTH {
            out.push_str(&line);
            out.push('\n');
            line.clone_from(&indent);
            line_has_word = false;
        }
        if line_has_word {
            line.push(' ');
        }
        line.push_str(word);
        line_has_word = true;
    }
    out.push_str(&line);
    out.push('\n');
}
