//! Trace monitor abstraction.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use crate::core::errors::{FlickerError, Result};

/// Lifecycle state of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Running,
}

impl MonitorState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
        }
    }

    /// `MonitorState` error unless the monitor is in `expected`.
    pub fn require(self, monitor: &str, expected: Self) -> Result<()> {
        if self == expected {
            Ok(())
        } else {
            Err(FlickerError::MonitorState {
                monitor: monitor.to_string(),
                expected: expected.as_str(),
                actual: self.as_str(),
            })
        }
    }
}

/// One external trace-producing process.
///
/// `stopped → start → running → stop → stopped`. Starting a running monitor
/// or stopping a stopped one is a contract violation; callers gate on
/// [`TraceMonitor::is_enabled`].
pub trait TraceMonitor: Send + std::fmt::Debug {
    fn name(&self) -> &str;

    fn state(&self) -> MonitorState;

    fn is_enabled(&self) -> bool {
        self.state() == MonitorState::Running
    }

    fn start(&mut self) -> Result<()>;

    /// Stop the tracer and move its output to `destination`. Returns the
    /// final artifact path.
    fn stop(&mut self, destination: &Path) -> Result<PathBuf>;

    /// File name the output gets inside a trace artifact directory.
    fn output_file_name(&self) -> String {
        format!("{}.perfetto-trace", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_reports_both_states() {
        MonitorState::Running
            .require("layers", MonitorState::Running)
            .unwrap();
        let err = MonitorState::Stopped
            .require("layers", MonitorState::Running)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("layers"));
        assert!(msg.contains("is stopped, expected running"));
        assert!(err.is_contract_violation());
    }
}
