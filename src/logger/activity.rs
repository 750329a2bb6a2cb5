//! Shared activity log handle.
//!
//! Monitors, the tracer registry and the collectors all record through one
//! cheaply-cloneable [`ActivityLog`]. Writes happen synchronously on the
//! caller's thread under a single mutex; test execution never runs two
//! scenarios at once, so contention is not a concern.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

// ──────────────────── public event type ────────────────────

#[derive(Debug, Clone)]
pub enum ActivityEvent {
    MonitorStarted {
        monitor: String,
        pid: i32,
        config_path: PathBuf,
    },
    MonitorStopped {
        monitor: String,
        pid: i32,
        artifact: PathBuf,
        duration_ms: u64,
    },
    OrphansCleaned {
        pids: Vec<i32>,
        origin: &'static str,
    },
    ScenarioStarted {
        scenario: String,
    },
    ScenariosDetected {
        scenario: String,
        count: usize,
    },
    AssertionsExecuted {
        scenario: String,
        count: usize,
        failures: usize,
    },
    ExecutionError {
        scenario: Option<String>,
        code: String,
        message: String,
        contract_violation: bool,
    },
    StatusWritten {
        scenario: String,
        path: PathBuf,
        ok: bool,
    },
}

impl ActivityEvent {
    fn into_entry(self) -> LogEntry {
        match self {
            Self::MonitorStarted {
                monitor,
                pid,
                config_path,
            } => {
                let mut e = LogEntry::new(EventType::MonitorStart, Severity::Info);
                e.monitor = Some(monitor);
                e.pid = Some(pid);
                e.path = Some(config_path.display().to_string());
                e
            }
            Self::MonitorStopped {
                monitor,
                pid,
                artifact,
                duration_ms,
            } => {
                let mut e = LogEntry::new(EventType::MonitorStop, Severity::Info);
                e.monitor = Some(monitor);
                e.pid = Some(pid);
                e.path = Some(artifact.display().to_string());
                e.duration_ms = Some(duration_ms);
                e.ok = Some(true);
                e
            }
            Self::OrphansCleaned { pids, origin } => {
                let severity = if pids.is_empty() {
                    Severity::Info
                } else {
                    Severity::Warning
                };
                let mut e = LogEntry::new(EventType::OrphanCleanup, severity);
                e.count = Some(pids.len());
                e.details = Some(format!("origin={origin} pids={pids:?}"));
                e
            }
            Self::ScenarioStarted { scenario } => {
                let mut e = LogEntry::new(EventType::ScenarioStart, Severity::Info);
                e.scenario = Some(scenario);
                e
            }
            Self::ScenariosDetected { scenario, count } => {
                let mut e = LogEntry::new(EventType::ScenarioDetected, Severity::Info);
                e.scenario = Some(scenario);
                e.count = Some(count);
                e
            }
            Self::AssertionsExecuted {
                scenario,
                count,
                failures,
            } => {
                let mut e = LogEntry::new(EventType::AssertionsExecuted, Severity::Info);
                e.scenario = Some(scenario);
                e.count = Some(count);
                e.ok = Some(failures == 0);
                e.details = Some(format!("failures={failures}"));
                e
            }
            Self::ExecutionError {
                scenario,
                code,
                message,
                contract_violation,
            } => {
                let severity = if contract_violation {
                    Severity::Critical
                } else {
                    Severity::Warning
                };
                let mut e = LogEntry::new(EventType::ExecutionError, severity);
                e.scenario = scenario;
                e.ok = Some(false);
                e.error_code = Some(code);
                e.error_message = Some(message);
                e
            }
            Self::StatusWritten { scenario, path, ok } => {
                let mut e = LogEntry::new(EventType::StatusWritten, Severity::Info);
                e.scenario = Some(scenario);
                e.path = Some(path.display().to_string());
                e.ok = Some(ok);
                e
            }
        }
    }
}

// ──────────────────── public handle ────────────────────

/// Thread-safe, cheaply-cloneable activity log.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    writer: Option<Arc<Mutex<JsonlWriter>>>,
}

impl ActivityLog {
    pub fn open(config: JsonlConfig) -> Self {
        Self {
            writer: Some(Arc::new(Mutex::new(JsonlWriter::open(config)))),
        }
    }

    /// A log that drops every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    pub fn record(&self, event: ActivityEvent) {
        if let Some(writer) = &self.writer {
            let mut writer = writer.lock();
            writer.write_entry(&event.into_entry());
            writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_log_accepts_events() {
        let log = ActivityLog::disabled();
        assert!(!log.is_enabled());
        log.record(ActivityEvent::ScenarioStarted {
            scenario: "a".to_string(),
        });
    }

    #[test]
    fn clones_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let log = ActivityLog::open(JsonlConfig {
            path: path.clone(),
            fallback_path: None,
            max_size_bytes: 1024 * 1024,
            max_rotated_files: 1,
        });
        let other = log.clone();
        log.record(ActivityEvent::MonitorStarted {
            monitor: "layers".to_string(),
            pid: 10,
            config_path: PathBuf::from("/tmp/cfg"),
        });
        other.record(ActivityEvent::ExecutionError {
            scenario: Some("Foo#bar".to_string()),
            code: "FLK-4002".to_string(),
            message: "no results".to_string(),
            contract_violation: true,
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "monitor_start");
        assert_eq!(lines[1]["event"], "execution_error");
        assert_eq!(lines[1]["severity"], "critical");
        assert_eq!(lines[1]["error_code"], "FLK-4002");
    }

    #[test]
    fn orphan_cleanup_warns_only_when_pids_found() {
        let quiet = ActivityEvent::OrphansCleaned {
            pids: vec![],
            origin: "registry",
        }
        .into_entry();
        assert_eq!(quiet.severity, Severity::Info);
        let noisy = ActivityEvent::OrphansCleaned {
            pids: vec![1, 2],
            origin: "pid_files",
        }
        .into_entry();
        assert_eq!(noisy.severity, Severity::Warning);
        assert_eq!(noisy.count, Some(2));
    }
}
