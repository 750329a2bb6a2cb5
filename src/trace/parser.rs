//! Decoded trace model and trace parsers.
//!
//! Binary tracer output is opaque to this crate. Parsers turn an artifact
//! into a [`ParsedTrace`]: time-ordered layer and window-manager snapshots
//! plus the transitions recorded during capture. [`JsonTraceParser`] reads a
//! pre-decoded `trace.json` placed in the artifact by an external decoder.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::core::errors::{FlickerError, Result};
use crate::hierarchy::entities::{LayersSnapshot, WindowManagerSnapshot};
use crate::trace::artifact::TraceArtifact;

pub const DECODED_TRACE_FILE: &str = "trace.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Open,
    Close,
    ToFront,
    ToBack,
    Change,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub kind: TransitionKind,
    pub start_ns: i64,
    pub end_ns: i64,
    /// Component names taking part in the transition.
    #[serde(default)]
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedTrace {
    #[serde(default)]
    pub layers: Vec<LayersSnapshot>,
    #[serde(default)]
    pub window_manager: Vec<WindowManagerSnapshot>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl ParsedTrace {
    /// Layer snapshots with `start_ns <= timestamp <= end_ns`.
    pub fn layers_between(&self, start_ns: i64, end_ns: i64) -> impl Iterator<Item = &LayersSnapshot> {
        self.layers
            .iter()
            .filter(move |s| s.timestamp_ns >= start_ns && s.timestamp_ns <= end_ns)
    }

    /// Most recent layer snapshot at or before `ts`.
    #[must_use]
    pub fn layers_at(&self, ts: i64) -> Option<&LayersSnapshot> {
        self.layers
            .iter()
            .filter(|s| s.timestamp_ns <= ts)
            .max_by_key(|s| s.timestamp_ns)
    }

    fn sort(&mut self) {
        self.layers.sort_by_key(|s| s.timestamp_ns);
        self.window_manager.sort_by_key(|s| s.timestamp_ns);
        self.transitions.sort_by_key(|t| t.start_ns);
    }
}

/// Turns a trace artifact into snapshots.
pub trait TraceParser: Send + Sync + std::fmt::Debug {
    fn parse(&self, artifact: &TraceArtifact) -> Result<ParsedTrace>;
}

#[derive(Debug, Clone)]
pub struct JsonTraceParser {
    file: String,
}

impl Default for JsonTraceParser {
    fn default() -> Self {
        Self {
            file: DECODED_TRACE_FILE.to_string(),
        }
    }
}

impl JsonTraceParser {
    pub fn with_file(file: impl Into<String>) -> Self {
        Self { file: file.into() }
    }
}

impl TraceParser for JsonTraceParser {
    fn parse(&self, artifact: &TraceArtifact) -> Result<ParsedTrace> {
        let bytes = artifact.read_file(&self.file)?;
        let mut trace: ParsedTrace =
            serde_json::from_slice(&bytes).map_err(|e| FlickerError::TraceParse {
                path: artifact.file_path(&self.file),
                details: e.to_string(),
            })?;
        for transition in &trace.transitions {
            if transition.end_ns < transition.start_ns {
                return Err(FlickerError::TraceParse {
                    path: artifact.file_path(&self.file),
                    details: format!(
                        "transition ends ({}) before it starts ({})",
                        transition.end_ns, transition.start_ns
                    ),
                });
            }
        }
        trace.sort();
        Ok(trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "layers": [
            {"timestamp_ns": 20, "layers": [{"name": "b", "visible": true}]},
            {"timestamp_ns": 10, "layers": [{"name": "a", "visible": true}]}
        ],
        "transitions": [
            {"kind": "open", "start_ns": 5, "end_ns": 25, "participants": ["com.app/.Main"]},
            {"kind": "pip_expand", "start_ns": 30, "end_ns": 40}
        ]
    }"#;

    fn artifact_with(json: &str) -> (tempfile::TempDir, TraceArtifact) {
        let dir = tempfile::tempdir().unwrap();
        let artifact = TraceArtifact::create(dir.path().join("a"), "s").unwrap();
        std::fs::write(artifact.file_path(DECODED_TRACE_FILE), json).unwrap();
        (dir, artifact)
    }

    #[test]
    fn parses_and_orders_snapshots() {
        let (_dir, artifact) = artifact_with(SAMPLE);
        let trace = JsonTraceParser::default().parse(&artifact).unwrap();
        assert_eq!(trace.layers[0].timestamp_ns, 10);
        assert_eq!(trace.transitions.len(), 2);
        assert_eq!(trace.transitions[1].kind, TransitionKind::Unknown);
        assert_eq!(trace.layers_between(5, 15).count(), 1);
        assert_eq!(trace.layers_at(19).unwrap().timestamp_ns, 10);
        assert!(trace.layers_at(1).is_none());
    }

    #[test]
    fn malformed_json_is_a_trace_parse_error() {
        let (_dir, artifact) = artifact_with("{ not json");
        let err = JsonTraceParser::default().parse(&artifact).unwrap_err();
        assert_eq!(err.code(), "FLK-2102");
    }

    #[test]
    fn backwards_transition_is_rejected() {
        let (_dir, artifact) =
            artifact_with(r#"{"transitions": [{"kind": "open", "start_ns": 9, "end_ns": 1}]}"#);
        assert!(JsonTraceParser::default().parse(&artifact).is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = TraceArtifact::create(dir.path().join("a"), "s").unwrap();
        let err = JsonTraceParser::default().parse(&artifact).unwrap_err();
        assert_eq!(err.code(), "FLK-5001");
    }
}
