//! FLK-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, FlickerError>;

/// Entity kinds a component matcher can be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Activity,
    Window,
    Layer,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Activity => "activity",
            Self::Window => "window",
            Self::Layer => "layer",
        })
    }
}

/// Top-level error type for the flicker collector.
#[derive(Debug, Error)]
pub enum FlickerError {
    #[error("[FLK-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[FLK-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[FLK-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[FLK-2001] tracer launch failed ({command}): {details}")]
    TracerLaunch { command: String, details: String },

    #[error("[FLK-2002] tracer did not report a process id: {output:?}")]
    PidParse { output: String },

    #[error("[FLK-2003] monitor {monitor} is {actual}, expected {expected}")]
    MonitorState {
        monitor: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("[FLK-2004] tracer pid {pid} still alive after {waited:?}")]
    StopTimeout { pid: i32, waited: Duration },

    #[error("[FLK-2005] signal delivery to pid {pid} failed: {details}")]
    Signal { pid: i32, details: String },

    #[error("[FLK-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[FLK-2102] trace parse failure for {path}: {details}")]
    TraceParse { path: PathBuf, details: String },

    #[error("[FLK-3001] {matcher} does not support {entity} entities")]
    UnsupportedMatcherOperation {
        matcher: &'static str,
        entity: EntityKind,
    },

    #[error("[FLK-3002] {matcher} matched {count} layers, expected at most one")]
    AmbiguousMatch { matcher: String, count: usize },

    #[error("[FLK-3003] invalid component pattern {pattern:?}: {details}")]
    InvalidPattern { pattern: String, details: String },

    #[error(
        "[FLK-4001] cannot aggregate {assertion}: group {found} does not match aggregate group {expected}"
    )]
    InvocationGroupMismatch {
        assertion: String,
        expected: String,
        found: String,
    },

    #[error("[FLK-4002] no results set for test {test}")]
    NoResultsForTest { test: String },

    #[error("[FLK-5001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[FLK-5900] runtime failure: {details}")]
    Runtime { details: String },
}

impl FlickerError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "FLK-1001",
            Self::MissingConfig { .. } => "FLK-1002",
            Self::ConfigParse { .. } => "FLK-1003",
            Self::TracerLaunch { .. } => "FLK-2001",
            Self::PidParse { .. } => "FLK-2002",
            Self::MonitorState { .. } => "FLK-2003",
            Self::StopTimeout { .. } => "FLK-2004",
            Self::Signal { .. } => "FLK-2005",
            Self::Serialization { .. } => "FLK-2101",
            Self::TraceParse { .. } => "FLK-2102",
            Self::UnsupportedMatcherOperation { .. } => "FLK-3001",
            Self::AmbiguousMatch { .. } => "FLK-3002",
            Self::InvalidPattern { .. } => "FLK-3003",
            Self::InvocationGroupMismatch { .. } => "FLK-4001",
            Self::NoResultsForTest { .. } => "FLK-4002",
            Self::Io { .. } => "FLK-5001",
            Self::Runtime { .. } => "FLK-5900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::StopTimeout { .. } | Self::Signal { .. } | Self::Runtime { .. }
        )
    }

    /// Matcher misuse and broken collector invariants. These point at a caller
    /// bug rather than a bad device or trace.
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedMatcherOperation { .. }
                | Self::AmbiguousMatch { .. }
                | Self::InvocationGroupMismatch { .. }
                | Self::NoResultsForTest { .. }
                | Self::MonitorState { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for an unsupported matcher/entity combination.
    #[must_use]
    pub const fn unsupported(matcher: &'static str, entity: EntityKind) -> Self {
        Self::UnsupportedMatcherOperation { matcher, entity }
    }
}

impl From<serde_json::Error> for FlickerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for FlickerError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
