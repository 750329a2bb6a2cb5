//! Assertion outcomes.

#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssertionStatus {
    Pass,
    Fail,
    /// A precondition of the assertion did not hold; neither pass nor fail.
    AssumptionViolation,
}

impl AssertionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::AssumptionViolation => "ASSUMPTION_VIOLATION",
        }
    }
}

impl fmt::Display for AssertionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stability classification. Results of different groups never aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvocationGroup {
    /// Stable assertions whose failure blocks.
    Blocking,
    /// New or flaky assertions reported for information only.
    NonBlocking,
}

impl InvocationGroup {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blocking => "BLOCKING",
            Self::NonBlocking => "NON_BLOCKING",
        }
    }
}

impl fmt::Display for InvocationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionErrorRecord {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ns: Option<i64>,
}

impl AssertionErrorRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp_ns: None,
        }
    }

    #[must_use]
    pub const fn at(mut self, timestamp_ns: i64) -> Self {
        self.timestamp_ns = Some(timestamp_ns);
        self
    }
}

/// Outcome of one assertion against one scenario. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionResult {
    name: String,
    status: AssertionStatus,
    group: InvocationGroup,
    errors: Vec<AssertionErrorRecord>,
}

impl AssertionResult {
    pub fn new(
        name: impl Into<String>,
        status: AssertionStatus,
        group: InvocationGroup,
        errors: Vec<AssertionErrorRecord>,
    ) -> Self {
        Self {
            name: name.into(),
            status,
            group,
            errors,
        }
    }

    pub fn pass(name: impl Into<String>, group: InvocationGroup) -> Self {
        Self::new(name, AssertionStatus::Pass, group, Vec::new())
    }

    pub fn fail(
        name: impl Into<String>,
        group: InvocationGroup,
        errors: Vec<AssertionErrorRecord>,
    ) -> Self {
        Self::new(name, AssertionStatus::Fail, group, errors)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn status(&self) -> AssertionStatus {
        self.status
    }

    #[must_use]
    pub const fn group(&self) -> InvocationGroup {
        self.group
    }

    #[must_use]
    pub fn errors(&self) -> &[AssertionErrorRecord] {
        &self.errors
    }

    #[must_use]
    pub fn failed(&self) -> bool {
        self.status == AssertionStatus::Fail
    }
}
