//! Reported metrics.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::results::aggregate::AggregatedFlickerResult;
use crate::results::assertion::AssertionStatus;

pub const FAAS_STATUS: &str = "FAAS_STATUS";
pub const FAAS_RESULTS_FILE_PATH: &str = "FAAS_RESULTS_FILE_PATH";
pub const WINSCOPE_FILE_PATH: &str = "WINSCOPE_FILE_PATH";
pub const FLICKER_ASSERTIONS_COUNT: &str = "FLICKER_ASSERTIONS_COUNT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Ok,
    ExecutionError,
}

impl ExecutionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::ExecutionError => "EXECUTION_ERROR",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// String key/value metrics handed back to the test harness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRecord {
    metrics: BTreeMap<String, String>,
}

impl DataRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_string_metric(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metrics.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.metrics.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.metrics.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn set_status(&mut self, status: ExecutionStatus) {
        self.add_string_metric(FAAS_STATUS, status.as_str());
    }

    pub fn set_results_file(&mut self, path: &Path) {
        self.add_string_metric(FAAS_RESULTS_FILE_PATH, path.display().to_string());
    }

    pub fn set_trace_file(&mut self, path: &Path) {
        self.add_string_metric(WINSCOPE_FILE_PATH, path.display().to_string());
    }

    /// `<name>_<index>` → `0` (pass) / `1` (fail) for every result, skipping
    /// assumption violations, plus the total assertion count.
    pub fn add_assertion_metrics<'a>(
        &mut self,
        aggregates: impl IntoIterator<Item = (&'a String, &'a AggregatedFlickerResult)>,
    ) {
        let mut count = 0usize;
        for (name, aggregate) in aggregates {
            for (index, result) in aggregate.results().iter().enumerate() {
                let value = match result.status() {
                    AssertionStatus::Pass => "0",
                    AssertionStatus::Fail => "1",
                    AssertionStatus::AssumptionViolation => continue,
                };
                self.add_string_metric(format!("{name}_{index}"), value);
                count += 1;
            }
        }
        self.add_string_metric(FLICKER_ASSERTIONS_COUNT, count.to_string());
    }
}
