//! Scenarios, scenario detection, and assertion generation.

#![allow(missing_docs)]

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::errors::Result;
use crate::hierarchy::entities::LayersSnapshot;
use crate::matchers::ComponentMatcher;
use crate::results::assertion::{
    AssertionErrorRecord, AssertionResult, AssertionStatus, InvocationGroup,
};
use crate::trace::parser::{ParsedTrace, TransitionKind};

// ──────────────────── test identity ────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestDescription {
    pub class_name: String,
    pub method_name: String,
}

impl TestDescription {
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }
}

impl fmt::Display for TestDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class_name, self.method_name)
    }
}

/// Replace every whitespace run with `#` so names are safe as path parts.
#[must_use]
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_space = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('#');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

// ──────────────────── scenario ────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioScope {
    Test(TestDescription),
    Run,
}

/// One bounded unit of trace capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    scope: ScenarioScope,
    invocation: u32,
    description: Option<String>,
}

impl Scenario {
    #[must_use]
    pub const fn for_test(test: TestDescription, invocation: u32) -> Self {
        Self {
            scope: ScenarioScope::Test(test),
            invocation,
            description: None,
        }
    }

    #[must_use]
    pub const fn for_run(invocation: u32) -> Self {
        Self {
            scope: ScenarioScope::Run,
            invocation,
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub const fn scope(&self) -> &ScenarioScope {
        &self.scope
    }

    #[must_use]
    pub const fn invocation(&self) -> u32 {
        self.invocation
    }

    /// Description override, or the scope's natural name.
    #[must_use]
    pub fn name(&self) -> String {
        if let Some(description) = &self.description {
            return description.clone();
        }
        match &self.scope {
            ScenarioScope::Test(test) => test.to_string(),
            ScenarioScope::Run => "run".to_string(),
        }
    }

    fn dir_stem(&self) -> String {
        match &self.scope {
            ScenarioScope::Test(test) => {
                format!("{}_{}", sanitize(&test.class_name), sanitize(&test.method_name))
            }
            ScenarioScope::Run => "run".to_string(),
        }
    }

    /// `<root>/<stem>/<prefix><stem>-<invocation>`.
    #[must_use]
    pub fn artifact_dir(&self, root: &Path, prefix: &str) -> PathBuf {
        let stem = self.dir_stem();
        root.join(&stem)
            .join(format!("{prefix}{stem}-{}", self.invocation))
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name(), self.invocation)
    }
}

// ──────────────────── detection ────────────────────

/// A transition found inside a captured trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedScenario {
    pub kind: TransitionKind,
    pub start_ns: i64,
    pub end_ns: i64,
    pub participants: Vec<String>,
}

impl fmt::Display for DetectedScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}[{}..{}]", self.kind, self.start_ns, self.end_ns)
    }
}

pub trait ScenarioDetector: Send + Sync + fmt::Debug {
    fn detect(&self, trace: &ParsedTrace) -> Result<Vec<DetectedScenario>>;
}

pub trait AssertionRunner: Send + Sync + fmt::Debug {
    fn run(&self, scenario: &DetectedScenario, trace: &ParsedTrace) -> Result<Vec<AssertionResult>>;
}

/// One detected scenario per recorded transition of an accepted kind.
#[derive(Debug, Clone)]
pub struct TransitionScenarioDetector {
    kinds: Vec<TransitionKind>,
}

impl Default for TransitionScenarioDetector {
    fn default() -> Self {
        Self::new([
            TransitionKind::Open,
            TransitionKind::Close,
            TransitionKind::ToFront,
            TransitionKind::ToBack,
            TransitionKind::Change,
        ])
    }
}

impl TransitionScenarioDetector {
    pub fn new(kinds: impl IntoIterator<Item = TransitionKind>) -> Self {
        let mut deduped: Vec<TransitionKind> = Vec::new();
        for kind in kinds {
            if !deduped.contains(&kind) {
                deduped.push(kind);
            }
        }
        Self { kinds: deduped }
    }
}

impl ScenarioDetector for TransitionScenarioDetector {
    fn detect(&self, trace: &ParsedTrace) -> Result<Vec<DetectedScenario>> {
        Ok(trace
            .transitions
            .iter()
            .filter(|t| self.kinds.contains(&t.kind))
            .map(|t| DetectedScenario {
                kind: t.kind,
                start_ns: t.start_ns,
                end_ns: t.end_ns,
                participants: t.participants.clone(),
            })
            .collect())
    }
}

// ──────────────────── built-in assertions ────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityExpectation {
    /// Visible in the last snapshot of the scenario.
    VisibleAtEnd,
    /// Not visible in any snapshot of the scenario.
    NeverVisible,
    /// Invisible at first, visible at the end, and never hidden again in between.
    BecomesVisible,
}

#[derive(Debug, Clone)]
pub struct VisibilityCheck {
    pub name: String,
    pub matcher: Arc<dyn ComponentMatcher>,
    pub expectation: VisibilityExpectation,
    pub group: InvocationGroup,
}

/// Evaluates component visibility over the layer snapshots of a scenario.
#[derive(Debug, Clone, Default)]
pub struct ComponentVisibilityAssertions {
    checks: Vec<VisibilityCheck>,
}

impl ComponentVisibilityAssertions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_check(
        mut self,
        name: impl Into<String>,
        matcher: impl ComponentMatcher + 'static,
        expectation: VisibilityExpectation,
        group: InvocationGroup,
    ) -> Self {
        self.checks.push(VisibilityCheck {
            name: name.into(),
            matcher: Arc::new(matcher),
            expectation,
            group,
        });
        self
    }

    fn visible_in(matcher: &dyn ComponentMatcher, snapshot: &LayersSnapshot) -> Result<bool> {
        matcher.layer_matches_any_of(&snapshot.visible_layers())
    }

    fn evaluate(check: &VisibilityCheck, snapshots: &[&LayersSnapshot]) -> Result<AssertionResult> {
        let (Some(first), Some(last)) = (snapshots.first(), snapshots.last()) else {
            return Ok(AssertionResult::new(
                &check.name,
                AssertionStatus::AssumptionViolation,
                check.group,
                vec![AssertionErrorRecord::new("no layer snapshot inside the scenario")],
            ));
        };
        let component = check.matcher.to_layer_identifier()?;
        let mut errors = Vec::new();
        match check.expectation {
            VisibilityExpectation::VisibleAtEnd => {
                if !Self::visible_in(check.matcher.as_ref(), last)? {
                    errors.push(
                        AssertionErrorRecord::new(format!("{component} is not visible at the end"))
                            .at(last.timestamp_ns),
                    );
                }
            }
            VisibilityExpectation::NeverVisible => {
                for snapshot in snapshots {
                    if Self::visible_in(check.matcher.as_ref(), snapshot)? {
                        errors.push(
                            AssertionErrorRecord::new(format!("{component} became visible"))
                                .at(snapshot.timestamp_ns),
                        );
                    }
                }
            }
            VisibilityExpectation::BecomesVisible => {
                if Self::visible_in(check.matcher.as_ref(), first)? {
                    errors.push(
                        AssertionErrorRecord::new(format!("{component} is already visible"))
                            .at(first.timestamp_ns),
                    );
                }
                let mut seen_visible = false;
                for snapshot in snapshots {
                    let visible = Self::visible_in(check.matcher.as_ref(), snapshot)?;
                    if seen_visible && !visible {
                        errors.push(
                            AssertionErrorRecord::new(format!(
                                "{component} disappeared after becoming visible"
                            ))
                            .at(snapshot.timestamp_ns),
                        );
                    }
                    seen_visible |= visible;
                }
                if !seen_visible {
                    errors.push(
                        AssertionErrorRecord::new(format!("{component} never became visible"))
                            .at(last.timestamp_ns),
                    );
                }
            }
        }
        Ok(if errors.is_empty() {
            AssertionResult::pass(&check.name, check.group)
        } else {
            AssertionResult::fail(&check.name, check.group, errors)
        })
    }
}

impl AssertionRunner for ComponentVisibilityAssertions {
    fn run(&self, scenario: &DetectedScenario, trace: &ParsedTrace) -> Result<Vec<AssertionResult>> {
        let snapshots: Vec<&LayersSnapshot> =
            trace.layers_between(scenario.start_ns, scenario.end_ns).collect();
        self.checks
            .iter()
            .map(|check| Self::evaluate(check, &snapshots))
            .collect()
    }
}
