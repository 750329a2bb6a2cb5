//! Ties trace capture and assertion evaluation to a test run's lifecycle.
//!
//! The hooks never fail: every error raised while capturing, parsing or
//! asserting is logged, written to the scenario's status file and turned into
//! an `EXECUTION_ERROR` status in the metrics. Matcher and aggregation
//! contract violations are flagged as such so they are not mistaken for
//! flaky infrastructure.

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::config::{CollectorConfig, Config};
use crate::core::errors::{FlickerError, Result};
use crate::logger::jsonl::JsonlConfig;
use crate::logger::{ActivityEvent, ActivityLog};
use crate::results::aggregate::AggregatedFlickerResult;
use crate::results::assertion::AssertionResult;
use crate::results::metrics::{DataRecord, ExecutionStatus};
use crate::results::report::StatusReport;
use crate::results::scenario::{
    AssertionRunner, ComponentVisibilityAssertions, DetectedScenario, Scenario, ScenarioDetector,
    TestDescription, TransitionScenarioDetector,
};
use crate::trace::artifact::{RunStatus, TraceArtifact};
use crate::trace::collector::TracesCollector;
use crate::trace::parser::{JsonTraceParser, TraceParser};
use crate::trace::perfetto::PerfettoTraceMonitor;
use crate::trace::process::ProcessControl;
use crate::trace::registry::TracerRegistry;

// ──────────────────── per-scenario state ────────────────────

#[derive(Debug)]
struct ActiveScenario {
    scenario: Scenario,
    test: Option<TestDescription>,
    /// Set when monitors failed to start; stop is skipped.
    start_failed: bool,
    /// Partial artifact from a failed start.
    aborted: Option<TraceArtifact>,
    /// Test failed, hit an assumption failure or was ignored.
    skipped: bool,
    errors: Vec<FlickerError>,
}

/// Everything one finished scenario produced.
#[derive(Debug, Default)]
struct ScenarioOutcome {
    artifact: Option<PathBuf>,
    status_file: Option<PathBuf>,
    detected: Vec<DetectedScenario>,
    results: Vec<AssertionResult>,
    aggregates: BTreeMap<String, AggregatedFlickerResult>,
    errors: Vec<FlickerError>,
    skipped: bool,
}

impl ScenarioOutcome {
    fn has_failures(&self) -> bool {
        self.results.iter().any(AssertionResult::failed)
    }
}

// ──────────────────── collector ────────────────────

#[derive(Debug)]
pub struct ResultsCollector {
    config: CollectorConfig,
    traces: TracesCollector,
    registry: Arc<TracerRegistry>,
    parser: Box<dyn TraceParser>,
    detector: Box<dyn ScenarioDetector>,
    runner: Box<dyn AssertionRunner>,
    log: ActivityLog,
    invocations: HashMap<TestDescription, u32>,
    run_invocation: u32,
    active: Option<ActiveScenario>,
    results_by_test: HashMap<TestDescription, Vec<AssertionResult>>,
    detected_by_test: HashMap<TestDescription, Vec<DetectedScenario>>,
    run_results: Vec<AssertionResult>,
    run_errors: Vec<FlickerError>,
}

impl ResultsCollector {
    pub fn new(
        config: CollectorConfig,
        traces: TracesCollector,
        registry: Arc<TracerRegistry>,
        log: ActivityLog,
    ) -> Self {
        Self {
            config,
            traces,
            registry,
            parser: Box::new(JsonTraceParser::default()),
            detector: Box::new(TransitionScenarioDetector::default()),
            runner: Box::new(ComponentVisibilityAssertions::new()),
            log,
            invocations: HashMap::new(),
            run_invocation: 0,
            active: None,
            results_by_test: HashMap::new(),
            detected_by_test: HashMap::new(),
            run_results: Vec::new(),
            run_errors: Vec::new(),
        }
    }

    /// Wire up the activity log, registry and a single perfetto monitor from
    /// configuration.
    pub fn from_config(config: &Config, process: Arc<dyn ProcessControl>) -> Result<Self> {
        let log = ActivityLog::open(JsonlConfig::at(config.paths.activity_log.clone()));
        let registry = Arc::new(TracerRegistry::from_config(config, process, log.clone()));
        let monitor = PerfettoTraceMonitor::from_config(config, Arc::clone(&registry))?;
        let traces = TracesCollector::new(
            config.paths.output_root.clone(),
            config.collector.output_prefix.clone(),
        )
        .with_monitor(monitor);
        Ok(Self::new(config.collector.clone(), traces, registry, log))
    }

    #[must_use]
    pub fn with_parser(mut self, parser: impl TraceParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    #[must_use]
    pub fn with_detector(mut self, detector: impl ScenarioDetector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    #[must_use]
    pub fn with_runner(mut self, runner: impl AssertionRunner + 'static) -> Self {
        self.runner = Box::new(runner);
        self
    }

    #[must_use]
    pub const fn traces(&self) -> &TracesCollector {
        &self.traces
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<TracerRegistry> {
        &self.registry
    }

    /// Assertion results recorded for `test`.
    pub fn results_for_test(&self, test: &TestDescription) -> Result<&[AssertionResult]> {
        self.results_by_test
            .get(test)
            .map(Vec::as_slice)
            .ok_or_else(|| FlickerError::NoResultsForTest {
                test: test.to_string(),
            })
    }

    #[must_use]
    pub fn detected_scenarios_for_test(&self, test: &TestDescription) -> Option<&[DetectedScenario]> {
        self.detected_by_test.get(test).map(Vec::as_slice)
    }

    /// Results of the per-run scenario.
    #[must_use]
    pub fn run_results(&self) -> &[AssertionResult] {
        &self.run_results
    }

    /// Errors raised while cleaning up before the run started that no
    /// scenario has reported yet. The next scenario to begin takes them over.
    #[must_use]
    pub fn run_errors(&self) -> &[FlickerError] {
        &self.run_errors
    }

    // ──────────────────── lifecycle hooks ────────────────────

    pub fn on_test_run_start(&mut self) {
        self.run_errors.clear();
        self.run_results.clear();
        self.results_by_test.clear();
        self.detected_by_test.clear();
        self.invocations.clear();
        self.active = None;

        let cleanup = [
            self.registry.stop_all_sessions().map(|_| ()),
            self.registry.cleanup_previous_runs().map(|_| ()),
            self.traces.cleanup_stale().map(|_| ()),
        ];
        for err in cleanup.into_iter().filter_map(std::result::Result::err) {
            self.report_error(None, &err);
            self.run_errors.push(err);
        }

        if self.config.collect_per_run {
            self.run_invocation += 1;
            let scenario = Scenario::for_run(self.run_invocation);
            self.begin(scenario, None);
        }
    }

    pub fn on_test_start(&mut self, test: &TestDescription) {
        if self.config.collect_per_run {
            return;
        }
        if let Some(mut stale) = self.active.take() {
            let err = FlickerError::Runtime {
                details: format!("{} started before {} ended", test, stale.scenario.name()),
            };
            self.report_error(Some(&stale.scenario.name()), &err);
            stale.errors.push(err);
            let stale_test = stale.test.clone();
            let outcome = self.finish(stale);
            if let Some(stale_test) = stale_test {
                self.record_outcome(&stale_test, outcome);
            }
        }
        let count = self.invocations.entry(test.clone()).or_insert(0);
        *count += 1;
        let scenario = Scenario::for_test(test.clone(), *count);
        self.begin(scenario, Some(test.clone()));
    }

    pub fn on_test_fail(&mut self, test: &TestDescription) {
        self.mark_skipped(test);
    }

    pub fn on_test_assumption_failure(&mut self, test: &TestDescription) {
        self.mark_skipped(test);
    }

    pub fn on_test_ignored(&mut self, test: &TestDescription) {
        self.mark_skipped(test);
    }

    pub fn on_test_end(&mut self, test: &TestDescription, record: &mut DataRecord) {
        if self.config.collect_per_run {
            return;
        }
        let active = match self.active.take() {
            Some(active) if active.test.as_ref() == Some(test) => active,
            other => {
                self.active = other;
                let err = FlickerError::Runtime {
                    details: format!("{test} ended without a matching start"),
                };
                self.report_error(Some(&test.to_string()), &err);
                record.set_status(ExecutionStatus::ExecutionError);
                return;
            }
        };
        let outcome = self.finish(active);
        self.emit_metrics(&outcome, record);
        self.record_outcome(test, outcome);
    }

    pub fn on_test_run_end(&mut self, record: &mut DataRecord) {
        if !self.config.collect_per_run {
            return;
        }
        let Some(active) = self.active.take() else {
            return;
        };
        let outcome = self.finish(active);
        self.emit_metrics(&outcome, record);
        self.run_results = outcome.results;
    }

    // ──────────────────── internals ────────────────────

    fn record_outcome(&mut self, test: &TestDescription, outcome: ScenarioOutcome) {
        self.detected_by_test.insert(test.clone(), outcome.detected);
        if !outcome.skipped {
            self.results_by_test.insert(test.clone(), outcome.results);
        }
    }

    fn mark_skipped(&mut self, test: &TestDescription) {
        if let Some(active) = self.active.as_mut() {
            if active.test.as_ref() == Some(test) {
                active.skipped = true;
            }
        }
    }

    fn begin(&mut self, scenario: Scenario, test: Option<TestDescription>) {
        let name = scenario.name();
        self.log
            .record(ActivityEvent::ScenarioStarted { scenario: name.clone() });
        let mut active = ActiveScenario {
            scenario,
            test,
            start_failed: false,
            aborted: None,
            skipped: false,
            errors: std::mem::take(&mut self.run_errors),
        };
        if let Err(err) = self.traces.start(&active.scenario) {
            self.report_error(Some(&name), &err);
            active.start_failed = true;
            active.aborted = self.traces.take_aborted();
            active.errors.push(err);
        }
        self.active = Some(active);
    }

    fn finish(&mut self, active: ActiveScenario) -> ScenarioOutcome {
        let name = active.scenario.name();
        let mut outcome = ScenarioOutcome {
            errors: active.errors,
            skipped: active.skipped && self.config.report_only_for_passing_tests,
            ..ScenarioOutcome::default()
        };

        let mut artifact = active.aborted;
        let mut captured = false;
        if !active.start_failed {
            match self.traces.stop() {
                Ok(stopped) => {
                    captured = stopped.error.is_none();
                    if let Some(err) = stopped.error {
                        self.report_error(Some(&name), &err);
                        outcome.errors.push(err);
                    }
                    artifact = Some(stopped.artifact);
                }
                Err(err) => {
                    self.report_error(Some(&name), &err);
                    outcome.errors.push(err);
                }
            }
        }

        if let Some(artifact) = artifact.as_ref().filter(|_| captured && !outcome.skipped) {
            if let Err(err) = self.evaluate(&name, artifact, &mut outcome) {
                self.report_error(Some(&name), &err);
                outcome.errors.push(err);
            }
        }

        if artifact.is_none() {
            match TraceArtifact::create(self.traces.artifact_dir(&active.scenario), &name) {
                Ok(created) => artifact = Some(created),
                Err(err) => {
                    self.report_error(Some(&name), &err);
                    outcome.errors.push(err);
                }
            }
        }
        let Some(mut artifact) = artifact else {
            return outcome;
        };

        let run_status = if !outcome.errors.is_empty() {
            RunStatus::ExecutionError
        } else if outcome.has_failures() {
            RunStatus::AssertionFailed
        } else {
            RunStatus::AssertionSuccess
        };
        if let Err(err) = artifact.tag_run_status(run_status) {
            self.report_error(Some(&name), &err);
            outcome.errors.push(err);
        }
        let status_dir = artifact.path().to_path_buf();
        outcome.artifact = Some(status_dir.clone());

        let report = StatusReport {
            scenario: name.clone(),
            artifact: outcome.artifact.clone(),
            execution_errors: &outcome.errors,
            results: &outcome.results,
        };
        let ok = report.status() == ExecutionStatus::Ok;
        match report.write_to(&status_dir) {
            Ok(path) => {
                self.log.record(ActivityEvent::StatusWritten {
                    scenario: name,
                    path: path.clone(),
                    ok,
                });
                outcome.status_file = Some(path);
            }
            Err(err) => {
                self.report_error(Some(&name), &err);
                outcome.errors.push(err);
            }
        }
        outcome
    }

    fn evaluate(
        &self,
        name: &str,
        artifact: &TraceArtifact,
        outcome: &mut ScenarioOutcome,
    ) -> Result<()> {
        let trace = self.parser.parse(artifact)?;
        outcome.detected = self.detector.detect(&trace)?;
        self.log.record(ActivityEvent::ScenariosDetected {
            scenario: name.to_string(),
            count: outcome.detected.len(),
        });

        for detected in &outcome.detected {
            for result in self.runner.run(detected, &trace)? {
                let aggregate = outcome
                    .aggregates
                    .entry(result.name().to_string())
                    .or_default();
                match aggregate.add_result(result.clone()) {
                    Ok(()) => outcome.results.push(result),
                    Err(err) => {
                        self.report_error(Some(name), &err);
                        outcome.errors.push(err);
                    }
                }
            }
        }

        self.log.record(ActivityEvent::AssertionsExecuted {
            scenario: name.to_string(),
            count: outcome.results.len(),
            failures: outcome.results.iter().filter(|r| r.failed()).count(),
        });
        Ok(())
    }

    fn emit_metrics(&self, outcome: &ScenarioOutcome, record: &mut DataRecord) {
        if !outcome.errors.is_empty() {
            record.set_status(ExecutionStatus::ExecutionError);
            if let Some(path) = &outcome.status_file {
                record.set_results_file(path);
            }
            if let Some(path) = &outcome.artifact {
                record.set_trace_file(path);
            }
            return;
        }
        record.set_status(ExecutionStatus::Ok);
        if outcome.skipped || (self.config.skip_success_metrics && !outcome.has_failures()) {
            return;
        }
        if let Some(path) = &outcome.status_file {
            record.set_results_file(path);
        }
        if let Some(path) = &outcome.artifact {
            record.set_trace_file(path);
        }
        record.add_assertion_metrics(&outcome.aggregates);
    }

    fn report_error(&self, scenario: Option<&str>, err: &FlickerError) {
        let contract_violation = err.is_contract_violation();
        eprintln!(
            "[FLK-COLLECT] {}{err}{}",
            scenario.map(|s| format!("{s}: ")).unwrap_or_default(),
            if contract_violation {
                " (contract violation)"
            } else {
                ""
            }
        );
        self.log.record(ActivityEvent::ExecutionError {
            scenario: scenario.map(str::to_string),
            code: err.code().to_string(),
            message: err.to_string(),
            contract_violation,
        });
    }
}
