//! Drives a set of trace monitors around one scenario.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::errors::{FlickerError, Result};
use crate::results::scenario::Scenario;
use crate::trace::artifact::{TraceArtifact, is_artifact_dir};
use crate::trace::monitor::TraceMonitor;

#[derive(Debug)]
struct ActiveCapture {
    dir: PathBuf,
    scenario: String,
}

/// Result of [`TracesCollector::stop`]: the artifact holds every output that
/// could be collected, `error` the first monitor that failed to stop.
#[derive(Debug)]
pub struct StoppedCapture {
    pub artifact: TraceArtifact,
    pub error: Option<FlickerError>,
}

impl StoppedCapture {
    /// The artifact, or the stop error if any monitor failed.
    pub fn into_result(self) -> Result<TraceArtifact> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.artifact),
        }
    }
}

/// Starts every monitor for a scenario and gathers their output into one
/// [`TraceArtifact`].
#[derive(Debug)]
pub struct TracesCollector {
    monitors: Vec<Box<dyn TraceMonitor>>,
    output_root: PathBuf,
    prefix: String,
    active: Option<ActiveCapture>,
    aborted: Option<TraceArtifact>,
}

impl TracesCollector {
    pub fn new(output_root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            monitors: Vec::new(),
            output_root: output_root.into(),
            prefix: prefix.into(),
            active: None,
            aborted: None,
        }
    }

    #[must_use]
    pub fn with_monitor(mut self, monitor: impl TraceMonitor + 'static) -> Self {
        self.monitors.push(Box::new(monitor));
        self
    }

    pub fn add_monitor(&mut self, monitor: Box<dyn TraceMonitor>) {
        self.monitors.push(monitor);
    }

    #[must_use]
    pub fn monitors(&self) -> &[Box<dyn TraceMonitor>] {
        &self.monitors
    }

    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Untagged artifact directory for `scenario`.
    #[must_use]
    pub fn artifact_dir(&self, scenario: &Scenario) -> PathBuf {
        scenario.artifact_dir(&self.output_root, &self.prefix)
    }

    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.active.is_some()
    }

    /// Start all monitors in order. If one fails, monitors already started
    /// are stopped into the scenario's artifact, which is then available from
    /// [`take_aborted`](Self::take_aborted), and the first error is returned.
    pub fn start(&mut self, scenario: &Scenario) -> Result<()> {
        if let Some(active) = &self.active {
            return Err(FlickerError::Runtime {
                details: format!("capture for {} is still running", active.scenario),
            });
        }
        self.aborted = None;
        let dir = self.artifact_dir(scenario);

        let failed = self.monitors.iter_mut().find_map(|m| m.start().err());
        if let Some(err) = failed {
            self.aborted = self.abort_started(&dir, &scenario.name());
            return Err(err);
        }
        self.active = Some(ActiveCapture {
            dir,
            scenario: scenario.name(),
        });
        Ok(())
    }

    /// Artifact left behind by the last failed [`start`](Self::start).
    pub fn take_aborted(&mut self) -> Option<TraceArtifact> {
        self.aborted.take()
    }

    fn abort_started(&mut self, dir: &Path, scenario: &str) -> Option<TraceArtifact> {
        let mut artifact = match TraceArtifact::create(dir, scenario) {
            Ok(artifact) => Some(artifact),
            Err(err) => {
                eprintln!("[FLK-COLLECT] failed to create artifact for {scenario}: {err}");
                None
            }
        };
        if let Some(err) = self.stop_enabled(dir, artifact.as_mut()) {
            eprintln!("[FLK-COLLECT] failed to stop monitors after aborted start of {scenario}: {err}");
        }
        artifact
    }

    /// Stop running monitors in reverse order and build the artifact.
    ///
    /// Every monitor is stopped even when an earlier one fails; the first
    /// stop error is returned alongside the partial artifact. `Err` means
    /// nothing was capturing or the artifact directory could not be created.
    pub fn stop(&mut self) -> Result<StoppedCapture> {
        let Some(active) = self.active.take() else {
            return Err(FlickerError::Runtime {
                details: "no capture in progress".to_string(),
            });
        };
        match TraceArtifact::create(&active.dir, &active.scenario) {
            Ok(mut artifact) => {
                let error = self.stop_enabled(&active.dir, Some(&mut artifact));
                Ok(StoppedCapture { artifact, error })
            }
            Err(err) => {
                if let Some(stop_err) = self.stop_enabled(&active.dir, None) {
                    eprintln!(
                        "[FLK-COLLECT] failed to stop monitors for {}: {stop_err}",
                        active.scenario
                    );
                }
                Err(err)
            }
        }
    }

    fn stop_enabled(
        &mut self,
        dir: &Path,
        mut artifact: Option<&mut TraceArtifact>,
    ) -> Option<FlickerError> {
        let mut first_error = None;
        for monitor in self.monitors.iter_mut().rev() {
            if !monitor.is_enabled() {
                continue;
            }
            let file = monitor.output_file_name();
            let stopped = monitor.stop(&dir.join(&file)).and_then(|_| {
                match artifact.as_deref_mut() {
                    Some(artifact) => artifact.add_entry(monitor.name(), file),
                    None => Ok(()),
                }
            });
            if let Err(err) = stopped {
                first_error.get_or_insert(err);
            }
        }
        first_error
    }

    /// Remove artifacts left under the output root by earlier invocations.
    ///
    /// Only directories carrying a manifest are deleted (directly under the
    /// root or one level down); scenario directories left empty go too.
    pub fn cleanup_stale(&self) -> Result<usize> {
        cleanup_stale_artifacts(&self.output_root)
    }
}

pub fn cleanup_stale_artifacts(root: &Path) -> Result<usize> {
    let Ok(entries) = fs::read_dir(root) else {
        return Ok(0);
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if is_artifact_dir(&path) {
            remove_dir(&path)?;
            removed += 1;
            continue;
        }
        let Ok(children) = fs::read_dir(&path) else {
            continue;
        };
        for child in children.flatten() {
            let child = child.path();
            if child.is_dir() && is_artifact_dir(&child) {
                remove_dir(&child)?;
                removed += 1;
            }
        }
        let now_empty = fs::read_dir(&path).is_ok_and(|mut d| d.next().is_none());
        if now_empty {
            let _ = fs::remove_dir(&path);
        }
    }
    Ok(removed)
}

fn remove_dir(path: &Path) -> Result<()> {
    fs::remove_dir_all(path).map_err(|e| FlickerError::io(path, e))
}
