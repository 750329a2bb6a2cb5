//! Registry of live tracer processes.
//!
//! Every monitor that starts a tracer registers its pid here; stopping
//! unregisters it. `stop_all_sessions` is the last-resort sweep that makes
//! sure no tracer outlives its test. With pid tracking enabled each pid is
//! also written to `<pid_dir>/tracer_pid_<pid>.txt`, so a later run can find
//! tracers left behind by a crashed one.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::config::Config;
use crate::core::errors::{FlickerError, Result};
use crate::logger::{ActivityEvent, ActivityLog};
use crate::trace::process::{ProcessControl, parse_pid, wait_for_exit};

const PID_FILE_PREFIX: &str = "tracer_pid_";
const PID_FILE_SUFFIX: &str = ".txt";

/// How registered pids are stopped.
#[derive(Debug, Clone)]
pub struct StopPolicy {
    pub command_name: String,
    pub poll_interval: Duration,
    /// `None` waits for as long as the process lives.
    pub timeout: Option<Duration>,
}

impl StopPolicy {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            command_name: config.tracer.command_name.clone(),
            poll_interval: config.monitor.liveness_poll_interval(),
            timeout: config.monitor.stop_timeout(),
        }
    }
}

/// Mutex-guarded set of live tracer pids, shared by every monitor of a run.
#[derive(Debug)]
pub struct TracerRegistry {
    pids: Mutex<BTreeSet<i32>>,
    pid_dir: Option<PathBuf>,
    process: Arc<dyn ProcessControl>,
    policy: StopPolicy,
    log: ActivityLog,
}

impl TracerRegistry {
    pub fn new(
        process: Arc<dyn ProcessControl>,
        policy: StopPolicy,
        pid_dir: Option<PathBuf>,
        log: ActivityLog,
    ) -> Self {
        Self {
            pids: Mutex::new(BTreeSet::new()),
            pid_dir,
            process,
            policy,
            log,
        }
    }

    /// Build from configuration; pid files go to `paths.pid_track_dir` when
    /// `collector.persist_pid_tracking` is set.
    pub fn from_config(config: &Config, process: Arc<dyn ProcessControl>, log: ActivityLog) -> Self {
        let pid_dir = config
            .collector
            .persist_pid_tracking
            .then(|| config.paths.pid_track_dir.clone());
        Self::new(process, StopPolicy::from_config(config), pid_dir, log)
    }

    #[must_use]
    pub fn process(&self) -> &Arc<dyn ProcessControl> {
        &self.process
    }

    #[must_use]
    pub fn policy(&self) -> &StopPolicy {
        &self.policy
    }

    #[must_use]
    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn register(&self, pid: i32) {
        let mut pids = self.pids.lock();
        pids.insert(pid);
        if let Some(dir) = &self.pid_dir {
            if let Err(err) = write_pid_file(dir, pid) {
                eprintln!("[FLK-REGISTRY] could not persist pid {pid}: {err}");
            }
        }
    }

    pub fn unregister(&self, pid: i32) {
        let mut pids = self.pids.lock();
        pids.remove(&pid);
        if let Some(dir) = &self.pid_dir {
            let _ = fs::remove_file(pid_file_path(dir, pid));
        }
    }

    #[must_use]
    pub fn contains(&self, pid: i32) -> bool {
        self.pids.lock().contains(&pid)
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<i32> {
        self.pids.lock().iter().copied().collect()
    }

    /// Signal every registered pid, then wait for each to exit. Pids that
    /// exit are unregistered; the first failure is returned after all pids
    /// were attempted.
    pub fn stop_all_sessions(&self) -> Result<Vec<i32>> {
        let mut pids = self.pids.lock();
        let targets: Vec<i32> = pids.iter().copied().collect();
        let (stopped, first_error) = self.stop_pids(&targets);
        for pid in &stopped {
            pids.remove(pid);
            if let Some(dir) = &self.pid_dir {
                let _ = fs::remove_file(pid_file_path(dir, *pid));
            }
        }
        drop(pids);

        self.log.record(ActivityEvent::OrphansCleaned {
            pids: stopped.clone(),
            origin: "registry",
        });
        first_error.map_or(Ok(stopped), Err)
    }

    /// Stop tracers recorded in pid files by an earlier process. Every pid
    /// file is consumed whether or not its tracer is still alive.
    pub fn cleanup_previous_runs(&self) -> Result<Vec<i32>> {
        let Some(dir) = &self.pid_dir else {
            return Ok(Vec::new());
        };
        let mut recorded = Vec::new();
        for path in pid_files(dir)? {
            let contents = fs::read_to_string(&path).unwrap_or_default();
            let _ = fs::remove_file(&path);
            match parse_pid(&contents) {
                Ok(pid) => recorded.push(pid),
                Err(err) => {
                    eprintln!("[FLK-REGISTRY] ignoring {}: {err}", path.display());
                }
            }
        }

        let live: Vec<i32> = {
            let registered = self.pids.lock();
            recorded
                .into_iter()
                .filter(|pid| !registered.contains(pid))
                .filter(|pid| self.process.is_running(*pid, &self.policy.command_name))
                .collect()
        };
        let (stopped, first_error) = self.stop_pids(&live);
        self.log.record(ActivityEvent::OrphansCleaned {
            pids: stopped.clone(),
            origin: "pid_files",
        });
        first_error.map_or(Ok(stopped), Err)
    }

    fn stop_pids(&self, pids: &[i32]) -> (Vec<i32>, Option<FlickerError>) {
        let mut first_error = None;
        let mut signalled = Vec::with_capacity(pids.len());
        for &pid in pids {
            match self.process.terminate(pid) {
                Ok(()) => signalled.push(pid),
                Err(err) => {
                    eprintln!("[FLK-REGISTRY] failed to signal pid {pid}: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }

        let mut stopped = Vec::with_capacity(signalled.len());
        for pid in signalled {
            match wait_for_exit(
                self.process.as_ref(),
                pid,
                &self.policy.command_name,
                self.policy.poll_interval,
                self.policy.timeout,
            ) {
                Ok(_) => stopped.push(pid),
                Err(err) => {
                    eprintln!("[FLK-REGISTRY] pid {pid} did not exit: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }
        (stopped, first_error)
    }
}

// ──────────────────── pid files ────────────────────

fn pid_file_path(dir: &Path, pid: i32) -> PathBuf {
    dir.join(format!("{PID_FILE_PREFIX}{pid}{PID_FILE_SUFFIX}"))
}

fn write_pid_file(dir: &Path, pid: i32) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| FlickerError::io(dir, e))?;
    let path = pid_file_path(dir, pid);
    fs::write(&path, format!("{pid}\n")).map_err(|e| FlickerError::io(&path, e))
}

fn pid_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(FlickerError::io(dir, e)),
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(PID_FILE_PREFIX) && n.ends_with(PID_FILE_SUFFIX))
        })
        .collect();
    files.sort();
    Ok(files)
}
