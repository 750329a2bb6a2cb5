//! Process control for external tracer binaries.
//!
//! [`ProcessControl`] is the seam between monitors and the OS: launching the
//! tracer, signalling it, probing liveness, and relocating its output.
//! [`LocalProcessControl`] talks to the real process table; [`MockProcessControl`]
//! simulates one for deterministic tests.

#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::core::errors::{FlickerError, Result};

/// OS abstraction used by tracer monitors and the tracer registry.
pub trait ProcessControl: Send + Sync + std::fmt::Debug {
    /// Run `program` to completion and return its stdout.
    fn launch(&self, program: &Path, args: &[OsString]) -> Result<String>;

    /// Send a termination signal. A pid that is already gone is not an error.
    fn terminate(&self, pid: i32) -> Result<()>;

    /// Whether `pid` is alive and belongs to a process named `command_name`.
    fn is_running(&self, pid: i32, command_name: &str) -> bool;

    /// Relocate a finished output file, creating parent directories.
    fn move_file(&self, from: &Path, to: &Path) -> Result<()>;
}

/// Parse the tracer's stdout as a single positive process id.
pub fn parse_pid(stdout: &str) -> Result<i32> {
    stdout
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|pid| *pid > 0)
        .ok_or_else(|| FlickerError::PidParse {
            output: stdout.to_string(),
        })
}

/// Poll `is_running` every `poll` until the process is gone. With no
/// `timeout` this waits for as long as the process lives.
pub fn wait_for_exit(
    process: &dyn ProcessControl,
    pid: i32,
    command_name: &str,
    poll: Duration,
    timeout: Option<Duration>,
) -> Result<Duration> {
    let started = Instant::now();
    while process.is_running(pid, command_name) {
        let waited = started.elapsed();
        if timeout.is_some_and(|limit| waited >= limit) {
            return Err(FlickerError::StopTimeout { pid, waited });
        }
        std::thread::sleep(poll);
    }
    Ok(started.elapsed())
}

// ──────────────────── local implementation ────────────────────

/// Real process control: `std::process` to spawn, `nix` to signal, `/proc`
/// for liveness.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalProcessControl;

impl LocalProcessControl {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ProcessControl for LocalProcessControl {
    fn launch(&self, program: &Path, args: &[OsString]) -> Result<String> {
        let command = format!("{} {}", program.display(), join_args(args));
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| FlickerError::TracerLaunch {
                command: command.clone(),
                details: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(FlickerError::TracerLaunch {
                command,
                details: format!(
                    "exit status {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    #[cfg(unix)]
    fn terminate(&self, pid: i32) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(FlickerError::Signal {
                pid,
                details: errno.desc().to_string(),
            }),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self, pid: i32) -> Result<()> {
        Err(FlickerError::Signal {
            pid,
            details: "signals are only supported on unix".to_string(),
        })
    }

    #[cfg(target_os = "linux")]
    fn is_running(&self, pid: i32, command_name: &str) -> bool {
        let proc_dir = PathBuf::from(format!("/proc/{pid}"));
        let Ok(stat) = fs::read_to_string(proc_dir.join("stat")) else {
            return false;
        };
        if matches!(proc_state(&stat), Some('Z' | 'X')) {
            return false;
        }
        if command_name.is_empty() {
            return true;
        }
        let comm = fs::read_to_string(proc_dir.join("comm")).unwrap_or_default();
        if comm.trim() == command_name {
            return true;
        }
        // comm is truncated to 15 bytes; fall back to argv[0].
        fs::read(proc_dir.join("cmdline"))
            .ok()
            .and_then(|raw| {
                raw.split(|b| *b == 0)
                    .next()
                    .map(|argv0| String::from_utf8_lossy(argv0).into_owned())
            })
            .is_some_and(|argv0| argv0.contains(command_name))
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn is_running(&self, pid: i32, _command_name: &str) -> bool {
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
    }

    #[cfg(not(unix))]
    fn is_running(&self, _pid: i32, _command_name: &str) -> bool {
        false
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| FlickerError::io(parent, e))?;
        }
        if fs::rename(from, to).is_ok() {
            return Ok(());
        }
        // Cross-device moves need a copy.
        fs::copy(from, to).map_err(|e| FlickerError::io(from, e))?;
        fs::remove_file(from).map_err(|e| FlickerError::io(from, e))
    }
}

/// Third field of `/proc/<pid>/stat`, after the parenthesized command.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn proc_state(stat: &str) -> Option<char> {
    let after_comm = &stat[stat.rfind(')')? + 1..];
    after_comm.trim_start().chars().next()
}

fn join_args(args: &[OsString]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

// ──────────────────── mock implementation ────────────────────

#[derive(Debug, Default)]
struct MockState {
    next_pid: i32,
    running: BTreeSet<i32>,
    launches: Vec<Vec<String>>,
    terminated: Vec<i32>,
    stubborn: BTreeSet<i32>,
    stdout_override: Option<String>,
    exit_after_polls: BTreeMap<i32, u32>,
}

/// In-memory process table for deterministic tests.
///
/// `launch` hands out increasing pids, writes a small file at the path given
/// after `--out`, and echoes the pid. `terminate` removes the pid from the
/// table unless it was marked stubborn.
#[derive(Debug)]
pub struct MockProcessControl {
    state: Mutex<MockState>,
}

impl Default for MockProcessControl {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProcessControl {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_pid: 1000,
                ..MockState::default()
            }),
        }
    }

    /// Make the next launches print `stdout` instead of a pid.
    pub fn set_stdout(&self, stdout: impl Into<String>) {
        self.state.lock().stdout_override = Some(stdout.into());
    }

    /// Ignore termination signals for `pid`.
    pub fn make_stubborn(&self, pid: i32) {
        self.state.lock().stubborn.insert(pid);
    }

    /// Pretend a process is alive, as if left behind by an earlier run.
    pub fn spawn_orphan(&self, pid: i32) {
        self.state.lock().running.insert(pid);
    }

    /// After termination, report `pid` alive for `polls` more liveness checks.
    pub fn linger(&self, pid: i32, polls: u32) {
        self.state.lock().exit_after_polls.insert(pid, polls);
    }

    #[must_use]
    pub fn launches(&self) -> Vec<Vec<String>> {
        self.state.lock().launches.clone()
    }

    #[must_use]
    pub fn terminated(&self) -> Vec<i32> {
        self.state.lock().terminated.clone()
    }

    #[must_use]
    pub fn running(&self) -> Vec<i32> {
        self.state.lock().running.iter().copied().collect()
    }
}

impl ProcessControl for MockProcessControl {
    fn launch(&self, program: &Path, args: &[OsString]) -> Result<String> {
        let mut argv = vec![program.display().to_string()];
        argv.extend(args.iter().map(|a| a.to_string_lossy().into_owned()));
        let out_path = argv
            .iter()
            .position(|a| a == "--out")
            .and_then(|i| argv.get(i + 1))
            .map(PathBuf::from);

        let mut state = self.state.lock();
        state.launches.push(argv);
        if let Some(stdout) = state.stdout_override.clone() {
            return Ok(stdout);
        }
        if let Some(out) = out_path {
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent).map_err(|e| FlickerError::io(parent, e))?;
            }
            fs::write(&out, b"mock-trace").map_err(|e| FlickerError::io(&out, e))?;
        }
        state.next_pid += 1;
        let pid = state.next_pid;
        state.running.insert(pid);
        Ok(format!("{pid}\n"))
    }

    fn terminate(&self, pid: i32) -> Result<()> {
        let mut state = self.state.lock();
        state.terminated.push(pid);
        if !state.stubborn.contains(&pid) && !state.exit_after_polls.contains_key(&pid) {
            state.running.remove(&pid);
        }
        Ok(())
    }

    fn is_running(&self, pid: i32, _command_name: &str) -> bool {
        let mut state = self.state.lock();
        let terminated = state.terminated.contains(&pid);
        if terminated {
            if let Some(remaining) = state.exit_after_polls.get_mut(&pid) {
                if *remaining == 0 {
                    state.exit_after_polls.remove(&pid);
                    state.running.remove(&pid);
                } else {
                    *remaining -= 1;
                }
            }
        }
        state.running.contains(&pid)
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        LocalProcessControl.move_file(from, to)
    }
}
