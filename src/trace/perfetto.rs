//! Perfetto-backed trace monitor.
//!
//! `start` renders the capture config to a text proto in the tracer's work
//! directory, launches the tracer in background mode, reads the pid it prints,
//! confirms the pid is alive and registers it. `stop` signals the pid, polls
//! liveness until it exits (bounded by `monitor.stop_timeout_ms`), moves the
//! output to the requested location and removes the config file.

#![allow(missing_docs)]

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::core::config::{Config, MonitorConfig, TracerConfig};
use crate::core::errors::{FlickerError, Result};
use crate::logger::ActivityEvent;
use crate::trace::capture_config::{
    CaptureMode, DataSource, LayerTraceFlag, ProtoLogGroupOverride, ProtoLogLevel, TraceConfig,
    WmLogFrequency, WmLogLevel,
};
use crate::trace::monitor::{MonitorState, TraceMonitor};
use crate::trace::process::{parse_pid, wait_for_exit};
use crate::trace::registry::TracerRegistry;
use crate::wait::condition::WaitCondition;

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
struct Session {
    pid: i32,
    config_path: PathBuf,
    output_path: PathBuf,
    started: Instant,
}

#[derive(Debug)]
pub struct PerfettoTraceMonitor {
    name: String,
    capture: TraceConfig,
    tracer: TracerConfig,
    timing: MonitorConfig,
    registry: Arc<TracerRegistry>,
    session: Option<Session>,
}

impl PerfettoTraceMonitor {
    pub fn builder(registry: Arc<TracerRegistry>) -> PerfettoTraceMonitorBuilder {
        PerfettoTraceMonitorBuilder {
            name: "perfetto".to_string(),
            capture: TraceConfig::empty(),
            tracer: TracerConfig::default(),
            timing: MonitorConfig::default(),
            registry,
        }
    }

    /// Monitor for the capture configured in `config`.
    pub fn from_config(config: &Config, registry: Arc<TracerRegistry>) -> Result<Self> {
        Self::builder(registry)
            .tracer(config.tracer.clone())
            .timing(config.monitor.clone())
            .capture(config.capture.clone())
            .build()
    }

    #[must_use]
    pub fn capture(&self) -> &TraceConfig {
        &self.capture
    }

    /// Pid of the running tracer.
    #[must_use]
    pub fn pid(&self) -> Option<i32> {
        self.session.as_ref().map(|s| s.pid)
    }

    fn launch_args(&self, config_path: &Path, output_path: &Path) -> Vec<OsString> {
        let mode = if self.tracer.background_wait {
            "--background-wait"
        } else {
            "--background"
        };
        let mut args = vec![
            OsString::from(mode),
            OsString::from("--config"),
            config_path.as_os_str().to_owned(),
            OsString::from("--out"),
            output_path.as_os_str().to_owned(),
        ];
        if self.tracer.text_config {
            args.push(OsString::from("--txt"));
        }
        args
    }

    fn verify_alive(&self, pid: i32) -> bool {
        let process = self.registry.process();
        let command_name = self.tracer.command_name.as_str();
        WaitCondition::builder(|| process.is_running(pid, command_name))
            .with_predicate(format!("tracer pid {pid} is alive"), |alive| *alive)
            .with_retry_limit(self.timing.start_verify_retries)
            .spaced(self.timing.start_verify_interval())
            .on_failure(|_| {
                eprintln!("[FLK-MONITOR] tracer pid {pid} exited during startup");
            })
            .build()
            .wait_for()
    }
}

impl TraceMonitor for PerfettoTraceMonitor {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> MonitorState {
        if self.session.is_some() {
            MonitorState::Running
        } else {
            MonitorState::Stopped
        }
    }

    fn start(&mut self) -> Result<()> {
        self.state().require(&self.name, MonitorState::Stopped)?;
        let text_proto = self.capture.to_text_proto()?;

        if self.timing.start_wait_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.timing.start_wait_ms));
        }

        let work_dir = &self.tracer.work_dir;
        fs::create_dir_all(work_dir).map_err(|e| FlickerError::io(work_dir, e))?;
        let session_id = format!(
            "{}_{}_{}",
            self.name,
            std::process::id(),
            SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        );
        let config_path = work_dir.join(format!("{session_id}_trace_config.textproto"));
        let output_path = work_dir.join(format!("{session_id}.perfetto-trace"));
        fs::write(&config_path, text_proto).map_err(|e| FlickerError::io(&config_path, e))?;

        let launched = self
            .registry
            .process()
            .launch(&self.tracer.binary, &self.launch_args(&config_path, &output_path))
            .and_then(|stdout| parse_pid(&stdout));
        let pid = match launched {
            Ok(pid) => pid,
            Err(err) => {
                let _ = fs::remove_file(&config_path);
                return Err(err);
            }
        };

        // Registered before verification so a tracer that lingers after a
        // failed check is still swept by stop_all_sessions.
        self.registry.register(pid);
        if !self.verify_alive(pid) {
            self.registry.unregister(pid);
            let _ = fs::remove_file(&config_path);
            return Err(FlickerError::TracerLaunch {
                command: self.tracer.binary.display().to_string(),
                details: format!("tracer pid {pid} is not running after launch"),
            });
        }

        self.registry.log().record(ActivityEvent::MonitorStarted {
            monitor: self.name.clone(),
            pid,
            config_path: config_path.clone(),
        });
        self.session = Some(Session {
            pid,
            config_path,
            output_path,
            started: Instant::now(),
        });
        Ok(())
    }

    fn stop(&mut self, destination: &Path) -> Result<PathBuf> {
        self.state().require(&self.name, MonitorState::Running)?;
        let Some(session) = self.session.take() else {
            return Err(FlickerError::Runtime {
                details: format!("monitor {} lost its session", self.name),
            });
        };

        if self.timing.stop_wait_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.timing.stop_wait_ms));
        }

        let process = self.registry.process();
        let result = process.terminate(session.pid).and_then(|()| {
            wait_for_exit(
                process.as_ref(),
                session.pid,
                &self.tracer.command_name,
                self.timing.liveness_poll_interval(),
                self.timing.stop_timeout(),
            )
        });
        // A tracer that would not die stays registered for the sweep.
        if let Err(err) = result {
            let _ = fs::remove_file(&session.config_path);
            return Err(err);
        }
        self.registry.unregister(session.pid);

        let moved = process.move_file(&session.output_path, destination);
        let _ = fs::remove_file(&session.config_path);
        moved?;

        let duration_ms = u64::try_from(session.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.registry.log().record(ActivityEvent::MonitorStopped {
            monitor: self.name.clone(),
            pid: session.pid,
            artifact: destination.to_path_buf(),
            duration_ms,
        });
        Ok(destination.to_path_buf())
    }
}

/// Builder for [`PerfettoTraceMonitor`]. Per-source setters replace an
/// already configured source of the same kind.
#[derive(Debug)]
pub struct PerfettoTraceMonitorBuilder {
    name: String,
    capture: TraceConfig,
    tracer: TracerConfig,
    timing: MonitorConfig,
    registry: Arc<TracerRegistry>,
}

impl PerfettoTraceMonitorBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn tracer(mut self, tracer: TracerConfig) -> Self {
        self.tracer = tracer;
        self
    }

    #[must_use]
    pub fn timing(mut self, timing: MonitorConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Replace the whole capture configuration.
    #[must_use]
    pub fn capture(mut self, capture: TraceConfig) -> Self {
        self.capture = capture;
        self
    }

    #[must_use]
    pub fn buffer_size_kb(mut self, size_kb: u32) -> Self {
        self.capture.buffer_size_kb = size_kb;
        self
    }

    #[must_use]
    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.capture.duration_ms = Some(duration_ms);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: DataSource) -> Self {
        self.capture
            .data_sources
            .retain(|existing| existing.name() != source.name());
        self.capture.data_sources.push(source);
        self
    }

    #[must_use]
    pub fn enable_layers_trace(self, flags: impl IntoIterator<Item = LayerTraceFlag>) -> Self {
        self.with_source(DataSource::Layers {
            mode: CaptureMode::Active,
            flags: flags.into_iter().collect(),
        })
    }

    #[must_use]
    pub fn enable_transactions_trace(self) -> Self {
        self.with_source(DataSource::Transactions {
            mode: CaptureMode::Active,
        })
    }

    #[must_use]
    pub fn enable_window_manager_trace(
        self,
        log_level: WmLogLevel,
        log_frequency: WmLogFrequency,
    ) -> Self {
        self.with_source(DataSource::WindowManager {
            log_level,
            log_frequency,
        })
    }

    #[must_use]
    pub fn enable_protolog(
        self,
        default_level: Option<ProtoLogLevel>,
        group_overrides: Vec<ProtoLogGroupOverride>,
    ) -> Self {
        self.with_source(DataSource::ProtoLog {
            default_level,
            group_overrides,
        })
    }

    pub fn build(self) -> Result<PerfettoTraceMonitor> {
        if self.name.trim().is_empty() || self.name.contains(std::path::MAIN_SEPARATOR) {
            return Err(FlickerError::InvalidConfig {
                details: format!("invalid monitor name {:?}", self.name),
            });
        }
        self.capture.validate()?;
        Ok(PerfettoTraceMonitor {
            name: self.name,
            capture: self.capture,
            tracer: self.tracer,
            timing: self.timing,
            registry: self.registry,
            session: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::ActivityLog;
    use crate::trace::process::MockProcessControl;
    use crate::trace::registry::StopPolicy;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        mock: Arc<MockProcessControl>,
        registry: Arc<TracerRegistry>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let mock = Arc::new(MockProcessControl::new());
        let registry = Arc::new(TracerRegistry::new(
            mock.clone(),
            StopPolicy {
                command_name: "perfetto".to_string(),
                poll_interval: Duration::from_millis(1),
                timeout: Some(Duration::from_millis(50)),
            },
            None,
            ActivityLog::disabled(),
        ));
        Fixture {
            _dir: dir,
            root,
            mock,
            registry,
        }
    }

    fn monitor(f: &Fixture) -> PerfettoTraceMonitor {
        PerfettoTraceMonitor::builder(f.registry.clone())
            .name("layers")
            .tracer(TracerConfig {
                work_dir: f.root.join("work"),
                ..TracerConfig::default()
            })
            .timing(MonitorConfig {
                stop_timeout_ms: 50,
                liveness_poll_ms: 1,
                start_verify_retries: 0,
                start_verify_interval_ms: 1,
                ..MonitorConfig::default()
            })
            .enable_layers_trace([LayerTraceFlag::Input])
            .enable_transactions_trace()
            .build()
            .unwrap()
    }

    #[test]
    fn start_then_stop_toggles_enabled() {
        let f = fixture();
        let mut m = monitor(&f);
        assert!(!m.is_enabled());

        m.start().unwrap();
        assert!(m.is_enabled());
        let pid = m.pid().unwrap();
        assert!(f.registry.contains(pid));

        let dest = f.root.join("artifact/layers.perfetto-trace");
        let out = m.stop(&dest).unwrap();
        assert_eq!(out, dest);
        assert!(!m.is_enabled());
        assert!(dest.exists());
        assert!(!f.registry.contains(pid));
        assert_eq!(f.mock.terminated(), vec![pid]);
        // Config file is removed at stop.
        assert_eq!(fs::read_dir(f.root.join("work")).unwrap().count(), 0);
    }

    #[test]
    fn stop_while_stopped_is_rejected() {
        let f = fixture();
        let mut m = monitor(&f);
        let err = m.stop(&f.root.join("x")).unwrap_err();
        assert!(matches!(err, FlickerError::MonitorState { expected: "running", .. }));
    }

    #[test]
    fn double_start_is_rejected() {
        let f = fixture();
        let mut m = monitor(&f);
        m.start().unwrap();
        let err = m.start().unwrap_err();
        assert!(matches!(err, FlickerError::MonitorState { expected: "stopped", .. }));
        assert_eq!(f.mock.launches().len(), 1);
    }

    #[test]
    fn launch_uses_background_wait_and_text_config() {
        let f = fixture();
        let mut m = monitor(&f);
        m.start().unwrap();
        let argv = &f.mock.launches()[0];
        assert_eq!(argv[0], "perfetto");
        assert_eq!(argv[1], "--background-wait");
        assert_eq!(argv[2], "--config");
        assert!(argv[3].ends_with("_trace_config.textproto"));
        assert_eq!(argv[4], "--out");
        assert_eq!(argv.last().unwrap(), "--txt");
        let config = fs::read_to_string(&argv[3]).unwrap();
        assert!(config.contains("android.surfaceflinger.layers"));
        assert!(config.contains("TRACE_FLAG_INPUT"));
    }

    #[test]
    fn unparseable_pid_leaves_monitor_stopped() {
        let f = fixture();
        f.mock.set_stdout("Error: already running\n");
        let mut m = monitor(&f);
        let err = m.start().unwrap_err();
        assert_eq!(err.code(), "FLK-2002");
        assert!(!m.is_enabled());
        assert!(f.registry.snapshot().is_empty());
        assert_eq!(fs::read_dir(f.root.join("work")).unwrap().count(), 0);
    }

    #[test]
    fn stubborn_tracer_times_out_and_stays_registered() {
        let f = fixture();
        let mut m = monitor(&f);
        m.start().unwrap();
        let pid = m.pid().unwrap();
        f.mock.make_stubborn(pid);

        let err = m.stop(&f.root.join("out.trace")).unwrap_err();
        assert!(matches!(err, FlickerError::StopTimeout { .. }));
        assert!(!m.is_enabled());
        assert!(f.registry.contains(pid));
    }

    #[test]
    fn builder_replaces_same_source() {
        let f = fixture();
        let m = PerfettoTraceMonitor::builder(f.registry.clone())
            .enable_layers_trace([])
            .enable_layers_trace([LayerTraceFlag::Hwc])
            .build()
            .unwrap();
        assert_eq!(m.capture().data_sources.len(), 1);
    }

    #[test]
    fn builder_rejects_empty_capture() {
        let f = fixture();
        let err = PerfettoTraceMonitor::builder(f.registry.clone())
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "FLK-1001");
    }
}
