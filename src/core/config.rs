//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{FlickerError, Result};
use crate::trace::capture_config::TraceConfig;

/// Full collector configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub tracer: TracerConfig,
    pub monitor: MonitorConfig,
    pub collector: CollectorConfig,
    pub capture: TraceConfig,
    pub paths: PathsConfig,
}

/// How the external tracer binary is invoked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TracerConfig {
    /// Executable to spawn.
    pub binary: PathBuf,
    /// Name that must appear in the process table for a pid to count as alive.
    pub command_name: String,
    /// Directory the tracer can write its config and raw output into.
    pub work_dir: PathBuf,
    /// Use `--background-wait` (block until all data sources are live) instead of `--background`.
    pub background_wait: bool,
    /// Pass `--txt` so the tracer reads the config as text proto.
    pub text_config: bool,
}

/// Timing knobs for monitor start/stop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Upper bound for the post-signal liveness loop. `0` waits forever.
    pub stop_timeout_ms: u64,
    pub liveness_poll_ms: u64,
    pub start_verify_retries: u32,
    pub start_verify_interval_ms: u64,
    /// Sleep before spawning the tracer.
    pub start_wait_ms: u64,
    /// Sleep before signalling the tracer, so the last dump interval lands in the output.
    pub stop_wait_ms: u64,
}

/// Results-collector behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CollectorConfig {
    /// One scenario per run instead of one per test.
    pub collect_per_run: bool,
    pub report_only_for_passing_tests: bool,
    /// Passing tests only report the status key.
    pub skip_success_metrics: bool,
    pub output_prefix: String,
    /// Persist tracer pids to files so a crashed runner can be cleaned up later.
    pub persist_pid_tracking: bool,
}

/// Filesystem paths used by the collector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub output_root: PathBuf,
    pub pid_track_dir: PathBuf,
    pub activity_log: PathBuf,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("perfetto"),
            command_name: "perfetto".to_string(),
            work_dir: PathBuf::from("/data/misc/perfetto-traces"),
            background_wait: true,
            text_config: true,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 60_000,
            liveness_poll_ms: 50,
            start_verify_retries: 5,
            start_verify_interval_ms: 200,
            start_wait_ms: 0,
            stop_wait_ms: 0,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            collect_per_run: false,
            report_only_for_passing_tests: true,
            skip_success_metrics: false,
            output_prefix: "uiTrace_".to_string(),
            persist_pid_tracking: true,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[FLK-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("flicker").join("config.toml");
        let data = home_dir.join(".local").join("share").join("flicker");
        Self {
            config_file: cfg,
            output_root: data.join("traces"),
            pid_track_dir: data.join("pids"),
            activity_log: data.join("activity.jsonl"),
        }
    }
}

impl MonitorConfig {
    /// Bounded stop deadline, or `None` for the unbounded legacy behavior.
    #[must_use]
    pub fn stop_timeout(&self) -> Option<Duration> {
        (self.stop_timeout_ms > 0).then(|| Duration::from_millis(self.stop_timeout_ms))
    }

    #[must_use]
    pub fn liveness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_poll_ms)
    }

    #[must_use]
    pub fn start_verify_interval(&self) -> Duration {
        Duration::from_millis(self.start_verify_interval_ms)
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| FlickerError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(FlickerError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // tracer
        if let Some(raw) = lookup("FLICKER_TRACER_BINARY") {
            self.tracer.binary = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("FLICKER_TRACER_COMMAND_NAME") {
            self.tracer.command_name = raw;
        }
        if let Some(raw) = lookup("FLICKER_TRACER_WORK_DIR") {
            self.tracer.work_dir = PathBuf::from(raw);
        }
        set_bool(
            &mut lookup,
            "FLICKER_TRACER_BACKGROUND_WAIT",
            &mut self.tracer.background_wait,
        )?;
        set_bool(
            &mut lookup,
            "FLICKER_TRACER_TEXT_CONFIG",
            &mut self.tracer.text_config,
        )?;

        // monitor
        set_u64(
            &mut lookup,
            "FLICKER_MONITOR_STOP_TIMEOUT_MS",
            &mut self.monitor.stop_timeout_ms,
        )?;
        set_u64(
            &mut lookup,
            "FLICKER_MONITOR_LIVENESS_POLL_MS",
            &mut self.monitor.liveness_poll_ms,
        )?;
        if let Some(raw) = lookup("FLICKER_MONITOR_START_VERIFY_RETRIES") {
            self.monitor.start_verify_retries =
                raw.parse::<u32>().map_err(|error| FlickerError::ConfigParse {
                    context: "env",
                    details: format!("FLICKER_MONITOR_START_VERIFY_RETRIES={raw:?}: {error}"),
                })?;
        }
        set_u64(
            &mut lookup,
            "FLICKER_MONITOR_START_VERIFY_INTERVAL_MS",
            &mut self.monitor.start_verify_interval_ms,
        )?;
        set_u64(
            &mut lookup,
            "FLICKER_MONITOR_START_WAIT_MS",
            &mut self.monitor.start_wait_ms,
        )?;
        set_u64(
            &mut lookup,
            "FLICKER_MONITOR_STOP_WAIT_MS",
            &mut self.monitor.stop_wait_ms,
        )?;

        // collector
        set_bool(
            &mut lookup,
            "FLICKER_COLLECTOR_COLLECT_PER_RUN",
            &mut self.collector.collect_per_run,
        )?;
        set_bool(
            &mut lookup,
            "FLICKER_COLLECTOR_REPORT_ONLY_FOR_PASSING_TESTS",
            &mut self.collector.report_only_for_passing_tests,
        )?;
        set_bool(
            &mut lookup,
            "FLICKER_COLLECTOR_SKIP_SUCCESS_METRICS",
            &mut self.collector.skip_success_metrics,
        )?;
        if let Some(raw) = lookup("FLICKER_COLLECTOR_OUTPUT_PREFIX") {
            self.collector.output_prefix = raw;
        }
        set_bool(
            &mut lookup,
            "FLICKER_COLLECTOR_PERSIST_PID_TRACKING",
            &mut self.collector.persist_pid_tracking,
        )?;

        // paths
        if let Some(raw) = lookup("FLICKER_PATHS_OUTPUT_ROOT") {
            self.paths.output_root = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("FLICKER_PATHS_PID_TRACK_DIR") {
            self.paths.pid_track_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("FLICKER_PATHS_ACTIVITY_LOG") {
            self.paths.activity_log = PathBuf::from(raw);
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.tracer.binary.as_os_str().is_empty() {
            return Err(FlickerError::InvalidConfig {
                details: "tracer.binary must not be empty".to_string(),
            });
        }
        if self.tracer.command_name.trim().is_empty() {
            return Err(FlickerError::InvalidConfig {
                details: "tracer.command_name must not be empty".to_string(),
            });
        }
        if self.monitor.liveness_poll_ms == 0 {
            return Err(FlickerError::InvalidConfig {
                details: "monitor.liveness_poll_ms must be >= 1".to_string(),
            });
        }
        if self.monitor.stop_timeout_ms != 0
            && self.monitor.stop_timeout_ms < self.monitor.liveness_poll_ms
        {
            return Err(FlickerError::InvalidConfig {
                details: format!(
                    "monitor.stop_timeout_ms ({}) must be 0 or >= monitor.liveness_poll_ms ({})",
                    self.monitor.stop_timeout_ms, self.monitor.liveness_poll_ms
                ),
            });
        }
        if self
            .collector
            .output_prefix
            .contains(std::path::MAIN_SEPARATOR)
        {
            return Err(FlickerError::InvalidConfig {
                details: "collector.output_prefix must not contain a path separator".to_string(),
            });
        }
        self.capture.validate()?;
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_u64<F>(lookup: &mut F, name: &str, slot: &mut u64) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = raw.parse::<u64>().map_err(|error| FlickerError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_bool<F>(lookup: &mut F, name: &str, slot: &mut bool) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = raw.parse::<bool>().map_err(|error| FlickerError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Config, FlickerError};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn stop_timeout_zero_means_unbounded() {
        let mut cfg = Config::default();
        assert_eq!(cfg.monitor.stop_timeout(), Some(Duration::from_secs(60)));
        cfg.monitor.stop_timeout_ms = 0;
        assert_eq!(cfg.monitor.stop_timeout(), None);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn stop_timeout_shorter_than_poll_rejected() {
        let mut cfg = Config::default();
        cfg.monitor.liveness_poll_ms = 100;
        cfg.monitor.stop_timeout_ms = 10;
        let err = cfg.validate().expect_err("expected timeout validation error");
        assert!(err.to_string().contains("stop_timeout_ms"));
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let mut cfg = Config::default();
        cfg.monitor.liveness_poll_ms = 0;
        let err = cfg.validate().expect_err("expected poll validation error");
        match err {
            FlickerError::InvalidConfig { details } => {
                assert!(details.contains("liveness_poll_ms"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn stable_hash_changes_when_config_changes() {
        let cfg = Config::default();
        let hash_before = cfg.stable_hash().expect("hash should compute");
        let mut modified = Config::default();
        modified.monitor.liveness_poll_ms += 1;
        let hash_after = modified.stable_hash().expect("hash should compute");
        assert_ne!(hash_before, hash_after);
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        let overrides = vars(&[
            ("FLICKER_TRACER_BINARY", "/opt/bin/tracer"),
            ("FLICKER_MONITOR_STOP_TIMEOUT_MS", "2500"),
            ("FLICKER_COLLECTOR_COLLECT_PER_RUN", "true"),
            ("FLICKER_PATHS_OUTPUT_ROOT", "/tmp/flicker-out"),
        ]);
        cfg.apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect("env overrides should parse");
        assert_eq!(cfg.tracer.binary, PathBuf::from("/opt/bin/tracer"));
        assert_eq!(cfg.monitor.stop_timeout_ms, 2500);
        assert!(cfg.collector.collect_per_run);
        assert_eq!(cfg.paths.output_root, PathBuf::from("/tmp/flicker-out"));
    }

    #[test]
    fn malformed_env_override_is_parse_error() {
        let mut cfg = Config::default();
        let overrides = vars(&[("FLICKER_COLLECTOR_COLLECT_PER_RUN", "sometimes")]);
        let err = cfg
            .apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect_err("expected parse error");
        assert_eq!(err.code(), "FLK-1003");
        assert!(err.to_string().contains("FLICKER_COLLECTOR_COLLECT_PER_RUN"));
    }

    #[test]
    fn explicit_missing_path_is_error() {
        let err = Config::load(Some(Path::new("/nonexistent_flicker_dir/config.toml")))
            .expect_err("explicit missing file must fail");
        assert!(matches!(err, FlickerError::MissingConfig { .. }));
    }

    #[test]
    fn load_reads_toml_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[tracer]
binary = "/usr/local/bin/perfetto"
background_wait = false

[collector]
report_only_for_passing_tests = false

[[capture.data_sources]]
source = "transactions"
mode = "active"
"#,
        )
        .unwrap();
        let cfg = Config::load(Some(&path)).expect("config should load");
        assert_eq!(cfg.tracer.binary, PathBuf::from("/usr/local/bin/perfetto"));
        assert!(!cfg.tracer.background_wait);
        assert!(!cfg.collector.report_only_for_passing_tests);
        assert_eq!(cfg.capture.data_sources.len(), 1);
        assert_eq!(cfg.paths.config_file, path);
    }
}
