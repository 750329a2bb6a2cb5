#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_flicker") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "flicker.exe" } else { "flicker" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve flicker binary path for integration test"),
    }
}

/// Run the CLI with `args`, keeping a log of the invocation for failure triage.
pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("flicker-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let output = Command::new(&bin_path)
        .args(args)
        .env("FLICKER_OUTPUT_FORMAT", "human")
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute flicker command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Decoded trace the fake tracer writes as its output: the app layer is
/// hidden at 10ns and visible from 50ns, inside one `open` transition.
pub const LAUNCH_TRACE_JSON: &str = r#"{
  "layers": [
    {"timestamp_ns": 10, "layers": [
      {"name": "Display 0", "visible": true},
      {"name": "com.app/.Main", "visible": false, "parent": 0}
    ]},
    {"timestamp_ns": 50, "layers": [
      {"name": "Display 0", "visible": true},
      {"name": "com.app/.Main", "visible": true, "parent": 0}
    ]}
  ],
  "transitions": [
    {"kind": "open", "start_ns": 0, "end_ns": 100, "participants": ["com.app/.Main"]}
  ]
}"#;

/// Write an executable shell script standing in for the tracer binary.
///
/// It writes `LAUNCH_TRACE_JSON` to the path after `--out`, detaches a
/// `sleep` and prints its pid, the way the real tracer prints the pid of
/// its background session. Configure `tracer.command_name = "sleep"`.
#[cfg(unix)]
pub fn write_fake_tracer(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let trace_path = dir.join("launch_trace.json");
    fs::write(&trace_path, LAUNCH_TRACE_JSON).expect("write fake trace");

    let script = dir.join("fake_tracer.sh");
    let body = format!(
        r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --out) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
if [ -z "$out" ]; then
  echo "missing --out" >&2
  exit 2
fi
cp "{trace}" "$out"
sleep 30 </dev/null >/dev/null 2>&1 &
echo $!
"#,
        trace = trace_path.display()
    );
    fs::write(&script, body).expect("write fake tracer");
    let mut perms = fs::metadata(&script).expect("stat fake tracer").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&script, perms).expect("chmod fake tracer");
    script
}

/// Config file pointing every path into `dir` and the tracer at `tracer`.
pub fn write_config(dir: &Path, tracer: &Path) -> PathBuf {
    let config = format!(
        r#"[tracer]
binary = "{tracer}"
command_name = "sleep"
work_dir = "{work}"

[monitor]
stop_timeout_ms = 5000
liveness_poll_ms = 10
start_verify_retries = 3
start_verify_interval_ms = 20

[paths]
output_root = "{out}"
pid_track_dir = "{pids}"
activity_log = "{log}"
"#,
        tracer = tracer.display(),
        work = dir.join("work").display(),
        out = dir.join("out").display(),
        pids = dir.join("pids").display(),
        log = dir.join("activity.jsonl").display(),
    );
    let path = dir.join("flicker.toml");
    fs::write(&path, config).expect("write config");
    path
}
