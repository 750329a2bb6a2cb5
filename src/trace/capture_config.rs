//! Declarative capture configuration: which data sources the tracer enables and how.
//!
//! Each [`DataSource`] is independent; a [`TraceConfig`] is just the list plus
//! buffer sizing. [`TraceConfig::to_text_proto`] renders the tracer's text
//! config format (passed with `--txt`).

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::core::errors::{FlickerError, Result};

pub const LAYERS_SOURCE: &str = "android.surfaceflinger.layers";
pub const TRANSACTIONS_SOURCE: &str = "android.surfaceflinger.transactions";
pub const WINDOW_MANAGER_SOURCE: &str = "android.windowmanager";
pub const PROTOLOG_SOURCE: &str = "android.protolog";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    Active,
    GeneratedBugreportOnly,
}

impl CaptureMode {
    fn proto_name(self) -> &'static str {
        match self {
            Self::Active => "MODE_ACTIVE",
            Self::GeneratedBugreportOnly => "MODE_GENERATED_BUGREPORT_ONLY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerTraceFlag {
    Input,
    Composition,
    Extra,
    Hwc,
    Buffers,
    VirtualDisplays,
}

impl LayerTraceFlag {
    fn proto_name(self) -> &'static str {
        match self {
            Self::Input => "TRACE_FLAG_INPUT",
            Self::Composition => "TRACE_FLAG_COMPOSITION",
            Self::Extra => "TRACE_FLAG_EXTRA",
            Self::Hwc => "TRACE_FLAG_HWC",
            Self::Buffers => "TRACE_FLAG_BUFFERS",
            Self::VirtualDisplays => "TRACE_FLAG_VIRTUAL_DISPLAYS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WmLogLevel {
    Verbose,
    Debug,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WmLogFrequency {
    Frame,
    Transaction,
    SingleDump,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtoLogLevel {
    Debug,
    Verbose,
    Info,
    Warn,
    Error,
    Wtf,
}

impl ProtoLogLevel {
    fn proto_name(self) -> &'static str {
        match self {
            Self::Debug => "PROTOLOG_LEVEL_DEBUG",
            Self::Verbose => "PROTOLOG_LEVEL_VERBOSE",
            Self::Info => "PROTOLOG_LEVEL_INFO",
            Self::Warn => "PROTOLOG_LEVEL_WARN",
            Self::Error => "PROTOLOG_LEVEL_ERROR",
            Self::Wtf => "PROTOLOG_LEVEL_WTF",
        }
    }
}

/// Per-group protolog override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtoLogGroupOverride {
    pub group: String,
    pub log_from: ProtoLogLevel,
    #[serde(default)]
    pub collect_stacktrace: bool,
}

/// One data source the tracer should enable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DataSource {
    Layers {
        mode: CaptureMode,
        #[serde(default)]
        flags: Vec<LayerTraceFlag>,
    },
    Transactions {
        mode: CaptureMode,
    },
    WindowManager {
        log_level: WmLogLevel,
        log_frequency: WmLogFrequency,
    },
    ProtoLog {
        #[serde(default)]
        default_level: Option<ProtoLogLevel>,
        #[serde(default)]
        group_overrides: Vec<ProtoLogGroupOverride>,
    },
}

impl DataSource {
    /// Layers with the flag set flicker assertions rely on.
    #[must_use]
    pub fn default_layers() -> Self {
        Self::Layers {
            mode: CaptureMode::Active,
            flags: vec![
                LayerTraceFlag::Input,
                LayerTraceFlag::Composition,
                LayerTraceFlag::Hwc,
                LayerTraceFlag::Buffers,
                LayerTraceFlag::VirtualDisplays,
            ],
        }
    }

    #[must_use]
    pub fn default_window_manager() -> Self {
        Self::WindowManager {
            log_level: WmLogLevel::Verbose,
            log_frequency: WmLogFrequency::Transaction,
        }
    }

    /// Name the tracer uses for this data source.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Layers { .. } => LAYERS_SOURCE,
            Self::Transactions { .. } => TRANSACTIONS_SOURCE,
            Self::WindowManager { .. } => WINDOW_MANAGER_SOURCE,
            Self::ProtoLog { .. } => PROTOLOG_SOURCE,
        }
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(out, "data_sources: {{");
        let _ = writeln!(out, "  config {{");
        let _ = writeln!(out, "    name: \"{}\"", self.name());
        match self {
            Self::Layers { mode, flags } => {
                let _ = writeln!(out, "    surfaceflinger_layers_config: {{");
                let _ = writeln!(out, "      mode: {}", mode.proto_name());
                let mut seen = HashSet::new();
                for flag in flags.iter().filter(|flag| seen.insert(**flag)) {
                    let _ = writeln!(out, "      trace_flags: {}", flag.proto_name());
                }
                let _ = writeln!(out, "    }}");
            }
            Self::Transactions { mode } => {
                let _ = writeln!(out, "    surfaceflinger_transactions_config: {{");
                let _ = writeln!(out, "      mode: {}", mode.proto_name());
                let _ = writeln!(out, "    }}");
            }
            Self::WindowManager {
                log_level,
                log_frequency,
            } => {
                let level = match log_level {
                    WmLogLevel::Verbose => "LOG_LEVEL_VERBOSE",
                    WmLogLevel::Debug => "LOG_LEVEL_DEBUG",
                    WmLogLevel::Critical => "LOG_LEVEL_CRITICAL",
                };
                let frequency = match log_frequency {
                    WmLogFrequency::Frame => "LOG_FREQUENCY_FRAME",
                    WmLogFrequency::Transaction => "LOG_FREQUENCY_TRANSACTION",
                    WmLogFrequency::SingleDump => "LOG_FREQUENCY_SINGLE_DUMP",
                };
                let _ = writeln!(out, "    windowmanager_config: {{");
                let _ = writeln!(out, "      log_level: {level}");
                let _ = writeln!(out, "      log_frequency: {frequency}");
                let _ = writeln!(out, "    }}");
            }
            Self::ProtoLog {
                default_level,
                group_overrides,
            } => {
                let _ = writeln!(out, "    protolog_config: {{");
                match default_level {
                    Some(level) => {
                        let _ = writeln!(out, "      default_log_from_level: {}", level.proto_name());
                    }
                    None => {
                        let _ = writeln!(out, "      tracing_mode: ENABLE_ALL");
                    }
                }
                for entry in group_overrides {
                    let _ = writeln!(out, "      group_overrides: {{");
                    let _ = writeln!(out, "        group_name: \"{}\"", escape(&entry.group));
                    let _ = writeln!(out, "        log_from: {}", entry.log_from.proto_name());
                    let _ = writeln!(
                        out,
                        "        collect_stacktrace: {}",
                        entry.collect_stacktrace
                    );
                    let _ = writeln!(out, "      }}");
                }
                let _ = writeln!(out, "    }}");
            }
        }
        let _ = writeln!(out, "  }}");
        let _ = writeln!(out, "}}");
    }
}

/// Full capture configuration handed to the tracer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub buffer_size_kb: u32,
    /// Hard tracer-side duration; `None` runs until signalled.
    pub duration_ms: Option<u64>,
    pub data_sources: Vec<DataSource>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            buffer_size_kb: 63_488,
            duration_ms: None,
            data_sources: vec![
                DataSource::default_layers(),
                DataSource::Transactions {
                    mode: CaptureMode::Active,
                },
                DataSource::default_window_manager(),
                DataSource::ProtoLog {
                    default_level: None,
                    group_overrides: Vec::new(),
                },
            ],
        }
    }
}

impl TraceConfig {
    /// Empty config; add sources with [`TraceConfig::with_source`].
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data_sources: Vec::new(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: DataSource) -> Self {
        self.data_sources.push(source);
        self
    }

    /// Reject configs the tracer would refuse or silently half-apply.
    pub fn validate(&self) -> Result<()> {
        if self.data_sources.is_empty() {
            return Err(FlickerError::InvalidConfig {
                details: "capture config enables no data sources".to_string(),
            });
        }
        if self.buffer_size_kb == 0 {
            return Err(FlickerError::InvalidConfig {
                details: "capture.buffer_size_kb must be > 0".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for source in &self.data_sources {
            if !seen.insert(source.name()) {
                return Err(FlickerError::InvalidConfig {
                    details: format!("data source {} configured twice", source.name()),
                });
            }
        }
        Ok(())
    }

    /// Render as tracer text proto.
    pub fn to_text_proto(&self) -> Result<String> {
        self.validate()?;
        let mut out = String::with_capacity(512);
        let _ = writeln!(out, "buffers: {{");
        let _ = writeln!(out, "  size_kb: {}", self.buffer_size_kb);
        let _ = writeln!(out, "  fill_policy: RING_BUFFER");
        let _ = writeln!(out, "}}");
        for source in &self.data_sources {
            source.render(&mut out);
        }
        if let Some(duration) = self.duration_ms {
            let _ = writeln!(out, "duration_ms: {duration}");
        }
        Ok(out)
    }
}

fn escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_renders_all_sources() {
        let text = TraceConfig::default().to_text_proto().unwrap();
        for name in [
            LAYERS_SOURCE,
            TRANSACTIONS_SOURCE,
            WINDOW_MANAGER_SOURCE,
            PROTOLOG_SOURCE,
        ] {
            assert!(text.contains(&format!("name: \"{name}\"")), "missing {name}");
        }
        assert!(text.contains("trace_flags: TRACE_FLAG_HWC"));
        assert!(text.contains("tracing_mode: ENABLE_ALL"));
        assert!(text.starts_with("buffers: {"));
    }

    #[test]
    fn duplicate_sources_rejected() {
        let config = TraceConfig::empty()
            .with_source(DataSource::default_layers())
            .with_source(DataSource::default_layers());
        let err = config.to_text_proto().expect_err("duplicate must fail");
        assert!(err.to_string().contains(LAYERS_SOURCE));
    }

    #[test]
    fn empty_config_rejected() {
        assert!(TraceConfig::empty().validate().is_err());
    }

    #[test]
    fn protolog_group_overrides_render() {
        let config = TraceConfig::empty().with_source(DataSource::ProtoLog {
            default_level: Some(ProtoLogLevel::Warn),
            group_overrides: vec![ProtoLogGroupOverride {
                group: "WM_SHELL_TRANSITIONS".to_string(),
                log_from: ProtoLogLevel::Verbose,
                collect_stacktrace: true,
            }],
        });
        let text = config.to_text_proto().unwrap();
        assert!(text.contains("default_log_from_level: PROTOLOG_LEVEL_WARN"));
        assert!(text.contains("group_name: \"WM_SHELL_TRANSITIONS\""));
        assert!(text.contains("log_from: PROTOLOG_LEVEL_VERBOSE"));
        assert!(text.contains("collect_stacktrace: true"));
        assert!(!text.contains("ENABLE_ALL"));
    }

    #[test]
    fn repeated_layer_flags_render_once() {
        let config = TraceConfig::empty().with_source(DataSource::Layers {
            mode: CaptureMode::Active,
            flags: vec![LayerTraceFlag::Input, LayerTraceFlag::Input],
        });
        let text = config.to_text_proto().unwrap();
        assert_eq!(text.matches("TRACE_FLAG_INPUT").count(), 1);
    }

    #[test]
    fn toml_round_trip_uses_source_tag() {
        let raw = r#"
buffer_size_kb = 1024
[[data_sources]]
source = "window_manager"
log_level = "debug"
log_frequency = "frame"
"#;
        let config: TraceConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.buffer_size_kb, 1024);
        assert_eq!(
            config.data_sources,
            vec![DataSource::WindowManager {
                log_level: WmLogLevel::Debug,
                log_frequency: WmLogFrequency::Frame,
            }]
        );
    }
}
