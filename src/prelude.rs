//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use flicker_collector::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{FlickerError, Result};

// Snapshots
pub use crate::hierarchy::entities::{Activity, Layer, LayersSnapshot, Rect, Window};
pub use crate::hierarchy::tree::{Hierarchy, NodeId, NodeRef};

// Matchers
pub use crate::matchers::{
    ComponentMatcher, ComponentNameMatcher, OrMatcher, SplashScreenMatcher,
    SurfaceViewBackgroundMatcher, launching_app,
};

// Polling
pub use crate::wait::condition::{Condition, WaitCondition};

// Capture
pub use crate::trace::capture_config::{DataSource, TraceConfig};
pub use crate::trace::collector::{StoppedCapture, TracesCollector};
pub use crate::trace::monitor::{MonitorState, TraceMonitor};
pub use crate::trace::perfetto::PerfettoTraceMonitor;
pub use crate::trace::process::{LocalProcessControl, ProcessControl};
pub use crate::trace::registry::TracerRegistry;

// Results
pub use crate::results::scenario::{Scenario, TestDescription};
pub use crate::results::{
    AggregatedFlickerResult, AssertionResult, AssertionStatus, DataRecord, InvocationGroup,
    ResultsCollector,
};
