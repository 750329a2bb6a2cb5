#![forbid(unsafe_code)]

//! flicker_collector: trace-driven verification of UI transitions.
//!
//! Four pieces work together:
//! 1. **Trace monitors** start and stop an external system tracer around a
//!    scenario and track its process so nothing leaks past a crash.
//! 2. **Component matchers** locate a logical UI component (an app, its
//!    splash screen, a SurfaceView background) inside a snapshot hierarchy.
//! 3. **Condition polling** synchronizes callers with asynchronous state.
//! 4. **Results collection** ties capture to a test's lifecycle, runs
//!    assertions on the captured trace and aggregates their outcomes.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use flicker_collector::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use flicker_collector::core::config::Config;
//! use flicker_collector::matchers::{ComponentMatcher, ComponentNameMatcher};
//! ```

pub mod prelude;

pub mod core;
pub mod hierarchy;
pub mod logger;
pub mod matchers;
pub mod results;
pub mod trace;
pub mod wait;
