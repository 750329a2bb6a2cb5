//! Trace capture: tracer process lifecycle, monitors, artifacts and parsing.

pub mod artifact;
pub mod capture_config;
pub mod collector;
pub mod monitor;
pub mod parser;
pub mod perfetto;
pub mod process;
pub mod registry;
