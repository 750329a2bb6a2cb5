//! Assertion results, aggregation, reporting, and the lifecycle collector.

pub mod aggregate;
pub mod assertion;
pub mod collector;
pub mod metrics;
pub mod report;
pub mod scenario;

pub use aggregate::AggregatedFlickerResult;
pub use assertion::{AssertionErrorRecord, AssertionResult, AssertionStatus, InvocationGroup};
pub use collector::ResultsCollector;
pub use metrics::DataRecord;
