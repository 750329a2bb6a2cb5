//! Condition polling.

pub mod condition;
