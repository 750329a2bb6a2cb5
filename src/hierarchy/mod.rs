//! Hierarchical UI-state snapshots.

pub mod entities;
pub mod tree;
