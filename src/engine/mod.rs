//! Core engine: the per-cycle asset lifecycle.

pub mod lifecycle;
pub mod report;

pub use lifecycle::{Collaborators, Lifecycle, LifecycleConfig};
pub use report::CycleReport;
