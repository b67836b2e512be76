//! High-level entry points: sweep planning and whole-run coordination.

pub mod run;
pub mod sweep;
