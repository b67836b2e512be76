//! Calculation engine: configuration, solver invocation, working-directory
//! preparation, and the convergence loop.

pub mod config;
pub mod error;
pub mod invoker;
pub mod orchestrator;
pub mod prepare;
pub mod progress;
