//! # fdpb Core Library
//!
//! A library for automating iterative finite-difference Poisson-Boltzmann
//! electrostatics calculations on hydrogen-added protein structures, driving a
//! multi-stage external solver through its convergence loop and sweeping
//! calculation parameters (pH, ionic strength, dielectric constant, or any
//! titratable option) into a deterministic output tree.
//!
//! ## Architectural Philosophy
//!
//! The library is split into three layers with a strict dependency direction:
//!
//! - **[`core`]: The Foundation.** Stateless data models
//!   (`CalculationParameters`, `AtomRecord`), fixed-column structure parsing,
//!   structure-derived feature extraction, and fixed-format input-deck
//!   generation. Everything here is a pure function of its inputs.
//!
//! - **[`engine`]: The Process Layer.** External-binary invocation with
//!   output-text classification (the solver has no return-code contract), the
//!   per-calculation convergence-loop state machine, and the preparatory file
//!   emission each calculation needs in its working directory.
//!
//! - **[`workflows`]: The Public API.** Sweep planning (expanding a titration
//!   specification into collision-free output locations) and the run
//!   coordinator that executes one calculation per sweep point, strictly
//!   sequentially.

pub mod core;
pub mod engine;
pub mod workflows;
