//! Deterministic simulation harness for the amoebot round engine.
//!
//! This crate is the "external collaborator" layer around `amoebot_core`:
//! it constructs initial particle systems, drives them round by round,
//! audits the engine invariants, and exports per-round snapshots.
//!
//! # Core Principle: one seed, one run
//!
//! All entropy (placement compasses, fuzzed movement requests) derives from
//! a single 64-bit seed through ChaCha8, and particles activate in stable
//! creation order, so any failure reproduces from its seed number.
//!
//! # Usage
//!
//! ```ignore
//! use amoebot_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 6).run(ScenarioId::ChainMarch);
//! assert!(result.passed);
//! ```

pub mod export;
pub mod layouts;
pub mod programs;
pub mod runner;
pub mod scenarios;

pub use export::SimExport;
pub use runner::{audit_snapshot, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
