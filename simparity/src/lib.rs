//! Simparity: regular-vs-debug parity harness for instrumented simulators.
//!
//! Debug builds of a numerical simulator add instrumentation that dumps
//! intermediate fields (state, derivatives, reconstructions, ...) into
//! `output/debug/<category>/`. That instrumentation must be observationally
//! inert: the regular build and the debug build of the same case have to
//! produce the same simulation outputs.
//!
//! The harness runs both builds on one test case, archives each run's output
//! directory, checks that the debug build actually wrote instrumentation, and
//! compares every regular artifact against its debug counterpart.
//!
//! # Layout
//!
//! - **Parity** (`parity`): runner, workspace lifecycle, orchestration,
//!   artifact comparison, and the report.
//!
//! - **Config** (`config`): `HarnessConfig` from YAML with SIMPARITY_*
//!   environment overrides.
//!
//! - **Telemetry** (`telemetry`): optional JSONL event trace.

pub mod config;
pub mod parity;
pub mod telemetry;

// --- Re-exports for ergonomic external use ---------------------------------

pub use config::HarnessConfig;
pub use parity::{ComparisonDriver, ComparisonReport};
