// === Public Modules (The Canonical Paths) ===
pub mod engine;
pub mod error;
pub mod executor;
pub mod num;
pub mod ops;
pub mod parser;
pub mod program;
pub mod result;
pub mod state;

// === Private Implementation Details ===
mod config;
mod rng;

// === Convenience ===
pub mod sorted_vec_map;

// === Facades (Re-exporting internals) ===
pub use crate::error::{CoreError, CoreResult};
pub use crate::executor::{CancellationToken, ProgressEvent, ScenarioExecutor};
pub use crate::parser::parse_program;
pub use crate::program::Program;
pub use crate::result::EngineResult;
