//! Round keeper: drives a binary-outcome betting pool through repeated
//! bet → start → end cycles.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod affiliate;
pub mod chain;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod sampler;
pub mod types;
