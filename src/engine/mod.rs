//! Core engine: the bet → start → end round cycle.
//!
//! `scheduler` fires `orchestrator` on a fixed cadence behind a
//! single-flight lock; the orchestrator drives `bettor` and `trigger`
//! through the phase sequence and reports into `stats`.

pub mod bettor;
pub mod orchestrator;
pub mod scheduler;
pub mod stats;
pub mod trigger;
