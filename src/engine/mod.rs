//! Core engine: lock, guards, generate config, restart, record.

pub mod config_gen;
pub mod decision;
pub mod executor;
pub mod lock;

pub use decision::{Decision, DecisionEngine};
