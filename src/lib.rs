//! GRUVE: single-rig profit switcher.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod feed;
pub mod notify;
pub mod settings;
pub mod stats;
pub mod storage;
pub mod types;
pub mod util;
