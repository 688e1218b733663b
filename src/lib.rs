// lib.rs - Offline-first sync engine for design-business inventory
//
// Every user write succeeds locally, survives restarts, and eventually
// reconciles with the server. Conflicts are surfaced, not silently lost.

pub mod conflict;
pub mod context;
pub mod db;
pub mod engine;
pub mod media;
pub mod metadata;
pub mod models;
pub mod network;
pub mod queue;
pub mod remote;
pub mod services;

mod error;

#[cfg(test)]
mod engine_tests;
#[cfg(test)]
pub(crate) mod testutil;

pub use engine::{DrainReport, EngineConfig, SyncEngine};
pub use error::{Error, Result};

/// Install a tracing subscriber for hosts that do not bring their own.
/// Honors `RUST_LOG`; defaults to info.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
