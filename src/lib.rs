//! Driftline: drift change-set and snapshot engine
//!
//! Records filesystem-state drift for remotely managed resources as a
//! content-addressed, versioned change-set log, and reconstructs
//! point-in-time views by folding coverage baselines with drift deltas.

pub mod changelog;
pub mod changeset;
pub mod config;
pub mod content;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod snapshot;
pub mod sync;
pub mod template;
pub mod types;
