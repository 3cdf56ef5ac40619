//! Replication job engine for container image registries.
//!
//! Jobs copy (`transfer`) or remove (`delete`) a repository's tags on a
//! remote registry. Each job is driven by a [`StateMachine`] walking a
//! transition graph of [`State`]s, with one pluggable handler per state.
//! A [`WorkerPool`] reuses one machine per worker across jobs.

pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod joblog;
pub mod pool;
pub mod registry;
pub mod replication;
pub mod services;
pub mod state_machine;
pub mod store;
pub mod ui;

#[cfg(test)]
mod testing;

pub use pool::{Scheduler, WorkerPool};
pub use services::Services;
pub use state_machine::{Next, State, StateHandler, StateMachine};
