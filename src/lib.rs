//! Workspace umbrella crate.
//!
//! This crate exists to expose feature flags that map to the individual
//! workspace crates. Host applications can depend on `commander-workspace`
//! and pick a backend without wiring each crate individually:
//!
//! - `local` (default): the job engine and the local filesystem backend
//! - `memory`: the job engine and the in-memory backend

#[cfg(any(feature = "local", feature = "memory"))]
pub use core_jobs as jobs;

#[cfg(feature = "local")]
pub use provider_local as local;

#[cfg(feature = "memory")]
pub use provider_memory as memory;
