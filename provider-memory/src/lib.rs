//! # In-Memory Provider
//!
//! [`MemoryBackend`] keeps a folder tree in memory and behaves like a remote
//! share: it offers sequential access only, can require a credential and can
//! be told to fail specific operations. Hosts use it for scratch volumes;
//! the job engine's tests use it to exercise authentication, error recovery
//! and cancellation without touching the disk.

pub mod backend;
mod streams;

pub use backend::{InjectedFailure, MemoryBackend, MEMORY_SCHEME};
