//! # Local Filesystem Provider
//!
//! [`LocalBackend`] serves `file` locators with `tokio::fs`. The local disk
//! supports every capability, including random access and timestamp changes.

pub mod backend;

pub use backend::LocalBackend;
