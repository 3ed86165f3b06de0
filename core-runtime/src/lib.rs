//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the commander core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the file-handle layer, the
//! authenticator and the job engine depend on. It establishes the logging
//! conventions and the event broadcasting used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{AuthConfig, CoreConfig, JobConfig, MailConfig};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus};
