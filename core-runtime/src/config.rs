//! # Core Configuration Module
//!
//! Provides configuration for the commander core: job execution tuning,
//! authentication retry policy and the outgoing mail server used by the
//! send-mail job.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance. It enforces fail-fast validation so that jobs never start with a
//! nonsensical chunk size or an SMTP server without a sender.
//!
//! Configuration persistence is the host's concern. Hosts that keep mail
//! settings as flat key/value preferences can load them with
//! [`MailConfig::from_preferences`].
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, MailConfig};
//!
//! let config = CoreConfig::builder()
//!     .chunk_size(128 * 1024)
//!     .mail(
//!         MailConfig::new("smtp.example.com", "alice@example.com")
//!             .with_sender_name("Alice"),
//!     )
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Preference key holding the SMTP server host name.
pub const SMTP_SERVER_KEY: &str = "smtp_server";
/// Preference key holding the SMTP server port.
pub const SMTP_PORT_KEY: &str = "smtp_port";
/// Preference key holding the sender display name.
pub const SENDER_NAME_KEY: &str = "sender_name";
/// Preference key holding the sender mail address.
pub const SENDER_ADDRESS_KEY: &str = "sender_address";

/// Default SMTP port.
pub const DEFAULT_SMTP_PORT: u16 = 25;

const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Core configuration for the commander core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Job execution settings
    pub jobs: JobConfig,

    /// Authentication retry policy
    pub auth: AuthConfig,

    /// Outgoing mail server, absent until the user configures one
    pub mail: Option<MailConfig>,

    /// Capacity of the event bus ring buffer
    pub event_buffer_size: usize,
}

/// Settings applied to every job run by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Bytes read per chunk during transfers
    pub chunk_size: usize,

    /// Minimum number of bytes between two progress events for the same file
    pub progress_event_bytes: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            progress_event_bytes: 1024 * 1024,
        }
    }
}

impl JobConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_progress_event_bytes(mut self, bytes: u64) -> Self {
        self.progress_event_bytes = bytes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config(
                "Chunk size must be greater than 0 bytes".to_string(),
            ));
        }

        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::Config(format!(
                "Chunk size exceeds maximum of {} bytes",
                MAX_CHUNK_SIZE
            )));
        }

        Ok(())
    }
}

/// How many times a user is asked for credentials and when cached
/// credentials are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Maximum resolve attempts for one locator, including the first
    pub max_attempts: u32,

    /// Consecutive authentication failures that invalidate a cached credential
    pub failures_before_invalidate: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            failures_before_invalidate: 1,
        }
    }
}

impl AuthConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_failures_before_invalidate(mut self, failures: u32) -> Self {
        self.failures_before_invalidate = failures;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "Authentication attempts must be at least 1".to_string(),
            ));
        }
        if self.failures_before_invalidate == 0 {
            return Err(Error::Config(
                "Failures before invalidation must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outgoing mail server settings.
///
/// `Debug` is derived: the struct holds no secrets, SMTP authentication is
/// not part of the mail dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailConfig {
    /// SMTP server host name
    pub smtp_server: String,

    /// SMTP server port
    pub smtp_port: u16,

    /// Display name used in the `From` header
    pub sender_name: String,

    /// Address used in `MAIL FROM` and the `From` header
    pub sender_address: String,

    /// Name announced in `HELO`
    pub helo_name: String,

    /// Timeout for connecting and for every server reply
    #[serde(with = "duration_secs")]
    pub io_timeout: Duration,
}

impl MailConfig {
    pub fn new(smtp_server: impl Into<String>, sender_address: impl Into<String>) -> Self {
        Self {
            smtp_server: smtp_server.into(),
            smtp_port: DEFAULT_SMTP_PORT,
            sender_name: String::new(),
            sender_address: sender_address.into(),
            helo_name: "localhost".to_string(),
            io_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.smtp_port = port;
        self
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = name.into();
        self
    }

    pub fn with_helo_name(mut self, name: impl Into<String>) -> Self {
        self.helo_name = name.into();
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Builds a mail configuration from flat preferences.
    ///
    /// Returns `Ok(None)` when the server or sender address is missing,
    /// which hosts use to hide mail actions until mail is set up. A present
    /// but malformed port is an error.
    pub fn from_preferences(prefs: &HashMap<String, String>) -> Result<Option<Self>> {
        let server = prefs
            .get(SMTP_SERVER_KEY)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty());
        let address = prefs
            .get(SENDER_ADDRESS_KEY)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty());

        let (Some(server), Some(address)) = (server, address) else {
            return Ok(None);
        };

        let mut config = MailConfig::new(server, address);

        if let Some(name) = prefs.get(SENDER_NAME_KEY) {
            config.sender_name = name.trim().to_string();
        }

        if let Some(port) = prefs.get(SMTP_PORT_KEY).map(|p| p.trim()) {
            if !port.is_empty() {
                config.smtp_port = port.parse().map_err(|_| {
                    Error::Config(format!("Invalid {} value: {}", SMTP_PORT_KEY, port))
                })?;
            }
        }

        config.validate()?;
        Ok(Some(config))
    }

    /// Whether both the server and the sender are set.
    pub fn is_complete(&self) -> bool {
        !self.smtp_server.trim().is_empty() && !self.sender_address.trim().is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.smtp_server.trim().is_empty() {
            return Err(Error::Config("SMTP server cannot be empty".to_string()));
        }
        if self.smtp_port == 0 {
            return Err(Error::Config("SMTP port must be greater than 0".to_string()));
        }
        if !self.sender_address.contains('@') {
            return Err(Error::Config(format!(
                "Sender address is not a mail address: {}",
                self.sender_address
            )));
        }
        if self.io_timeout.is_zero() {
            return Err(Error::Config("Mail timeout must be greater than 0".to_string()));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            jobs: JobConfig::default(),
            auth: AuthConfig::default(),
            mail: None,
            event_buffer_size: 256,
        }
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Chunk size is within (0, 16 MiB]
    /// - Authentication policy allows at least one attempt
    /// - Mail settings, when present, name a server and a sender
    /// - Event buffer is non-empty
    pub fn validate(&self) -> Result<()> {
        self.jobs.validate()?;
        self.auth.validate()?;

        if let Some(mail) = &self.mail {
            mail.validate()?;
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the mail configuration or a [`Error::CapabilityMissing`]
    /// explaining how to enable mail.
    pub fn require_mail(&self) -> Result<&MailConfig> {
        self.mail.as_ref().ok_or_else(|| Error::CapabilityMissing {
            capability: "mail".to_string(),
            message: format!(
                "Set {} and {} to send files by mail",
                SMTP_SERVER_KEY, SENDER_ADDRESS_KEY
            ),
        })
    }
}

/// Builder for [`CoreConfig`].
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    jobs: Option<JobConfig>,
    chunk_size: Option<usize>,
    auth: Option<AuthConfig>,
    mail: Option<MailConfig>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Replaces the job settings.
    pub fn jobs(mut self, jobs: JobConfig) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Overrides the transfer chunk size only.
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = Some(bytes);
        self
    }

    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn mail(mut self, mail: MailConfig) -> Self {
        self.mail = Some(mail);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<CoreConfig> {
        let defaults = CoreConfig::default();

        let mut jobs = self.jobs.unwrap_or(defaults.jobs);
        if let Some(chunk_size) = self.chunk_size {
            jobs.chunk_size = chunk_size;
        }

        let config = CoreConfig {
            jobs,
            auth: self.auth.unwrap_or(defaults.auth),
            mail: self.mail,
            event_buffer_size: self.event_buffer_size.unwrap_or(defaults.event_buffer_size),
        };

        config.validate()?;

        Ok(config)
    }
}
