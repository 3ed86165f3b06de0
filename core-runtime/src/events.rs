//! # Event Bus System
//!
//! Provides an event-driven architecture for the commander core using `tokio::sync::broadcast`.
//! Jobs, the authenticator and the host's configuration layer publish typed events that
//! any number of observers (progress dialogs, folder panels, caches) consume independently.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for the auth, job and config domains
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐
//! │ Job worker   ├──────────────>│           │     subscribe    ┌──────────────┐
//! └──────────────┘               │ EventBus  ├─────────────────>│ Progress UI  │
//! ┌──────────────┐     emit      │ (broadcast│                  └──────────────┘
//! │Authenticator ├──────────────>│  channel) │     subscribe    ┌──────────────┐
//! └──────────────┘               │           ├─────────────────>│ Label cache  │
//! ┌──────────────┐     emit      │           │                  └──────────────┘
//! │ Host config  ├──────────────>│           │
//! └──────────────┘               └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{ConfigEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Config(ConfigEvent::Changed {
//!         key: "smtp_server".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Config(_)));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Publishing never blocks a job: `emit` returns an error when nobody listens,
//! and publishers ignore it.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Credential prompts and authentication outcomes
    Auth(AuthEvent),
    /// Job lifecycle and progress
    Job(JobEvent),
    /// Host configuration changes
    Config(ConfigEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Job(e) => e.description(),
            CoreEvent::Config(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthenticationFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Job(JobEvent::FileFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Job(JobEvent::Interrupted {
                reason: Some(_), ..
            }) => EventSeverity::Error,
            CoreEvent::Job(JobEvent::Finished { .. }) => EventSeverity::Info,
            CoreEvent::Job(JobEvent::Started { .. }) => EventSeverity::Info,
            CoreEvent::Auth(AuthEvent::Authenticated { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Authentication Events
// ============================================================================

/// Events emitted while resolving locators that require credentials.
///
/// Locators are carried in their normalized form, which never includes a secret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// The user is being asked for credentials.
    CredentialsRequested {
        locator: String,
        /// Why the previous attempt failed, when known.
        reason: Option<String>,
    },
    /// A backend rejected the presented credentials.
    AuthenticationFailed {
        locator: String,
        reason: Option<String>,
        /// 1-based attempt number.
        attempt: u32,
    },
    /// Resolution succeeded with the given login.
    Authenticated { locator: String, login: String },
    /// A cached credential was dropped.
    CredentialsInvalidated { authority: String },
    /// The user dismissed the credential prompt.
    PromptCancelled { locator: String },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::CredentialsRequested { .. } => "Credentials requested",
            AuthEvent::AuthenticationFailed { .. } => "Authentication failed",
            AuthEvent::Authenticated { .. } => "Authenticated",
            AuthEvent::CredentialsInvalidated { .. } => "Cached credentials invalidated",
            AuthEvent::PromptCancelled { .. } => "Credential prompt cancelled",
        }
    }
}

// ============================================================================
// Job Events
// ============================================================================

/// Events emitted by background jobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum JobEvent {
    /// Job moved to Running for the first time.
    Started {
        job_id: String,
        /// Variant name such as "copy" or "send-mail".
        kind: String,
        total_files: u64,
    },
    /// Progress snapshot, emitted after each file and periodically during transfers.
    Progress {
        job_id: String,
        files_done: u64,
        total_files: u64,
        bytes_done: u64,
        total_bytes: u64,
        /// `None` while the total size is unknown.
        percent: Option<u8>,
        current_file: Option<String>,
    },
    /// Processing a file failed and a decision was taken.
    FileFailed {
        job_id: String,
        file: String,
        message: String,
        decision: String,
    },
    /// Job stopped at a file boundary.
    Paused { job_id: String },
    /// Job continued after a pause.
    Resumed { job_id: String },
    /// Every file was visited.
    Finished {
        job_id: String,
        files_done: u64,
        files_skipped: u64,
        files_failed: u64,
        bytes_done: u64,
    },
    /// Job stopped before visiting every file.
    Interrupted {
        job_id: String,
        /// Startup failure or fatal error; `None` for user cancellation.
        reason: Option<String>,
    },
}

impl JobEvent {
    fn description(&self) -> &str {
        match self {
            JobEvent::Started { .. } => "Job started",
            JobEvent::Progress { .. } => "Job in progress",
            JobEvent::FileFailed { .. } => "File processing failed",
            JobEvent::Paused { .. } => "Job paused",
            JobEvent::Resumed { .. } => "Job resumed",
            JobEvent::Finished { .. } => "Job finished",
            JobEvent::Interrupted { .. } => "Job interrupted",
        }
    }

    /// Identifier of the job that emitted the event.
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Started { job_id, .. }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::FileFailed { job_id, .. }
            | JobEvent::Paused { job_id }
            | JobEvent::Resumed { job_id }
            | JobEvent::Finished { job_id, .. }
            | JobEvent::Interrupted { job_id, .. } => job_id,
        }
    }
}

// ============================================================================
// Configuration Events
// ============================================================================

/// Published by the host when a preference changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ConfigEvent {
    Changed { key: String },
}

impl ConfigEvent {
    fn description(&self) -> &str {
        match self {
            ConfigEvent::Changed { .. } => "Configuration changed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for broadcasting events to multiple subscribers.
///
/// Cloning is cheap; all clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers that fall behind by more than `capacity` events receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let job_events = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Job(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events that match `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn job_started(job_id: &str) -> CoreEvent {
        CoreEvent::Job(JobEvent::Started {
            job_id: job_id.to_string(),
            kind: "copy".to_string(),
            total_files: 3,
        })
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(job_started("j1")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        assert_eq!(bus.emit(job_started("j1")).unwrap(), 2);

        assert_eq!(first.recv().await.unwrap(), job_started("j1"));
        assert_eq!(second.recv().await.unwrap(), job_started("j1"));
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Config(_)));

        bus.emit(job_started("j1")).unwrap();
        bus.emit(CoreEvent::Config(ConfigEvent::Changed {
            key: "smtp_server".to_string(),
        }))
        .unwrap();

        let event = stream.recv().await.unwrap();
        assert_eq!(
            event,
            CoreEvent::Config(ConfigEvent::Changed {
                key: "smtp_server".to_string()
            })
        );
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut receiver = bus.subscribe();

        for i in 0..5 {
            bus.emit(job_started(&format!("j{}", i))).unwrap();
        }

        assert!(matches!(receiver.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(
            CoreEvent::Job(JobEvent::Interrupted {
                job_id: "j".to_string(),
                reason: Some("server unreachable".to_string()),
            })
            .severity(),
            EventSeverity::Error
        );
        assert_eq!(
            CoreEvent::Job(JobEvent::Interrupted {
                job_id: "j".to_string(),
                reason: None,
            })
            .severity(),
            EventSeverity::Debug
        );
        assert_eq!(
            CoreEvent::Auth(AuthEvent::AuthenticationFailed {
                locator: "ftp://host/".to_string(),
                reason: None,
                attempt: 1,
            })
            .severity(),
            EventSeverity::Warning
        );
        assert!(EventSeverity::Error > EventSeverity::Info);
    }

    #[test]
    fn test_job_event_id() {
        let event = JobEvent::Paused {
            job_id: "abc".to_string(),
        };
        assert_eq!(event.job_id(), "abc");
        assert_eq!(CoreEvent::Job(event).description(), "Job paused");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Job(JobEvent::Progress {
            job_id: "j1".to_string(),
            files_done: 1,
            total_files: 2,
            bytes_done: 10,
            total_bytes: 20,
            percent: Some(50),
            current_file: Some("a.txt".to_string()),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Job\""));
        assert!(json.contains("\"event\":\"Progress\""));

        let restored: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, event);
    }
}
