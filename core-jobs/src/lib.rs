//! # Job Engine Module
//!
//! Long-running file operations executed in the background.
//!
//! ## Overview
//!
//! A [`Job`] drives a [`JobVariant`] over a [`FileSet`](core_vfs::FileSet) on
//! its own Tokio task. Controllers hold a [`JobHandle`] to start, pause,
//! resume and cancel it, poll its progress, and join it.
//!
//! ## Components
//!
//! - **State machine** (`job`): job identity, states, progress and reports
//! - **Engine** (`engine`): builder and worker loop
//! - **Decisions** (`decision`): Retry/Skip/SkipAll/Cancel handshake on per-file errors
//! - **Transfer** (`transfer`): chunked, cancellable data movement
//! - **Variants**: [`CopyJob`], [`DeleteJob`] and [`SendMailJob`]

pub mod context;
mod control;
pub mod copy;
pub mod decision;
pub mod delete;
pub mod engine;
pub mod error;
pub mod handle;
pub mod job;
pub mod mail;
pub mod transfer;
pub mod variant;

pub use context::JobContext;
pub use copy::CopyJob;
pub use decision::{ChannelErrorResolver, Decision, ErrorPrompt, ErrorResolver, FnErrorResolver};
pub use delete::DeleteJob;
pub use engine::{Job, Reauthentication};
pub use error::{JobError, Result};
pub use handle::JobHandle;
pub use job::{JobId, JobProgress, JobReport, JobState};
pub use mail::{MailMessage, RecipientList, SendMailJob};
pub use transfer::{transfer, ChunkSink, TransferOutcome, WriterSink};
pub use variant::{FileContext, JobVariant, Traversal};
