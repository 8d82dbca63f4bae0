//! Message inbox.
//!
//! The webhook router appends normalized messages; the polling client reads
//! the unprocessed ones and marks them processed once handled.
//!
//! ```text
//! QQ webhook → Router → normalize → MessageInbox ← Poller (list / mark processed)
//! ```

pub mod memory;
pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use memory::MemoryInbox;
pub use types::{
    CanonicalMessage, InboxStats, MarkOutcome, MessageOrigin, NewMessage,
    C2C_MESSAGE_CREATE, GROUP_AT_MESSAGE_CREATE,
};

#[derive(Debug, Error)]
pub enum InboxError {
    #[error("message id already exists: {0}")]
    DuplicateId(String),
}

/// Storage for canonical messages.
///
/// The inbox owns the `processed` flag and the `created_at` stamp; callers
/// own message creation.
#[async_trait]
pub trait MessageInbox: Send + Sync {
    /// Store a new message, stamping its ingestion time.
    async fn insert(&self, message: NewMessage) -> Result<CanonicalMessage, InboxError>;

    /// Unprocessed messages created strictly after `since`, newest first.
    async fn list_unprocessed_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CanonicalMessage>, InboxError>;

    /// Flip `processed` to true. Repeated calls are harmless.
    async fn mark_processed(&self, id: &str) -> Result<MarkOutcome, InboxError>;

    async fn stats(&self) -> Result<InboxStats, InboxError>;
}
