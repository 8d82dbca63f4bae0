//! In-memory message inbox.
//!
//! Messages live for the lifetime of the process. Nothing is evicted;
//! retention belongs to whatever backend replaces this one.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

use super::types::{CanonicalMessage, InboxStats, MarkOutcome, NewMessage};
use super::{InboxError, MessageInbox};

/// Inbox backed by a vector in insertion order plus an id index.
#[derive(Default)]
pub struct MemoryInbox {
    inner: RwLock<InboxState>,
}

#[derive(Default)]
struct InboxState {
    messages: Vec<CanonicalMessage>,
    index: HashMap<String, usize>,
    last_created_at: Option<DateTime<Utc>>,
}

impl MemoryInbox {
    pub fn new() -> Self {
        Self::default()
    }

    async fn insert_at(
        &self,
        message: NewMessage,
        now: DateTime<Utc>,
    ) -> Result<CanonicalMessage, InboxError> {
        let mut state = self.inner.write().await;

        if state.index.contains_key(&message.id) {
            return Err(InboxError::DuplicateId(message.id));
        }

        // createdAt never goes backwards, even if the wall clock does
        let created_at = match state.last_created_at {
            Some(last) if last > now => last,
            _ => now,
        };

        let stored = CanonicalMessage::accept(message, created_at);
        let position = state.messages.len();
        state.index.insert(stored.id.clone(), position);
        state.messages.push(stored.clone());
        state.last_created_at = Some(created_at);

        info!(
            message_id = %stored.id,
            message_type = stored.origin.event_type(),
            inbox_size = state.messages.len(),
            "inbox_message_stored"
        );

        Ok(stored)
    }
}

#[async_trait]
impl MessageInbox for MemoryInbox {
    async fn insert(&self, message: NewMessage) -> Result<CanonicalMessage, InboxError> {
        self.insert_at(message, Utc::now()).await
    }

    async fn list_unprocessed_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CanonicalMessage>, InboxError> {
        let state = self.inner.read().await;

        let mut messages: Vec<CanonicalMessage> = state
            .messages
            .iter()
            .filter(|m| !m.processed)
            .filter(|m| since.map_or(true, |cutoff| m.created_at > cutoff))
            .cloned()
            .collect();

        // Stable sort: equal timestamps keep insertion order
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(messages)
    }

    async fn mark_processed(&self, id: &str) -> Result<MarkOutcome, InboxError> {
        let mut state = self.inner.write().await;

        let position = match state.index.get(id) {
            Some(&p) => p,
            None => return Ok(MarkOutcome::NotFound),
        };

        let message = &mut state.messages[position];
        if message.processed {
            return Ok(MarkOutcome::AlreadyProcessed);
        }

        message.processed = true;
        info!(message_id = %id, "inbox_message_processed");

        Ok(MarkOutcome::Marked)
    }

    async fn stats(&self) -> Result<InboxStats, InboxError> {
        let state = self.inner.read().await;

        Ok(InboxStats {
            total_messages: state.messages.len(),
            unprocessed_messages: state.messages.iter().filter(|m| !m.processed).count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbox::MessageOrigin;
    use chrono::{Duration, TimeZone};

    fn direct(id: &str, content: &str) -> NewMessage {
        NewMessage {
            id: id.to_string(),
            origin: MessageOrigin::Direct {
                sender_id: "U1".to_string(),
                sender_nickname: "Bob".to_string(),
            },
            content: content.to_string(),
            source_timestamp: 0,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[tokio::test]
    async fn test_insert_starts_unprocessed() {
        let inbox = MemoryInbox::new();
        let stored = inbox.insert(direct("m1", "hi")).await.unwrap();

        assert_eq!(stored.id, "m1");
        assert!(!stored.processed);
        assert_eq!(inbox.stats().await.unwrap().total_messages, 1);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let inbox = MemoryInbox::new();
        inbox.insert(direct("m1", "a")).await.unwrap();

        let err = inbox.insert(direct("m1", "b")).await.unwrap_err();
        assert!(matches!(err, InboxError::DuplicateId(id) if id == "m1"));
    }

    #[tokio::test]
    async fn test_created_at_never_decreases() {
        let inbox = MemoryInbox::new();
        let first = inbox.insert_at(direct("m1", "a"), at(10)).await.unwrap();
        let second = inbox.insert_at(direct("m2", "b"), at(5)).await.unwrap();

        assert_eq!(first.created_at, at(10));
        assert_eq!(second.created_at, at(10));
    }

    #[tokio::test]
    async fn test_list_newest_first_with_stable_ties() {
        let inbox = MemoryInbox::new();
        inbox.insert_at(direct("old", "a"), at(0)).await.unwrap();
        inbox.insert_at(direct("tie1", "b"), at(10)).await.unwrap();
        inbox.insert_at(direct("tie2", "c"), at(10)).await.unwrap();
        inbox.insert_at(direct("new", "d"), at(20)).await.unwrap();

        let ids: Vec<String> = inbox
            .list_unprocessed_since(None)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();

        assert_eq!(ids, vec!["new", "tie1", "tie2", "old"]);
    }

    #[tokio::test]
    async fn test_list_since_is_exclusive() {
        let inbox = MemoryInbox::new();
        inbox.insert_at(direct("a", "a"), at(0)).await.unwrap();
        inbox.insert_at(direct("b", "b"), at(10)).await.unwrap();
        inbox.insert_at(direct("c", "c"), at(20)).await.unwrap();

        let ids: Vec<String> = inbox
            .list_unprocessed_since(Some(at(10)))
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();

        assert_eq!(ids, vec!["c"]);
    }

    #[tokio::test]
    async fn test_processed_messages_are_hidden() {
        let inbox = MemoryInbox::new();
        inbox.insert(direct("a", "a")).await.unwrap();
        inbox.insert(direct("b", "b")).await.unwrap();

        assert_eq!(inbox.mark_processed("a").await.unwrap(), MarkOutcome::Marked);

        let listed = inbox.list_unprocessed_since(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed.iter().all(|m| !m.processed));

        let stats = inbox.stats().await.unwrap();
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.unprocessed_messages, 1);
    }

    #[tokio::test]
    async fn test_mark_processed_twice_is_idempotent() {
        let inbox = MemoryInbox::new();
        inbox.insert(direct("a", "a")).await.unwrap();

        assert_eq!(inbox.mark_processed("a").await.unwrap(), MarkOutcome::Marked);
        assert_eq!(
            inbox.mark_processed("a").await.unwrap(),
            MarkOutcome::AlreadyProcessed
        );
        assert!(inbox.list_unprocessed_since(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_processed_unknown_id() {
        let inbox = MemoryInbox::new();
        let outcome = inbox.mark_processed("missing").await.unwrap();

        assert_eq!(outcome, MarkOutcome::NotFound);
    }
}
