//! Polling client for the message inbox.
//!
//! The poller periodically fetches unprocessed messages from the edge API,
//! asks a [`Classifier`] whether each one is a task, files the tasks, and
//! marks every handled message processed. It runs as a spawned task
//! controlled through a [`PollerHandle`].

pub mod classify;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use url::Url;

use crate::inbox::CanonicalMessage;
use crate::relay::RelayRequest;
use crate::store::{Task, TaskOrigin};

pub use classify::{AcceptAll, Classifier, RelayClassifier, Verdict};

/// Maximum number of characters taken from a message for a task title.
const TITLE_MAX_CHARS: usize = 50;

/// The `since` cursor is moved back by this much so messages sharing the
/// cursor's `createdAt` are still returned. Processed ones are filtered out
/// by the inbox.
const SINCE_OVERLAP_MS: i64 = 1;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("invalid edge API base URL: {0}")]
    InvalidBase(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("edge API returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Task body posted for each converted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub source: String,
    pub title: String,
    pub detail: String,
    pub deadline: Option<String>,
    pub from: TaskOrigin,
}

impl TaskDraft {
    /// Build a task from a message and its verdict. Fields the verdict leaves
    /// out come from the content. Returns `None` for blank messages.
    pub fn from_message(message: &CanonicalMessage, verdict: &Verdict) -> Option<Self> {
        let content = message.content.trim();
        if content.is_empty() {
            return None;
        }

        Some(Self {
            source: message.origin.task_source().to_string(),
            title: verdict
                .title
                .clone()
                .unwrap_or_else(|| content.chars().take(TITLE_MAX_CHARS).collect()),
            detail: verdict.detail.clone().unwrap_or_else(|| content.to_string()),
            deadline: verdict.deadline.clone(),
            from: TaskOrigin {
                platform: "qq".to_string(),
                group_id: message.origin.group_id().map(str::to_string),
                sender: message.origin.sender_nickname().to_string(),
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct MessagesEnvelope {
    code: i64,
    #[serde(default)]
    data: Vec<CanonicalMessage>,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

/// HTTP client for the edge API.
#[derive(Clone)]
pub struct EdgeClient {
    http: Client,
    base: Url,
}

impl EdgeClient {
    /// `base` is the API prefix, e.g. `http://localhost:3000/api/edge`.
    pub fn new(http: Client, base: &str) -> Result<Self, PollError> {
        let base = Url::parse(base).map_err(|e| PollError::InvalidBase(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(PollError::InvalidBase(base.to_string()));
        }
        Ok(Self { http, base })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Unprocessed messages newer than `since`, newest first.
    pub async fn fetch_new_messages(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CanonicalMessage>, PollError> {
        let mut url = self.endpoint(&["messages"]);
        if let Some(since) = since {
            url.query_pairs_mut().append_pair("since", &since.to_rfc3339());
        }

        let response = self.http.get(url).send().await?;
        let response = ensure_success(response).await?;
        let envelope: MessagesEnvelope = response.json().await?;

        if envelope.code != 0 {
            return Err(PollError::Api {
                status: 200,
                message: format!("unexpected code {}", envelope.code),
            });
        }

        Ok(envelope.data)
    }

    /// Returns `false` when the message no longer exists.
    pub async fn mark_processed(&self, id: &str) -> Result<bool, PollError> {
        let url = self.endpoint(&["messages", id, "processed"]);
        let response = self.http.post(url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(response).await?;
        Ok(true)
    }

    pub async fn create_task(&self, draft: &TaskDraft) -> Result<Task, PollError> {
        let url = self.endpoint(&["tasks"]);
        let response = self.http.post(url).json(draft).send().await?;
        let response = ensure_success(response).await?;
        let envelope: DataEnvelope<Task> = response.json().await?;
        Ok(envelope.data)
    }

    /// Send a request through the AI relay route and return the upstream JSON.
    pub async fn relay(&self, request: &RelayRequest) -> Result<Value, PollError> {
        let url = self.endpoint(&["ali-api"]);
        let response = self.http.post(url).json(request).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, PollError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| status.to_string());

    Err(PollError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Counters for one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub fetched: usize,
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Repeating inbox poller.
pub struct Poller {
    client: EdgeClient,
    classifier: Arc<dyn Classifier>,
    interval: Duration,
    last_seen: Option<DateTime<Utc>>,
}

impl Poller {
    pub fn new(client: EdgeClient, classifier: Arc<dyn Classifier>, interval: Duration) -> Self {
        Self {
            client,
            classifier,
            interval,
            last_seen: None,
        }
    }

    /// `createdAt` of the newest message handled so far.
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    /// Fetch and convert one batch of messages, oldest first.
    ///
    /// A message that cannot be classified or filed stays unprocessed, and
    /// the cursor stops before it so the next poll sees it again.
    pub async fn poll_once(&mut self) -> Result<PollSummary, PollError> {
        let since = self
            .last_seen
            .map(|t| t - chrono::Duration::milliseconds(SINCE_OVERLAP_MS));
        let mut messages = self.client.fetch_new_messages(since).await?;
        messages.reverse();

        let mut summary = PollSummary {
            fetched: messages.len(),
            ..PollSummary::default()
        };
        let mut cursor_blocked = false;

        for message in &messages {
            match self.handle_message(message).await {
                Ok(true) => summary.converted += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "poller_message_failed");
                    summary.failed += 1;
                    cursor_blocked = true;
                    continue;
                }
            }

            if !cursor_blocked {
                self.last_seen = Some(message.created_at);
            }
        }

        if summary.fetched > 0 {
            info!(
                fetched = summary.fetched,
                converted = summary.converted,
                skipped = summary.skipped,
                failed = summary.failed,
                "poller_batch_complete"
            );
        }

        Ok(summary)
    }

    /// Returns whether a task was created.
    async fn handle_message(&self, message: &CanonicalMessage) -> Result<bool, PollError> {
        let created = if message.content.trim().is_empty() {
            info!(message_id = %message.id, "poller_blank_message_skipped");
            false
        } else {
            match self.classifier.classify(message.content.trim()).await? {
                Some(verdict) => self.file_task(message, &verdict).await?,
                None => {
                    info!(message_id = %message.id, "poller_not_a_task");
                    false
                }
            }
        };

        if !self.client.mark_processed(&message.id).await? {
            warn!(message_id = %message.id, "poller_message_vanished");
        }

        Ok(created)
    }

    async fn file_task(
        &self,
        message: &CanonicalMessage,
        verdict: &Verdict,
    ) -> Result<bool, PollError> {
        let Some(draft) = TaskDraft::from_message(message, verdict) else {
            return Ok(false);
        };

        let task = self.client.create_task(&draft).await?;
        info!(
            message_id = %message.id,
            task_id = %task.id,
            source = %task.source,
            "poller_task_created"
        );
        Ok(true)
    }

    /// Run the poller on a background task until the handle is stopped.
    pub fn spawn(mut self) -> PollerHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval_ms = self.interval.as_millis() as u64, "poller_started");

            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        info!("poller_stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.poll_once().await {
                            error!(error = %e, "poller_poll_failed");
                        }
                    }
                }
            }

            info!("poller_stopped");
        });

        PollerHandle {
            stop: Some(stop_tx),
            task,
        }
    }
}

/// Stop handle for a spawned [`Poller`]. Dropping it also stops the loop.
pub struct PollerHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Signal the loop and wait for it to exit. An in-flight poll finishes first.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!(error = %e, "poller_join_failed");
        }
    }
}
