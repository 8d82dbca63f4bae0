//! Webhook and inbox endpoint handlers.
//!
//! The QQ webhook is the protocol-bearing route: it answers the callback
//! validation handshake with an Ed25519 signature and stores message events
//! in the inbox. Everything else here is thin glue over the inbox and relay.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRef, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::inbox::{MarkOutcome, MemoryInbox, MessageInbox};
use crate::process::{
    normalize, InboundEnvelope, QqEvent, ValidationChallenge, OP_CALLBACK_VALIDATION, OP_DISPATCH,
};
use crate::relay::{AiRelay, RelayRequest};
use crate::store::{MemoryRepository, MonitoredGroup, Plan, Repository, Task};
use crate::web::signature::{QqSigner, SignatureError};
use crate::Config;

/// Header carrying the platform's hex Ed25519 signature on event pushes.
pub const SIGNATURE_HEADER: &str = "x-signature-ed25519";

/// Header carrying the timestamp covered by the push signature.
pub const SIGNATURE_TIMESTAMP_HEADER: &str = "x-signature-timestamp";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub signer: Option<Arc<QqSigner>>,
    pub inbox: Arc<dyn MessageInbox>,
    pub tasks: Arc<dyn Repository<Task>>,
    pub plans: Arc<dyn Repository<Plan>>,
    pub groups: Arc<dyn Repository<MonitoredGroup>>,
    pub relay: AiRelay,
}

impl AppState {
    /// State backed by in-memory stores.
    pub fn new(config: Config) -> Self {
        let signer = config.qq_secret.as_ref().and_then(|secret| {
            match QqSigner::from_secret(secret.expose(), config.qq_seed_derivation) {
                Ok(signer) => Some(Arc::new(signer)),
                Err(e) => {
                    warn!(error = %e, "qq_signer_unavailable");
                    None
                }
            }
        });

        let relay = AiRelay::new(reqwest::Client::new(), config.ali_api_url.clone());

        Self {
            config: Arc::new(config),
            signer,
            inbox: Arc::new(MemoryInbox::new()),
            tasks: Arc::new(MemoryRepository::<Task>::new()),
            plans: Arc::new(MemoryRepository::<Plan>::new()),
            groups: Arc::new(MemoryRepository::<MonitoredGroup>::new()),
            relay,
        }
    }

    fn signer(&self) -> Result<&QqSigner, ApiError> {
        self.signer
            .as_deref()
            .ok_or(ApiError::Capability(SignatureError::EmptySecret))
    }
}

impl FromRef<AppState> for Arc<dyn Repository<Task>> {
    fn from_ref(state: &AppState) -> Self {
        state.tasks.clone()
    }
}

impl FromRef<AppState> for Arc<dyn Repository<Plan>> {
    fn from_ref(state: &AppState) -> Self {
        state.plans.clone()
    }
}

impl FromRef<AppState> for Arc<dyn Repository<MonitoredGroup>> {
    fn from_ref(state: &AppState) -> Self {
        state.groups.clone()
    }
}

/// Decode a JSON body in two steps so that syntax errors (500) and shape
/// errors (400) stay distinguishable.
pub(crate) fn json_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let value: Value = serde_json::from_slice(body)?;
    serde_json::from_value(value).map_err(|e| ApiError::Malformed(e.to_string()))
}

// =============================================================================
// Health / Status
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Service status for the front-end settings page.
pub async fn status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let stats = state.inbox.stats().await?;

    Ok(Json(json!({
        "code": 0,
        "data": {
            "secretConfigured": state.signer.is_some(),
            "verifyEvents": state.config.qq_verify_events,
            "totalMessages": stats.total_messages,
            "unprocessedMessages": stats.unprocessed_messages,
        }
    })))
}

// =============================================================================
// QQ Webhook
// =============================================================================

/// Answer to the callback validation challenge.
#[derive(Debug, Serialize)]
pub struct SignatureResponse {
    pub plain_token: String,
    pub signature: String,
}

/// QQ webhook endpoint.
///
/// This endpoint:
/// 1. Reads `op` before touching the payload
/// 2. Signs validation challenges (`op = 13`)
/// 3. Normalizes and stores message events (`op = 0`)
/// 4. Acknowledges anything else with 200
pub async fn qq_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let envelope = InboundEnvelope::from_value(serde_json::from_slice::<Value>(&body)?);

    info!(
        op = ?envelope.op,
        event_type = ?envelope.t,
        body_length = body.len(),
        "qq_webhook_received"
    );

    match envelope.op {
        Some(OP_CALLBACK_VALIDATION) => validate_callback(&state, envelope.d),
        Some(OP_DISPATCH) => {
            if state.config.qq_verify_events {
                verify_push(&state, &headers, &body)?;
            }
            dispatch_event(&state, envelope.t, envelope.d).await
        }
        other => {
            info!(op = ?other, "qq_op_acknowledged");
            Ok(acknowledge("received"))
        }
    }
}

fn acknowledge(message: &str) -> Response {
    Json(json!({ "code": 0, "message": message })).into_response()
}

fn validate_callback(state: &AppState, d: Option<Value>) -> Result<Response, ApiError> {
    let challenge = ValidationChallenge::from_payload(d);

    if !challenge.is_complete() {
        warn!(
            has_plain_token = !challenge.plain_token.is_empty(),
            has_event_ts = !challenge.event_ts.is_empty(),
            "qq_validation_missing_fields"
        );
        return Err(ApiError::Malformed("Missing validation fields".to_string()));
    }

    let signature = state
        .signer()?
        .sign(&challenge.event_ts, &challenge.plain_token);

    info!(
        event_ts = %challenge.event_ts,
        signature_length = signature.len(),
        "qq_validation_signed"
    );

    Ok(Json(SignatureResponse {
        plain_token: challenge.plain_token,
        signature,
    })
    .into_response())
}

fn verify_push(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), ApiError> {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };

    let signature = header_value(SIGNATURE_HEADER);
    let timestamp = header_value(SIGNATURE_TIMESTAMP_HEADER);

    if state.signer()?.verify(&timestamp, body, &signature) {
        Ok(())
    } else {
        warn!("qq_push_signature_rejected");
        Err(ApiError::Unauthorized("Invalid signature".to_string()))
    }
}

async fn dispatch_event(
    state: &AppState,
    t: Option<String>,
    d: Option<Value>,
) -> Result<Response, ApiError> {
    let event_type = t.clone().unwrap_or_default();
    let event = QqEvent::parse(t, d)
        .map_err(|e| ApiError::Malformed(format!("invalid {} payload: {}", event_type, e)))?;

    match normalize(event, Utc::now()) {
        Some(message) => {
            let stored = state.inbox.insert(message).await?;
            Ok(Json(json!({ "code": 0, "message": "received", "data": stored })).into_response())
        }
        None => Ok(acknowledge(&format!("event {} received", event_type))),
    }
}

// =============================================================================
// Inbox
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub since: Option<String>,
}

/// Unprocessed messages, newest first, optionally newer than `since`.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Value>, ApiError> {
    let since = match query.since.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(parse_since(raw)?),
        None => None,
    };

    let messages = state.inbox.list_unprocessed_since(since).await?;

    Ok(Json(json!({
        "code": 0,
        "count": messages.len(),
        "data": messages,
    })))
}

/// RFC 3339 timestamp. A `+` offset sent without URL encoding arrives as a
/// space and is restored.
fn parse_since(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .or_else(|e| DateTime::parse_from_rfc3339(&raw.replace(' ', "+")).map_err(|_| e))
        .map_err(|e| ApiError::Malformed(format!("invalid since timestamp: {}", e)))?;

    Ok(parsed.with_timezone(&Utc))
}

/// Mark one inbox message processed.
pub async fn mark_message_processed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.inbox.mark_processed(&id).await? {
        MarkOutcome::NotFound => Err(ApiError::NotFound("Message not found".to_string())),
        MarkOutcome::Marked | MarkOutcome::AlreadyProcessed => Ok(Json(json!({
            "code": 0,
            "message": "marked as processed",
        }))),
    }
}

// =============================================================================
// AI Relay
// =============================================================================

/// Forward an AI classification request and return the upstream reply as is.
pub async fn ai_relay(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request: RelayRequest = json_body(&body)?;
    let upstream = state.relay.relay(request).await?;

    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);

    Ok((
        status,
        [(header::CONTENT_TYPE, "application/json")],
        upstream.body,
    )
        .into_response())
}
