//! Route table and cross-cutting middleware.

use std::any::Any;

use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::debug;

use crate::error::ApiError;
use crate::store::{MonitoredGroup, Plan, Task};
use crate::web::handlers::{
    ai_relay, health, list_messages, mark_message_processed, qq_webhook, status, AppState,
};
use crate::web::records::{
    create_group, create_record, delete_record, get_record, list_records, list_tasks,
    toggle_subtask, update_record,
};

const ALLOW_ORIGIN: &str = "*";
const ALLOW_METHODS: &str = "GET, POST, PATCH, DELETE, OPTIONS";
const ALLOW_HEADERS: &str =
    "Content-Type, Authorization, X-Signature-Ed25519, X-Signature-Timestamp";

/// Routes relative to an API prefix.
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/webhook/qq/group", post(qq_webhook))
        .route("/messages", get(list_messages))
        .route("/messages/:id/processed", post(mark_message_processed))
        .route("/ali-api", post(ai_relay))
        .route("/tasks", get(list_tasks).post(create_record::<Task>))
        .route(
            "/tasks/:id",
            get(get_record::<Task>)
                .patch(update_record::<Task>)
                .delete(delete_record::<Task>),
        )
        .route("/plans", get(list_records::<Plan>).post(create_record::<Plan>))
        .route(
            "/plans/:id",
            get(get_record::<Plan>)
                .patch(update_record::<Plan>)
                .delete(delete_record::<Plan>),
        )
        .route("/plans/:id/subtasks/:subtask_id/toggle", post(toggle_subtask))
        .route("/groups", get(list_records::<MonitoredGroup>).post(create_group))
        .route(
            "/groups/:id",
            get(get_record::<MonitoredGroup>)
                .patch(update_record::<MonitoredGroup>)
                .delete(delete_record::<MonitoredGroup>),
        )
}

/// Build the application router.
///
/// The API is served under `/api/edge` (edge platform prefix) and `/api`.
pub fn build_router(state: AppState) -> Router {
    let api = api_routes();

    Router::new()
        .nest("/api/edge", api.clone())
        .nest("/api", api)
        .fallback(fallback)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not Found" }))).into_response()
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
}

/// Answer every OPTIONS request with an empty 200 and stamp CORS headers
/// on everything else.
async fn cors(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        debug!(uri = %request.uri(), "cors_preflight");
        let mut response = StatusCode::OK.into_response();
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "internal error".to_string()
    };

    ApiError::Internal(message).into_response()
}
