//! CRUD handlers for tasks, plans and monitored groups.
//!
//! The generic handlers are instantiated per record type; each picks its
//! repository out of [`AppState`] through `FromRef`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::ApiError;
use crate::store::{
    merge_patch, record_from_draft, MonitoredGroup, Plan, Record, Repository, StoreError, Task,
};
use crate::web::handlers::{json_body, AppState};

fn not_found<T: Record>(id: &str) -> ApiError {
    StoreError::NotFound {
        kind: T::KIND,
        id: id.to_string(),
    }
    .into()
}

/// `GET /{records}`: all records, newest first.
pub async fn list_records<T: Record>(
    State(repo): State<Arc<dyn Repository<T>>>,
) -> Result<Json<Value>, ApiError>
where
    Arc<dyn Repository<T>>: FromRef<AppState>,
{
    let records = repo.list().await?;
    Ok(Json(json!({ "count": records.len(), "data": records })))
}

/// `POST /{records}`: create from a JSON object, 201 on success.
pub async fn create_record<T: Record>(
    State(repo): State<Arc<dyn Repository<T>>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError>
where
    Arc<dyn Repository<T>>: FromRef<AppState>,
{
    let draft: Value = json_body(&body)?;
    let record: T = record_from_draft(draft, Utc::now())?;
    let stored = repo.insert(record).await?;

    Ok((StatusCode::CREATED, Json(json!({ "data": stored }))))
}

/// `GET /{records}/{id}`
pub async fn get_record<T: Record>(
    State(repo): State<Arc<dyn Repository<T>>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError>
where
    Arc<dyn Repository<T>>: FromRef<AppState>,
{
    let record = repo.get(&id).await?.ok_or_else(|| not_found::<T>(&id))?;
    Ok(Json(json!({ "data": record })))
}

/// `PATCH /{records}/{id}`: merge the given fields over the stored record.
pub async fn update_record<T: Record>(
    State(repo): State<Arc<dyn Repository<T>>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError>
where
    Arc<dyn Repository<T>>: FromRef<AppState>,
{
    let patch: Value = json_body(&body)?;
    let now = Utc::now();
    let apply = move |existing: T| -> Result<T, StoreError> {
        Ok(merge_patch(&existing, patch, now)?)
    };
    let updated = repo.update(&id, Box::new(apply)).await?;

    Ok(Json(json!({ "data": updated })))
}

/// `DELETE /{records}/{id}`
pub async fn delete_record<T: Record>(
    State(repo): State<Arc<dyn Repository<T>>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError>
where
    Arc<dyn Repository<T>>: FromRef<AppState>,
{
    if repo.remove(&id).await? {
        Ok(Json(json!({ "message": "deleted" })))
    } else {
        Err(not_found::<T>(&id))
    }
}

// =============================================================================
// Type-specific routes
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    pub source: Option<String>,
}

/// `GET /tasks?source=`: `all` (default) or a specific source label.
pub async fn list_tasks(
    State(repo): State<Arc<dyn Repository<Task>>>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<Value>, ApiError> {
    let source = query.source.unwrap_or_else(|| "all".to_string());

    let tasks: Vec<Task> = repo
        .list()
        .await?
        .into_iter()
        .filter(|t| source == "all" || t.source == source)
        .collect();

    Ok(Json(json!({ "count": tasks.len(), "data": tasks })))
}

/// `POST /groups`: a QQ group can only be monitored once.
pub async fn create_group(
    State(repo): State<Arc<dyn Repository<MonitoredGroup>>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let draft: Value = json_body(&body)?;
    let group: MonitoredGroup = record_from_draft(draft, Utc::now())?;

    let stored = repo.insert(group).await?;
    info!(group_id = %stored.group_id, "group_monitored");

    Ok((StatusCode::CREATED, Json(json!({ "data": stored }))))
}

/// `POST /plans/{id}/subtasks/{subtask_id}/toggle`
pub async fn toggle_subtask(
    State(repo): State<Arc<dyn Repository<Plan>>>,
    Path((plan_id, subtask_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let now = Utc::now();
    let toggle = move |mut plan: Plan| -> Result<Plan, StoreError> {
        if !plan.toggle_subtask(&subtask_id) {
            return Err(StoreError::NotFound {
                kind: "subtask",
                id: subtask_id,
            });
        }
        plan.set_updated_at(now);
        Ok(plan)
    };

    let updated = repo.update(&plan_id, Box::new(toggle)).await?;
    Ok(Json(json!({ "data": updated })))
}
