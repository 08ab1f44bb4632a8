//! Thin HTTP submission/read surface. Pass-throughs to the job store; no
//! scheduling logic lives here.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::attempt::{AttemptLog, AttemptRecord};
use crate::job::{Job, JobState, NewJob, QueueType};
use crate::store::JobStore;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn JobStore>,
    pub attempts: Arc<AttemptLog>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/jobs", post(create_job).get(list_jobs))
        .route("/api/jobs/:id", get(get_job))
        .route("/api/jobs/:id/attempts", get(list_attempts))
        .with_state(state)
}

#[derive(Serialize)]
pub struct JobView {
    pub id: Uuid,
    pub queue_type: QueueType,
    pub task_type: String,
    pub payload: Value,
    pub scheduled_at: DateTime<Utc>,
    pub state: JobState,
    pub priority: i32,
    pub attempts: u32,
    pub max_attempts: u32,
    pub queued_at: Option<DateTime<Utc>>,
    pub owner_worker_id: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            queue_type: job.queue_type,
            task_type: job.task_type,
            payload: job.payload,
            scheduled_at: job.scheduled_at,
            state: job.state,
            priority: job.priority,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            queued_at: job.queued_at,
            owner_worker_id: job.owner_worker_id,
            last_error: job.last_error,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

type ApiError = (StatusCode, String);

fn internal(message: &str) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
}

async fn create_job(
    State(state): State<ApiState>,
    Json(spec): Json<NewJob>,
) -> Result<(StatusCode, Json<JobView>), ApiError> {
    spec.validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let job = state.store.create(spec).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to create job");
        internal("Failed to create job.")
    })?;

    Ok((StatusCode::CREATED, Json(job.into())))
}

async fn get_job(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobView>, ApiError> {
    let job = state.store.get(id).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to fetch job");
        internal("Failed to fetch job.")
    })?;

    match job {
        Some(job) => Ok(Json(job.into())),
        None => Err((StatusCode::NOT_FOUND, format!("No such job: {id}"))),
    }
}

async fn list_jobs(State(state): State<ApiState>) -> Result<Json<Vec<JobView>>, ApiError> {
    let jobs = state.store.all().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to list jobs");
        internal("Failed to list jobs.")
    })?;
    Ok(Json(jobs.into_iter().map(JobView::from).collect()))
}

async fn list_attempts(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AttemptRecord>>, ApiError> {
    let exists = state
        .store
        .get(id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to fetch job");
            internal("Failed to fetch job.")
        })?
        .is_some();
    if !exists {
        return Err((StatusCode::NOT_FOUND, format!("No such job: {id}")));
    }

    Ok(Json(state.attempts.for_job(id).await))
}
