use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use chronoqueue::api::{router, ApiState};
use chronoqueue::attempt::AttemptLog;
use chronoqueue::store::{JobStore, MemoryStore};

fn test_app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = ApiState {
        store: store.clone(),
        attempts: Arc::new(AttemptLog::new()),
    };
    (router(state), store)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_job(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/jobs")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn create_job_returns_created_view() {
    let (app, _store) = test_app();

    let response = app
        .oneshot(post_job(json!({
            "queue_type": "email",
            "task_type": "welcome_email",
            "payload": {"to": "user@example.com"},
            "priority": 50,
            "max_attempts": 3
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["queue_type"], "email");
    assert_eq!(body["task_type"], "welcome_email");
    assert_eq!(body["state"], "PENDING");
    assert_eq!(body["priority"], 50);
    assert_eq!(body["max_attempts"], 3);
    assert_eq!(body["attempts"], 0);
}

#[tokio::test]
async fn create_rejects_blank_task_type_and_zero_attempts() {
    let (app, store) = test_app();

    let response = app
        .clone()
        .oneshot(post_job(json!({
            "queue_type": "email",
            "task_type": "  ",
            "payload": {}
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_job(json!({
            "queue_type": "email",
            "task_type": "t",
            "payload": {},
            "max_attempts": 0
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(store.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_idempotency_key_returns_same_job() {
    let (app, store) = test_app();
    let body = json!({
        "queue_type": "report",
        "task_type": "monthly_report",
        "payload": {},
        "idempotency_key": "report-2026-08"
    });

    let first = body_json(app.clone().oneshot(post_job(body.clone())).await.unwrap()).await;
    let second = body_json(app.oneshot(post_job(body)).await.unwrap()).await;

    assert_eq!(first["id"], second["id"]);
    assert_eq!(store.all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn get_job_by_id_and_not_found() {
    let (app, store) = test_app();
    let job = store
        .create(chronoqueue::job::NewJob {
            queue_type: chronoqueue::job::QueueType::Notification,
            task_type: "push".to_string(),
            payload: json!({}),
            metadata: None,
            scheduled_at: None,
            priority: None,
            max_attempts: None,
            idempotency_key: None,
        })
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/jobs/{}", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], job.id.to_string());

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/jobs/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_jobs_returns_every_row() {
    let (app, _store) = test_app();

    for n in 0..3 {
        let response = app
            .clone()
            .oneshot(post_job(json!({
                "queue_type": "email",
                "task_type": format!("task-{n}"),
                "payload": {}
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/jobs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn attempts_endpoint_is_empty_for_fresh_job_and_404_for_unknown() {
    let (app, store) = test_app();
    let job = store
        .create(chronoqueue::job::NewJob {
            queue_type: chronoqueue::job::QueueType::Email,
            task_type: "t".to_string(),
            payload: json!({}),
            metadata: None,
            scheduled_at: None,
            priority: None,
            max_attempts: None,
            idempotency_key: None,
        })
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/jobs/{}/attempts", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([]));

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/jobs/{}/attempts", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
