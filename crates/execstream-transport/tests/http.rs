#![cfg(feature = "http")]

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use execstream_controller::ExecutionController;
use execstream_core::StreamBroker;
use execstream_store::MemoryStore;
use execstream_transport::router;
use serde_json::{Value, json};
use tokio_test::assert_ok;
use tower::ServiceExt;

fn app() -> (Router, Arc<ExecutionController>) {
    let controller = Arc::new(ExecutionController::new(
        Arc::new(MemoryStore::new()),
        Arc::new(StreamBroker::new()),
        None,
    ));
    (router(Arc::clone(&controller)), controller)
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = assert_ok!(app.clone().oneshot(req).await);
    let status = response.status();
    let bytes = assert_ok!(to_bytes(response.into_body(), usize::MAX).await);
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create(app: &Router) -> String {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/executions",
            Some(json!({
                "metadata": {"name": "Nightly Build"},
                "spec": {"session_id": "ses-1", "message": "run the build"}
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["metadata"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_create_and_get() {
    let (app, _) = app();
    let id = create(&app).await;

    let (status, body) = send(&app, request("GET", &format!("/executions/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["slug"], "nightly-build");
    assert_eq!(body["status"]["phase"], "pending");
}

#[tokio::test]
async fn test_create_rejects_bad_input() {
    let (app, _) = app();

    let bad_json = Request::builder()
        .method("POST")
        .uri("/executions")
        .body(Body::from("{"))
        .unwrap();
    let (status, body) = send(&app, bad_json).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_argument");

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/executions",
            Some(json!({"metadata": {"name": "Orphan"}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "either session_id or agent_id must be provided"
    );
}

#[tokio::test]
async fn test_unknown_execution_is_404() {
    let (app, _) = app();
    let (status, body) = send(&app, request("GET", "/executions/aex-missing", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({"code": "not_found", "message": "AgentExecution not found: aex-missing"})
    );
}

#[tokio::test]
async fn test_update_status_and_list() {
    let (app, _) = app();
    let id = create(&app).await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/executions/{id}/status"),
            Some(json!({"phase": "running", "messages": [{"kind": "ai", "content": "working"}]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["phase"], "running");
    assert_eq!(body["status"]["messages"][0]["content"], "working");

    let uri = format!("/executions/{id}/status");
    let (status, body) = send(&app, request("POST", &uri, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "status is required");

    let (status, body) = send(&app, request("GET", "/sessions/ses-1/executions", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["executions"].as_array().unwrap().len(), 1);
    assert_eq!(body["executions"][0]["metadata"]["id"], id.as_str());
}

#[tokio::test]
async fn test_delete() {
    let (app, _) = app();
    let id = create(&app).await;

    let (status, body) = send(&app, request("DELETE", &format!("/executions/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["id"], id.as_str());

    let (status, _) = send(&app, request("GET", &format!("/executions/{id}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stream_unknown_execution_is_404() {
    let (app, _) = app();
    let (status, body) = send(&app, request("GET", "/executions/aex-missing/stream", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_stream_terminal_execution_replays_and_ends() {
    let (app, controller) = app();
    let id = create(&app).await;
    assert_ok!(
        controller
            .update_status(
                &id,
                Some(execstream_core::ExecutionStatus {
                    phase: execstream_core::ExecutionPhase::Completed,
                    ..Default::default()
                }),
            )
            .await
    );

    let response = app
        .clone()
        .oneshot(request("GET", &format!("/executions/{id}/stream"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(text.matches("event: execution").count(), 1);
    assert!(text.contains(r#""phase":"completed""#));
}

#[tokio::test]
async fn test_stream_relays_live_updates() {
    let (app, controller) = app();
    let id = create(&app).await;

    let response = app
        .clone()
        .oneshot(request("GET", &format!("/executions/{id}/stream"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::timeout(Duration::from_secs(5), async {
        while controller.subscriber_count(&id) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    for phase in ["running", "completed"] {
        let (status, _) = send(
            &app,
            request(
                "POST",
                &format!("/executions/{id}/status"),
                Some(json!({ "phase": phase })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let bytes = tokio::time::timeout(
        Duration::from_secs(5),
        to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .unwrap()
    .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let phases: Vec<&str> = ["pending", "running", "completed"]
        .into_iter()
        .filter(|p| text.contains(&format!(r#""phase":"{p}""#)))
        .collect();
    assert_eq!(phases, vec!["pending", "running", "completed"]);
    let pending_at = text.find(r#""phase":"pending""#).unwrap();
    let completed_at = text.find(r#""phase":"completed""#).unwrap();
    assert!(pending_at < completed_at);
    assert_eq!(controller.subscriber_count(&id), 0);
}

#[tokio::test]
async fn test_dropping_stream_unsubscribes() {
    let (app, controller) = app();
    let id = create(&app).await;

    let response = app
        .clone()
        .oneshot(request("GET", &format!("/executions/{id}/stream"), None))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while controller.subscriber_count(&id) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    drop(response);

    tokio::time::timeout(Duration::from_secs(5), async {
        while controller.subscriber_count(&id) > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}
