//! HTTP surface: health check and unknown routes

use std::sync::Arc;

use axum::body::Body;
use http::{header::CACHE_CONTROL, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use ratna::queue::{BatchProgress, RelayQueue, StatusMessage};
use ratna::routes::create_router;
use ratna::state::AppState;
use ratna::store::Store;
use ratna::telegram::ChatRef;

fn state() -> AppState {
    let store = Arc::new(Store::new(1, &[2]));
    AppState::new(store, RelayQueue::new(100))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_alive_with_counts() {
    let state = state();
    state.store.user(10).await;
    let batch = Arc::new(BatchProgress::new(
        10,
        2,
        -100,
        StatusMessage {
            chat_id: 10,
            message_id: 1,
        },
    ));
    state
        .queue
        .enqueue_batch(&ChatRef::Id(-1001), 5, batch)
        .await
        .unwrap();

    let response = create_router(state)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CACHE_CONTROL], "no-store");
    assert!(response.headers().contains_key("x-request-id"));

    let json = body_json(response).await;
    assert_eq!(json["status"], "alive");
    assert_eq!(json["queue"], 2);
    assert_eq!(json["active"], 0);
    assert_eq!(json["users"], 1);
    assert_eq!(json["premium"], 2);
    assert!(json["uptime_seconds"].as_i64().unwrap() >= 0);
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let response = create_router(state())
        .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()[CACHE_CONTROL], "no-store");
    let json = body_json(response).await;
    assert_eq!(json["error"], "Not found: /nope");
}
