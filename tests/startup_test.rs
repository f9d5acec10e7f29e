//! Connecting to Telegram at startup

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;

use common::FakeTelegram;
use ratna::http::start_server;
use ratna::queue::RelayQueue;
use ratna::routes::create_router;
use ratna::state::AppState;
use ratna::store::Store;
use ratna::telegram::wait_for_identity;

const RETRY: Duration = Duration::from_millis(10);

#[tokio::test]
async fn get_me_is_retried_until_telegram_answers() {
    let api = FakeTelegram::new();
    api.fail_get_me(2);
    let (_tx, mut rx) = watch::channel(false);

    let me = wait_for_identity(&api, RETRY, &mut rx).await.unwrap();
    assert_eq!(me.unwrap().username.as_deref(), Some("RatnaBot"));
    assert_eq!(api.get_me_calls(), 3);
}

#[tokio::test]
async fn rejected_token_is_fatal() {
    let api = FakeTelegram::new();
    api.reject_token();
    let (_tx, mut rx) = watch::channel(false);

    let err = wait_for_identity(&api, RETRY, &mut rx).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(api.get_me_calls(), 1);
}

#[tokio::test]
async fn shutdown_stops_the_retries() {
    let api = Arc::new(FakeTelegram::new());
    api.fail_get_me(usize::MAX);
    let (tx, mut rx) = watch::channel(false);

    let waiting = tokio::spawn({
        let api = api.clone();
        async move { wait_for_identity(api.as_ref(), Duration::from_secs(60), &mut rx).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), waiting)
        .await
        .expect("retry loop should stop on shutdown")
        .unwrap();
    assert!(matches!(result, Ok(None)));
    assert_eq!(api.get_me_calls(), 1);
}

#[tokio::test]
async fn health_answers_while_telegram_is_unreachable() {
    let api = Arc::new(FakeTelegram::new());
    api.fail_get_me(usize::MAX);
    let (tx, rx) = watch::channel(false);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(Arc::new(Store::new(1, &[])), RelayQueue::new(10));
    let server = tokio::spawn(start_server(listener, create_router(state), rx.clone()));

    let waiting = tokio::spawn({
        let api = api.clone();
        let mut rx = rx.clone();
        async move { wait_for_identity(api.as_ref(), RETRY, &mut rx).await }
    });

    let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    tx.send(true).unwrap();
    assert!(matches!(waiting.await.unwrap(), Ok(None)));
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server should stop on shutdown")
        .unwrap()
        .unwrap();
}
