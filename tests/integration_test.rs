use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use longpoll::api::{router, StatusResponse};
use longpoll::clock::ManualClock;
use longpoll::state::AppState;
use longpoll::types::PollResponse;
use longpoll::LongPollBroadcaster;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn app_with_clock(start: i64) -> (Router, Arc<AppState>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start));
    let state = Arc::new(AppState::with_broadcaster(LongPollBroadcaster::with_clock(
        clock.clone(),
    )));
    (router(state.clone()), state, clock)
}

fn poll_request(last: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/poll?lastMessageTime={}", last))
        .body(Body::empty())
        .unwrap()
}

fn publish_request(payload: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/broadcast")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(payload.to_string())).unwrap()
}

async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

async fn wait_for_parked(state: &AppState, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.broadcaster.waiting_count() < count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("clients should park");
}

/// End-to-end poll/broadcast cycle over HTTP
#[tokio::test]
async fn test_poll_broadcast_scenario() {
    let (app, state, clock) = app_with_clock(100);

    // 1. Nothing broadcast yet: a client at 0 is parked
    let parked = tokio::spawn(app.clone().oneshot(poll_request("0")));
    wait_for_parked(&state, 1).await;

    // 2. Producer broadcasts "A" at t=100
    let response = app
        .clone()
        .oneshot(publish_request(json!("A"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = json_body(response).await;
    assert_eq!(body, json!({ "time": 100, "delivered": 1, "failed": 0 }));

    // 3. The parked client receives it
    let response = parked.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
    let body: Value = json_body(response).await;
    assert_eq!(body, json!({ "message": "A", "time": 100 }));

    // 4. A new client at 0 is behind and is answered immediately
    let response = app.clone().oneshot(poll_request("0")).await.unwrap();
    let body: Value = json_body(response).await;
    assert_eq!(body, json!({ "message": "A", "time": 100 }));
    assert_eq!(state.broadcaster.waiting_count(), 0);

    // 5. A client that saw t=100 is parked until "B" at t=150
    let parked = tokio::spawn(app.clone().oneshot(poll_request("100")));
    wait_for_parked(&state, 1).await;

    clock.set(150);
    app.clone()
        .oneshot(publish_request(json!("B"), None))
        .await
        .unwrap();

    let body: Value = json_body(parked.await.unwrap().unwrap()).await;
    assert_eq!(body, json!({ "message": "B", "time": 150 }));
}

#[tokio::test]
async fn test_behind_client_without_message_gets_null() {
    let (app, state, _clock) = app_with_clock(100);

    let response = app.oneshot(poll_request("5")).await.unwrap();
    let body: PollResponse<Value> = json_body(response).await;

    assert_eq!(body, PollResponse::empty());
    assert_eq!(state.broadcaster.waiting_count(), 0);
}

#[tokio::test]
async fn test_malformed_last_message_time_is_zero() {
    let (app, state, _clock) = app_with_clock(100);
    state.broadcaster.broadcast(json!({"reload": true}));

    // "abc" counts as 0, which is behind t=100
    let response = app.clone().oneshot(poll_request("abc")).await.unwrap();
    let body: Value = json_body(response).await;
    assert_eq!(body, json!({ "message": {"reload": true}, "time": 100 }));

    // So does a repeated parameter
    let response = app
        .clone()
        .oneshot(poll_request("1&lastMessageTime=2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = json_body(response).await;
    assert_eq!(body, json!({ "message": {"reload": true}, "time": 100 }));

    // Missing parameter behaves the same
    let response = app
        .oneshot(Request::builder().uri("/poll").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body: Value = json_body(response).await;
    assert_eq!(body["time"], json!(100));
}

#[tokio::test]
async fn test_dropped_poll_leaves_pool() {
    let (app, state, _clock) = app_with_clock(100);

    let first = tokio::spawn(app.clone().oneshot(poll_request("0")));
    let second = tokio::spawn(app.clone().oneshot(poll_request("0")));
    wait_for_parked(&state, 2).await;

    // Connection closed: hyper drops the handler future
    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());
    assert_eq!(state.broadcaster.waiting_count(), 1);

    let report = state.broadcaster.broadcast(json!("after"));
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 0);

    let body: Value = json_body(second.await.unwrap().unwrap()).await;
    assert_eq!(body["message"], json!("after"));
}

#[tokio::test]
async fn test_status_endpoint() {
    let (app, state, _clock) = app_with_clock(100);

    let _parked = tokio::spawn(app.clone().oneshot(poll_request("0")));
    wait_for_parked(&state, 1).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status: StatusResponse = json_body(response).await;
    assert_eq!(status.waiting, 1);
    assert_eq!(status.time, 0);

    state.broadcaster.broadcast(json!(1));

    let response = app
        .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status: StatusResponse = json_body(response).await;
    assert_eq!(status.waiting, 0);
    assert_eq!(status.time, 100);
}

#[tokio::test]
async fn test_publish_requires_token_when_configured() {
    let clock = Arc::new(ManualClock::new(100));
    let state = Arc::new(AppState {
        broadcaster: LongPollBroadcaster::with_clock(clock),
        publish_token: Some("secret".to_string()),
    });
    let app = router(state.clone());

    let response = app
        .clone()
        .oneshot(publish_request(json!("x"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(publish_request(json!("x"), Some("wrong")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(state.broadcaster.last_message().is_none());

    let response = app
        .oneshot(publish_request(json!("x"), Some("secret")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.broadcaster.last_message_timestamp(), 100);
}

#[tokio::test]
async fn test_polling_is_open_when_publish_token_set() {
    let state = Arc::new(AppState {
        broadcaster: LongPollBroadcaster::with_clock(Arc::new(ManualClock::new(100))),
        publish_token: Some("secret".to_string()),
    });
    state.broadcaster.broadcast(json!("hi"));

    let response = router(state).oneshot(poll_request("0")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Clients re-polling in a loop while a producer broadcasts never get stuck
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pollers_always_reach_final_message() {
    let broadcaster = LongPollBroadcaster::<String>::new();

    let pollers: Vec<_> = (0..50)
        .map(|_| {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move {
                let mut last_seen = 0;
                let mut received = 0usize;
                loop {
                    let response = broadcaster.wait(last_seen).await.unwrap();
                    assert!(response.time > last_seen, "timestamps must move forward");
                    last_seen = response.time;
                    received += 1;
                    if response.message.as_deref() == Some("done") {
                        return received;
                    }
                }
            })
        })
        .collect();

    for i in 0..200 {
        broadcaster.broadcast(format!("msg-{}", i));
        tokio::task::yield_now().await;
    }
    broadcaster.broadcast("done".to_string());

    let results = tokio::time::timeout(
        Duration::from_secs(10),
        futures::future::join_all(pollers),
    )
    .await
    .expect("every poller should see the final message");

    for result in results {
        assert!(result.unwrap() >= 1);
    }
    assert_eq!(broadcaster.waiting_count(), 0);
}
