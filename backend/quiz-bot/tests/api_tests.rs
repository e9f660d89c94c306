use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use quiz_bot::create_router;
use quiz_bot::services::quiz_runner::GREETING;

mod common;

use common::{quiz_with, BotHarness};

fn router_for(bot: &BotHarness) -> Router {
    create_router(Arc::clone(&bot.state))
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn post_choice(app: &Router, position: usize, body: Value) -> StatusCode {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/exchange/{}/choice", position))
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    response.status()
}

#[tokio::test]
async fn test_health_reports_entries() {
    let mut bot = BotHarness::start(quiz_with(1));
    bot.next_prompt().await;
    let app = router_for(&bot);

    let (status, json) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "quiz-bot");
    assert_eq!(json["entries"], 2);
}

#[tokio::test]
async fn test_exchange_lists_entries_and_open_prompts() {
    let mut bot = BotHarness::start(quiz_with(1));
    let prompt = bot.next_prompt().await;
    let app = router_for(&bot);

    let (status, json) = get_json(&app, "/api/v1/exchange").await;
    assert_eq!(status, StatusCode::OK);

    let entries = json["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["origin"], "bot");
    assert_eq!(entries[0]["kind"], "message");
    assert_eq!(entries[0]["text"], GREETING);
    assert_eq!(entries[0]["pending"], false);
    assert_eq!(entries[1]["kind"], "action_prompt");
    assert_eq!(entries[1]["actions"][0]["caption"], "START QUIZ");
    assert_eq!(json["open_prompts"], json!([prompt.position]));
}

#[tokio::test]
async fn test_choice_is_consumed_once() {
    let mut bot = BotHarness::start(quiz_with(1));
    let prompt = bot.next_prompt().await;
    let app = router_for(&bot);

    assert_eq!(
        post_choice(&app, prompt.position, json!({ "action": 0 })).await,
        StatusCode::ACCEPTED
    );
    assert_eq!(
        post_choice(&app, prompt.position, json!({ "action": 0 })).await,
        StatusCode::CONFLICT
    );

    // the bot moves on to the first question
    assert_eq!(bot.answer(true).await, "q1");
}

#[tokio::test]
async fn test_invalid_choices_are_rejected() {
    let mut bot = BotHarness::start(quiz_with(1));
    let prompt = bot.next_prompt().await;
    let app = router_for(&bot);

    assert_eq!(
        post_choice(&app, 0, json!({ "action": 0 })).await,
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        post_choice(&app, prompt.position, json!({ "action": 7 })).await,
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        post_choice(&app, prompt.position, json!({ "text": "hello" })).await,
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        post_choice(&app, 99, json!({ "action": 0 })).await,
        StatusCode::NOT_FOUND
    );
    assert_eq!(bot.state.exchange.open_prompts(), vec![prompt.position]);
}

#[tokio::test]
async fn test_session_snapshot_tracks_the_quiz() {
    let mut bot = BotHarness::start(quiz_with(2));
    bot.choose(0).await;
    bot.answer(true).await;
    bot.next_prompt().await;
    let app = router_for(&bot);

    let (status, json) = get_json(&app, "/api/v1/session").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["quiz_id"], "testquiz");
    assert_eq!(json["awaiting"], "q2");
    assert_eq!(json["in_flight"], json!(["q1"]));
    assert_eq!(json["correct"], 1);
    assert_eq!(json["total"], 2);
}

#[tokio::test]
async fn test_metrics_endpoint_renders_prometheus_text() {
    let mut bot = BotHarness::start(quiz_with(1));
    bot.next_prompt().await;
    let app = router_for(&bot);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("exchange_entries_total"));
}
