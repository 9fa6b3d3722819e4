//! HTTP API tests driven through the router without binding a socket.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use docchat::chat::{ChatCompletion, ChatModel, PromptMessage};
use docchat::config::Config;
use docchat::embedding::HashEmbedder;
use docchat::error::Result;
use docchat::server::router;
use docchat::session::Pipeline;
use serde_json::Value;
use tower::ServiceExt;

const BOUNDARY: &str = "docchat-test-boundary";

struct FixedChat;

#[async_trait]
impl ChatModel for FixedChat {
    fn model_name(&self) -> &str {
        "fixed"
    }

    async fn complete(&self, _credential: &str, _messages: &[PromptMessage]) -> Result<ChatCompletion> {
        Ok(ChatCompletion {
            content: "Twenty days.".to_string(),
            usage: None,
        })
    }
}

fn app() -> Router {
    let mut config = Config::default();
    config.chat.api_key = None;
    router(Pipeline::new(
        config,
        Arc::new(HashEmbedder::default()),
        Arc::new(FixedChat),
    ))
}

enum Part<'a> {
    File(&'a str, &'a [u8]),
    Text(&'a str, &'a str),
}

fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File(name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn post_json(uri: &str, json: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn post_multipart(uri: &str, parts: &[Part]) -> Request<Body> {
    Request::post(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

async fn create_session(app: &Router) -> String {
    let (status, json) = send(app, Request::post("/sessions").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, json) = send(&app(), Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn full_conversation_over_http() {
    let app = app();
    let id = create_session(&app).await;

    let (status, json) = send(
        &app,
        Request::get(format!("/sessions/{}", id)).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "uninitialized");

    let (status, json) = send(
        &app,
        post_multipart(
            &format!("/sessions/{}/process", id),
            &[
                Part::File("leave.csv", b"vacation,twenty days\nsick leave,ten days\n"),
                Part::Text("api_key", "sk-test"),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    assert_eq!(json["files"], 1);
    assert_eq!(json["chunks"], 1);

    let (status, json) = send(
        &app,
        post_json(
            &format!("/sessions/{}/chat", id),
            serde_json::json!({ "question": "How much vacation?" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    assert_eq!(json["answer"], "Twenty days.");
    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["is_user"], true);
    assert_eq!(messages[0]["content"], "How much vacation?");
    assert_eq!(messages[1]["role"], "assistant");

    let (_, json) = send(
        &app,
        Request::get(format!("/sessions/{}", id)).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(json["state"], "ready");
    assert_eq!(json["messages"], 2);
    assert_eq!(json["history"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn chat_before_process_is_a_conflict() {
    let app = app();
    let id = create_session(&app).await;

    let (status, json) = send(
        &app,
        post_json(
            &format!("/sessions/{}/chat", id),
            serde_json::json!({ "question": "Hello?" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "not_ready");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let (status, json) = send(
        &app(),
        Request::get("/sessions/does-not-exist").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn corrupt_upload_is_unprocessable() {
    let app = app();
    let id = create_session(&app).await;

    let (status, json) = send(
        &app,
        post_multipart(
            &format!("/sessions/{}/process", id),
            &[
                Part::File("broken.docx", b"not a zip"),
                Part::Text("api_key", "sk-test"),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["code"], "extraction_failed");
    assert!(json["error"]["message"].as_str().unwrap().contains("broken.docx"));
}

#[tokio::test]
async fn missing_key_is_a_bad_request() {
    if std::env::var("OPENAI_API_KEY").is_ok() {
        return;
    }
    let app = app();
    let id = create_session(&app).await;

    let (status, json) = send(
        &app,
        post_multipart(
            &format!("/sessions/{}/process", id),
            &[Part::File("a.csv", b"x,y")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "missing_credential");
}

#[tokio::test]
async fn blank_question_is_a_bad_request() {
    let app = app();
    let id = create_session(&app).await;
    send(
        &app,
        post_multipart(
            &format!("/sessions/{}/process", id),
            &[Part::File("a.csv", b"x,y"), Part::Text("api_key", "sk-test")],
        ),
    )
    .await;

    let (status, json) = send(
        &app,
        post_json(
            &format!("/sessions/{}/chat", id),
            serde_json::json!({ "question": "   " }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "empty_question");
}

#[tokio::test]
async fn malformed_chat_body_is_a_bad_request() {
    let app = app();
    let id = create_session(&app).await;
    let uri = format!("/sessions/{}/chat", id);

    let (status, json) = send(&app, post_json(&uri, serde_json::json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "bad_request");
    assert!(json["error"]["message"].as_str().unwrap().contains("question"));

    let request = Request::post(&uri)
        .header("content-type", "application/json")
        .body(Body::from("{\"question\": "))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "bad_request");
}
