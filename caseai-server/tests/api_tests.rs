//! Integration tests for the caseai-server HTTP API
//!
//! Requests go through the real router with `tower::ServiceExt::oneshot`.

mod helpers;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use base64::Engine;
use caseai_common::sse::ReconnectHint;
use caseai_common::SessionId;
use caseai_server::db;
use helpers::{FakeSpeech, TestServer};
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let (status, body) = server.request(Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "caseai-server");
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_list_and_get_cases() {
    let server = TestServer::start().await;

    let (status, body) = server.request(Method::GET, "/api/cases", None).await;
    assert_eq!(status, StatusCode::OK);
    let cases = body.unwrap();
    assert_eq!(cases.as_array().unwrap().len(), 4);

    let (status, body) = server.request(Method::GET, "/api/cases/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["case_id"], 1);

    let (status, body) = server.request(Method::GET, "/api/cases/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body.unwrap()["error"], "not_found");
}

#[tokio::test]
async fn test_start_session_creates_cast() {
    let server = TestServer::start().await;
    let (session, personas) = server.start_session().await;

    assert_eq!(personas.len(), 5);
    assert_eq!(personas.iter().filter(|p| p.is_human).count(), 1);
    assert!(personas.iter().all(|p| p.started_case_id == session));

    let (status, body) = server
        .request(Method::GET, &format!("/api/sessions/{}", session), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["status"], "in_progress");

    let (status, body) = server
        .request(
            Method::GET,
            &format!("/api/personas?started_case_id={}", session),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap().as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_start_session_unknown_case() {
    let server = TestServer::start().await;
    let (status, _) = server.request(Method::POST, "/api/cases/42/sessions", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_personas_requires_session_id() {
    let server = TestServer::start().await;

    let (status, body) = server.request(Method::GET, "/api/personas", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"], "validation_error");

    let (status, _) = server
        .request(Method::GET, "/api/personas?started_case_id=nope", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_submit_message_created() {
    let server = TestServer::start().await;
    let (session, personas) = server.start_session().await;
    let human = personas.iter().find(|p| p.is_human).unwrap();

    let (status, body) = server
        .request(
            Method::POST,
            "/api/messages",
            Some(json!({
                "started_case_id": session.to_string(),
                "content": "  hello  ",
                "is_human": true,
                "persona_id": human.persona_id.to_string(),
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    let message = body.unwrap();
    // Validated on the trimmed text, stored as sent
    assert_eq!(message["content"], "  hello  ");
    assert_eq!(message["is_human"], true);
    assert_eq!(message["persona_name"], human.name.as_str());
    assert!(message["message_id"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_malformed_session_id_rejected_without_insert() {
    let server = TestServer::start().await;
    let (session, _) = server.start_session().await;

    let (status, body) = server
        .request(
            Method::POST,
            "/api/messages",
            Some(json!({
                "started_case_id": "not-a-uuid",
                "content": "hello",
                "is_human": true,
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"], "validation_error");

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
        .fetch_one(&server.ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(total, 0);
    assert_eq!(db::messages::count_messages(&server.ctx.db_pool, session).await.unwrap(), 0);
}

#[tokio::test]
async fn test_submit_validation_errors() {
    let server = TestServer::start().await;
    let (session, personas) = server.start_session().await;
    let simulated = personas.iter().find(|p| !p.is_human).unwrap();

    // Empty content
    let (status, _) = server
        .request(
            Method::POST,
            "/api/messages",
            Some(json!({"started_case_id": session.to_string(), "content": "   ", "is_human": true})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Simulated persona claiming to be human
    let (status, _) = server
        .request(
            Method::POST,
            "/api/messages",
            Some(json!({
                "started_case_id": session.to_string(),
                "content": "hi",
                "is_human": true,
                "persona_id": simulated.persona_id.to_string(),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown session
    let (status, _) = server
        .request(
            Method::POST,
            "/api/messages",
            Some(json!({"started_case_id": SessionId::new().to_string(), "content": "hi", "is_human": true})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(db::messages::count_messages(&server.ctx.db_pool, session).await.unwrap(), 0);
}

#[tokio::test]
async fn test_incomplete_submit_body_is_validation_error() {
    let server = TestServer::start().await;
    let (session, _) = server.start_session().await;

    let bodies = [
        json!({"content": "hi", "is_human": true}),
        json!({"started_case_id": session.to_string(), "is_human": true}),
        json!({"started_case_id": 7, "content": "hi"}),
    ];
    for body in bodies {
        let (status, response) = server.request(Method::POST, "/api/messages", Some(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {}", body);
        let response = response.expect("JSON error body");
        assert_eq!(response["error"], "validation_error");
        assert!(response["details"].is_string());
    }

    assert_eq!(db::messages::count_messages(&server.ctx.db_pool, session).await.unwrap(), 0);
}

#[tokio::test]
async fn test_poll_returns_ordered_messages_after_cursor() {
    let server = TestServer::start().await;
    let (session, _) = server.start_session().await;

    let mut ids = Vec::new();
    for (content, is_human) in [("hello", true), ("hi there", false), ("how can I help", false)] {
        let (status, body) = server
            .request(
                Method::POST,
                "/api/messages",
                Some(json!({
                    "started_case_id": session.to_string(),
                    "content": content,
                    "is_human": is_human,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(body.unwrap()["message_id"].as_i64().unwrap());
    }

    let (status, body) = server
        .request(
            Method::GET,
            &format!("/api/messages?started_case_id={}", session),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let all: Vec<i64> = body
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["message_id"].as_i64().unwrap())
        .collect();
    assert_eq!(all, ids);

    let (status, body) = server
        .request(
            Method::GET,
            &format!("/api/messages?started_case_id={}&after_id={}", session, ids[0]),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let contents: Vec<String> = body
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(contents, vec!["hi there", "how can I help"]);
}

#[tokio::test]
async fn test_poll_rejects_foreign_cursor() {
    let server = TestServer::start().await;
    let (first, _) = server.start_session().await;
    let (second, _) = server.start_session().await;

    let (_, body) = server
        .request(
            Method::POST,
            "/api/messages",
            Some(json!({"started_case_id": first.to_string(), "content": "hello", "is_human": true})),
        )
        .await;
    let id = body.unwrap()["message_id"].as_i64().unwrap();

    let (status, _) = server
        .request(
            Method::GET,
            &format!("/api/messages?started_case_id={}&after_id={}", second, id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stream_rejects_unknown_last_seen_id() {
    let server = TestServer::start().await;
    let (session, _) = server.start_session().await;

    let (status, body) = server
        .request(
            Method::GET,
            &format!("/api/messages/stream?started_case_id={}&last_seen_id=12345", session),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"], "validation_error");
}

#[tokio::test]
async fn test_stream_sends_reconnect_when_storage_fails() {
    let server = TestServer::start().await;
    let (session, _) = server.start_session().await;
    let (status, body) = server
        .request(
            Method::POST,
            "/api/messages",
            Some(json!({"started_case_id": session.to_string(), "content": "hello", "is_human": true})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let m1 = body.unwrap()["message_id"].as_i64().unwrap();

    let request = Request::builder()
        .uri(format!("/api/messages/stream?started_case_id={}&last_seen_id={}", session, m1))
        .body(Body::empty())
        .unwrap();
    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The body is produced lazily: storage is gone before the replay runs
    server.ctx.db_pool.close().await;

    let bytes = tokio::time::timeout(
        Duration::from_secs(5),
        axum::body::to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("stream never finished")
    .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let events: Vec<(String, String)> = text
        .split("\n\n")
        .filter_map(|block| {
            let field = |name: &str| {
                block
                    .lines()
                    .find_map(|line| line.strip_prefix(name))
                    .map(|value| value.trim().to_string())
            };
            Some((field("event:")?, field("data:").unwrap_or_default()))
        })
        .collect();

    let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["connected", "reconnect"]);

    let hint: ReconnectHint = serde_json::from_str(&events[1].1).unwrap();
    assert_eq!(hint.last_seen_id, Some(m1));
    assert!(!hint.reason.is_empty());
}

#[tokio::test]
async fn test_ended_session_rejects_messages() {
    let server = TestServer::start().await;
    let (session, _) = server.start_session().await;

    let (status, body) = server
        .request(Method::POST, &format!("/api/sessions/{}/end", session), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["status"], "ended");

    let (status, _) = server
        .request(
            Method::POST,
            "/api/messages",
            Some(json!({"started_case_id": session.to_string(), "content": "late", "is_human": true})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_speech_disabled_returns_503() {
    let server = TestServer::start().await;
    let (status, body) = server
        .request(Method::POST, "/api/speech/synthesize", Some(json!({"text": "hello"})))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body.unwrap()["error"], "provider_unavailable");
}

#[tokio::test]
async fn test_synthesize_returns_audio() {
    let speech = FakeSpeech::transcribing("unused");
    let server = TestServer::start_with(|ctx| ctx.with_speech(speech.clone(), speech)).await;

    let (status, bytes) = server
        .request_raw(
            Method::POST,
            "/api/speech/synthesize",
            Some(json!({"text": "hello", "voice": "aura-luna-en"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"aura-luna-en:hello".to_vec());

    // Default voice when none given
    let (_, bytes) = server
        .request_raw(Method::POST, "/api/speech/synthesize", Some(json!({"text": "hi"})))
        .await;
    assert_eq!(bytes, b"aura-asteria-en:hi".to_vec());
}

#[tokio::test]
async fn test_transcribe_stores_human_message() {
    let speech = FakeSpeech::transcribing("I think the budget is too small");
    let server = TestServer::start_with(|ctx| ctx.with_speech(speech.clone(), speech)).await;
    let (session, _) = server.start_session().await;

    let audio = base64::engine::general_purpose::STANDARD.encode(b"fake webm bytes");
    let (status, body) = server
        .request(
            Method::POST,
            "/api/speech/transcribe",
            Some(json!({
                "started_case_id": session.to_string(),
                "audio": audio,
                "mime_type": "audio/webm",
            })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["transcription"], "I think the budget is too small");
    assert_eq!(body["message"]["is_human"], true);
    assert_eq!(body["message"]["metadata"]["source"], "speech-to-text");
    assert_eq!(body["message"]["metadata"]["provider"], "deepgram");
    assert_eq!(db::messages::count_messages(&server.ctx.db_pool, session).await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_transcription_stores_nothing() {
    let speech = FakeSpeech::failing();
    let server = TestServer::start_with(|ctx| ctx.with_speech(speech.clone(), speech)).await;
    let (session, _) = server.start_session().await;

    let audio = base64::engine::general_purpose::STANDARD.encode(b"fake");
    let (status, body) = server
        .request(
            Method::POST,
            "/api/speech/transcribe",
            Some(json!({
                "started_case_id": session.to_string(),
                "audio": audio,
                "mime_type": "audio/webm",
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body.unwrap()["error"], "transcription_error");
    assert_eq!(db::messages::count_messages(&server.ctx.db_pool, session).await.unwrap(), 0);
}

#[tokio::test]
async fn test_transcribe_rejects_bad_base64() {
    let speech = FakeSpeech::transcribing("text");
    let server = TestServer::start_with(|ctx| ctx.with_speech(speech.clone(), speech)).await;
    let (session, _) = server.start_session().await;

    let (status, _) = server
        .request(
            Method::POST,
            "/api/speech/transcribe",
            Some(json!({
                "started_case_id": session.to_string(),
                "audio": "%%% not base64 %%%",
                "mime_type": "audio/webm",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
