//! End-to-end exchange tests against a scripted loopback service.
//!
//! The loopback server speaks the JSON event protocol over a real
//! websocket; no external transcoder is needed because these scenarios
//! either use raw PCM input (which skips the ingress transcode) or text
//! exchanges, and responses are text-only.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use voxlink_relay::{
    CollaboratorError, Relay, RelayConfig, TextCompletion, LAST_RESORT_REPLY,
};
use voxlink_types::{AudioCodec, FallbackKind, ReplySource};

const SENDER: &str = "+5511987654321";
const FALLBACK_TEXT: &str = "Resposta alternativa.";

struct CannedCompletion;

#[async_trait]
impl TextCompletion for CannedCompletion {
    async fn complete(&self, _prompt: &str) -> Result<String, CollaboratorError> {
        Ok(FALLBACK_TEXT.to_string())
    }
}

/// Accepts one connection, acknowledges configuration, then answers every
/// `response.request` with `events_on_request`, substituting `{count}`
/// with the number of `input.append` events seen since the last request.
async fn spawn_service(events_on_request: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut appends = 0usize;

        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
            match frame["type"].as_str().unwrap_or_default() {
                "session.configure" => {
                    ws.send(Message::Text(r#"{"type":"session.created"}"#.into()))
                        .await
                        .unwrap();
                    ws.send(Message::Text(r#"{"type":"session.updated"}"#.into()))
                        .await
                        .unwrap();
                }
                "input.append" => appends += 1,
                "input.commit" => {
                    ws.send(Message::Text(r#"{"type":"input.committed"}"#.into()))
                        .await
                        .unwrap();
                }
                "response.request" => {
                    for event in &events_on_request {
                        let event = event.replace("{count}", &appends.to_string());
                        ws.send(Message::Text(event)).await.unwrap();
                    }
                    appends = 0;
                }
                _ => {}
            }
        }
    });

    format!("ws://127.0.0.1:{port}/v1/stream")
}

fn relay_for(url: String) -> Relay {
    let mut config = RelayConfig::default();
    config.service.url = url;
    config.service.api_key = "sk-test".to_string();
    Relay::new(&config, Arc::new(CannedCompletion), None)
}

fn text_response_script() -> Vec<String> {
    vec![
        r#"{"type":"response.created"}"#.to_string(),
        r#"{"type":"response.text.delta","delta":"Olá! "}"#.to_string(),
        r#"{"type":"response.text.delta","delta":"Tudo bem?"}"#.to_string(),
        r#"{"type":"response.done"}"#.to_string(),
    ]
}

#[tokio::test]
async fn text_exchange_takes_realtime_path() {
    let url = spawn_service(text_response_script()).await;
    let relay = relay_for(url);

    let reply = relay
        .process_text_message("Olá, tudo bem?", SENDER)
        .await
        .unwrap();
    assert_eq!(reply.source, ReplySource::Realtime);
    assert_eq!(reply.text, "Olá! Tudo bem?");
    assert!(reply.fallback.is_none());
    assert!(reply.audio.is_none());
    assert!(reply.latency.response_wait.is_some());
}

#[tokio::test]
async fn pcm_audio_exchange_uploads_expected_chunk_count() {
    let url = spawn_service(vec![
        r#"{"type":"response.created"}"#.to_string(),
        r#"{"type":"response.text.delta","delta":"{count}"}"#.to_string(),
        r#"{"type":"response.done"}"#.to_string(),
    ])
    .await;
    let relay = relay_for(url);

    // 100 KiB of raw PCM at the canonical input rate needs no transcode
    // and splits into ceil(102400 / 24576) = 5 chunks.
    let audio = vec![0u8; 100 * 1024];
    let reply = relay
        .process_audio_message(&audio, AudioCodec::Pcm16, SENDER)
        .await
        .unwrap();
    assert_eq!(reply.source, ReplySource::Realtime);
    assert_eq!(reply.text, "5");
}

#[tokio::test]
async fn session_is_reused_across_exchanges() {
    let url = spawn_service(text_response_script()).await;
    let relay = relay_for(url);

    let first = relay.process_text_message("primeira", SENDER).await.unwrap();
    let second = relay.process_text_message("segunda", SENDER).await.unwrap();
    // Both served over the single connection the loopback server accepts.
    assert_eq!(first.source, ReplySource::Realtime);
    assert_eq!(second.source, ReplySource::Realtime);
}

#[tokio::test]
async fn deadline_expiry_falls_back_with_timeout() {
    // A server that acknowledges configuration but never answers
    // `response.request`.
    let url = spawn_service(vec![]).await;
    let mut config = RelayConfig::default();
    config.service.url = url;
    config.service.api_key = "sk-test".to_string();
    config.timing.exchange_deadline_secs = 1;
    let relay = Relay::new(&config, Arc::new(CannedCompletion), None);

    let reply = relay.process_text_message("oi", SENDER).await.unwrap();
    assert_eq!(reply.source, ReplySource::Fallback);
    assert_eq!(reply.fallback.unwrap().kind, FallbackKind::Timeout);
    assert_eq!(reply.text, FALLBACK_TEXT);
}

/// Serves one response per connection, then drops the socket, so any
/// parked session is stale by the time the next message arrives.
async fn spawn_one_shot_service(connections: Arc<AtomicUsize>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            connections.fetch_add(1, Ordering::SeqCst);
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(message)) = ws.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
                match frame["type"].as_str().unwrap_or_default() {
                    "session.configure" => {
                        ws.send(Message::Text(r#"{"type":"session.created"}"#.into()))
                            .await
                            .unwrap();
                        ws.send(Message::Text(r#"{"type":"session.updated"}"#.into()))
                            .await
                            .unwrap();
                    }
                    "response.request" => {
                        for event in text_response_script() {
                            ws.send(Message::Text(event)).await.unwrap();
                        }
                        break;
                    }
                    _ => {}
                }
            }
            // Dropping the socket here kills the parked session.
        }
    });

    format!("ws://127.0.0.1:{port}/v1/stream")
}

#[tokio::test]
async fn stale_parked_session_reconnects_once() {
    let connections = Arc::new(AtomicUsize::new(0));
    let url = spawn_one_shot_service(connections.clone()).await;
    let relay = relay_for(url);

    let first = relay.process_text_message("primeira", SENDER).await.unwrap();
    assert_eq!(first.source, ReplySource::Realtime);

    // The parked session's connection is gone; the second exchange must
    // still be served by the realtime path over a fresh connection.
    let second = relay.process_text_message("segunda", SENDER).await.unwrap();
    assert_eq!(second.source, ReplySource::Realtime);
    assert_eq!(second.text, "Olá! Tudo bem?");
    assert_eq!(connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn transcode_failure_falls_back_with_canned_reply() {
    let url = spawn_service(text_response_script()).await;
    let mut config = RelayConfig::default();
    config.service.url = url;
    config.service.api_key = "sk-test".to_string();
    config.pipeline.ffmpeg_path = "/nonexistent/voxlink-ffmpeg".to_string();
    let relay = Relay::new(&config, Arc::new(CannedCompletion), None);

    let reply = relay
        .process_audio_message(&[1, 2, 3, 4], AudioCodec::OggOpus, SENDER)
        .await
        .unwrap();
    assert_eq!(reply.source, ReplySource::Fallback);
    let reason = reply.fallback.unwrap();
    assert_eq!(reason.kind, FallbackKind::TranscodeFailed);
    // Audio messages carry no transcript, so the canned reply is used.
    assert_eq!(reply.text, LAST_RESORT_REPLY);
}

#[tokio::test]
async fn empty_response_falls_back_with_collaborator_reply() {
    let url = spawn_service(vec![
        r#"{"type":"response.created"}"#.to_string(),
        r#"{"type":"response.done"}"#.to_string(),
    ])
    .await;
    let relay = relay_for(url);

    let reply = relay.process_text_message("oi", SENDER).await.unwrap();
    assert_eq!(reply.source, ReplySource::Fallback);
    assert_eq!(reply.fallback.unwrap().kind, FallbackKind::EmptyResponse);
    assert_eq!(reply.text, FALLBACK_TEXT);
}

#[tokio::test]
async fn remote_error_falls_back() {
    let url = spawn_service(vec![
        r#"{"type":"error","message":"overloaded"}"#.to_string(),
    ])
    .await;
    let relay = relay_for(url);

    let reply = relay.process_text_message("oi", SENDER).await.unwrap();
    assert_eq!(reply.source, ReplySource::Fallback);
    let reason = reply.fallback.unwrap();
    assert_eq!(reason.kind, FallbackKind::ConnectionError);
    assert!(reason.detail.contains("overloaded"));
    assert_eq!(reply.text, FALLBACK_TEXT);
}

#[tokio::test]
async fn connect_failure_falls_back() {
    // Bind then drop to get a port with no listener.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let relay = relay_for(format!("ws://127.0.0.1:{port}/v1/stream"));
    let reply = relay.process_text_message("oi", SENDER).await.unwrap();
    assert_eq!(reply.source, ReplySource::Fallback);
    assert_eq!(reply.fallback.unwrap().kind, FallbackKind::ConnectionError);
    assert_eq!(reply.text, FALLBACK_TEXT);
}

#[tokio::test]
async fn enforced_budget_replaces_slow_reply() {
    let url = spawn_service(text_response_script()).await;
    let mut config = RelayConfig::default();
    config.service.url = url;
    config.service.api_key = "sk-test".to_string();
    config.timing.budget_ms = 0;
    config.timing.enforce_budget = true;
    let relay = Relay::new(&config, Arc::new(CannedCompletion), None);

    let reply = relay.process_text_message("oi", SENDER).await.unwrap();
    assert_eq!(reply.source, ReplySource::Fallback);
    assert_eq!(reply.fallback.unwrap().kind, FallbackKind::BudgetExceeded);
    assert_eq!(reply.text, FALLBACK_TEXT);
}

#[tokio::test]
async fn unenforced_budget_is_report_only() {
    let url = spawn_service(text_response_script()).await;
    let mut config = RelayConfig::default();
    config.service.url = url;
    config.service.api_key = "sk-test".to_string();
    config.timing.budget_ms = 0;
    let relay = Relay::new(&config, Arc::new(CannedCompletion), None);

    let reply = relay.process_text_message("oi", SENDER).await.unwrap();
    assert_eq!(reply.source, ReplySource::Realtime);
    assert!(!reply.latency.within_budget());
}
