//! End-to-end tests for the agent push stream over a real listener

use session_bridge::codec::{AgentStreamEvent, SESSION_ID_HEADER};
use session_bridge::gateway::{Gateway, GatewayBuilder};
use session_bridge::stream::{AgentClient, EventStreamParser};
use session_bridge::BridgeConfig;
use std::net::SocketAddr;
use tempfile::TempDir;

async fn start_gateway(config: BridgeConfig) -> (Gateway, SocketAddr) {
    let gateway = GatewayBuilder::new().config(config).port(0).build().unwrap();
    tokio_test::assert_ok!(gateway.start().await);
    let addr = gateway.local_addr().await.unwrap();
    (gateway, addr)
}

#[tokio::test]
async fn test_new_session_then_resume() {
    let (gateway, addr) = start_gateway(BridgeConfig::default()).await;
    let mut client = AgentClient::new(format!("http://{}", addr));

    let mut kinds = Vec::new();
    let first = client
        .send("my favourite colour is teal", |event, _| kinds.push(event.kind()))
        .await
        .unwrap();
    assert_eq!(kinds.first(), Some(&"session"));
    assert_eq!(kinds.last(), Some(&"done"));
    assert_eq!(first.content_text, "You said \"my favourite colour is teal\".");

    let session_id = client.session_id().unwrap().to_string();

    let mut kinds = Vec::new();
    let second = client
        .send("what did I say?", |event, _| kinds.push(event.kind()))
        .await
        .unwrap();
    assert!(!kinds.contains(&"session"));
    assert_eq!(client.session_id(), Some(session_id.as_str()));
    assert!(second
        .content_text
        .contains("Earlier you said \"my favourite colour is teal\""));
    assert_eq!(second.tool_calls.len(), 1);
    assert!(second.tool_calls[0].is_resolved());

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn test_raw_stream_wire_format() {
    let (gateway, addr) = start_gateway(BridgeConfig::default()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/api/agent/stream", addr))
        .json(&serde_json::json!({"message": "ping"}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let session_id = response.headers()[SESSION_ID_HEADER]
        .to_str()
        .unwrap()
        .to_string();

    let body = response.bytes().await.unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(text.starts_with("event: session\ndata: "), "{}", text);

    let events = EventStreamParser::parse_all(&body);
    assert_eq!(events[0], AgentStreamEvent::Session { session_id });
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn test_unknown_session_mints_fresh_identifier() {
    let (gateway, addr) = start_gateway(BridgeConfig::default()).await;

    let mut client = AgentClient::new(format!("http://{}/", addr)).with_session("expired-id");
    let mut first_event = None;
    client
        .send("hello", |event, _| {
            first_event.get_or_insert_with(|| event.clone());
        })
        .await
        .unwrap();

    let minted = client.session_id().unwrap().to_string();
    assert_ne!(minted, "expired-id");
    assert_eq!(first_event, Some(AgentStreamEvent::Session { session_id: minted }));

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn test_history_survives_restart_with_file_store() {
    let dir = TempDir::new().unwrap();
    let mut config = BridgeConfig::default();
    config.agent.history_dir = Some(dir.path().to_path_buf());

    let (gateway, addr) = start_gateway(config.clone()).await;
    let mut client = AgentClient::new(format!("http://{}", addr));
    client.send("before restart", |_, _| {}).await.unwrap();
    let session_id = client.session_id().unwrap().to_string();
    gateway.stop().await.unwrap();

    let (gateway, addr) = start_gateway(config).await;
    let mut client = AgentClient::new(format!("http://{}", addr)).with_session(session_id.clone());
    let reply = client.send("after restart", |_, _| {}).await.unwrap();
    assert_eq!(client.session_id(), Some(session_id.as_str()));
    assert!(reply.content_text.contains("Earlier you said \"before restart\""));

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn test_event_stream_api() {
    use futures::StreamExt;

    let (gateway, addr) = start_gateway(BridgeConfig::default()).await;
    let client = AgentClient::new(format!("http://{}", addr));

    let stream = client.events("hi there").await.unwrap();
    let events: Vec<AgentStreamEvent> = stream.map(|e| e.unwrap()).collect().await;
    assert_eq!(events.first().map(|e| e.kind()), Some("session"));
    assert_eq!(events.last(), Some(&AgentStreamEvent::Done));

    gateway.stop().await.unwrap();
}
