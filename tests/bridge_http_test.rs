//! End-to-end tests for the plugin bridge over real HTTP
//!
//! Drives the `/mcp` streamable HTTP surface and the `/bridge/v1`
//! REST surface of a bridge listening on an ephemeral loopback port.

use notegate::bridge::notes::{NoteVault, register_note_tools};
use notegate::bridge::{BridgeState, build_bridge, build_router, spawn_background_tasks};
use notegate::registry::ToolRegistry;
use serde_json::{Value, json};
use std::sync::Arc;

async fn spawn_bridge(api_key: Option<&str>) -> (String, Arc<BridgeState>) {
    let registry = Arc::new(ToolRegistry::new());
    register_note_tools(&registry, NoteVault::with_samples()).unwrap();
    let state = build_bridge(registry, api_key.map(|k| k.to_string()));
    let app = build_router(state.clone());
    let _tasks = spawn_background_tasks(&state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (base, state)
}

fn rpc(id: i64, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

async fn initialize(client: &reqwest::Client, base: &str) -> String {
    let response = client
        .post(format!("{}/mcp", base))
        .json(&rpc(1, "initialize", json!({"protocolVersion": "2025-03-26"})))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let session_id = response
        .headers()
        .get("mcp-session-id")
        .expect("initialize must return MCP-Session-Id")
        .to_str()
        .unwrap()
        .to_string();
    assert!(!session_id.is_empty());
    session_id
}

#[tokio::test]
async fn test_initialize_then_tools_list() {
    let (base, _state) = spawn_bridge(None).await;
    let client = reqwest::Client::new();

    let session_id = initialize(&client, &base).await;

    let response = client
        .post(format!("{}/mcp", base))
        .header("mcp-session-id", &session_id)
        .json(&rpc(2, "tools/list", json!({})))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    let names: Vec<&str> = body["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["edit_note", "list_notes", "read_note", "search_notes"]
    );
}

#[tokio::test]
async fn test_unknown_session_is_404_on_tier_a() {
    let (base, _state) = spawn_bridge(None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/mcp", base))
        .header("mcp-session-id", "bogus-session")
        .json(&rpc(1, "tools/list", json!({})))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32000);
}

#[tokio::test]
async fn test_delete_session_then_requests_fail() {
    let (base, _state) = spawn_bridge(None).await;
    let client = reqwest::Client::new();
    let session_id = initialize(&client, &base).await;

    let response = client
        .delete(format!("{}/mcp", base))
        .header("mcp-session-id", &session_id)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let response = client
        .post(format!("{}/mcp", base))
        .header("mcp-session-id", &session_id)
        .json(&rpc(2, "tools/list", json!({})))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_edit_note_gated_on_read_note_per_session() {
    let (base, _state) = spawn_bridge(None).await;
    let client = reqwest::Client::new();
    let session_id = initialize(&client, &base).await;

    let call = |id: i64, name: &str, arguments: Value| {
        rpc(id, "tools/call", json!({"name": name, "arguments": arguments}))
    };

    let response = client
        .post(format!("{}/mcp", base))
        .header("mcp-session-id", &session_id)
        .json(&call(2, "edit_note", json!({"path": "welcome.md", "content": "x"})))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200, "tool failures are in-band");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["isError"], true);
    assert!(
        body["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("read_note must be called before edit_note")
    );

    let response = client
        .post(format!("{}/mcp", base))
        .header("mcp-session-id", &session_id)
        .json(&call(3, "read_note", json!({"path": "welcome.md"})))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert!(body["result"].get("isError").is_none());

    let response = client
        .post(format!("{}/mcp", base))
        .header("mcp-session-id", &session_id)
        .json(&call(4, "edit_note", json!({"path": "welcome.md", "content": "edited"})))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert!(
        body["result"].get("isError").is_none(),
        "edit_note runs normally after a successful read_note"
    );

    // A fresh session starts gated again
    let other_session = initialize(&client, &base).await;
    let response = client
        .post(format!("{}/mcp", base))
        .header("mcp-session-id", &other_session)
        .json(&call(2, "edit_note", json!({"path": "welcome.md", "content": "x"})))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["isError"], true);
}

#[tokio::test]
async fn test_sse_framing_on_request() {
    let (base, _state) = spawn_bridge(None).await;
    let client = reqwest::Client::new();
    let session_id = initialize(&client, &base).await;

    let response = client
        .post(format!("{}/mcp", base))
        .header("mcp-session-id", &session_id)
        .header("accept", "text/event-stream")
        .json(&rpc(2, "tools/list", json!({})))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(
        response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let text = response.text().await.unwrap();
    let data = notegate::mcp::parse_sse_data(&text).unwrap();
    let payload: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(payload["id"], 2);
    assert!(payload["result"]["tools"].is_array());
}

#[tokio::test]
async fn test_api_key_enforced_over_http() {
    let (base, _state) = spawn_bridge(Some("vault-key")).await;
    let client = reqwest::Client::new();

    let denied = client
        .post(format!("{}/mcp", base))
        .json(&rpc(1, "initialize", json!({})))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 401);

    let allowed = client
        .post(format!("{}/mcp", base))
        .header("X-Api-Key", "vault-key")
        .json(&rpc(1, "initialize", json!({})))
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);
}

#[tokio::test]
async fn test_v1_and_mcp_share_one_tool_set_live() {
    let (base, state) = spawn_bridge(None).await;
    let client = reqwest::Client::new();

    let v1: Value = client
        .get(format!("{}/bridge/v1/tools", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let before_hash = v1["hash"].as_str().unwrap().to_string();
    assert_eq!(v1["tools"].as_array().unwrap().len(), 4);

    // Mutating the registry changes both surfaces and the hash
    state.registry.unregister("list_notes");

    let v1: Value = client
        .get(format!("{}/bridge/v1/tools", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(v1["tools"].as_array().unwrap().len(), 3);
    assert_ne!(v1["hash"].as_str().unwrap(), before_hash);

    let session_id = initialize(&client, &base).await;
    let mcp: Value = client
        .post(format!("{}/mcp", base))
        .header("mcp-session-id", &session_id)
        .json(&rpc(2, "tools/list", json!({})))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mcp["result"]["tools"], v1["tools"]);
}

#[tokio::test]
async fn test_sse_stream_delivers_list_changed() {
    let (base, state) = spawn_bridge(None).await;
    let client = reqwest::Client::new();
    let session_id = initialize(&client, &base).await;

    let mut response = client
        .get(format!("{}/mcp", base))
        .header("mcp-session-id", &session_id)
        .header("accept", "text/event-stream")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Trigger a fingerprint change while the stream is open
    state.registry.unregister("search_notes");

    let mut collected = String::new();
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(std::time::Duration::from_secs(1), response.chunk()).await {
            Ok(Ok(Some(chunk))) => {
                collected.push_str(&String::from_utf8_lossy(&chunk));
                if collected.contains("notifications/tools/list_changed") {
                    return;
                }
            }
            _ => {}
        }
    }
    panic!("expected a tools/list_changed frame, got: {}", collected);
}
