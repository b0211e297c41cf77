use super::*;
use crate::Result;
use crate::mcp::server::{McpHandler, UnknownSessionPolicy};
use crate::mcp::session::{McpSession, SessionTable};
use crate::model::{ToolCallResult, ToolContent, ToolDescriptor};
use crate::mcp::protocol::ServerIdentity;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use serde_json::{Map, json};
use tower::ServiceExt;

struct StubHost;

#[async_trait]
impl McpHandler for StubHost {
    async fn tools_list(&self, _session: &Arc<McpSession>) -> Result<Vec<ToolDescriptor>> {
        Ok(vec![ToolDescriptor {
            name: "read_note".to_string(),
            description: "read a note".to_string(),
            input_schema: json!({"type": "object"}),
        }])
    }

    async fn tools_call(
        &self,
        _session: &Arc<McpSession>,
        name: &str,
        _arguments: Map<String, serde_json::Value>,
    ) -> Result<ToolCallResult> {
        Ok(ToolCallResult::success(vec![ToolContent::text(format!(
            "called {}",
            name
        ))]))
    }
}

fn test_router(policy: UnknownSessionPolicy) -> (Router, Arc<McpServerCore>) {
    let core = Arc::new(McpServerCore::new(
        ServerIdentity::new("notegate-test"),
        Arc::new(SessionTable::new()),
        Arc::new(StubHost),
        policy,
    ));
    (mcp_routes(core.clone()), core)
}

fn rpc_body(id: i64, method: &str, params: serde_json::Value) -> Body {
    Body::from(
        json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string(),
    )
}

async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn open_session(router: &Router) -> String {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .body(rpc_body(1, "initialize", json!({"protocolVersion": "2025-03-26"})))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response
        .headers()
        .get("mcp-session-id")
        .expect("initialize must return a session id")
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_initialize_creates_session_and_returns_header() {
    let (router, core) = test_router(UnknownSessionPolicy::NotFound);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .body(rpc_body(1, "initialize", json!({"protocolVersion": "9.9"})))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let session_id = response
        .headers()
        .get("mcp-session-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(!session_id.is_empty());
    assert_eq!(
        response.headers().get("mcp-protocol-version").unwrap(),
        "9.9"
    );

    let body = read_json(response).await;
    assert_eq!(body["result"]["protocolVersion"], "9.9");
    assert_eq!(body["result"]["capabilities"]["tools"]["listChanged"], true);
    assert_eq!(core.sessions.len(), 1);
}

#[tokio::test]
async fn test_tools_list_on_established_session() {
    let (router, _core) = test_router(UnknownSessionPolicy::NotFound);
    let session_id = open_session(&router).await;

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .header("mcp-session-id", &session_id)
                .body(rpc_body(2, "tools/list", json!({})))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["id"], 2);
    assert_eq!(body["result"]["tools"][0]["name"], "read_note");
}

#[tokio::test]
async fn test_non_initialize_without_session_header_is_400() {
    let (router, _core) = test_router(UnknownSessionPolicy::NotFound);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .body(rpc_body(1, "tools/list", json!({})))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], -32000);
}

#[tokio::test]
async fn test_unknown_session_policy_statuses() {
    for (policy, expected) in [
        (UnknownSessionPolicy::NotFound, StatusCode::NOT_FOUND),
        (UnknownSessionPolicy::BadRequest, StatusCode::BAD_REQUEST),
    ] {
        let (router, _core) = test_router(policy);
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header("content-type", "application/json")
                    .header("mcp-session-id", "no-such-session")
                    .body(rpc_body(5, "tools/list", json!({})))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), expected);
        let body = read_json(response).await;
        assert_eq!(body["error"]["code"], -32000);
    }
}

#[tokio::test]
async fn test_second_initialize_on_session_is_protocol_error() {
    let (router, _core) = test_router(UnknownSessionPolicy::NotFound);
    let session_id = open_session(&router).await;

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .header("mcp-session-id", &session_id)
                .body(rpc_body(3, "initialize", json!({})))
                .unwrap(),
        )
        .await
        .unwrap();

    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], -32000);
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("already initialized")
    );
}

#[tokio::test]
async fn test_delete_removes_session() {
    let (router, core) = test_router(UnknownSessionPolicy::NotFound);
    let session_id = open_session(&router).await;

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/mcp")
                .header("mcp-session-id", &session_id)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(core.sessions.len(), 0);

    // The id is dead afterwards
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .header("mcp-session-id", &session_id)
                .body(rpc_body(4, "tools/list", json!({})))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_client_notification_is_accepted_without_body() {
    let (router, _core) = test_router(UnknownSessionPolicy::NotFound);
    let session_id = open_session(&router).await;

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .header("mcp-session-id", &session_id)
                .body(Body::from(
                    json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_malformed_json_is_parse_error() {
    let (router, _core) = test_router(UnknownSessionPolicy::NotFound);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], -32700);
}

#[tokio::test]
async fn test_post_with_event_stream_accept_returns_sse_frame() {
    let (router, _core) = test_router(UnknownSessionPolicy::NotFound);
    let session_id = open_session(&router).await;

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .header("accept", "text/event-stream")
                .header("mcp-session-id", &session_id)
                .body(rpc_body(6, "tools/list", json!({})))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("event: message"));

    let data = crate::mcp::client::parse_sse_data(&text).unwrap();
    let payload: serde_json::Value = serde_json::from_str(&data).unwrap();
    assert_eq!(payload["id"], 6);
    assert_eq!(payload["result"]["tools"][0]["name"], "read_note");
}

#[tokio::test]
async fn test_get_opens_sse_stream_once() {
    let (router, _core) = test_router(UnknownSessionPolicy::NotFound);
    let session_id = open_session(&router).await;

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/mcp")
                .header("mcp-session-id", &session_id)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    // Second stream on the same session is refused
    let second = router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/mcp")
                .header("mcp-session-id", &session_id)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_method_is_32601() {
    let (router, _core) = test_router(UnknownSessionPolicy::NotFound);
    let session_id = open_session(&router).await;

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .header("mcp-session-id", &session_id)
                .body(rpc_body(7, "resources/list", json!({})))
                .unwrap(),
        )
        .await
        .unwrap();

    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], -32601);
}
