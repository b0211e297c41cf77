//! Upstream fingerprint poller
//!
//! Every few seconds the gateway asks each registered plugin bridge
//! for its tool list over the cheap v1 surface and compares the
//! published hash. On change the cached view is swapped and the
//! owning user's open sessions get `tools/list_changed`. Poll
//! failures are logged and the previous cache keeps serving.

use super::router::UpstreamRouter;
use crate::auth::TokenStore;
use crate::constants::{LOCAL_TIMEOUT_SECS, TOOL_POLL_INTERVAL_SECS};
use crate::mcp::server::McpServerCore;
use crate::model::ToolDescriptor;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Deserialize)]
struct V1ToolsResponse {
    tools: Vec<ToolDescriptor>,
    hash: String,
}

/// Spawn the periodic poll loop
pub fn spawn_tool_poller(
    store: Arc<TokenStore>,
    router: Arc<UpstreamRouter>,
    core: Arc<McpServerCore>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let http = match reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(LOCAL_TIMEOUT_SECS))
            .build()
        {
            Ok(http) => http,
            Err(e) => {
                tracing::error!("tool poller disabled, HTTP client failed to build: {}", e);
                return;
            }
        };

        let mut interval =
            tokio::time::interval(Duration::from_secs(TOOL_POLL_INTERVAL_SECS));
        loop {
            interval.tick().await;
            poll_once(&http, &store, &router, &core).await;
        }
    })
}

async fn poll_once(
    http: &reqwest::Client,
    store: &TokenStore,
    router: &UpstreamRouter,
    core: &McpServerCore,
) {
    // One poll per user; the lookup rule means the oldest binding wins
    let mut seen_users: HashSet<String> = HashSet::new();

    for plugin in store.plugins() {
        if !seen_users.insert(plugin.user_id.clone()) {
            continue;
        }

        let url = format!("{}/bridge/v1/tools", plugin.base_url());
        let response = match http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(plugin = %plugin.id, error = %e, "tool poll failed");
                continue;
            }
        };
        if !response.status().is_success() {
            tracing::debug!(plugin = %plugin.id, status = %response.status(), "tool poll rejected");
            continue;
        }

        let body: V1ToolsResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(plugin = %plugin.id, error = %e, "tool poll returned bad JSON");
                continue;
            }
        };

        if router.update_cache(&plugin.user_id, body.hash, body.tools) {
            tracing::info!(user = %plugin.user_id, "upstream tool set changed");
            core.notify_tools_changed_for_user(&plugin.user_id);
        }
    }
}
