//! Per-user upstream routing
//!
//! Each MCP session on the gateway is bound to exactly one upstream
//! session on the owning user's plugin bridge; the binding lives as
//! long as the local session. An upstream 404 on a bound session is
//! recovered once by re-initializing upstream and replaying the call.

use crate::auth::TokenStore;
use crate::constants::UPSTREAM_TIMEOUT_SECS;
use crate::mcp::client::{McpHttpClient, UpstreamError};
use crate::mcp::server::McpHandler;
use crate::mcp::session::McpSession;
use crate::model::{PluginToken, ToolCallResult, ToolDescriptor};
use crate::registry::fingerprint_tools;
use crate::{NotegateError, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Error text for tools/call without a registered plugin
const NO_PLUGIN_MESSAGE: &str = "No plugin configuration found for user";

/// One local session's upstream binding
struct UpstreamBinding {
    client: Arc<McpHttpClient>,
    upstream_session: String,
    plugin_id: String,
}

/// Cached upstream tool view, maintained by the poller and used as a
/// fallback when the live upstream hop fails.
#[derive(Clone)]
pub struct CachedTools {
    pub hash: String,
    pub tools: Vec<ToolDescriptor>,
}

/// Routes MCP traffic from gateway sessions to plugin bridges
pub struct UpstreamRouter {
    store: Arc<TokenStore>,
    bindings: Mutex<HashMap<String, Arc<UpstreamBinding>>>,
    cache: RwLock<HashMap<String, CachedTools>>,
    upstream_timeout: Duration,
}

impl UpstreamRouter {
    pub fn new(store: Arc<TokenStore>) -> Self {
        Self::with_timeout(store, Duration::from_secs(UPSTREAM_TIMEOUT_SECS))
    }

    pub fn with_timeout(store: Arc<TokenStore>, upstream_timeout: Duration) -> Self {
        Self {
            store,
            bindings: Mutex::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
            upstream_timeout,
        }
    }

    /// Swap in a fresh tool view for a user; reports whether the
    /// fingerprint moved from a previously observed value.
    pub fn update_cache(&self, user_id: &str, hash: String, tools: Vec<ToolDescriptor>) -> bool {
        let mut cache = self.cache.write();
        let changed = cache
            .get(user_id)
            .is_some_and(|cached| cached.hash != hash);
        cache.insert(user_id.to_string(), CachedTools { hash, tools });
        changed
    }

    pub fn cached(&self, user_id: &str) -> Option<CachedTools> {
        self.cache.read().get(user_id).cloned()
    }

    /// The binding for a session, opening the upstream session on
    /// first use. A plugin swap (re-registration) drops stale
    /// bindings.
    async fn ensure_binding(
        &self,
        session: &McpSession,
        plugin: &PluginToken,
    ) -> std::result::Result<Arc<UpstreamBinding>, UpstreamError> {
        if let Some(binding) = self.bindings.lock().get(&session.id)
            && binding.plugin_id == plugin.id
        {
            return Ok(binding.clone());
        }
        self.open_binding(session, plugin).await
    }

    /// Open a fresh upstream session and bind it to the local one
    async fn open_binding(
        &self,
        session: &McpSession,
        plugin: &PluginToken,
    ) -> std::result::Result<Arc<UpstreamBinding>, UpstreamError> {
        let api_key = plugin.require_auth.then(|| plugin.secret.clone());
        let client = Arc::new(McpHttpClient::new(
            &plugin.base_url(),
            api_key,
            self.upstream_timeout,
        )?);

        let upstream_session = client.initialize().await?;
        tracing::info!(
            session = %session.id,
            upstream = %upstream_session,
            plugin = %plugin.id,
            "opened upstream session"
        );

        let binding = Arc::new(UpstreamBinding {
            client,
            upstream_session,
            plugin_id: plugin.id.clone(),
        });
        self.bindings
            .lock()
            .insert(session.id.clone(), binding.clone());
        Ok(binding)
    }

    /// Forward a request on a session's upstream binding.
    ///
    /// On a 404 the upstream session is re-initialized exactly once
    /// and the call replayed; a second 404 surfaces to the caller.
    async fn forward(
        &self,
        session: &McpSession,
        plugin: &PluginToken,
        method: &str,
        params: Option<Value>,
    ) -> std::result::Result<crate::mcp::protocol::JsonRpcResponse, UpstreamError> {
        let binding = self.ensure_binding(session, plugin).await?;

        match binding
            .client
            .request(&binding.upstream_session, method, params.clone())
            .await
        {
            Err(UpstreamError::SessionExpired) => {
                tracing::info!(
                    session = %session.id,
                    "upstream session expired, re-initializing once"
                );
                let binding = self.open_binding(session, plugin).await?;
                binding
                    .client
                    .request(&binding.upstream_session, method, params)
                    .await
            }
            other => other,
        }
    }

    fn plugin_for(&self, session: &McpSession) -> Option<PluginToken> {
        let user_id = session.user_id.as_deref()?;
        self.store.plugin_for_user(user_id)
    }
}

#[async_trait]
impl McpHandler for UpstreamRouter {
    async fn tools_list(&self, session: &Arc<McpSession>) -> Result<Vec<ToolDescriptor>> {
        // Unconfigured users see an empty tool set, not an error
        let Some(plugin) = self.plugin_for(session) else {
            return Ok(Vec::new());
        };

        match self.forward(session, &plugin, "tools/list", None).await {
            Ok(response) => {
                if let Some(error) = response.error {
                    return Err(NotegateError::upstream(error.message));
                }
                let tools: Vec<ToolDescriptor> = response
                    .result
                    .as_ref()
                    .and_then(|r| r.get("tools"))
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()?
                    .unwrap_or_default();

                if let Some(user_id) = &session.user_id {
                    self.update_cache(user_id, fingerprint_tools(&tools), tools.clone());
                }
                Ok(tools)
            }
            Err(e) => {
                // The previous cache keeps serving across upstream outages
                if let Some(cached) = session
                    .user_id
                    .as_deref()
                    .and_then(|user| self.cached(user))
                {
                    tracing::warn!(session = %session.id, error = %e, "serving cached tool view");
                    return Ok(cached.tools);
                }
                Err(NotegateError::upstream(e.to_string()))
            }
        }
    }

    async fn tools_call(
        &self,
        session: &Arc<McpSession>,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolCallResult> {
        let Some(plugin) = self.plugin_for(session) else {
            return Ok(ToolCallResult::error(NO_PLUGIN_MESSAGE));
        };

        let params = json!({"name": name, "arguments": arguments});
        match self
            .forward(session, &plugin, "tools/call", Some(params))
            .await
        {
            Ok(response) => {
                if let Some(error) = response.error {
                    return Ok(ToolCallResult::error(format!("Error: {}", error.message)));
                }
                match response.result {
                    Some(result) => serde_json::from_value(result).map_err(|e| {
                        NotegateError::upstream(format!("malformed upstream tool result: {}", e))
                    }),
                    None => Ok(ToolCallResult::error("Error: empty upstream response")),
                }
            }
            // The one permitted recovery already ran inside forward()
            Err(UpstreamError::SessionExpired) => Ok(ToolCallResult::error(
                "Error: upstream session expired",
            )),
            Err(e) => Ok(ToolCallResult::error(format!("Error: {}", e))),
        }
    }

    async fn session_closed(&self, session: &Arc<McpSession>) {
        let binding = self.bindings.lock().remove(&session.id);
        if let Some(binding) = binding {
            tracing::debug!(session = %session.id, "closing upstream session");
            if let Err(e) = binding
                .client
                .delete_session(&binding.upstream_session)
                .await
            {
                tracing::debug!(session = %session.id, error = %e, "upstream DELETE failed");
            }
        }
    }
}
