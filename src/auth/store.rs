//! In-memory token store
//!
//! Registered OAuth clients, one-time authorization codes, access and
//! refresh tokens, plugin bindings and pending authorizations. All
//! maps live behind per-structure locks; one-time records are removed
//! under their mutex so exactly one caller ever sees success.

use crate::constants::SWEEP_INTERVAL_SECS;
use crate::model::{
    AccessToken, AuthorizationCode, OAuthClient, PendingAuth, PluginToken, RefreshToken,
};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct TokenStore {
    clients: RwLock<HashMap<String, OAuthClient>>,
    codes: Mutex<HashMap<String, AuthorizationCode>>,
    access_tokens: RwLock<HashMap<String, AccessToken>>,
    refresh_tokens: Mutex<HashMap<String, RefreshToken>>,
    plugin_tokens: RwLock<HashMap<String, PluginToken>>,
    pending: Mutex<HashMap<String, PendingAuth>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // OAuth clients
    // ------------------------------------------------------------------

    pub fn insert_client(&self, client: OAuthClient) {
        self.clients.write().insert(client.client_id.clone(), client);
    }

    pub fn client(&self, client_id: &str) -> Option<OAuthClient> {
        self.clients.read().get(client_id).cloned()
    }

    // ------------------------------------------------------------------
    // Authorization codes (single-use)
    // ------------------------------------------------------------------

    pub fn insert_code(&self, code: AuthorizationCode) {
        self.codes.lock().insert(code.code.clone(), code);
    }

    /// Redeem a code. Removal happens under the mutex, so a code is
    /// consumed exactly once even under concurrent requests; expired
    /// codes redeem as absent.
    pub fn consume_code(&self, code: &str) -> Option<AuthorizationCode> {
        let record = self.codes.lock().remove(code)?;
        if record.expires_at < Utc::now() {
            return None;
        }
        Some(record)
    }

    // ------------------------------------------------------------------
    // Access tokens
    // ------------------------------------------------------------------

    pub fn insert_access(&self, token: AccessToken) {
        self.access_tokens.write().insert(token.token.clone(), token);
    }

    /// Look up a live access token; expired entries are dropped on read.
    pub fn access_token(&self, token: &str) -> Option<AccessToken> {
        let record = self.access_tokens.read().get(token).cloned()?;
        if record.expires_at < Utc::now() {
            self.access_tokens.write().remove(token);
            return None;
        }
        Some(record)
    }

    pub fn revoke_access(&self, token: &str) -> bool {
        self.access_tokens.write().remove(token).is_some()
    }

    // ------------------------------------------------------------------
    // Refresh tokens (single-use, rotated)
    // ------------------------------------------------------------------

    pub fn insert_refresh(&self, token: RefreshToken) {
        self.refresh_tokens.lock().insert(token.token.clone(), token);
    }

    /// Consume a refresh token for rotation. The old token and the
    /// access token it minted are both gone before this returns, so
    /// the retired pair is never observable alongside the new one.
    pub fn consume_refresh(&self, token: &str) -> Option<RefreshToken> {
        let mut refresh_tokens = self.refresh_tokens.lock();
        let record = refresh_tokens.remove(token)?;
        self.access_tokens.write().remove(&record.access_token);
        Some(record)
    }

    pub fn revoke_refresh(&self, token: &str) -> bool {
        self.refresh_tokens.lock().remove(token).is_some()
    }

    // ------------------------------------------------------------------
    // Plugin bindings
    // ------------------------------------------------------------------

    pub fn upsert_plugin(&self, token: PluginToken) {
        self.plugin_tokens.write().insert(token.id.clone(), token);
    }

    pub fn plugin(&self, id: &str) -> Option<PluginToken> {
        self.plugin_tokens.read().get(id).cloned()
    }

    pub fn remove_plugin(&self, id: &str) -> bool {
        self.plugin_tokens.write().remove(id).is_some()
    }

    pub fn plugins(&self) -> Vec<PluginToken> {
        let mut plugins: Vec<PluginToken> = self.plugin_tokens.read().values().cloned().collect();
        plugins.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        plugins
    }

    /// A user has at most one active binding; the oldest record wins.
    pub fn plugin_for_user(&self, user_id: &str) -> Option<PluginToken> {
        self.plugins()
            .into_iter()
            .find(|plugin| plugin.user_id == user_id)
    }

    // ------------------------------------------------------------------
    // Pending authorizations (single-use, keyed by upstream state)
    // ------------------------------------------------------------------

    pub fn insert_pending(&self, pending: PendingAuth) {
        self.pending.lock().insert(pending.state.clone(), pending);
    }

    pub fn consume_pending(&self, state: &str) -> Option<PendingAuth> {
        let record = self.pending.lock().remove(state)?;
        if record.expires_at < Utc::now() {
            return None;
        }
        Some(record)
    }

    /// Opportunistic cleanup, also run by the periodic sweeper
    pub fn sweep_pending(&self) {
        let now = Utc::now();
        self.pending.lock().retain(|_, p| p.expires_at > now);
    }

    // ------------------------------------------------------------------
    // Expiry sweep
    // ------------------------------------------------------------------

    /// Purge expired access tokens, authorization codes and pendings
    pub fn sweep(&self) {
        let now = Utc::now();
        self.access_tokens.write().retain(|_, t| t.expires_at > now);
        self.codes.lock().retain(|_, c| c.expires_at > now);
        self.pending.lock().retain(|_, p| p.expires_at > now);
    }

    /// Periodic sweep task
    pub fn spawn_sweeper(store: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                store.sweep();
            }
        })
    }
}
