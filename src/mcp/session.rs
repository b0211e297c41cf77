//! MCP session table
//!
//! Maps a session id to its bound transport state: the per-session
//! serialisation lock, the SSE notification channel, the satisfied
//! tool preconditions, and (on the gateway) the authenticated user.
//! Sessions die on client DELETE, transport close, or idle timeout.

use crate::constants::SESSION_IDLE_TIMEOUT_SECS;
use crate::mcp::protocol::JsonRpcNotification;
use crate::registry::executor::PreconditionState;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex as SyncMutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Authenticated user attached to `/mcp` requests by the gateway's
/// bearer middleware; the transport binds it to new sessions.
#[derive(Clone, Debug)]
pub struct SessionUser(pub String);

/// One MCP session and its transport-side state
pub struct McpSession {
    /// URL-safe random id, issued on `initialize`
    pub id: String,

    /// Bound user identity (gateway only)
    pub user_id: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Serialises request handling within the session; cross-session
    /// handling stays concurrent.
    pub serialize: Mutex<()>,

    last_activity: RwLock<DateTime<Utc>>,
    protocol_version: RwLock<Option<String>>,
    preconditions: RwLock<HashSet<String>>,
    events: mpsc::UnboundedSender<JsonRpcNotification>,
    event_stream: SyncMutex<Option<mpsc::UnboundedReceiver<JsonRpcNotification>>>,
}

impl McpSession {
    fn new(user_id: Option<String>) -> Arc<Self> {
        let (events, receiver) = mpsc::unbounded_channel();
        Arc::new(Self {
            id: generate_session_id(),
            user_id,
            created_at: Utc::now(),
            serialize: Mutex::new(()),
            last_activity: RwLock::new(Utc::now()),
            protocol_version: RwLock::new(None),
            preconditions: RwLock::new(HashSet::new()),
            events,
            event_stream: SyncMutex::new(Some(receiver)),
        })
    }

    pub fn touch(&self) {
        *self.last_activity.write() = Utc::now();
    }

    pub fn idle_since(&self) -> DateTime<Utc> {
        *self.last_activity.read()
    }

    pub fn set_protocol_version(&self, version: &str) {
        *self.protocol_version.write() = Some(version.to_string());
    }

    pub fn protocol_version(&self) -> Option<String> {
        self.protocol_version.read().clone()
    }

    /// Queue a server-to-client notification for the SSE stream.
    /// Notifications sent before the stream is opened are buffered.
    pub fn notify(&self, notification: JsonRpcNotification) -> bool {
        self.events.send(notification).is_ok()
    }

    /// Hand out the SSE receiver; a session carries exactly one stream.
    pub fn take_event_stream(&self) -> Option<mpsc::UnboundedReceiver<JsonRpcNotification>> {
        self.event_stream.lock().take()
    }
}

impl PreconditionState for McpSession {
    fn satisfied(&self, tool: &str) -> bool {
        self.preconditions.read().contains(tool)
    }

    fn satisfy(&self, tool: &str) {
        self.preconditions.write().insert(tool.to_string());
    }
}

/// Table of live sessions with idle expiry
pub struct SessionTable {
    sessions: RwLock<HashMap<String, Arc<McpSession>>>,
    idle_timeout: Duration,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::with_idle_timeout(Duration::seconds(SESSION_IDLE_TIMEOUT_SECS))
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Create a session for a successful `initialize`
    pub fn create(&self, user_id: Option<String>) -> Arc<McpSession> {
        let session = McpSession::new(user_id);
        self.sessions
            .write()
            .insert(session.id.clone(), session.clone());
        tracing::debug!(session = %session.id, "created MCP session");
        session
    }

    /// Look up a live session, refreshing its activity clock.
    /// An idle-expired session is removed and reported as absent.
    pub fn get(&self, session_id: &str) -> Option<Arc<McpSession>> {
        let session = self.sessions.read().get(session_id).cloned()?;
        if Utc::now() - session.idle_since() > self.idle_timeout {
            self.sessions.write().remove(session_id);
            return None;
        }
        session.touch();
        Some(session)
    }

    /// Remove a session (client DELETE or transport close)
    pub fn remove(&self, session_id: &str) -> Option<Arc<McpSession>> {
        let removed = self.sessions.write().remove(session_id);
        if removed.is_some() {
            tracing::debug!(session = %session_id, "removed MCP session");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Deliver a notification to every open session
    pub fn broadcast(&self, notification: &JsonRpcNotification) {
        for session in self.sessions.read().values() {
            session.notify(notification.clone());
        }
    }

    /// Deliver a notification to every session bound to one user
    pub fn broadcast_for_user(&self, user_id: &str, notification: &JsonRpcNotification) {
        for session in self.sessions.read().values() {
            if session.user_id.as_deref() == Some(user_id) {
                session.notify(notification.clone());
            }
        }
    }

    /// Drop idle-expired sessions, returning them so the caller can
    /// release any upstream state they held.
    pub fn sweep(&self) -> Vec<Arc<McpSession>> {
        let cutoff = Utc::now() - self.idle_timeout;
        let mut sessions = self.sessions.write();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.idle_since() < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        expired
            .iter()
            .filter_map(|id| sessions.remove(id))
            .collect()
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a session id: 32 bytes from the OS RNG, URL-safe base64,
/// unambiguous in HTTP headers.
pub fn generate_session_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

#[cfg(test)]
mod session_test {
    include!("session_test.rs");
}
