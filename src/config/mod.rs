//! Configuration management for Notegate
//!
//! The bridge is configured from CLI flags with loopback defaults; the
//! gateway reads its configuration from the process environment. A
//! missing required variable is a fatal start-up error.

use crate::constants::*;
use crate::{NotegateError, Result};
use serde::{Deserialize, Serialize};

/// Plugin bridge (tier A) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bind host; the bridge is meant to stay on the loopback interface
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Shared API key required on `/mcp`; `None` disables the check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BRIDGE_HOST.to_string(),
            port: DEFAULT_BRIDGE_PORT,
            api_key: None,
        }
    }
}

/// Upstream identity provider used by the gateway's OAuth server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdpConfig {
    /// Short name, appears in the callback path (`/oauth/{name}/callback`)
    pub name: String,

    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

/// Remote gateway (tier B) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// External URL used in issued metadata and challenges (no trailing slash)
    pub external_url: String,

    /// Upstream identity provider
    pub idp: IdpConfig,

    /// Shared secret for the `/admin` surface
    pub admin_secret: String,

    /// Optional session secret, reserved for signed-cookie deployments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_secret: Option<String>,
}

impl GatewayConfig {
    /// Load the gateway configuration from the process environment.
    ///
    /// `.env` files are honoured via dotenvy. Missing required
    /// variables produce a `Config` error so the process can exit
    /// non-zero at start-up.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    NotegateError::config(format!("missing required environment variable {}", key))
                })
        };

        let host = lookup(ENV_GATEWAY_HOST).unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match lookup(ENV_GATEWAY_PORT) {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                NotegateError::config(format!("invalid {}: {}", ENV_GATEWAY_PORT, raw))
            })?,
            None => DEFAULT_GATEWAY_PORT,
        };

        let external_url = required(ENV_EXTERNAL_URL)?
            .trim_end_matches('/')
            .to_string();

        let idp = IdpConfig {
            name: lookup(ENV_IDP_NAME).unwrap_or_else(|| "idp".to_string()),
            client_id: required(ENV_IDP_CLIENT_ID)?,
            client_secret: required(ENV_IDP_CLIENT_SECRET)?,
            authorize_url: required(ENV_IDP_AUTHORIZE_URL)?,
            token_url: required(ENV_IDP_TOKEN_URL)?,
            userinfo_url: required(ENV_IDP_USERINFO_URL)?,
        };

        Ok(Self {
            host,
            port,
            external_url,
            idp,
            admin_secret: required(ENV_ADMIN_SECRET)?,
            session_secret: lookup(ENV_SESSION_SECRET).filter(|v| !v.is_empty()),
        })
    }

    /// URL of the RFC 9728 protected-resource metadata document
    pub fn resource_metadata_url(&self) -> String {
        format!("{}/.well-known/oauth-protected-resource", self.external_url)
    }

    /// Redirect URI registered with the upstream IdP
    pub fn idp_callback_url(&self) -> String {
        format!("{}/oauth/{}/callback", self.external_url, self.idp.name)
    }
}

#[cfg(test)]
mod config_test;
