//! Upstream identity provider client
//!
//! The gateway never holds user passwords: the authorize endpoint
//! bounces the browser to the configured IdP, and this client handles
//! the code exchange and profile fetch on the way back.

use crate::config::IdpConfig;
use crate::{NotegateError, Result};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, TokenResponse, TokenUrl, basic::BasicClient,
};
use serde_json::Value;

type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// OAuth client against the configured upstream IdP
pub struct UpstreamIdp {
    config: IdpConfig,
    redirect_uri: String,
    http: reqwest::Client,
}

impl UpstreamIdp {
    /// Build the client; redirects are disabled on the HTTP client to
    /// prevent authorization code interception.
    pub fn new(config: IdpConfig, redirect_uri: String) -> Result<Self> {
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                NotegateError::config(format!("Failed to build HTTP client for OAuth: {}", e))
            })?;

        Ok(Self {
            config,
            redirect_uri,
            http,
        })
    }

    /// Build the oauth2 client.
    /// Note: can't be cached due to oauth2's typestate pattern.
    fn oauth_client(&self) -> Result<ConfiguredClient> {
        Ok(BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.config.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(self.config.authorize_url.clone())
                    .map_err(|e| NotegateError::auth(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(self.config.token_url.clone())
                    .map_err(|e| NotegateError::auth(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(self.redirect_uri.clone())
                    .map_err(|e| NotegateError::auth(format!("Invalid redirect URI: {}", e)))?,
            ))
    }

    /// Build the IdP authorize URL carrying our state token.
    ///
    /// Returns `(url, pkce_verifier)`; the verifier is parked in the
    /// PendingAuth until the callback comes home.
    pub fn authorize_url(&self, state: &str) -> Result<(String, String)> {
        let client = self.oauth_client()?;
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let state = state.to_string();
        let (url, _) = client
            .authorize_url(|| CsrfToken::new(state))
            .set_pkce_challenge(pkce_challenge)
            .url();

        Ok((url.to_string(), pkce_verifier.secret().clone()))
    }

    /// Exchange the IdP's code for an upstream access token.
    pub async fn exchange_code(&self, code: &str, pkce_verifier: &str) -> Result<String> {
        let client = self.oauth_client()?;

        let token_result = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| NotegateError::auth(format!("Upstream token exchange failed: {}", e)))?;

        Ok(token_result.access_token().secret().clone())
    }

    /// Fetch the user profile and resolve a stable user id.
    pub async fn fetch_user(&self, access_token: &str) -> Result<String> {
        let profile: Value = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, "notegate")
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()
            .map_err(|e| NotegateError::auth(format!("Upstream profile fetch failed: {}", e)))?
            .json()
            .await?;

        resolve_user_id(&profile)
            .ok_or_else(|| NotegateError::auth("Upstream profile carries no usable identifier"))
    }
}

/// Resolve a user id from an IdP profile document.
/// First present of `login`, `sub`, `id`, `email` wins; numeric ids
/// are rendered as decimal strings.
pub fn resolve_user_id(profile: &Value) -> Option<String> {
    for key in ["login", "sub", "id", "email"] {
        match profile.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}
