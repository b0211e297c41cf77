use super::*;
use std::collections::HashMap;

fn full_env() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        (ENV_GATEWAY_PORT, "9090"),
        (ENV_EXTERNAL_URL, "https://gateway.example/"),
        (ENV_IDP_NAME, "github"),
        (ENV_IDP_CLIENT_ID, "idp-client"),
        (ENV_IDP_CLIENT_SECRET, "idp-secret"),
        (ENV_IDP_AUTHORIZE_URL, "https://idp.example/authorize"),
        (ENV_IDP_TOKEN_URL, "https://idp.example/token"),
        (ENV_IDP_USERINFO_URL, "https://idp.example/user"),
        (ENV_ADMIN_SECRET, "admin-secret"),
    ])
}

#[test]
fn test_gateway_config_from_lookup() {
    let env = full_env();
    let config = GatewayConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();

    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 9090);
    // Trailing slash is normalised away
    assert_eq!(config.external_url, "https://gateway.example");
    assert_eq!(config.idp.name, "github");
    assert_eq!(
        config.idp_callback_url(),
        "https://gateway.example/oauth/github/callback"
    );
    assert_eq!(
        config.resource_metadata_url(),
        "https://gateway.example/.well-known/oauth-protected-resource"
    );
    assert!(config.session_secret.is_none());
}

#[test]
fn test_gateway_config_missing_required_is_fatal() {
    for missing in [
        ENV_EXTERNAL_URL,
        ENV_IDP_CLIENT_ID,
        ENV_IDP_CLIENT_SECRET,
        ENV_IDP_AUTHORIZE_URL,
        ENV_IDP_TOKEN_URL,
        ENV_IDP_USERINFO_URL,
        ENV_ADMIN_SECRET,
    ] {
        let mut env = full_env();
        env.remove(missing);
        let err = GatewayConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()))
            .expect_err("config must fail without a required variable");
        assert!(
            err.to_string().contains(missing),
            "error should name {}: {}",
            missing,
            err
        );
    }
}

#[test]
fn test_gateway_config_empty_value_counts_as_missing() {
    let mut env = full_env();
    env.insert(ENV_ADMIN_SECRET, "");
    assert!(GatewayConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).is_err());
}

#[test]
fn test_gateway_config_rejects_bad_port() {
    let mut env = full_env();
    env.insert(ENV_GATEWAY_PORT, "not-a-port");
    assert!(GatewayConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).is_err());
}

#[test]
fn test_gateway_config_defaults() {
    let mut env = full_env();
    env.remove(ENV_GATEWAY_PORT);
    env.remove(ENV_IDP_NAME);
    let config = GatewayConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
    assert_eq!(config.port, DEFAULT_GATEWAY_PORT);
    assert_eq!(config.idp.name, "idp");
}

#[test]
fn test_bridge_config_defaults_to_loopback() {
    let config = BridgeConfig::default();
    assert_eq!(config.host, DEFAULT_BRIDGE_HOST);
    assert_eq!(config.port, DEFAULT_BRIDGE_PORT);
    assert!(config.api_key.is_none());
}
