use super::*;
use chrono::Duration;

fn code(value: &str, expires_in_secs: i64) -> AuthorizationCode {
    AuthorizationCode {
        code: value.to_string(),
        client_id: "client".to_string(),
        redirect_uri: "https://client.example/cb".to_string(),
        scope: "mcp".to_string(),
        code_challenge: "challenge".to_string(),
        user_id: "alice".to_string(),
        upstream_token: "upstream".to_string(),
        expires_at: Utc::now() + Duration::seconds(expires_in_secs),
    }
}

fn access(value: &str, expires_in_secs: i64) -> AccessToken {
    AccessToken {
        token: value.to_string(),
        client_id: "client".to_string(),
        scope: "mcp".to_string(),
        user_id: "alice".to_string(),
        expires_at: Utc::now() + Duration::seconds(expires_in_secs),
    }
}

fn plugin(id: &str, user: &str, age_secs: i64) -> PluginToken {
    PluginToken {
        id: id.to_string(),
        name: format!("vault-{}", id),
        secret: "shared".to_string(),
        host: "127.0.0.1".to_string(),
        port: 27123,
        user_id: user.to_string(),
        require_auth: true,
        created_at: Utc::now() - Duration::seconds(age_secs),
    }
}

#[test]
fn test_code_redeems_exactly_once() {
    let store = TokenStore::new();
    store.insert_code(code("c1", 600));

    assert!(store.consume_code("c1").is_some());
    assert!(store.consume_code("c1").is_none(), "replay must fail");
}

#[test]
fn test_code_redemption_exactly_once_under_contention() {
    let store = Arc::new(TokenStore::new());
    store.insert_code(code("c1", 600));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        handles.push(std::thread::spawn(move || {
            store.consume_code("c1").is_some()
        }));
    }
    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(successes, 1, "exactly one caller may redeem a code");
}

#[test]
fn test_expired_code_does_not_redeem() {
    let store = TokenStore::new();
    store.insert_code(code("c1", -1));
    assert!(store.consume_code("c1").is_none());
}

#[test]
fn test_access_token_expiry_drops_on_read() {
    let store = TokenStore::new();
    store.insert_access(access("live", 3600));
    store.insert_access(access("dead", -10));

    assert!(store.access_token("live").is_some());
    assert!(store.access_token("dead").is_none());
    // Re-read still absent after the lazy drop
    assert!(store.access_token("dead").is_none());
}

#[test]
fn test_refresh_rotation_revokes_prior_access_first() {
    let store = TokenStore::new();
    store.insert_access(access("at-old", 3600));
    store.insert_refresh(RefreshToken {
        token: "rt-old".to_string(),
        client_id: "client".to_string(),
        scope: "mcp".to_string(),
        user_id: "alice".to_string(),
        access_token: "at-old".to_string(),
    });

    let consumed = store.consume_refresh("rt-old").unwrap();
    assert_eq!(consumed.access_token, "at-old");
    assert!(
        store.access_token("at-old").is_none(),
        "prior access token is revoked with the refresh token"
    );
    assert!(store.consume_refresh("rt-old").is_none(), "single-use");
}

#[test]
fn test_plugin_lookup_returns_first_by_age() {
    let store = TokenStore::new();
    store.upsert_plugin(plugin("newer", "alice", 10));
    store.upsert_plugin(plugin("older", "alice", 100));
    store.upsert_plugin(plugin("other", "bob", 50));

    let bound = store.plugin_for_user("alice").unwrap();
    assert_eq!(bound.id, "older");
    assert!(store.plugin_for_user("carol").is_none());
}

#[test]
fn test_plugin_crud() {
    let store = TokenStore::new();
    store.upsert_plugin(plugin("p1", "alice", 0));

    assert!(store.plugin("p1").is_some());
    assert_eq!(store.plugins().len(), 1);
    assert!(store.remove_plugin("p1"));
    assert!(!store.remove_plugin("p1"));
    assert!(store.plugin_for_user("alice").is_none());
}

#[test]
fn test_pending_auth_single_use_and_ttl() {
    let store = TokenStore::new();
    store.insert_pending(PendingAuth {
        state: "s1".to_string(),
        client_id: "client".to_string(),
        redirect_uri: "https://client.example/cb".to_string(),
        scope: "mcp".to_string(),
        client_state: Some("client-state".to_string()),
        code_challenge: "challenge".to_string(),
        upstream_pkce_verifier: "verifier".to_string(),
        expires_at: Utc::now() + Duration::seconds(600),
    });

    assert!(store.consume_pending("s1").is_some());
    assert!(store.consume_pending("s1").is_none());

    store.insert_pending(PendingAuth {
        state: "s2".to_string(),
        client_id: "client".to_string(),
        redirect_uri: "https://client.example/cb".to_string(),
        scope: "mcp".to_string(),
        client_state: None,
        code_challenge: "challenge".to_string(),
        upstream_pkce_verifier: "verifier".to_string(),
        expires_at: Utc::now() - Duration::seconds(1),
    });
    assert!(store.consume_pending("s2").is_none());
}

#[test]
fn test_sweep_purges_expired_records() {
    let store = TokenStore::new();
    store.insert_access(access("dead", -10));
    store.insert_code(code("dead-code", -10));
    store.insert_access(access("live", 3600));
    store.insert_code(code("live-code", 600));

    store.sweep();

    assert!(store.access_token("live").is_some());
    assert!(store.consume_code("live-code").is_some());
    assert!(store.consume_code("dead-code").is_none());
}
