#![cfg(all(feature = "issuer", feature = "client"))]

use std::time::Duration;

use axum::Router;
use backtime_auth::issuer::{Assertion, IdentityVerifier, VerifiedIdentity};
use backtime_auth::{
    AccessTokenSigner, ClientConfig, ClientError, Error, IssuerConfig, MemoryStore, SessionClient,
    SessionStatus, UserProfile, auth_routes, data_routes,
};
use serde_json::{Value, json};

/// Accepts `valid:<sub>` as a Google credential.
struct StubGoogle;

impl IdentityVerifier for StubGoogle {
    async fn verify(&self, assertion: &Assertion) -> Result<VerifiedIdentity, Error> {
        match assertion {
            Assertion::IdToken(token) => token
                .strip_prefix("valid:")
                .map(|sub| VerifiedIdentity {
                    profile: UserProfile::new(sub)
                        .with_email(format!("{sub}@example.com"))
                        .with_name("Test User")
                        .with_picture("https://example.com/avatar.png"),
                    grant: None,
                })
                .ok_or_else(|| Error::Token("unknown credential".into())),
            Assertion::AuthorizationCode { .. } => Err(Error::Token("code flow disabled".into())),
        }
    }
}

async fn spawn_server(access_ttl: time::Duration) -> url::Url {
    let signer = AccessTokenSigner::generate("backtime", "backtime-api", access_ttl).unwrap();
    let config = IssuerConfig::new(signer).with_secure_cookies(false);
    let signer = config.signer();
    let store = MemoryStore::with_sales(vec![json!({ "storeLocation": "Denver" })]);

    let app = Router::new()
        .merge(auth_routes(config, StubGoogle, store.clone()))
        .merge(data_routes(signer, store));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}").parse().unwrap()
}

async fn client(access_ttl: time::Duration) -> SessionClient {
    SessionClient::new(ClientConfig::new(spawn_server(access_ttl).await)).unwrap()
}

#[tokio::test]
async fn expired_access_token_is_refreshed_transparently() {
    let client = client(time::Duration::seconds(1)).await;

    let profile = client.login_with_credential("valid:u1").await.unwrap();
    assert_eq!(profile.sub.as_str(), "u1");
    let first_token = client.access_token().unwrap();

    let data: Value = client.get_json("/data").await.unwrap();
    assert_eq!(data, json!({ "sales": [{ "storeLocation": "Denver" }] }));

    tokio::time::sleep(Duration::from_millis(2100)).await;

    // The identity check reports the expired token instead of refreshing it.
    let err = client.get_json::<UserProfile>("/auth/me").await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 401, .. }), "{err:?}");
    assert_eq!(client.access_token().unwrap(), first_token);

    let data: Value = client.get_json("/data").await.unwrap();
    assert_eq!(data["sales"][0]["storeLocation"], "Denver");
    assert_ne!(client.access_token().unwrap(), first_token);

    let me: UserProfile = client.get_json("/auth/me").await.unwrap();
    assert_eq!(me, profile);
}

#[tokio::test]
async fn rejected_credential_leaves_session_unknown() {
    let client = client(time::Duration::minutes(15)).await;

    let err = client.login_with_credential("forged").await.unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "google auth failed");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert_eq!(client.status(), SessionStatus::Unknown);
}

#[tokio::test]
async fn restore_uses_the_refresh_cookie() {
    let client = client(time::Duration::minutes(15)).await;
    assert_eq!(client.restore().await.unwrap(), SessionStatus::Unauthenticated);

    let profile = client.login_with_credential("valid:u2").await.unwrap();
    client.logout().await.unwrap();
    assert_eq!(client.status(), SessionStatus::Unauthenticated);

    // Cookie was cleared and its hash dropped server-side
    assert_eq!(client.restore().await.unwrap(), SessionStatus::Unauthenticated);

    client.login_with_credential("valid:u2").await.unwrap();
    let login_token = client.access_token().unwrap();
    let restored = client.restore().await.unwrap();
    assert_eq!(restored, SessionStatus::Authenticated(profile));
    assert_ne!(client.access_token().unwrap(), login_token);
}

#[tokio::test]
async fn protected_route_without_session_fails_refresh() {
    let client = client(time::Duration::minutes(15)).await;
    let err = client.get_json::<Value>("/data").await.unwrap_err();
    assert!(matches!(err, ClientError::RefreshFailed(_)), "{err:?}");
    assert_eq!(client.status(), SessionStatus::Unauthenticated);
}
