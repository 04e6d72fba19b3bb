use mockito::Server;
use napster_provider as lib;
use lib::api::napster::NapsterProvider;
use lib::config::Settings;
use lib::error::Error;
use lib::store::{keys, MemoryStore, SessionStore};
use serde_json::json;
use std::sync::Arc;

fn settings(base: &str) -> Settings {
    let mut cfg: Settings = toml::from_str(
        r#"
        api_key = "test-api-key"
        customer_secret = "test-secret"
    "#,
    )
    .expect("settings");
    cfg.api_base = Some(base.to_string());
    cfg
}

fn stored_session(store: &MemoryStore, expiry: i64, refresh_token: Option<&str>) {
    store.write(keys::ACCESS_TOKEN, "stale-access").expect("write");
    store.write(keys::EXPIRY_TIME, &expiry.to_string()).expect("write");
    store.write(keys::CATALOG_REGION, "US").expect("write");
    if let Some(rt) = refresh_token {
        store.write(keys::REFRESH_TOKEN, rt).expect("write");
    }
}

#[test]
fn expired_session_refreshes_once_at_construction() {
    let mut server = Server::new();
    let m = server
        .mock("POST", "/oauth/access_token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "access_token": "fresh-access", "expires_in": 3600 }).to_string())
        .expect(1)
        .create();

    let store = Arc::new(MemoryStore::new());
    stored_session(&store, 1, Some("stored-refresh"));

    let rt = tokio::runtime::Runtime::new().expect("rt");
    rt.block_on(async {
        NapsterProvider::connect(&settings(&server.url()), store.clone())
            .await
            .expect("connect");
    });

    assert_eq!(store.read(keys::ACCESS_TOKEN).as_deref(), Some("fresh-access"));
    let expiry: i64 = store
        .read(keys::EXPIRY_TIME)
        .expect("expiry stored")
        .parse()
        .expect("expiry numeric");
    assert!(expiry > chrono::Utc::now().timestamp());
    m.assert();
}

#[test]
fn valid_session_does_not_touch_the_refresh_endpoint() {
    let mut server = Server::new();
    let m = server
        .mock("POST", "/oauth/access_token")
        .with_status(200)
        .with_body("{}")
        .expect(0)
        .create();

    let store = Arc::new(MemoryStore::new());
    stored_session(&store, chrono::Utc::now().timestamp() + 3600, Some("stored-refresh"));

    let rt = tokio::runtime::Runtime::new().expect("rt");
    rt.block_on(async {
        NapsterProvider::connect(&settings(&server.url()), store.clone())
            .await
            .expect("connect");
    });

    assert_eq!(store.read(keys::ACCESS_TOKEN).as_deref(), Some("stale-access"));
    m.assert();
}

#[test]
fn expired_session_without_refresh_token_is_an_auth_error() {
    let server = Server::new();
    let store = Arc::new(MemoryStore::new());
    store.write(keys::ACCESS_TOKEN, "stale-access").expect("write");
    store.write(keys::EXPIRY_TIME, "1").expect("write");

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let res = rt.block_on(NapsterProvider::connect(&settings(&server.url()), store));

    match res {
        Err(Error::Auth(msg)) => assert!(msg.contains("no refresh token")),
        _ => panic!("expected auth error"),
    }
}

#[test]
fn refresh_failure_surfaces_server_message() {
    let mut server = Server::new();
    let _m = server
        .mock("POST", "/oauth/access_token")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":"Refresh token revoked"}"#)
        .create();

    let store = Arc::new(MemoryStore::new());
    stored_session(&store, 1, Some("revoked-refresh"));

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let res = rt.block_on(NapsterProvider::connect(&settings(&server.url()), store));

    match res {
        Err(Error::Auth(msg)) => assert_eq!(msg, "Refresh token revoked"),
        _ => panic!("expected auth error"),
    }
}
