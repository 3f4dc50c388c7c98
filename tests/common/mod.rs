//! Shared helpers for the mock-server tests.
#![allow(dead_code)]

use rustuya_cloud::crypto::{self, QueryParams};
use rustuya_cloud::token::now_ms;
use rustuya_cloud::{ApiClient, TokenInfo};
use serde_json::{Value, json};
use wiremock::{MockServer, Request};

pub const CLIENT_ID: &str = "test-client";
pub const SECRET: &str = "test-secret";
pub const UID: &str = "uid-1";

pub fn client(server: &MockServer) -> ApiClient {
    ApiClient::builder(CLIENT_ID, SECRET)
        .api_url(server.uri())
        .schema("testapp")
        .build()
        .unwrap()
}

/// Client resuming from a still-valid token, so no token call is needed.
pub fn authed_client(server: &MockServer) -> ApiClient {
    ApiClient::builder(CLIENT_ID, SECRET)
        .api_url(server.uri())
        .schema("testapp")
        .token(valid_token("stored-access"))
        .build()
        .unwrap()
}

pub fn valid_token(access: &str) -> TokenInfo {
    TokenInfo {
        access_token: access.into(),
        refresh_token: "stored-refresh".into(),
        uid: UID.into(),
        expire_time: 7200,
        expires_at: now_ms() + 7_200_000,
    }
}

pub fn token_body(access: &str, refresh: &str) -> Value {
    json!({
        "success": true,
        "t": now_ms(),
        "result": {
            "access_token": access,
            "refresh_token": refresh,
            "uid": UID,
            "expire_time": 7200
        }
    })
}

pub fn ok_body(result: Value) -> Value {
    json!({ "success": true, "t": now_ms(), "result": result })
}

pub fn error_body(code: u32, msg: &str) -> Value {
    json!({ "success": false, "t": now_ms(), "code": code, "msg": msg })
}

pub fn header<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers.get(name).and_then(|v| v.to_str().ok())
}

pub async fn requests_to(server: &MockServer, path: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == path)
        .collect()
}

/// Recomputes the signature of a captured request and checks every auth header.
pub fn assert_signed(req: &Request, access_token: Option<&str>) {
    let t = header(req, "t").expect("missing t header");
    assert!(t.parse::<u64>().is_ok());

    let query: QueryParams = req
        .url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let body = String::from_utf8(req.body.clone()).unwrap();
    let canonical =
        crypto::canonical_request_string(req.method.as_str(), req.url.path(), Some(&query), &body);
    let expected = crypto::sign(CLIENT_ID, SECRET, t, "", &canonical, access_token);

    assert_eq!(header(req, "sign"), Some(expected.as_str()));
    assert_eq!(header(req, "sign_method"), Some("HMAC-SHA256"));
    assert_eq!(header(req, "client_id"), Some(CLIENT_ID));
    assert_eq!(header(req, "content-type"), Some("application/json"));
    assert_eq!(header(req, "access_token"), access_token);
}
