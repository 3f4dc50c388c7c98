//! Tuya OpenAPI request signing.
//! Builds the canonical string-to-sign and the HMAC-SHA256 signature for both
//! token mode (no access token) and business mode (with access token).

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

/// Query parameters of a request. Ordered by key, which is the order the
/// canonical string requires.
pub type QueryParams = BTreeMap<String, String>;

/// Value of the `sign_method` header.
pub const SIGN_METHOD: &str = "HMAC-SHA256";

/// Lowercase hex SHA-256 digest of the request body.
///
/// An empty body is hashed as well; it is never skipped.
pub fn content_hash(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

/// Path with its sorted query string appended, as used for signing.
pub fn canonical_url(path: &str, query: Option<&QueryParams>) -> String {
    match query {
        Some(q) if !q.is_empty() => {
            let qs = q
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            format!("{}?{}", path, qs)
        }
        _ => path.to_string(),
    }
}

/// Builds the string-to-sign:
/// `METHOD \n SHA256(body) \n <signed headers> \n URL`.
///
/// The signed-header line is always empty in this protocol.
pub fn canonical_request_string(
    method: &str,
    path: &str,
    query: Option<&QueryParams>,
    body: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        method.to_ascii_uppercase(),
        content_hash(body),
        "",
        canonical_url(path, query)
    )
}

/// Computes the uppercase hex HMAC-SHA256 signature of a request.
///
/// Passing `access_token` selects business mode; `None` (or an empty token)
/// selects token mode, used only for the token endpoints.
/// `nonce` is empty today but keeps its position in the payload.
pub fn sign(
    client_id: &str,
    secret: &str,
    timestamp_ms: &str,
    nonce: &str,
    canonical: &str,
    access_token: Option<&str>,
) -> String {
    let payload = format!(
        "{}{}{}{}{}",
        client_id,
        access_token.unwrap_or(""),
        timestamp_ms,
        nonce,
        canonical
    );

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode_upper(mac.finalize().into_bytes())
}
