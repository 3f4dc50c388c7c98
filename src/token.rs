//! Access token bookkeeping.
//! Holds the bearer token, answers expiry questions and supports lossless
//! snapshot/restore for persistence by the host. Never performs I/O.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Tokens are treated as expired this long before their real expiry.
pub const EXPIRY_BUFFER_MS: u64 = 60_000;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Token information issued by the token endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub uid: String,
    /// Lifetime in seconds as reported by the server
    #[serde(default)]
    pub expire_time: u64,
    /// Absolute expiry in epoch milliseconds
    #[serde(default, alias = "expire_at")]
    pub expires_at: u64,
}

impl TokenInfo {
    /// Builds token info from a token endpoint `result` object.
    ///
    /// `acquired_at_ms` is the time the token was issued (server `t` when
    /// available); expiry is `acquired_at_ms + expire_time` seconds.
    pub fn from_result(result: &Value, acquired_at_ms: u64) -> Self {
        let text = |key: &str| {
            result
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let expire_time = result
            .get("expire_time")
            .and_then(Value::as_u64)
            .unwrap_or_default();

        Self {
            access_token: text("access_token"),
            refresh_token: text("refresh_token"),
            uid: text("uid"),
            expire_time,
            expires_at: acquired_at_ms.saturating_add(expire_time.saturating_mul(1000)),
        }
    }

    /// Expiry check against an explicit clock.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.access_token.is_empty() || now_ms >= self.expires_at.saturating_sub(EXPIRY_BUFFER_MS)
    }

    /// True if there is no access token or it expires within the buffer.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }
}

/// Callback invoked whenever the client replaces its token, so the host can
/// persist the new snapshot.
pub trait TokenListener: Send + Sync {
    fn update_token(&self, token: &TokenInfo);
}

impl<F> TokenListener for F
where
    F: Fn(&TokenInfo) + Send + Sync,
{
    fn update_token(&self, token: &TokenInfo) {
        self(token)
    }
}

/// Thread-safe holder of the current [`TokenInfo`].
///
/// Replacement always swaps the whole structure.
#[derive(Debug, Default)]
pub struct TokenStore {
    inner: RwLock<TokenInfo>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: TokenInfo) -> Self {
        Self {
            inner: RwLock::new(token),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.inner.read().is_expired()
    }

    /// Serializable copy of the current token.
    pub fn snapshot(&self) -> TokenInfo {
        self.inner.read().clone()
    }

    /// Replaces the current token with a previously saved snapshot.
    pub fn restore(&self, token: TokenInfo) {
        *self.inner.write() = token;
    }

    pub fn access_token(&self) -> String {
        self.inner.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> String {
        self.inner.read().refresh_token.clone()
    }

    pub fn uid(&self) -> String {
        self.inner.read().uid.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token(expires_at: u64) -> TokenInfo {
        TokenInfo {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            uid: "uid-1".into(),
            expire_time: 7200,
            expires_at,
        }
    }

    #[test]
    fn empty_token_is_expired() {
        assert!(TokenInfo::default().is_expired());
        let mut t = token(now_ms() + 3_600_000);
        t.access_token.clear();
        assert!(t.is_expired());
    }

    #[test]
    fn expiry_buffer() {
        let now = now_ms();
        assert!(token(now + 30_000).is_expired());
        assert!(!token(now + 120_000).is_expired());
    }

    #[test]
    fn expiry_boundary() {
        let t = token(1_000_000);
        assert!(!t.is_expired_at(1_000_000 - EXPIRY_BUFFER_MS - 1));
        assert!(t.is_expired_at(1_000_000 - EXPIRY_BUFFER_MS));
    }

    #[test]
    fn from_result_uses_acquired_time_plus_duration() {
        let result = json!({
            "access_token": "a",
            "refresh_token": "r",
            "uid": "u",
            "expire_time": 7200
        });
        let t = TokenInfo::from_result(&result, 1_700_000_000_000);
        assert_eq!(t.access_token, "a");
        assert_eq!(t.refresh_token, "r");
        assert_eq!(t.uid, "u");
        assert_eq!(t.expire_time, 7200);
        assert_eq!(t.expires_at, 1_700_000_000_000 + 7_200_000);
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let store = TokenStore::new();
        let t = token(1_234_567);
        store.restore(t.clone());
        assert_eq!(store.snapshot(), t);

        let json = serde_json::to_string(&store.snapshot()).unwrap();
        let back: TokenInfo = serde_json::from_str(&json).unwrap();
        let other = TokenStore::with_token(back);
        assert_eq!(other.snapshot(), t);
    }

    #[test]
    fn restore_accepts_legacy_field_name() {
        let t: TokenInfo = serde_json::from_value(json!({
            "access_token": "a",
            "refresh_token": "r",
            "uid": "u",
            "expire_time": 10,
            "expire_at": 99
        }))
        .unwrap();
        assert_eq!(t.expires_at, 99);
    }

    #[test]
    fn closure_listener() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let hits = AtomicUsize::new(0);
        let listener = |t: &TokenInfo| {
            assert_eq!(t.uid, "uid-1");
            hits.fetch_add(1, Ordering::SeqCst);
        };
        listener.update_token(&token(0));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
