//! ## 日本語
//!
//! ユーザーキャッシュに保存されるユーザー情報です。
//!
//! `id` と `detail` だけがシリアライズされます。`lease` は token 検証時にだけ埋められる
//! 一時的な情報で、ストアには保存されません。
//!
//! ## English
//!
//! User record stored in the user cache.
//!
//! Only `id` and `detail` are serialized. `lease` is transient: it is filled in when a
//! token is checked and never persisted.

use serde::{Deserialize, Serialize};

/// ## 日本語
///
/// キャッシュされるユーザーです。`detail` の中身はローダーが自由に決めます。
///
/// ## English
///
/// A cached user. The shape of `detail` is up to the loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RUser {
    /// Primary key of the user.
    pub id: String,
    /// Opaque payload supplied by the loader.
    #[serde(default)]
    pub detail: serde_json::Value,
    /// Token timing, present only on users returned by a token check.
    #[serde(skip)]
    pub lease: Option<TokenLease>,
}

/// Timing of the token a user was looked up through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenLease {
    /// The token string that was checked.
    pub token: String,
    /// Remaining TTL of the token record, in seconds.
    pub remaining_ttl: i64,
    /// Expiry recorded in the user's token index (Unix epoch seconds).
    pub expire_at: i64,
}

impl RUser {
    /// Creates a user carrying only its identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            detail: serde_json::Value::Null,
            lease: None,
        }
    }

    /// Creates a user with a detail payload.
    pub fn with_detail(id: impl Into<String>, detail: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            detail,
            lease: None,
        }
    }

    pub(crate) fn leased(mut self, lease: TokenLease) -> Self {
        self.lease = Some(lease);
        self
    }
}
