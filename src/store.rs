//! ## 日本語
//!
//! キー・バリューストアの抽象です。
//!
//! r-session が必要とするのは GET / SETEX / DEL / EXPIRE / TTL / HSET / HDEL / HGETALL と、
//! 複数コマンドをまとめて適用するバッチだけです。TTL による失効はストア側に任せます。
//!
//! ## English
//!
//! Key-value store abstraction.
//!
//! r-session only needs GET / SETEX / DEL / EXPIRE / TTL / HSET / HDEL / HGETALL plus an
//! all-or-nothing batch. TTL expiry itself is left to the store.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::models::Result;

/// A single command queued into an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Set a string value with a TTL in seconds.
    SetEx {
        key: String,
        value: String,
        ttl_seconds: u64,
    },
    /// Reset the TTL of an existing key. No-op if the key is absent.
    Expire { key: String, ttl_seconds: u64 },
    /// Delete a key of any type.
    Del { key: String },
    /// Upsert one hash field.
    HSet {
        key: String,
        field: String,
        value: String,
    },
    /// Remove one hash field.
    HDel { key: String, field: String },
}

/// ## 日本語
///
/// r-session が利用するストア操作です。各メソッドは 1 本の接続を取得し、
/// 成功・失敗に関わらず返す前に解放します。
///
/// ## English
///
/// Store operations used by r-session. Each call acquires one connection for its
/// duration and releases it on every exit path.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads a string value together with its remaining TTL (seconds, `-1` when the
    /// key has no expiry). `None` when the key is absent.
    async fn get_with_ttl(&self, key: &str) -> Result<Option<(String, i64)>>;

    /// Remaining TTL of a key: `None` when absent, `Some(-1)` without expiry.
    async fn ttl(&self, key: &str) -> Result<Option<i64>>;

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;

    async fn del(&self, key: &str) -> Result<()>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// All fields of a hash. An absent key reads as an empty map.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<()>;

    /// Applies every op together or none of them.
    async fn exec_atomic(&self, ops: &[StoreOp]) -> Result<()>;
}
