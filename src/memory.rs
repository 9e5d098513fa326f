//! ## 日本語
//!
//! プロセス内メモリで動く [`KvStore`] 実装です。
//!
//! 文字列値とハッシュ値を保持し、有効期限はアクセス時に遅延評価で判定します。
//! バッチは 1 回のロックの中で検証してから適用するため、全体が適用されるか、何も
//! 適用されないかのどちらかになります。テストや単一プロセス構成向けです。
//!
//! ## English
//!
//! In-process [`KvStore`] implementation.
//!
//! Holds string and hash values; expiry is evaluated lazily on access. Batches are
//! validated and applied under a single lock, so either all ops land or none do.
//! Intended for tests and single-process deployments.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::Utc;

use crate::models::{RSessionError, Result};
use crate::store::{KvStore, StoreOp};

fn now_ms_u64() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

fn add_ttl_ms(now_ms: u64, ttl_seconds: u64) -> u64 {
    let ttl_ms = (ttl_seconds as u128).saturating_mul(1000);
    (now_ms as u128)
        .saturating_add(ttl_ms)
        .min(u64::MAX as u128) as u64
}

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    // Unix epoch milliseconds; `None` means no expiry.
    expire_at: Option<u64>,
}

impl Entry {
    fn is_expired(&self, now_ms: u64) -> bool {
        self.expire_at.is_some_and(|at| at <= now_ms)
    }
}

type Map = HashMap<String, Entry>;

/// ## 日本語
///
/// メモリ上のストアです。`Clone` は同じマップへのハンドルを増やすだけです。
///
/// ## English
///
/// In-memory store. `Clone` creates another handle to the same map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    store: Arc<Mutex<Map>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Map>> {
        self.store
            .lock()
            .map_err(|_| RSessionError::store("memory store mutex poisoned"))
    }

    /// Number of live keys. Expired keys are purged first.
    pub fn len(&self) -> Result<usize> {
        let now = now_ms_u64();
        let mut map = self.lock()?;
        map.retain(|_, entry| !entry.is_expired(now));
        Ok(map.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

// Drops the entry if it has expired, then returns what is left.
fn live<'a>(map: &'a mut Map, key: &str, now_ms: u64) -> Option<&'a mut Entry> {
    if map.get(key).is_some_and(|entry| entry.is_expired(now_ms)) {
        map.remove(key);
    }
    map.get_mut(key)
}

fn wrong_type(key: &str) -> RSessionError {
    RSessionError::store(format!(
        "WRONGTYPE operation against key {key} holding the wrong kind of value"
    ))
}

fn remaining_seconds(entry: &Entry, now_ms: u64) -> i64 {
    match entry.expire_at {
        None => -1,
        Some(at) => {
            let remaining_ms = at.saturating_sub(now_ms);
            i64::try_from(remaining_ms.div_ceil(1000)).unwrap_or(i64::MAX)
        }
    }
}

// Type-checks an op against the current map without mutating it.
fn check(map: &mut Map, op: &StoreOp, now_ms: u64) -> Result<()> {
    match op {
        StoreOp::HSet { key, .. } | StoreOp::HDel { key, .. } => match live(map, key, now_ms) {
            Some(Entry {
                value: Value::Str(_),
                ..
            }) => Err(wrong_type(key)),
            _ => Ok(()),
        },
        StoreOp::SetEx { .. } | StoreOp::Expire { .. } | StoreOp::Del { .. } => Ok(()),
    }
}

fn apply(map: &mut Map, op: &StoreOp, now_ms: u64) {
    match op {
        StoreOp::SetEx {
            key,
            value,
            ttl_seconds,
        } => {
            map.insert(
                key.clone(),
                Entry {
                    value: Value::Str(value.clone()),
                    expire_at: Some(add_ttl_ms(now_ms, *ttl_seconds)),
                },
            );
        }
        StoreOp::Expire { key, ttl_seconds } => {
            if let Some(entry) = live(map, key, now_ms) {
                entry.expire_at = Some(add_ttl_ms(now_ms, *ttl_seconds));
            }
        }
        StoreOp::Del { key } => {
            map.remove(key);
        }
        StoreOp::HSet { key, field, value } => {
            let entry = live(map, key, now_ms);
            match entry {
                Some(Entry {
                    value: Value::Hash(fields),
                    ..
                }) => {
                    fields.insert(field.clone(), value.clone());
                }
                _ => {
                    let mut fields = HashMap::new();
                    fields.insert(field.clone(), value.clone());
                    map.insert(
                        key.clone(),
                        Entry {
                            value: Value::Hash(fields),
                            expire_at: None,
                        },
                    );
                }
            }
        }
        StoreOp::HDel { key, field } => {
            let now_empty = match live(map, key, now_ms) {
                Some(Entry {
                    value: Value::Hash(fields),
                    ..
                }) => {
                    fields.remove(field);
                    fields.is_empty()
                }
                _ => false,
            };
            // Like Redis, a hash with no fields left no longer exists.
            if now_empty {
                map.remove(key);
            }
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get_with_ttl(&self, key: &str) -> Result<Option<(String, i64)>> {
        let now = now_ms_u64();
        let mut map = self.lock()?;
        match live(&mut map, key, now) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Str(value) => Ok(Some((value.clone(), remaining_seconds(entry, now)))),
                Value::Hash(_) => Err(wrong_type(key)),
            },
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<i64>> {
        let now = now_ms_u64();
        let mut map = self.lock()?;
        Ok(live(&mut map, key, now).map(|entry| remaining_seconds(entry, now)))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let now = now_ms_u64();
        let mut map = self.lock()?;
        apply(
            &mut map,
            &StoreOp::SetEx {
                key: key.to_string(),
                value: value.to_string(),
                ttl_seconds,
            },
            now,
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let now = now_ms_u64();
        let mut map = self.lock()?;
        match live(&mut map, key, now) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let now = now_ms_u64();
        let mut map = self.lock()?;
        match live(&mut map, key, now) {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<()> {
        let ops: Vec<StoreOp> = fields
            .iter()
            .map(|field| StoreOp::HDel {
                key: key.to_string(),
                field: field.clone(),
            })
            .collect();
        self.exec_atomic(&ops).await
    }

    async fn exec_atomic(&self, ops: &[StoreOp]) -> Result<()> {
        let now = now_ms_u64();
        let mut map = self.lock()?;
        for op in ops {
            check(&mut map, op, now)?;
        }
        for op in ops {
            apply(&mut map, op, now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hset(key: &str, field: &str, value: &str) -> StoreOp {
        StoreOp::HSet {
            key: key.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn set_ex_then_get_with_ttl() -> Result<()> {
        let store = MemoryStore::new();
        store.set_ex("k", "v", 30).await?;

        let (value, ttl) = store.get_with_ttl("k").await?.unwrap_or_default();
        assert_eq!(value, "v");
        assert!((29..=30).contains(&ttl), "ttl was {ttl}");
        Ok(())
    }

    #[tokio::test]
    async fn missing_keys_read_as_absent() -> Result<()> {
        let store = MemoryStore::new();
        assert_eq!(store.get_with_ttl("nope").await?, None);
        assert_eq!(store.ttl("nope").await?, None);
        assert!(store.hgetall("nope").await?.is_empty());
        assert_eq!(store.hget("nope", "f").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn hash_without_expire_has_no_ttl() -> Result<()> {
        let store = MemoryStore::new();
        store.exec_atomic(&[hset("h", "a", "1")]).await?;
        assert_eq!(store.ttl("h").await?, Some(-1));
        assert_eq!(store.hget("h", "a").await?.as_deref(), Some("1"));
        Ok(())
    }

    #[tokio::test]
    async fn expire_on_missing_key_is_noop() -> Result<()> {
        let store = MemoryStore::new();
        store
            .exec_atomic(&[StoreOp::Expire {
                key: "ghost".to_string(),
                ttl_seconds: 10,
            }])
            .await?;
        assert_eq!(store.ttl("ghost").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn removing_last_field_removes_hash() -> Result<()> {
        let store = MemoryStore::new();
        store
            .exec_atomic(&[hset("h", "a", "1"), hset("h", "b", "2")])
            .await?;
        store.hdel("h", &["a".to_string(), "b".to_string()]).await?;
        assert_eq!(store.ttl("h").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn batch_with_type_error_applies_nothing() -> Result<()> {
        let store = MemoryStore::new();
        store.set_ex("s", "string", 60).await?;

        let result = store
            .exec_atomic(&[
                StoreOp::SetEx {
                    key: "fresh".to_string(),
                    value: "x".to_string(),
                    ttl_seconds: 60,
                },
                hset("s", "f", "v"),
            ])
            .await;

        assert!(matches!(result, Err(RSessionError::StoreUnavailable(_))));
        assert_eq!(store.get_with_ttl("fresh").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn keys_expire() -> Result<()> {
        let store = MemoryStore::new();
        store.set_ex("short", "v", 1).await?;
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert_eq!(store.get_with_ttl("short").await?, None);
        assert!(store.is_empty()?);
        Ok(())
    }
}
