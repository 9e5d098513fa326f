//! ## 日本語
//!
//! ユーザー情報キャッシュです。
//!
//! `{user_prefix}_{user_id}` に JSON でシリアライズした [`RUser`] を TTL 付きで保存します。
//! キャッシュが無いこと自体はエラーではなく、必要になったときにローダーから読み直します。
//!
//! ## English
//!
//! User info cache.
//!
//! Stores a JSON-serialized [`RUser`] under `{user_prefix}_{user_id}` with its own TTL.
//! A missing record is not an error: it is reloaded through the loader on demand.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::keyspace::KeySpace;
use crate::loader::UserLoader;
use crate::models::{RSessionError, RUser, Result, validate_user_id};
use crate::store::KvStore;

/// Loads, serializes and stores users keyed by id.
#[derive(Clone)]
pub struct RUserCache {
    store: Arc<dyn KvStore>,
    keys: KeySpace,
    default_ttl: u64,
    loader: Option<Arc<dyn UserLoader>>,
}

impl RUserCache {
    pub fn new(
        store: Arc<dyn KvStore>,
        keys: KeySpace,
        default_ttl: u64,
        loader: Option<Arc<dyn UserLoader>>,
    ) -> Self {
        Self {
            store,
            keys,
            default_ttl,
            loader,
        }
    }

    /// Whether a loader is configured.
    pub fn has_loader(&self) -> bool {
        self.loader.is_some()
    }

    /// ## 日本語
    ///
    /// ローダーでユーザーを読み込み、キャッシュに保存して返します。
    ///
    /// - ローダー未設定：[`RSessionError::NotConfigured`]
    /// - ローダーが `None` を返した：ID だけのユーザーを保存
    /// - `ttl_seconds <= 0`：デフォルト TTL を使用
    ///
    /// ## English
    ///
    /// Loads the user through the loader, caches it and returns it.
    ///
    /// - no loader configured: [`RSessionError::NotConfigured`]
    /// - loader returned `None`: an identity-only user is cached
    /// - `ttl_seconds <= 0`: the default TTL is used
    pub async fn fill_and_cache(&self, user_id: &str, ttl_seconds: i64) -> Result<RUser> {
        let Some(loader) = self.loader.as_ref() else {
            return Err(RSessionError::NotConfigured("user loader"));
        };
        validate_user_id(user_id)?;

        let mut user = loader
            .load_user(user_id)
            .await
            .map_err(RSessionError::Loader)?
            .unwrap_or_else(|| RUser::new(user_id));
        // The cache key is derived from the requested id, whatever the loader echoed back.
        user.id = user_id.to_string();
        user.lease = None;

        let raw = serde_json::to_string(&user)?;
        let ttl = match u64::try_from(ttl_seconds) {
            Ok(ttl) if ttl > 0 => ttl,
            _ => self.default_ttl,
        };
        self.store
            .set_ex(&self.keys.user_key(user_id), &raw, ttl)
            .await?;
        debug!(user_id = %user_id, ttl, "user cached");
        Ok(user)
    }

    /// Reads a cached user. `Ok(None)` on a miss; never calls the loader.
    pub async fn cached(&self, user_id: &str) -> Result<Option<RUser>> {
        let Some((raw, _ttl)) = self
            .store
            .get_with_ttl(&self.keys.user_key(user_id))
            .await?
        else {
            return Ok(None);
        };
        let mut user: RUser = serde_json::from_str(&raw)?;
        user.id = user_id.to_string();
        trace!(user_id = %user_id, "user cache hit");
        Ok(Some(user))
    }

    /// ## 日本語
    ///
    /// 複数ユーザーを順番に読み込み直します。最初のエラーで止まり、それまでの更新は
    /// 残ります（バッチ全体としては原子的ではありません）。
    ///
    /// ## English
    ///
    /// Reloads several users in order. Stops at the first error; users refreshed
    /// before it stay refreshed.
    pub async fn refresh_many<I, S>(&self, ids: I, ttl_seconds: i64) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in ids {
            self.fill_and_cache(id.as_ref(), ttl_seconds).await?;
        }
        Ok(())
    }

    /// Deletes the cached user. Tokens and the token index are untouched.
    pub async fn forget(&self, user_id: &str) -> Result<()> {
        validate_user_id(user_id)?;
        self.store.del(&self.keys.user_key(user_id)).await?;
        debug!(user_id = %user_id, "user cache entry removed");
        Ok(())
    }
}
