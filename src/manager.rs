//! ## 日本語
//!
//! セッション管理の公開窓口です。
//!
//! [`RSessionConfig`] と [`RSessionBuilder`] で設定を一度だけ組み立て、変更できない
//! [`RSessionManager`] を作ります。プロセス全体で共有される可変のデフォルト値はありません。
//!
//! ## English
//!
//! Public entry point for session management.
//!
//! Configuration is assembled once through [`RSessionConfig`] / [`RSessionBuilder`] and
//! produces an immutable [`RSessionManager`]. There are no process-wide mutable defaults.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::keyspace::KeySpace;
use crate::loader::UserLoader;
use crate::models::{RUser, Result};
use crate::store::KvStore;
use crate::sweeper::IndexSweeper;
use crate::token_store::{RTokenStore, TokenPolicy};
use crate::user_cache::RUserCache;

const DEFAULT_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_INDEX_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

fn default_token_prefix() -> String {
    "go-t".to_string()
}

fn default_user_prefix() -> String {
    "go-u".to_string()
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_TTL_SECONDS
}

fn default_index_ttl_seconds() -> u64 {
    DEFAULT_INDEX_TTL_SECONDS
}

fn default_extractor_user_ttl() -> i64 {
    -1
}

/// ## 日本語
///
/// セッション設定です。serde でファイルや環境から読み込めます（省略した項目はデフォルト）。
///
/// ## English
///
/// Session configuration. Deserializable with serde; omitted fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RSessionConfig {
    /// Prefix of token records and user indexes.
    #[serde(default = "default_token_prefix")]
    pub token_prefix: String,
    /// Prefix of cached users.
    #[serde(default = "default_user_prefix")]
    pub user_prefix: String,
    /// TTL used when a caller passes `ttl <= 0`.
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,
    /// Coarse TTL of each user's token index.
    #[serde(default = "default_index_ttl_seconds")]
    pub index_ttl_seconds: u64,
    /// Allow at most one live token per user.
    #[serde(default)]
    pub single_mode: bool,
    /// Queue a background index sweep after each issuance (needs `build_with_sweeper`).
    #[serde(default)]
    pub sweep_on_issue: bool,
    /// User cache TTL used by the HTTP extractor; negative skips the user cache.
    #[serde(default = "default_extractor_user_ttl")]
    pub extractor_user_ttl_seconds: i64,
}

impl Default for RSessionConfig {
    fn default() -> Self {
        Self {
            token_prefix: default_token_prefix(),
            user_prefix: default_user_prefix(),
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            index_ttl_seconds: DEFAULT_INDEX_TTL_SECONDS,
            single_mode: false,
            sweep_on_issue: false,
            extractor_user_ttl_seconds: default_extractor_user_ttl(),
        }
    }
}

/// ## 日本語
///
/// [`RSessionManager`] のビルダーです。
///
/// ## English
///
/// Builder for [`RSessionManager`].
///
/// ```
/// use std::sync::Arc;
/// use r_session::{MemoryStore, RSessionBuilder};
///
/// let manager = RSessionBuilder::new()
///     .token_prefix("app-t")
///     .user_prefix("app-u")
///     .default_ttl_seconds(3600)
///     .single_mode(true)
///     .build(Arc::new(MemoryStore::new()))
///     .expect("valid configuration");
/// assert!(manager.config().single_mode);
/// ```
#[derive(Clone, Default)]
pub struct RSessionBuilder {
    config: RSessionConfig,
    loader: Option<Arc<dyn UserLoader>>,
}

impl RSessionBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_config(config: RSessionConfig) -> Self {
        Self {
            config,
            loader: None,
        }
    }

    #[must_use]
    pub fn token_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.token_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn user_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.user_prefix = prefix.into();
        self
    }

    /// Zero keeps the current value.
    #[must_use]
    pub fn default_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        if ttl_seconds > 0 {
            self.config.default_ttl_seconds = ttl_seconds;
        }
        self
    }

    /// Zero keeps the current value.
    #[must_use]
    pub fn index_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        if ttl_seconds > 0 {
            self.config.index_ttl_seconds = ttl_seconds;
        }
        self
    }

    #[must_use]
    pub fn single_mode(mut self, single_mode: bool) -> Self {
        self.config.single_mode = single_mode;
        self
    }

    #[must_use]
    pub fn sweep_on_issue(mut self, sweep_on_issue: bool) -> Self {
        self.config.sweep_on_issue = sweep_on_issue;
        self
    }

    #[must_use]
    pub fn extractor_user_ttl_seconds(mut self, ttl_seconds: i64) -> Self {
        self.config.extractor_user_ttl_seconds = ttl_seconds;
        self
    }

    #[must_use]
    pub fn loader(self, loader: impl UserLoader + 'static) -> Self {
        self.shared_loader(Arc::new(loader))
    }

    #[must_use]
    pub fn shared_loader(mut self, loader: Arc<dyn UserLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    fn assemble(self, store: Arc<dyn KvStore>) -> Result<(RSessionManager, RTokenStore)> {
        let mut config = self.config;
        let keys = KeySpace::new(&config.token_prefix, &config.user_prefix)?;
        // Record the prefixes as they are actually used in keys.
        config.token_prefix = keys.token_prefix().to_string();
        config.user_prefix = keys.user_prefix().to_string();
        if config.default_ttl_seconds == 0 {
            config.default_ttl_seconds = DEFAULT_TTL_SECONDS;
        }
        if config.index_ttl_seconds == 0 {
            config.index_ttl_seconds = DEFAULT_INDEX_TTL_SECONDS;
        }

        let users = RUserCache::new(
            store.clone(),
            keys.clone(),
            config.default_ttl_seconds,
            self.loader,
        );
        let tokens = RTokenStore::new(
            store,
            keys,
            TokenPolicy {
                default_ttl: config.default_ttl_seconds,
                index_ttl: config.index_ttl_seconds,
                single_mode: config.single_mode,
            },
            users.clone(),
        );
        debug!(
            token_prefix = %config.token_prefix,
            user_prefix = %config.user_prefix,
            single_mode = config.single_mode,
            "session manager configured"
        );

        let manager = RSessionManager {
            config: Arc::new(config),
            tokens: tokens.clone(),
            users,
        };
        Ok((manager, tokens))
    }

    /// ## 日本語
    ///
    /// マネージャーを作ります。スイーパーは付きません（`sweep_on_issue` は無視されます）。
    ///
    /// ## English
    ///
    /// Builds the manager without a sweeper (`sweep_on_issue` has no effect).
    pub fn build(self, store: Arc<dyn KvStore>) -> Result<RSessionManager> {
        self.assemble(store).map(|(manager, _)| manager)
    }

    /// ## 日本語
    ///
    /// マネージャーとインデックススイーパーを作ります。`sweep_on_issue` が `true` のとき
    /// だけ発行処理がスイーパーにユーザー ID を送ります。スイーパーは呼び出し側が
    /// `tokio::spawn(sweeper.run())` で起動してください。
    ///
    /// ## English
    ///
    /// Builds the manager together with an index sweeper. Issuance only feeds the sweeper
    /// when `sweep_on_issue` is `true`. Spawn it with `tokio::spawn(sweeper.run())`.
    pub fn build_with_sweeper(
        self,
        store: Arc<dyn KvStore>,
    ) -> Result<(RSessionManager, IndexSweeper)> {
        let (mut manager, tokens) = self.assemble(store)?;
        let (queue, sweeper) = IndexSweeper::channel(tokens);
        if manager.config.sweep_on_issue {
            manager.tokens = manager.tokens.with_sweeper(queue);
        }
        Ok((manager, sweeper))
    }
}

/// ## 日本語
///
/// token ストアとユーザーキャッシュをまとめた窓口です。`Clone` は安価で、
/// 同じストアと設定を共有します。
///
/// ## English
///
/// Facade over the token store and the user cache. `Clone` is cheap and shares the
/// same store and configuration.
#[derive(Clone)]
pub struct RSessionManager {
    config: Arc<RSessionConfig>,
    tokens: RTokenStore,
    users: RUserCache,
}

impl RSessionManager {
    #[must_use]
    pub fn builder() -> RSessionBuilder {
        RSessionBuilder::new()
    }

    pub fn config(&self) -> &RSessionConfig {
        &self.config
    }

    pub fn token_store(&self) -> &RTokenStore {
        &self.tokens
    }

    pub fn user_cache(&self) -> &RUserCache {
        &self.users
    }

    /// See [`RTokenStore::issue_token`].
    pub async fn issue_token(&self, user_id: &str, ttl_seconds: i64) -> Result<String> {
        self.tokens.issue_token(user_id, ttl_seconds).await
    }

    /// See [`RTokenStore::refresh_token`].
    pub async fn refresh_token(&self, token: &str, ttl_seconds: i64) -> Result<bool> {
        self.tokens.refresh_token(token, ttl_seconds).await
    }

    pub async fn revoke_token(&self, token: &str) -> Result<()> {
        self.tokens.revoke_token(token).await
    }

    pub async fn revoke_user_tokens(&self, user_id: &str) -> Result<()> {
        self.tokens.revoke_all_user_tokens(user_id).await
    }

    pub async fn list_user_tokens(&self, user_id: &str) -> Result<Vec<String>> {
        self.tokens.list_user_tokens(user_id).await
    }

    /// See [`RTokenStore::check_token_and_load_user`].
    pub async fn check_token_and_load_user(
        &self,
        token: &str,
        user_info_ttl: i64,
    ) -> Result<Option<RUser>> {
        self.tokens
            .check_token_and_load_user(token, user_info_ttl)
            .await
    }

    pub async fn check_token(&self, token: &str) -> Result<Option<RUser>> {
        self.tokens.check_token(token).await
    }

    /// Loads `user_id` through the loader and (re)writes its cache record.
    pub async fn add_user(&self, user_id: &str, ttl_seconds: i64) -> Result<RUser> {
        self.users.fill_and_cache(user_id, ttl_seconds).await
    }

    pub async fn refresh_users<I, S>(&self, ids: I, ttl_seconds: i64) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.users.refresh_many(ids, ttl_seconds).await
    }

    pub async fn forget_user(&self, user_id: &str) -> Result<()> {
        self.users.forget(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::RSessionError;

    #[test]
    fn config_defaults() {
        let config = RSessionConfig::default();
        assert_eq!(config.token_prefix, "go-t");
        assert_eq!(config.user_prefix, "go-u");
        assert_eq!(config.default_ttl_seconds, 604_800);
        assert_eq!(config.index_ttl_seconds, 2_592_000);
        assert!(!config.single_mode);
        assert!(!config.sweep_on_issue);
        assert_eq!(config.extractor_user_ttl_seconds, -1);
    }

    #[test]
    fn config_deserializes_partial_input() -> std::result::Result<(), serde_json::Error> {
        let config: RSessionConfig =
            serde_json::from_str(r#"{"token_prefix":"app_t","single_mode":true}"#)?;
        assert_eq!(config.token_prefix, "app_t");
        assert_eq!(config.user_prefix, "go-u");
        assert!(config.single_mode);
        Ok(())
    }

    #[test]
    fn builder_normalizes_prefixes() -> Result<()> {
        let manager = RSessionBuilder::new()
            .token_prefix("app_t")
            .user_prefix("app_u")
            .default_ttl_seconds(0)
            .build(Arc::new(MemoryStore::new()))?;
        assert_eq!(manager.config().token_prefix, "app-t");
        assert_eq!(manager.config().user_prefix, "app-u");
        assert_eq!(manager.config().default_ttl_seconds, DEFAULT_TTL_SECONDS);
        Ok(())
    }

    #[test]
    fn builder_rejects_empty_prefix() {
        let result = RSessionBuilder::new()
            .token_prefix("  ")
            .build(Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(RSessionError::InvalidArgument(_))));
    }

    #[test]
    fn zero_ttls_from_config_fall_back() -> Result<()> {
        let config = RSessionConfig {
            default_ttl_seconds: 0,
            index_ttl_seconds: 0,
            ..RSessionConfig::default()
        };
        let manager = RSessionBuilder::from_config(config).build(Arc::new(MemoryStore::new()))?;
        assert_eq!(manager.token_store().policy().default_ttl, DEFAULT_TTL_SECONDS);
        assert_eq!(
            manager.token_store().policy().index_ttl,
            DEFAULT_INDEX_TTL_SECONDS
        );
        Ok(())
    }
}
