//! ## 日本語
//!
//! token の発行・延長・失効と、ユーザーごとの token インデックスの管理を行います。
//!
//! ストア上のレイアウト：
//! - token レコード：`{token_prefix}_{token}` → ユーザー key（TTL は token ごと）
//! - ユーザーインデックス：`{token_prefix}_{user_id}` → ハッシュ（token → 失効時刻 epoch 秒）。
//!   インデックス自体にも粗い TTL（デフォルト 30 日）を付け、放置されたインデックスが
//!   無限に残らないようにします。
//!
//! token レコードとインデックスを同時に書き換える操作は、1 つのバッチとしてまとめて
//! 適用します。インデックスの古いエントリは読み取り時にだけ掃除されます（遅延スイープ）。
//!
//! ## English
//!
//! Token issuance, refresh, revocation and per-user token index bookkeeping.
//!
//! Store layout:
//! - token record: `{token_prefix}_{token}` → owning user key (per-token TTL)
//! - user index: `{token_prefix}_{user_id}` → hash of token → expiry (epoch seconds).
//!   The index carries its own coarse TTL (30 days by default) so abandoned indexes
//!   do not live forever.
//!
//! Writes touching both the token record and the index go out as a single batch.
//! Stale index entries are only purged as a side effect of reads (lazy sweep).

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, trace};

use crate::keyspace::KeySpace;
use crate::models::{RSessionError, RToken, RUser, Result, TokenLease, validate_user_id};
use crate::store::{KvStore, StoreOp};
use crate::sweeper::SweepQueue;
use crate::user_cache::RUserCache;

fn now_secs() -> i64 {
    Utc::now().timestamp()
}

fn expire_at(now: i64, ttl_seconds: u64) -> i64 {
    now.saturating_add(i64::try_from(ttl_seconds).unwrap_or(i64::MAX))
}

/// TTL policy shared by every token operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    /// TTL used when a caller passes `ttl_seconds <= 0`.
    pub default_ttl: u64,
    /// Coarse TTL of each user's token index.
    pub index_ttl: u64,
    /// Issuing a token revokes every other token of the same user.
    pub single_mode: bool,
}

/// ## 日本語
///
/// token ストア本体です。`Clone` は同じストアへのハンドルを増やすだけです。
///
/// ## English
///
/// The token store. `Clone` shares the same underlying store.
#[derive(Clone)]
pub struct RTokenStore {
    store: Arc<dyn KvStore>,
    keys: KeySpace,
    policy: TokenPolicy,
    users: RUserCache,
    sweeper: Option<SweepQueue>,
}

impl RTokenStore {
    pub fn new(
        store: Arc<dyn KvStore>,
        keys: KeySpace,
        policy: TokenPolicy,
        users: RUserCache,
    ) -> Self {
        Self {
            store,
            keys,
            policy,
            users,
            sweeper: None,
        }
    }

    pub(crate) fn with_sweeper(mut self, sweeper: SweepQueue) -> Self {
        self.sweeper = Some(sweeper);
        self
    }

    pub fn policy(&self) -> TokenPolicy {
        self.policy
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    // The index must outlive every token it tracks, including longer-lived ones
    // written earlier.
    async fn index_ttl_for(&self, index_key: &str, token_ttl: u64) -> Result<u64> {
        let remaining = self
            .store
            .ttl(index_key)
            .await?
            .and_then(|ttl| u64::try_from(ttl).ok())
            .unwrap_or(0);
        Ok(self.policy.index_ttl.max(token_ttl).max(remaining))
    }

    fn resolve_ttl(&self, ttl_seconds: i64) -> u64 {
        match u64::try_from(ttl_seconds) {
            Ok(ttl) if ttl > 0 => ttl,
            _ => self.policy.default_ttl,
        }
    }

    /// ## 日本語
    ///
    /// `user_id` に新しい token を発行します。
    ///
    /// single モードでは、先にそのユーザーの既存 token をすべて失効させます。失効に失敗した
    /// 場合は発行せずにエラーを返します。`ttl_seconds <= 0` のときはデフォルト TTL を使います。
    ///
    /// インデックスの TTL は、token より先に切れないよう必要に応じて延ばします。
    ///
    /// エラーが返った場合、token は発行されていないものとして扱ってください（バッチの一部が
    /// 適用されていても、後の読み取りで掃除されます）。
    ///
    /// ## English
    ///
    /// Issues a new token for `user_id`.
    ///
    /// In single mode every existing token of the user is revoked first; if that fails
    /// nothing is issued. `ttl_seconds <= 0` selects the default TTL.
    ///
    /// The index TTL is stretched when needed so it never expires before the token.
    ///
    /// On error, treat the token as not issued: anything that partially landed is
    /// cleaned up by later reads.
    pub async fn issue_token(&self, user_id: &str, ttl_seconds: i64) -> Result<String> {
        validate_user_id(user_id)?;

        if self.policy.single_mode {
            self.revoke_all_user_tokens(user_id).await?;
        }

        let ttl = self.resolve_ttl(ttl_seconds);
        let token = RToken::generate(user_id);
        let index_key = self.keys.user_index_key(user_id);
        let index_ttl = self.index_ttl_for(&index_key, ttl).await?;
        let ops = [
            StoreOp::SetEx {
                key: self.keys.token_key(&token),
                value: self.keys.user_key(user_id),
                ttl_seconds: ttl,
            },
            StoreOp::HSet {
                key: index_key.clone(),
                field: token.clone(),
                value: expire_at(now_secs(), ttl).to_string(),
            },
            StoreOp::Expire {
                key: index_key,
                ttl_seconds: index_ttl,
            },
        ];
        self.store.exec_atomic(&ops).await?;
        debug!(user_id = %user_id, ttl, "token issued");

        if !self.policy.single_mode
            && let Some(sweeper) = &self.sweeper
        {
            sweeper.enqueue(user_id);
        }
        Ok(token)
    }

    /// ## 日本語
    ///
    /// token の TTL を「現在から `ttl_seconds`」に更新し、インデックスの失効時刻も書き換えます。
    ///
    /// 返り値：
    /// - token レコードが存在し、更新した：`Ok(true)`
    /// - token レコードが既に無い：`Ok(false)`（復活はさせず、古いインデックスエントリを削除）
    ///
    /// ## English
    ///
    /// Resets the token TTL to `ttl_seconds` from now and rewrites its index entry.
    ///
    /// Returns:
    /// - `Ok(true)` if the token record existed and was refreshed
    /// - `Ok(false)` if the token record is already gone; it is not revived and its
    ///   stale index entry is removed
    pub async fn refresh_token(&self, token: &str, ttl_seconds: i64) -> Result<bool> {
        let parsed = RToken::parse(token)?;
        let token_key = self.keys.token_key(token);
        let index_key = self.keys.user_index_key(parsed.user_id());

        if self.store.ttl(&token_key).await?.is_none() {
            self.store.hdel(&index_key, &[token.to_string()]).await?;
            debug!(user_id = %parsed.user_id(), "refresh skipped, token record is gone");
            return Ok(false);
        }

        let ttl = self.resolve_ttl(ttl_seconds);
        let index_ttl = self.index_ttl_for(&index_key, ttl).await?;
        let ops = [
            StoreOp::Expire {
                key: token_key,
                ttl_seconds: ttl,
            },
            StoreOp::HSet {
                key: index_key.clone(),
                field: token.to_string(),
                value: expire_at(now_secs(), ttl).to_string(),
            },
            StoreOp::Expire {
                key: index_key,
                ttl_seconds: index_ttl,
            },
        ];
        self.store.exec_atomic(&ops).await?;
        debug!(user_id = %parsed.user_id(), ttl, "token refreshed");
        Ok(true)
    }

    /// ## 日本語
    ///
    /// token レコードとインデックスエントリをまとめて削除します。存在しない token の
    /// 失効も成功として扱います（冪等）。
    ///
    /// ## English
    ///
    /// Deletes the token record and its index entry together. Revoking a token that
    /// does not exist is treated as success.
    pub async fn revoke_token(&self, token: &str) -> Result<()> {
        let parsed = RToken::parse(token)?;
        let ops = [
            StoreOp::Del {
                key: self.keys.token_key(token),
            },
            StoreOp::HDel {
                key: self.keys.user_index_key(parsed.user_id()),
                field: token.to_string(),
            },
        ];
        self.store.exec_atomic(&ops).await?;
        debug!(user_id = %parsed.user_id(), "token revoked");
        Ok(())
    }

    /// Revokes every live token of `user_id` in one batch.
    pub async fn revoke_all_user_tokens(&self, user_id: &str) -> Result<()> {
        let tokens = self.list_user_tokens(user_id).await?;
        if tokens.is_empty() {
            return Ok(());
        }

        let index_key = self.keys.user_index_key(user_id);
        let mut ops = Vec::with_capacity(tokens.len() * 2);
        for token in &tokens {
            ops.push(StoreOp::Del {
                key: self.keys.token_key(token),
            });
            ops.push(StoreOp::HDel {
                key: index_key.clone(),
                field: token.clone(),
            });
        }
        self.store.exec_atomic(&ops).await?;
        debug!(user_id = %user_id, count = tokens.len(), "all user tokens revoked");
        Ok(())
    }

    /// ## 日本語
    ///
    /// ユーザーの有効な token を、記録された失効時刻の早い順に返します。
    ///
    /// 読み取りの副作用として、失効時刻を過ぎたエントリをインデックスから削除します。
    /// これがインデックスの唯一の掃除手段です。
    ///
    /// ## English
    ///
    /// Returns the user's live tokens, earliest recorded expiry first.
    ///
    /// As a side effect, entries whose recorded expiry has passed are deleted from the
    /// index. This is the only way the index is ever pruned.
    pub async fn list_user_tokens(&self, user_id: &str) -> Result<Vec<String>> {
        validate_user_id(user_id)?;
        let (live, _purged) = self.read_index(user_id).await?;
        Ok(live.into_iter().map(|(token, _)| token).collect())
    }

    /// Purges stale index entries of `user_id`; returns how many were removed.
    pub async fn sweep_user_index(&self, user_id: &str) -> Result<usize> {
        validate_user_id(user_id)?;
        let (_live, purged) = self.read_index(user_id).await?;
        Ok(purged)
    }

    async fn read_index(&self, user_id: &str) -> Result<(Vec<(String, i64)>, usize)> {
        let index_key = self.keys.user_index_key(user_id);
        let entries = self.store.hgetall(&index_key).await?;

        let now = now_secs();
        let mut live = Vec::with_capacity(entries.len());
        let mut stale = Vec::new();
        for (token, recorded) in entries {
            // Unparseable expiries count as already expired.
            match recorded.parse::<i64>() {
                Ok(at) if at > now => live.push((token, at)),
                _ => stale.push(token),
            }
        }

        if !stale.is_empty() {
            self.store.hdel(&index_key, &stale).await?;
            debug!(user_id = %user_id, purged = stale.len(), "stale index entries swept");
        }

        live.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok((live, stale.len()))
    }

    /// ## 日本語
    ///
    /// token を検証し、ユーザー情報を返します。
    ///
    /// - token の形式が不正：エラー
    /// - token レコードが無い、または残り TTL が 1 秒以下：インデックスエントリを削除して `Ok(None)`
    /// - レコードの値が token のユーザーと一致しない：[`RSessionError::CorruptRecord`]
    /// - インデックスエントリが無い：`Ok(None)`
    /// - ローダー未設定、または `user_info_ttl < 0`：ID と token 情報だけのユーザー
    /// - それ以外：キャッシュから読み、無ければローダーで読み込んでキャッシュする
    ///
    /// ## English
    ///
    /// Validates a token and returns its user.
    ///
    /// - malformed token: error
    /// - token record absent, or 1 second or less left: index entry removed, `Ok(None)`
    /// - record points at another user: [`RSessionError::CorruptRecord`]
    /// - no index entry: `Ok(None)`
    /// - no loader, or `user_info_ttl < 0`: identity plus token timing only
    /// - otherwise: read from the user cache, filling it through the loader on a miss
    pub async fn check_token_and_load_user(
        &self,
        token: &str,
        user_info_ttl: i64,
    ) -> Result<Option<RUser>> {
        let parsed = RToken::parse(token)?;
        let user_id = parsed.user_id();
        let index_key = self.keys.user_index_key(user_id);

        // A record about to expire is treated as gone so callers never hold a token
        // that dies before they use it.
        let (owner_key, remaining_ttl) = match self
            .store
            .get_with_ttl(&self.keys.token_key(token))
            .await?
        {
            Some((owner_key, ttl)) if ttl > 1 => (owner_key, ttl),
            _ => {
                self.store.hdel(&index_key, &[token.to_string()]).await?;
                trace!(user_id = %user_id, "token missing or expiring");
                return Ok(None);
            }
        };

        if owner_key != self.keys.user_key(user_id) {
            return Err(RSessionError::CorruptRecord {
                token: token.to_string(),
                found: owner_key,
            });
        }

        let Some(expire_at) = self
            .store
            .hget(&index_key, token)
            .await?
            .and_then(|recorded| recorded.parse::<i64>().ok())
        else {
            trace!(user_id = %user_id, "token record has no index entry");
            return Ok(None);
        };

        let lease = TokenLease {
            token: token.to_string(),
            remaining_ttl,
            expire_at,
        };

        if !self.users.has_loader() || user_info_ttl < 0 {
            return Ok(Some(RUser::new(user_id).leased(lease)));
        }

        if let Some(user) = self.users.cached(user_id).await? {
            return Ok(Some(user.leased(lease)));
        }

        let user = self.users.fill_and_cache(user_id, user_info_ttl).await?;
        Ok(Some(user.leased(lease)))
    }

    /// Validates a token without touching the user cache.
    pub async fn check_token(&self, token: &str) -> Result<Option<RUser>> {
        self.check_token_and_load_user(token, -1).await
    }
}
