#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::empty_loop)]
#![deny(clippy::indexing_slicing)]
#![deny(unused)]
//! # r-session
//!
//! Token sessions on a TTL key-value store (Redis/Valkey, or in-process memory).
//!
//! - [`RSessionManager`]: issues, refreshes and revokes tokens, and loads the owning user.
//! - [`RTokenStore`]: token records plus a per-user token index, swept lazily on read.
//! - [`RUserCache`]: user records filled on demand through a [`UserLoader`].
//! - [`KvStore`]: the storage seam, implemented by [`MemoryStore`] and (feature `redis`)
//!   `RedisStore`.
//!
//! ## Store layout
//!
//! | Key | Value | TTL |
//! |---|---|---|
//! | `{token_prefix}_{token}` | owning user key | per token |
//! | `{token_prefix}_{user_id}` | hash: token → expiry (epoch seconds) | index TTL (30 days) |
//! | `{user_prefix}_{user_id}` | JSON user | per call or default |
//!
//! Tokens look like `{user_id}_{32 hex chars}`; user ids may not contain `_`.
//!
//! ## 日本語
//!
//! TTL 付きキーバリューストア（Redis/Valkey またはメモリ）上の token セッション管理です。
//!
//! - [`RSessionManager`]：token の発行・延長・失効と、所有ユーザーの読み込み
//! - [`RTokenStore`]：token レコードとユーザーごとの token インデックス（読み取り時に掃除）
//! - [`RUserCache`]：[`UserLoader`] を通して必要なときに埋めるユーザーキャッシュ
//! - [`KvStore`]：ストアの抽象。[`MemoryStore`] と（`redis` feature の）`RedisStore` が実装
//!
//! ```
//! use std::sync::Arc;
//! use r_session::{MemoryStore, RSessionBuilder};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> r_session::Result<()> {
//! let manager = RSessionBuilder::new().build(Arc::new(MemoryStore::new()))?;
//! let token = manager.issue_token("alice", 3600).await?;
//! let user = manager.check_token(&token).await?;
//! assert_eq!(user.map(|user| user.id).as_deref(), Some("alice"));
//! # Ok(())
//! # }
//! ```

mod keyspace;
mod loader;
mod manager;
mod memory;
mod models;
mod store;
mod sweeper;
mod token_source;
mod token_store;
mod user_cache;

#[cfg(feature = "axum")]
mod axum_support;
#[cfg(feature = "redis")]
mod redis;

pub use crate::keyspace::KeySpace;
pub use crate::loader::{FnLoader, IdentityLoader, UserLoader};
pub use crate::manager::{RSessionBuilder, RSessionConfig, RSessionManager};
pub use crate::memory::MemoryStore;
pub use crate::models::{
    DELIMITER, LoaderError, RSessionError, RToken, RUser, Result, TokenLease, validate_user_id,
};
pub use crate::store::{KvStore, StoreOp};
pub use crate::sweeper::IndexSweeper;
pub use crate::token_source::{
    TOKEN_COOKIE_NAME, TokenSourceConfig, TokenSourcePriority, extract_token_with_config,
};
pub use crate::token_store::{RTokenStore, TokenPolicy};
pub use crate::user_cache::RUserCache;

#[cfg(feature = "axum")]
pub use crate::axum_support::SessionUser;
#[cfg(feature = "redis")]
pub use crate::redis::{MasterResolver, RedisConfig, RedisStore, SentinelConfig, SentinelResolver};
