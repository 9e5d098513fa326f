//! ## 日本語
//!
//! Redis/Valkey バックエンドの実装です。
//!
//! `redis` feature により [`RedisStore`] と、sentinel 経由でマスターを解決する
//! [`SentinelResolver`] が利用可能になります。
//!
//! ## English
//!
//! Redis/Valkey-backed implementation.
//!
//! Enabling the `redis` feature makes [`RedisStore`] available, together with
//! [`SentinelResolver`] for master discovery through Redis Sentinel.

mod config;
mod redis_store;
mod sentinel;

pub use config::{RedisConfig, SentinelConfig};
pub use redis_store::RedisStore;
pub use sentinel::{MasterResolver, SentinelResolver};
