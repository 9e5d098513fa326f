//! ## 日本語
//!
//! Redis/Valkey をバックエンドにした [`KvStore`] 実装です。
//!
//! 小さな接続プールをラウンドロビンで使います。各スロットは 1 回の操作の間だけロックされます。
//! I/O エラーで壊れた接続はスロットから捨て、次に取得したときに張り直します
//! （sentinel モードでは張り直すたびにマスターを解決し直します）。
//!
//! ## English
//!
//! Redis/Valkey-backed [`KvStore`].
//!
//! A small connection pool is used round-robin; each slot is locked for the duration of
//! one operation. A connection that failed with an I/O error is dropped from its slot
//! and re-dialed on the next acquisition (re-resolving the master in sentinel mode).

use std::collections::HashMap;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult, aio::MultiplexedConnection};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::models::{RSessionError, Result};
use crate::redis::{MasterResolver, RedisConfig, SentinelResolver};
use crate::store::{KvStore, StoreOp};

pub(crate) fn from_redis_error(err: redis::RedisError) -> RSessionError {
    RSessionError::StoreUnavailable(err.to_string())
}

pub(crate) fn connection_config(
    connect_timeout: Duration,
    response_timeout: Duration,
) -> redis::AsyncConnectionConfig {
    redis::AsyncConnectionConfig::new()
        .set_connection_timeout(connect_timeout)
        .set_response_timeout(response_timeout)
}

fn expire_arg(ttl_seconds: u64) -> i64 {
    i64::try_from(ttl_seconds).unwrap_or(i64::MAX)
}

enum Dialer {
    Direct(redis::Client),
    Sentinel {
        resolver: Arc<dyn MasterResolver>,
        database: i64,
        username: Option<String>,
        password: Option<String>,
    },
}

type Slot = Option<MultiplexedConnection>;

/// ## 日本語
///
/// Redis/Valkey 上のストアです。`Clone` は同じプールへのハンドルを増やすだけです。
///
/// ## English
///
/// Redis/Valkey store. `Clone` shares the same pool.
#[derive(Clone)]
pub struct RedisStore {
    dialer: Arc<Dialer>,
    connect_timeout: Duration,
    response_timeout: Duration,
    // tokio::Mutex: one operation per slot at a time.
    connections: Arc<Vec<Mutex<Slot>>>,
    next_index: Arc<AtomicUsize>,
}

impl RedisStore {
    /// ## 日本語
    ///
    /// 設定に従って接続し、`PING` で疎通を確認します。
    ///
    /// ## English
    ///
    /// Connects according to `config` and verifies the server with `PING`.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let dialer = match &config.sentinel {
            Some(sentinel) => Dialer::Sentinel {
                resolver: Arc::new(SentinelResolver::new(
                    sentinel,
                    config.connect_timeout(),
                    config.response_timeout(),
                )),
                database: config.database,
                username: config.username.clone(),
                password: config.password.clone(),
            },
            None => Dialer::Direct(
                redis::Client::open(config.connection_url()).map_err(from_redis_error)?,
            ),
        };
        Self::with_dialer(dialer, config).await
    }

    /// Connects through a caller-supplied master resolver.
    pub async fn with_resolver(
        config: &RedisConfig,
        resolver: Arc<dyn MasterResolver>,
    ) -> Result<Self> {
        let dialer = Dialer::Sentinel {
            resolver,
            database: config.database,
            username: config.username.clone(),
            password: config.password.clone(),
        };
        Self::with_dialer(dialer, config).await
    }

    async fn with_dialer(dialer: Dialer, config: &RedisConfig) -> Result<Self> {
        let mut connections = Vec::with_capacity(config.pool_size.max(1));
        for _ in 0..config.pool_size.max(1) {
            connections.push(Mutex::new(None));
        }
        let store = Self {
            dialer: Arc::new(dialer),
            connect_timeout: config.connect_timeout(),
            response_timeout: config.response_timeout(),
            connections: Arc::new(connections),
            next_index: Arc::new(AtomicUsize::new(0)),
        };

        let (mut slot, mut connection) = store.checkout().await?;
        let pong: RedisResult<String> = redis::cmd("PING").query_async(&mut connection).await;
        settle(&mut slot, pong)?;
        drop(slot);
        Ok(store)
    }

    async fn dial(&self) -> Result<MultiplexedConnection> {
        let client = match self.dialer.as_ref() {
            Dialer::Direct(client) => client.clone(),
            Dialer::Sentinel {
                resolver,
                database,
                username,
                password,
            } => {
                let (host, port) = resolver.resolve_master().await?;
                let info = redis::ConnectionInfo {
                    addr: redis::ConnectionAddr::Tcp(host, port),
                    redis: redis::RedisConnectionInfo {
                        db: *database,
                        username: username.clone(),
                        password: password.clone(),
                        ..Default::default()
                    },
                };
                redis::Client::open(info).map_err(from_redis_error)?
            }
        };
        debug!("dialing redis connection");
        client
            .get_multiplexed_async_connection_with_config(&connection_config(
                self.connect_timeout,
                self.response_timeout,
            ))
            .await
            .map_err(from_redis_error)
    }

    /// ## 日本語
    ///
    /// 次のスロットをロックし、必要なら接続を張ってから、その接続のハンドルを返します。
    ///
    /// ## English
    ///
    /// Locks the next slot, dialing if it is empty, and returns it with a connection handle.
    async fn checkout(&self) -> Result<(MutexGuard<'_, Slot>, MultiplexedConnection)> {
        let len = self.connections.len();
        if len == 0 {
            return Err(RSessionError::store("no redis connections"));
        }
        let index = self.next_index.fetch_add(1, Ordering::Relaxed) % len;
        let Some(slot) = self.connections.get(index) else {
            return Err(RSessionError::store("no redis connections"));
        };
        let mut slot = slot.lock().await;
        let connection = match slot.as_ref() {
            Some(connection) => connection.clone(),
            None => {
                let connection = self.dial().await?;
                *slot = Some(connection.clone());
                connection
            }
        };
        Ok((slot, connection))
    }
}

// Maps the command result; a connection-level failure empties the slot so it is re-dialed.
fn settle<T>(slot: &mut MutexGuard<'_, Slot>, result: RedisResult<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
                warn!(error = %err, "redis connection failed, slot will be re-dialed");
                **slot = None;
            }
            Err(from_redis_error(err))
        }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get_with_ttl(&self, key: &str) -> Result<Option<(String, i64)>> {
        let (mut slot, mut connection) = self.checkout().await?;
        let mut pipe = redis::pipe();
        pipe.atomic().get(key).ttl(key);
        let reply: RedisResult<(Option<String>, i64)> = pipe.query_async(&mut connection).await;
        let (value, ttl) = settle(&mut slot, reply)?;
        Ok(value.map(|value| (value, ttl)))
    }

    async fn ttl(&self, key: &str) -> Result<Option<i64>> {
        let (mut slot, mut connection) = self.checkout().await?;
        let reply: RedisResult<i64> = connection.ttl(key).await;
        let ttl = settle(&mut slot, reply)?;
        // -2: key does not exist
        if ttl == -2 {
            return Ok(None);
        }
        Ok(Some(ttl))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let (mut slot, mut connection) = self.checkout().await?;
        let reply: RedisResult<()> = connection.set_ex(key, value, ttl_seconds).await;
        settle(&mut slot, reply)
    }

    async fn del(&self, key: &str) -> Result<()> {
        let (mut slot, mut connection) = self.checkout().await?;
        let reply: RedisResult<i64> = connection.del(key).await;
        settle(&mut slot, reply).map(|_| ())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let (mut slot, mut connection) = self.checkout().await?;
        let reply: RedisResult<Option<String>> = connection.hget(key, field).await;
        settle(&mut slot, reply)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let (mut slot, mut connection) = self.checkout().await?;
        let reply: RedisResult<HashMap<String, String>> = connection.hgetall(key).await;
        settle(&mut slot, reply)
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let (mut slot, mut connection) = self.checkout().await?;
        let reply: RedisResult<i64> = connection.hdel(key, fields).await;
        settle(&mut slot, reply).map(|_| ())
    }

    async fn exec_atomic(&self, ops: &[StoreOp]) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in ops {
            match op {
                StoreOp::SetEx {
                    key,
                    value,
                    ttl_seconds,
                } => {
                    pipe.set_ex(key, value, *ttl_seconds).ignore();
                }
                StoreOp::Expire { key, ttl_seconds } => {
                    pipe.expire(key, expire_arg(*ttl_seconds)).ignore();
                }
                StoreOp::Del { key } => {
                    pipe.del(key).ignore();
                }
                StoreOp::HSet { key, field, value } => {
                    pipe.hset(key, field, value).ignore();
                }
                StoreOp::HDel { key, field } => {
                    pipe.hdel(key, field).ignore();
                }
            }
        }

        let (mut slot, mut connection) = self.checkout().await?;
        let reply: RedisResult<()> = pipe.query_async(&mut connection).await;
        settle(&mut slot, reply)
    }
}
