//! ## 日本語
//!
//! sentinel を使った書き込みマスターの解決です。
//!
//! 解決結果はキャッシュしません。プールが新しい接続を張るたびに問い合わせます。
//!
//! ## English
//!
//! Write-master discovery through Redis Sentinel.
//!
//! Results are not cached: the pool asks again every time it dials a new connection.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::redis_store::{connection_config, from_redis_error};
use crate::models::{RSessionError, Result};
use crate::redis::SentinelConfig;

/// Resolves the address of the current write-master.
#[async_trait]
pub trait MasterResolver: Send + Sync {
    /// Returns `(host, port)` of the current master.
    async fn resolve_master(&self) -> Result<(String, u16)>;
}

/// ## 日本語
///
/// 設定された sentinel に順番に `SENTINEL get-master-addr-by-name` を送り、最初に得られた
/// アドレスを返します。
///
/// ## English
///
/// Asks each configured sentinel, in order, `SENTINEL get-master-addr-by-name` and
/// returns the first address reported.
#[derive(Debug, Clone)]
pub struct SentinelResolver {
    master_name: String,
    nodes: Vec<String>,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl SentinelResolver {
    pub fn new(
        config: &SentinelConfig,
        connect_timeout: Duration,
        response_timeout: Duration,
    ) -> Self {
        Self {
            master_name: config.master_name.clone(),
            nodes: config.nodes.clone(),
            connect_timeout,
            response_timeout,
        }
    }

    async fn ask(&self, node: &str) -> Result<Option<(String, u16)>> {
        let client = redis::Client::open(format!("redis://{node}")).map_err(from_redis_error)?;
        let mut connection = client
            .get_multiplexed_async_connection_with_config(&connection_config(
                self.connect_timeout,
                self.response_timeout,
            ))
            .await
            .map_err(from_redis_error)?;
        let reply: Option<(String, u16)> = redis::cmd("SENTINEL")
            .arg("get-master-addr-by-name")
            .arg(&self.master_name)
            .query_async(&mut connection)
            .await
            .map_err(from_redis_error)?;
        Ok(reply)
    }
}

#[async_trait]
impl MasterResolver for SentinelResolver {
    async fn resolve_master(&self) -> Result<(String, u16)> {
        for node in &self.nodes {
            match self.ask(node).await {
                Ok(Some(addr)) => {
                    debug!(
                        sentinel = %node,
                        master = %self.master_name,
                        host = %addr.0,
                        port = addr.1,
                        "resolved master"
                    );
                    return Ok(addr);
                }
                Ok(None) => {
                    debug!(
                        sentinel = %node,
                        master = %self.master_name,
                        "sentinel does not know the master"
                    );
                }
                Err(err) => {
                    warn!(sentinel = %node, error = %err, "sentinel query failed");
                }
            }
        }
        Err(RSessionError::store(format!(
            "no sentinel could resolve master {}",
            self.master_name
        )))
    }
}
