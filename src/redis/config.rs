//! Redis/Valkey connection configuration.

use serde::{Deserialize, Serialize};

/// ## 日本語
///
/// Redis/Valkey への接続設定です。`sentinel` を指定すると、接続のたびに sentinel から
/// 現在のマスターを解決します。
///
/// ## English
///
/// Redis/Valkey connection configuration. When `sentinel` is set, the current master
/// is resolved through the sentinels every time a connection is dialed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis server host (ignored in sentinel mode).
    #[serde(default = "default_host")]
    pub host: String,
    /// Redis server port (ignored in sentinel mode).
    #[serde(default = "default_port")]
    pub port: u16,
    /// ACL username.
    #[serde(default)]
    pub username: Option<String>,
    /// Redis password.
    #[serde(default)]
    pub password: Option<String>,
    /// Logical database index.
    #[serde(default)]
    pub database: i64,
    /// Number of pooled connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Dial timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Read timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Sentinel configuration (optional).
    #[serde(default)]
    pub sentinel: Option<SentinelConfig>,
}

/// Redis Sentinel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelConfig {
    /// Logical name of the monitored master.
    pub master_name: String,
    /// Sentinel addresses, `host:port`.
    pub nodes: Vec<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            database: 0,
            pool_size: default_pool_size(),
            connect_timeout_ms: default_timeout_ms(),
            read_timeout_ms: default_timeout_ms(),
            write_timeout_ms: default_timeout_ms(),
            sentinel: None,
        }
    }
}

impl RedisConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub const fn database(mut self, database: i64) -> Self {
        self.database = database;
        self
    }

    #[must_use]
    pub const fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Sets the dial, read and write timeouts at once.
    #[must_use]
    pub const fn timeouts_ms(mut self, connect: u64, read: u64, write: u64) -> Self {
        self.connect_timeout_ms = connect;
        self.read_timeout_ms = read;
        self.write_timeout_ms = write;
        self
    }

    /// Switches to sentinel mode.
    #[must_use]
    pub fn sentinel(mut self, master_name: impl Into<String>, nodes: Vec<String>) -> Self {
        self.sentinel = Some(SentinelConfig {
            master_name: master_name.into(),
            nodes,
        });
        self
    }

    /// Builds the connection URL for direct (non-sentinel) mode.
    #[must_use]
    pub fn connection_url(&self) -> String {
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!("{user}:{pass}@"),
            (None, Some(pass)) => format!(":{pass}@"),
            (Some(user), None) => format!("{user}@"),
            (None, None) => String::new(),
        };
        format!(
            "redis://{auth}{host}:{port}/{db}",
            host = self.host,
            port = self.port,
            db = self.database
        )
    }

    // The redis client has a single response timeout; the stricter of read/write wins.
    pub(crate) fn response_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.read_timeout_ms.min(self.write_timeout_ms))
    }

    pub(crate) fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    6379
}

const fn default_pool_size() -> usize {
    4
}

const fn default_timeout_ms() -> u64 {
    1000
}
