//! ## 日本語
//!
//! r-session のエラー型です。
//!
//! 「見つからない」はエラーではなく `Ok(None)` / `Ok(false)` で表します。ここに並ぶのは
//! 呼び出し側に返すべき本当の失敗だけです。内部でのリトライは行いません。
//!
//! ## English
//!
//! Error types for r-session.
//!
//! "Not found" is never an error: it is reported as `Ok(None)` / `Ok(false)`.
//! The variants below are real failures returned to the immediate caller; nothing
//! is retried internally.

/// Boxed error returned by a [`crate::UserLoader`].
pub type LoaderError = Box<dyn std::error::Error + Send + Sync>;

/// ## 日本語
///
/// r-session が返すエラーの集合です。
///
/// ## English
///
/// Errors returned by r-session.
#[derive(Debug, thiserror::Error)]
pub enum RSessionError {
    /// An empty or malformed user id / token was passed in.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// ## 日本語
    ///
    /// token レコードの値が、token に埋め込まれたユーザーの key と一致しません。
    ///
    /// ## English
    ///
    /// The token record points at a user key that cannot belong to this token.
    #[error("token record for {token} points at {found}")]
    CorruptRecord { token: String, found: String },

    /// A collaborator required by the operation was not configured.
    #[error("not configured: {0}")]
    NotConfigured(&'static str),

    /// ## 日本語
    ///
    /// ストアへの接続、またはコマンド実行に失敗しました。
    ///
    /// ## English
    ///
    /// Connecting to the store or running a command failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The cached user payload could not be encoded or decoded.
    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The user loader failed.
    #[error("user loader failed: {0}")]
    Loader(#[source] LoaderError),
}

impl RSessionError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn store(message: impl Into<String>) -> Self {
        Self::StoreUnavailable(message.into())
    }
}

/// Result type used throughout r-session.
pub type Result<T> = std::result::Result<T, RSessionError>;
