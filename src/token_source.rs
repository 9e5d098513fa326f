//! ## 日本語
//!
//! HTTP リクエストから token を取り出すための、フレームワークに依存しない部品です。
//!
//! header と cookie のどちらを優先するか、どの名前を見るかを [`TokenSourceConfig`] で
//! 指定します。header の値は `Bearer ` 接頭辞があってもなくても受け付けます。
//!
//! ## English
//!
//! Framework-independent helpers for pulling a token out of an HTTP request.
//!
//! [`TokenSourceConfig`] decides whether headers or cookies win and which names are
//! looked at. Header values are accepted with or without a `Bearer ` prefix.

/// Default cookie name carrying the session token.
pub const TOKEN_COOKIE_NAME: &str = "r_session";

/// Which source is consulted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenSourcePriority {
    #[default]
    HeaderFirst,
    CookieFirst,
}

/// ## 日本語
///
/// token の取得元の設定です。デフォルトは `Authorization` header を先に見て、次に
/// [`TOKEN_COOKIE_NAME`] cookie を見ます。
///
/// ## English
///
/// Token source settings. By default the `Authorization` header is checked first,
/// then the [`TOKEN_COOKIE_NAME`] cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSourceConfig {
    pub priority: TokenSourcePriority,
    pub header_names: Vec<String>,
    pub cookie_names: Vec<String>,
}

impl Default for TokenSourceConfig {
    fn default() -> Self {
        Self {
            priority: TokenSourcePriority::HeaderFirst,
            header_names: vec!["Authorization".to_string()],
            cookie_names: vec![TOKEN_COOKIE_NAME.to_string()],
        }
    }
}

fn header_token(value: &str) -> Option<String> {
    let value = value.trim();
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn cookie_token(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// ## 日本語
///
/// `cfg` の順序に従って token を探します。`header` と `cookie` は名前から値を返す
/// クロージャで、フレームワークごとの差をここで吸収します。空の値は無視されます。
///
/// ## English
///
/// Looks for a token in the order given by `cfg`. `header` and `cookie` map a name to
/// its raw value, which keeps this independent of the HTTP framework. Empty values are
/// skipped.
pub fn extract_token_with_config<H, C>(
    cfg: &TokenSourceConfig,
    header: H,
    cookie: C,
) -> Option<String>
where
    H: Fn(&str) -> Option<String>,
    C: Fn(&str) -> Option<String>,
{
    let from_headers = || {
        cfg.header_names
            .iter()
            .find_map(|name| header(name).as_deref().and_then(header_token))
    };
    let from_cookies = || {
        cfg.cookie_names
            .iter()
            .find_map(|name| cookie(name).as_deref().and_then(cookie_token))
    };

    match cfg.priority {
        TokenSourcePriority::HeaderFirst => from_headers().or_else(from_cookies),
        TokenSourcePriority::CookieFirst => from_cookies().or_else(from_headers),
    }
}
