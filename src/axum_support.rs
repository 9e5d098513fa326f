//! ## 日本語
//!
//! axum 向けの extractor 実装です。
//!
//! - `Extension<RSessionManager>` をリクエストから取得し
//! - Header/Cookie から token を抽出して検証し
//! - [`SessionUser`] を handler 引数として利用できるようにします
//!
//! ## English
//!
//! Axum extractor implementation.
//!
//! - Fetches `Extension<RSessionManager>` from the request
//! - Extracts a token from headers/cookies and validates it
//! - Enables [`SessionUser`] as a handler parameter

use axum::{
    extract::{Extension, FromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use tracing::warn;

use crate::manager::RSessionManager;
use crate::models::{RSessionError, RUser};
use crate::token_source::{TokenSourceConfig, extract_token_with_config};

// 日本語: extractor の失敗時に返す型（HTTP ステータス + 固定文字列ボディ）。
// English: Rejection type: HTTP status plus a static body.
type AxumRejection = (StatusCode, &'static str);

fn unauthorized(body: &'static str) -> AxumRejection {
    (StatusCode::UNAUTHORIZED, body)
}

fn internal(body: &'static str) -> AxumRejection {
    (StatusCode::INTERNAL_SERVER_ERROR, body)
}

fn cookie_header_string(parts: &Parts) -> Option<String> {
    // 日本語: Cookie header は複数来る可能性があるため "; " で結合する。
    // English: Cookie headers may repeat; join them with "; ".
    let joined = parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ");
    if joined.is_empty() { None } else { Some(joined) }
}

// Minimal "name=value; name2=value2" parser; no decoding.
fn find_cookie_value(cookie_header: &str, target_name: &str) -> Option<String> {
    cookie_header.split(';').find_map(|part| {
        let (name, value) = part.trim().split_once('=')?;
        (name.trim() == target_name).then(|| value.trim().to_string())
    })
}

/// ## 日本語
///
/// 認証済みユーザーです。handler の引数に書くと、token の検証とユーザー情報の読み込みが
/// 済んだ状態で渡されます。
///
/// - ルータに `.layer(Extension(manager))` が必要です（無ければ 500）
/// - `Extension<TokenSourceConfig>` があれば token の取得元を上書きします
/// - ユーザーキャッシュの TTL は `RSessionConfig::extractor_user_ttl_seconds` に従います
/// - token が無い・不正・期限切れなら 401、ストア障害なら 500
///
/// ## English
///
/// An authenticated user. As a handler argument it arrives with the token already
/// validated and the user loaded.
///
/// - The router must install `.layer(Extension(manager))` (500 otherwise)
/// - An optional `Extension<TokenSourceConfig>` overrides where the token is read from
/// - The user cache TTL follows `RSessionConfig::extractor_user_ttl_seconds`
/// - Missing, malformed or expired tokens give 401; store failures give 500
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUser {
    pub user: RUser,
    pub token: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = AxumRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(manager) = Extension::<RSessionManager>::from_request_parts(parts, state)
            .await
            .map_err(|_| internal("Session manager not found"))?;

        let cfg = match Extension::<TokenSourceConfig>::from_request_parts(parts, state).await {
            Ok(Extension(cfg)) => cfg,
            Err(_) => TokenSourceConfig::default(),
        };

        let cookie_header = cookie_header_string(parts);
        let token = extract_token_with_config(
            &cfg,
            |name| {
                parts
                    .headers
                    .get(name)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            },
            |name| {
                cookie_header
                    .as_deref()
                    .and_then(|header| find_cookie_value(header, name))
            },
        )
        .ok_or_else(|| unauthorized("Unauthorized"))?;

        let user_ttl = manager.config().extractor_user_ttl_seconds;
        match manager.check_token_and_load_user(&token, user_ttl).await {
            Ok(Some(user)) => Ok(Self { user, token }),
            Ok(None) => Err(unauthorized("Invalid token")),
            Err(RSessionError::InvalidArgument(_) | RSessionError::CorruptRecord { .. }) => {
                Err(unauthorized("Invalid token"))
            }
            Err(err) => {
                warn!(error = %err, "session check failed");
                Err(internal("Session store error"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_cookie_among_others() {
        let header = "theme=dark; r_session=u1_abc ; lang=ja";
        assert_eq!(
            find_cookie_value(header, "r_session").as_deref(),
            Some("u1_abc")
        );
        assert_eq!(find_cookie_value(header, "missing"), None);
        assert_eq!(find_cookie_value("broken", "broken"), None);
    }
}
