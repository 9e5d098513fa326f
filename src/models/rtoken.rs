//! Token strings and user id validation.
//!
//! Tokens have the shape `<user_id>_<opaque>`. The owner is embedded in the token
//! itself, so parsing happens here and nowhere else.

use crate::models::{RSessionError, Result};

/// Separator between fields of tokens and derived store keys.
pub const DELIMITER: char = '_';

/// ## 日本語
///
/// パース済みの token です。`user_id` は最初の `_` より前の部分です。
///
/// ## English
///
/// A parsed token. `user_id` is everything before the first `_`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RToken<'a> {
    raw: &'a str,
    user_id: &'a str,
}

impl<'a> RToken<'a> {
    /// Parses a caller-presented token.
    ///
    /// Fails with [`RSessionError::InvalidArgument`] when the token is empty, has no
    /// delimiter, or has an empty user id segment.
    pub fn parse(raw: &'a str) -> Result<Self> {
        if raw.is_empty() {
            return Err(RSessionError::invalid("token is empty"));
        }
        match raw.split_once(DELIMITER) {
            Some((user_id, _)) if !user_id.is_empty() => Ok(Self { raw, user_id }),
            _ => Err(RSessionError::invalid(format!("malformed token: {raw}"))),
        }
    }

    /// Generates a fresh token for `user_id`.
    ///
    /// The opaque part is a random UUID v4 rendered without hyphens.
    pub fn generate(user_id: &str) -> String {
        format!("{user_id}{DELIMITER}{}", uuid::Uuid::new_v4().simple())
    }

    pub fn as_str(&self) -> &'a str {
        self.raw
    }

    pub fn user_id(&self) -> &'a str {
        self.user_id
    }
}

/// Checks a user id against the identifier policy: non-empty, no `_`.
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        return Err(RSessionError::invalid("user id is empty"));
    }
    if user_id.contains(DELIMITER) {
        return Err(RSessionError::invalid(format!(
            "user id {user_id:?} contains the reserved '{DELIMITER}' delimiter"
        )));
    }
    Ok(())
}
