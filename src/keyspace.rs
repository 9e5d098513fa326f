//! Store key derivation.
//!
//! | key          | format                    |
//! |--------------|---------------------------|
//! | token record | `{token_prefix}_{token}`  |
//! | user index   | `{token_prefix}_{user_id}`|
//! | user cache   | `{user_prefix}_{user_id}` |

use crate::models::{DELIMITER, RSessionError, Result};

/// Derives store keys from the configured prefixes. Pure, no I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    token_prefix: String,
    user_prefix: String,
}

impl KeySpace {
    /// Builds a key space. `_` in a prefix is replaced with `-`; empty prefixes are rejected.
    pub fn new(token_prefix: &str, user_prefix: &str) -> Result<Self> {
        Ok(Self {
            token_prefix: normalize_prefix(token_prefix)?,
            user_prefix: normalize_prefix(user_prefix)?,
        })
    }

    pub fn token_prefix(&self) -> &str {
        &self.token_prefix
    }

    pub fn user_prefix(&self) -> &str {
        &self.user_prefix
    }

    pub fn token_key(&self, token: &str) -> String {
        format!("{}{DELIMITER}{token}", self.token_prefix)
    }

    pub fn user_key(&self, user_id: &str) -> String {
        format!("{}{DELIMITER}{user_id}", self.user_prefix)
    }

    pub fn user_index_key(&self, user_id: &str) -> String {
        format!("{}{DELIMITER}{user_id}", self.token_prefix)
    }
}

fn normalize_prefix(prefix: &str) -> Result<String> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(RSessionError::invalid("key prefix is empty"));
    }
    Ok(prefix.replace(DELIMITER, "-"))
}
