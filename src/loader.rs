//! User loading capability.
//!
//! The user cache calls a [`UserLoader`] on a miss. Returning `Ok(None)` means "no
//! extra data": the cache stores a user carrying only its identity.

use async_trait::async_trait;

use crate::models::{LoaderError, RUser};

/// ## 日本語
///
/// ユーザー ID からユーザー情報を読み込みます（DB、リモート呼び出しなど）。
///
/// ## English
///
/// Loads a user by id (database, remote call, ...).
#[async_trait]
pub trait UserLoader: Send + Sync {
    async fn load_user(&self, user_id: &str) -> Result<Option<RUser>, LoaderError>;
}

/// Loader that returns identity-only users.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityLoader;

#[async_trait]
impl UserLoader for IdentityLoader {
    async fn load_user(&self, user_id: &str) -> Result<Option<RUser>, LoaderError> {
        Ok(Some(RUser::new(user_id)))
    }
}

/// Adapts a synchronous closure into a [`UserLoader`].
///
/// ```
/// use r_session::{FnLoader, RUser};
///
/// let loader = FnLoader::new(|id: &str| Ok(Some(RUser::with_detail(id, "x".into()))));
/// # let _ = loader;
/// ```
pub struct FnLoader<F> {
    load: F,
}

impl<F> FnLoader<F>
where
    F: Fn(&str) -> Result<Option<RUser>, LoaderError> + Send + Sync,
{
    pub fn new(load: F) -> Self {
        Self { load }
    }
}

#[async_trait]
impl<F> UserLoader for FnLoader<F>
where
    F: Fn(&str) -> Result<Option<RUser>, LoaderError> + Send + Sync,
{
    async fn load_user(&self, user_id: &str) -> Result<Option<RUser>, LoaderError> {
        (self.load)(user_id)
    }
}
