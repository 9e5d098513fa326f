//! Models shared across the crate: errors, the cached user, and parsed tokens.

mod rsession_error;
mod rtoken;
mod ruser;

pub use rsession_error::{LoaderError, RSessionError, Result};
pub use rtoken::{DELIMITER, RToken, validate_user_id};
pub use ruser::{RUser, TokenLease};
