use std::future::Future;

use crate::error::DirectoryError;
use crate::models::UserRecord;

/// External user directory keyed by broadcast token.
pub trait Directory: Send + Sync + 'static {
    /// Exact, case-sensitive token lookup.
    fn find_by_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>, DirectoryError>> + Send;

    /// Every known user. Only used for the case-insensitive fallback.
    fn list_all(&self) -> impl Future<Output = Result<Vec<UserRecord>, DirectoryError>> + Send;
}
