use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use crate::error::ResolveError;
use crate::models::{Sighting, UserRecord};

use super::config::IdentityConfig;
use super::directory::Directory;

/// Canonical form of an advertised token: trimmed, with the directory suffix.
/// Returns `None` for blank input.
pub fn normalize_token(raw: &str, suffix: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if suffix.is_empty() || trimmed.to_lowercase().ends_with(&suffix.to_lowercase()) {
        Some(trimmed.to_string())
    } else {
        Some(format!("{trimmed}{suffix}"))
    }
}

/// Turns a sighting's advertised token into a directory user.
///
/// Hits are cached per device id until [`clear_cache`](Self::clear_cache).
/// Misses are never cached: the next fresh sighting asks again.
pub struct IdentityResolver<D: Directory> {
    directory: Arc<D>,
    config: IdentityConfig,
    cache: Mutex<HashMap<String, UserRecord>>,
}

impl<D: Directory> IdentityResolver<D> {
    pub fn new(directory: Arc<D>, config: IdentityConfig) -> Self {
        Self {
            directory,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    pub fn normalize(&self, raw: &str) -> Option<String> {
        normalize_token(raw, &self.config.token_suffix)
    }

    pub async fn resolve(&self, sighting: &Sighting) -> Result<UserRecord, ResolveError> {
        if let Some(hit) = self.cache().get(&sighting.device_id).cloned() {
            return Ok(hit);
        }

        let token = self
            .normalize(&sighting.advertised_name)
            .ok_or_else(|| ResolveError::NotFound {
                token: sighting.advertised_name.clone(),
            })?;

        let record = match self.directory.find_by_token(&token).await? {
            Some(record) => record,
            None => {
                debug!("no exact match for '{token}', scanning directory case-insensitively");
                self.find_case_insensitive(&token)
                    .await?
                    .ok_or(ResolveError::NotFound { token })?
            }
        };

        self.cache()
            .insert(sighting.device_id.clone(), record.clone());
        Ok(record)
    }

    pub fn cached(&self, device_id: &str) -> Option<UserRecord> {
        self.cache().get(device_id).cloned()
    }

    pub fn clear_cache(&self) {
        self.cache().clear();
    }

    async fn find_case_insensitive(&self, token: &str) -> Result<Option<UserRecord>, ResolveError> {
        let wanted = token.to_lowercase();
        let candidates = self.directory.list_all().await?;
        Ok(candidates
            .into_iter()
            .find(|record| record.token.to_lowercase() == wanted))
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, UserRecord>> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DirectoryError;
    use crate::models::UserId;
    use crate::sim::MemoryDirectory;

    fn record(id: &str, token: &str) -> UserRecord {
        UserRecord {
            user_id: UserId::new(id),
            token: token.to_string(),
            display_name: id.to_uppercase(),
            photo_ref: None,
            is_verified: false,
        }
    }

    fn resolver(directory: &Arc<MemoryDirectory>, suffix: &str) -> IdentityResolver<MemoryDirectory> {
        IdentityResolver::new(
            Arc::clone(directory),
            IdentityConfig {
                token_suffix: suffix.to_string(),
                ..IdentityConfig::default()
            },
        )
    }

    #[test]
    fn normalization_trims_and_appends_suffix_once() {
        assert_eq!(normalize_token("  alice ", "@app").as_deref(), Some("alice@app"));
        assert_eq!(normalize_token("alice@APP", "@app").as_deref(), Some("alice@APP"));
        assert_eq!(normalize_token("alice", "").as_deref(), Some("alice"));
        assert_eq!(normalize_token("   ", "@app"), None);
    }

    #[tokio::test]
    async fn exact_match_skips_the_full_scan() {
        let directory = Arc::new(MemoryDirectory::new(vec![record("u1", "alice@app")]));
        let r = resolver(&directory, "@app");
        let found = r.resolve(&Sighting::new("A", "alice", -40)).await.unwrap();
        assert_eq!(found.user_id, UserId::new("u1"));
        assert_eq!(directory.list_calls(), 0);
    }

    #[tokio::test]
    async fn case_mismatch_resolves_through_fallback() {
        let directory = Arc::new(MemoryDirectory::new(vec![
            record("u0", "bob@app"),
            record("u1", "alice@app"),
        ]));
        let r = resolver(&directory, "");
        let found = r.resolve(&Sighting::new("A", "Alice@app", -40)).await.unwrap();
        assert_eq!(found.user_id, UserId::new("u1"));
        assert_eq!(directory.exact_calls(), 1);
        assert_eq!(directory.list_calls(), 1);
    }

    #[tokio::test]
    async fn unknown_token_is_not_found_and_not_cached() {
        let directory = Arc::new(MemoryDirectory::new(vec![record("u1", "alice@app")]));
        let r = resolver(&directory, "@app");
        let sighting = Sighting::new("B", "bob", -70);
        assert_eq!(
            r.resolve(&sighting).await,
            Err(ResolveError::NotFound {
                token: "bob@app".into()
            })
        );
        assert!(r.cached("B").is_none());

        directory.insert(record("u2", "bob@app"));
        assert_eq!(r.resolve(&sighting).await.unwrap().user_id, UserId::new("u2"));
    }

    #[tokio::test]
    async fn blank_token_never_reaches_the_directory() {
        let directory = Arc::new(MemoryDirectory::new(vec![]));
        let r = resolver(&directory, "@app");
        assert!(matches!(
            r.resolve(&Sighting::new("C", "  ", -50)).await,
            Err(ResolveError::NotFound { .. })
        ));
        assert_eq!(directory.exact_calls(), 0);
    }

    #[tokio::test]
    async fn hits_are_cached_per_device_until_cleared() {
        let directory = Arc::new(MemoryDirectory::new(vec![record("u1", "alice@app")]));
        let r = resolver(&directory, "@app");
        let sighting = Sighting::new("A", "alice", -40);
        r.resolve(&sighting).await.unwrap();
        r.resolve(&sighting).await.unwrap();
        assert_eq!(directory.exact_calls(), 1);

        r.clear_cache();
        r.resolve(&sighting).await.unwrap();
        assert_eq!(directory.exact_calls(), 2);
    }

    #[tokio::test]
    async fn directory_outage_is_reported_as_unavailable() {
        let directory = Arc::new(MemoryDirectory::new(vec![record("u1", "alice@app")]));
        directory.set_available(false);
        let r = resolver(&directory, "@app");
        let sighting = Sighting::new("A", "alice", -40);
        assert_eq!(
            r.resolve(&sighting).await,
            Err(ResolveError::DirectoryUnavailable(DirectoryError(
                "directory offline".into()
            )))
        );

        directory.set_available(true);
        assert!(r.resolve(&sighting).await.is_ok());
    }
}
