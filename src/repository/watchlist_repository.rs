use super::document::JsonDocument;
use super::models::{WatchAddress, WatchlistDocument, normalize_address};
use crate::error::WatchResult;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Durable set of watched addresses.
///
/// Every call goes back to disk; nothing is cached between calls so edits made by
/// `monitorctl` reach the running scanner within one poll cycle.
#[derive(Debug, Clone)]
pub struct WatchlistRepository {
    document: JsonDocument<WatchlistDocument>,
}

impl WatchlistRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            document: JsonDocument::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.document.path()
    }

    /// Normalized addresses in insertion order, duplicates removed.
    pub async fn list(&self) -> WatchResult<Vec<String>> {
        let document = self.document.load().await?;
        Ok(dedup_normalized(&document.addresses))
    }

    pub async fn watched_set(&self) -> WatchResult<HashSet<String>> {
        let document = self.document.load().await?;
        Ok(document
            .addresses
            .iter()
            .map(|a| normalize_address(a))
            .collect())
    }

    /// Validates and appends `address` unless it is already present.
    pub async fn add(&self, address: &str) -> WatchResult<Vec<String>> {
        let address = WatchAddress::parse(address)?;
        let mut addresses = self.list().await?;

        if !addresses.iter().any(|a| a == address.as_str()) {
            addresses.push(address.to_string());
            self.store(&addresses).await?;
            info!("Added {} to watchlist", address);
        }

        Ok(addresses)
    }

    pub async fn remove(&self, address: &str) -> WatchResult<Vec<String>> {
        let address = normalize_address(address);
        let mut addresses = self.list().await?;
        let before = addresses.len();

        addresses.retain(|a| *a != address);
        if addresses.len() != before {
            self.store(&addresses).await?;
            info!("Removed {} from watchlist", address);
        }

        Ok(addresses)
    }

    async fn store(&self, addresses: &[String]) -> WatchResult<()> {
        self.document
            .save(&WatchlistDocument {
                addresses: addresses.to_vec(),
            })
            .await
    }
}

fn dedup_normalized(raw: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .map(|a| normalize_address(a))
        .filter(|a| seen.insert(a.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WatchError;

    const ALICE: &str = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
    const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn repo(dir: &tempfile::TempDir) -> WatchlistRepository {
        WatchlistRepository::new(dir.path().join("watchlist.json"))
    }

    #[tokio::test]
    async fn test_add_normalizes_and_persists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);

        let addresses = repo.add(ALICE).await.unwrap();
        assert_eq!(addresses, vec![ALICE.to_lowercase()]);

        let reopened = WatchlistRepository::new(repo.path());
        assert_eq!(reopened.list().await.unwrap(), vec![ALICE.to_lowercase()]);
    }

    #[tokio::test]
    async fn test_add_existing_is_noop() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);

        repo.add(ALICE).await.unwrap();
        repo.add(BOB).await.unwrap();
        let again = repo.add(&ALICE.to_lowercase()).await.unwrap();

        assert_eq!(again, vec![ALICE.to_lowercase(), BOB.to_string()]);
        assert_eq!(repo.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_address() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);

        assert!(matches!(
            repo.add("0x1234").await,
            Err(WatchError::InvalidAddress(_))
        ));
        assert!(!repo.path().exists());
    }

    #[tokio::test]
    async fn test_remove_filters_normalized_match() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);

        repo.add(ALICE).await.unwrap();
        repo.add(BOB).await.unwrap();

        let remaining = repo.remove(&ALICE.to_lowercase()).await.unwrap();
        assert_eq!(remaining, vec![BOB.to_string()]);

        let unchanged = repo.remove(ALICE).await.unwrap();
        assert_eq!(unchanged, vec![BOB.to_string()]);
    }

    #[tokio::test]
    async fn test_hand_edited_file_is_normalized_on_read() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = repo(&temp_dir);
        tokio::fs::write(
            repo.path(),
            format!(r#"{{"addresses": ["{ALICE}", "{}", "{BOB}"]}}"#, ALICE.to_lowercase()),
        )
        .await
        .unwrap();

        assert_eq!(
            repo.list().await.unwrap(),
            vec![ALICE.to_lowercase(), BOB.to_string()]
        );
        assert_eq!(repo.watched_set().await.unwrap().len(), 2);
    }
}
