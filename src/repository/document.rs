use crate::error::{WatchError, WatchResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::ffi::OsString;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// A JSON document replaced as a whole on every write.
///
/// Writes go to `<path>.tmp` and are renamed over the target, so a reader never
/// observes a half-written file. There is no locking: one writer process is assumed.
#[derive(Debug)]
pub struct JsonDocument<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonDocument<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the document, falling back to `T::default()` when the file does not exist.
    pub async fn load(&self) -> WatchResult<T> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(WatchError::store(&self.path, e)),
        };

        if raw.trim().is_empty() {
            return Ok(T::default());
        }

        serde_json::from_str(&raw).map_err(|e| WatchError::store(&self.path, e))
    }

    pub async fn save(&self, value: &T) -> WatchResult<()> {
        let json =
            serde_json::to_string_pretty(value).map_err(|e| WatchError::store(&self.path, e))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| WatchError::store(parent, e))?;
            }
        }

        let tmp = self.tmp_path();
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| WatchError::store(&tmp, e))?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| WatchError::store(&tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| WatchError::store(&tmp, e))?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| WatchError::store(&self.path, e))?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp: OsString = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::WatchlistDocument;

    #[tokio::test]
    async fn test_load_missing_returns_default() {
        let temp_dir = tempfile::tempdir().unwrap();
        let doc: JsonDocument<WatchlistDocument> =
            JsonDocument::new(temp_dir.path().join("missing.json"));

        assert_eq!(doc.load().await.unwrap(), WatchlistDocument::default());
    }

    #[tokio::test]
    async fn test_save_replaces_and_leaves_no_tmp() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("watchlist.json");
        let doc: JsonDocument<WatchlistDocument> = JsonDocument::new(&path);

        doc.save(&WatchlistDocument {
            addresses: vec!["0x01".to_string()],
        })
        .await
        .unwrap();
        doc.save(&WatchlistDocument {
            addresses: vec!["0x02".to_string()],
        })
        .await
        .unwrap();

        let loaded = doc.load().await.unwrap();
        assert_eq!(loaded.addresses, vec!["0x02".to_string()]);
        assert!(!temp_dir.path().join("watchlist.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_save_creates_parent_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("state.json");
        let doc: JsonDocument<WatchlistDocument> = JsonDocument::new(&path);

        doc.save(&WatchlistDocument::default()).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_store_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("broken.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let doc: JsonDocument<WatchlistDocument> = JsonDocument::new(&path);
        assert!(matches!(doc.load().await, Err(WatchError::Store { .. })));
    }
}
