use super::document::JsonDocument;
use super::models::WatchStateDocument;
use crate::error::WatchResult;
use std::path::{Path, PathBuf};

/// Durable cursor: the last block whose transactions were fully evaluated.
#[derive(Debug, Clone)]
pub struct WatchStateRepository {
    document: JsonDocument<WatchStateDocument>,
}

impl WatchStateRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            document: JsonDocument::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.document.path()
    }

    pub async fn get_last_processed_block(&self) -> WatchResult<Option<u64>> {
        Ok(self.document.load().await?.last_block)
    }

    pub async fn update_last_processed_block(&self, block_number: u64) -> WatchResult<()> {
        self.document
            .save(&WatchStateDocument {
                last_block: Some(block_number),
            })
            .await
    }
}
