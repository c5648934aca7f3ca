use crate::config::LogWatchConfig;
use crate::notifier::{Notifier, send_best_effort};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

const RESTART_DELAY: Duration = Duration::from_secs(3);

/// One followed file and the label its alerts carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTarget {
    pub path: PathBuf,
    pub label: String,
}

impl LogTarget {
    pub fn new(path: impl Into<PathBuf>, label: &str) -> Self {
        LogTarget {
            path: path.into(),
            label: label.to_string(),
        }
    }

    /// The stdout/stderr pair of the process-manager convention, filtered by the toggles.
    pub fn from_config(config: &LogWatchConfig) -> Vec<LogTarget> {
        let mut targets = Vec::new();
        if config.watch_out {
            targets.push(LogTarget::new(config.out_log_path(), "OUT"));
        }
        if config.watch_err {
            targets.push(LogTarget::new(config.err_log_path(), "ERR"));
        }
        targets
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TailPoll {
    /// Complete lines appended since the previous poll, trimmed
    Lines(Vec<String>),
    /// The file is gone; the cursor is no longer usable
    Vanished,
}

// (device, inode) of a file; `None` where the platform has no such notion
type FileIdentity = Option<(u64, u64)>;

#[cfg(unix)]
fn file_identity(metadata: &std::fs::Metadata) -> FileIdentity {
    use std::os::unix::fs::MetadataExt;
    Some((metadata.dev(), metadata.ino()))
}

#[cfg(not(unix))]
fn file_identity(_metadata: &std::fs::Metadata) -> FileIdentity {
    None
}

/// Read handle anchored at end-of-file when opened.
///
/// Nothing is persisted: reopening after a restart anchors at the then-current end,
/// so lines written in between are never seen.
pub struct TailCursor {
    path: PathBuf,
    reader: BufReader<File>,
    identity: FileIdentity,
    position: u64,
    /// Last byte consumed, re-checked on every poll to notice in-place rewrites
    last_byte: Option<u8>,
    pending: Vec<u8>,
}

impl TailCursor {
    pub async fn open_at_end(path: &Path) -> std::io::Result<Self> {
        let mut cursor = Self::open(path).await?;
        cursor.position = cursor.reader.seek(SeekFrom::End(0)).await?;
        if cursor.position > 0 {
            cursor.last_byte = cursor.byte_before_position().await?;
        }
        Ok(cursor)
    }

    async fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path).await?;
        let identity = file_identity(&file.metadata().await?);

        Ok(TailCursor {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            identity,
            position: 0,
            last_byte: None,
            pending: Vec::new(),
        })
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reads whatever has been appended. A trailing partial line is held back until
    /// its newline arrives.
    ///
    /// A different file at the path (rename rotation) is read from its start once
    /// the old handle is drained. The same file shorter than the cursor, or rewritten
    /// under it, was truncated and is re-read from the start.
    pub async fn poll(&mut self) -> std::io::Result<TailPoll> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(TailPoll::Vanished),
            Err(e) => return Err(e),
        };

        let mut lines = Vec::new();

        if file_identity(&metadata) != self.identity {
            self.read_available(&mut lines).await?;
            // The old file is finished, so its unterminated tail is a line too
            let tail = String::from_utf8_lossy(&self.pending).trim().to_string();
            if !tail.is_empty() {
                lines.push(tail);
            }
            self.pending.clear();

            let reopened = Self::open(&self.path).await;
            match reopened {
                Ok(reopened) => {
                    info!("{} rotated, following the new file", self.path.display());
                    *self = reopened;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Ok(TailPoll::Lines(lines));
                }
                Err(e) => return Err(e),
            }
        } else if metadata.len() < self.position || self.rewritten_in_place().await? {
            info!(
                "{} truncated ({} bytes, cursor at {}), reading from start",
                self.path.display(),
                metadata.len(),
                self.position
            );
            self.position = self.reader.seek(SeekFrom::Start(0)).await?;
            self.last_byte = None;
            self.pending.clear();
        }

        self.read_available(&mut lines).await?;
        Ok(TailPoll::Lines(lines))
    }

    async fn read_available(&mut self, lines: &mut Vec<String>) -> std::io::Result<()> {
        loop {
            let read = self.reader.read_until(b'\n', &mut self.pending).await?;
            if read == 0 {
                return Ok(());
            }
            self.position += read as u64;
            self.last_byte = self.pending.last().copied();

            if self.pending.last() == Some(&b'\n') {
                lines.push(String::from_utf8_lossy(&self.pending).trim().to_string());
                self.pending.clear();
            }
        }
    }

    // Copy-truncate rotation can refill the file past the cursor between two polls;
    // the byte just before the cursor then no longer matches what was consumed.
    async fn rewritten_in_place(&mut self) -> std::io::Result<bool> {
        let Some(expected) = self.last_byte else {
            return Ok(false);
        };
        Ok(self.byte_before_position().await? != Some(expected))
    }

    // Leaves the reader at `position`.
    async fn byte_before_position(&mut self) -> std::io::Result<Option<u8>> {
        self.reader
            .seek(SeekFrom::Start(self.position.saturating_sub(1)))
            .await?;
        let mut byte = [0u8; 1];
        let read = self.reader.read(&mut byte).await?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(byte[0]))
    }
}

/// Follows log files and alerts on keyword hits.
pub struct LogWatcher<N: ?Sized> {
    notifier: Arc<N>,
    keywords: Vec<String>,
    poll_interval: Duration,
    wait_interval: Duration,
}

impl<N> LogWatcher<N>
where
    N: Notifier + ?Sized + 'static,
{
    pub fn new(
        notifier: Arc<N>,
        keywords: Vec<String>,
        poll_interval: Duration,
        wait_interval: Duration,
    ) -> Self {
        LogWatcher {
            notifier,
            keywords,
            poll_interval,
            wait_interval,
        }
    }

    pub fn from_config(notifier: Arc<N>, config: &LogWatchConfig) -> Self {
        Self::new(
            notifier,
            config.keywords.clone(),
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_secs(config.wait_interval_sec),
        )
    }

    /// Case-sensitive substring match against any keyword.
    pub fn matches(&self, line: &str) -> bool {
        self.keywords.iter().any(|k| line.contains(k.as_str()))
    }

    /// Sends an alert for `line` if it matches. Returns whether it matched.
    pub async fn handle_line(&self, label: &str, line: &str) -> bool {
        if !self.matches(line) {
            return false;
        }
        send_best_effort(
            self.notifier.as_ref(),
            &format!("🧾 {label} log hit:\n{}", line.trim()),
        )
        .await;
        true
    }

    /// One task per target; a missing or failing file never holds up the others.
    pub fn spawn_all(self: Arc<Self>, targets: Vec<LogTarget>) -> Vec<JoinHandle<()>> {
        targets
            .into_iter()
            .map(|target| {
                let watcher = Arc::clone(&self);
                tokio::spawn(async move { watcher.tail(&target).await })
            })
            .collect()
    }

    /// Follows `target` forever, re-waiting for the file whenever it disappears.
    pub async fn tail(&self, target: &LogTarget) {
        loop {
            match self.follow(target).await {
                Ok(()) => {
                    info!(
                        "{} log {} disappeared, waiting for it to return",
                        target.label,
                        target.path.display()
                    );
                }
                Err(e) => {
                    warn!(
                        "Tailing {} log {} failed: {}, restarting",
                        target.label,
                        target.path.display(),
                        e
                    );
                    sleep(RESTART_DELAY).await;
                }
            }
        }
    }

    async fn wait_for_file(&self, path: &Path) {
        while !tokio::fs::try_exists(path).await.unwrap_or(false) {
            sleep(self.wait_interval).await;
        }
    }

    /// Returns `Ok` once the file vanishes.
    async fn follow(&self, target: &LogTarget) -> std::io::Result<()> {
        self.wait_for_file(&target.path).await;

        let mut cursor = TailCursor::open_at_end(&target.path).await?;
        info!(
            "Tailing {} log {} from offset {}",
            target.label,
            target.path.display(),
            cursor.position()
        );

        loop {
            match cursor.poll().await? {
                TailPoll::Vanished => return Ok(()),
                TailPoll::Lines(lines) if lines.is_empty() => sleep(self.poll_interval).await,
                TailPoll::Lines(lines) => {
                    for line in &lines {
                        self.handle_line(&target.label, line).await;
                    }
                }
            }
        }
    }
}
