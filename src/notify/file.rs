use super::channel::NotificationChannel;
use super::event::NotificationEvent;
use crate::config::FileSinkConfig;
use crate::error::ChannelError;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

struct FileState {
    file: Option<File>,
    failed_at: Option<Instant>,
}

/// Appends one JSON object per line to a file.
///
/// The handle is opened lazily and reused. After a failure the channel
/// stays degraded and refuses events until `retry_after` has passed, then
/// reopens the file on the next event.
pub struct FileChannel {
    path: PathBuf,
    retry_after: Duration,
    state: Mutex<FileState>,
}

impl FileChannel {
    pub fn new<P: AsRef<Path>>(path: P, retry_after: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            retry_after,
            state: Mutex::new(FileState {
                file: None,
                failed_at: None,
            }),
        }
    }

    pub fn from_config(config: &FileSinkConfig) -> Self {
        Self::new(&config.path, Duration::from_secs(config.retry_seconds))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> ChannelError {
        ChannelError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    async fn open(&self) -> Result<File, ChannelError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        debug!("Opened notification file {}", self.path.display());
        Ok(file)
    }
}

#[async_trait::async_trait]
impl NotificationChannel for FileChannel {
    fn name(&self) -> &str {
        "file"
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), ChannelError> {
        let mut line = event.to_json()?;
        line.push('\n');

        let mut state = self.state.lock().await;

        if let Some(failed_at) = state.failed_at {
            let elapsed = failed_at.elapsed();
            if elapsed < self.retry_after {
                return Err(ChannelError::Degraded {
                    retry_in: self.retry_after - elapsed,
                });
            }
        }

        if state.file.is_none() {
            match self.open().await {
                Ok(file) => state.file = Some(file),
                Err(e) => {
                    state.failed_at = Some(Instant::now());
                    return Err(e);
                }
            }
        }

        let written = match state.file.as_mut() {
            Some(file) => match file.write_all(line.as_bytes()).await {
                Ok(()) => file.flush().await,
                Err(e) => Err(e),
            },
            None => return Err(ChannelError::Closed),
        };

        match written {
            Ok(()) => {
                if state.failed_at.take().is_some() {
                    info!("Notification file {} writable again", self.path.display());
                }
                Ok(())
            }
            Err(e) => {
                state.file = None;
                state.failed_at = Some(Instant::now());
                Err(self.io_error(e))
            }
        }
    }
}
