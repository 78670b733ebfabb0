// Append-only JSON-lines log of accepted moves, plus the offset-tracking reader
// used by the replay consumer.

use crate::domain::AcceptedMove;
use crate::domain::errors::PublishError;
use crate::domain::ports::MovePublisher;
use crate::use_cases::replay::CharacterAction;
use async_trait::async_trait;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

/// Long-lived publisher; the file handle is opened once and shared.
pub struct MoveLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl MoveLog {
    pub async fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MovePublisher for MoveLog {
    async fn publish(&self, event: &AcceptedMove) -> Result<(), PublishError> {
        let mut line =
            serde_json::to_string(&CharacterAction::from(event)).map_err(PublishError::Encode)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .map_err(PublishError::Io)?;
        file.flush().await.map_err(PublishError::Io)
    }
}

/// A complete log line and the byte offset just past it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub line: String,
    pub end_offset: u64,
}

pub struct MoveLogReader {
    path: PathBuf,
    offset_path: PathBuf,
}

impl MoveLogReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut offset_path = path.clone().into_os_string();
        offset_path.push(".offset");
        Self {
            path,
            offset_path: PathBuf::from(offset_path),
        }
    }

    /// Last committed offset; zero (earliest) when nothing was committed.
    pub async fn load_offset(&self) -> std::io::Result<u64> {
        match fs::read_to_string(&self.offset_path).await {
            Ok(text) => text.trim().parse::<u64>().map_err(|e| {
                std::io::Error::new(ErrorKind::InvalidData, format!("bad offset file: {e}"))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }

    pub async fn commit_offset(&self, offset: u64) -> std::io::Result<()> {
        fs::write(&self.offset_path, offset.to_string()).await
    }

    /// Reads every complete line after `offset`. A trailing partial line is
    /// left for the next read.
    pub async fn read_from(&self, offset: u64) -> std::io::Result<Vec<LogEntry>> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        file.seek(SeekFrom::Start(offset)).await?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).await?;

        let mut entries = Vec::new();
        let mut start = 0usize;
        while let Some(len) = bytes[start..].iter().position(|b| *b == b'\n') {
            let end = start + len;
            let line = String::from_utf8_lossy(&bytes[start..end]).trim().to_string();
            start = end + 1;
            if !line.is_empty() {
                entries.push(LogEntry {
                    line,
                    end_offset: offset + start as u64,
                });
            }
        }
        Ok(entries)
    }
}
