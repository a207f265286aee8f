//! Session recording sinks.
//!
//! A recording receives the raw PTY byte stream, in order, plus the session
//! geometry. Encoding into a replay format is left to the sink; the built-in
//! [`RawRecorder`] writes the bytes unchanged.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Where a finished recording ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    pub path: Option<PathBuf>,
    pub bytes: u64,
}

/// Consumer of a session's output stream.
pub trait RecordingSink: Send {
    /// Called once before any data with the current geometry.
    fn start(&mut self, cols: u16, rows: u16) -> io::Result<()>;

    /// Raw output bytes.
    fn data(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// The terminal was resized.
    fn resize(&mut self, _cols: u16, _rows: u16) -> io::Result<()> {
        Ok(())
    }

    /// Flush and close. Called exactly once.
    fn finish(&mut self) -> io::Result<RecordingSummary>;

    /// Current progress.
    fn summary(&self) -> RecordingSummary;
}

/// Writes the raw byte stream to a file.
pub struct RawRecorder {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    bytes: u64,
}

impl RawRecorder {
    /// Create the file, and its parent directories, at `path`.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            bytes: 0,
        })
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "recording already finished"))
    }
}

impl RecordingSink for RawRecorder {
    fn start(&mut self, cols: u16, rows: u16) -> io::Result<()> {
        tracing::debug!(path = %self.path.display(), cols, rows, "Recording started");
        Ok(())
    }

    fn data(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer()?.write_all(bytes)?;
        self.bytes += bytes.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<RecordingSummary> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(self.summary())
    }

    fn summary(&self) -> RecordingSummary {
        RecordingSummary {
            path: Some(self.path.clone()),
            bytes: self.bytes,
        }
    }
}

/// File name for a recording started without an explicit path.
pub fn default_recording_path(dir: &Path, session_id: &str) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let short_id = session_id.get(..8).unwrap_or(session_id);
    dir.join(format!("session-{short_id}-{millis}.raw"))
}
