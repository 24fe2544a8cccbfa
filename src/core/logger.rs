//! File capture sink
//!
//! Appends the text and binary captures to their own files. Text captures
//! are written as the terminal produced them; binary captures are the raw
//! received byte stream.

use crate::core::capture::{CaptureError, CaptureKind, LogSink};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends between forced flushes
const FLUSH_EVERY: usize = 100;

struct CaptureFile {
    writer: BufWriter<File>,
    path: PathBuf,
    bytes: u64,
    appends: usize,
}

impl CaptureFile {
    fn open(path: PathBuf) -> Result<Self, CaptureError> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            bytes: 0,
            appends: 0,
        })
    }
}

/// Capture sink backed by log files
#[derive(Default)]
pub struct FileCapture {
    text: Option<CaptureFile>,
    binary: Option<CaptureFile>,
    errors: usize,
}

impl FileCapture {
    /// Sink with no files open
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, kind: CaptureKind) -> &mut Option<CaptureFile> {
        match kind {
            CaptureKind::Text => &mut self.text,
            CaptureKind::Binary => &mut self.binary,
        }
    }

    /// Start appending `kind` captures to `path`
    pub fn start(&mut self, kind: CaptureKind, path: impl Into<PathBuf>) -> Result<(), CaptureError> {
        let path = path.into();
        let file = CaptureFile::open(path.clone())?;
        self.stop(kind);
        tracing::info!(%kind, path = %path.display(), "capture file opened");
        *self.slot(kind) = Some(file);
        Ok(())
    }

    /// Stop capturing `kind`, flushing what was written
    pub fn stop(&mut self, kind: CaptureKind) {
        if let Some(mut file) = self.slot(kind).take() {
            if let Err(e) = file.writer.flush() {
                tracing::warn!(%kind, "Failed to flush capture file: {}", e);
            }
        }
    }

    /// Whether `kind` is being written
    pub fn is_logging(&self, kind: CaptureKind) -> bool {
        match kind {
            CaptureKind::Text => self.text.is_some(),
            CaptureKind::Binary => self.binary.is_some(),
        }
    }

    /// Path of the `kind` file
    pub fn path(&self, kind: CaptureKind) -> Option<&Path> {
        let file = match kind {
            CaptureKind::Text => self.text.as_ref(),
            CaptureKind::Binary => self.binary.as_ref(),
        };
        file.map(|f| f.path.as_path())
    }

    /// Bytes written for `kind`
    pub fn bytes_logged(&self, kind: CaptureKind) -> u64 {
        let file = match kind {
            CaptureKind::Text => self.text.as_ref(),
            CaptureKind::Binary => self.binary.as_ref(),
        };
        file.map_or(0, |f| f.bytes)
    }

    /// Failed appends so far
    pub fn errors(&self) -> usize {
        self.errors
    }

    /// Flush both files to disk
    pub fn flush(&mut self) -> Result<(), CaptureError> {
        for file in [self.text.as_mut(), self.binary.as_mut()].into_iter().flatten() {
            file.writer.flush()?;
        }
        Ok(())
    }
}

impl LogSink for FileCapture {
    fn append(&mut self, kind: CaptureKind, bytes: &[u8]) -> Result<usize, CaptureError> {
        let Some(file) = self.slot(kind).as_mut() else {
            return Err(CaptureError::NotOpen(kind));
        };
        file.writer.write_all(bytes)?;
        file.bytes += bytes.len() as u64;
        file.appends += 1;

        if file.appends % FLUSH_EVERY == 0 {
            file.writer.flush()?;
        }
        Ok(bytes.len())
    }

    fn on_error(&mut self, kind: CaptureKind, error: &CaptureError) {
        self.errors += 1;
        if matches!(error, CaptureError::NotOpen(_)) {
            return;
        }
        if let Some(file) = self.slot(kind).as_ref() {
            tracing::error!(%kind, path = %file.path.display(), "capture file failing: {}", error);
        }
    }
}

impl Drop for FileCapture {
    fn drop(&mut self) {
        for kind in CaptureKind::ALL {
            self.stop(kind);
        }
    }
}

/// Generate a capture filename with timestamp
pub fn generate_log_filename(prefix: &str, kind: CaptureKind) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let extension = match kind {
        CaptureKind::Text => "log",
        CaptureKind::Binary => "bin",
    };
    format!("{}_{}.{}", prefix, timestamp, extension)
}
