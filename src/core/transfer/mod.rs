//! Outbound transfer sub-sessions
//!
//! A transfer streams clipboard text or a file to the peer, one unit per
//! idle cycle, through the session's outbound queue. At most one transfer
//! is active at a time.

mod clipboard;
mod file;

pub use clipboard::ClipboardTalker;
pub use file::FileTalker;

use crate::core::session::SessionState;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Which transfer is running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransferStatus {
    /// No transfer
    #[default]
    None,
    /// Sending clipboard text
    Clipboard,
    /// Sending a file
    File,
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Clipboard => write!(f, "clipboard"),
            Self::File => write!(f, "file"),
        }
    }
}

/// Result of one talker unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TalkProgress {
    /// More to send
    Continue,
    /// Everything has been queued
    Done,
}

/// Transfer errors
#[derive(Error, Debug)]
pub enum TransferError {
    /// Reading the source failed
    #[error("Transfer I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another transfer is already running
    #[error("A {0} transfer is already running")]
    Busy(TransferStatus),
}

/// Transfer progress info
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferProgress {
    /// Source name (file name, or "clipboard")
    pub name: String,
    /// Total bytes, when known
    pub total: Option<u64>,
    /// Bytes queued for sending so far
    pub transferred: u64,
}

impl TransferProgress {
    /// Get percentage complete
    pub fn percent(&self) -> f32 {
        match self.total {
            Some(0) | None => 0.0,
            Some(total) => (self.transferred as f32 / total as f32) * 100.0,
        }
    }
}

/// Source of an outbound stream
#[cfg_attr(test, mockall::automock)]
pub trait Talker {
    /// Queue at most one unit into the session's outbound buffer
    fn send_unit(&mut self, session: &mut SessionState) -> Result<TalkProgress, TransferError>;

    /// Progress so far
    fn progress(&self) -> TransferProgress;
}

/// Append `data` to the outbound queue, doubling IAC on Telnet sessions
pub(crate) fn queue_unit(session: &mut SessionState, data: &[u8]) {
    if session.telnet {
        session.queue_outbound_escaped(data);
    } else {
        session.queue_outbound(data);
    }
}

/// Drives the active transfer, one unit per cycle
pub struct TransferDriver {
    status: TransferStatus,
    talker: Option<Box<dyn Talker>>,
    unit_size: usize,
}

impl Default for TransferDriver {
    fn default() -> Self {
        Self::new(256)
    }
}

impl TransferDriver {
    /// Driver whose talkers send `unit_size` bytes per unit
    pub fn new(unit_size: usize) -> Self {
        Self {
            status: TransferStatus::None,
            talker: None,
            unit_size: unit_size.max(1),
        }
    }

    /// Current status
    pub fn status(&self) -> TransferStatus {
        self.status
    }

    /// Whether a transfer is running
    pub fn is_active(&self) -> bool {
        self.status != TransferStatus::None
    }

    /// Progress of the running transfer
    pub fn progress(&self) -> Option<TransferProgress> {
        self.talker.as_ref().map(|talker| talker.progress())
    }

    /// Start sending clipboard text
    pub fn start_clipboard(&mut self, text: &str) -> Result<(), TransferError> {
        let talker = ClipboardTalker::new(text, self.unit_size);
        self.start(TransferStatus::Clipboard, Box::new(talker))
    }

    /// Start sending the file at `path`
    pub fn start_file(&mut self, path: impl AsRef<Path>) -> Result<(), TransferError> {
        self.ensure_idle()?;
        let talker = FileTalker::open(path, self.unit_size)?;
        self.start(TransferStatus::File, Box::new(talker))
    }

    /// Start a transfer with a custom talker
    pub fn start(
        &mut self,
        status: TransferStatus,
        talker: Box<dyn Talker>,
    ) -> Result<(), TransferError> {
        self.ensure_idle()?;
        if status == TransferStatus::None {
            return Ok(());
        }
        tracing::info!(%status, name = %talker.progress().name, "transfer started");
        self.status = status;
        self.talker = Some(talker);
        Ok(())
    }

    /// Stop the running transfer. Returns whether one was running.
    pub fn cancel(&mut self) -> bool {
        let was_active = self.is_active();
        if was_active {
            tracing::info!(status = %self.status, "transfer cancelled");
        }
        self.finish();
        was_active
    }

    /// Advance the running transfer by one unit
    pub fn advance(&mut self, session: &mut SessionState) {
        let Some(talker) = self.talker.as_mut() else {
            self.status = TransferStatus::None;
            return;
        };

        match talker.send_unit(session) {
            Ok(TalkProgress::Continue) => {}
            Ok(TalkProgress::Done) => {
                let progress = talker.progress();
                tracing::info!(
                    status = %self.status,
                    bytes = progress.transferred,
                    "transfer complete"
                );
                self.finish();
            }
            Err(e) => {
                tracing::warn!(status = %self.status, "Transfer aborted: {}", e);
                self.finish();
            }
        }
    }

    fn ensure_idle(&self) -> Result<(), TransferError> {
        if self.is_active() {
            return Err(TransferError::Busy(self.status));
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.status = TransferStatus::None;
        self.talker = None;
    }
}
