//! File talker

use super::{queue_unit, TalkProgress, Talker, TransferError, TransferProgress};
use crate::core::session::SessionState;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Streams a file to the peer as-is
pub struct FileTalker {
    reader: BufReader<File>,
    name: String,
    size: u64,
    sent: u64,
    unit: Vec<u8>,
}

impl FileTalker {
    /// Open `path` for sending in `unit_size` byte units
    pub fn open(path: impl AsRef<Path>, unit_size: usize) -> Result<Self, TransferError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            reader: BufReader::new(file),
            name,
            size,
            sent: 0,
            unit: vec![0u8; unit_size.max(1)],
        })
    }
}

impl Talker for FileTalker {
    fn send_unit(&mut self, session: &mut SessionState) -> Result<TalkProgress, TransferError> {
        if session.outbound.len() >= self.unit.len() {
            return Ok(TalkProgress::Continue);
        }

        let n = self.reader.read(&mut self.unit)?;
        if n == 0 {
            return Ok(TalkProgress::Done);
        }
        queue_unit(session, &self.unit[..n]);
        self.sent += n as u64;
        tracing::trace!(sent = self.sent, size = self.size, "file unit queued");

        if self.sent >= self.size {
            Ok(TalkProgress::Done)
        } else {
            Ok(TalkProgress::Continue)
        }
    }

    fn progress(&self) -> TransferProgress {
        TransferProgress {
            name: self.name.clone(),
            total: Some(self.size),
            transferred: self.sent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_streams_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();

        let mut talker = FileTalker::open(file.path(), 4).unwrap();
        let mut session = SessionState::new();
        let mut sent = Vec::new();

        loop {
            let progress = talker.send_unit(&mut session).unwrap();
            sent.extend_from_slice(&session.outbound);
            session.outbound.clear();
            if progress == TalkProgress::Done {
                break;
            }
        }

        assert_eq!(sent, b"0123456789");
        assert_eq!(talker.progress().percent(), 100.0);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileTalker::open(dir.path().join("nope.txt"), 16);
        assert!(matches!(result, Err(TransferError::Io(_))));
    }

    #[test]
    fn test_empty_file_is_done() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut talker = FileTalker::open(file.path(), 16).unwrap();
        assert_eq!(
            talker.send_unit(&mut SessionState::new()).unwrap(),
            TalkProgress::Done
        );
    }
}
