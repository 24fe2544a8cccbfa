//! Clipboard text talker

use super::{queue_unit, TalkProgress, Talker, TransferError, TransferProgress};
use crate::core::session::SessionState;

/// Sends pasted text with every line ending turned into CR
#[derive(Debug, Clone)]
pub struct ClipboardTalker {
    data: Vec<u8>,
    pos: usize,
    unit_size: usize,
}

impl ClipboardTalker {
    /// Talker for `text`, sending `unit_size` bytes per unit
    pub fn new(text: &str, unit_size: usize) -> Self {
        Self {
            data: normalize_line_endings(text.as_bytes()),
            pos: 0,
            unit_size: unit_size.max(1),
        }
    }

    /// Bytes left to send
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// CRLF and lone LF both become CR, which is what a terminal's Enter key sends
fn normalize_line_endings(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut iter = text.iter().copied().peekable();
    while let Some(byte) = iter.next() {
        match byte {
            b'\r' => {
                if iter.peek() == Some(&b'\n') {
                    iter.next();
                }
                out.push(b'\r');
            }
            b'\n' => out.push(b'\r'),
            other => out.push(other),
        }
    }
    out
}

impl Talker for ClipboardTalker {
    fn send_unit(&mut self, session: &mut SessionState) -> Result<TalkProgress, TransferError> {
        if self.remaining() == 0 {
            return Ok(TalkProgress::Done);
        }
        // Wait for the previous unit to drain
        if session.outbound.len() >= self.unit_size {
            return Ok(TalkProgress::Continue);
        }

        let end = (self.pos + self.unit_size).min(self.data.len());
        queue_unit(session, &self.data[self.pos..end]);
        self.pos = end;

        if self.remaining() == 0 {
            Ok(TalkProgress::Done)
        } else {
            Ok(TalkProgress::Continue)
        }
    }

    fn progress(&self) -> TransferProgress {
        TransferProgress {
            name: "clipboard".to_string(),
            total: Some(self.data.len() as u64),
            transferred: self.pos as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_endings() {
        assert_eq!(normalize_line_endings(b"a\r\nb\nc\rd"), b"a\rb\rc\rd");
        assert_eq!(normalize_line_endings(b""), b"");
    }

    #[test]
    fn test_sends_in_units() {
        let mut session = SessionState::new();
        let mut talker = ClipboardTalker::new("hello\nworld", 4);

        assert_eq!(talker.send_unit(&mut session).unwrap(), TalkProgress::Continue);
        assert_eq!(&session.outbound[..], b"hell");

        // Queue still holds a full unit
        assert_eq!(talker.send_unit(&mut session).unwrap(), TalkProgress::Continue);
        assert_eq!(session.outbound.len(), 4);

        session.outbound.clear();
        talker.send_unit(&mut session).unwrap();
        session.outbound.clear();
        assert_eq!(talker.send_unit(&mut session).unwrap(), TalkProgress::Done);
        assert_eq!(&session.outbound[..], b"ld");
        assert_eq!(talker.progress().transferred, 11);
    }

    #[test]
    fn test_empty_text_is_done() {
        let mut talker = ClipboardTalker::new("", 16);
        assert_eq!(
            talker.send_unit(&mut SessionState::new()).unwrap(),
            TalkProgress::Done
        );
    }
}
