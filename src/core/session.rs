//! Session state shared by every stage of the idle loop
//!
//! [`SessionState`] is the single record the dispatch cycle reads and writes.
//! It is owned by the idle core and lent out by `&mut` to one stage at a
//! time. [`ParseContext`] is the view handed to parsing collaborators: it
//! reads the inbound buffer and writes the capture rings held for the cycle.

use crate::config::CaptureConfig;
use crate::core::capture::{CaptureHandles, CaptureKind, CaptureReader, CaptureRing, CaptureScope};
use bytes::{Buf, BytesMut};
use uuid::Uuid;

/// Telnet "interpret as command" byte
pub const IAC: u8 = 255;

/// Which capture destinations are switched on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureFlags {
    /// Append captured text to the log file
    pub file_log: bool,
    /// Append raw received bytes to the binary log file
    pub binary_log: bool,
    /// Forward captured text to the publish channel
    pub publish: bool,
}

impl From<&CaptureConfig> for CaptureFlags {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            file_log: config.file_log,
            binary_log: config.binary_log,
            publish: config.publish,
        }
    }
}

/// Snapshot of the work a session still has queued
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    /// The transport asked to be read again
    pub receive_requested: bool,
    /// Bytes waiting to be sent
    pub outbound: usize,
    /// Received bytes not yet parsed
    pub inbound: usize,
    /// Inbound bytes scheduled for discard
    pub flush: usize,
    /// Captured text not yet written to file
    pub text_log: usize,
    /// Captured raw bytes not yet written to file
    pub binary_log: usize,
    /// Captured text not yet taken by the publish channel
    pub text_publish: usize,
}

impl PendingCounts {
    /// Whether anything at all is pending
    pub fn any(&self) -> bool {
        self.receive_requested
            || self.outbound > 0
            || self.inbound > 0
            || self.flush > 0
            || self.text_log > 0
            || self.binary_log > 0
            || self.text_publish > 0
    }
}

/// One live connection as seen by the idle loop
#[derive(Debug)]
pub struct SessionState {
    id: Uuid,
    /// Session fully established; the pipeline only runs while this is set
    pub ready: bool,
    /// The connection speaks Telnet, so IAC in the inbound stream starts a command
    pub telnet: bool,
    /// A Telnet command is waiting in the inbound stream for the negotiator
    pub telnet_mode: bool,
    /// A transfer-protocol dialog owns the byte stream
    pub protocol_dialog: bool,
    /// The transport has more data ready than the last receive took
    pub receive_requested: bool,
    /// Bytes queued for sending
    pub outbound: BytesMut,
    /// Received bytes waiting to be parsed
    pub inbound: BytesMut,
    /// An escaped 0xFF data byte taken out of the stream by the negotiator,
    /// delivered ahead of `inbound`
    pub data_iac: bool,
    /// Inbound bytes to discard on the next receive
    pub flush_len: usize,
    /// Captured text waiting for the log file
    pub text_log_pending: usize,
    /// Captured text waiting for the publish channel
    pub text_publish_pending: usize,
    /// Captured raw bytes waiting for the binary log file
    pub binary_log_pending: usize,
    /// Capture ring handles
    pub captures: CaptureHandles,
    /// Enabled capture destinations
    pub capture: CaptureFlags,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// A session that is not established yet and captures nothing
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            ready: false,
            telnet: false,
            telnet_mode: false,
            protocol_dialog: false,
            receive_requested: false,
            outbound: BytesMut::with_capacity(4096),
            inbound: BytesMut::with_capacity(4096),
            data_iac: false,
            flush_len: 0,
            text_log_pending: 0,
            text_publish_pending: 0,
            binary_log_pending: 0,
            captures: CaptureHandles::default(),
            capture: CaptureFlags::default(),
        }
    }

    /// An established session with capture rings sized from `config`
    pub fn established(config: &CaptureConfig) -> Self {
        let mut session = Self::new();
        session.captures =
            CaptureHandles::allocate(config.text_buffer_size, config.binary_buffer_size);
        session.capture = CaptureFlags::from(config);
        session.ready = true;
        session
    }

    /// Session ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current pending counts
    pub fn pending(&self) -> PendingCounts {
        PendingCounts {
            receive_requested: self.receive_requested,
            outbound: self.outbound.len(),
            inbound: self.inbound.len() + usize::from(self.data_iac),
            flush: self.flush_len,
            text_log: self.text_log_pending,
            binary_log: self.binary_log_pending,
            text_publish: self.text_publish_pending,
        }
    }

    /// Queue bytes for the next send attempt
    pub fn queue_outbound(&mut self, data: &[u8]) {
        self.outbound.extend_from_slice(data);
    }

    /// Queue bytes with every IAC doubled, so a Telnet peer reads them as data
    pub fn queue_outbound_escaped(&mut self, data: &[u8]) {
        let mut rest = data;
        while let Some(pos) = rest.iter().position(|&b| b == IAC) {
            self.outbound.extend_from_slice(&rest[..=pos]);
            self.outbound.extend_from_slice(&[IAC]);
            rest = &rest[pos + 1..];
        }
        self.outbound.extend_from_slice(rest);
    }

    /// Discard the next `len` received bytes
    pub fn discard_inbound(&mut self, len: usize) {
        self.flush_len += len;
    }

    /// Published text is still outstanding, so receiving more could overwrite it
    pub fn publish_backlogged(&self) -> bool {
        self.capture.publish && self.text_publish_pending > 0
    }

    /// Copy a ring's pending counts into the session. Call only with the ring locked.
    pub fn sync_capture_counts(&mut self, kind: CaptureKind, ring: &CaptureRing) {
        match kind {
            CaptureKind::Text => {
                self.text_log_pending = ring.pending(CaptureReader::File);
                self.text_publish_pending = ring.pending(CaptureReader::Publish);
            }
            CaptureKind::Binary => {
                self.binary_log_pending = ring.pending(CaptureReader::File);
            }
        }
    }
}

/// What parsing collaborators get to work with during one cycle
pub struct ParseContext<'a> {
    session: &'a mut SessionState,
    capture: &'a mut CaptureScope,
}

impl<'a> ParseContext<'a> {
    /// Borrow the session and the cycle's capture scope
    pub fn new(session: &'a mut SessionState, capture: &'a mut CaptureScope) -> Self {
        Self { session, capture }
    }

    /// The session
    pub fn session(&self) -> &SessionState {
        &*self.session
    }

    /// The session, mutably
    pub fn session_mut(&mut self) -> &mut SessionState {
        &mut *self.session
    }

    /// Unparsed inbound bytes
    pub fn inbound(&self) -> &[u8] {
        &self.session.inbound
    }

    /// Read one data byte for a terminal engine.
    ///
    /// On a Telnet session an IAC that is not an escaped `IAC IAC` is left in
    /// place and flags `telnet_mode`, ending the read so the negotiator gets
    /// the stream on the next cycle.
    pub fn read_byte(&mut self) -> Option<u8> {
        if std::mem::take(&mut self.session.data_iac) {
            return Some(IAC);
        }

        let inbound = &self.session.inbound;
        let first = *inbound.first()?;

        if self.session.telnet && first == IAC {
            if inbound.get(1) == Some(&IAC) {
                self.consume_inbound(2);
                return Some(IAC);
            }
            self.session.telnet_mode = true;
            return None;
        }

        self.consume_inbound(1);
        Some(first)
    }

    /// Hand an escaped 0xFF back to the terminal; the next [`read_byte`]
    /// returns it before any inbound byte.
    ///
    /// [`read_byte`]: ParseContext::read_byte
    pub fn push_data_iac(&mut self) {
        self.session.data_iac = true;
    }

    /// Read one byte with no Telnet interpretation
    pub fn read_raw(&mut self) -> Option<u8> {
        let first = *self.session.inbound.first()?;
        self.consume_inbound(1);
        Some(first)
    }

    /// Drop `n` inbound bytes, copying them to the binary capture first
    pub fn consume_inbound(&mut self, n: usize) {
        let n = n.min(self.session.inbound.len());
        if n == 0 {
            return;
        }
        if self.session.capture.binary_log {
            if let Some(ring) = self.capture.get_mut(CaptureKind::Binary) {
                ring.put(&self.session.inbound[..n], true, false);
                self.session.sync_capture_counts(CaptureKind::Binary, ring);
            }
        }
        self.session.inbound.advance(n);
    }

    /// Queue a reply for the next send attempt
    pub fn write_outbound(&mut self, data: &[u8]) {
        self.session.queue_outbound(data);
    }

    /// Queue data bytes inside a Telnet command, doubling any IAC
    pub fn write_outbound_escaped(&mut self, data: &[u8]) {
        self.session.queue_outbound_escaped(data);
    }

    /// Record interpreted text. Dropped when no text ring is held this cycle.
    pub fn capture_text(&mut self, text: &[u8]) -> bool {
        let flags = self.session.capture;
        if !flags.file_log && !flags.publish {
            return false;
        }
        let Some(ring) = self.capture.get_mut(CaptureKind::Text) else {
            return false;
        };
        ring.put(text, flags.file_log, flags.publish);
        self.session.sync_capture_counts(CaptureKind::Text, ring);
        true
    }
}
