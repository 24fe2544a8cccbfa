//! Transport layer and the communication pump
//!
//! Supports:
//! - Serial ports (RS-232, RS-485, USB-Serial)
//! - Raw TCP connections
//!
//! Every port is non-blocking: a send or receive that cannot make progress
//! returns `Ok(0)` immediately. The [`CommunicationPump`] moves one batch in
//! each direction per idle cycle and applies the receive backpressure rule.

mod serial;
mod tcp;

pub use serial::{list_ports, SerialComm, SerialConfig, SerialFlowControl, SerialParity};
pub use tcp::{TcpComm, TcpConfig};

use crate::config::CommConfig;
use crate::core::session::SessionState;
use bytes::Buf;
use std::fmt;
use thiserror::Error;

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// Serial port
    Serial,
    /// Raw TCP
    Tcp,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "Serial"),
            Self::Tcp => write!(f, "TCP"),
        }
    }
}

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection timeout
    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The remote end closed the connection for good
    #[error("Disconnected")]
    Disconnected,
}

/// Transport statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Send calls that moved data
    pub packets_sent: u64,
    /// Receive calls that returned data
    pub packets_received: u64,
    /// Transient errors
    pub errors: u64,
}

/// Non-blocking byte transport
#[cfg_attr(test, mockall::automock)]
pub trait CommPort {
    /// Write as much of `data` as the transport takes right now. `Ok(0)` means try later.
    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read whatever is available into `buf`. `Ok(0)` means nothing yet.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Get transport type
    fn transport_type(&self) -> TransportType;

    /// Get connection info string
    fn connection_info(&self) -> String;
}

/// Result of one receive attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Skipped: published text is still outstanding
    Deferred,
    /// Skipped: the inbound buffer is full
    BufferFull,
    /// Nothing was available
    Empty,
    /// Bytes were appended to the inbound buffer
    Received(usize),
    /// The transport is gone; the session was marked not ready
    Closed,
    /// A transient error; try again next cycle
    Failed,
}

/// Moves session traffic between the session buffers and a [`CommPort`]
#[derive(Debug)]
pub struct CommunicationPump {
    send_batch: usize,
    receive_batch: usize,
    inbound_capacity: usize,
    scratch: Vec<u8>,
    stats: TransportStats,
}

impl Default for CommunicationPump {
    fn default() -> Self {
        Self::new(&CommConfig::default())
    }
}

impl CommunicationPump {
    /// Create a pump with batch sizes from `config`
    pub fn new(config: &CommConfig) -> Self {
        let receive_batch = config.receive_batch.max(1);
        Self {
            send_batch: config.send_batch.max(1),
            receive_batch,
            inbound_capacity: config.inbound_capacity.max(1),
            scratch: vec![0u8; receive_batch],
            stats: TransportStats::default(),
        }
    }

    /// Traffic statistics so far
    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Whether a receive attempt is allowed this cycle
    pub fn receive_allowed(session: &SessionState) -> bool {
        !session.publish_backlogged()
    }

    /// Try to send one batch from the outbound queue. Returns bytes sent.
    pub fn send(&mut self, session: &mut SessionState, port: &mut dyn CommPort) -> usize {
        if session.outbound.is_empty() {
            return 0;
        }

        let batch = session.outbound.len().min(self.send_batch);
        match port.send(&session.outbound[..batch]) {
            Ok(sent) => {
                let sent = sent.min(batch);
                session.outbound.advance(sent);
                if sent > 0 {
                    self.stats.bytes_sent += sent as u64;
                    self.stats.packets_sent += 1;
                }
                tracing::trace!(sent, queued = session.outbound.len(), "send");
                sent
            }
            Err(TransportError::Disconnected) => {
                tracing::info!(session = %session.id(), "Transport closed while sending");
                session.ready = false;
                0
            }
            Err(e) => {
                tracing::warn!("Send failed: {}", e);
                self.stats.errors += 1;
                0
            }
        }
    }

    /// Try to receive one batch into the inbound buffer, honouring backpressure
    pub fn receive(&mut self, session: &mut SessionState, port: &mut dyn CommPort) -> ReceiveOutcome {
        if !Self::receive_allowed(session) {
            tracing::trace!(
                pending = session.text_publish_pending,
                "receive deferred until published text drains"
            );
            return ReceiveOutcome::Deferred;
        }

        if session.flush_len > 0 {
            let discard = session.flush_len.min(session.inbound.len());
            session.inbound.advance(discard);
            session.flush_len -= discard;
        }

        let room = self.inbound_capacity.saturating_sub(session.inbound.len());
        if room == 0 {
            session.receive_requested = true;
            return ReceiveOutcome::BufferFull;
        }

        let want = room.min(self.receive_batch);
        match port.receive(&mut self.scratch[..want]) {
            Ok(0) => {
                session.receive_requested = false;
                ReceiveOutcome::Empty
            }
            Ok(n) => {
                let n = n.min(want);
                let mut data = &self.scratch[..n];
                if session.flush_len > 0 {
                    let discard = session.flush_len.min(n);
                    data = &data[discard..];
                    session.flush_len -= discard;
                }
                session.inbound.extend_from_slice(data);
                // A full read means the transport probably has more waiting
                session.receive_requested = n == want;
                self.stats.bytes_received += n as u64;
                self.stats.packets_received += 1;
                tracing::trace!(received = n, buffered = session.inbound.len(), "receive");
                ReceiveOutcome::Received(n)
            }
            Err(TransportError::Disconnected) => {
                tracing::info!(session = %session.id(), "Transport closed by remote");
                session.ready = false;
                session.receive_requested = false;
                ReceiveOutcome::Closed
            }
            Err(e) => {
                tracing::warn!("Receive failed: {}", e);
                self.stats.errors += 1;
                ReceiveOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pump() -> CommunicationPump {
        CommunicationPump::new(&CommConfig {
            inbound_capacity: 8,
            send_batch: 4,
            receive_batch: 4,
        })
    }

    fn ready_session() -> SessionState {
        let mut session = SessionState::new();
        session.ready = true;
        session
    }

    #[test]
    fn test_partial_send_keeps_remainder() {
        let mut session = ready_session();
        session.queue_outbound(b"abcdef");

        let mut port = MockCommPort::new();
        port.expect_send()
            .withf(|data| data == b"abcd")
            .times(1)
            .returning(|_| Ok(2));

        assert_eq!(pump().send(&mut session, &mut port), 2);
        assert_eq!(&session.outbound[..], b"cdef");
    }

    #[test]
    fn test_send_skips_empty_queue() {
        let mut session = ready_session();
        let mut port = MockCommPort::new();
        port.expect_send().never();

        assert_eq!(pump().send(&mut session, &mut port), 0);
    }

    #[test]
    fn test_receive_deferred_while_publish_backlogged() {
        let mut session = ready_session();
        session.capture.publish = true;
        session.text_publish_pending = 3;

        let mut port = MockCommPort::new();
        port.expect_receive().never();

        assert_eq!(pump().receive(&mut session, &mut port), ReceiveOutcome::Deferred);
    }

    #[test]
    fn test_receive_runs_when_publish_disabled() {
        let mut session = ready_session();
        session.text_publish_pending = 3;

        let mut port = MockCommPort::new();
        port.expect_receive().times(1).returning(|_| Ok(0));

        assert_eq!(pump().receive(&mut session, &mut port), ReceiveOutcome::Empty);
    }

    #[test]
    fn test_full_read_requests_another() {
        let mut session = ready_session();
        let mut port = MockCommPort::new();
        port.expect_receive().times(1).returning(|buf| {
            buf.copy_from_slice(b"wxyz");
            Ok(4)
        });

        assert_eq!(pump().receive(&mut session, &mut port), ReceiveOutcome::Received(4));
        assert!(session.receive_requested);
        assert_eq!(&session.inbound[..], b"wxyz");
    }

    #[test]
    fn test_receive_respects_capacity() {
        let mut session = ready_session();
        session.inbound.extend_from_slice(b"12345678");
        let mut port = MockCommPort::new();
        port.expect_receive().never();

        assert_eq!(pump().receive(&mut session, &mut port), ReceiveOutcome::BufferFull);
        assert!(session.receive_requested);
    }

    #[test]
    fn test_flush_discards_inbound() {
        let mut session = ready_session();
        session.inbound.extend_from_slice(b"ab");
        session.discard_inbound(3);

        let mut port = MockCommPort::new();
        port.expect_receive().times(1).returning(|buf| {
            buf[..2].copy_from_slice(b"cd");
            Ok(2)
        });

        pump().receive(&mut session, &mut port);
        assert_eq!(&session.inbound[..], b"d");
        assert_eq!(session.flush_len, 0);
    }

    #[test]
    fn test_disconnect_marks_not_ready() {
        let mut session = ready_session();
        let mut port = MockCommPort::new();
        port.expect_receive().returning(|_| Err(TransportError::Disconnected));

        assert_eq!(pump().receive(&mut session, &mut port), ReceiveOutcome::Closed);
        assert!(!session.ready);
    }

    #[test]
    fn test_transient_error_keeps_session() {
        let mut session = ready_session();
        session.queue_outbound(b"x");
        let mut port = MockCommPort::new();
        port.expect_send()
            .returning(|_| Err(TransportError::IoError(std::io::Error::other("glitch"))));

        let mut pump = pump();
        assert_eq!(pump.send(&mut session, &mut port), 0);
        assert!(session.ready);
        assert_eq!(pump.stats().errors, 1);
        assert_eq!(session.outbound.len(), 1);
    }
}
