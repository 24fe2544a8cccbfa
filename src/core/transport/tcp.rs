//! TCP transport implementation

use super::{CommPort, TransportError, TransportType};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// TCP connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Connection timeout in seconds
    pub timeout_secs: u64,
}

impl TcpConfig {
    /// Create a new TCP configuration
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout_secs: 10,
        }
    }

    /// Set timeout
    #[must_use]
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self::new("localhost", 23)
    }
}

/// Connected, non-blocking TCP stream
pub struct TcpComm {
    config: TcpConfig,
    stream: TcpStream,
}

impl TcpComm {
    /// Connect, then switch the socket to non-blocking mode
    pub fn connect(config: TcpConfig) -> Result<Self, TransportError> {
        let addr = format!("{}:{}", config.host, config.port);
        let timeout = Duration::from_secs(config.timeout_secs.max(1));

        let addrs = addr
            .to_socket_addrs()
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", addr, e)))?;

        let mut last_error = None;
        for candidate in addrs {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => return Self::from_stream(config, stream),
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    last_error = Some(TransportError::Timeout(config.timeout_secs));
                }
                Err(e) => last_error = Some(TransportError::ConnectionFailed(e.to_string())),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TransportError::ConnectionFailed(format!("{} did not resolve", addr))
        }))
    }

    /// Wrap an already connected stream
    pub fn from_stream(config: TcpConfig, stream: TcpStream) -> Result<Self, TransportError> {
        // Set TCP_NODELAY for lower latency
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        tracing::info!("Connected to {}:{}", config.host, config.port);
        Ok(Self { config, stream })
    }
}

fn is_closed(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}

impl CommPort for TcpComm {
    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        match self.stream.write(data) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(0),
            Err(e) if is_closed(e.kind()) => Err(TransportError::Disconnected),
            Err(e) => Err(TransportError::IoError(e)),
        }
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.stream.read(buf) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(0),
            Err(e) if is_closed(e.kind()) => Err(TransportError::Disconnected),
            Err(e) => Err(TransportError::IoError(e)),
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Tcp
    }

    fn connection_info(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }
}
