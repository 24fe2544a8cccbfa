//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use crate::config::ConfigError;
use crate::core::transfer::TransferError;
use crate::core::transport::TransportError;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// Connection timeout
    pub const TIMEOUT: u8 = 4;

    /// File not found
    pub const FILE_NOT_FOUND: u8 = 6;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Transfer failed
    pub const TRANSFER_FAILED: u8 = 10;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 14;
}

fn io_exit_code(err: &std::io::Error) -> u8 {
    use std::io::ErrorKind;

    match err.kind() {
        ErrorKind::NotFound => ExitCodes::FILE_NOT_FOUND,
        ErrorKind::PermissionDenied => ExitCodes::PERMISSION_DENIED,
        ErrorKind::ConnectionRefused => ExitCodes::CONNECTION_FAILED,
        ErrorKind::TimedOut => ExitCodes::TIMEOUT,
        _ => ExitCodes::ERROR,
    }
}

/// Pick the exit code for the first recognised error in `err`'s chain
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<TransportError>() {
            return match e {
                TransportError::ConnectionFailed(_) | TransportError::Disconnected => {
                    ExitCodes::CONNECTION_FAILED
                }
                TransportError::Timeout(_) => ExitCodes::TIMEOUT,
                TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
                TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
                TransportError::InvalidConfiguration(_) => ExitCodes::INVALID_ARGS,
                TransportError::IoError(io) => io_exit_code(io),
            };
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return ExitCodes::CONFIG_ERROR;
        }
        if let Some(e) = cause.downcast_ref::<TransferError>() {
            return match e {
                TransferError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                    ExitCodes::FILE_NOT_FOUND
                }
                _ => ExitCodes::TRANSFER_FAILED,
            };
        }
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return io_exit_code(io);
        }
    }
    ExitCodes::ERROR
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        4 => "Connection timeout",
        6 => "File not found",
        7 => "Permission denied",
        8 => "Configuration error",
        10 => "Transfer failed",
        14 => "Port not found",
        _ => "Unknown error",
    }
}
