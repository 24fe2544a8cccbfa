//! # Termdrive Core Library
//!
//! The idle-time dispatch core of a terminal client. A host that owns the
//! only thread of control calls [`IdleCore::on_idle`] whenever it is idle;
//! each call runs one non-blocking cycle:
//!
//! - send queued keystrokes and transfer data
//! - hand received bytes to the Telnet negotiator, a transfer dialog, or
//!   the active terminal engine
//! - write captured output to log files and a publish channel
//! - receive more data, unless published text is still outstanding
//!
//! ## Example
//!
//! ```rust,no_run
//! use termdrive_core::{AppConfig, IdleCore, TcpComm, TcpConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let port = TcpComm::connect(TcpConfig::new("localhost", 23))?;
//!     let mut core = IdleCore::builder(Box::new(port))
//!         .config(AppConfig::load()?)
//!         .build();
//!
//!     core.session_mut().queue_outbound(b"help\r");
//!     let mut budget = 0;
//!     while core.session().ready {
//!         if core.on_idle(budget) {
//!             budget += 1;
//!         } else {
//!             budget = 0;
//!             std::thread::sleep(std::time::Duration::from_millis(10));
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{exit_code_for, ExitCodes};
pub use crate::config::{AppConfig, CaptureConfig, ConfigError};
pub use crate::core::capture::{
    CaptureError, CaptureKind, LogSink, NoPublish, NullSink, PublishChannel,
};
pub use crate::core::logger::FileCapture;
pub use crate::core::mode::{
    ActiveEngine, EngineSwitch, ProtocolDialog, TelnetNegotiator, TelnetOutcome, TelnetStatus,
    TerminalEngines,
};
pub use crate::core::scheduler::{AltKeys, IdleCore, MetaKeyMode, ThreadYield, Yielder};
pub use crate::core::session::{ParseContext, SessionState};
pub use crate::core::terminal::{RawTerminal, TerminalSize};
pub use crate::core::transfer::{TransferDriver, TransferError, TransferStatus};
pub use crate::core::transport::{
    CommPort, SerialComm, SerialConfig, SerialFlowControl, SerialParity, TcpComm, TcpConfig,
    TransportError, TransportType,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
